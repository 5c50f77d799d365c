//! Core services: capability tokens and playback URL issuance.

pub mod capability;
pub mod playback;

pub use capability::{AccessScope, CapabilityClaims, CapabilityTokenService};
pub use playback::{AccessDecision, EntitlementResolver, PlaybackUrlService};
