//! In-process caches for the delivery path.

pub mod domain_preference;

pub use domain_preference::{DomainPreference, DomainPreferenceCache};
