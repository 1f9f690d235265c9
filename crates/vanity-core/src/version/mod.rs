//! Module version handling: semantic version helpers, pseudo-versions and
//! revision resolution.

pub mod pseudo;
pub mod resolver;

pub use pseudo::{is_pseudo_version, parse_canonical, path_major, pseudo_version};
pub use resolver::{CanonicalVersion, LATEST, RevisionResolver};
