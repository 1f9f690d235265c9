//! Module zip assembly
//!
//! - [`ArchiveBuilder`]: filters, validates and writes the module zip
//! - [`ArchiveStream`]: the rewound, spooled archive handed to callers
//! - [`ArchiveLimits`]: size ceilings enforced before anything is written

mod builder;
mod stream;

pub use builder::ArchiveBuilder;
pub use stream::ArchiveStream;

/// Uncompressed size ceilings for one module archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Sum of all file sizes
    pub max_total: u64,
    /// Size of any single file
    pub max_file: u64,
}

impl ArchiveLimits {
    pub const DEFAULT_MAX_TOTAL: u64 = 500 << 20;
    pub const DEFAULT_MAX_FILE: u64 = 500 << 20;
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_total: Self::DEFAULT_MAX_TOTAL,
            max_file: Self::DEFAULT_MAX_FILE,
        }
    }
}
