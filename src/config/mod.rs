//! Project build configuration

pub mod buildinfo;
pub mod validation;

pub use buildinfo::{BuildInfo, LegacyDump, BUILDINFO_FILE};
pub use validation::validate_build_info;
