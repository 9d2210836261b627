//! Built-in checks used by the command line

pub mod blind_timing;
pub mod reflection;

pub use blind_timing::BlindTimingCheck;
pub use reflection::ReflectionCheck;
