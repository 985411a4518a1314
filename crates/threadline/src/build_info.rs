//! Build-time metadata.

/// Crate version baked into the binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
