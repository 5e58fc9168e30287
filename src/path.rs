//! The thin `/name` path grammar: with a single flat root directory,
//! resolving a path reduces to validating and stripping the one
//! leading slash.

use crate::error::{Error, Result};

/// Splits `/name` into `name`, rejecting everything else: missing
/// leading slash, the bare root path `/`, and embedded `/` in the
/// name. The bare root path is intentionally rejected: there is no
/// file named by it, only the directory itself.
pub fn parse(path: &str) -> Result<&str> {
    if !path.starts_with('/') || path.len() <= 1 {
        return Err(Error::InvalidArgument);
    }
    let name = &path[1..];
    if name.contains('/') {
        return Err(Error::InvalidArgument);
    }
    Ok(name)
}
