//! Redis error conversion.

use sso_core::Error;

/// Converts a `fred` Redis error to a registry error.
#[allow(clippy::needless_pass_by_value)]
pub fn from_redis_error(err: fred::error::Error) -> Error {
    match err.kind() {
        fred::error::ErrorKind::Config => Error::Config(err.to_string()),
        _ => Error::Unavailable(err.to_string()),
    }
}
