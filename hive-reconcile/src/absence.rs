//! Absence classification.
//!
//! Splits remote failures into "the object does not exist" and everything
//! else. Read and Delete use this to stay idempotent; nothing else in the
//! crate decides what a 404 looks like.

use crate::api::{ApiError, ApiResult};

/// Marker the remote API embeds in error bodies for missing objects.
const EMBEDDED_NOT_FOUND: &str = "\"error\": 404";

/// True when the failure means the remote object does not exist.
pub fn is_absent(err: &ApiError) -> bool {
    err.status == Some(404) || err.message.contains(EMBEDDED_NOT_FOUND)
}

/// Turns absence into `Ok(None)` and leaves every other failure alone.
pub trait AbsentAsNone<T> {
    fn absent_as_none(self) -> ApiResult<Option<T>>;
}

impl<T> AbsentAsNone<T> for ApiResult<T> {
    fn absent_as_none(self) -> ApiResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_absent(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
