//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes. Only client-actionable
//! errors carry their message; everything else is logged and answered with
//! an opaque internal error.

use billrun_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use tracing::error;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const INVALID_STATE: i32 = 4002;
    pub const INTERNAL_ERROR: i32 = 5000;
}

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::InvalidState(msg) => {
            ErrorObjectOwned::owned(code::INVALID_STATE, msg, None::<()>)
        }
        other => {
            error!(error = %other, "RPC request failed");
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, INTERNAL_MESSAGE, None::<()>)
        }
    }
}
