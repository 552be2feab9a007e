use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// An error type reported by the bridge.
///
/// The HTTP status of a bridge response is 200 even when the request failed;
/// failures come back as `[{"error": {"type": .., "address": .., "description": ..}}]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiErrorCode {
    pub code: u32,
    pub message: &'static str,
}

impl ApiErrorCode {
    /// Whether the error means the app key is not (or no longer) whitelisted.
    pub fn is_unauthorized(&self) -> bool {
        self.code == UNAUTHORIZED_USER.code
    }
}

// Codes from the v1 API "Error messages" page.

/// The app key is not whitelisted.
pub const UNAUTHORIZED_USER: ApiErrorCode = ApiErrorCode {
    code: 1,
    message: "unauthorized user",
};
/// The request body could not be parsed.
pub const INVALID_JSON: ApiErrorCode = ApiErrorCode {
    code: 2,
    message: "body contains invalid JSON",
};
/// The light or group id does not exist.
pub const RESOURCE_NOT_AVAILABLE: ApiErrorCode = ApiErrorCode {
    code: 3,
    message: "resource not available",
};
/// A parameter is out of range.
pub const INVALID_VALUE: ApiErrorCode = ApiErrorCode {
    code: 7,
    message: "invalid value for parameter",
};
/// Registration attempted without a button press.
pub const LINK_BUTTON_NOT_PRESSED: ApiErrorCode = ApiErrorCode {
    code: 101,
    message: "link button not pressed",
};
/// E.g. setting a color on a light that is off.
pub const PARAMETER_NOT_MODIFIABLE: ApiErrorCode = ApiErrorCode {
    code: 201,
    message: "parameter not modifiable",
};
/// Anything else.
pub const UNKNOWN: ApiErrorCode = ApiErrorCode {
    code: 0,
    message: "unknown error",
};

/// One entry of a bridge error answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub code: u32,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api {
            code: err.code,
            address: err.address,
            description: err.description,
        }
    }
}

/// One entry of a bridge answer to a write: `{"success": ..}` or `{"error": ..}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiResult<T> {
    Success(T),
    Error(ApiError),
}

/// Trait for bridge answers carrying an error type.
pub trait ApiErrorCodeTrait {
    /// The error type of the answer.
    fn api_error_code(&self) -> ApiErrorCode;

    fn map_api_error_code(code: u32) -> ApiErrorCode {
        match code {
            1 => UNAUTHORIZED_USER,
            2 => INVALID_JSON,
            3 => RESOURCE_NOT_AVAILABLE,
            7 => INVALID_VALUE,
            101 => LINK_BUTTON_NOT_PRESSED,
            201 => PARAMETER_NOT_MODIFIABLE,
            _ => UNKNOWN,
        }
    }
}

impl ApiErrorCodeTrait for ApiError {
    fn api_error_code(&self) -> ApiErrorCode {
        Self::map_api_error_code(self.code)
    }
}

/**
Decodes a bridge answer for a read.

Reads answer with the resource object on success, but with an array of error
entries on failure, so the body is inspected before it is bound to `T`.
 */
pub fn decode_resource<T: DeserializeOwned>(body: &str) -> anyhow::Result<T> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    if let serde_json::Value::Array(entries) = &value {
        if let Some(err) = first_error(entries) {
            return Err(Error::from(err).into());
        }
        return Err(Error::UnexpectedResponse(body.to_string()).into());
    }
    Ok(serde_json::from_value(value)?)
}

/**
Decodes a bridge answer for a write.

Fails on the first error entry, otherwise returns all success payloads.
 */
pub fn decode_results<T: DeserializeOwned>(body: &str) -> anyhow::Result<Vec<T>> {
    let results: Vec<ApiResult<T>> = serde_json::from_str(body)?;
    let mut successes = Vec::with_capacity(results.len());
    for result in results {
        match result {
            ApiResult::Success(value) => successes.push(value),
            ApiResult::Error(err) => return Err(Error::from(err).into()),
        }
    }
    Ok(successes)
}

/**
Decodes a bridge answer for a write that may partly succeed.

A light that is off refuses color changes but still takes the other fields, so
the refused entries come back next to the applied ones.
 */
pub fn split_results<T: DeserializeOwned>(
    body: &str,
) -> anyhow::Result<(Vec<T>, Vec<ApiError>)> {
    let results: Vec<ApiResult<T>> = serde_json::from_str(body)?;
    let mut successes = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            ApiResult::Success(value) => successes.push(value),
            ApiResult::Error(err) => errors.push(err),
        }
    }
    Ok((successes, errors))
}

/// Whether `err` is the bridge refusing the app key.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<Error>() {
        Some(Error::Api { code, .. }) => ApiError::map_api_error_code(*code).is_unauthorized(),
        _ => false,
    }
}

fn first_error(entries: &[serde_json::Value]) -> Option<ApiError> {
    entries
        .iter()
        .filter_map(|entry| entry.get("error"))
        .find_map(|err| serde_json::from_value(err.clone()).ok())
}
