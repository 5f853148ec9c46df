//! JSON response envelope for request-serving boundaries.
//!
//! Failures caused by an error value never expose its text by default: the
//! client sees a generic message and a correlation id, while the error
//! itself goes to the [`ErrorHub`] subscribers under the same id.

use crate::error::OperationError;
use crate::report::{ErrorHub, new_correlation_id};
use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;
use std::error::Error as StdError;

pub const SUCCESS_CODE: i32 = 0;
pub const ERROR_CODE: i32 = 1;
pub const PARAMETER_ERROR_CODE: i32 = 22;

const DEFAULT_ERROR_MESSAGE: &str = "ERR";
const HIDDEN_ERROR_MESSAGE: &str = "ERR OCCURRED";

/// Field names and disclosure policy for serialized envelopes.
#[derive(Debug, Clone)]
pub struct ResponseFormat {
    pub code_field: String,
    pub message_field: String,
    pub data_field: String,
    pub error_id_field: String,
    /// Put the cause's text in the message instead of a generic one.
    pub show_error_detail: bool,
}

impl Default for ResponseFormat {
    fn default() -> Self {
        Self {
            code_field: "code".to_string(),
            message_field: "msg".to_string(),
            data_field: "data".to_string(),
            error_id_field: "errid".to_string(),
            show_error_detail: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub code: i32,
    pub message: String,
    pub error_id: Option<String>,
    pub data: Option<JsonValue>,
    /// Text of the cause, serialized only when the format allows it.
    detail: Option<String>,
    format: ResponseFormat,
}

impl ApiResponse {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            error_id: None,
            data: None,
            detail: None,
            format: ResponseFormat::default(),
        }
    }

    pub fn success() -> Self {
        Self::new(SUCCESS_CODE, "OK")
    }

    pub fn parameter_error(message: Option<&str>) -> Self {
        Self::new(PARAMETER_ERROR_CODE, message.unwrap_or("Invalid parameter"))
    }

    /// Failure identified by a code alone.
    pub fn from_code(code: i32) -> Self {
        Self::new(code, DEFAULT_ERROR_MESSAGE)
    }

    /// Failure with a caller-chosen message, shown as-is.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new(ERROR_CODE, message)
    }

    /// Failure caused by an error value.
    ///
    /// An [`OperationError`] that was already reported keeps its code and
    /// correlation id. Any other cause gets a fresh id and is reported
    /// through `hub`.
    pub fn from_cause(cause: &(dyn StdError + 'static), hub: &ErrorHub) -> Self {
        let operation = cause.downcast_ref::<OperationError>();
        let code = operation.map_or(ERROR_CODE, |op| op.code);
        let error_id = match operation.and_then(|op| op.correlation_id.clone()) {
            Some(id) => id,
            None => {
                let id = new_correlation_id();
                hub.report(&id, cause);
                id
            }
        };
        let mut response = Self::new(code, HIDDEN_ERROR_MESSAGE);
        response.error_id = Some(error_id);
        response.detail = Some(cause.to_string());
        response
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// The message as it will be serialized under the current format.
    pub fn visible_message(&self) -> &str {
        match (&self.detail, self.format.show_error_detail) {
            (Some(detail), true) => detail,
            _ => &self.message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

impl Serialize for ApiResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(&self.format.code_field, &self.code)?;
        map.serialize_entry(&self.format.message_field, self.visible_message())?;
        if let Some(data) = &self.data {
            map.serialize_entry(&self.format.data_field, data)?;
        }
        if let Some(id) = self.error_id.as_deref().filter(|id| !id.is_empty()) {
            map.serialize_entry(&self.format.error_id_field, id)?;
        }
        map.end()
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_success_with_data() {
        let response = ApiResponse::success().with_data(&json!({"id": 1}));
        assert!(response.is_success());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"code": 0, "msg": "OK", "data": {"id": 1}})
        );
    }

    #[test]
    fn test_tagged_constructors() {
        assert_eq!(ApiResponse::from_code(7).message, "ERR");
        assert_eq!(ApiResponse::from_code(7).code, 7);
        let response = ApiResponse::from_message("name is required");
        assert_eq!((response.code, response.message.as_str()), (ERROR_CODE, "name is required"));
        assert_eq!(ApiResponse::parameter_error(None).code, PARAMETER_ERROR_CODE);
    }

    #[test]
    fn test_from_cause_hides_detail_and_reports() {
        let hub = ErrorHub::new();
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        hub.subscribe(move |id, err| sink.lock().unwrap().push((id.to_string(), err.to_string())));

        let cause = DbError::internal("password=hunter2 leaked");
        let response = ApiResponse::from_cause(&cause, &hub);
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["msg"], "ERR OCCURRED");
        assert_eq!(body["code"], ERROR_CODE);
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(body["errid"], reported[0].0.as_str());
        assert!(reported[0].1.contains("hunter2"));
    }

    #[test]
    fn test_from_cause_reuses_operation_correlation_id() {
        let hub = ErrorHub::new();
        let mut err = OperationError::new("find", "main", "User", "", DbError::internal("x"));
        err.correlation_id = Some("abc".to_string());

        let response = ApiResponse::from_cause(&err, &hub);
        assert_eq!(response.error_id.as_deref(), Some("abc"));
        assert_eq!(response.code, crate::error::DB_ERROR_CODE);
    }

    #[test]
    fn test_custom_format() {
        let format = ResponseFormat {
            code_field: "status".into(),
            message_field: "message".into(),
            show_error_detail: true,
            ..ResponseFormat::default()
        };
        let response =
            ApiResponse::from_cause(&DbError::internal("boom"), &ErrorHub::new()).with_format(format);
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["status"], ERROR_CODE);
        assert_eq!(body["message"], "Internal error: boom");
        assert!(body.get("errid").is_some());
    }
}
