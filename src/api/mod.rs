//! Network API
//!
//! Requests are addressed as `/{format}/{component}/{type}/{name}/?params`,
//! answered with JSON elements or, for "other" requests, raw content.

mod network;
pub mod server;

use std::collections::HashMap;

use serde_json::{json, Value};
use thiserror::Error;

pub use network::NetworkApi;
pub use server::ApiServer;

/// Kind of API failure, each with a stable wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    BadFormat,
    BadType,
    NoImplementor,
    BadAction,
    BadView,
    BadOther,
    MissingParameter,
    IllegalParameter,
    DoesNotExist,
    AlreadyExists,
    BadExternalData,
    InternalError,
}

impl ApiErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ApiErrorKind::BadFormat => "bad_format",
            ApiErrorKind::BadType => "bad_type",
            ApiErrorKind::NoImplementor => "no_implementor",
            ApiErrorKind::BadAction => "bad_action",
            ApiErrorKind::BadView => "bad_view",
            ApiErrorKind::BadOther => "bad_other",
            ApiErrorKind::MissingParameter => "missing_parameter",
            ApiErrorKind::IllegalParameter => "illegal_parameter",
            ApiErrorKind::DoesNotExist => "does_not_exist",
            ApiErrorKind::AlreadyExists => "already_exists",
            ApiErrorKind::BadExternalData => "bad_external_data",
            ApiErrorKind::InternalError => "internal_error",
        }
    }

    /// HTTP status of the error response
    pub fn status(&self) -> u16 {
        match self {
            ApiErrorKind::NoImplementor
            | ApiErrorKind::BadAction
            | ApiErrorKind::BadView
            | ApiErrorKind::BadOther
            | ApiErrorKind::DoesNotExist => 404,
            ApiErrorKind::InternalError => 500,
            _ => 400,
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            ApiErrorKind::BadFormat => "Bad format",
            ApiErrorKind::BadType => "Bad type",
            ApiErrorKind::NoImplementor => "No implementor",
            ApiErrorKind::BadAction => "No such action",
            ApiErrorKind::BadView => "No such view",
            ApiErrorKind::BadOther => "No such other",
            ApiErrorKind::MissingParameter => "Missing parameter",
            ApiErrorKind::IllegalParameter => "Illegal parameter",
            ApiErrorKind::DoesNotExist => "Does not exist",
            ApiErrorKind::AlreadyExists => "Already exists",
            ApiErrorKind::BadExternalData => "Bad external data",
            ApiErrorKind::InternalError => "Internal error",
        }
    }
}

/// An API failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {}", .detail.as_deref().unwrap_or_default())]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail(kind: ApiErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "code": self.kind.code(),
            "message": self.detail.as_deref().unwrap_or(self.kind.default_message()),
        })
    }
}

/// Response format requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Json,
    Other,
}

/// Type of API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Action,
    View,
    Other,
}

/// A parsed API request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub format: ApiFormat,
    pub component: String,
    pub request_type: RequestType,
    pub name: String,
    pub params: HashMap<String, String>,

    /// Host name the request was sent to
    pub host: Option<String>,
}

impl ApiRequest {
    /// Parse `/{format}/{component}/{type}/{name}/?query`
    pub fn parse(path_and_query: &str) -> Result<Self, ApiError> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).map(|s| s.into_owned()).unwrap_or_else(|_| s.to_string()))
            .collect();
        let [format, component, request_type, name] = segments.as_slice() else {
            return Err(ApiError::with_detail(ApiErrorKind::BadFormat, path.to_string()));
        };

        let format = match format.to_ascii_uppercase().as_str() {
            "JSON" => ApiFormat::Json,
            "OTHER" => ApiFormat::Other,
            _ => return Err(ApiError::with_detail(ApiErrorKind::BadFormat, format.clone())),
        };
        let request_type = match request_type.as_str() {
            "action" => RequestType::Action,
            "view" => RequestType::View,
            "other" => RequestType::Other,
            _ => return Err(ApiError::with_detail(ApiErrorKind::BadType, request_type.clone())),
        };
        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        Ok(Self {
            format,
            component: component.clone(),
            request_type,
            name: name.clone(),
            params,
            host: None,
        })
    }
}

/// Result of an API request
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// A named value, `{ "<name>": value }`
    Element { name: String, value: Value },

    /// Result of an action
    Result(bool),

    /// Raw content of an "other" request
    Other {
        content_type: String,
        body: Vec<u8>,
        filename: Option<String>,
    },
}

impl ApiResponse {
    pub const OK: ApiResponse = ApiResponse::Result(true);
    pub const FAIL: ApiResponse = ApiResponse::Result(false);

    pub fn element(name: &str, value: impl Into<Value>) -> Self {
        ApiResponse::Element {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn other(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        ApiResponse::Other {
            content_type: content_type.to_string(),
            body: body.into(),
            filename: None,
        }
    }

    /// JSON body of the response, `None` for raw content
    pub fn to_json(&self) -> Option<Value> {
        match self {
            ApiResponse::Element { name, value } => {
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), value.clone());
                Some(Value::Object(map))
            }
            ApiResponse::Result(ok) => Some(json!({ "Result": if *ok { "OK" } else { "FAIL" } })),
            ApiResponse::Other { .. } => None,
        }
    }
}

/// Mandatory, non-empty parameter
pub fn param_str<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ApiError> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::with_detail(ApiErrorKind::MissingParameter, name))
}

/// Optional parameter, empty when absent
pub fn param_opt_str<'a>(params: &'a HashMap<String, String>, name: &str) -> &'a str {
    params.get(name).map(String::as_str).unwrap_or("")
}

/// Mandatory integer parameter
pub fn param_int(params: &HashMap<String, String>, name: &str) -> Result<i32, ApiError> {
    param_str(params, name)?
        .trim()
        .parse()
        .map_err(|_| ApiError::with_detail(ApiErrorKind::IllegalParameter, name))
}

/// Optional integer parameter
pub fn param_int_or(params: &HashMap<String, String>, name: &str, default: i32) -> Result<i32, ApiError> {
    match params.get(name).filter(|v| !v.is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ApiError::with_detail(ApiErrorKind::IllegalParameter, name)),
        None => Ok(default),
    }
}

/// Optional boolean parameter
pub fn param_bool(params: &HashMap<String, String>, name: &str, default: bool) -> Result<bool, ApiError> {
    match params.get(name).filter(|v| !v.is_empty()) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ApiError::with_detail(ApiErrorKind::IllegalParameter, name)),
        },
        None => Ok(default),
    }
}

/// Mandatory port parameter, 1..=65535
pub fn param_port(params: &HashMap<String, String>, name: &str) -> Result<u16, ApiError> {
    let port = param_int(params, name)?;
    u16::try_from(port)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| ApiError::with_detail(ApiErrorKind::IllegalParameter, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_request() {
        let request = ApiRequest::parse("/JSON/network/action/addAlias/?name=example%2Eorg&enabled=false").unwrap();
        assert_eq!(request.format, ApiFormat::Json);
        assert_eq!(request.component, "network");
        assert_eq!(request.request_type, RequestType::Action);
        assert_eq!(request.name, "addAlias");
        assert_eq!(request.params.get("name").map(String::as_str), Some("example.org"));

        let request = ApiRequest::parse("/OTHER/network/other/proxy.pac/").unwrap();
        assert_eq!(request.format, ApiFormat::Other);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_parse_request_errors() {
        assert_eq!(
            ApiRequest::parse("/JSON/network/action/").unwrap_err().kind,
            ApiErrorKind::BadFormat
        );
        assert_eq!(
            ApiRequest::parse("/XML/network/view/getAliases/").unwrap_err().kind,
            ApiErrorKind::BadFormat
        );
        assert_eq!(
            ApiRequest::parse("/JSON/network/update/getAliases/").unwrap_err().kind,
            ApiErrorKind::BadType
        );
    }

    #[test]
    fn test_error_json() {
        let error = ApiError::with_detail(ApiErrorKind::IllegalParameter, "port");
        assert_eq!(error.to_json(), json!({"code": "illegal_parameter", "message": "port"}));
        assert_eq!(error.kind.status(), 400);
        assert_eq!(ApiErrorKind::BadAction.status(), 404);
        assert_eq!(ApiErrorKind::InternalError.status(), 500);
    }

    #[test]
    fn test_response_json() {
        assert_eq!(ApiResponse::OK.to_json(), Some(json!({"Result": "OK"})));
        assert_eq!(ApiResponse::FAIL.to_json(), Some(json!({"Result": "FAIL"})));
        assert_eq!(
            ApiResponse::element("getConnectionTimeout", "20").to_json(),
            Some(json!({"getConnectionTimeout": "20"}))
        );
        assert!(ApiResponse::other("text/plain", "x").to_json().is_none());
    }

    #[test]
    fn test_params() {
        let p = params(&[("port", "8080"), ("bad", "x"), ("enabled", "TRUE"), ("empty", "")]);
        assert_eq!(param_str(&p, "port").unwrap(), "8080");
        assert_eq!(param_str(&p, "empty").unwrap_err().kind, ApiErrorKind::MissingParameter);
        assert_eq!(param_int(&p, "bad").unwrap_err().kind, ApiErrorKind::IllegalParameter);
        assert!(param_bool(&p, "enabled", false).unwrap());
        assert!(!param_bool(&p, "missing", false).unwrap());
        assert_eq!(param_port(&p, "port").unwrap(), 8080);
        assert_eq!(param_port(&p, "missing").unwrap_err().kind, ApiErrorKind::MissingParameter);
        assert_eq!(param_port(&p, "bad").unwrap_err().kind, ApiErrorKind::IllegalParameter);
        let p = params(&[("port", "0"), ("high", "65536")]);
        assert_eq!(param_port(&p, "port").unwrap_err().kind, ApiErrorKind::IllegalParameter);
        assert_eq!(param_port(&p, "high").unwrap_err().kind, ApiErrorKind::IllegalParameter);
        assert_eq!(param_opt_str(&p, "missing"), "");
    }
}
