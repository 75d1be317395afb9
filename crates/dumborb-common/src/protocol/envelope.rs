//! Call Envelope Types
//!
//! This module defines the JSON envelopes exchanged between a dumborb client
//! and the bridge, together with the stable wire error codes.
//!
//! # Envelope Format
//!
//! - Request: `{"method": "...", "id": ..., "params": [...], "fixups": [...]}`
//! - Success: `{"result": ..., "id": ..., "fixups": [...]}`
//! - Failure: `{"error": {"code": ..., "message": "...", "trace": "...", "data": ...}, "id": ...}`
//!
//! `id` may be any JSON value and is echoed back untouched. `fixups` is only
//! present when the carried value graph contains circular or duplicate
//! references (see [`Fixup`]).
//!
//! # Flat Envelopes
//!
//! In the flat layout every JSON object of the carried graph is moved to a
//! top-level key of the envelope named [`INDEX_PREFIX`] plus a counter, and
//! its original position holds that key as a string:
//!
//! ```json
//! {"result": "_$Inx$_1", "id": 1, "_$Inx$_1": {"$type": "Node", "next": "_$Inx$_1"}}
//! ```
//!
//! Shared and circular objects simply repeat their index, so flat envelopes
//! carry no fixups.
//!
//! # Error Codes
//!
//! - `490`: Application error raised by the invoked member
//! - `590`: Parse error (malformed envelope)
//! - `591`: No method with the requested name and number of arguments
//! - `592`: Arguments could not be unmarshalled
//! - `593`: Result could not be marshalled
//! - `594`: No constructor with the requested number of arguments, or bad fixups
//!
//! # Example
//!
//! ```
//! use dumborb_common::protocol::envelope::{Request, Response, ErrorObject};
//! use serde_json::json;
//!
//! let request = Request::new("calc.add", vec![json!(1), json!(2)]).with_id(json!(7));
//! let response = Response::success(request.id.clone(), json!(3));
//! assert_eq!(response.id, json!(7));
//!
//! let failure = Response::failure(json!(7), ErrorObject::no_method());
//! assert_eq!(failure.error.unwrap().code, 591);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::error::{DumborbError, Result};

/// Application error raised by the invoked member
pub const REMOTE_EXCEPTION: i32 = 490;
/// The request envelope is malformed
pub const PARSE_ERROR: i32 = 590;
/// No method with the requested name and number of arguments
pub const NO_METHOD_ERROR: i32 = 591;
/// An argument could not be unmarshalled
pub const UNMARSHAL_ERROR: i32 = 592;
/// The result could not be marshalled
pub const MARSHAL_ERROR: i32 = 593;
/// No constructor with the requested number of arguments
pub const NO_CONSTRUCTOR_ERROR: i32 = 594;
/// The fixups carried by the envelope are invalid
pub const FIXUP_ERROR: i32 = 594;

/// Reserved key naming the target type of a wire map.
pub const TYPE_HINT: &str = "$type";
/// Hint value for growable lists: `{"$type":"list","list":[...]}`.
pub const LIST_HINT: &str = "list";
/// Hint value for string-keyed maps: `{"$type":"map","map":{...}}`.
pub const MAP_HINT: &str = "map";
/// Hint value for dates: `{"$type":"date","time":<ms>}`.
pub const DATE_HINT: &str = "date";
/// Key tagging a wire map as a reference.
pub const REFERENCE_TAG: &str = "JSONRPCType";
/// Key carrying the handle of a reference.
pub const OBJECT_ID: &str = "objectID";
/// Member name denoting constructor invocation.
pub const CONSTRUCTOR_FLAG: &str = "$constructor";
/// Reserved method enumerating every visible member.
pub const LIST_METHODS: &str = "system.listMethods";
/// Prefix of the envelope keys holding the objects of a flat envelope.
pub const INDEX_PREFIX: &str = "_$Inx$_";

/// Objects of a flat envelope, keyed by index.
pub type FlatObjects = BTreeMap<String, JsonValue>;

fn flat_objects(object: &serde_json::Map<String, JsonValue>) -> FlatObjects {
    object
        .iter()
        .filter(|(key, _)| key.starts_with(INDEX_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// One step into a wire value: an array index or a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

/// A location inside a wire value, relative to the value's root.
///
/// For requests the root is the `params` array, so every path starts with
/// the argument index. For responses the root is `result`.
pub type Path = Vec<PathSegment>;

/// Instruction to replace the value at `location` with the value found at
/// `original`.
///
/// On the wire a fixup is the pair `[location, original]`; the wire value at
/// `location` is a `null` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Path, Path)", into = "(Path, Path)")]
pub struct Fixup {
    pub location: Path,
    pub original: Path,
}

impl Fixup {
    pub fn new(location: Path, original: Path) -> Self {
        Self { location, original }
    }
}

impl From<(Path, Path)> for Fixup {
    fn from((location, original): (Path, Path)) -> Self {
        Self { location, original }
    }
}

impl From<Fixup> for (Path, Path) {
    fn from(fixup: Fixup) -> Self {
        (fixup.location, fixup.original)
    }
}

/// A call envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// `endpoint.member`, `.obj[handle].member` or `system.listMethods`
    pub method: String,
    /// Positional wire arguments
    pub params: Vec<JsonValue>,
    /// Request identifier, echoed back in the response
    #[serde(default)]
    pub id: JsonValue,
    /// Raw fixups, validated lazily by [`Request::fixups`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixups: Option<JsonValue>,
    /// Objects of a flat envelope
    #[serde(flatten)]
    pub objects: FlatObjects,
}

impl Request {
    /// Creates a request with a `null` id and no fixups.
    pub fn new(method: impl Into<String>, params: Vec<JsonValue>) -> Self {
        Self {
            method: method.into(),
            params,
            id: JsonValue::Null,
            fixups: None,
            objects: FlatObjects::new(),
        }
    }

    pub fn with_id(mut self, id: JsonValue) -> Self {
        self.id = id;
        self
    }

    pub fn with_fixups(mut self, fixups: &[Fixup]) -> Self {
        self.fixups = serde_json::to_value(fixups).ok();
        self
    }

    pub fn with_objects(mut self, objects: FlatObjects) -> Self {
        self.objects = objects;
        self
    }

    pub fn is_flat(&self) -> bool {
        !self.objects.is_empty()
    }

    /// Parses an incoming envelope.
    ///
    /// Only `method` and `params` are checked here; fixups and flat objects
    /// are kept raw so a bad fixup list can still be answered with a failure
    /// envelope that carries the request id.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Parse` if the envelope is not an object, `method`
    /// is missing or not a string, or `params` is missing or not an array.
    pub fn parse(envelope: &JsonValue) -> Result<Self> {
        let object = envelope
            .as_object()
            .ok_or_else(|| DumborbError::Parse("envelope is not an object".into()))?;
        let method = object
            .get("method")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DumborbError::Parse("missing or invalid 'method'".into()))?;
        let params = object
            .get("params")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| DumborbError::Parse("missing or invalid 'params'".into()))?;

        Ok(Self {
            method: method.to_string(),
            params: params.clone(),
            id: object.get("id").cloned().unwrap_or(JsonValue::Null),
            fixups: object.get("fixups").filter(|f| !f.is_null()).cloned(),
            objects: flat_objects(object),
        })
    }

    /// Decodes the fixup list carried by this request.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Fixup` if the fixups are not a list of
    /// `[location, original]` path pairs.
    pub fn fixups(&self) -> Result<Vec<Fixup>> {
        match &self.fixups {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| DumborbError::Fixup(e.to_string())),
        }
    }
}

/// Error object carried by a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// One of the error code constants, or a custom application code
    pub code: i32,
    /// Short description of the error
    pub message: String,
    /// Diagnostic trace, only present when the caller asked for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    /// Additional data attached by a custom exception transformer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ErrorObject {
    fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            trace: None,
            data: None,
        }
    }

    /// Create a parse error (590)
    pub fn parse_error(message: &str) -> Self {
        Self::with_code(PARSE_ERROR, message)
    }

    /// Create a no-such-method error (591)
    pub fn no_method() -> Self {
        Self::with_code(
            NO_METHOD_ERROR,
            "method with the requested number of arguments not found (session may have timed out)",
        )
    }

    /// Create a no-such-constructor error (594)
    pub fn no_constructor() -> Self {
        Self::with_code(NO_CONSTRUCTOR_ERROR, "constructor not found")
    }

    /// Create an application error (490)
    ///
    /// # Arguments
    ///
    /// * `message` - Message of the transformed application error
    /// * `trace` - Optional diagnostic trace
    pub fn application(message: impl Into<String>, trace: Option<String>) -> Self {
        Self {
            trace,
            ..Self::with_code(REMOTE_EXCEPTION, message)
        }
    }

    /// Create an error with an arbitrary code and optional data.
    pub fn custom(code: i32, message: impl Into<String>, data: Option<JsonValue>) -> Self {
        Self {
            data,
            ..Self::with_code(code, message)
        }
    }
}

impl From<&DumborbError> for ErrorObject {
    fn from(error: &DumborbError) -> Self {
        match error {
            DumborbError::NoSuchMethod(_) => ErrorObject::no_method(),
            DumborbError::NoSuchConstructor(_) => ErrorObject::no_constructor(),
            other => Self::with_code(other.code(), other.to_string()),
        }
    }
}

/// A response envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: JsonValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixups: Vec<Fixup>,
    /// Objects of a flat result
    #[serde(flatten)]
    pub objects: FlatObjects,
}

impl Response {
    /// Create a success response
    ///
    /// # Arguments
    ///
    /// * `id` - Request identifier (must match the request id)
    /// * `result` - Marshalled result value
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
            fixups: Vec::new(),
            objects: FlatObjects::new(),
        }
    }

    /// Create a failure response
    ///
    /// # Arguments
    ///
    /// * `id` - Request identifier (must match the request id)
    /// * `error` - Error object
    pub fn failure(id: JsonValue, error: ErrorObject) -> Self {
        Self {
            result: None,
            error: Some(error),
            id,
            fixups: Vec::new(),
            objects: FlatObjects::new(),
        }
    }

    pub fn with_fixups(mut self, fixups: Vec<Fixup>) -> Self {
        self.fixups = fixups;
        self
    }

    pub fn with_objects(mut self, objects: FlatObjects) -> Self {
        self.objects = objects;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

// A present `"result": null` must stay `Some(Null)`.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parse() {
        let envelope = json!({"method": "calc.add", "params": [1, 2], "id": "abc"});
        let req = Request::parse(&envelope).unwrap();
        assert_eq!(req.method, "calc.add");
        assert_eq!(req.params, vec![json!(1), json!(2)]);
        assert_eq!(req.id, json!("abc"));
        assert!(req.fixups().unwrap().is_empty());
    }

    #[test]
    fn test_request_parse_missing_method() {
        let err = Request::parse(&json!({"params": []})).unwrap_err();
        assert!(matches!(err, DumborbError::Parse(_)));
        assert_eq!(err.code(), PARSE_ERROR);
    }

    #[test]
    fn test_request_parse_params_not_array() {
        let err = Request::parse(&json!({"method": "a.b", "params": {"x": 1}})).unwrap_err();
        assert!(matches!(err, DumborbError::Parse(_)));
    }

    #[test]
    fn test_request_parse_defaults_id_to_null() {
        let req = Request::parse(&json!({"method": "a.b", "params": []})).unwrap();
        assert_eq!(req.id, JsonValue::Null);
    }

    #[test]
    fn test_request_fixups_decoded() {
        let envelope = json!({
            "method": "a.b",
            "params": [{"x": null}],
            "fixups": [[[0, "x"], [0]]]
        });
        let req = Request::parse(&envelope).unwrap();
        let fixups = req.fixups().unwrap();
        assert_eq!(
            fixups,
            vec![Fixup::new(
                vec![PathSegment::Index(0), PathSegment::Key("x".into())],
                vec![PathSegment::Index(0)],
            )]
        );
    }

    #[test]
    fn test_request_malformed_fixups() {
        let envelope = json!({"method": "a.b", "params": [], "fixups": "nope"});
        let req = Request::parse(&envelope).unwrap();
        let err = req.fixups().unwrap_err();
        assert_eq!(err.code(), FIXUP_ERROR);
    }

    #[test]
    fn test_response_success_serialization() {
        let res = Response::success(json!(1), json!(42));
        let value = res.to_json();
        assert_eq!(value, json!({"result": 42, "id": 1}));
    }

    #[test]
    fn test_response_null_result_survives_deserialization() {
        let res: Response = serde_json::from_str(r#"{"result":null,"id":1}"#).unwrap();
        assert_eq!(res.result, Some(JsonValue::Null));
        assert!(res.is_success());
    }

    #[test]
    fn test_response_failure_serialization() {
        let res = Response::failure(json!(1), ErrorObject::no_method());
        let value = res.to_json();
        assert_eq!(value["error"]["code"], json!(591));
        assert!(value.get("result").is_none());
        assert!(value["error"].get("trace").is_none());
    }

    #[test]
    fn test_response_with_fixups() {
        let res = Response::success(json!(1), json!({"self": null}))
            .with_fixups(vec![Fixup::new(vec!["self".into()], vec![])]);
        let value = res.to_json();
        assert_eq!(value["fixups"], json!([[["self"], []]]));
    }

    #[test]
    fn test_flat_objects_are_top_level_keys() {
        let objects = FlatObjects::from([("_$Inx$_1".to_string(), json!({"v": 1}))]);
        let res = Response::success(json!(1), json!("_$Inx$_1")).with_objects(objects.clone());
        let value = res.to_json();
        assert_eq!(value, json!({"result": "_$Inx$_1", "id": 1, "_$Inx$_1": {"v": 1}}));

        let back: Response = serde_json::from_value(value).unwrap();
        assert_eq!(back.objects, objects);

        let req = Request::parse(&json!({
            "method": "echo.echo",
            "params": ["_$Inx$_1"],
            "jsonrpc": "2.0",
            "_$Inx$_1": {"v": 1}
        }))
        .unwrap();
        assert!(req.is_flat());
        assert_eq!(req.objects, objects);
        assert!(!Request::new("echo.echo", vec![]).is_flat());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorObject::parse_error("bad").code, 590);
        assert_eq!(ErrorObject::no_method().code, 591);
        assert_eq!(ErrorObject::no_constructor().code, 594);
        assert_eq!(ErrorObject::application("boom", None).code, 490);
        assert_eq!(ErrorObject::custom(7, "seven", Some(json!([7]))).data, Some(json!([7])));
    }

    #[test]
    fn test_error_object_from_dumborb_error() {
        let err = DumborbError::Unmarshal("bad int".into());
        let obj = ErrorObject::from(&err);
        assert_eq!(obj.code, UNMARSHAL_ERROR);
        assert!(obj.message.contains("bad int"));

        let obj = ErrorObject::from(&DumborbError::NoSuchConstructor("Foo".into()));
        assert_eq!(obj.message, "constructor not found");
    }
}
