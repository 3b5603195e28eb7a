use serde_json::{Map, Value as JsonValue};
use stitching_runtime::{AbortSignal, Context, GraphqlError};

use crate::operation::Operation;

/// An operation against the logical schema, in the GraphQL-over-HTTP shape.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "query")]
    pub document: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: Map<String, JsonValue>,
    /// Already parsed operation. When set, `document` and `operation_name` are not read.
    #[serde(skip)]
    pub operation: Option<Operation>,
    /// Handed to every executor call.
    #[serde(skip)]
    pub context: Context,
    #[serde(skip)]
    pub abort: AbortSignal,
}

fn deserialize_variables<'de, D>(deserializer: D) -> Result<Map<String, JsonValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(<Option<Map<String, JsonValue>> as serde::Deserialize>::deserialize(deserializer)?.unwrap_or_default())
}

impl Request {
    pub fn new(document: impl Into<String>) -> Self {
        Request {
            document: document.into(),
            ..Default::default()
        }
    }

    /// A request for an operation parsed ahead of time, e.g. a persisted one.
    pub fn from_operation(operation: Operation) -> Self {
        Request {
            operation_name: operation.name.clone(),
            operation: Some(operation),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    /// Anything but a JSON object is ignored.
    #[must_use]
    pub fn variables(mut self, variables: JsonValue) -> Self {
        if let JsonValue::Object(variables) = variables {
            self.variables = variables;
        }
        self
    }

    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Response {
    pub data: Option<Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
}

impl Response {
    pub fn from_error(error: impl Into<GraphqlError>) -> Self {
        Response {
            data: None,
            errors: vec![error.into()],
        }
    }

    /// `data` as a JSON value, `null` when absent.
    pub fn data_json(&self) -> JsonValue {
        self.data.clone().map(JsonValue::Object).unwrap_or_default()
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_default()
    }
}
