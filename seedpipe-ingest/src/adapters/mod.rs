//! Input document adapters
//!
//! An adapter maps one parsed JSON document to zero or more raw field-map
//! documents. `records-v1` takes field maps as-is; `responses-v1` unpacks
//! the miner response format into seed/variation pairs.

mod records_v1;
mod responses_v1;

use serde_json::Value;

/// A field map as decoded from the file, before validation.
pub type RawDocument = serde_json::Map<String, Value>;

/// What adapting one top-level JSON document produced.
#[derive(Debug, Default)]
pub struct AdapterOutput {
    pub documents: Vec<RawDocument>,
    /// Per-element shape problems: element index within the file, message.
    pub shape_errors: Vec<(usize, String)>,
}

/// Named document adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Adapter {
    /// A JSON array of field maps (one record per element) or one field map.
    #[value(name = "records-v1")]
    RecordsV1,
    /// Miner responses: variations listed per seed, one record per pair.
    #[value(name = "responses-v1")]
    ResponsesV1,
}

impl Adapter {
    pub fn name(&self) -> &'static str {
        match self {
            Adapter::RecordsV1 => "records-v1",
            Adapter::ResponsesV1 => "responses-v1",
        }
    }

    /// Map one parsed document to raw records.
    pub fn adapt(&self, doc: &Value) -> AdapterOutput {
        match self {
            Adapter::RecordsV1 => records_v1::adapt(doc),
            Adapter::ResponsesV1 => responses_v1::adapt(doc),
        }
    }
}

impl Default for Adapter {
    fn default() -> Self {
        Adapter::RecordsV1
    }
}

impl std::fmt::Display for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Short JSON type name for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
