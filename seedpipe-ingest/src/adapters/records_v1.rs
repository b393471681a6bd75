//! Plain field-map documents
//!
//! A JSON array yields one record per object element; a single JSON object
//! yields one record. Anything else is a shape error against the element
//! that carried it, so one stray element never rejects its siblings.

use super::{json_type_name, AdapterOutput};
use serde_json::Value;

pub(super) fn adapt(doc: &Value) -> AdapterOutput {
    let mut out = AdapterOutput::default();

    match doc {
        Value::Object(map) => out.documents.push(map.clone()),
        Value::Array(elements) => {
            for (index, element) in elements.iter().enumerate() {
                match element {
                    Value::Object(map) => out.documents.push(map.clone()),
                    other => out.shape_errors.push((
                        index,
                        format!("expected an object, got {}", json_type_name(other)),
                    )),
                }
            }
        }
        other => out.shape_errors.push((
            0,
            format!(
                "expected an object or an array of objects, got {}",
                json_type_name(other)
            ),
        )),
    }

    out
}
