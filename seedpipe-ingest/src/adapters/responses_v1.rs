//! Miner response documents
//!
//! Shape: `{"responses": {<key>: {"hotkey": <id>, "uid": <n>, "variations":
//! {seed: [variation, ..]}}}}`. Yields one `{seed, variation, miner}`
//! document per (seed, variation) pair. The miner id prefers the hotkey
//! field and falls back to the uid field; when neither is present the
//! document carries no miner. Malformed carriers and empty variations are
//! skipped; only a missing top-level `responses` object is reported.

use super::{AdapterOutput, RawDocument};
use serde_json::{Map, Value};

pub(super) fn adapt(doc: &Value) -> AdapterOutput {
    let mut out = AdapterOutput::default();

    let responses = match doc.get("responses").and_then(Value::as_object) {
        Some(responses) => responses,
        None => {
            out.shape_errors
                .push((0, "missing top-level responses object".to_string()));
            return out;
        }
    };

    for response in responses.values() {
        let response = match response.as_object() {
            Some(response) => response,
            None => continue,
        };

        let miner = response
            .get("hotkey")
            .and_then(id_text)
            .or_else(|| response.get("uid").and_then(id_text));

        let variations = match response.get("variations").and_then(Value::as_object) {
            Some(variations) => variations,
            None => continue,
        };

        for (seed, variants) in variations {
            let variants = match variants.as_array() {
                Some(variants) => variants,
                None => continue,
            };

            for variant in variants {
                let empty = match variant {
                    Value::Null => true,
                    Value::String(text) => text.trim().is_empty(),
                    _ => false,
                };
                if empty {
                    continue;
                }
                out.documents.push(pair(seed, variant, miner.as_deref()));
            }
        }
    }

    out
}

/// Miner ids arrive as ss58 strings or bare numeric uids.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pair(seed: &str, variation: &Value, miner: Option<&str>) -> RawDocument {
    let mut document = Map::new();
    document.insert("seed".to_string(), Value::String(seed.to_string()));
    document.insert("variation".to_string(), variation.clone());
    if let Some(miner) = miner {
        document.insert("miner".to_string(), Value::String(miner.to_string()));
    }
    document
}

#[cfg(test)]
mod tests {
    use super::super::Adapter;
    use serde_json::json;

    #[test]
    fn yields_one_document_per_seed_variation_pair() {
        let out = Adapter::ResponsesV1.adapt(&json!({
            "responses": {
                "12": {
                    "hotkey": "5F3x",
                    "variations": {
                        "michael": ["Mike", "Mick"],
                        "robert": ["Bob"]
                    }
                }
            }
        }));

        assert_eq!(out.documents.len(), 3);
        assert!(out.shape_errors.is_empty());
        assert!(out
            .documents
            .iter()
            .all(|d| d["miner"] == json!("5F3x")));
        let seeds: Vec<&str> = out
            .documents
            .iter()
            .map(|d| d["seed"].as_str().unwrap())
            .collect();
        assert!(seeds.contains(&"michael"));
        assert!(seeds.contains(&"robert"));
    }

    #[test]
    fn falls_back_to_the_uid_field_when_hotkey_is_absent_or_blank() {
        let out = Adapter::ResponsesV1.adapt(&json!({
            "responses": {
                "a": {"uid": 42, "variations": {"seed": ["x"]}},
                "b": {"hotkey": "  ", "uid": "43", "variations": {"seed": ["y"]}}
            }
        }));

        let miners: Vec<&str> = out
            .documents
            .iter()
            .map(|d| d["miner"].as_str().unwrap())
            .collect();
        assert!(miners.contains(&"42"));
        assert!(miners.contains(&"43"));
    }

    #[test]
    fn document_omits_miner_when_no_id_is_present() {
        let out = Adapter::ResponsesV1.adapt(&json!({
            "responses": {"x": {"variations": {"seed": ["mike"]}}}
        }));

        assert_eq!(out.documents.len(), 1);
        assert!(!out.documents[0].contains_key("miner"));
    }

    #[test]
    fn skips_malformed_carriers_and_empty_variations() {
        let out = Adapter::ResponsesV1.adapt(&json!({
            "responses": {
                "1": "not an object",
                "2": {"variations": "not an object"},
                "3": {"variations": {"seed": "not a list"}},
                "4": {"variations": {"seed": ["ok", "", "  ", null]}}
            }
        }));

        assert_eq!(out.documents.len(), 1);
        assert_eq!(out.documents[0]["variation"], "ok");
        assert!(out.shape_errors.is_empty());
    }

    #[test]
    fn non_string_variants_pass_through_for_validation_to_reject() {
        let out = Adapter::ResponsesV1.adapt(&json!({
            "responses": {"m": {"variations": {"seed": [17, "ok"]}}}
        }));

        assert_eq!(out.documents.len(), 2);
        assert_eq!(out.documents[0]["variation"], json!(17));
        assert_eq!(out.documents[1]["variation"], "ok");
    }

    #[test]
    fn missing_responses_object_is_reported() {
        let out = Adapter::ResponsesV1.adapt(&json!({"data": {}}));
        assert!(out.documents.is_empty());
        assert_eq!(out.shape_errors.len(), 1);
    }
}
