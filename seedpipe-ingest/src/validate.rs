//! Schema-rule validation
//!
//! Applies the active rule set to one raw document at a time: defaulting,
//! required checks, type checks, allowed values, text normalization and
//! identity-key derivation. Failures are reported per record; siblings in
//! the same file are unaffected. Fields the rule set does not declare are
//! ignored.

use crate::adapters::{json_type_name, RawDocument};
use seedpipe_common::normalize::normalize_text;
use seedpipe_common::schema::{FieldKind, FieldRule, FieldValue, Record, SchemaRules};
use serde_json::Value;
use std::collections::BTreeMap;

/// Why one record failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationFailure {
    fn on(field: &FieldRule, message: impl Into<String>) -> Self {
        ValidationFailure {
            field: Some(field.name.clone()),
            message: message.into(),
        }
    }
}

/// Validate one raw document against the rule set.
pub fn validate_document(
    rules: &SchemaRules,
    document: &RawDocument,
    source_path: &str,
) -> Result<Record, ValidationFailure> {
    let mut values = BTreeMap::new();
    let mut raw_texts = BTreeMap::new();

    for rule in &rules.fields {
        let provided = document.get(&rule.name).filter(|v| !v.is_null());
        let value = match provided {
            Some(value) => value.clone(),
            None => match &rule.default {
                Some(default) => default.clone(),
                None => {
                    if rule.required {
                        return Err(ValidationFailure::on(rule, "required field is missing"));
                    }
                    values.insert(rule.name.clone(), FieldValue::Null);
                    continue;
                }
            },
        };

        let typed = coerce(rule, &value).map_err(|message| ValidationFailure::on(rule, message))?;

        let typed = match typed {
            FieldValue::Text(text) if rule.normalize => {
                let normalized = normalize_text(&text, rules.collapse_repeats);
                if rule.required && normalized.is_empty() {
                    return Err(ValidationFailure::on(rule, "required field is empty"));
                }
                raw_texts.insert(rule.name.clone(), text.trim().to_string());
                FieldValue::Text(normalized)
            }
            FieldValue::Text(text) if rule.required && text.trim().is_empty() => {
                return Err(ValidationFailure::on(rule, "required field is empty"));
            }
            other => other,
        };

        values.insert(rule.name.clone(), typed);
    }

    let identity_key = rules.identity_key(&values);

    Ok(Record {
        identity_key,
        values,
        raw_texts,
        source_path: source_path.to_string(),
    })
}

fn coerce(rule: &FieldRule, value: &Value) -> Result<FieldValue, String> {
    match rule.kind {
        FieldKind::String => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("expected a string, got {}", json_type_name(value)))?;

            if let Some(allowed) = &rule.values {
                let trimmed = text.trim();
                return allowed
                    .iter()
                    .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
                    .map(|canonical| FieldValue::Text(canonical.clone()))
                    .ok_or_else(|| format!("value {:?} is not in the allowed set", text));
            }

            Ok(FieldValue::Text(text.to_string()))
        }
        FieldKind::Integer => match value.as_i64() {
            Some(i) => Ok(FieldValue::Integer(i)),
            None if value.is_number() => {
                Err("expected an integer, got a non-integer number".to_string())
            }
            None => Err(format!("expected an integer, got {}", json_type_name(value))),
        },
        FieldKind::Float => match value.as_f64() {
            Some(f) => Ok(FieldValue::Real(f)),
            None => Err(format!("expected a number, got {}", json_type_name(value))),
        },
        FieldKind::Boolean => match value.as_bool() {
            Some(b) => Ok(FieldValue::Boolean(b)),
            None => Err(format!("expected a boolean, got {}", json_type_name(value))),
        },
    }
}
