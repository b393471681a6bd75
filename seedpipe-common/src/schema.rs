//! Data-driven schema rules
//!
//! Validation, normalization, identity-key derivation and the shape of the
//! records table are all driven by an ordered list of field rules, loaded
//! from configuration. The built-in default describes the seed/variation
//! domain.

use crate::normalize::content_hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Column names reserved for pipeline bookkeeping on the records table.
pub const RESERVED_COLUMNS: [&str; 5] = [
    "identity_key",
    "source_path",
    "run_id",
    "first_seen_at",
    "updated_at",
];

/// Column holding the pre-normalization text of a normalized field.
pub fn raw_column(name: &str) -> String {
    format!("{}_raw", name)
}

/// Value type a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl FieldKind {
    /// SQLite column type for this kind. Booleans are stored as INTEGER.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::String => "TEXT",
            FieldKind::Integer => "INTEGER",
            FieldKind::Float => "REAL",
            FieldKind::Boolean => "INTEGER",
        }
    }
}

/// One field rule: name, kind and the constraints applied during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    /// Must be present (or defaulted) and non-empty.
    #[serde(default)]
    pub required: bool,
    /// Substituted when the field is absent or null.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Participates in the identity key.
    #[serde(default)]
    pub identity: bool,
    /// Text normalization before storage and key derivation.
    #[serde(default)]
    pub normalize: bool,
    /// Allowed values for a string field, matched case-insensitively and
    /// stored in the casing given here.
    #[serde(default)]
    pub values: Option<Vec<String>>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldRule {
            name: name.into(),
            kind,
            required: false,
            default: None,
            identity: false,
            normalize: false,
            values: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = Some(values);
        self
    }
}

/// The ordered rule set for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRules {
    pub fields: Vec<FieldRule>,
    /// Collapse runs of 3+ identical characters during normalization.
    #[serde(default)]
    pub collapse_repeats: bool,
}

impl SchemaRules {
    /// The built-in seed/variation rule set, used when configuration
    /// carries no `[schema]` section.
    pub fn seed_default() -> Self {
        SchemaRules {
            fields: vec![
                FieldRule::new("seed", FieldKind::String)
                    .required()
                    .identity()
                    .normalized(),
                FieldRule::new("variation", FieldKind::String)
                    .required()
                    .identity()
                    .normalized(),
                FieldRule::new("miner", FieldKind::String),
                FieldRule::new("score", FieldKind::Float),
            ],
            collapse_repeats: false,
        }
    }

    /// Look up a rule by field name.
    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Rules marked as identity-key participants, in declaration order.
    pub fn identity_fields(&self) -> Vec<&FieldRule> {
        self.fields.iter().filter(|f| f.identity).collect()
    }

    /// Whether the rule set carries the seed domain the seed endpoints
    /// query against.
    pub fn has_seed_domain(&self) -> bool {
        matches!(self.field("seed"), Some(rule) if rule.kind == FieldKind::String)
            && matches!(self.field("variation"), Some(rule) if rule.kind == FieldKind::String)
    }

    /// Check the rule set for problems that would corrupt the records
    /// table or the SQL built from it.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::Config(
                "schema requires at least one field".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for rule in &self.fields {
            if !valid_field_name(&rule.name) {
                return Err(Error::Config(format!(
                    "invalid field name {:?}: expected [a-z_][a-z0-9_]*",
                    rule.name
                )));
            }
            if RESERVED_COLUMNS.contains(&rule.name.as_str()) {
                return Err(Error::Config(format!(
                    "field name {:?} is reserved",
                    rule.name
                )));
            }
            if rule.name.ends_with("_raw") {
                return Err(Error::Config(format!(
                    "field name {:?} collides with raw-text columns",
                    rule.name
                )));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate field name {:?}",
                    rule.name
                )));
            }
            if rule.normalize && rule.kind != FieldKind::String {
                return Err(Error::Config(format!(
                    "field {:?}: normalize applies only to string fields",
                    rule.name
                )));
            }
            if rule.values.is_some() && rule.kind != FieldKind::String {
                return Err(Error::Config(format!(
                    "field {:?}: allowed values apply only to string fields",
                    rule.name
                )));
            }
            if rule.values.is_some() && rule.normalize {
                return Err(Error::Config(format!(
                    "field {:?}: allowed values and normalize are mutually exclusive",
                    rule.name
                )));
            }
            if let Some(default) = &rule.default {
                if !default_matches_kind(rule.kind, default) {
                    return Err(Error::Config(format!(
                        "field {:?}: default value does not match kind",
                        rule.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Derive the identity key for a validated value map.
    ///
    /// Fields marked `identity` feed the key; when none are marked, every
    /// field does, making the key a content hash of the whole record.
    /// Values must already be normalized.
    pub fn identity_key(&self, values: &BTreeMap<String, FieldValue>) -> String {
        let identity = self.identity_fields();
        let sources: Vec<&FieldRule> = if identity.is_empty() {
            self.fields.iter().collect()
        } else {
            identity
        };

        let mut material = String::new();
        for rule in sources {
            material.push_str(&rule.name);
            material.push('\u{1f}');
            if let Some(value) = values.get(&rule.name) {
                material.push_str(&value.canonical_text());
            }
            material.push('\u{1f}');
        }

        content_hash(&material)
    }
}

fn valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn default_matches_kind(kind: FieldKind, value: &serde_json::Value) -> bool {
    match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => value.as_i64().is_some(),
        FieldKind::Float => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
    }
}

/// A validated field value, typed per its rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Null,
}

impl FieldValue {
    /// Canonical text form used as identity-key material.
    pub fn canonical_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Real(f) => f.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

/// One validated record: values keyed by field name plus the derived
/// identity key and provenance.
#[derive(Debug, Clone)]
pub struct Record {
    pub identity_key: String,
    pub values: BTreeMap<String, FieldValue>,
    /// Pre-normalization text, present for normalized fields only.
    pub raw_texts: BTreeMap<String, String>,
    pub source_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn seed_default_is_valid_and_has_seed_domain() {
        let rules = SchemaRules::seed_default();
        rules.validate().unwrap();
        assert!(rules.has_seed_domain());
        assert_eq!(rules.identity_fields().len(), 2);
    }

    #[test]
    fn rejects_reserved_and_malformed_names() {
        let mut rules = SchemaRules::seed_default();
        rules.fields.push(FieldRule::new("run_id", FieldKind::String));
        assert!(rules.validate().is_err());

        let rules = SchemaRules {
            fields: vec![FieldRule::new("Bad-Name", FieldKind::String)],
            collapse_repeats: false,
        };
        assert!(rules.validate().is_err());

        let rules = SchemaRules {
            fields: vec![FieldRule::new("seed_raw", FieldKind::String)],
            collapse_repeats: false,
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_fields_and_empty_rule_sets() {
        let rules = SchemaRules {
            fields: vec![
                FieldRule::new("seed", FieldKind::String),
                FieldRule::new("seed", FieldKind::Integer),
            ],
            collapse_repeats: false,
        };
        assert!(rules.validate().is_err());

        let rules = SchemaRules {
            fields: vec![],
            collapse_repeats: false,
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn rejects_normalize_on_non_string_fields() {
        let rules = SchemaRules {
            fields: vec![FieldRule::new("count", FieldKind::Integer).normalized()],
            collapse_repeats: false,
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_defaults() {
        let rules = SchemaRules {
            fields: vec![FieldRule::new("count", FieldKind::Integer)
                .with_default(serde_json::json!("five"))],
            collapse_repeats: false,
        };
        assert!(rules.validate().is_err());

        let rules = SchemaRules {
            fields: vec![FieldRule::new("count", FieldKind::Integer)
                .with_default(serde_json::json!(5))],
            collapse_repeats: false,
        };
        rules.validate().unwrap();
    }

    #[test]
    fn identity_key_uses_marked_fields_only() {
        let rules = SchemaRules::seed_default();
        let a = rules.identity_key(&values(&[
            ("seed", FieldValue::Text("michael".into())),
            ("variation", FieldValue::Text("mike".into())),
            ("miner", FieldValue::Text("m1".into())),
        ]));
        let b = rules.identity_key(&values(&[
            ("seed", FieldValue::Text("michael".into())),
            ("variation", FieldValue::Text("mike".into())),
            ("miner", FieldValue::Text("m2".into())),
        ]));
        assert_eq!(a, b);

        let c = rules.identity_key(&values(&[
            ("seed", FieldValue::Text("michael".into())),
            ("variation", FieldValue::Text("mick".into())),
        ]));
        assert_ne!(a, c);
    }

    #[test]
    fn identity_key_falls_back_to_all_fields() {
        let rules = SchemaRules {
            fields: vec![
                FieldRule::new("a", FieldKind::String),
                FieldRule::new("b", FieldKind::Integer),
            ],
            collapse_repeats: false,
        };
        let x = rules.identity_key(&values(&[
            ("a", FieldValue::Text("x".into())),
            ("b", FieldValue::Integer(1)),
        ]));
        let y = rules.identity_key(&values(&[
            ("a", FieldValue::Text("x".into())),
            ("b", FieldValue::Integer(2)),
        ]));
        assert_ne!(x, y);
    }

    #[test]
    fn identity_key_distinguishes_missing_from_empty_adjacent() {
        let rules = SchemaRules {
            fields: vec![
                FieldRule::new("a", FieldKind::String).identity(),
                FieldRule::new("b", FieldKind::String).identity(),
            ],
            collapse_repeats: false,
        };
        let joined = rules.identity_key(&values(&[
            ("a", FieldValue::Text("xy".into())),
            ("b", FieldValue::Text("".into())),
        ]));
        let split = rules.identity_key(&values(&[
            ("a", FieldValue::Text("x".into())),
            ("b", FieldValue::Text("y".into())),
        ]));
        assert_ne!(joined, split);
    }
}
