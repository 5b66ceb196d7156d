//! # Validation Engine
//!
//! An ordered list of pure rules evaluated against the draft. Each rule either accepts the
//! draft or yields an error code shaped `<field-path>:<reason>`. The engine collects every
//! code, in rule order, duplicates included; views filter the list by prefix to show
//! field-level messages.
//!
//! ```
//! use nucleon::validation::{rules, Validator};
//! use serde_json::json;
//!
//! let validator = Validator::new()
//!     .with_rule(rules::required("name"))
//!     .with_rule(rules::max_length("name", 3));
//!
//! assert_eq!(validator.validate(&json!({})), vec!["name:v8n_required"]);
//! assert_eq!(validator.validate(&json!({ "name": "abcd" })), vec!["name:v8n_too_long"]);
//! assert!(validator.validate(&json!({ "name": "abc" })).is_empty());
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A single predicate: `Ok(())` accepts the draft, `Err(code)` rejects it.
pub type Rule = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// The outcome of running the engine against one draft.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    pub errors: Vec<String>,
    pub valid: bool,
}

/// Ordered rule set shared by every clone of a controller.
#[derive(Clone, Default)]
pub struct Validator {
    rules: Vec<Rule>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Rules run in the order they were added.
    pub fn with_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Every rejection code, in rule order.
    pub fn validate(&self, draft: &Value) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|rule| rule(draft).err())
            .collect()
    }

    /// Runs the rules and applies the empty-draft policy.
    ///
    /// With at least one rule, the draft is valid exactly when no code was produced.
    /// Without rules, only an empty draft can be invalid, and only when `allow_empty`
    /// is off.
    pub fn evaluate(&self, draft: &Value, allow_empty: bool) -> Evaluation {
        let errors = self.validate(draft);
        let valid = if self.rules.is_empty() {
            allow_empty || !is_empty_value(draft)
        } else {
            errors.is_empty()
        };
        Evaluation { errors, valid }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Ready-made rules for the common field checks.
pub mod rules {
    use serde_json::Value;

    fn lookup<'a>(draft: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.')
            .try_fold(draft, |value, key| value.get(key))
            .filter(|value| !value.is_null())
    }

    /// `<path>:v8n_required` unless the field holds a non-empty value.
    pub fn required(path: &str) -> impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static {
        let path = path.to_string();
        move |draft| match lookup(draft, &path) {
            Some(Value::String(s)) if s.trim().is_empty() => Err(format!("{path}:v8n_required")),
            Some(_) => Ok(()),
            None => Err(format!("{path}:v8n_required")),
        }
    }

    /// `<path>:v8n_too_long` when a string field exceeds `max` characters.
    pub fn max_length(
        path: &str,
        max: usize,
    ) -> impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static {
        let path = path.to_string();
        move |draft| match lookup(draft, &path) {
            Some(Value::String(s)) if s.chars().count() > max => {
                Err(format!("{path}:v8n_too_long"))
            }
            _ => Ok(()),
        }
    }

    /// `<path>:v8n_invalid_email` when a present string does not look like an address.
    pub fn email(path: &str) -> impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static {
        let path = path.to_string();
        move |draft| match lookup(draft, &path) {
            Some(Value::String(s)) => {
                let looks_ok = s
                    .split_once('@')
                    .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
                    .unwrap_or(false);
                if looks_ok {
                    Ok(())
                } else {
                    Err(format!("{path}:v8n_invalid_email"))
                }
            }
            _ => Ok(()),
        }
    }
}
