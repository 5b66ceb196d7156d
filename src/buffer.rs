//! # Edit Buffer
//!
//! Holds the working draft next to the baseline it was derived from, and implements the
//! one merge rule every edit goes through.
//!
//! ## Merge rule
//!
//! [`merge`] is a shallow, per-key overwrite:
//! - a key present in the patch replaces the draft's value wholesale (nested objects and
//!   arrays are **not** deep-merged),
//! - a `null` value removes the key,
//! - keys absent from the patch are left alone.
//!
//! The draft is always an owned copy. Mutating it never reaches the confirmed resource.

use crate::machine::Edit;
use serde_json::{Map, Value};

/// The empty draft used for the `template` branch.
pub fn empty_form() -> Value {
    Value::Object(Map::new())
}

/// Applies `patch` on top of `current` and returns the merged object.
///
/// Non-object inputs are treated as empty objects.
///
/// ```
/// use nucleon::buffer::merge;
/// use serde_json::json;
///
/// let draft = json!({ "name": "a", "address": { "city": "x", "zip": "1" } });
/// let merged = merge(&draft, &json!({ "name": null, "address": { "city": "y" } }));
/// assert_eq!(merged, json!({ "address": { "city": "y" } }));
/// ```
pub fn merge(current: &Value, patch: &Value) -> Value {
    let mut merged = match current {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(patch) = patch {
        for (key, value) in patch {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(merged)
}

/// The draft ("form") and its last clean value.
#[derive(Debug, Clone, PartialEq)]
pub struct EditBuffer {
    draft: Value,
    last_clean: Value,
    dirty: bool,
}

impl Default for EditBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EditBuffer {
    pub fn new() -> Self {
        Self {
            draft: empty_form(),
            last_clean: empty_form(),
            dirty: false,
        }
    }

    pub fn draft(&self) -> &Value {
        &self.draft
    }

    pub fn last_clean(&self) -> &Value {
        &self.last_clean
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn edit_state(&self) -> Edit {
        if self.dirty {
            Edit::Dirty
        } else {
            Edit::Clean
        }
    }

    /// `true` when the draft has no keys at all.
    pub fn is_empty_draft(&self) -> bool {
        match &self.draft {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    /// Merges `patch` into the draft. Returns `false` (and changes nothing) when the patch
    /// is not a JSON object.
    pub fn edit(&mut self, patch: &Value) -> bool {
        if !patch.is_object() {
            return false;
        }
        self.draft = merge(&self.draft, patch);
        self.dirty = true;
        true
    }

    /// Discards local edits.
    pub fn undo(&mut self) {
        self.draft = self.last_clean.clone();
        self.dirty = false;
    }

    /// Moves the baseline after an externally pushed update.
    ///
    /// A clean draft follows the new baseline; a dirty draft keeps its local edits.
    pub fn reset_clean(&mut self, baseline: Option<&Value>) {
        self.last_clean = baseline.cloned().unwrap_or_else(empty_form);
        if !self.dirty {
            self.draft = self.last_clean.clone();
        }
    }

    /// Replaces both baseline and draft, dropping any local edits.
    pub fn commit(&mut self, baseline: Option<&Value>) {
        self.last_clean = baseline.cloned().unwrap_or_else(empty_form);
        self.draft = self.last_clean.clone();
        self.dirty = false;
    }
}
