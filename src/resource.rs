//! Helpers for reading hypermedia resources.
//!
//! Resources stay opaque [`serde_json::Value`]s. The only structure the controller relies
//! on is the self link and the `_embedded` collections, both HAL conventions.

use serde_json::Value;

/// The resource's own URI: `_links.self.href`, falling back to a top-level `self` string.
pub fn self_link(resource: &Value) -> Option<&str> {
    resource
        .pointer("/_links/self/href")
        .and_then(Value::as_str)
        .or_else(|| resource.get("self").and_then(Value::as_str))
}

/// Replaces (or removes, when `replacement` is `None`) the embedded resource whose self
/// link is `url`. Returns `true` when something changed.
pub fn replace_embedded(collection: &mut Value, url: &str, replacement: Option<&Value>) -> bool {
    let Some(embedded) = collection
        .get_mut("_embedded")
        .and_then(Value::as_object_mut)
    else {
        return false;
    };

    let mut changed = false;
    for members in embedded.values_mut() {
        match members {
            Value::Array(items) => {
                let Some(index) = items.iter().position(|item| self_link(item) == Some(url)) else {
                    continue;
                };
                match replacement {
                    Some(value) => items[index] = value.clone(),
                    None => {
                        items.remove(index);
                    }
                }
                changed = true;
            }
            single => {
                if self_link(single) != Some(url) {
                    continue;
                }
                if let Some(value) = replacement {
                    *single = value.clone();
                    changed = true;
                }
            }
        }
    }
    changed
}
