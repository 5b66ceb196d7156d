//! Controller configuration.

use serde::{Deserialize, Serialize};

/// Where a controller points and how it behaves.
///
/// | Option | Default | Description |
/// |--------|---------|-------------|
/// | `href` | `""` | The single resource to bind to; non-empty starts a GET on construction |
/// | `parent` | `""` | Collection URI new resources are POSTed to |
/// | `group` | `""` | Notification routing key; empty disables notifications |
/// | `allow_empty` | `false` | With no validation rules, whether an empty draft counts as valid |
/// | `headers` | none | Extra headers sent with every request |
///
/// Both struct-update syntax and the `with_*` builders work:
///
/// ```
/// use nucleon::ControllerConfig;
///
/// let a = ControllerConfig {
///     parent: "/customers".to_string(),
///     group: "customers".to_string(),
///     ..Default::default()
/// };
/// let b = ControllerConfig::default()
///     .with_parent("/customers")
///     .with_group("customers");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub href: String,
    pub parent: String,
    pub group: String,
    pub allow_empty: bool,
    pub headers: Vec<(String, String)>,
}

impl ControllerConfig {
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{ "href": "/items/1", "group": "items" }"#).unwrap();
        assert_eq!(
            config,
            ControllerConfig::default()
                .with_href("/items/1")
                .with_group("items")
        );
        assert!(!config.allow_empty);
    }
}
