//! # Rumour: cross-instance notification
//!
//! A publish/subscribe channel partitioned by group. After a successful write, a
//! controller announces "the resource at this URL now looks like X" (or "is gone"), and
//! every other controller subscribed to the same group decides for itself whether that
//! matters to it. There is no shared cache: each controller still owns its own data.
//!
//! ## Delivery guarantees
//!
//! - Synchronous, in subscription order, to every listener of the publishing group.
//! - Groups are isolated from each other.
//! - A panicking listener is logged and skipped; the rest still hear the notice.
//! - The registry lock is released before any listener runs, so a listener may publish
//!   (or subscribe, or unsubscribe) while handling a notice.
//!
//! ```
//! use nucleon::rumour::{Notice, Rumour};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let rumour = Rumour::new();
//! let heard = Arc::new(AtomicUsize::new(0));
//! let counter = heard.clone();
//! let _subscription = rumour.subscribe(
//!     "g",
//!     |notice: &Notice| notice.url.starts_with("/items/"),
//!     move |_: &Notice| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     },
//! );
//!
//! rumour.publish("g", Notice::gone("/items/1"));
//! rumour.publish("other", Notice::gone("/items/1"));
//! assert_eq!(heard.load(Ordering::SeqCst), 1);
//! ```

use crate::sync::lock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

/// "The resource at `url` is now `data`" (or gone, when `data` is `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    /// Identifies the publisher so it can ignore its own notices. `0` means anonymous.
    pub source: u64,
    pub url: String,
    pub data: Option<Value>,
    /// Other URLs affected by the change, typically the collection the resource lives in.
    pub related: Vec<String>,
}

impl Notice {
    pub fn updated(url: impl Into<String>, data: Value) -> Self {
        Self {
            source: 0,
            url: url.into(),
            data: Some(data),
            related: Vec::new(),
        }
    }

    pub fn gone(url: impl Into<String>) -> Self {
        Self {
            source: 0,
            url: url.into(),
            data: None,
            related: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: u64) -> Self {
        self.source = source;
        self
    }

    /// Adds a related URL; empty strings are skipped.
    pub fn with_related(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() && !self.related.contains(&url) {
            self.related.push(url);
        }
        self
    }
}

type Matcher = Arc<dyn Fn(&Notice) -> bool + Send + Sync>;
type Callback = Arc<dyn Fn(&Notice) + Send + Sync>;

struct Listener {
    id: u64,
    matcher: Matcher,
    on_match: Callback,
}

#[derive(Default)]
struct Registry {
    groups: HashMap<String, Vec<Listener>>,
    next_id: u64,
}

/// The bus. Clones share the same registry.
#[derive(Clone, Default)]
pub struct Rumour {
    registry: Arc<Mutex<Registry>>,
}

impl Rumour {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener under `group`.
    ///
    /// `on_match` runs for every notice published to the group for which `matcher`
    /// returns `true`. The listener stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<M, F>(&self, group: &str, matcher: M, on_match: F) -> Subscription
    where
        M: Fn(&Notice) -> bool + Send + Sync + 'static,
        F: Fn(&Notice) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .groups
            .entry(group.to_string())
            .or_default()
            .push(Listener {
                id,
                matcher: Arc::new(matcher),
                on_match: Arc::new(on_match),
            });
        debug!(group, id, "Subscribed");

        Subscription {
            id,
            group: group.to_string(),
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `notice` to the matching listeners of `group` and returns how many
    /// handled it without panicking.
    pub fn publish(&self, group: &str, notice: Notice) -> usize {
        let listeners: Vec<(u64, Matcher, Callback)> = {
            let registry = lock(&self.registry);
            registry
                .groups
                .get(group)
                .map(|listeners| {
                    listeners
                        .iter()
                        .map(|l| (l.id, l.matcher.clone(), l.on_match.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        debug!(group, url = %notice.url, listeners = listeners.len(), "Publishing");

        let mut delivered = 0;
        for (id, matcher, on_match) in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                if matcher(&notice) {
                    on_match(&notice);
                    true
                } else {
                    false
                }
            }));
            match outcome {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(_) => warn!(group, id, url = %notice.url, "Listener panicked"),
            }
        }
        delivered
    }

    /// Number of live listeners in `group`.
    pub fn listener_count(&self, group: &str) -> usize {
        lock(&self.registry)
            .groups
            .get(group)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    group: String,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Explicit form of dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        if let Some(listeners) = registry.groups.get_mut(&self.group) {
            listeners.retain(|listener| listener.id != self.id);
            if listeners.is_empty() {
                registry.groups.remove(&self.group);
            }
        }
        debug!(group = %self.group, id = self.id, "Unsubscribed");
    }
}
