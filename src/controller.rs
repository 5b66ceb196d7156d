//! # Resource Controller
//!
//! A [`Controller`] binds one view to exactly one hypermedia resource. It owns the
//! confirmed data, the draft, the validation errors and the lifecycle [`State`], and it
//! is the only thing allowed to talk to the [`Gateway`] on that resource's behalf.
//!
//! ## Architecture Note
//!
//! The controller is a cheap-to-clone handle around shared state. Every public operation
//! is synchronous: it takes the lock, runs the pure [`transition`] function, and returns.
//! Operations that need the network spawn a Tokio task that performs the request and
//! then reports back through `settle`. That task holds only a weak reference, so a
//! controller dropped mid-request simply never hears the answer.
//!
//! The runtime is captured once, at construction. After that any thread may drive the
//! controller, inside a runtime or not.
//!
//! ### Supersession
//!
//! Each operation that starts (or cancels) network work bumps a generation counter. A
//! response is applied only if its generation is still current; anything else is a
//! stale answer to a question nobody is asking anymore, and is discarded.
//!
//! ### Notifications
//!
//! After a successful write the controller publishes a [`Notice`] on its group. The bus
//! is always called after the lock is released, so a listener reacting to the notice
//! (including another controller) never contends with the publisher.
//!
//! A notice naming this controller's `href` or `parent` as related marks it stale. The
//! next [`data`](Controller::data) or [`form`](Controller::form) read returns what is
//! held and starts a re-fetch; nothing is fetched until someone reads.
//!
//! ## Example
//!
//! ```rust
//! use nucleon::transport::mock::MockTransport;
//! use nucleon::transport::{Gateway, Method};
//! use nucleon::{Controller, ControllerConfig, Rumour, Validator};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     mock.expect(Method::Get, "/items/1")
//!         .return_json(200, json!({ "name": "a" }));
//!
//!     let controller = Controller::new(
//!         ControllerConfig::default().with_href("/items/1"),
//!         Validator::new(),
//!         Gateway::new(mock.clone()),
//!         Rumour::new(),
//!     );
//!     assert!(controller.in_state("busy.fetching"));
//!
//!     let mut state = controller.watch_state();
//!     state.wait_for(|s| s.is_idle()).await.unwrap();
//!     assert!(controller.in_state("idle.snapshot.clean.valid"));
//!     assert_eq!(controller.data(), Some(json!({ "name": "a" })));
//! }
//! ```

use crate::buffer::EditBuffer;
use crate::config::ControllerConfig;
use crate::error::{ControllerError, TransportError};
use crate::machine::{transition, Branch, BusyOp, Edit, Event, State, StateChange};
use crate::resource::{replace_embedded, self_link};
use crate::rumour::{Notice, Rumour, Subscription};
use crate::sync::lock;
use crate::transport::{Gateway, Method, Request, Response, HAL_JSON};
use crate::validation::Validator;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);

const CHANGE_BUFFER: usize = 64;

/// Everything guarded by the controller lock.
struct Inner {
    state: State,
    href: String,
    parent: String,
    group: String,
    data: Option<Value>,
    buffer: EditBuffer,
    errors: Vec<String>,
    generation: u64,
    stale: bool,
    last_error: Option<ControllerError>,
}

struct Shared {
    id: u64,
    runtime: Handle,
    gateway: Gateway,
    rumour: Rumour,
    validator: Validator,
    allow_empty: bool,
    headers: Vec<(String, String)>,
    inner: Mutex<Inner>,
    subscription: Mutex<Option<Subscription>>,
    changes: broadcast::Sender<StateChange>,
    state_tx: watch::Sender<State>,
}

/// Handle to one resource lifecycle. Clones share the same controller.
///
/// None of the operations return errors: a call that makes no sense in the current
/// state is ignored, and a failed request shows up as the `fail` state.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

/// What a finished request turned into.
struct Settled {
    group: String,
    notice: Option<Notice>,
}

impl Controller {
    /// Activates a controller: subscribes to `config.group` and, when `config.href` is
    /// set, starts fetching it right away.
    ///
    /// Must be called from within a Tokio runtime. Network work for this controller is
    /// spawned on that runtime, whichever thread later triggers it.
    pub fn new(config: ControllerConfig, validator: Validator, gateway: Gateway, rumour: Rumour) -> Self {
        let ControllerConfig {
            href,
            parent,
            group,
            allow_empty,
            headers,
        } = config;

        let buffer = EditBuffer::new();
        let evaluation = validator.evaluate(buffer.draft(), allow_empty);
        let state = State::idle(Branch::Template, buffer.edit_state(), evaluation.valid);
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let (state_tx, _) = watch::channel(state);

        let controller = Self {
            shared: Arc::new(Shared {
                id: NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed),
                runtime: Handle::current(),
                gateway,
                rumour,
                validator,
                allow_empty,
                headers,
                inner: Mutex::new(Inner {
                    state,
                    href: String::new(),
                    parent,
                    group: group.clone(),
                    data: None,
                    buffer,
                    errors: evaluation.errors,
                    generation: 0,
                    stale: false,
                    last_error: None,
                }),
                subscription: Mutex::new(None),
                changes,
                state_tx,
            }),
        };
        debug!(controller = controller.id(), %state, "Controller created");

        controller.subscribe(&group);
        if !href.is_empty() {
            controller.set_href(&href);
        }
        controller
    }

    /// Process-unique identifier, used as the `source` of published notices.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.shared.inner)
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    pub fn href(&self) -> String {
        self.lock().href.clone()
    }

    /// Points the controller at another resource.
    ///
    /// A non-empty `href` always starts a GET, superseding whatever was in flight. An
    /// empty one drops the resource and returns to an empty template.
    pub fn set_href(&self, href: &str) {
        let mut inner = self.lock();
        inner.href = href.to_string();
        inner.generation += 1;

        if href.is_empty() {
            inner.data = None;
            inner.stale = false;
            inner.buffer.commit(None);
            let valid = self.revalidate(&mut inner);
            let edit = inner.buffer.edit_state();
            self.step(
                &mut inner,
                Event::SetData {
                    present: false,
                    edit,
                    valid,
                },
            );
            return;
        }

        let pending = self.begin_fetch(&mut inner);
        drop(inner);
        self.launch(pending);
    }

    pub fn parent(&self) -> String {
        self.lock().parent.clone()
    }

    pub fn set_parent(&self, parent: &str) {
        self.lock().parent = parent.to_string();
    }

    pub fn group(&self) -> String {
        self.lock().group.clone()
    }

    /// Moves the controller to another notification group.
    pub fn set_group(&self, group: &str) {
        {
            let mut inner = self.lock();
            if inner.group == group {
                return;
            }
            inner.group = group.to_string();
        }
        self.subscribe(group);
    }

    /// The confirmed resource, if any.
    ///
    /// When the controller is stale this returns the data it holds and starts a
    /// re-fetch.
    pub fn data(&self) -> Option<Value> {
        let inner = self.lock();
        let data = inner.data.clone();
        self.refetch_if_stale(inner);
        data
    }

    /// The confirmed resource deserialized into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data().map(serde_json::from_value).transpose()
    }

    /// Overrides the confirmed resource out of band.
    ///
    /// Always lands in a `clean` state (`snapshot` for `Some`, `template` for `None`),
    /// discards local edits, and supersedes any request in flight.
    pub fn set_data(&self, data: Option<Value>) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.buffer.commit(data.as_ref());
        let present = data.is_some();
        inner.data = data;
        let valid = self.revalidate(&mut inner);
        let edit = inner.buffer.edit_state();
        self.step(&mut inner, Event::SetData { present, edit, valid });
    }

    /// A copy of the current draft. Re-fetches a stale resource like [`data`](Self::data).
    pub fn form(&self) -> Value {
        let inner = self.lock();
        let draft = inner.buffer.draft().clone();
        self.refetch_if_stale(inner);
        draft
    }

    pub fn errors(&self) -> Vec<String> {
        self.lock().errors.clone()
    }

    /// Errors whose code starts with `prefix`, e.g. `"name:"` for a single field.
    pub fn errors_for(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .errors
            .iter()
            .filter(|code| code.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn state(&self) -> State {
        self.lock().state
    }

    /// Structural match against the current state, see [`State::matches`].
    pub fn in_state(&self, pattern: &str) -> bool {
        self.lock().state.matches(pattern)
    }

    /// Whether a notification said the data this controller holds may be outdated.
    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    /// Why the controller last ended up in `fail`. Cleared by the next success.
    pub fn last_error(&self) -> Option<ControllerError> {
        self.lock().last_error.clone()
    }

    /// Every state change from now on, as `{ from, to }` pairs.
    pub fn changes(&self) -> broadcast::Receiver<StateChange> {
        self.shared.changes.subscribe()
    }

    /// The latest state, for waiting on a particular one.
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.shared.state_tx.subscribe()
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Merges `patch` into the draft. Ignored unless `idle`, or when `patch` is not a
    /// JSON object.
    pub fn edit(&self, patch: Value) {
        let mut inner = self.lock();
        if !inner.state.is_idle() {
            debug!(controller = self.id(), state = %inner.state, "Edit ignored");
            return;
        }
        if !inner.buffer.edit(&patch) {
            warn!(controller = self.id(), "Edit ignored: patch is not an object");
            return;
        }
        let valid = self.revalidate(&mut inner);
        self.step(&mut inner, Event::Edit { valid });
    }

    /// Creates (from `template`) or updates (from `snapshot`) the resource.
    ///
    /// Only acts from a `dirty.valid` state.
    pub fn submit(&self) {
        let mut inner = self.lock();
        let (method, url) = match transition(inner.state, Event::Submit) {
            State::Busy(BusyOp::Creating) => (Method::Post, inner.parent.clone()),
            State::Busy(BusyOp::Updating) => (Method::Patch, inner.href.clone()),
            _ => {
                debug!(controller = self.id(), state = %inner.state, "Submit ignored");
                return;
            }
        };
        inner.generation += 1;
        self.step(&mut inner, Event::Submit);

        let request = self
            .request(method, &url)
            .with_json(inner.buffer.draft().clone());
        let pending = Pending {
            generation: inner.generation,
            request,
        };
        drop(inner);
        self.launch(pending);
    }

    /// Deletes the confirmed resource. Only acts from `idle.snapshot`.
    pub fn delete(&self) {
        let mut inner = self.lock();
        if transition(inner.state, Event::Delete) != State::Busy(BusyOp::Deleting) {
            debug!(controller = self.id(), state = %inner.state, "Delete ignored");
            return;
        }
        inner.generation += 1;
        self.step(&mut inner, Event::Delete);

        let pending = Pending {
            generation: inner.generation,
            request: self.request(Method::Delete, &inner.href),
        };
        drop(inner);
        self.launch(pending);
    }

    /// Restores the draft to its last clean value. Ignored unless `idle`.
    pub fn undo(&self) {
        let mut inner = self.lock();
        if !inner.state.is_idle() {
            debug!(controller = self.id(), state = %inner.state, "Undo ignored");
            return;
        }
        inner.buffer.undo();
        let valid = self.revalidate(&mut inner);
        self.step(&mut inner, Event::Undo { valid });
    }

    /// Re-fetches the current `href`. Ignored while `busy` or when no `href` is set.
    pub fn refresh(&self) {
        let mut inner = self.lock();
        if inner.href.is_empty() || inner.state.is_busy() {
            debug!(controller = self.id(), state = %inner.state, "Refresh ignored");
            return;
        }
        inner.generation += 1;
        let pending = self.begin_fetch(&mut inner);
        drop(inner);
        self.launch(pending);
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// The read-triggered half of staleness. Local edits are never thrown away for it:
    /// a dirty draft keeps the flag set until the draft is clean again.
    fn refetch_if_stale(&self, mut inner: MutexGuard<'_, Inner>) {
        let ready = match inner.state {
            State::Idle { edit, .. } => edit == Edit::Clean,
            State::Fail => true,
            State::Busy(_) => false,
        };
        if !inner.stale || inner.href.is_empty() || !ready {
            return;
        }
        debug!(controller = self.id(), href = %inner.href, "Stale read, re-fetching");
        inner.generation += 1;
        let pending = self.begin_fetch(&mut inner);
        drop(inner);
        self.launch(pending);
    }

    /// Moves the machine and tells every observer. Callers only step on accepted
    /// operations, so each call yields exactly one change event.
    fn step(&self, inner: &mut Inner, event: Event) {
        let from = inner.state;
        let to = transition(from, event);
        inner.state = to;
        debug!(controller = self.id(), %from, %to, "Transition");
        let _ = self.shared.changes.send(StateChange { from, to });
        self.shared.state_tx.send_replace(to);
    }

    fn revalidate(&self, inner: &mut Inner) -> bool {
        let evaluation = self
            .shared
            .validator
            .evaluate(inner.buffer.draft(), self.shared.allow_empty);
        inner.errors = evaluation.errors;
        evaluation.valid
    }

    fn request(&self, method: Method, url: &str) -> Request {
        let mut request = Request::new(method, url).with_header("Accept", HAL_JSON);
        for (name, value) in &self.shared.headers {
            request = request.with_header(name.as_str(), value.as_str());
        }
        request
    }

    /// Enters `busy.fetching` for the current href. The caller has already bumped the
    /// generation.
    fn begin_fetch(&self, inner: &mut Inner) -> Pending {
        inner.stale = false;
        self.step(inner, Event::Fetch);
        Pending {
            generation: inner.generation,
            request: self.request(Method::Get, &inner.href),
        }
    }

    fn launch(&self, pending: Pending) {
        let Pending {
            generation,
            request,
        } = pending;
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let gateway = self.shared.gateway.clone();
        let method = request.method;
        let url = request.url.clone();

        self.shared.runtime.spawn(async move {
            let outcome = gateway.fetch(request).await;
            match weak.upgrade() {
                Some(shared) => Controller { shared }.settle(generation, method, url, outcome),
                None => debug!(%method, %url, "Controller dropped before the response arrived"),
            }
        });
    }

    fn settle(
        &self,
        generation: u64,
        method: Method,
        url: String,
        outcome: Result<Response, TransportError>,
    ) {
        let settled = {
            let mut inner = self.lock();
            let op = match inner.state {
                State::Busy(op) if inner.generation == generation => op,
                _ => {
                    warn!(controller = self.id(), %method, %url, "Discarding stale response");
                    return;
                }
            };

            let body = match classify(op, method, &url, outcome) {
                Ok(body) => body,
                Err(error) => {
                    warn!(controller = self.id(), %error, "Request failed");
                    inner.last_error = Some(error);
                    self.step(&mut inner, Event::Failed);
                    return;
                }
            };
            self.adopt(&mut inner, op, body)
        };

        if let Some(notice) = settled.notice {
            if !settled.group.is_empty() {
                self.shared.rumour.publish(&settled.group, notice);
            }
        }
    }

    /// Applies a successful response and prepares the notice announcing it.
    fn adopt(&self, inner: &mut Inner, op: BusyOp, body: Option<Value>) -> Settled {
        inner.last_error = None;
        let previous_href = inner.href.clone();

        match op {
            BusyOp::Creating => match body.as_ref().and_then(self_link) {
                Some(link) => inner.href = link.to_string(),
                None => warn!(controller = self.id(), "Created resource has no self link"),
            },
            BusyOp::Deleting => inner.href.clear(),
            BusyOp::Fetching | BusyOp::Updating => {}
        }

        inner.data = body;
        inner.buffer.commit(inner.data.as_ref());
        let valid = self.revalidate(inner);
        let present = inner.data.is_some();
        self.step(inner, Event::Resolved { present, valid });
        info!(controller = self.id(), op = op.as_str(), href = %inner.href, "Request completed");

        let notice = match op {
            BusyOp::Fetching => None,
            BusyOp::Creating | BusyOp::Updating => inner
                .data
                .clone()
                .map(|data| Notice::updated(inner.href.clone(), data)),
            BusyOp::Deleting => Some(Notice::gone(previous_href)),
        };
        Settled {
            group: inner.group.clone(),
            notice: notice.map(|notice| notice.with_source(self.id()).with_related(inner.parent.clone())),
        }
    }

    fn subscribe(&self, group: &str) {
        let mut slot = lock(&self.shared.subscription);
        drop(slot.take());
        if group.is_empty() {
            return;
        }

        let id = self.id();
        let weak = Arc::downgrade(&self.shared);
        *slot = Some(self.shared.rumour.subscribe(
            group,
            move |notice: &Notice| notice.source != id,
            move |notice: &Notice| {
                if let Some(shared) = weak.upgrade() {
                    Controller { shared }.on_notice(notice);
                }
            },
        ));
    }

    /// Reaction to another controller's write.
    fn on_notice(&self, notice: &Notice) {
        let mut inner = self.lock();

        if !inner.href.is_empty() && inner.href == notice.url {
            if inner.state.is_busy() {
                debug!(controller = self.id(), url = %notice.url, "Busy, notice ignored");
                return;
            }
            debug!(controller = self.id(), url = %notice.url, gone = notice.data.is_none(), "Adopting notice");
            inner.data = notice.data.clone();
            if inner.data.is_none() {
                inner.href.clear();
            }
            inner.stale = false;
            let data = inner.data.clone();
            inner.buffer.reset_clean(data.as_ref());
            let valid = self.revalidate(&mut inner);
            let edit = inner.buffer.edit_state();
            self.step(
                &mut inner,
                Event::SetData {
                    present: data.is_some(),
                    edit,
                    valid,
                },
            );
            return;
        }

        if inner.state.is_idle() {
            let patched = inner
                .data
                .as_mut()
                .map(|data| replace_embedded(data, &notice.url, notice.data.as_ref()))
                .unwrap_or(false);
            if patched {
                debug!(controller = self.id(), url = %notice.url, "Patched embedded resource");
                let data = inner.data.clone();
                inner.buffer.reset_clean(data.as_ref());
                let valid = self.revalidate(&mut inner);
                let edit = inner.buffer.edit_state();
                self.step(
                    &mut inner,
                    Event::SetData {
                        present: true,
                        edit,
                        valid,
                    },
                );
            }
        }

        let related = |url: &str| !url.is_empty() && notice.related.iter().any(|r| r == url);
        if related(inner.parent.as_str()) || related(inner.href.as_str()) {
            debug!(controller = self.id(), url = %notice.url, "Marked stale");
            inner.stale = true;
        }
    }
}

/// A request ready to be sent, tagged with the generation that issued it.
struct Pending {
    generation: u64,
    request: Request,
}

/// Turns a gateway outcome into the body to adopt, or the reason for `fail`.
fn classify(
    op: BusyOp,
    method: Method,
    url: &str,
    outcome: Result<Response, TransportError>,
) -> Result<Option<Value>, ControllerError> {
    let response = outcome.map_err(|source| ControllerError::Transport {
        method,
        url: url.to_string(),
        source,
    })?;
    if !response.is_success() {
        return Err(ControllerError::Status {
            method,
            url: url.to_string(),
            status: response.status,
        });
    }
    match (op, response.body) {
        (BusyOp::Deleting, _) => Ok(None),
        (_, Some(body)) if !body.is_null() => Ok(Some(body)),
        _ => Err(ControllerError::EmptyBody {
            method,
            url: url.to_string(),
        }),
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Controller")
            .field("id", &self.shared.id)
            .field("state", &inner.state.to_string())
            .field("href", &inner.href)
            .field("group", &inner.group)
            .finish()
    }
}
