//! # Resource State Machine
//!
//! The controller's lifecycle expressed as data: a tagged [`State`], the [`Event`]s that
//! drive it, and a pure [`transition`] function. Nothing in here touches the network,
//! the draft, or the bus, so every rule can be tested without a runtime.
//!
//! ## The state tree
//!
//! ```text
//! idle
//!   ├─ template   (no confirmed resource)   ─ clean | dirty ─ valid | invalid
//!   └─ snapshot   (confirmed resource)      ─ clean | dirty ─ valid | invalid
//! busy
//!   ├─ fetching   (GET in flight)
//!   ├─ creating   (POST in flight)
//!   ├─ updating   (PATCH in flight)
//!   └─ deleting   (DELETE in flight)
//! fail
//! ```
//!
//! Exactly one leaf is active. Its dot-separated path (e.g. `idle.snapshot.dirty.valid`)
//! is the state descriptor views match against with [`State::matches`].
//!
//! ## Validity travels with the event
//!
//! Validity is computed by the validation engine, not chosen by the machine. Events that
//! land in an `idle` leaf therefore carry the freshly computed verdict, which keeps
//! [`transition`] a pure `(State, Event) -> State` function.

use std::fmt;

/// Which `idle` sub-branch is active: pre-creation or backed by a confirmed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Template,
    Snapshot,
}

impl Branch {
    /// `Snapshot` when a confirmed resource is present, `Template` otherwise.
    pub fn from_present(present: bool) -> Self {
        if present {
            Branch::Snapshot
        } else {
            Branch::Template
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Template => "template",
            Branch::Snapshot => "snapshot",
        }
    }
}

/// Whether the draft still equals its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edit {
    Clean,
    Dirty,
}

impl Edit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edit::Clean => "clean",
            Edit::Dirty => "dirty",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    Valid,
    Invalid,
}

impl From<bool> for Validity {
    fn from(valid: bool) -> Self {
        if valid {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }
}

impl Validity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Validity::Valid => "valid",
            Validity::Invalid => "invalid",
        }
    }
}

/// The network operation a `busy` controller is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusyOp {
    Fetching,
    Creating,
    Updating,
    Deleting,
}

impl BusyOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusyOp::Fetching => "fetching",
            BusyOp::Creating => "creating",
            BusyOp::Updating => "updating",
            BusyOp::Deleting => "deleting",
        }
    }
}

/// The controller's position in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle {
        branch: Branch,
        edit: Edit,
        validity: Validity,
    },
    Busy(BusyOp),
    Fail,
}

impl Default for State {
    /// `idle.template.clean.invalid`: an empty draft is invalid until proven otherwise.
    fn default() -> Self {
        State::idle(Branch::Template, Edit::Clean, false)
    }
}

impl State {
    pub fn idle(branch: Branch, edit: Edit, valid: bool) -> Self {
        State::Idle {
            branch,
            edit,
            validity: Validity::from(valid),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, State::Busy(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, State::Fail)
    }

    /// The active `idle` branch, if any.
    pub fn branch(&self) -> Option<Branch> {
        match self {
            State::Idle { branch, .. } => Some(*branch),
            _ => None,
        }
    }

    /// The descriptor path, root first.
    pub fn segments(&self) -> Vec<&'static str> {
        match self {
            State::Idle {
                branch,
                edit,
                validity,
            } => vec!["idle", branch.as_str(), edit.as_str(), validity.as_str()],
            State::Busy(op) => vec!["busy", op.as_str()],
            State::Fail => vec!["fail"],
        }
    }

    /// Structural match against the descriptor.
    ///
    /// The pattern is a dot-separated prefix of the descriptor; `*` matches any single
    /// segment and an empty pattern matches everything.
    ///
    /// ```
    /// use nucleon::machine::{Branch, Edit, State};
    ///
    /// let state = State::idle(Branch::Snapshot, Edit::Dirty, true);
    /// assert!(state.matches("idle"));
    /// assert!(state.matches("idle.snapshot"));
    /// assert!(state.matches("idle.*.dirty.valid"));
    /// assert!(!state.matches("idle.template"));
    /// assert!(!state.matches("busy"));
    /// ```
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return true;
        }
        let segments = self.segments();
        let wanted: Vec<&str> = pattern.split('.').collect();
        wanted.len() <= segments.len()
            && wanted
                .iter()
                .zip(segments.iter())
                .all(|(want, have)| *want == "*" || want == have)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("."))
    }
}

/// Everything that can move the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A non-empty `href` was assigned, or a refresh was requested.
    Fetch,
    /// Confirmed data was replaced from outside the network cycle.
    SetData { present: bool, edit: Edit, valid: bool },
    /// A patch was merged into the draft.
    Edit { valid: bool },
    Submit,
    Delete,
    /// The draft was restored to its baseline.
    Undo { valid: bool },
    /// The in-flight request succeeded.
    Resolved { present: bool, valid: bool },
    /// The in-flight request failed.
    Failed,
}

/// The whole transition table.
///
/// Events that are not meaningful in the current state leave it unchanged, which is how
/// `edit`, `submit`, `delete` and `undo` become silent no-ops while `busy` or `fail`.
pub fn transition(state: State, event: Event) -> State {
    use State::{Busy, Fail, Idle};

    match (state, event) {
        (_, Event::Fetch) => Busy(BusyOp::Fetching),
        (_, Event::SetData { present, edit, valid }) => {
            State::idle(Branch::from_present(present), edit, valid)
        }
        (Idle { branch, .. }, Event::Edit { valid }) => State::idle(branch, Edit::Dirty, valid),
        (
            Idle {
                branch: Branch::Template,
                edit: Edit::Dirty,
                validity: Validity::Valid,
            },
            Event::Submit,
        ) => Busy(BusyOp::Creating),
        (
            Idle {
                branch: Branch::Snapshot,
                edit: Edit::Dirty,
                validity: Validity::Valid,
            },
            Event::Submit,
        ) => Busy(BusyOp::Updating),
        (
            Idle {
                branch: Branch::Snapshot,
                ..
            },
            Event::Delete,
        ) => Busy(BusyOp::Deleting),
        (Idle { branch, .. }, Event::Undo { valid }) => State::idle(branch, Edit::Clean, valid),
        (Busy(_), Event::Resolved { present, valid }) => {
            State::idle(Branch::from_present(present), Edit::Clean, valid)
        }
        (Busy(_), Event::Failed) => Fail,
        (state, _) => state,
    }
}

/// One observed transition, as delivered to views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: State,
    pub to: State,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(edit: Edit, valid: bool) -> State {
        State::idle(Branch::Template, edit, valid)
    }

    fn snapshot(edit: Edit, valid: bool) -> State {
        State::idle(Branch::Snapshot, edit, valid)
    }

    fn all_states() -> Vec<State> {
        let mut states = vec![State::Fail];
        for op in [
            BusyOp::Fetching,
            BusyOp::Creating,
            BusyOp::Updating,
            BusyOp::Deleting,
        ] {
            states.push(State::Busy(op));
        }
        for branch in [Branch::Template, Branch::Snapshot] {
            for edit in [Edit::Clean, Edit::Dirty] {
                for valid in [true, false] {
                    states.push(State::idle(branch, edit, valid));
                }
            }
        }
        states
    }

    #[test]
    fn test_descriptor_paths() {
        assert_eq!(State::default().to_string(), "idle.template.clean.invalid");
        assert_eq!(
            snapshot(Edit::Dirty, true).to_string(),
            "idle.snapshot.dirty.valid"
        );
        assert_eq!(State::Busy(BusyOp::Updating).to_string(), "busy.updating");
        assert_eq!(State::Fail.to_string(), "fail");
    }

    #[test]
    fn test_fetch_wins_from_every_state() {
        for state in all_states() {
            assert_eq!(
                transition(state, Event::Fetch),
                State::Busy(BusyOp::Fetching),
                "from {state}"
            );
        }
    }

    #[test]
    fn test_submit_only_from_dirty_valid() {
        for state in all_states() {
            let next = transition(state, Event::Submit);
            match state {
                s if s == template(Edit::Dirty, true) => {
                    assert_eq!(next, State::Busy(BusyOp::Creating))
                }
                s if s == snapshot(Edit::Dirty, true) => {
                    assert_eq!(next, State::Busy(BusyOp::Updating))
                }
                _ => assert_eq!(next, state, "submit must be a no-op from {state}"),
            }
        }
    }

    #[test]
    fn test_delete_requires_snapshot() {
        for state in all_states() {
            let next = transition(state, Event::Delete);
            if state.branch() == Some(Branch::Snapshot) {
                assert_eq!(next, State::Busy(BusyOp::Deleting));
            } else {
                assert_eq!(next, state);
            }
        }
    }

    #[test]
    fn test_edit_and_undo_stay_in_branch() {
        let next = transition(template(Edit::Clean, false), Event::Edit { valid: true });
        assert_eq!(next, template(Edit::Dirty, true));

        let next = transition(snapshot(Edit::Dirty, false), Event::Undo { valid: true });
        assert_eq!(next, snapshot(Edit::Clean, true));
    }

    #[test]
    fn test_busy_and_fail_ignore_local_intent() {
        let frozen = [State::Fail, State::Busy(BusyOp::Fetching), State::Busy(BusyOp::Deleting)];
        for state in frozen {
            assert_eq!(transition(state, Event::Edit { valid: true }), state);
            assert_eq!(transition(state, Event::Undo { valid: true }), state);
            assert_eq!(transition(state, Event::Submit), state);
        }
    }

    #[test]
    fn test_resolution_only_settles_busy() {
        let busy = State::Busy(BusyOp::Deleting);
        assert_eq!(
            transition(busy, Event::Resolved { present: false, valid: false }),
            template(Edit::Clean, false)
        );
        assert_eq!(transition(busy, Event::Failed), State::Fail);

        let idle = snapshot(Edit::Clean, true);
        assert_eq!(transition(idle, Event::Failed), idle);
        assert_eq!(
            transition(idle, Event::Resolved { present: false, valid: true }),
            idle
        );
    }

    #[test]
    fn test_set_data_from_anywhere() {
        for state in all_states() {
            let next = transition(
                state,
                Event::SetData {
                    present: true,
                    edit: Edit::Clean,
                    valid: true,
                },
            );
            assert_eq!(next, snapshot(Edit::Clean, true));
        }
    }

    #[test]
    fn test_matches() {
        let state = snapshot(Edit::Clean, false);
        assert!(state.matches(""));
        assert!(state.matches("idle.snapshot.clean.invalid"));
        assert!(state.matches("idle.*.*.invalid"));
        assert!(!state.matches("idle.snapshot.clean.invalid.extra"));
        assert!(!state.matches("idle.snapshot.dirty"));
        assert!(State::Busy(BusyOp::Creating).matches("busy"));
        assert!(!State::Fail.matches("busy"));
    }
}
