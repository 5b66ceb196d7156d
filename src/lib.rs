#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Nucleon
//!
//! > **A lifecycle controller for hypermedia resources.**
//!
//! Every form, card and list in a hypermedia UI ends up doing the same thing: fetch one
//! resource, keep an editable copy, validate it, write it back with the right verb, and
//! tell the rest of the screen that it changed. This crate does that once, as a
//! [`Controller`] any view layer can drive.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### The state machine is data
//! The lifecycle is an enum ([`State`]) plus a pure function ([`transition`]). The
//! controller never decides what is allowed on its own; it asks the table. That keeps
//! every rule testable without a runtime, a network, or a UI.
//!
//! ### Failure is state, not an error
//! Public operations never return `Result`. Calling `submit` on an invalid draft, or
//! `edit` while a request is in flight, is simply ignored. A request that fails moves
//! the controller to `fail`, and [`Controller::last_error`] says why.
//!
//! ### No central store
//! Controllers own their data exclusively. When one of them writes, it announces the
//! result on a [`Rumour`] group and its siblings decide for themselves what to do.
//!
//! ## 🚀 Core Concepts
//!
//! ### States
//! ```text
//! idle.template.{clean|dirty}.{valid|invalid}   no confirmed resource yet
//! idle.snapshot.{clean|dirty}.{valid|invalid}   backed by a confirmed resource
//! busy.{fetching|creating|updating|deleting}    one request in flight
//! fail                                          the last request failed
//! ```
//! Views match on the dotted path with [`Controller::in_state`], e.g. `"idle.*.dirty"`.
//!
//! ### Mocking: Testing without a Server
//! Every request goes through a [`Gateway`](transport::Gateway) whose transport is
//! pluggable. See the [`transport::mock`] module for the available test doubles.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Supersession instead of cancellation
//! Pointing a controller at a new `href` while a fetch is in flight does not abort the
//! old request; its answer is just ignored when it arrives.
//!
//! ### 2. One request at a time
//! Operations that would start a request are no-ops outside their `idle` states, so a
//! second concurrent request on the same controller cannot be expressed.
//!
//! ### 3. Observability
//! `tracing` everywhere, with the controller id on every event. See
//! [`runtime::tracing`] for the log format.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Machine ([`machine`])
//! - **Role**: The state tree, its events and the transition table.
//! - **Key items**: [`State`], [`Event`](machine::Event), [`transition`].
//!
//! ### 2. The Draft ([`buffer`], [`validation`])
//! - **Role**: Editing, undo, and the rules that decide `valid`/`invalid`.
//! - **Key items**: [`EditBuffer`](buffer::EditBuffer), [`merge`](buffer::merge), [`Validator`].
//!
//! ### 3. The Wire ([`transport`])
//! - **Role**: Requests, interceptors, the real HTTP transport and the test doubles.
//! - **Key items**: [`Gateway`](transport::Gateway), [`Interceptor`](transport::Interceptor),
//!   [`BackendActor`](transport::memory::BackendActor).
//!
//! ### 4. The Bus ([`rumour`])
//! - **Role**: Group-scoped notifications between controllers.
//! - **Key items**: [`Rumour`], [`Notice`](rumour::Notice).
//!
//! ### 5. The Facade ([`controller`], [`runtime`])
//! - **Role**: What views hold, and the wiring that creates it.
//! - **Key items**: [`Controller`], [`ControllerConfig`], [`Nucleus`](runtime::Nucleus).
//!
//! ## 🚀 Quick Start
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod machine;
pub mod resource;
pub mod rumour;
pub mod runtime;
mod sync;
pub mod transport;
pub mod validation;

pub use config::ControllerConfig;
pub use controller::Controller;
pub use error::{ControllerError, TransportError};
pub use machine::{transition, State, StateChange};
pub use rumour::{Notice, Rumour};
pub use validation::Validator;
