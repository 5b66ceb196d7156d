//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging with the `tracing` crate. Log levels
//! come from `RUST_LOG`; the compact format hides the module prefix (`with_target(false)`)
//! since every event already carries a `controller` id or a `method`/`url` span.
//!
//! ## What Gets Traced
//!
//! - **Transitions**: every state change at `debug`, with `from` and `to`
//! - **Requests**: a `fetch` span per gateway call, completions at `info`
//! - **Failures**: failed requests and discarded stale responses at `warn`
//! - **Notifications**: publish, subscribe and adopted notices at `debug`
//! - **Backend**: the in-memory server's lifecycle and writes at `info`
//!
//! ## Usage Examples
//!
//! ```bash
//! # Completed requests and backend writes
//! RUST_LOG=info cargo run
//!
//! # Every transition and notice
//! RUST_LOG=debug cargo run
//!
//! # Only the controllers
//! RUST_LOG=nucleon::controller=debug cargo run
//! ```
//!
//! With `RUST_LOG=debug` a create followed by a sibling update reads like:
//!
//! ```text
//! DEBUG Transition controller=1 from=idle.template.dirty.valid to=busy.creating
//! DEBUG fetch{method=POST url=/customers}: Sending request
//!  INFO Created id="/customers/1" size=1
//! DEBUG Transition controller=1 from=busy.creating to=idle.snapshot.clean.valid
//!  INFO Request completed controller=1 op="creating" href=/customers/1
//! DEBUG Publishing group="customers" url=/customers/1 listeners=1
//! DEBUG Marked stale controller=2 url=/customers/1
//! ```

/// Initializes the global subscriber. Call once, at startup.
///
/// ```ignore
/// setup_tracing();
/// tracing::info!("Application started");
/// ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
