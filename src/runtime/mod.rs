//! Runtime wiring and observability.
//!
//! # Main Components
//!
//! - [`Nucleus`] - Owns the shared gateway and bus, starts the in-memory backend, and
//!   hands out controllers wired to both
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure

pub mod nucleus;
pub mod tracing;

pub use self::nucleus::Nucleus;
pub use self::tracing::setup_tracing;
