//! Session Runtime
//!
//! Drives a [`Session`](crate::session::Session) on the Embassy executor.
//!
//! # Overview
//!
//! - [`SessionRuntime`] owns the session and waits on protocol events, the
//!   application's new-data signal and the pacing timer, dispatching one event at a
//!   time.
//! - [`SessionShared`] is the application-facing side: it holds the outward queue,
//!   wakes the runtime on `enqueue_publish` and mirrors the session's readiness.
//!
//! # Publishing Pattern
//!
//! Application tasks never publish directly. They queue messages through
//! `SessionShared::enqueue_publish`, which returns as soon as the message is stored.
//! The runtime sends it once the session is ready, nothing else is in flight and the
//! pacing interval has passed.

pub(crate) mod event_loop;
pub(crate) mod shared;

pub use event_loop::{EventSource, SessionRuntime};
pub use shared::SessionShared;
