//! # Paced MQTT Client Session for Embedded Systems
//!
//! `myrtio-mqtt-session` is a `no_std` session layer for a constrained device talking to a
//! single MQTT broker. It sits on top of an MQTT library that does the wire work and decides
//! *when* to subscribe and publish.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Every buffer is a fixed-capacity `heapless` container.
//! - **Non-blocking state machine:** [`Session::dispatch`] handles one event to completion and
//!   returns. An Embassy driver is provided in [`runtime`].
//! - **Ordered subscriptions:** Topics are subscribed one at a time, in order, retrying the
//!   current topic on failure. The session is ready only after the last acknowledgement.
//! - **Paced publishing:** At most one publish is in flight, never while an inbound message is
//!   being received, and never before a short pacing interval has passed since the previous
//!   transaction. Brokers that allow a single inbound message in flight see far fewer
//!   collisions.
//! - **Single-slot retry:** A failed publish is retried before any new data is sent.
//!
//! ## Architecture
//!
//! ### 1. Direct Session Usage
//!
//! Feed events to the session from your own loop:
//!
//! ```ignore
//! let config = SessionConfig::<2>::new("client_id", DEFAULT_BROKER)
//!     .with_topic("sub_topic_1")?
//!     .with_topic("sub_topic_2")?;
//! let mut session = Session::<2, IN_BUFFER_SIZE, OUT_BUFFER_SIZE>::new(config);
//! session.start(&mut service);
//!
//! loop {
//!     let event = wait_for_event().await;
//!     let mut ctx = Context::new(&mut service, &mut queue, &mut consumer);
//!     session.dispatch(event, Instant::now(), &mut ctx)?;
//! }
//! ```
//!
//! ### 2. Runtime
//!
//! Let [`SessionRuntime`] wait on the events, the pacing timer and the application's
//! publishes:
//!
//! ```ignore
//! static SHARED: SessionShared<8, 128> = SessionShared::new(None);
//!
//! let mut runtime = SessionRuntime::new(session, &SHARED, &mut service, &mut events, &mut consumer);
//! runtime.run().await;
//!
//! // Elsewhere:
//! SHARED.enqueue_publish("device/up", b"payload")?;
//! ```

#![no_std]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod session;

// Re-export key types for easier access at the crate root.
pub use config::SessionConfig;
pub use error::SessionError;
pub use event::{ProtocolEvent, SessionEvent};
pub use queue::{OutwardFifo, OutwardQueue};
pub use runtime::{EventSource, SessionRuntime, SessionShared};
pub use service::{MqttService, PublishOutcome, QoS, RetryId};
pub use session::{Context, InboundConsumer, InboundMessage, Session, SessionState};
