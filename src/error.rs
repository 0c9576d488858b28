//! # Error Types
//!
//! This module defines the error taxonomy of the session: failures reported by the
//! broker, inbound buffer overflows, malformed publish requests and calls made before
//! the session can accept them.
//!
//! Only [`SessionError::InvalidRequest`] and [`SessionError::Precondition`] ever reach
//! the application, and only as the immediate result of an API call. Protocol failures
//! are recovered inside the state machine.

use crate::service::RetryId;

/// The primary error enum for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// The broker or the library layer rejected an operation. Retried or discarded
    /// by the state machine.
    Protocol(ProtocolFailure),
    /// An inbound message grew past the reassembly buffer. The partial message
    /// has been discarded.
    BufferOverflow,
    /// A publish request was malformed or too large and has been discarded.
    InvalidRequest(RequestError),
    /// The application called into the session before it could accept the call.
    Precondition(PreconditionFailure),
}

/// Failures reported by the protocol layer.
///
/// Subscription failures never show up here: the sequencer re-issues the request
/// without leaving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolFailure {
    /// A publish failed transiently; the identifier is kept for a retry.
    PublishFailed(RetryId),
}

/// Reasons a publish request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// The topic is empty.
    EmptyTopic,
    /// The topic does not fit into `MAX_TOPIC_LEN` bytes.
    TopicTooLong,
    /// The subscribe sequence has no free slot.
    TooManyTopics,
    /// The payload does not fit into the queue slot or the output buffer.
    PayloadTooLarge,
    /// The library layer reported an invalid topic or an oversized message.
    Rejected,
}

/// Conditions that must hold before the application may enqueue a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PreconditionFailure {
    /// The session runtime has not been started.
    NoSession,
    /// The outward queue is currently borrowed.
    QueueUnavailable,
    /// The outward queue has no free slot.
    QueueFull,
    /// No topic was given and no default topic is configured.
    NoDestination,
}

impl From<ProtocolFailure> for SessionError {
    fn from(err: ProtocolFailure) -> Self {
        SessionError::Protocol(err)
    }
}

impl From<RequestError> for SessionError {
    fn from(err: RequestError) -> Self {
        SessionError::InvalidRequest(err)
    }
}

impl From<PreconditionFailure> for SessionError {
    fn from(err: PreconditionFailure) -> Self {
        SessionError::Precondition(err)
    }
}
