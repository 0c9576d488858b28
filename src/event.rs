//! Events consumed by the session dispatcher.

use crate::service::RetryId;

/// Events emitted by the MQTT library layer.
///
/// Inbound messages arrive in chunks: one `ReceiveBegin` carrying the topic and the
/// first chunk, any number of `ReceiveContinuation`s, then `ReceiveEnd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolEvent<'a> {
    Connected,
    Disconnected,
    Subscribed,
    SubscribeFailed,
    ReceiveBegin { topic: &'a str, chunk: &'a [u8] },
    ReceiveContinuation(&'a [u8]),
    ReceiveEnd,
    /// The outstanding publish reached the broker.
    Published,
    /// The outstanding publish failed; it can be retried with the given id.
    PublishFailed(RetryId),
}

/// Everything that can wake the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent<'a> {
    Protocol(ProtocolEvent<'a>),
    /// The pacing timer ran out.
    TimerExpired,
    /// The application appended to the outward queue. Carries no payload.
    NewData,
}

impl<'a> From<ProtocolEvent<'a>> for SessionEvent<'a> {
    fn from(event: ProtocolEvent<'a>) -> Self {
        SessionEvent::Protocol(event)
    }
}
