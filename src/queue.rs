//! Outward message queue.
//!
//! The application appends messages; the publish scheduler pulls them one at a time
//! when the session is allowed to publish.

use heapless::{Deque, String, Vec};

use crate::config::MAX_TOPIC_LEN;
use crate::error::{PreconditionFailure, RequestError, SessionError};

/// Source of outbound messages for the publish scheduler.
pub trait OutwardQueue {
    /// Number of messages waiting to be published.
    fn pending_count(&self) -> usize;

    /// Removes the oldest message, copying up to `buf.len()` payload bytes into `buf`.
    ///
    /// Returns `None` if the queue is empty.
    fn pull(&mut self, buf: &mut [u8]) -> Option<PulledMessage>;
}

impl<Q: OutwardQueue + ?Sized> OutwardQueue for &mut Q {
    fn pending_count(&self) -> usize {
        (**self).pending_count()
    }

    fn pull(&mut self, buf: &mut [u8]) -> Option<PulledMessage> {
        (**self).pull(buf)
    }
}

/// A message taken from the queue. The payload sits in the caller's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledMessage {
    pub topic: String<MAX_TOPIC_LEN>,
    /// Number of payload bytes written to the buffer.
    pub len: usize,
    /// The payload was longer than the buffer and has been cut.
    pub truncated: bool,
}

/// An owned outbound message with inline storage for topic and payload.
#[derive(Debug, Clone)]
pub struct OutboundMessage<const PAYLOAD_SIZE: usize> {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: Vec<u8, PAYLOAD_SIZE>,
}

/// A bounded FIFO of outbound messages.
///
/// # Type Parameters
///
/// - `DEPTH`: Maximum number of queued messages
/// - `PAYLOAD_SIZE`: Maximum payload size of a single message
pub struct OutwardFifo<const DEPTH: usize, const PAYLOAD_SIZE: usize> {
    messages: Deque<OutboundMessage<PAYLOAD_SIZE>, DEPTH>,
}

impl<const DEPTH: usize, const PAYLOAD_SIZE: usize> OutwardFifo<DEPTH, PAYLOAD_SIZE> {
    /// Create a new empty queue.
    pub const fn new() -> Self {
        Self {
            messages: Deque::new(),
        }
    }

    /// Append a message.
    ///
    /// Topic and payload are copied. Nothing is stored if the message does not fit.
    pub fn push(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        if topic.is_empty() {
            return Err(RequestError::EmptyTopic.into());
        }

        let mut topic_str = String::new();
        topic_str
            .push_str(topic)
            .map_err(|_| RequestError::TopicTooLong)?;

        let mut payload_vec = Vec::new();
        payload_vec
            .extend_from_slice(payload)
            .map_err(|_| RequestError::PayloadTooLarge)?;

        self.messages
            .push_back(OutboundMessage {
                topic: topic_str,
                payload: payload_vec,
            })
            .map_err(|_| PreconditionFailure::QueueFull)?;
        Ok(())
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

impl<const DEPTH: usize, const PAYLOAD_SIZE: usize> Default for OutwardFifo<DEPTH, PAYLOAD_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DEPTH: usize, const PAYLOAD_SIZE: usize> OutwardQueue
    for OutwardFifo<DEPTH, PAYLOAD_SIZE>
{
    fn pending_count(&self) -> usize {
        self.messages.len()
    }

    fn pull(&mut self, buf: &mut [u8]) -> Option<PulledMessage> {
        let message = self.messages.pop_front()?;
        let len = message.payload.len().min(buf.len());
        buf[..len].copy_from_slice(&message.payload[..len]);
        Some(PulledMessage {
            topic: message.topic,
            len,
            truncated: len < message.payload.len(),
        })
    }
}
