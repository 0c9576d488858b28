//! Reassembly of chunked inbound messages.

use heapless::{String, Vec};

use crate::config::MAX_TOPIC_LEN;
use crate::error::SessionError;

/// A fully reassembled inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

/// Receives reassembled inbound messages.
///
/// Called synchronously from the dispatcher. The message borrows the assembly buffer,
/// so anything the consumer wants to keep must be copied before returning.
pub trait InboundConsumer {
    fn on_message(&mut self, msg: &InboundMessage<'_>);
}

/// A consumer that drops every message.
pub struct NoopConsumer;

impl InboundConsumer for NoopConsumer {
    fn on_message(&mut self, _msg: &InboundMessage<'_>) {}
}

impl<C: InboundConsumer + ?Sized> InboundConsumer for &mut C {
    fn on_message(&mut self, msg: &InboundMessage<'_>) {
        (**self).on_message(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Assembling,
    /// The assembly overflowed; the rest of the message is dropped until `ReceiveEnd`.
    Discarding,
}

/// Concatenates the chunks of one inbound message into a bounded buffer.
pub struct InboundAssembler<const CAPACITY: usize> {
    phase: Phase,
    topic: String<MAX_TOPIC_LEN>,
    message: Vec<u8, CAPACITY>,
}

impl<const CAPACITY: usize> InboundAssembler<CAPACITY> {
    pub const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            topic: String::new(),
            message: Vec::new(),
        }
    }

    /// Whether an inbound message is being received.
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Bytes assembled so far.
    pub fn len(&self) -> usize {
        self.message.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }

    /// Start a new message, dropping any unfinished one.
    pub fn begin(&mut self, topic: &str, chunk: &[u8]) -> Result<(), SessionError> {
        if self.is_active() {
            warn!(
                "mqtt_session: new message on {} before the previous one ended, dropping {} bytes",
                topic,
                self.message.len()
            );
        }
        self.clear();
        self.phase = Phase::Assembling;

        if self.topic.push_str(topic).is_err() {
            return self.overflow();
        }
        self.append(chunk)
    }

    /// Append the next chunk of the current message.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        match self.phase {
            Phase::Assembling => {}
            Phase::Discarding => return Ok(()),
            Phase::Idle => {
                warn!("mqtt_session: continuation without a message, ignored");
                return Ok(());
            }
        }
        if self.message.extend_from_slice(chunk).is_err() {
            return self.overflow();
        }
        Ok(())
    }

    /// End the current message and hand it to `consumer`.
    ///
    /// Returns `true` if a message was delivered.
    pub fn finish<C: InboundConsumer + ?Sized>(&mut self, consumer: &mut C) -> bool {
        let delivered = match self.phase {
            Phase::Assembling => {
                debug!(
                    "mqtt_session: data received on {}, {} bytes",
                    self.topic.as_str(),
                    self.message.len()
                );
                consumer.on_message(&InboundMessage {
                    topic: self.topic.as_str(),
                    payload: &self.message,
                });
                true
            }
            Phase::Discarding => false,
            Phase::Idle => {
                warn!("mqtt_session: receive end without a message");
                false
            }
        };
        self.reset();
        delivered
    }

    /// Drop the current message without delivering it.
    pub fn reset(&mut self) {
        self.clear();
        self.phase = Phase::Idle;
    }

    fn clear(&mut self) {
        self.topic.clear();
        self.message.clear();
    }

    fn overflow(&mut self) -> Result<(), SessionError> {
        error!(
            "mqtt_session: inbound message exceeds {} bytes, discarded",
            CAPACITY
        );
        self.clear();
        self.phase = Phase::Discarding;
        Err(SessionError::BufferOverflow)
    }
}

impl<const CAPACITY: usize> Default for InboundAssembler<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::{String, ToString};
    use std::vec::Vec;

    use super::*;

    #[derive(Default)]
    struct Collect {
        messages: Vec<(String, Vec<u8>)>,
    }

    impl InboundConsumer for Collect {
        fn on_message(&mut self, msg: &InboundMessage<'_>) {
            self.messages
                .push((msg.topic.to_string(), msg.payload.to_vec()));
        }
    }

    #[test]
    fn test_concatenates_chunks() {
        let mut assembler = InboundAssembler::<16>::new();
        let mut consumer = Collect::default();

        assembler.begin("t", b"ab").unwrap();
        assert!(assembler.is_active());
        assembler.append(b"cd").unwrap();
        assert_eq!(assembler.len(), 4);
        assert!(assembler.finish(&mut consumer));

        assert!(!assembler.is_active());
        assert_eq!(consumer.messages, [("t".to_string(), b"abcd".to_vec())]);
    }

    #[test]
    fn test_overflow_discards_partial_message() {
        let mut assembler = InboundAssembler::<4>::new();
        let mut consumer = Collect::default();

        assembler.begin("t", b"abc").unwrap();
        assert_eq!(assembler.append(b"de"), Err(SessionError::BufferOverflow));
        assert!(assembler.is_empty());
        assert!(assembler.is_active());

        // The remaining chunks of the oversized message are swallowed.
        assert_eq!(assembler.append(b"f"), Ok(()));
        assert!(!assembler.finish(&mut consumer));
        assert!(!assembler.is_active());
        assert!(consumer.messages.is_empty());
    }

    #[test]
    fn test_oversized_first_chunk_overflows() {
        let mut assembler = InboundAssembler::<2>::new();
        assert_eq!(
            assembler.begin("t", b"abc"),
            Err(SessionError::BufferOverflow)
        );
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_exact_capacity_fits() {
        let mut assembler = InboundAssembler::<4>::new();
        let mut consumer = Collect::default();
        assembler.begin("t", b"ab").unwrap();
        assembler.append(b"cd").unwrap();
        assert!(assembler.finish(&mut consumer));
        assert_eq!(consumer.messages[0].1, b"abcd");
    }

    #[test]
    fn test_begin_replaces_unfinished_message() {
        let mut assembler = InboundAssembler::<16>::new();
        let mut consumer = Collect::default();

        assembler.begin("old", b"stale").unwrap();
        assembler.begin("new", b"fresh").unwrap();
        assert!(assembler.finish(&mut consumer));
        assert_eq!(consumer.messages, [("new".to_string(), b"fresh".to_vec())]);
    }

    #[test]
    fn test_continuation_without_begin_is_ignored() {
        let mut assembler = InboundAssembler::<16>::new();
        let mut consumer = Collect::default();

        assert_eq!(assembler.append(b"x"), Ok(()));
        assert!(!assembler.is_active());
        assert!(!assembler.finish(&mut consumer));
        assert!(consumer.messages.is_empty());
    }
}
