//! State shared between the session runtime and application tasks.
//!
//! Application tasks never touch the session itself. They append to the outward queue
//! held here and signal the runtime, which picks the message up the next time it is
//! allowed to publish.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::error::{PreconditionFailure, SessionError};
use crate::queue::{OutwardFifo, OutwardQueue, PulledMessage};

/// Outward queue, wake-up signal and readiness flag of one session.
///
/// Meant to live in a `static` so it can be reached from any task:
///
/// ```ignore
/// static SHARED: SessionShared<8, 128> = SessionShared::new(Some("device/up"));
///
/// SHARED.enqueue_publish("", b"hello")?;
/// ```
///
/// # Type Parameters
///
/// - `DEPTH`: Maximum number of queued messages
/// - `PAYLOAD_SIZE`: Maximum payload size of a single message
pub struct SessionShared<const DEPTH: usize, const PAYLOAD_SIZE: usize> {
    queue: Mutex<CriticalSectionRawMutex, RefCell<OutwardFifo<DEPTH, PAYLOAD_SIZE>>>,
    new_data: Signal<CriticalSectionRawMutex, ()>,
    running: AtomicBool,
    ready: AtomicBool,
    default_topic: Option<&'static str>,
}

impl<const DEPTH: usize, const PAYLOAD_SIZE: usize> SessionShared<DEPTH, PAYLOAD_SIZE> {
    /// Create the shared state. `default_topic` is used for publishes without a topic.
    pub const fn new(default_topic: Option<&'static str>) -> Self {
        Self {
            queue: Mutex::new(RefCell::new(OutwardFifo::new())),
            new_data: Signal::new(),
            running: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            default_topic,
        }
    }

    /// Queue a message for publishing and wake the runtime.
    ///
    /// Returns as soon as the message is queued; it is sent once the session is ready
    /// and allowed to publish. An empty `topic` selects the default topic.
    pub fn enqueue_publish(&self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(PreconditionFailure::NoSession.into());
        }

        let topic = if topic.is_empty() {
            self.default_topic
                .ok_or(PreconditionFailure::NoDestination)?
        } else {
            topic
        };

        self.queue.lock(|fifo| {
            fifo.try_borrow_mut()
                .map_err(|_| SessionError::from(PreconditionFailure::QueueUnavailable))?
                .push(topic, payload)
        })?;

        // The signal latches, so a wake-up sent while the runtime is busy is not lost.
        self.new_data.signal(());
        Ok(())
    }

    /// Whether the session finished its subscribe sequence.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether a runtime has been started for this session.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of messages waiting in the outward queue.
    pub fn pending_count(&self) -> usize {
        self.queue.lock(|fifo| fifo.borrow().pending_count())
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub(crate) async fn wait_new_data(&self) {
        self.new_data.wait().await
    }
}

impl<const DEPTH: usize, const PAYLOAD_SIZE: usize> OutwardQueue
    for &SessionShared<DEPTH, PAYLOAD_SIZE>
{
    fn pending_count(&self) -> usize {
        SessionShared::pending_count(self)
    }

    fn pull(&mut self, buf: &mut [u8]) -> Option<PulledMessage> {
        self.queue.lock(|fifo| fifo.borrow_mut().pull(buf))
    }
}
