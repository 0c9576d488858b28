//! Outbound publish scheduling.
//!
//! At most one publish is outstanding at a time. A failed publish leaves a single
//! retry identifier behind, which takes priority over fresh data from the outward
//! queue. Every attempt is spaced from the previous transaction by the pacing timer.

use embassy_time::{Duration, Instant};

use crate::error::{ProtocolFailure, RequestError, SessionError};
use crate::queue::OutwardQueue;
use crate::service::{MqttService, PublishOutcome, QoS, RetryId};

/// Countdown armed after every completed transaction.
///
/// A stopped timer counts as expired, so the first publish after connecting does not
/// wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl PacingTimer {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Restart the countdown from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// Whether the countdown ran out. A timer found expired is stopped.
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now < deadline => false,
            _ => {
                self.deadline = None;
                true
            }
        }
    }

    /// When the armed countdown runs out, `None` if the timer is stopped.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// What a call to [`PublishScheduler::decide`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Attempt {
    /// Nothing was pending.
    Idle,
    /// A queued message was handed to the library.
    Published,
    /// A failed publish was handed back to the library.
    Retried(RetryId),
}

/// Decides what to publish next and tracks the outstanding publish.
pub struct PublishScheduler<const OUT_CAPACITY: usize> {
    timer: PacingTimer,
    retry_pending: Option<RetryId>,
    in_flight: bool,
    out_buffer: [u8; OUT_CAPACITY],
}

impl<const OUT_CAPACITY: usize> PublishScheduler<OUT_CAPACITY> {
    pub const fn new(interval: Duration) -> Self {
        Self {
            timer: PacingTimer::new(interval),
            retry_pending: None,
            in_flight: false,
            out_buffer: [0; OUT_CAPACITY],
        }
    }

    pub fn timer(&self) -> &PacingTimer {
        &self.timer
    }

    /// Whether the pacing timer ran out since it was last armed.
    pub fn poll_timer(&mut self, now: Instant) -> bool {
        self.timer.poll_expired(now)
    }

    /// Re-arm the pacing timer, e.g. after an inbound message completed.
    pub fn arm(&mut self, now: Instant) {
        self.timer.arm(now);
    }

    pub fn retry_pending(&self) -> Option<RetryId> {
        self.retry_pending
    }

    /// Whether a publish was accepted by the library and has not settled yet.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// The outstanding publish reached the broker.
    pub fn on_published(&mut self, now: Instant) {
        debug!("mqtt_session: published");
        self.settle(now);
    }

    /// The outstanding publish failed and can be retried as `id`.
    pub fn on_publish_failed(&mut self, id: RetryId, now: Instant) {
        warn!("mqtt_session: publish failed, retry {:?} pending", id);
        if let Some(previous) = self.retry_pending.replace(id) {
            warn!(
                "mqtt_session: retry {:?} replaced by {:?}",
                previous, id
            );
        }
        self.settle(now);
    }

    /// Forget the outstanding publish. The retry identifier is kept.
    pub fn on_connection_reset(&mut self) {
        self.in_flight = false;
        self.timer.stop();
    }

    /// Start the next publish.
    ///
    /// Must only be called when the session is ready, nothing is in flight and the
    /// pacing timer expired. A pending retry always goes first. Errors report the
    /// outcome of the attempt; the scheduler has already acted on them.
    pub fn decide<S, Q>(
        &mut self,
        now: Instant,
        qos: QoS,
        service: &mut S,
        queue: &mut Q,
    ) -> Result<Attempt, SessionError>
    where
        S: MqttService + ?Sized,
        Q: OutwardQueue + ?Sized,
    {
        self.timer.stop();

        if let Some(id) = self.retry_pending {
            info!("mqtt_session: publishing retry {:?}", id);
            let outcome = service.publish_retry(id);
            return self.apply(outcome, now, Attempt::Retried(id));
        }

        if queue.pending_count() == 0 {
            trace!("mqtt_session: nothing to publish");
            return Ok(Attempt::Idle);
        }

        let Some(message) = queue.pull(&mut self.out_buffer) else {
            return Ok(Attempt::Idle);
        };
        if message.truncated {
            warn!(
                "mqtt_session: message for {} exceeds {} bytes, discarded",
                message.topic.as_str(),
                OUT_CAPACITY
            );
            self.settle(now);
            return Err(RequestError::PayloadTooLarge.into());
        }

        info!(
            "mqtt_session: publishing {} bytes to {}",
            message.len,
            message.topic.as_str()
        );
        let outcome = service.publish(message.topic.as_str(), &self.out_buffer[..message.len], qos);
        self.apply(outcome, now, Attempt::Published)
    }

    fn apply(
        &mut self,
        outcome: PublishOutcome,
        now: Instant,
        attempt: Attempt,
    ) -> Result<Attempt, SessionError> {
        match outcome {
            PublishOutcome::Accepted => {
                self.retry_pending = None;
                self.in_flight = true;
                Ok(attempt)
            }
            PublishOutcome::Failed(id) => {
                // Nothing went out, so no settle event will follow.
                self.retry_pending = Some(id);
                self.settle(now);
                Err(ProtocolFailure::PublishFailed(id).into())
            }
            PublishOutcome::Invalid => {
                warn!("mqtt_session: invalid topic or data too big, message discarded");
                self.retry_pending = None;
                self.settle(now);
                Err(RequestError::Rejected.into())
            }
        }
    }

    fn settle(&mut self, now: Instant) {
        self.in_flight = false;
        self.timer.arm(now);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::{String, ToString};
    use std::vec::Vec;

    use super::*;
    use crate::queue::OutwardFifo;
    use crate::service::ConnectInfo;

    #[derive(Debug, PartialEq)]
    enum Call {
        Publish(String, Vec<u8>),
        Retry(RetryId),
    }

    struct Scripted {
        calls: Vec<Call>,
        outcomes: Vec<PublishOutcome>,
    }

    impl Scripted {
        fn new(outcomes: &[PublishOutcome]) -> Self {
            let mut outcomes = outcomes.to_vec();
            outcomes.reverse();
            Self {
                calls: Vec::new(),
                outcomes,
            }
        }

        fn next(&mut self) -> PublishOutcome {
            self.outcomes.pop().unwrap_or(PublishOutcome::Accepted)
        }
    }

    impl MqttService for Scripted {
        fn connect(&mut self, _broker: core::net::SocketAddr, _info: &ConnectInfo<'_>) {}

        fn subscribe(&mut self, _topic: &str, _qos: QoS) {}

        fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> PublishOutcome {
            self.calls
                .push(Call::Publish(topic.to_string(), payload.to_vec()));
            self.next()
        }

        fn publish_retry(&mut self, id: RetryId) -> PublishOutcome {
            self.calls.push(Call::Retry(id));
            self.next()
        }
    }

    const PACING: Duration = Duration::from_millis(250);

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_stopped_timer_counts_as_expired() {
        let mut timer = PacingTimer::new(PACING);
        assert!(timer.poll_expired(at(0)));
        assert_eq!(timer.deadline(), None);
    }

    #[test]
    fn test_armed_timer_expires_after_interval() {
        let mut timer = PacingTimer::new(PACING);
        timer.arm(at(1000));
        assert_eq!(timer.deadline(), Some(at(1250)));
        assert!(!timer.poll_expired(at(1249)));
        assert!(timer.poll_expired(at(1250)));
        assert_eq!(timer.deadline(), None);
    }

    #[test]
    fn test_publishes_queued_message() {
        let mut scheduler = PublishScheduler::<16>::new(PACING);
        let mut service = Scripted::new(&[]);
        let mut queue = OutwardFifo::<2, 16>::new();
        queue.push("up", b"hello").unwrap();

        let attempt = scheduler.decide(at(0), QoS::AtMostOnce, &mut service, &mut queue);
        assert_eq!(attempt, Ok(Attempt::Published));
        assert!(scheduler.is_in_flight());
        assert_eq!(
            service.calls,
            [Call::Publish("up".to_string(), b"hello".to_vec())]
        );

        scheduler.on_published(at(10));
        assert!(!scheduler.is_in_flight());
        assert_eq!(scheduler.timer().deadline(), Some(at(260)));
    }

    #[test]
    fn test_idle_when_nothing_pending() {
        let mut scheduler = PublishScheduler::<16>::new(PACING);
        let mut service = Scripted::new(&[]);
        let mut queue = OutwardFifo::<2, 16>::new();

        let attempt = scheduler.decide(at(0), QoS::AtMostOnce, &mut service, &mut queue);
        assert_eq!(attempt, Ok(Attempt::Idle));
        assert!(!scheduler.is_in_flight());
        assert!(service.calls.is_empty());
    }

    #[test]
    fn test_retry_takes_priority_over_queue() {
        let mut scheduler = PublishScheduler::<16>::new(PACING);
        let mut service = Scripted::new(&[]);
        let mut queue = OutwardFifo::<2, 16>::new();
        queue.push("up", b"fresh").unwrap();

        scheduler.on_publish_failed(RetryId(7), at(0));
        assert_eq!(scheduler.retry_pending(), Some(RetryId(7)));

        let attempt = scheduler.decide(at(300), QoS::AtMostOnce, &mut service, &mut queue);
        assert_eq!(attempt, Ok(Attempt::Retried(RetryId(7))));
        assert_eq!(scheduler.retry_pending(), None);
        assert_eq!(service.calls, [Call::Retry(RetryId(7))]);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_transient_retry_failure_keeps_identifier() {
        let mut scheduler = PublishScheduler::<16>::new(PACING);
        let mut service = Scripted::new(&[PublishOutcome::Failed(RetryId(7))]);
        let mut queue = OutwardFifo::<2, 16>::new();
        scheduler.on_publish_failed(RetryId(7), at(0));

        let attempt = scheduler.decide(at(300), QoS::AtMostOnce, &mut service, &mut queue);
        assert_eq!(
            attempt,
            Err(SessionError::Protocol(ProtocolFailure::PublishFailed(
                RetryId(7)
            )))
        );
        assert_eq!(scheduler.retry_pending(), Some(RetryId(7)));
        assert!(!scheduler.is_in_flight());
        assert_eq!(scheduler.timer().deadline(), Some(at(550)));
    }

    #[test]
    fn test_invalid_retry_is_discarded() {
        let mut scheduler = PublishScheduler::<16>::new(PACING);
        let mut service = Scripted::new(&[PublishOutcome::Invalid]);
        let mut queue = OutwardFifo::<2, 16>::new();
        scheduler.on_publish_failed(RetryId(3), at(0));

        let attempt = scheduler.decide(at(300), QoS::AtMostOnce, &mut service, &mut queue);
        assert_eq!(
            attempt,
            Err(SessionError::InvalidRequest(RequestError::Rejected))
        );
        assert_eq!(scheduler.retry_pending(), None);
    }

    #[test]
    fn test_failed_publish_records_identifier() {
        let mut scheduler = PublishScheduler::<16>::new(PACING);
        let mut service = Scripted::new(&[PublishOutcome::Failed(RetryId(9))]);
        let mut queue = OutwardFifo::<2, 16>::new();
        queue.push("up", b"x").unwrap();

        let _ = scheduler.decide(at(0), QoS::AtMostOnce, &mut service, &mut queue);
        assert_eq!(scheduler.retry_pending(), Some(RetryId(9)));
        assert!(!scheduler.is_in_flight());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_truncated_message_is_discarded() {
        let mut scheduler = PublishScheduler::<4>::new(PACING);
        let mut service = Scripted::new(&[]);
        let mut queue = OutwardFifo::<2, 32>::new();
        queue.push("up", b"too long for four").unwrap();

        let attempt = scheduler.decide(at(0), QoS::AtMostOnce, &mut service, &mut queue);
        assert_eq!(
            attempt,
            Err(SessionError::InvalidRequest(RequestError::PayloadTooLarge))
        );
        assert!(service.calls.is_empty());
        assert_eq!(scheduler.retry_pending(), None);
        assert!(queue.is_empty());
    }
}
