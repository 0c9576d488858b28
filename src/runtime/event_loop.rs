//! Async driver for a [`Session`].
//!
//! The runtime waits on three sources at once: the next protocol event, the
//! application's new-data signal and the pacing timer. Whichever completes first is
//! dispatched to the session; then the loop waits again.

use embassy_futures::select::{Either3, select3};
use embassy_time::{Instant, Timer};

use super::shared::SessionShared;
use crate::error::SessionError;
use crate::event::{ProtocolEvent, SessionEvent};
use crate::service::MqttService;
use crate::session::{Context, InboundConsumer, Session};

/// Source of protocol events, usually the receive half of the MQTT library.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// Waits for the next event. Chunk and topic data borrow from the source.
    async fn next_event(&mut self) -> ProtocolEvent<'_>;
}

/// Runs a session forever.
///
/// ```ignore
/// static SHARED: SessionShared<8, 128> = SessionShared::new(None);
///
/// let session = Session::<2, IN_BUFFER_SIZE, OUT_BUFFER_SIZE>::new(config);
/// let mut runtime = SessionRuntime::new(session, &SHARED, &mut service, &mut events, &mut consumer);
/// runtime.run().await
/// ```
pub struct SessionRuntime<
    'r,
    'a,
    S,
    E,
    C,
    const MAX_TOPICS: usize,
    const IN_CAPACITY: usize,
    const OUT_CAPACITY: usize,
    const DEPTH: usize,
    const PAYLOAD_SIZE: usize,
> where
    S: MqttService + ?Sized,
    E: EventSource,
    C: InboundConsumer + ?Sized,
{
    session: Session<'a, MAX_TOPICS, IN_CAPACITY, OUT_CAPACITY>,
    shared: &'r SessionShared<DEPTH, PAYLOAD_SIZE>,
    service: &'r mut S,
    events: &'r mut E,
    consumer: &'r mut C,
}

impl<
    'r,
    'a,
    S,
    E,
    C,
    const MAX_TOPICS: usize,
    const IN_CAPACITY: usize,
    const OUT_CAPACITY: usize,
    const DEPTH: usize,
    const PAYLOAD_SIZE: usize,
> SessionRuntime<'r, 'a, S, E, C, MAX_TOPICS, IN_CAPACITY, OUT_CAPACITY, DEPTH, PAYLOAD_SIZE>
where
    S: MqttService + ?Sized,
    E: EventSource,
    C: InboundConsumer + ?Sized,
{
    pub fn new(
        session: Session<'a, MAX_TOPICS, IN_CAPACITY, OUT_CAPACITY>,
        shared: &'r SessionShared<DEPTH, PAYLOAD_SIZE>,
        service: &'r mut S,
        events: &'r mut E,
        consumer: &'r mut C,
    ) -> Self {
        Self {
            session,
            shared,
            service,
            events,
            consumer,
        }
    }

    pub fn session(&self) -> &Session<'a, MAX_TOPICS, IN_CAPACITY, OUT_CAPACITY> {
        &self.session
    }

    /// Open the session to application publishes and send the connect request.
    pub fn start(&mut self) {
        self.shared.set_running(true);
        self.session.start(&mut *self.service);
    }

    /// Start the session and process events forever.
    pub async fn run(&mut self) -> ! {
        self.start();
        loop {
            if let Err(err) = self.run_once().await {
                warn!("mqtt_session: {:?}", err);
            }
        }
    }

    /// Wait for one event and dispatch it.
    pub async fn run_once(&mut self) -> Result<(), SessionError> {
        let deadline = self.session.pacing_deadline();
        let pacing = async move {
            match deadline {
                Some(at) => Timer::at(at).await,
                None => core::future::pending::<()>().await,
            }
        };

        let event = match select3(
            self.events.next_event(),
            self.shared.wait_new_data(),
            pacing,
        )
        .await
        {
            Either3::First(event) => SessionEvent::Protocol(event),
            Either3::Second(()) => SessionEvent::NewData,
            Either3::Third(()) => SessionEvent::TimerExpired,
        };

        let mut queue = self.shared;
        let mut ctx = Context::new(&mut *self.service, &mut queue, &mut *self.consumer);
        let result = self.session.dispatch(event, Instant::now(), &mut ctx);
        self.shared.set_ready(self.session.is_ready());
        result
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::cell::RefCell;
    use core::task::Poll;
    use std::collections::VecDeque;
    use std::string::{String, ToString};
    use std::vec::Vec;

    use embassy_futures::{block_on, poll_once};
    use embassy_time::Duration;

    use super::*;
    use crate::config::{DEFAULT_BROKER, SessionConfig};
    use crate::service::{ConnectInfo, PublishOutcome, QoS, RetryId};
    use crate::session::NoopConsumer;

    #[derive(Default)]
    struct Recorder {
        connects: usize,
        published: Vec<(String, Vec<u8>)>,
    }

    impl MqttService for Recorder {
        fn connect(&mut self, _broker: core::net::SocketAddr, _info: &ConnectInfo<'_>) {
            self.connects += 1;
        }

        fn subscribe(&mut self, _topic: &str, _qos: QoS) {}

        fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> PublishOutcome {
            self.published.push((topic.to_string(), payload.to_vec()));
            PublishOutcome::Accepted
        }

        fn publish_retry(&mut self, _id: RetryId) -> PublishOutcome {
            PublishOutcome::Accepted
        }
    }

    /// Hands out queued events; pending while the queue is empty.
    struct Replay<'q>(&'q RefCell<VecDeque<ProtocolEvent<'static>>>);

    impl EventSource for Replay<'_> {
        async fn next_event(&mut self) -> ProtocolEvent<'_> {
            let next = self.0.borrow_mut().pop_front();
            match next {
                Some(event) => event,
                None => core::future::pending().await,
            }
        }
    }

    fn config(pacing_ms: u64) -> SessionConfig<'static, 1> {
        SessionConfig::<1>::new("client_id", DEFAULT_BROKER)
            .with_topic("down")
            .unwrap()
            .with_pacing_interval(Duration::from_millis(pacing_ms))
    }

    #[test]
    fn test_runtime_publishes_after_subscribe() {
        let shared = SessionShared::<2, 16>::new(None);
        let mut service = Recorder::default();
        let queued = RefCell::new(VecDeque::from([
            ProtocolEvent::Connected,
            ProtocolEvent::Subscribed,
        ]));
        let mut events = Replay(&queued);
        let mut consumer = NoopConsumer;

        assert!(shared.enqueue_publish("up", b"x").is_err());

        let mut runtime = SessionRuntime::new(
            Session::<1, 32, 16>::new(config(250)),
            &shared,
            &mut service,
            &mut events,
            &mut consumer,
        );
        runtime.start();
        block_on(runtime.run_once()).unwrap();
        assert!(!shared.is_ready());
        block_on(runtime.run_once()).unwrap();
        assert!(shared.is_ready());

        shared.enqueue_publish("up", b"hello").unwrap();
        block_on(runtime.run_once()).unwrap();
        assert!(runtime.session().is_publishing());
        drop(runtime);

        assert_eq!(service.connects, 1);
        assert_eq!(service.published, [("up".to_string(), b"hello".to_vec())]);
        assert_eq!(shared.pending_count(), 0);
    }

    #[test]
    fn test_runtime_publishes_when_pacing_timer_fires() {
        let shared = SessionShared::<2, 16>::new(None);
        let mut service = Recorder::default();
        let queued = RefCell::new(VecDeque::from([
            ProtocolEvent::Connected,
            ProtocolEvent::Subscribed,
        ]));
        let mut events = Replay(&queued);
        let mut consumer = NoopConsumer;

        let mut runtime = SessionRuntime::new(
            Session::<1, 32, 16>::new(config(200)),
            &shared,
            &mut service,
            &mut events,
            &mut consumer,
        );
        runtime.start();
        block_on(runtime.run_once()).unwrap();
        block_on(runtime.run_once()).unwrap();

        shared.enqueue_publish("up", b"one").unwrap();
        block_on(runtime.run_once()).unwrap();
        queued.borrow_mut().push_back(ProtocolEvent::Published);
        block_on(runtime.run_once()).unwrap();
        assert!(runtime.session().pacing_deadline().is_some());

        // Woken by the new data, but held back by the armed timer.
        shared.enqueue_publish("up", b"two").unwrap();
        block_on(runtime.run_once()).unwrap();
        assert_eq!(shared.pending_count(), 1);

        // Nothing else is pending, so only the timer can end this wait.
        block_on(runtime.run_once()).unwrap();
        assert!(runtime.session().is_publishing());
        assert_eq!(shared.pending_count(), 0);
        drop(runtime);

        assert_eq!(
            service.published,
            [
                ("up".to_string(), b"one".to_vec()),
                ("up".to_string(), b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn test_runtime_settles_deadline_passed_while_receiving() {
        let shared = SessionShared::<2, 16>::new(None);
        let mut service = Recorder::default();
        let queued = RefCell::new(VecDeque::from([
            ProtocolEvent::Connected,
            ProtocolEvent::Subscribed,
            ProtocolEvent::ReceiveBegin {
                topic: "down",
                chunk: b"a",
            },
            ProtocolEvent::ReceiveEnd,
            ProtocolEvent::ReceiveBegin {
                topic: "down",
                chunk: b"b",
            },
        ]));
        let mut events = Replay(&queued);
        let mut consumer = NoopConsumer;

        let mut runtime = SessionRuntime::new(
            Session::<1, 32, 16>::new(config(200)),
            &shared,
            &mut service,
            &mut events,
            &mut consumer,
        );
        runtime.start();
        for _ in 0..5 {
            block_on(runtime.run_once()).unwrap();
        }
        assert!(runtime.session().is_receiving());
        assert!(runtime.session().pacing_deadline().is_some());

        std::thread::sleep(std::time::Duration::from_millis(300));

        // The passed deadline fires once and is consumed.
        block_on(runtime.run_once()).unwrap();
        assert!(runtime.session().is_receiving());
        assert_eq!(runtime.session().pacing_deadline(), None);

        // With no event, data or deadline left the runtime must wait.
        assert!(matches!(poll_once(runtime.run_once()), Poll::Pending));

        queued.borrow_mut().push_back(ProtocolEvent::ReceiveEnd);
        block_on(runtime.run_once()).unwrap();
        assert!(!runtime.session().is_receiving());
        assert!(runtime.session().pacing_deadline().is_some());
    }
}
