//! Example: Driving a session with `SessionRuntime`
//!
//! A light controller subscribes to a command topic, switches on when it
//! receives `ON` and reports its state through `SessionShared`. The broker is
//! an in-memory loopback that acknowledges every request, so the example runs
//! on the host:
//!
//! ```text
//! cargo run --example session_runtime
//! ```
//!
//! # Key Concepts
//!
//! - Keep `SessionShared` in a `static` so any task can queue publishes
//! - Implement `InboundConsumer` to handle reassembled messages
//! - Implement `MqttService` and `EventSource` on top of your MQTT library
//! - Call `run()` from an embassy task; here `run_once()` is stepped by hand

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use std::net::SocketAddr;

use embassy_futures::block_on;
use myrtio_mqtt_session::config::{DEFAULT_BROKER, IN_BUFFER_SIZE, OUT_BUFFER_SIZE};
use myrtio_mqtt_session::service::ConnectInfo;
use myrtio_mqtt_session::{
    EventSource, InboundConsumer, InboundMessage, MqttService, ProtocolEvent, PublishOutcome, QoS,
    RetryId, Session, SessionConfig, SessionRuntime, SessionShared,
};

const CMD_TOPIC: &str = "device/light/cmd";
const STATE_TOPIC: &str = "device/light/state";

/// Publishes without a topic go to the state topic.
static SHARED: SessionShared<4, 64> = SessionShared::new(Some(STATE_TOPIC));

static LIGHT_ON: AtomicBool = AtomicBool::new(false);

type Events = RefCell<VecDeque<ProtocolEvent<'static>>>;

/// Acknowledges every request by queueing the matching event.
struct LoopbackBroker<'q> {
    events: &'q Events,
}

impl MqttService for LoopbackBroker<'_> {
    fn connect(&mut self, broker: SocketAddr, info: &ConnectInfo<'_>) {
        println!("connect {} as {}", broker, info.client_id);
        self.events.borrow_mut().push_back(ProtocolEvent::Connected);
    }

    fn subscribe(&mut self, topic: &str, _qos: QoS) {
        println!("subscribe {}", topic);
        self.events.borrow_mut().push_back(ProtocolEvent::Subscribed);
    }

    fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> PublishOutcome {
        println!("publish {} {}", topic, String::from_utf8_lossy(payload));
        self.events.borrow_mut().push_back(ProtocolEvent::Published);
        PublishOutcome::Accepted
    }

    fn publish_retry(&mut self, id: RetryId) -> PublishOutcome {
        println!("retry {:?}", id);
        self.events.borrow_mut().push_back(ProtocolEvent::Published);
        PublishOutcome::Accepted
    }
}

/// Receive side of the loopback broker.
struct Received<'q> {
    events: &'q Events,
}

impl EventSource for Received<'_> {
    async fn next_event(&mut self) -> ProtocolEvent<'_> {
        let next = self.events.borrow_mut().pop_front();
        match next {
            Some(event) => event,
            None => core::future::pending().await,
        }
    }
}

/// Switches the light on `ON` and off on `OFF`.
struct LightModule;

impl InboundConsumer for LightModule {
    fn on_message(&mut self, msg: &InboundMessage<'_>) {
        if msg.topic != CMD_TOPIC {
            return;
        }
        match msg.payload {
            b"ON" => LIGHT_ON.store(true, Ordering::Relaxed),
            b"OFF" => LIGHT_ON.store(false, Ordering::Relaxed),
            _ => {}
        }
    }
}

fn main() {
    let events = Events::default();
    let mut broker = LoopbackBroker { events: &events };
    let mut received = Received { events: &events };
    let mut light = LightModule;

    let config = SessionConfig::<1>::new("light-01", DEFAULT_BROKER)
        .with_topic(CMD_TOPIC)
        .expect("topic fits the registry");
    let session = Session::<1, IN_BUFFER_SIZE, OUT_BUFFER_SIZE>::new(config);
    let mut runtime = SessionRuntime::new(session, &SHARED, &mut broker, &mut received, &mut light);

    runtime.start();
    while !SHARED.is_ready() {
        block_on(runtime.run_once()).expect("subscribe sequence");
    }

    // The broker forwards a command in two chunks.
    {
        let mut queued = events.borrow_mut();
        queued.push_back(ProtocolEvent::ReceiveBegin {
            topic: CMD_TOPIC,
            chunk: b"O",
        });
        queued.push_back(ProtocolEvent::ReceiveContinuation(b"N"));
        queued.push_back(ProtocolEvent::ReceiveEnd);
    }
    for _ in 0..3 {
        block_on(runtime.run_once()).expect("inbound message");
    }

    let state: &[u8] = if LIGHT_ON.load(Ordering::Relaxed) {
        b"{\"state\":\"ON\"}"
    } else {
        b"{\"state\":\"OFF\"}"
    };
    SHARED.enqueue_publish("", state).expect("state queued");

    // Waits out the pacing interval that followed the inbound message.
    while SHARED.pending_count() > 0 || runtime.session().is_publishing() {
        block_on(runtime.run_once()).expect("state publish");
    }
}
