//! Session Dispatcher
//!
//! The session is an explicit state machine driven by [`Session::dispatch`]. Each call
//! handles one event to completion and returns; nothing blocks. The caller owns the
//! wait between events (see [`runtime`](crate::runtime) for an embassy driver).
//!
//! # Sequencing
//!
//! - On `Connected` the subscribe sequence restarts from the first topic. The session
//!   is ready once every topic has been acknowledged in order.
//! - An inbound message and an outbound publish are never started concurrently by the
//!   session: publishing is only permitted while neither is in flight.
//! - After each event, if the session is ready, publishing is permitted and the pacing
//!   timer expired, the publish scheduler decides what to send next.

pub mod inbound;
pub mod publish;
pub mod subscribe;

use embassy_time::Instant;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event::{ProtocolEvent, SessionEvent};
use crate::queue::OutwardQueue;
use crate::service::{MqttService, RetryId};

pub use inbound::{InboundAssembler, InboundConsumer, InboundMessage, NoopConsumer};
pub use publish::{Attempt, PacingTimer, PublishScheduler};
pub use subscribe::SubscribeSequencer;

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Waiting for the acknowledgement of topic number `step` (1-based).
    Subscribing { step: usize },
    Ready,
}

/// The collaborators a dispatched event may touch.
pub struct Context<'c, S, Q, C>
where
    S: ?Sized,
    Q: ?Sized,
    C: ?Sized,
{
    pub service: &'c mut S,
    pub queue: &'c mut Q,
    pub consumer: &'c mut C,
}

impl<'c, S, Q, C> Context<'c, S, Q, C>
where
    S: MqttService + ?Sized,
    Q: OutwardQueue + ?Sized,
    C: InboundConsumer + ?Sized,
{
    pub fn new(service: &'c mut S, queue: &'c mut Q, consumer: &'c mut C) -> Self {
        Self {
            service,
            queue,
            consumer,
        }
    }
}

/// Client session for a single broker.
///
/// # Type Parameters
///
/// - `MAX_TOPICS`: Capacity of the subscribe sequence
/// - `IN_CAPACITY`: Maximum size of a reassembled inbound message
/// - `OUT_CAPACITY`: Maximum payload handed to the library per publish
pub struct Session<'a, const MAX_TOPICS: usize, const IN_CAPACITY: usize, const OUT_CAPACITY: usize>
{
    config: SessionConfig<'a, MAX_TOPICS>,
    started: bool,
    subscriber: SubscribeSequencer,
    inbound: InboundAssembler<IN_CAPACITY>,
    publisher: PublishScheduler<OUT_CAPACITY>,
}

impl<'a, const MAX_TOPICS: usize, const IN_CAPACITY: usize, const OUT_CAPACITY: usize>
    Session<'a, MAX_TOPICS, IN_CAPACITY, OUT_CAPACITY>
{
    pub fn new(config: SessionConfig<'a, MAX_TOPICS>) -> Self {
        let publisher = PublishScheduler::new(config.pacing_interval);
        Self {
            config,
            started: false,
            subscriber: SubscribeSequencer::new(),
            inbound: InboundAssembler::new(),
            publisher,
        }
    }

    pub fn config(&self) -> &SessionConfig<'a, MAX_TOPICS> {
        &self.config
    }

    /// Send the connect request. Only the first call has an effect.
    pub fn start<S: MqttService + ?Sized>(&mut self, service: &mut S) {
        if self.started {
            return;
        }
        self.started = true;
        self.connect(service);
    }

    pub fn state(&self) -> SessionState {
        if !self.started {
            return SessionState::Disconnected;
        }
        match self.subscriber.step() {
            None => SessionState::Connecting,
            Some(_) if self.subscriber.is_ready(&self.config.topics) => SessionState::Ready,
            Some(step) => SessionState::Subscribing { step },
        }
    }

    /// Whether every subscription has been acknowledged since the last connect.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Whether no inbound or outbound transaction is in flight on a live connection.
    pub fn allowed_to_publish(&self) -> bool {
        self.subscriber.step().is_some()
            && !self.inbound.is_active()
            && !self.publisher.is_in_flight()
    }

    /// Whether an inbound message is being received.
    pub fn is_receiving(&self) -> bool {
        self.inbound.is_active()
    }

    /// Whether a publish is awaiting its outcome.
    pub fn is_publishing(&self) -> bool {
        self.publisher.is_in_flight()
    }

    pub fn retry_pending(&self) -> Option<RetryId> {
        self.publisher.retry_pending()
    }

    /// When the pacing timer runs out, `None` while it is stopped.
    pub fn pacing_deadline(&self) -> Option<Instant> {
        self.publisher.timer().deadline()
    }

    /// Handle one event.
    ///
    /// Protocol events are routed first; then, if the session is ready, permitted to
    /// publish and the pacing timer expired, the next publish is started. Returns
    /// [`SessionError::BufferOverflow`] when an inbound message had to be discarded.
    pub fn dispatch<S, Q, C>(
        &mut self,
        event: SessionEvent<'_>,
        now: Instant,
        ctx: &mut Context<'_, S, Q, C>,
    ) -> Result<(), SessionError>
    where
        S: MqttService + ?Sized,
        Q: OutwardQueue + ?Sized,
        C: InboundConsumer + ?Sized,
    {
        let routed = match event {
            SessionEvent::Protocol(event) => self.route(event, now, ctx),
            SessionEvent::TimerExpired => {
                trace!("mqtt_session: pacing timer expired");
                Ok(())
            }
            SessionEvent::NewData => {
                trace!("mqtt_session: new outbound data");
                Ok(())
            }
        };
        self.poll_publish(now, ctx);
        routed
    }

    fn route<S, Q, C>(
        &mut self,
        event: ProtocolEvent<'_>,
        now: Instant,
        ctx: &mut Context<'_, S, Q, C>,
    ) -> Result<(), SessionError>
    where
        S: MqttService + ?Sized,
        Q: OutwardQueue + ?Sized,
        C: InboundConsumer + ?Sized,
    {
        let topics = &self.config.topics;
        let qos = self.config.subscribe_qos;

        match event {
            ProtocolEvent::Connected => {
                info!("mqtt_session: connected");
                if self.inbound.is_active() {
                    warn!("mqtt_session: connected while receiving, message dropped");
                }
                self.inbound.reset();
                self.publisher.on_connection_reset();
                self.subscriber.on_connected(topics, qos, &mut *ctx.service);
            }
            ProtocolEvent::Disconnected => {
                warn!("mqtt_session: connection lost, reconnecting");
                self.inbound.reset();
                self.publisher.on_connection_reset();
                self.subscriber.reset();
                self.connect(&mut *ctx.service);
            }
            ProtocolEvent::Subscribed => self.subscriber.on_subscribed(topics, qos, &mut *ctx.service),
            ProtocolEvent::SubscribeFailed => {
                self.subscriber.on_subscribe_failed(topics, qos, &mut *ctx.service)
            }
            ProtocolEvent::ReceiveBegin { topic, chunk } => return self.inbound.begin(topic, chunk),
            ProtocolEvent::ReceiveContinuation(chunk) => return self.inbound.append(chunk),
            ProtocolEvent::ReceiveEnd => {
                self.inbound.finish(&mut *ctx.consumer);
                self.publisher.arm(now);
            }
            ProtocolEvent::Published => self.publisher.on_published(now),
            ProtocolEvent::PublishFailed(id) => self.publisher.on_publish_failed(id, now),
        }
        Ok(())
    }

    fn poll_publish<S, Q, C>(&mut self, now: Instant, ctx: &mut Context<'_, S, Q, C>)
    where
        S: MqttService + ?Sized,
        Q: OutwardQueue + ?Sized,
        C: InboundConsumer + ?Sized,
    {
        // Polled first: a passed deadline collapses to stopped even while publishing is
        // blocked, so the runtime does not keep waking on it.
        let expired = self.publisher.poll_timer(now);
        if !expired || !self.is_ready() || !self.allowed_to_publish() {
            return;
        }
        match self
            .publisher
            .decide(now, self.config.publish_qos, &mut *ctx.service, &mut *ctx.queue)
        {
            Ok(attempt) => trace!("mqtt_session: publish decision {:?}", attempt),
            Err(err) => debug!("mqtt_session: publish attempt settled with {:?}", err),
        }
    }

    fn connect<S: MqttService + ?Sized>(&self, service: &mut S) {
        info!(
            "mqtt_session: connecting as {}",
            self.config.connect.client_id
        );
        service.connect(self.config.broker, &self.config.connect);
    }
}
