//! # MQTT Service Abstraction
//!
//! This module defines the `MqttService` trait, the contract of the library layer that
//! owns the wire protocol and the connection. The session never encodes packets itself:
//! it asks the service to connect, subscribe and publish, and learns about the results
//! through [`ProtocolEvent`](crate::event::ProtocolEvent)s.
//!
//! Every method is non-blocking. A call only queues work in the library; completion is
//! reported later as an event.

use core::net::SocketAddr;

use crate::config::{KEEPALIVE_SECS, KEEPALIVE_TIMEOUT_SECS, RETRY_TIMEOUT_SECS};

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// Library-assigned token identifying a failed publish that can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryId(pub u16);

/// Immediate result of handing a publish to the library layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishOutcome {
    /// The publish is on its way; `Published` or `PublishFailed` will follow.
    Accepted,
    /// The publish could not be started and may be retried with the given id.
    Failed(RetryId),
    /// Invalid topic, or the message does not fit the library's output buffer.
    Invalid,
}

/// Connection parameters passed to [`MqttService::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectInfo<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    /// Interval between keep-alive pings, in seconds.
    pub keepalive: u16,
    /// Time without broker traffic after which the connection is considered dead.
    pub keepalive_timeout: u16,
    /// Delay before the library retransmits an unacknowledged packet, in seconds.
    pub retry_timeout: u16,
    pub clean_session: bool,
}

impl<'a> ConnectInfo<'a> {
    pub const fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            username: None,
            password: None,
            keepalive: KEEPALIVE_SECS,
            keepalive_timeout: KEEPALIVE_TIMEOUT_SECS,
            retry_timeout: RETRY_TIMEOUT_SECS,
            clean_session: true,
        }
    }
}

/// A trait representing the MQTT library layer used by the session.
pub trait MqttService {
    /// Starts connecting to the broker.
    fn connect(&mut self, broker: SocketAddr, info: &ConnectInfo<'_>);

    /// Requests a subscription to a single topic.
    fn subscribe(&mut self, topic: &str, qos: QoS);

    /// Starts publishing a message.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> PublishOutcome;

    /// Starts retransmitting a publish that previously failed.
    fn publish_retry(&mut self, id: RetryId) -> PublishOutcome;
}

impl<S: MqttService + ?Sized> MqttService for &mut S {
    fn connect(&mut self, broker: SocketAddr, info: &ConnectInfo<'_>) {
        (**self).connect(broker, info)
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) {
        (**self).subscribe(topic, qos)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> PublishOutcome {
        (**self).publish(topic, payload, qos)
    }

    fn publish_retry(&mut self, id: RetryId) -> PublishOutcome {
        (**self).publish_retry(id)
    }
}
