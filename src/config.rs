//! Session configuration and fixed sizing constants.

use core::net::{IpAddr, Ipv6Addr, SocketAddr};

use embassy_time::Duration;

use crate::error::{RequestError, SessionError};
use crate::registry::TopicRegistry;
use crate::service::{ConnectInfo, QoS};

/// Maximum size of a reassembled inbound message.
pub const IN_BUFFER_SIZE: usize = 512;

/// Maximum number of payload bytes handed to the library per publish.
pub const OUT_BUFFER_SIZE: usize = 128;

/// Maximum length for a single topic string.
pub const MAX_TOPIC_LEN: usize = 128;

/// Delay between the last inbound or outbound transaction and the next publish.
///
/// The broker allows a single inbound message in flight, so outbound data is held
/// back briefly to avoid colliding with it.
pub const PACING_INTERVAL: Duration = Duration::from_millis(250);

pub const DEFAULT_PORT: u16 = 1883;

pub const KEEPALIVE_SECS: u16 = 40;
pub const KEEPALIVE_TIMEOUT_SECS: u16 = 60;
pub const RETRY_TIMEOUT_SECS: u16 = 5;

/// Default broker address, `aaaa::1`, the border router of a 6LoWPAN network.
pub const DEFAULT_BROKER: SocketAddr = SocketAddr::new(
    IpAddr::V6(Ipv6Addr::new(0xaaaa, 0, 0, 0, 0, 0, 0, 1)),
    DEFAULT_PORT,
);

/// Configuration for a [`Session`](crate::session::Session).
///
/// ```ignore
/// let config = SessionConfig::<2>::new("client_id", DEFAULT_BROKER)
///     .with_topic("sub_topic_1")?
///     .with_topic("sub_topic_2")?;
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig<'a, const MAX_TOPICS: usize> {
    pub broker: SocketAddr,
    pub connect: ConnectInfo<'a>,
    /// Topics subscribed to, in order, after every connect.
    pub topics: TopicRegistry<MAX_TOPICS>,
    pub subscribe_qos: QoS,
    pub publish_qos: QoS,
    pub pacing_interval: Duration,
}

impl<'a, const MAX_TOPICS: usize> SessionConfig<'a, MAX_TOPICS> {
    pub fn new(client_id: &'a str, broker: SocketAddr) -> Self {
        Self {
            broker,
            connect: ConnectInfo::new(client_id),
            topics: TopicRegistry::new(),
            subscribe_qos: QoS::AtMostOnce,
            publish_qos: QoS::AtMostOnce,
            pacing_interval: PACING_INTERVAL,
        }
    }

    /// Appends a topic to the subscribe sequence.
    pub fn with_topic(mut self, topic: &str) -> Result<Self, SessionError> {
        if topic.is_empty() {
            return Err(RequestError::EmptyTopic.into());
        }
        if topic.len() > MAX_TOPIC_LEN {
            return Err(RequestError::TopicTooLong.into());
        }
        if self.topics.is_full() || !self.topics.add_topic(topic) {
            return Err(RequestError::TooManyTopics.into());
        }
        Ok(self)
    }

    pub fn with_credentials(mut self, username: &'a str, password: &'a str) -> Self {
        self.connect.username = Some(username);
        self.connect.password = Some(password);
        self
    }

    pub fn with_keepalive(mut self, keepalive: u16, timeout: u16) -> Self {
        self.connect.keepalive = keepalive;
        self.connect.keepalive_timeout = timeout;
        self
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.connect.clean_session = clean_session;
        self
    }

    pub fn with_pacing_interval(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    pub fn with_subscribe_qos(mut self, qos: QoS) -> Self {
        self.subscribe_qos = qos;
        self
    }

    pub fn with_publish_qos(mut self, qos: QoS) -> Self {
        self.publish_qos = qos;
        self
    }
}
