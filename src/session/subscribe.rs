//! Ordered subscription handshake.

use crate::registry::TopicRegistry;
use crate::service::{MqttService, QoS};

/// Walks the subscribe sequence one topic at a time.
///
/// `step` is the 1-based position of the topic currently requested. It starts at 1
/// on every connect, only moves forward on `Subscribed` and reaches `len + 1` once
/// every topic was acknowledged, at which point the session is ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeSequencer {
    step: Option<usize>,
}

impl SubscribeSequencer {
    pub const fn new() -> Self {
        Self { step: None }
    }

    /// Current step, `None` while not connected.
    pub fn step(&self) -> Option<usize> {
        self.step
    }

    /// Whether every topic of `topics` has been acknowledged.
    pub fn is_ready<const N: usize>(&self, topics: &TopicRegistry<N>) -> bool {
        self.step == Some(topics.len() + 1)
    }

    /// Whether a subscription request is outstanding.
    pub fn is_subscribing<const N: usize>(&self, topics: &TopicRegistry<N>) -> bool {
        matches!(self.step, Some(step) if step <= topics.len())
    }

    /// Restart the sequence from the first topic.
    pub fn on_connected<S, const N: usize>(
        &mut self,
        topics: &TopicRegistry<N>,
        qos: QoS,
        service: &mut S,
    ) where
        S: MqttService + ?Sized,
    {
        self.step = Some(1);
        self.request(topics, qos, service);
    }

    /// Re-issue the request for the current topic.
    pub fn on_subscribe_failed<S, const N: usize>(
        &mut self,
        topics: &TopicRegistry<N>,
        qos: QoS,
        service: &mut S,
    ) where
        S: MqttService + ?Sized,
    {
        if !self.is_subscribing(topics) {
            warn!("mqtt_session: unexpected subscribe failure, ignored");
            return;
        }
        warn!("mqtt_session: retrying subscribe");
        self.request(topics, qos, service);
    }

    /// Move on to the next topic, or finish the sequence.
    pub fn on_subscribed<S, const N: usize>(
        &mut self,
        topics: &TopicRegistry<N>,
        qos: QoS,
        service: &mut S,
    ) where
        S: MqttService + ?Sized,
    {
        let Some(step) = self.step.filter(|&step| step <= topics.len()) else {
            warn!("mqtt_session: unexpected subscribe acknowledgement, ignored");
            return;
        };
        debug!("mqtt_session: subscribed successful");
        self.step = Some(step + 1);
        self.request(topics, qos, service);
    }

    /// Forget the sequence, e.g. after the connection dropped.
    pub fn reset(&mut self) {
        self.step = None;
    }

    fn request<S, const N: usize>(&self, topics: &TopicRegistry<N>, qos: QoS, service: &mut S)
    where
        S: MqttService + ?Sized,
    {
        let Some(step) = self.step else {
            return;
        };
        match topics.get(step - 1) {
            Some(topic) => {
                debug!("mqtt_session: subscribing to {}", topic);
                service.subscribe(topic, qos);
            }
            None => info!("mqtt_session: all {} subscriptions done", topics.len()),
        }
    }
}
