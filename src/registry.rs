//! The ordered list of topics subscribed to after every connect.

use heapless::{String, Vec};

use crate::config::MAX_TOPIC_LEN;

/// A fixed-capacity, ordered list of subscription topics.
///
/// The registry owns the topic strings (copies them on add). Order is preserved:
/// the session subscribes to `get(0)` first and only moves on to `get(1)` once the
/// broker acknowledged it.
///
/// # Example
///
/// ```ignore
/// let mut registry = TopicRegistry::<8>::new();
/// registry.add_topic("device/cmd");
///
/// assert_eq!(registry.get(0), Some("device/cmd"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry<const MAX_TOPICS: usize> {
    topics: Vec<String<MAX_TOPIC_LEN>, MAX_TOPICS>,
}

impl<const MAX_TOPICS: usize> TopicRegistry<MAX_TOPICS> {
    /// Create a new empty topic registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a topic to the end of the sequence by copying the string.
    ///
    /// Returns `true` if successful, `false` if the registry is full
    /// or the topic is too long.
    pub fn add_topic(&mut self, topic: &str) -> bool {
        if topic.len() > MAX_TOPIC_LEN {
            return false;
        }

        let mut owned = String::new();
        if owned.push_str(topic).is_err() {
            return false;
        }

        self.topics.push(owned).is_ok()
    }

    /// Get the topic at `index` in subscription order.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(|s| s.as_str())
    }

    /// Get the number of registered topics.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Check if no further topic can be added.
    pub fn is_full(&self) -> bool {
        self.topics.len() == MAX_TOPICS
    }
}
