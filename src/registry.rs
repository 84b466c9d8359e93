//! Subscription registry.

use heapless::{String, Vec};

use crate::error::{RegistryError, TopicError};
use crate::topic::{self, MAX_TOPIC_LEN, Topic, TopicPattern};

/// The set of patterns the device is subscribed to.
///
/// The registry owns the pattern strings (copies them on subscribe). Patterns are unique
/// by exact string identity; `a/+` and `a/#` are different entries even where their
/// matches overlap, and nothing is canonicalized.
///
/// # Example
///
/// ```ignore
/// let mut registry = SubscriptionRegistry::<8>::new();
/// registry.subscribe("sensors/+/temp")?;
///
/// let topic = Topic::new("sensors/room1/temp")?;
/// assert!(registry.resolve(&topic));
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionRegistry<const MAX_SUBSCRIPTIONS: usize> {
    patterns: Vec<String<MAX_TOPIC_LEN>, MAX_SUBSCRIPTIONS>,
}

impl<const MAX_SUBSCRIPTIONS: usize> SubscriptionRegistry<MAX_SUBSCRIPTIONS> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern by copying the string.
    ///
    /// Returns `Ok(true)` if the pattern was inserted and `Ok(false)` if it was already
    /// present.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidPattern` for malformed patterns (including a `#`
    /// that is not the final segment) and `RegistryError::Full` when every slot is taken.
    pub fn subscribe(&mut self, pattern: &str) -> Result<bool, RegistryError> {
        let pattern = TopicPattern::new(pattern).map_err(RegistryError::InvalidPattern)?;
        if self.contains(pattern.as_str()) {
            return Ok(false);
        }

        let mut owned = String::new();
        owned
            .push_str(pattern.as_str())
            .map_err(|_| RegistryError::InvalidPattern(TopicError::TooLong {
                max_length: MAX_TOPIC_LEN,
                actual_length: pattern.as_str().len(),
            }))?;

        self.patterns
            .push(owned)
            .map_err(|_| RegistryError::Full {
                max_subscriptions: MAX_SUBSCRIPTIONS,
            })?;
        Ok(true)
    }

    /// Remove a pattern. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, pattern: &str) -> bool {
        match self.patterns.iter().position(|p| p.as_str() == pattern) {
            Some(idx) => {
                self.patterns.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Whether an inbound message on `topic` should be delivered.
    ///
    /// An exact entry is looked up first. On a miss every wildcard entry is tried; a
    /// topic may match several entries and any single one is enough.
    pub fn resolve(&self, topic: &Topic<'_>) -> bool {
        let topic = topic.as_str();
        self.contains(topic)
            || self
                .patterns
                .iter()
                .filter(|p| topic::has_wildcards(p.as_str()))
                .any(|p| topic::matches(p.as_str(), topic))
    }

    /// Whether `pattern` is subscribed verbatim.
    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p.as_str() == pattern)
    }

    /// Iterate over the subscribed patterns.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|s| s.as_str())
    }

    /// Get the number of subscribed patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.patterns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str) -> Topic<'_> {
        Topic::new(name).unwrap()
    }

    #[test]
    fn test_wildcard_subscription_lifecycle() {
        let mut registry = SubscriptionRegistry::<4>::new();
        assert_eq!(registry.subscribe("sensors/+/temp"), Ok(true));

        assert!(registry.resolve(&topic("sensors/room1/temp")));
        assert!(!registry.resolve(&topic("sensors/room1/humidity")));

        assert!(registry.unsubscribe("sensors/+/temp"));
        assert!(!registry.resolve(&topic("sensors/room1/temp")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_exact_subscription() {
        let mut registry = SubscriptionRegistry::<4>::new();
        registry.subscribe("device/cmd").unwrap();
        assert!(registry.resolve(&topic("device/cmd")));
        assert!(!registry.resolve(&topic("device/cmd/extra")));
        assert!(!registry.resolve(&topic("device")));
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut registry = SubscriptionRegistry::<2>::new();
        assert_eq!(registry.subscribe("a/b"), Ok(true));
        assert_eq!(registry.subscribe("a/b"), Ok(false));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let mut registry = SubscriptionRegistry::<2>::new();
        registry.subscribe("a/b").unwrap();
        assert!(!registry.unsubscribe("a/c"));
        // No canonicalization: a wildcard is not the same entry as what it matches.
        assert!(!registry.unsubscribe("a/+"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_overlapping_subscriptions() {
        let mut registry = SubscriptionRegistry::<4>::new();
        registry.subscribe("sensors/temp").unwrap();
        registry.subscribe("sensors/#").unwrap();

        assert!(registry.resolve(&topic("sensors/temp")));
        assert!(registry.resolve(&topic("sensors/humidity")));

        registry.unsubscribe("sensors/temp");
        assert!(registry.resolve(&topic("sensors/temp")));

        registry.unsubscribe("sensors/#");
        assert!(!registry.resolve(&topic("sensors/temp")));
    }

    #[test]
    fn test_rejects_malformed_patterns() {
        let mut registry = SubscriptionRegistry::<4>::new();
        assert_eq!(
            registry.subscribe("a/#/c"),
            Err(RegistryError::InvalidPattern(TopicError::MisplacedWildcard {
                position: 2
            }))
        );
        assert_eq!(
            registry.subscribe(""),
            Err(RegistryError::InvalidPattern(TopicError::Empty))
        );
        assert_eq!(
            registry.subscribe("a b"),
            Err(RegistryError::InvalidPattern(TopicError::InvalidCharacter {
                position: 1
            }))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_full_registry() {
        let mut registry = SubscriptionRegistry::<2>::new();
        registry.subscribe("a").unwrap();
        registry.subscribe("b").unwrap();
        assert_eq!(
            registry.subscribe("c"),
            Err(RegistryError::Full {
                max_subscriptions: 2
            })
        );
        // Re-subscribing an existing pattern never needs a slot.
        assert_eq!(registry.subscribe("a"), Ok(false));
    }

    #[test]
    fn test_iter_and_clear() {
        let mut registry = SubscriptionRegistry::<4>::new();
        registry.subscribe("a/+").unwrap();
        registry.subscribe("b/#").unwrap();
        assert!(registry.iter().any(|p| p == "a/+"));
        assert!(registry.contains("b/#"));

        registry.clear();
        assert_eq!(registry.iter().count(), 0);
    }
}
