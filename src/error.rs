//! # Error Types
//!
//! This module defines the error types used throughout the bridge, from malformed
//! inbound frames up to transport failures surfaced by the client.
//!
//! Decoding failures never leave the crate: an inbound frame that fails to decode is
//! rejected back to the transport and dropped. Everything else is returned to the
//! caller of the client operation that triggered it.

use core::fmt;

/// Reasons a string is not a valid topic or subscription pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicError {
    /// The topic is the empty string.
    Empty,
    /// The topic is longer than the bridge can store.
    TooLong {
        max_length: usize,
        actual_length: usize,
    },
    /// A byte outside `[a-zA-Z0-9_-/]` (plus whole-segment wildcards for patterns).
    InvalidCharacter { position: usize },
    /// A wildcard shares its segment with other characters, or `#` is not last.
    MisplacedWildcard { position: usize },
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicError::Empty => write!(f, "topic is empty"),
            TopicError::TooLong {
                max_length,
                actual_length,
            } => write!(
                f,
                "topic length {} exceeds maximum {}",
                actual_length, max_length
            ),
            TopicError::InvalidCharacter { position } => {
                write!(f, "invalid topic character at byte {}", position)
            }
            TopicError::MisplacedWildcard { position } => {
                write!(f, "misplaced wildcard at byte {}", position)
            }
        }
    }
}

impl core::error::Error for TopicError {}

/// Reasons an inbound buffer is not a well-formed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The buffer is empty or does not start with `@`.
    EmptyOrMalformed,
    /// The buffer exceeds the configured maximum frame size.
    TooLarge { max_size: usize, actual_size: usize },
    /// No `@` closes the topic token.
    MissingTopicDelimiter,
    /// No `@` closes the length token.
    MissingLengthDelimiter,
    /// The length token is empty, not decimal, or overflows.
    InvalidLength,
    /// Fewer payload bytes remain than the length token declares.
    TruncatedPayload { declared: usize, available: usize },
    /// The topic token violates the topic grammar.
    InvalidTopic(TopicError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyOrMalformed => write!(f, "frame is empty or lacks a leading '@'"),
            DecodeError::TooLarge {
                max_size,
                actual_size,
            } => write!(
                f,
                "frame size {} exceeds maximum {}",
                actual_size, max_size
            ),
            DecodeError::MissingTopicDelimiter => write!(f, "frame has no topic delimiter"),
            DecodeError::MissingLengthDelimiter => write!(f, "frame has no length delimiter"),
            DecodeError::InvalidLength => write!(f, "frame length field is not a decimal number"),
            DecodeError::TruncatedPayload {
                declared,
                available,
            } => write!(
                f,
                "frame declares {} payload bytes but only {} remain",
                declared, available
            ),
            DecodeError::InvalidTopic(e) => write!(f, "frame topic is invalid: {}", e),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Encoding failures. A valid topic always encodes; only the output buffer can be short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The output buffer cannot hold the whole frame.
    BufferTooSmall { required: usize, available: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::BufferTooSmall {
                required,
                available,
            } => write!(
                f,
                "frame needs {} bytes but buffer holds {}",
                required, available
            ),
        }
    }
}

impl core::error::Error for EncodeError {}

/// Subscription registry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// The pattern is not a valid subscription pattern.
    InvalidPattern(TopicError),
    /// Every subscription slot is taken.
    Full { max_subscriptions: usize },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidPattern(e) => write!(f, "invalid subscription pattern: {}", e),
            RegistryError::Full { max_subscriptions } => {
                write!(f, "subscription limit of {} reached", max_subscriptions)
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// The primary error enum for the bridge client.
///
/// It is generic over the transport error type `E`, so failures reported by the
/// platform or session keep their concrete type.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeError<E> {
    /// The transport subsystem failed to initialize.
    PlatformInit(E),
    /// The transport refused to create a session, or to configure it.
    SessionCreationFailed(E),
    /// The transport refused a send submission. Not retried.
    SendRejected(E),
    /// The operation needs a live session.
    NotConnected,
    /// `connect` was called on a client that already holds a session.
    AlreadyConnected,
    /// A topic passed to the client is not valid.
    InvalidTopic(TopicError),
    /// The subscription registry refused the pattern.
    Registry(RegistryError),
    /// The outbound frame does not fit the client's frame buffer.
    Encode(EncodeError),
    /// The delivery loop observed its cancellation token.
    Cancelled,
}

impl<E> From<TopicError> for BridgeError<E> {
    fn from(err: TopicError) -> Self {
        BridgeError::InvalidTopic(err)
    }
}

impl<E> From<RegistryError> for BridgeError<E> {
    fn from(err: RegistryError) -> Self {
        BridgeError::Registry(err)
    }
}

impl<E> From<EncodeError> for BridgeError<E> {
    fn from(err: EncodeError) -> Self {
        BridgeError::Encode(err)
    }
}

impl<E: fmt::Debug> fmt::Display for BridgeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::PlatformInit(e) => write!(f, "transport init failed: {:?}", e),
            BridgeError::SessionCreationFailed(e) => {
                write!(f, "session creation failed: {:?}", e)
            }
            BridgeError::SendRejected(e) => write!(f, "transport rejected send: {:?}", e),
            BridgeError::NotConnected => write!(f, "not connected"),
            BridgeError::AlreadyConnected => write!(f, "already connected"),
            BridgeError::InvalidTopic(e) => write!(f, "{}", e),
            BridgeError::Registry(e) => write!(f, "{}", e),
            BridgeError::Encode(e) => write!(f, "{}", e),
            BridgeError::Cancelled => write!(f, "delivery cancelled"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for BridgeError<E> {}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_component_errors_lift_into_bridge_error() {
        let e: BridgeError<()> = TopicError::Empty.into();
        assert!(matches!(e, BridgeError::InvalidTopic(TopicError::Empty)));

        let e: BridgeError<()> = RegistryError::Full {
            max_subscriptions: 4,
        }
        .into();
        assert!(matches!(
            e,
            BridgeError::Registry(RegistryError::Full {
                max_subscriptions: 4
            })
        ));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            DecodeError::TruncatedPayload {
                declared: 5,
                available: 2
            }
            .to_string(),
            "frame declares 5 payload bytes but only 2 remain"
        );
        assert_eq!(
            BridgeError::<u8>::SendRejected(7).to_string(),
            "transport rejected send: 7"
        );
    }
}
