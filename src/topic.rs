//! Topics, subscription patterns, and wildcard matching.
//!
//! A topic is a `/`-separated path whose segments use `[a-zA-Z0-9_-]`. A subscription
//! pattern is a topic that may also contain the MQTT wildcards as whole segments:
//!
//! - `+` matches exactly one topic segment
//! - `#` matches everything from its position onward, and must be the last segment
//!
//! Wildcards only have meaning on the pattern side. A valid [`Topic`] can never contain
//! them, so a published topic cannot accidentally act as a filter.

use core::fmt;

use crate::error::TopicError;

/// Maximum length for a single topic or pattern string.
pub const MAX_TOPIC_LEN: usize = 128;

/// Separator between topic segments.
pub const LEVEL_SEPARATOR: char = '/';

/// Wildcard matching exactly one segment.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Wildcard matching the remainder of a topic.
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// A validated, immutable topic name borrowed from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Topic<'a>(&'a str);

impl<'a> Topic<'a> {
    /// Validate `name` against the topic grammar.
    pub fn new(name: &'a str) -> Result<Self, TopicError> {
        validate(name.as_bytes(), false)?;
        Ok(Topic(name))
    }

    /// Validate raw bytes (as found inside a frame) against the topic grammar.
    pub fn from_bytes(raw: &'a [u8]) -> Result<Self, TopicError> {
        validate(raw, false)?;
        let name = core::str::from_utf8(raw).map_err(|e| TopicError::InvalidCharacter {
            position: e.valid_up_to(),
        })?;
        Ok(Topic(name))
    }

    /// The topic as a string slice.
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Iterate over the `/`-separated segments.
    pub fn levels(&self) -> core::str::Split<'a, char> {
        self.0.split(LEVEL_SEPARATOR)
    }
}

impl AsRef<str> for Topic<'_> {
    fn as_ref(&self) -> &str {
        self.0
    }
}

impl fmt::Display for Topic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl<'a> TryFrom<&'a str> for Topic<'a> {
    type Error = TopicError;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Topic::new(value)
    }
}

/// A validated subscription pattern, possibly containing `+` and `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TopicPattern<'a>(&'a str);

impl<'a> TopicPattern<'a> {
    /// Validate `pattern` against the pattern grammar.
    pub fn new(pattern: &'a str) -> Result<Self, TopicError> {
        validate(pattern.as_bytes(), true)?;
        Ok(TopicPattern(pattern))
    }

    /// The pattern as a string slice.
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Whether the pattern contains any wildcard segment.
    pub fn has_wildcards(&self) -> bool {
        has_wildcards(self.0)
    }

    /// Whether this pattern matches `topic`.
    pub fn matches(&self, topic: &Topic<'_>) -> bool {
        matches(self.0, topic.as_str())
    }
}

impl AsRef<str> for TopicPattern<'_> {
    fn as_ref(&self) -> &str {
        self.0
    }
}

impl fmt::Display for TopicPattern<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl<'a> TryFrom<&'a str> for TopicPattern<'a> {
    type Error = TopicError;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        TopicPattern::new(value)
    }
}

/// Wildcard topic matching.
///
/// Walks both strings segment by segment. A `#` in the pattern accepts whatever is
/// left on either side, including nothing (`a/#` matches `a`). A `+` consumes exactly
/// one topic segment. Both sides running out together is a match; anything else is not.
///
/// The pattern is not re-validated here: a `#` in a non-final position still ends the
/// walk with a match. The registry rejects such patterns before they are stored.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_levels = pattern.split(LEVEL_SEPARATOR);
    let mut topic_levels = topic.split(LEVEL_SEPARATOR);

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL_WILDCARD), _) => return true,
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

pub(crate) fn has_wildcards(pattern: &str) -> bool {
    pattern
        .split(LEVEL_SEPARATOR)
        .any(|level| level == SINGLE_LEVEL_WILDCARD || level == MULTI_LEVEL_WILDCARD)
}

fn is_topic_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'/'
}

fn validate(raw: &[u8], allow_wildcards: bool) -> Result<(), TopicError> {
    if raw.is_empty() {
        return Err(TopicError::Empty);
    }
    if raw.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong {
            max_length: MAX_TOPIC_LEN,
            actual_length: raw.len(),
        });
    }

    let mut level_start = 0;
    let mut levels = raw.split(|b| *b == b'/').peekable();
    while let Some(level) = levels.next() {
        let is_last = levels.peek().is_none();
        match level {
            b"+" if allow_wildcards => {}
            b"#" if allow_wildcards => {
                if !is_last {
                    return Err(TopicError::MisplacedWildcard {
                        position: level_start,
                    });
                }
            }
            _ => {
                for (offset, &b) in level.iter().enumerate() {
                    let position = level_start + offset;
                    if allow_wildcards && (b == b'+' || b == b'#') {
                        return Err(TopicError::MisplacedWildcard { position });
                    }
                    if !is_topic_byte(b) {
                        return Err(TopicError::InvalidCharacter { position });
                    }
                }
            }
        }
        level_start += level.len() + 1;
    }

    Ok(())
}
