//! Routing tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A routing tag: a `(pool, name)` pair identifying the channel a message
/// arrived on or will leave through.
///
/// Tags are assigned by an upstream tagging step and are immutable once
/// attached to a message.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag pool, e.g. a shortcode or carrier channel group.
    pub pool: String,
    /// Tag name within the pool.
    pub name: String,
}

impl Tag {
    pub fn new(pool: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pool, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let tag = Tag::new("sms1", "shortcode-8500");
        assert_eq!(tag.to_string(), "sms1:shortcode-8500");
    }
}
