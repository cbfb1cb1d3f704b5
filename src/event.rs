//! Event records and channel matching.
//!
//! An event carries a non-empty set of channel names, an opaque payload, and
//! the timestamp the publisher stamped it with. `"#"` is the wildcard: it
//! matches everything whether it appears on the publishing side or the
//! subscribing side.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wildcard channel name matching every subscriber and every publish.
pub const ALL_CHANNELS: &str = "#";

/// Current wall-clock time as seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A set of channel names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet(BTreeSet<String>);

impl ChannelSet {
    /// The wildcard set, matching every event.
    pub fn all() -> Self {
        Self::from(ALL_CHANNELS)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Whether this set contains the wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.0.contains(ALL_CHANNELS)
    }

    /// Whether an event tagged `other` is visible to a subscriber
    /// interested in `self`.
    ///
    /// True when either side holds the wildcard or the sets intersect.
    pub fn matches(&self, other: &ChannelSet) -> bool {
        if self.has_wildcard() || other.has_wildcard() {
            return true;
        }
        self.0.iter().any(|name| other.0.contains(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for ChannelSet {
    fn from(name: &str) -> Self {
        [name].into_iter().collect()
    }
}

impl From<String> for ChannelSet {
    fn from(name: String) -> Self {
        [name].into_iter().collect()
    }
}

impl From<Vec<&str>> for ChannelSet {
    fn from(names: Vec<&str>) -> Self {
        names.into_iter().collect()
    }
}

impl From<Vec<String>> for ChannelSet {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

impl From<&[&str]> for ChannelSet {
    fn from(names: &[&str]) -> Self {
        names.iter().copied().collect()
    }
}

/// A single published event.
///
/// The payload is producer-defined bytes; consumers decode it lazily with
/// whatever scheme they agreed on out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub channels: ChannelSet,
    pub payload: Vec<u8>,
    /// Seconds since the Unix epoch, assigned by the publisher at append time.
    pub timestamp: f64,
}

impl Event {
    pub fn new(channels: ChannelSet, payload: Vec<u8>, timestamp: f64) -> Self {
        Self {
            channels,
            payload,
            timestamp,
        }
    }
}
