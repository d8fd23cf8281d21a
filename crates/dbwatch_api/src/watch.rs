//! Watch event frames.

use crate::error::CodecError;
use crate::meta::ResourceVersion;
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type tag of a watch frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Object was created (or first seen by this watch).
    Added,
    /// Object was changed.
    Modified,
    /// Object was removed; the payload is its last state.
    Deleted,
    /// Progress marker carrying only a resource version.
    Bookmark,
    /// Server-side failure; the payload is a `Status`.
    Error,
}

impl EventType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Bookmark => "BOOKMARK",
            EventType::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADDED" => Ok(EventType::Added),
            "MODIFIED" => Ok(EventType::Modified),
            "DELETED" => Ok(EventType::Deleted),
            "BOOKMARK" => Ok(EventType::Bookmark),
            "ERROR" => Ok(EventType::Error),
            other => Err(CodecError::UnknownEventType(other.to_string())),
        }
    }
}

/// Untyped watch frame as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchFrame {
    /// Event type name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Object payload (a `Status` for `ERROR`).
    pub object: serde_json::Value,
}

/// Typed watch event.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    /// Object was created.
    Added(T),
    /// Object was changed.
    Modified(T),
    /// Object was removed.
    Deleted(T),
    /// Progress marker.
    Bookmark(ResourceVersion),
    /// Server-side failure.
    Error(Status),
}

impl<T> WatchEvent<T> {
    /// Returns the event type.
    pub fn event_type(&self) -> EventType {
        match self {
            WatchEvent::Added(_) => EventType::Added,
            WatchEvent::Modified(_) => EventType::Modified,
            WatchEvent::Deleted(_) => EventType::Deleted,
            WatchEvent::Bookmark(_) => EventType::Bookmark,
            WatchEvent::Error(_) => EventType::Error,
        }
    }

    /// Returns the object for Added/Modified/Deleted.
    pub fn object(&self) -> Option<&T> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                Some(obj)
            }
            WatchEvent::Bookmark(_) | WatchEvent::Error(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names() {
        for ty in [
            EventType::Added,
            EventType::Modified,
            EventType::Deleted,
            EventType::Bookmark,
            EventType::Error,
        ] {
            assert_eq!(ty.as_str().parse::<EventType>().unwrap(), ty);
        }
        assert_eq!(
            "RENAMED".parse::<EventType>().unwrap_err(),
            CodecError::UnknownEventType("RENAMED".into())
        );
    }

    #[test]
    fn object_accessor() {
        let event: WatchEvent<u32> = WatchEvent::Modified(7);
        assert_eq!(event.object(), Some(&7));
        assert_eq!(event.event_type(), EventType::Modified);

        let event: WatchEvent<u32> = WatchEvent::Error(Status::expired("gone"));
        assert_eq!(event.object(), None);
    }
}
