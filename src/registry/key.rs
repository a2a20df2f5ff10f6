//! Media key type
//!
//! The key under which connections, hubs and stored comments are grouped.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally supplied identifier of a media item (e.g. a host-provided video ID)
///
/// Opaque to the coordinator: it is only compared, hashed and handed to the
/// persistence layer, which owns any mapping to numeric storage keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaKey(String);

impl MediaKey {
    /// Create a media key, rejecting empty or whitespace-only input
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MediaKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MediaKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
