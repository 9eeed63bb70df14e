//! Optimistic-lock version tokens.
//!
//! Availability-changing writes to a vehicle row must supply the version they
//! read; the store rejects the write if the row has moved on since.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// The optimistic-lock token of a versioned row.
///
/// The token is the row's last-modified timestamp. It is read together with
/// the row and passed back, opaque, on writes that change availability. A
/// write whose token no longer matches the stored one fails with a conflict
/// and writes nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(DateTime<Utc>);

impl VersionToken {
    pub fn new(modified_at: DateTime<Utc>) -> Self {
        Self(modified_at)
    }

    /// Token for a freshly created row.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self(now)
    }

    /// The next token after a successful write at `now`.
    ///
    /// Timestamps can collide at coarse clock resolution; always move strictly
    /// forward so a bumped row never keeps its old token.
    pub fn bumped(self, now: DateTime<Utc>) -> Self {
        if now > self.0 {
            Self(now)
        } else {
            Self(self.0 + chrono::Duration::microseconds(1))
        }
    }

    pub fn as_timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl ValueObject for VersionToken {}

impl core::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0.to_rfc3339(), f)
    }
}
