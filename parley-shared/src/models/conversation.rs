use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Timestamp;

/// Normalized key for an unordered pair of distinct users.
///
/// `PairKey::new(a, b)` and `PairKey::new(b, a)` are equal, which is what the
/// storage layer's uniqueness guarantee is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: Uuid,
    high: Uuid,
}

impl PairKey {
    /// Returns `None` when both identifiers are the same user.
    #[must_use]
    pub fn new(a: Uuid, b: Uuid) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    #[must_use]
    pub fn low(&self) -> Uuid {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> Uuid {
        self.high
    }

    #[must_use]
    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }

    #[must_use]
    pub fn as_array(&self) -> [Uuid; 2] {
        [self.low, self.high]
    }
}

/// A durable two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    /// Both participants, in normalized order.
    pub participants: PairKey,
    pub created_at: Timestamp,
}

impl Conversation {
    #[must_use]
    pub fn includes(&self, user_id: Uuid) -> bool {
        self.participants.contains(user_id)
    }
}
