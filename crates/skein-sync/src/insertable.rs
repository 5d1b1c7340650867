//! Intake classification for events offered to the shadow graph

use std::fmt;

/// Outcome of checking whether an event may be inserted
///
/// Checks run in declaration order (after `Insertable`) and the first match
/// wins. Only `Insertable` events enter the graph; every other outcome is an
/// expected rejection, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InsertableStatus {
    /// The event may be inserted
    Insertable,
    /// No event was supplied
    NullEvent,
    /// A shadow for this hash already exists
    DuplicateShadowEvent,
    /// Generation is at or below the expiration watermark
    ExpiredEvent,
    /// Other-parent is neither shadowed nor expired
    UnknownCurrentOtherParent,
    /// Self-parent is neither shadowed nor expired
    UnknownCurrentSelfParent,
}

impl InsertableStatus {
    pub fn is_insertable(&self) -> bool {
        matches!(self, Self::Insertable)
    }

    /// Rejections that may succeed later, once the missing parent arrives
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UnknownCurrentOtherParent | Self::UnknownCurrentSelfParent
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insertable => "INSERTABLE",
            Self::NullEvent => "NULL_EVENT",
            Self::DuplicateShadowEvent => "DUPLICATE_SHADOW_EVENT",
            Self::ExpiredEvent => "EXPIRED_EVENT",
            Self::UnknownCurrentOtherParent => "UNKNOWN_CURRENT_OTHER_PARENT",
            Self::UnknownCurrentSelfParent => "UNKNOWN_CURRENT_SELF_PARENT",
        }
    }
}

impl fmt::Display for InsertableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_insertable_is_insertable() {
        assert!(InsertableStatus::Insertable.is_insertable());
        assert!(!InsertableStatus::ExpiredEvent.is_insertable());
    }

    #[test]
    fn test_retryable() {
        assert!(InsertableStatus::UnknownCurrentSelfParent.is_retryable());
        assert!(InsertableStatus::UnknownCurrentOtherParent.is_retryable());
        assert!(!InsertableStatus::ExpiredEvent.is_retryable());
        assert!(!InsertableStatus::DuplicateShadowEvent.is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(InsertableStatus::ExpiredEvent.to_string(), "EXPIRED_EVENT");
    }
}
