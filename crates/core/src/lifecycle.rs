//! Entity lifecycle state machine.
//!
//! Books and comics share the same lifecycle: `normal` and `unlisted` are
//! live states, `deleted` is a soft-delete with a retention deadline, and
//! `purging` is the irreversible claim taken by the garbage collector just
//! before rows and blobs are removed.

use crate::error::Error;

/// Lifecycle state of a book or comic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Publicly listed.
    Normal,
    /// Hidden from public listings, visible to the owner and privileged callers.
    Unlisted,
    /// Soft-deleted; `delete_at` holds the purge deadline.
    Deleted,
    /// Claimed by a sweep; removal is in progress and cannot be undone.
    Purging,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Unlisted => "unlisted",
            Self::Deleted => "deleted",
            Self::Purging => "purging",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "normal" => Ok(Self::Normal),
            "unlisted" => Ok(Self::Unlisted),
            "deleted" => Ok(Self::Deleted),
            "purging" => Ok(Self::Purging),
            other => Err(Error::InvalidState(other.to_string())),
        }
    }

    /// Whether the entity appears in public listings.
    pub fn publicly_visible(&self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Whether the entity appears in the owner's listing.
    /// Deleted entities stay owner-visible until purged so they can be restored.
    pub fn owner_visible(&self) -> bool {
        !matches!(self, Self::Purging)
    }

    /// Whether a transition to `to` is legal.
    ///
    /// `purging` is terminal and may only be entered from `deleted` (and only
    /// via the sweep's compare-and-swap claim).
    pub fn can_transition(&self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Normal, Unlisted)
                | (Unlisted, Normal)
                | (Normal, Deleted)
                | (Unlisted, Deleted)
                | (Deleted, Normal)
                | (Deleted, Purging)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of top-level entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Book,
    Comic,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Comic => "comic",
        }
    }
}
