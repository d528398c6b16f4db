//! Session record data model

use std::time::Duration;

use crate::token::LockToken;

/// How a read treats the record's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read without taking the lock
    Shared,
    /// Read and take the lock in the same atomic step
    Exclusive,
}

impl AccessMode {
    pub fn is_exclusive(self) -> bool {
        matches!(self, AccessMode::Exclusive)
    }
}

/// Decoded record payload together with the record's own time-to-live
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionData<T> {
    pub items: T,
    pub timeout: Duration,
}

impl<T> SessionData<T> {
    pub fn new(items: T, timeout: Duration) -> Self {
        Self { items, timeout }
    }
}

/// Result of a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// No record under this id (never created, removed, or expired)
    NotFound,
    /// Someone else holds the lock; nothing was returned or acquired
    Locked { lock: LockToken, age: Duration },
    /// The record was read. `lock` is the token issued to this caller on an
    /// exclusive read, `None` on a shared one.
    Available {
        data: SessionData<T>,
        lock: Option<LockToken>,
        /// True only for the first read after `create_uninitialized`
        was_uninitialized: bool,
    },
}

impl<T> ReadOutcome<T> {
    pub fn is_found(&self) -> bool {
        !matches!(self, ReadOutcome::NotFound)
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, ReadOutcome::Locked { .. })
    }

    /// Age of the foreign lock, if the read was blocked by one
    pub fn lock_age(&self) -> Option<Duration> {
        match self {
            ReadOutcome::Locked { age, .. } => Some(*age),
            _ => None,
        }
    }

    /// The foreign lock on `Locked`, or the issued lock on an exclusive `Available`
    pub fn lock(&self) -> Option<&LockToken> {
        match self {
            ReadOutcome::NotFound => None,
            ReadOutcome::Locked { lock, .. } => Some(lock),
            ReadOutcome::Available { lock, .. } => lock.as_ref(),
        }
    }

    pub fn data(&self) -> Option<&SessionData<T>> {
        match self {
            ReadOutcome::Available { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<SessionData<T>> {
        match self {
            ReadOutcome::Available { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn was_uninitialized(&self) -> bool {
        matches!(
            self,
            ReadOutcome::Available {
                was_uninitialized: true,
                ..
            }
        )
    }

    /// Metric and log label
    pub fn label(&self) -> &'static str {
        match self {
            ReadOutcome::NotFound => "not_found",
            ReadOutcome::Locked { .. } => "locked",
            ReadOutcome::Available { lock: Some(_), .. } => "acquired",
            ReadOutcome::Available { lock: None, .. } => "read",
        }
    }
}

/// Result of a release, removal or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The presented token did not match the stored lock; nothing changed
    LockMismatch,
    /// No record under this id; nothing changed
    NotFound,
    /// The request was invalid and never sent to the store
    Rejected,
}

impl WriteOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }

    pub fn label(self) -> &'static str {
        match self {
            WriteOutcome::Applied => "applied",
            WriteOutcome::LockMismatch => "lock_mismatch",
            WriteOutcome::NotFound => "not_found",
            WriteOutcome::Rejected => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_read_outcome_accessors() {
        let token = LockToken::generate(Utc::now());
        let locked: ReadOutcome<()> = ReadOutcome::Locked {
            lock: token.clone(),
            age: Duration::from_secs(4),
        };
        assert!(locked.is_locked());
        assert_eq!(locked.lock_age(), Some(Duration::from_secs(4)));
        assert_eq!(locked.lock(), Some(&token));
        assert!(locked.data().is_none());
        assert_eq!(locked.label(), "locked");

        let available = ReadOutcome::Available {
            data: SessionData::new(7u32, Duration::from_secs(60)),
            lock: None,
            was_uninitialized: true,
        };
        assert!(available.was_uninitialized());
        assert_eq!(available.label(), "read");
        assert_eq!(available.into_data().map(|d| d.items), Some(7));

        let missing: ReadOutcome<()> = ReadOutcome::NotFound;
        assert!(!missing.is_found());
        assert!(missing.lock().is_none());
    }

    #[test]
    fn test_write_outcome_labels() {
        assert!(WriteOutcome::Applied.is_applied());
        assert!(!WriteOutcome::LockMismatch.is_applied());
        assert_eq!(WriteOutcome::Rejected.label(), "rejected");
    }
}
