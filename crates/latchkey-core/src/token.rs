//! Lock token codec
//!
//! A token is `<id>|<acquired-at>`: a fresh UUID v4 in simple form and the
//! acquisition instant as RFC 3339 UTC with microsecond precision. Tokens are
//! compared byte-for-byte by the store, so the textual form is authoritative.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use uuid::Uuid;

use latchkey_common::{LatchkeyError, Result};

const SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken {
    raw: String,
    acquired_at: DateTime<Utc>,
}

impl LockToken {
    /// Issue a new token stamped with `now`. Never reuse one across acquisitions.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let acquired_at = now.trunc_subsecs(6);
        let raw = format!(
            "{}{}{}",
            Uuid::new_v4().simple(),
            SEPARATOR,
            acquired_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        Self { raw, acquired_at }
    }

    /// Parse a token read back from the store
    pub fn parse(raw: &str) -> Result<Self> {
        let (id, stamp) = raw.rsplit_once(SEPARATOR).ok_or_else(|| {
            LatchkeyError::ProtocolViolation(format!("lock token without separator: {:?}", raw))
        })?;
        if id.is_empty() {
            return Err(LatchkeyError::ProtocolViolation(format!(
                "lock token without id: {:?}",
                raw
            )));
        }
        let acquired_at = DateTime::parse_from_rfc3339(stamp)
            .map_err(|e| {
                LatchkeyError::ProtocolViolation(format!(
                    "lock token timestamp {:?} is invalid: {}",
                    stamp, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            raw: raw.to_string(),
            acquired_at,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The unique part of the token
    pub fn id(&self) -> &str {
        self.raw
            .rsplit_once(SEPARATOR)
            .map_or(self.raw.as_str(), |(id, _)| id)
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Time the lock has been held as of `now`; clock skew never yields a negative age
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn into_string(self) -> String {
        self.raw
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for LockToken {
    type Err = LatchkeyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
