//! Committer identity and timestamp formatting for reflog lines.
//!
//! Trimmed from the grounding repository's `git-utils::date` module: reflog
//! entries only ever need the raw `<timestamp> <tz>` format (never the
//! relative/human/ISO renderings `git log --date=...` supports), so this
//! crate vendors just that subset and drops the `chrono` dependency.

use bstr::{BStr, BString, ByteSlice};
use std::fmt;

/// Errors raised while parsing a signature or raw timestamp.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing '>' in signature")]
    MissingCloseBracket,

    #[error("missing '<' in signature")]
    MissingOpenBracket,

    #[error("non-UTF-8 date in signature")]
    NonUtf8Date,

    #[error("invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid timezone offset: '{0}'")]
    InvalidTimezone(String),
}

/// Seconds-since-epoch plus a timezone offset, in git's own decimal-encoded
/// form (`-0500` rather than minutes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitTimestamp {
    pub seconds: i64,
    /// Offset from UTC in minutes (e.g. -300 for EST).
    pub tz_offset_minutes: i32,
}

fn tz_offset_to_minutes(tz: i32) -> i32 {
    let sign = if tz < 0 { -1 } else { 1 };
    let abs = tz.unsigned_abs() as i32;
    sign * ((abs / 100) * 60 + abs % 100)
}

fn minutes_to_tz_offset(minutes: i32) -> i32 {
    let sign = if minutes < 0 { -1 } else { 1 };
    let abs = minutes.unsigned_abs() as i32;
    sign * ((abs / 60) * 100 + abs % 60)
}

impl GitTimestamp {
    pub fn new(seconds: i64, tz_offset_minutes: i32) -> Self {
        Self {
            seconds,
            tz_offset_minutes,
        }
    }

    /// Parse git's raw `<seconds> <+/-HHMM>` format.
    pub fn parse_raw(input: &str) -> Result<Self, SignatureError> {
        let input = input.trim();
        let mut parts = input.splitn(2, ' ');
        let seconds_str = parts.next().unwrap_or("");
        let seconds: i64 = seconds_str
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp(seconds_str.to_string()))?;

        let tz_offset_minutes = match parts.next() {
            Some(tz_str) => {
                let tz_str = tz_str.trim();
                let tz: i32 = tz_str
                    .parse()
                    .map_err(|_| SignatureError::InvalidTimezone(tz_str.to_string()))?;
                tz_offset_to_minutes(tz)
            }
            None => 0,
        };

        Ok(Self {
            seconds,
            tz_offset_minutes,
        })
    }
}

impl fmt::Display for GitTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:+05}",
            self.seconds,
            minutes_to_tz_offset(self.tz_offset_minutes)
        )
    }
}

/// An identity (name + email) plus the moment a ref change is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub when: GitTimestamp,
}

impl Signature {
    /// Parse git's canonical `Name <email> timestamp tz` format.
    pub fn parse(input: &BStr) -> Result<Self, SignatureError> {
        let bytes = input.as_bytes();

        let gt_pos = bytes
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or(SignatureError::MissingCloseBracket)?;
        let lt_pos = bytes[..gt_pos]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or(SignatureError::MissingOpenBracket)?;

        let name = bytes[..lt_pos].trim();
        let email = &bytes[lt_pos + 1..gt_pos];
        let date_str = bytes[gt_pos + 1..].trim();
        let date_str =
            std::str::from_utf8(date_str).map_err(|_| SignatureError::NonUtf8Date)?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            when: GitTimestamp::parse_raw(date_str)?,
        })
    }

    /// Render in git's canonical `Name <email> timestamp tz` format.
    pub fn to_bytes(&self) -> BString {
        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.when.to_string().as_bytes());
        BString::from(out)
    }
}
