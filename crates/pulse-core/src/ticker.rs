//! Ticker symbol validation.

use std::fmt;

use serde::Serialize;

use crate::PulseError;

pub const MAX_TICKER_LEN: usize = 10;

/// A normalized exchange symbol: 1-10 chars from `A-Z`, `0-9`, `.` and `-`.
///
/// Only obtainable through [`Ticker::parse`], so holding one means the
/// symbol grammar has already been checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Uppercase and validate raw user input. Whitespace is never stripped.
    pub fn parse(raw: &str) -> Result<Self, PulseError> {
        let normalized = raw.to_uppercase();
        if is_valid_symbol(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(PulseError::Validation {
                input: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_symbol(s: &str) -> bool {
    (1..=MAX_TICKER_LEN).contains(&s.len())
        && s
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
