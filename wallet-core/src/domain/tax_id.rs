//! National tax identifier used as the receiver lookup key
//!
//! Only the shape is validated here (`XXX.XXX.XXX-XX`). Check digits are
//! the registration layer's concern.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

type Pattern = LazyLock<std::result::Result<Regex, regex::Error>>;

// ASCII digits only; `\d` would also match other scripts' digits
static CANONICAL: Pattern =
    LazyLock::new(|| Regex::new(r"^[0-9]{3}\.[0-9]{3}\.[0-9]{3}-[0-9]{2}$"));
static DIGITS: Pattern = LazyLock::new(|| Regex::new(r"^[0-9]{11}$"));

fn pattern(regex: &'static Pattern) -> Result<&'static Regex> {
    regex.as_ref().map_err(|e| Error::Other(e.to_string()))
}

/// A tax id in canonical `XXX.XXX.XXX-XX` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

impl TaxId {
    /// Parse either the canonical form or eleven bare digits
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if pattern(&CANONICAL)?.is_match(input) {
            return Ok(Self(input.to_string()));
        }

        if pattern(&DIGITS)?.is_match(input) {
            let mut canonical = String::with_capacity(14);
            for (i, c) in input.chars().enumerate() {
                match i {
                    3 | 6 => canonical.push('.'),
                    9 => canonical.push('-'),
                    _ => {}
                }
                canonical.push(c);
            }
            return Ok(Self(canonical));
        }

        Err(Error::validation(format!(
            "invalid tax id format: '{}' (expected XXX.XXX.XXX-XX)",
            input
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaxId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TaxId::parse(&value)
    }
}

impl From<TaxId> for String {
    fn from(value: TaxId) -> Self {
        value.0
    }
}
