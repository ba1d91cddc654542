use crate::error::{RegtestError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use std::fmt;

/// A compiled rule pattern.
///
/// Patterns are matched against a whole captured blob in multi-line mode, so
/// `^` and `$` anchor at line boundaries, the way benchmark output is scanned.
#[derive(Clone)]
pub struct Pattern {
    raw: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self> {
        let regex = RegexBuilder::new(raw)
            .multi_line(true)
            .build()
            .map_err(|source| RegtestError::Pattern {
                pattern: raw.to_string(),
                source,
            })?;

        Ok(Pattern {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_found(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.raw)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}
