//! Numeric extraction from captured output
//!
//! An extraction locates a match of a pattern in one source, takes one
//! capture group and parses it as a number of a declared kind. Performance
//! rules require exactly one match; zero or several matches are extraction
//! failures and never fall back to a default value.

use super::pattern::Pattern;
use super::record::{ExecutionRecord, Source};
use crate::error::Result;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which capture group holds the value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Group {
    Index(usize),
    Name(String),
}

/// Declared type of an extracted value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberKind {
    Float,
    Int,
}

/// Which match to take when a pattern is allowed to match several times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Occurrence {
    /// Exactly one match is required
    Single,
    /// The last of one or more matches (e.g. the final SCF energy)
    Last,
}

/// A parsed value, keeping the declared kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Number {
    Float(f64),
    Int(i64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Float(v) => v,
            Number::Int(v) => v as f64,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Float(v) => write!(f, "{}", v),
            Number::Int(v) => write!(f, "{}", v),
        }
    }
}

/// Extraction failed; the numbers of this run are not trustworthy
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionFailure {
    #[error("pattern `{pattern}` not found in `{stream}`")]
    Missing { pattern: String, stream: String },

    #[error("pattern `{pattern}` matched {count} times in `{stream}`, expected exactly one")]
    Ambiguous {
        pattern: String,
        stream: String,
        count: usize,
    },

    #[error("`{stream}` was not produced by the run")]
    SourceUnavailable { stream: String },

    #[error("pattern `{pattern}` has no capture group {group}")]
    NoSuchGroup { pattern: String, group: String },

    #[error("cannot parse '{text}' as {kind:?}")]
    Parse { text: String, kind: NumberKind },
}

/// A located, typed value in captured output
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub pattern: Pattern,
    pub source: Source,
    pub group: Group,
    pub kind: NumberKind,
    pub occurrence: Occurrence,
}

impl Extraction {
    /// Single-match float extraction from capture group 1
    pub fn float(pattern: &str, source: Source) -> Result<Self> {
        Ok(Extraction {
            pattern: Pattern::new(pattern)?,
            source,
            group: Group::Index(1),
            kind: NumberKind::Float,
            occurrence: Occurrence::Single,
        })
    }

    /// Single-match integer extraction from capture group 1
    pub fn int(pattern: &str, source: Source) -> Result<Self> {
        Ok(Extraction {
            kind: NumberKind::Int,
            ..Self::float(pattern, source)?
        })
    }

    pub fn group(mut self, group: Group) -> Self {
        self.group = group;
        self
    }

    pub fn named(self, name: &str) -> Self {
        self.group(Group::Name(name.to_string()))
    }

    pub fn last(mut self) -> Self {
        self.occurrence = Occurrence::Last;
        self
    }

    pub fn extract(&self, record: &ExecutionRecord) -> std::result::Result<Number, ExtractionFailure> {
        let text = record
            .text(&self.source)
            .ok_or_else(|| ExtractionFailure::SourceUnavailable {
                stream: self.source.to_string(),
            })?;

        let matches: Vec<regex::Captures<'_>> = self.pattern.regex().captures_iter(text).collect();

        let caps = match (self.occurrence, matches.len()) {
            (_, 0) => {
                return Err(ExtractionFailure::Missing {
                    pattern: self.pattern.to_string(),
                    stream: self.source.to_string(),
                })
            }
            (Occurrence::Single, 1) | (Occurrence::Last, _) => &matches[matches.len() - 1],
            (Occurrence::Single, count) => {
                return Err(ExtractionFailure::Ambiguous {
                    pattern: self.pattern.to_string(),
                    stream: self.source.to_string(),
                    count,
                })
            }
        };

        let captured = match &self.group {
            Group::Index(i) => caps.get(*i),
            Group::Name(name) => caps.name(name),
        }
        .ok_or_else(|| ExtractionFailure::NoSuchGroup {
            pattern: self.pattern.to_string(),
            group: match &self.group {
                Group::Index(i) => i.to_string(),
                Group::Name(name) => name.clone(),
            },
        })?
        .as_str();

        parse_number(captured, self.kind)
    }
}

fn parse_number(text: &str, kind: NumberKind) -> std::result::Result<Number, ExtractionFailure> {
    let parse_err = || ExtractionFailure::Parse {
        text: text.to_string(),
        kind,
    };
    match kind {
        NumberKind::Float => text.parse::<f64>().map(Number::Float).map_err(|_| parse_err()),
        NumberKind::Int => text.parse::<i64>().map(Number::Int).map_err(|_| parse_err()),
    }
}

/// A named performance metric with its physical unit
#[derive(Debug, Clone, Serialize)]
pub struct PerfRule {
    pub key: String,
    pub unit: String,
    pub extraction: Extraction,
}

impl PerfRule {
    pub fn new(key: &str, unit: &str, extraction: Extraction) -> Self {
        PerfRule {
            key: key.to_string(),
            unit: unit.to_string(),
            extraction,
        }
    }

    pub fn extract(&self, record: &ExecutionRecord) -> std::result::Result<PerfValue, ExtractionFailure> {
        let value = self.extraction.extract(record)?;
        Ok(PerfValue {
            key: self.key.clone(),
            value,
            unit: self.unit.clone(),
        })
    }
}

/// One (metric, value, unit) triple
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfValue {
    pub key: String,
    pub value: Number,
    pub unit: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_match_float() {
        let record = ExecutionRecord::new("", "").with_file(
            "md.log",
            "               Core t (s)   Wall t (s)        (%)\n\
             Performance:       38.172        0.629\n",
        );
        let extraction =
            Extraction::float(r"^Performance:\s+(\S+)\s+\S+", Source::file("md.log")).unwrap();
        assert_eq!(extraction.extract(&record), Ok(Number::Float(38.172)));
    }

    #[test]
    fn test_int_rejects_fraction() {
        let record = ExecutionRecord::new("", "Rendering took: 12.5 seconds (12500 milliseconds)\n");
        let extraction =
            Extraction::int(r"^Rendering took: (\S+) seconds", Source::Stderr).unwrap();
        assert!(matches!(
            extraction.extract(&record),
            Err(ExtractionFailure::Parse { kind: NumberKind::Int, .. })
        ));
    }

    #[test]
    fn test_zero_matches_is_missing() {
        let record = ExecutionRecord::new("nothing here\n", "");
        let extraction = Extraction::float(r"^2048\s+(\S+)", Source::Stdout).unwrap();
        assert!(matches!(
            extraction.extract(&record),
            Err(ExtractionFailure::Missing { .. })
        ));
    }

    #[test]
    fn test_two_matches_is_ambiguous() {
        let record = ExecutionRecord::new("2048    1.10\n2048    1.20\n", "");
        let extraction = Extraction::float(r"^2048\s+(\S+)", Source::Stdout).unwrap();
        assert_eq!(
            extraction.extract(&record),
            Err(ExtractionFailure::Ambiguous {
                pattern: r"^2048\s+(\S+)".to_string(),
                stream: "stdout".to_string(),
                count: 2,
            })
        );
    }

    #[test]
    fn test_last_occurrence_takes_final_match() {
        let record = ExecutionRecord::new("E = 1.0\nE = 2.0\nE = 3.5\n", "");
        let extraction = Extraction::float(r"^E = (?P<energy>\S+)", Source::Stdout)
            .unwrap()
            .named("energy")
            .last();
        assert_eq!(extraction.extract(&record), Ok(Number::Float(3.5)));
    }

    #[test]
    fn test_missing_file_source() {
        let record = ExecutionRecord::new("", "");
        let extraction = Extraction::float(r"^x (\S+)", Source::file("md.log")).unwrap();
        assert!(matches!(
            extraction.extract(&record),
            Err(ExtractionFailure::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_perf_rule_carries_unit() {
        let record = ExecutionRecord::new("", "Rendering took: 42 seconds (42123 milliseconds)\n");
        let rule = PerfRule::new(
            "time",
            "s",
            Extraction::int(r"^Rendering took: (\S+) seconds", Source::Stderr).unwrap(),
        );
        let value = rule.extract(&record).unwrap();
        assert_eq!(value.key, "time");
        assert_eq!(value.unit, "s");
        assert_eq!(value.value, Number::Int(42));
    }
}
