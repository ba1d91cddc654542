//! Sanity checks over a completed execution record
//!
//! Each check is a plain data value evaluated against a record. A check list
//! combines with logical AND and stops at the first failing check, whose
//! message becomes the failure reason.

use super::extract::Extraction;
use super::pattern::Pattern;
use super::record::{ExecutionRecord, Source};
use crate::error::Result;
use crate::probe::affinity::{affinities_from_record, AffinityMeasure};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// A sanity check failed; the run did not behave as expected
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct SanityFailure {
    pub message: String,
}

impl SanityFailure {
    fn new(msg: &Option<String>, detail: String) -> Self {
        let message = match msg {
            Some(msg) => format!("{}: {}", msg, detail),
            None => detail,
        };
        SanityFailure { message }
    }
}

/// One boolean assertion over captured output
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum SanityCheck {
    Found {
        pattern: Pattern,
        source: Source,
        msg: Option<String>,
    },
    NotFound {
        pattern: Pattern,
        source: Source,
        msg: Option<String>,
    },
    Count {
        pattern: Pattern,
        source: Source,
        expected: usize,
        msg: Option<String>,
    },
    /// Extracted value is strictly below a bound
    LessThan {
        value: Extraction,
        bound: f64,
        msg: Option<String>,
    },
    /// `|value - reference| < tolerance`
    Within {
        value: Extraction,
        reference: f64,
        tolerance: f64,
        msg: Option<String>,
    },
    /// Every non-empty line of a source matches the pattern
    EveryLine {
        pattern: Pattern,
        source: Source,
        msg: Option<String>,
    },
    /// JSON value at `pointer` in a produced file equals `expected`
    JsonEq {
        file: String,
        pointer: String,
        expected: Value,
        msg: Option<String>,
    },
    /// Two JSON values in the same file are equal
    JsonFieldsEq {
        file: String,
        left: String,
        right: String,
        msg: Option<String>,
    },
    /// String at `pointer` in a produced file occurs literally in a source
    JsonValueFound {
        file: String,
        pointer: String,
        source: Source,
        msg: Option<String>,
    },
    /// Comma-separated string at `pointer` equals a set of names
    JsonSetEq {
        file: String,
        pointer: String,
        expected: BTreeSet<String>,
        msg: Option<String>,
    },
    /// Two produced files have identical contents
    FilesEqual {
        left: String,
        right: String,
        msg: Option<String>,
    },
    /// A count derived from the affinity probe files
    Affinity {
        measure: AffinityMeasure,
        expected: usize,
        msg: Option<String>,
    },
}

impl SanityCheck {
    pub fn found(pattern: &str, source: Source) -> Result<Self> {
        Ok(SanityCheck::Found {
            pattern: Pattern::new(pattern)?,
            source,
            msg: None,
        })
    }

    pub fn not_found(pattern: &str, source: Source) -> Result<Self> {
        Ok(SanityCheck::NotFound {
            pattern: Pattern::new(pattern)?,
            source,
            msg: None,
        })
    }

    pub fn count(pattern: &str, source: Source, expected: usize) -> Result<Self> {
        Ok(SanityCheck::Count {
            pattern: Pattern::new(pattern)?,
            source,
            expected,
            msg: None,
        })
    }

    pub fn within(value: Extraction, reference: f64, tolerance: f64) -> Self {
        SanityCheck::Within {
            value,
            reference,
            tolerance,
            msg: None,
        }
    }

    pub fn less_than(value: Extraction, bound: f64) -> Self {
        SanityCheck::LessThan {
            value,
            bound,
            msg: None,
        }
    }

    pub fn json_eq(file: &str, pointer: &str, expected: impl Into<Value>) -> Self {
        SanityCheck::JsonEq {
            file: file.to_string(),
            pointer: pointer.to_string(),
            expected: expected.into(),
            msg: None,
        }
    }

    /// Attach a human-readable label used in the failure message
    pub fn msg(mut self, label: impl Into<String>) -> Self {
        let label = Some(label.into());
        match &mut self {
            SanityCheck::Found { msg, .. }
            | SanityCheck::NotFound { msg, .. }
            | SanityCheck::Count { msg, .. }
            | SanityCheck::LessThan { msg, .. }
            | SanityCheck::Within { msg, .. }
            | SanityCheck::EveryLine { msg, .. }
            | SanityCheck::JsonEq { msg, .. }
            | SanityCheck::JsonFieldsEq { msg, .. }
            | SanityCheck::JsonValueFound { msg, .. }
            | SanityCheck::JsonSetEq { msg, .. }
            | SanityCheck::FilesEqual { msg, .. }
            | SanityCheck::Affinity { msg, .. } => *msg = label,
        }
        self
    }

    pub fn evaluate(&self, record: &ExecutionRecord) -> std::result::Result<(), SanityFailure> {
        match self {
            SanityCheck::Found { pattern, source, msg } => {
                let text = source_text(record, source, msg)?;
                if pattern.is_found(text) {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!("pattern `{}` not found in `{}`", pattern, source),
                    ))
                }
            }
            SanityCheck::NotFound { pattern, source, msg } => {
                let text = source_text(record, source, msg)?;
                if pattern.is_found(text) {
                    Err(SanityFailure::new(
                        msg,
                        format!("pattern `{}` found in `{}`", pattern, source),
                    ))
                } else {
                    Ok(())
                }
            }
            SanityCheck::Count {
                pattern,
                source,
                expected,
                msg,
            } => {
                let text = source_text(record, source, msg)?;
                let found = pattern.count(text);
                if found == *expected {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!(
                            "pattern `{}` matched {} times in `{}`, expected {}",
                            pattern, found, source, expected
                        ),
                    ))
                }
            }
            SanityCheck::LessThan { value, bound, msg } => {
                let v = value
                    .extract(record)
                    .map_err(|e| SanityFailure::new(msg, e.to_string()))?
                    .as_f64();
                if v < *bound {
                    Ok(())
                } else {
                    Err(SanityFailure::new(msg, format!("{} is not less than {}", v, bound)))
                }
            }
            SanityCheck::Within {
                value,
                reference,
                tolerance,
                msg,
            } => {
                let v = value
                    .extract(record)
                    .map_err(|e| SanityFailure::new(msg, e.to_string()))?
                    .as_f64();
                let diff = (v - reference).abs();
                if diff < *tolerance {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!(
                            "|{} - ({})| = {:e} is not below tolerance {:e}",
                            v, reference, diff, tolerance
                        ),
                    ))
                }
            }
            SanityCheck::EveryLine { pattern, source, msg } => {
                let text = source_text(record, source, msg)?;
                match text
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .find(|line| !pattern.is_found(line))
                {
                    None => Ok(()),
                    Some(line) => Err(SanityFailure::new(
                        msg,
                        format!("line '{}' in `{}` does not match `{}`", line, source, pattern),
                    )),
                }
            }
            SanityCheck::JsonEq {
                file,
                pointer,
                expected,
                msg,
            } => {
                let doc = json_file(record, file, msg)?;
                let actual = json_at(&doc, pointer, file, msg)?;
                if actual == expected {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!("expected {}, found {}", expected, actual),
                    ))
                }
            }
            SanityCheck::JsonFieldsEq {
                file,
                left,
                right,
                msg,
            } => {
                let doc = json_file(record, file, msg)?;
                let l = json_at(&doc, left, file, msg)?;
                let r = json_at(&doc, right, file, msg)?;
                if l == r {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!("{} {} is not equal to {} {}", left, l, right, r),
                    ))
                }
            }
            SanityCheck::JsonValueFound {
                file,
                pointer,
                source,
                msg,
            } => {
                let doc = json_file(record, file, msg)?;
                let value = json_at(&doc, pointer, file, msg)?;
                let needle = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                let text = source_text(record, source, msg)?;
                if text.contains(&needle) {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!("'{}' not found in `{}`", needle, source),
                    ))
                }
            }
            SanityCheck::JsonSetEq {
                file,
                pointer,
                expected,
                msg,
            } => {
                let doc = json_file(record, file, msg)?;
                let actual = json_at(&doc, pointer, file, msg)?.as_str().ok_or_else(|| {
                    SanityFailure::new(msg, format!("field {} of `{}` is not a string", pointer, file))
                })?;
                let found: BTreeSet<String> = actual
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if &found == expected {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!("expected {:?}, found {:?}", expected, found),
                    ))
                }
            }
            SanityCheck::FilesEqual { left, right, msg } => {
                let l = source_text(record, &Source::file(left.as_str()), msg)?;
                let r = source_text(record, &Source::file(right.as_str()), msg)?;
                if l == r {
                    Ok(())
                } else {
                    Err(SanityFailure::new(msg, format!("`{}` differs from `{}`", left, right)))
                }
            }
            SanityCheck::Affinity {
                measure,
                expected,
                msg,
            } => {
                let affinities = affinities_from_record(record)
                    .map_err(|e| SanityFailure::new(msg, e.to_string()))?;
                let found = measure.measure(&affinities);
                if found == *expected {
                    Ok(())
                } else {
                    Err(SanityFailure::new(
                        msg,
                        format!("{} expected: {}, found: {}", measure, expected, found),
                    ))
                }
            }
        }
    }
}

/// Evaluate checks in order, stopping at the first failure
pub fn assert_all(
    checks: &[SanityCheck],
    record: &ExecutionRecord,
) -> std::result::Result<(), SanityFailure> {
    for (i, check) in checks.iter().enumerate() {
        check.evaluate(record).map_err(|failure| {
            debug!("sanity check {} of {} failed: {}", i + 1, checks.len(), failure);
            failure
        })?;
    }
    Ok(())
}

fn source_text<'a>(
    record: &'a ExecutionRecord,
    source: &Source,
    msg: &Option<String>,
) -> std::result::Result<&'a str, SanityFailure> {
    record
        .text(source)
        .ok_or_else(|| SanityFailure::new(msg, format!("`{}` was not produced by the run", source)))
}

fn json_file(
    record: &ExecutionRecord,
    file: &str,
    msg: &Option<String>,
) -> std::result::Result<Value, SanityFailure> {
    let text = source_text(record, &Source::file(file), msg)?;
    serde_json::from_str(text)
        .map_err(|e| SanityFailure::new(msg, format!("`{}` is not valid JSON: {}", file, e)))
}

fn json_at<'a>(
    doc: &'a Value,
    pointer: &str,
    file: &str,
    msg: &Option<String>,
) -> std::result::Result<&'a Value, SanityFailure> {
    doc.pointer(pointer)
        .ok_or_else(|| SanityFailure::new(msg, format!("`{}` has no field {}", file, pointer)))
}
