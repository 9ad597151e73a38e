//! # Kernel pool
//!
//! In-memory keyword → values table filled from text kernels (instrument kernels,
//! frame kernels, metakernels, ...). Values under one keyword are either all
//! numbers or all strings, mirroring the two value kinds a text kernel can hold.
//!
//! Lookups go through a small closed set of typed accessors:
//!
//! - [`KernelPool::doubles`], [`KernelPool::integers`], [`KernelPool::strings`] return
//!   `None` when the keyword is missing **or** holds the other kind of value.
//! - [`KernelPool::require_doubles`], [`KernelPool::require_integer`],
//!   [`KernelPool::require_string`] distinguish the three configuration failures:
//!   a missing keyword ([`PointingError::MissingKernelValue`]), a keyword holding the
//!   wrong kind of value ([`PointingError::WrongKernelValueType`]) and a wrong number of
//!   values ([`PointingError::WrongKernelValueCount`]).
//!
//! See also
//! ------------
//! * [`text_kernel`] – parser for the `\begindata` / `\begintext` format.
//! * [`crate::metakernel`] – metakernel expansion to a list of kernel paths.
pub mod text_kernel;

use std::collections::HashMap;

use camino::Utf8Path;
use tracing::debug;

use crate::pointing_errors::PointingError;
use text_kernel::{parse_text_kernel, Assignment, AssignmentOp};

/// Values stored under one kernel pool keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelValues {
    Numbers(Vec<f64>),
    Strings(Vec<String>),
}

impl KernelValues {
    pub fn len(&self) -> usize {
        match self {
            KernelValues::Numbers(v) => v.len(),
            KernelValues::Strings(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            KernelValues::Numbers(_) => "number",
            KernelValues::Strings(_) => "string",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelPool {
    entries: HashMap<String, KernelValues>,
}

impl KernelPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keywords currently in the pool, in no particular order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&KernelValues> {
        self.entries.get(key)
    }

    /// Replace the values stored under `key` with numbers.
    pub fn insert_doubles(&mut self, key: impl Into<String>, values: Vec<f64>) {
        self.entries.insert(key.into(), KernelValues::Numbers(values));
    }

    /// Replace the values stored under `key` with strings.
    pub fn insert_strings<S: Into<String>>(&mut self, key: impl Into<String>, values: Vec<S>) {
        self.entries.insert(
            key.into(),
            KernelValues::Strings(values.into_iter().map(Into::into).collect()),
        );
    }

    pub fn doubles(&self, key: &str) -> Option<&[f64]> {
        match self.entries.get(key)? {
            KernelValues::Numbers(v) => Some(v),
            KernelValues::Strings(_) => None,
        }
    }

    /// Numbers under `key` as integers, or `None` if any of them is not integral.
    pub fn integers(&self, key: &str) -> Option<Vec<i32>> {
        let values = self.doubles(key)?;
        values
            .iter()
            .map(|v| {
                let in_range = *v >= f64::from(i32::MIN) && *v <= f64::from(i32::MAX);
                (v.fract() == 0.0 && in_range).then_some(*v as i32)
            })
            .collect()
    }

    pub fn strings(&self, key: &str) -> Option<&[String]> {
        match self.entries.get(key)? {
            KernelValues::Strings(v) => Some(v),
            KernelValues::Numbers(_) => None,
        }
    }

    fn missing_or_wrong_type(&self, key: &str, expected: &'static str) -> PointingError {
        if self.entries.contains_key(key) {
            PointingError::WrongKernelValueType {
                key: key.to_string(),
                expected,
            }
        } else {
            PointingError::MissingKernelValue(key.to_string())
        }
    }

    fn check_count(key: &str, expected: usize, found: usize) -> Result<(), PointingError> {
        if expected == found {
            Ok(())
        } else {
            Err(PointingError::WrongKernelValueCount {
                key: key.to_string(),
                expected,
                found,
            })
        }
    }

    /// Exactly `count` numbers stored under `key`.
    pub fn require_doubles(&self, key: &str, count: usize) -> Result<&[f64], PointingError> {
        let values = self
            .doubles(key)
            .ok_or_else(|| self.missing_or_wrong_type(key, "double"))?;
        Self::check_count(key, count, values.len())?;
        Ok(values)
    }

    pub fn require_double(&self, key: &str) -> Result<f64, PointingError> {
        Ok(self.require_doubles(key, 1)?[0])
    }

    /// Like [`KernelPool::require_double`], but a missing keyword yields `Ok(None)`.
    pub fn optional_double(&self, key: &str) -> Result<Option<f64>, PointingError> {
        if !self.entries.contains_key(key) {
            return Ok(None);
        }
        self.require_double(key).map(Some)
    }

    pub fn require_integer(&self, key: &str) -> Result<i32, PointingError> {
        let values = self
            .integers(key)
            .ok_or_else(|| self.missing_or_wrong_type(key, "integer"))?;
        Self::check_count(key, 1, values.len())?;
        Ok(values[0])
    }

    pub fn require_string(&self, key: &str) -> Result<&str, PointingError> {
        let values = self
            .strings(key)
            .ok_or_else(|| self.missing_or_wrong_type(key, "string"))?;
        Self::check_count(key, 1, values.len())?;
        Ok(&values[0])
    }

    /// Like [`KernelPool::require_string`], but a missing keyword yields `Ok(None)`.
    pub fn optional_string(&self, key: &str) -> Result<Option<&str>, PointingError> {
        if !self.entries.contains_key(key) {
            return Ok(None);
        }
        self.require_string(key).map(Some)
    }

    /// Parse `text` as a text kernel and merge its assignments into the pool.
    ///
    /// Arguments
    /// -----------------
    /// * `source`: name used in error messages (usually the file path).
    /// * `text`: full kernel text, including comment sections.
    ///
    /// Return
    /// ----------
    /// * The number of assignments applied, or [`PointingError::TextKernelParse`] if the
    ///   data sections are malformed. A failed merge leaves the pool untouched.
    pub fn merge_text(&mut self, source: &str, text: &str) -> Result<usize, PointingError> {
        let assignments = parse_text_kernel(text).map_err(|reason| PointingError::TextKernelParse {
            path: source.to_string(),
            reason,
        })?;

        let mut staged = self.entries.clone();
        for assignment in &assignments {
            Self::apply(&mut staged, assignment).map_err(|reason| {
                PointingError::TextKernelParse {
                    path: source.to_string(),
                    reason,
                }
            })?;
        }
        self.entries = staged;

        debug!(
            source,
            assignments = assignments.len(),
            keywords = self.entries.len(),
            "merged text kernel into kernel pool"
        );
        Ok(assignments.len())
    }

    fn apply(entries: &mut HashMap<String, KernelValues>, assignment: &Assignment) -> Result<(), String> {
        match assignment.op {
            AssignmentOp::Replace => {
                entries.insert(assignment.name.clone(), assignment.values.clone());
            }
            AssignmentOp::Append => match (entries.get_mut(&assignment.name), &assignment.values) {
                (None, values) => {
                    entries.insert(assignment.name.clone(), values.clone());
                }
                (Some(KernelValues::Numbers(old)), KernelValues::Numbers(new)) => {
                    old.extend_from_slice(new)
                }
                (Some(KernelValues::Strings(old)), KernelValues::Strings(new)) => {
                    old.extend(new.iter().cloned())
                }
                (Some(old), new) => {
                    return Err(format!(
                        "cannot append {} values to {} values of {}",
                        new.kind(),
                        old.kind(),
                        assignment.name
                    ))
                }
            },
        }
        Ok(())
    }

    /// Read a text kernel from disk and merge it into the pool.
    pub fn load_text_kernel(&mut self, path: &Utf8Path) -> Result<usize, PointingError> {
        let text = std::fs::read_to_string(path)?;
        self.merge_text(path.as_str(), &text)
    }
}
