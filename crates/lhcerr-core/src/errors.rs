//! Structured fault types shared across lhcerr crates.
//!
//! "Error" is domain vocabulary here (magnet field errors), so the
//! failure type is called [`Fault`] to keep the two apart.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`Fault`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable fault code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (names, paths, values).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new fault payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical fault type for the lhcerr pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum Fault {
    /// Lattice model and variable graph faults.
    #[error("model fault: {0}")]
    Model(ErrorInfo),
    /// Table parsing and formatting faults.
    #[error("table fault: {0}")]
    Table(ErrorInfo),
    /// Error assignment faults.
    #[error("assignment fault: {0}")]
    Assignment(ErrorInfo),
    /// Optics matching faults, including non-convergence.
    #[error("matching fault: {0}")]
    Matching(ErrorInfo),
    /// External correction bridge faults.
    #[error("correction fault: {0}")]
    Correction(ErrorInfo),
    /// Configuration and scenario faults.
    #[error("config fault: {0}")]
    Config(ErrorInfo),
    /// Serialization and schema faults.
    #[error("serde fault: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl Fault {
    /// Returns a reference to the payload describing the fault.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            Fault::Model(info)
            | Fault::Table(info)
            | Fault::Assignment(info)
            | Fault::Matching(info)
            | Fault::Correction(info)
            | Fault::Config(info)
            | Fault::Serde(info) => info,
        }
    }
}
