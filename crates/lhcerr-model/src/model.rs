//! The whole-machine model: lines plus the shared variable graph.

use std::fmt;

use indexmap::IndexMap;
use lhcerr_core::errors::{ErrorInfo, Fault};
use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::line::Line;
use crate::vars::VarGraph;

/// Name of an element within a named line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef {
    /// Line the element lives in.
    pub line: String,
    /// Element name within the line.
    pub element: String,
}

impl ElementRef {
    /// Creates a reference from line and element names.
    pub fn new(line: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            element: element.into(),
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.element, self.line)
    }
}

/// Complete machine model.
///
/// All lines share one variable graph, so a knob trimmed once acts on
/// both beams through the circuit expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatticeModel {
    lines: IndexMap<String, Line>,
    /// Shared deferred-expression variable graph.
    pub vars: VarGraph,
}

impl LatticeModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line to the model. Duplicate line names are rejected.
    pub fn add_line(&mut self, line: Line) -> Result<(), Fault> {
        if self.lines.contains_key(line.name()) {
            return Err(model_fault("duplicate-line", "line name already used in model")
                .with_context("line", line.name()));
        }
        self.lines.insert(line.name().to_string(), line);
        Ok(())
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the model holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Looks up a line by name.
    pub fn line(&self, name: &str) -> Option<&Line> {
        self.lines.get(name)
    }

    /// Looks up a line by name, mutably.
    pub fn line_mut(&mut self, name: &str) -> Option<&mut Line> {
        self.lines.get_mut(name)
    }

    /// Looks up a line by name, failing with a model fault if absent.
    pub fn require_line(&self, name: &str) -> Result<&Line, Fault> {
        self.lines.get(name).ok_or_else(|| {
            model_fault("unknown-line", "line does not exist in model").with_context("line", name)
        })
    }

    /// Looks up a line by name mutably, failing with a model fault if absent.
    pub fn require_line_mut(&mut self, name: &str) -> Result<&mut Line, Fault> {
        if !self.lines.contains_key(name) {
            return Err(
                model_fault("unknown-line", "line does not exist in model")
                    .with_context("line", name),
            );
        }
        Ok(&mut self.lines[name])
    }

    /// Line names in insertion order.
    pub fn line_names(&self) -> impl Iterator<Item = &str> {
        self.lines.keys().map(|name| name.as_str())
    }

    /// Lines with their names, in insertion order.
    pub fn lines(&self) -> impl Iterator<Item = (&str, &Line)> {
        self.lines.iter().map(|(name, line)| (name.as_str(), line))
    }

    /// Lines with their names, in insertion order, mutably.
    pub fn lines_mut(&mut self) -> impl Iterator<Item = (&str, &mut Line)> {
        self.lines.iter_mut().map(|(name, line)| (name.as_str(), line))
    }

    /// Resolves an element reference.
    pub fn element(&self, at: &ElementRef) -> Result<&Element, Fault> {
        self.require_line(&at.line)?.lookup(&at.element)
    }

    /// Resolves an element reference, mutably.
    pub fn element_mut(&mut self, at: &ElementRef) -> Result<&mut Element, Fault> {
        let line = self.require_line_mut(&at.line)?;
        line.element_mut(&at.element).ok_or_else(|| {
            model_fault("unknown-element", "element does not exist in line")
                .with_context("line", &at.line)
                .with_context("element", &at.element)
        })
    }
}

fn model_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
    Fault::Model(ErrorInfo::new(code, message))
}

trait ContextExt {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault;
}

impl ContextExt for Fault {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault {
        match self {
            Fault::Model(info) => Fault::Model(info.with_context(key, value.to_string())),
            other => other,
        }
    }
}
