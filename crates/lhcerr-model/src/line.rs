//! A beam line: an ordered, name-keyed sequence of elements.

use globset::Glob;
use indexmap::IndexMap;
use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::TwissMethod;
use serde::{Deserialize, Serialize};

use crate::element::Element;

/// One beam line of the machine.
///
/// Elements keep their insertion order, which is the longitudinal order
/// along the ring; `append` maintains the running `s` coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    name: String,
    elements: IndexMap<String, Element>,
    /// Horizontal steering correctors available to trajectory correction.
    #[serde(default)]
    pub steering_correctors_x: Vec<String>,
    /// Vertical steering correctors available to trajectory correction.
    #[serde(default)]
    pub steering_correctors_y: Vec<String>,
    /// Horizontal orbit monitors available to trajectory correction.
    #[serde(default)]
    pub steering_monitors_x: Vec<String>,
    /// Vertical orbit monitors available to trajectory correction.
    #[serde(default)]
    pub steering_monitors_y: Vec<String>,
    /// Persistent twiss-method override for this line, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twiss_method: Option<TwissMethod>,
}

impl Line {
    /// Creates an empty line.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: IndexMap::new(),
            steering_correctors_x: Vec::new(),
            steering_correctors_y: Vec::new(),
            steering_monitors_x: Vec::new(),
            steering_monitors_y: Vec::new(),
            twiss_method: None,
        }
    }

    /// Line name (e.g. `lhcb1`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the counter-rotating line (beam 2/beam 4 frame).
    pub fn is_reversed(&self) -> bool {
        self.name.ends_with("b2")
    }

    /// Appends an element, assigning its `s` position at the current end
    /// of the line. Duplicate names are rejected.
    pub fn append(&mut self, name: impl Into<String>, mut element: Element) -> Result<(), Fault> {
        let name = name.into();
        if self.elements.contains_key(&name) {
            return Err(
                line_fault("duplicate-element", "element name already used in line")
                    .with_context("line", &self.name)
                    .with_context("element", name),
            );
        }
        element.s = self.end_s();
        self.elements.insert(name, element);
        Ok(())
    }

    /// Longitudinal position of the end of the line.
    pub fn end_s(&self) -> f64 {
        self.elements
            .last()
            .map(|(_, ee)| ee.s + ee.length)
            .unwrap_or(0.0)
    }

    /// Total circumference of the (closed) line.
    pub fn circumference(&self) -> f64 {
        self.end_s()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the line has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Looks up an element by name.
    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }

    /// Looks up an element by name, mutably.
    pub fn element_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements.get_mut(name)
    }

    /// Whether the line contains an element of this name.
    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    /// Looks up an element by name, failing with a model fault if absent.
    pub fn lookup(&self, name: &str) -> Result<&Element, Fault> {
        self.elements.get(name).ok_or_else(|| {
            line_fault("unknown-element", "element does not exist in line")
                .with_context("line", &self.name)
                .with_context("element", name)
        })
    }

    /// Element names in line order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(|name| name.as_str())
    }

    /// Elements with their names, in line order.
    pub fn elements(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.elements.iter().map(|(name, ee)| (name.as_str(), ee))
    }

    /// Elements with their names, in line order, mutably.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = (&str, &mut Element)> {
        self.elements.iter_mut().map(|(name, ee)| (name.as_str(), ee))
    }

    /// Names of elements matching a glob pattern, in line order.
    ///
    /// Character classes are supported, so `mb[!.]*` selects the
    /// separation dipoles while `mb.*` selects the main bends.
    pub fn matching_names(&self, pattern: &str) -> Result<Vec<String>, Fault> {
        let matcher = Glob::new(pattern)
            .map_err(|err| {
                line_fault("bad-pattern", "invalid element name pattern")
                    .with_context("pattern", pattern)
                    .with_context("cause", err.to_string())
            })?
            .compile_matcher();
        Ok(self
            .elements
            .keys()
            .filter(|name| matcher.is_match(name.as_str()))
            .cloned()
            .collect())
    }
}

fn line_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
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
