//! Deferred-expression variable graph.
//!
//! Magnet circuits and machine knobs are coupled through MAD-X style
//! deferred expressions (`kqtf.b1 := kqtf + 0.3 * on_phase`). The graph
//! stores literals and expressions in insertion order, rejects circular
//! definitions and evaluates on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lhcerr_core::errors::{ErrorInfo, Fault};
use serde::{Deserialize, Serialize};

/// Arithmetic expression over variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// Reference to another variable.
    Var(String),
    /// Unary minus.
    Neg(Box<Expr>),
    /// Sum of two expressions.
    Add(Box<Expr>, Box<Expr>),
    /// Difference of two expressions.
    Sub(Box<Expr>, Box<Expr>),
    /// Product of two expressions.
    Mul(Box<Expr>, Box<Expr>),
    /// Quotient of two expressions.
    Div(Box<Expr>, Box<Expr>),
    /// Power, right associative.
    Pow(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Numeric literal expression.
    pub fn number(value: f64) -> Self {
        Expr::Number(value)
    }

    /// Variable reference expression.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// Negates the expression, folding numeric literals.
    pub fn neg(self) -> Self {
        match self {
            Expr::Number(value) => Expr::Number(-value),
            other => Expr::Neg(Box::new(other)),
        }
    }

    /// `self + rhs`.
    pub fn add(self, rhs: Expr) -> Self {
        Expr::Add(Box::new(self), Box::new(rhs))
    }

    /// `self - rhs`.
    pub fn sub(self, rhs: Expr) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    /// `self * rhs`.
    pub fn mul(self, rhs: Expr) -> Self {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }

    /// `self / rhs`.
    pub fn div(self, rhs: Expr) -> Self {
        Expr::Div(Box::new(self), Box::new(rhs))
    }

    /// `self ^ rhs`.
    pub fn pow(self, rhs: Expr) -> Self {
        Expr::Pow(Box::new(self), Box::new(rhs))
    }

    /// Parses a MAD-X style expression.
    ///
    /// Names may contain dots and underscores (`kqtf.b1`, `on_x1`).
    /// `Display` renders a form this parser reads back to an equal tree.
    pub fn parse(text: &str) -> Result<Expr, Fault> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression(text)?;
        if parser.pos != parser.tokens.len() {
            return Err(vars_fault("bad-expression", "trailing input after expression")
                .with_context("text", text));
        }
        Ok(expr)
    }

    /// Names of every variable the expression references.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(..) | Expr::Sub(..) => 1,
            Expr::Mul(..) | Expr::Div(..) => 2,
            Expr::Neg(..) => 3,
            Expr::Pow(..) => 4,
            Expr::Number(..) | Expr::Var(..) => 5,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn child(f: &mut fmt::Formatter<'_>, expr: &Expr, parens: bool) -> fmt::Result {
            if parens {
                write!(f, "({expr})")
            } else {
                write!(f, "{expr}")
            }
        }
        match self {
            Expr::Number(value) => write!(f, "{value}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Neg(inner) => {
                write!(f, "-")?;
                child(f, inner, inner.precedence() < 3)
            }
            Expr::Add(lhs, rhs) => {
                child(f, lhs, lhs.precedence() < 1)?;
                write!(f, " + ")?;
                child(f, rhs, rhs.precedence() <= 1)
            }
            Expr::Sub(lhs, rhs) => {
                child(f, lhs, lhs.precedence() < 1)?;
                write!(f, " - ")?;
                child(f, rhs, rhs.precedence() <= 1)
            }
            Expr::Mul(lhs, rhs) => {
                child(f, lhs, lhs.precedence() < 2)?;
                write!(f, " * ")?;
                child(f, rhs, rhs.precedence() <= 2)
            }
            Expr::Div(lhs, rhs) => {
                child(f, lhs, lhs.precedence() < 2)?;
                write!(f, " / ")?;
                child(f, rhs, rhs.precedence() <= 2)
            }
            Expr::Pow(lhs, rhs) => {
                // A bare negative literal on the left would re-parse as a
                // negated power, so it keeps its parentheses.
                let negative = matches!(**lhs, Expr::Number(value) if value < 0.0);
                child(f, lhs, lhs.precedence() <= 4 || negative)?;
                write!(f, " ^ ")?;
                child(f, rhs, rhs.precedence() <= 2)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, Fault> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if ch.is_whitespace() {
            idx += 1;
            continue;
        }
        match ch {
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '^' => tokens.push(Token::Caret),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            _ if ch.is_ascii_digit()
                || (ch == '.' && chars.get(idx + 1).is_some_and(|next| next.is_ascii_digit())) =>
            {
                let (end, literal) = scan_number(&chars, idx);
                let value: f64 = literal.parse().map_err(|_| {
                    vars_fault("bad-expression", "malformed numeric literal")
                        .with_context("text", text)
                        .with_context("literal", &literal)
                })?;
                tokens.push(Token::Number(value));
                idx = end;
                continue;
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let (end, name) = scan_name(&chars, idx);
                tokens.push(Token::Name(name));
                idx = end;
                continue;
            }
            other => {
                return Err(vars_fault("bad-expression", "unexpected character")
                    .with_context("text", text)
                    .with_context("character", other)
                    .with_context("position", idx));
            }
        }
        idx += 1;
    }
    Ok(tokens)
}

fn scan_number(chars: &[char], start: usize) -> (usize, String) {
    let mut end = start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end < chars.len() && chars[end] == '.' {
        end += 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < chars.len() && matches!(chars[end], 'e' | 'E') {
        let mut probe = end + 1;
        if probe < chars.len() && matches!(chars[probe], '+' | '-') {
            probe += 1;
        }
        if probe < chars.len() && chars[probe].is_ascii_digit() {
            end = probe;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    (end, chars[start..end].iter().collect())
}

fn scan_name(chars: &[char], start: usize) -> (usize, String) {
    let mut end = start;
    while end < chars.len()
        && (chars[end].is_ascii_alphanumeric() || chars[end] == '_' || chars[end] == '.')
    {
        end += 1;
    }
    (end, chars[start..end].iter().collect())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self, text: &str) -> Result<Expr, Fault> {
        let mut node = self.term(text)?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    node = node.add(self.term(text)?);
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    node = node.sub(self.term(text)?);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn term(&mut self, text: &str) -> Result<Expr, Fault> {
        let mut node = self.unary(text)?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    node = node.mul(self.unary(text)?);
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    node = node.div(self.unary(text)?);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn unary(&mut self, text: &str) -> Result<Expr, Fault> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(self.unary(text)?.neg())
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary(text)
            }
            _ => self.power(text),
        }
    }

    fn power(&mut self, text: &str) -> Result<Expr, Fault> {
        let base = self.primary(text)?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.pos += 1;
            let exponent = self.unary(text)?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self, text: &str) -> Result<Expr, Fault> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Name(name)) => Ok(Expr::Var(name)),
            Some(Token::Open) => {
                let inner = self.expression(text)?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(vars_fault("bad-expression", "unbalanced parenthesis")
                        .with_context("text", text)),
                }
            }
            _ => Err(vars_fault("bad-expression", "expected a value")
                .with_context("text", text)),
        }
    }
}

/// A stored variable definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VarRepr", into = "VarRepr")]
pub enum VarDef {
    /// Plain numeric value.
    Literal(f64),
    /// Deferred expression re-evaluated on every read.
    Expression(Expr),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum VarRepr {
    Number(f64),
    Text(String),
}

impl From<VarDef> for VarRepr {
    fn from(def: VarDef) -> Self {
        match def {
            VarDef::Literal(value) => VarRepr::Number(value),
            VarDef::Expression(expr) => VarRepr::Text(expr.to_string()),
        }
    }
}

impl TryFrom<VarRepr> for VarDef {
    type Error = Fault;

    fn try_from(repr: VarRepr) -> Result<Self, Fault> {
        match repr {
            VarRepr::Number(value) => Ok(VarDef::Literal(value)),
            VarRepr::Text(text) => match Expr::parse(&text)? {
                Expr::Number(value) => Ok(VarDef::Literal(value)),
                expr => Ok(VarDef::Expression(expr)),
            },
        }
    }
}

/// Insertion-ordered variable store with acyclic deferred expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarGraph {
    vars: indexmap::IndexMap<String, VarDef>,
}

impl VarGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Whether the variable is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// The stored definition, if any.
    pub fn get(&self, name: &str) -> Option<&VarDef> {
        self.vars.get(name)
    }

    /// Variable names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(|name| name.as_str())
    }

    /// Definitions with their names, in insertion order.
    pub fn defs(&self) -> impl Iterator<Item = (&str, &VarDef)> {
        self.vars.iter().map(|(name, def)| (name.as_str(), def))
    }

    /// Rebuilds a graph from stored definitions, re-validating acyclicity.
    pub fn from_defs(defs: impl IntoIterator<Item = (String, VarDef)>) -> Result<Self, Fault> {
        let mut graph = Self::new();
        for (name, def) in defs {
            match def {
                VarDef::Literal(value) => graph.set(name, value),
                VarDef::Expression(expr) => graph.set_expr(name, expr)?,
            }
        }
        Ok(graph)
    }

    /// Assigns a literal value, overwriting any previous definition.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.vars.insert(name.into(), VarDef::Literal(value));
    }

    /// Assigns a literal only if the variable is not yet defined.
    pub fn define_default(&mut self, name: impl Into<String>, value: f64) {
        self.vars.entry(name.into()).or_insert(VarDef::Literal(value));
    }

    /// Assigns a deferred expression, overwriting any previous definition.
    ///
    /// Expressions that would introduce a circular dependency are
    /// rejected; referencing a not-yet-defined name is allowed and the
    /// missing name evaluates to zero until defined.
    pub fn set_expr(&mut self, name: impl Into<String>, expr: Expr) -> Result<(), Fault> {
        let name = name.into();
        if let Expr::Number(value) = expr {
            self.vars.insert(name, VarDef::Literal(value));
            return Ok(());
        }
        if self.would_create_cycle(&name, &expr) {
            return Err(vars_fault(
                "variable-cycle",
                "assignment would introduce a circular dependency",
            )
            .with_context("variable", name));
        }
        self.vars.insert(name, VarDef::Expression(expr));
        Ok(())
    }

    /// Adds a term to an existing definition (`name = name + expr`).
    ///
    /// A negated term folds to a subtraction. Adding to an undefined
    /// variable defines it as the term itself.
    pub fn add_to(&mut self, name: impl Into<String>, expr: Expr) -> Result<(), Fault> {
        let name = name.into();
        let folded = match self.vars.get(&name).cloned() {
            None => expr,
            Some(VarDef::Literal(current)) => match expr {
                Expr::Number(value) => Expr::Number(current + value),
                Expr::Neg(inner) => Expr::Sub(Box::new(Expr::Number(current)), inner),
                other => Expr::Number(current).add(other),
            },
            Some(VarDef::Expression(current)) => match expr {
                Expr::Neg(inner) => Expr::Sub(Box::new(current), inner),
                other => current.add(other),
            },
        };
        self.set_expr(name, folded)
    }

    /// Evaluates an expression against the graph and stores the result
    /// as a literal. This is the immediate (`=`) assignment flavour.
    pub fn set_evaluated(&mut self, name: impl Into<String>, expr: &Expr) {
        let mut cache = BTreeMap::new();
        let value = self.eval_expr(expr, &mut cache);
        self.vars.insert(name.into(), VarDef::Literal(value));
    }

    /// Evaluates a variable. Unknown names are a model fault.
    pub fn value(&self, name: &str) -> Result<f64, Fault> {
        if !self.vars.contains_key(name) {
            return Err(vars_fault("unknown-variable", "variable is not defined")
                .with_context("variable", name));
        }
        let mut cache = BTreeMap::new();
        Ok(self.eval_name(name, &mut cache))
    }

    /// Evaluates a variable, falling back to `default` when undefined.
    pub fn value_or(&self, name: &str, default: f64) -> f64 {
        if !self.vars.contains_key(name) {
            return default;
        }
        let mut cache = BTreeMap::new();
        self.eval_name(name, &mut cache)
    }

    /// Evaluates an expression against the current graph state.
    pub fn evaluate(&self, expr: &Expr) -> f64 {
        let mut cache = BTreeMap::new();
        self.eval_expr(expr, &mut cache)
    }

    /// Names directly referenced by the definition of `name`.
    pub fn direct_dependencies(&self, name: &str) -> BTreeSet<String> {
        match self.vars.get(name) {
            Some(VarDef::Expression(expr)) => expr.variables(),
            _ => BTreeSet::new(),
        }
    }

    /// Names `name` depends on, transitively.
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = self.direct_dependencies(name).into_iter().collect();
        while let Some(dep) = stack.pop() {
            if seen.insert(dep.clone()) {
                stack.extend(self.direct_dependencies(&dep));
            }
        }
        seen
    }

    /// Names whose definitions depend on `name`, transitively.
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (var, def) in &self.vars {
            if let VarDef::Expression(expr) = def {
                for dep in expr.variables() {
                    reverse.entry(dep).or_default().insert(var.clone());
                }
            }
        }
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = reverse
            .get(name)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default();
        while let Some(user) = stack.pop() {
            if seen.insert(user.clone()) {
                if let Some(more) = reverse.get(&user) {
                    stack.extend(more.iter().cloned());
                }
            }
        }
        seen
    }

    fn eval_name(&self, name: &str, cache: &mut BTreeMap<String, f64>) -> f64 {
        if let Some(value) = cache.get(name) {
            return *value;
        }
        let value = match self.vars.get(name) {
            None => 0.0,
            Some(VarDef::Literal(value)) => *value,
            Some(VarDef::Expression(expr)) => self.eval_expr(expr, cache),
        };
        cache.insert(name.to_string(), value);
        value
    }

    fn eval_expr(&self, expr: &Expr, cache: &mut BTreeMap<String, f64>) -> f64 {
        match expr {
            Expr::Number(value) => *value,
            Expr::Var(name) => self.eval_name(name, cache),
            Expr::Neg(inner) => -self.eval_expr(inner, cache),
            Expr::Add(lhs, rhs) => self.eval_expr(lhs, cache) + self.eval_expr(rhs, cache),
            Expr::Sub(lhs, rhs) => self.eval_expr(lhs, cache) - self.eval_expr(rhs, cache),
            Expr::Mul(lhs, rhs) => self.eval_expr(lhs, cache) * self.eval_expr(rhs, cache),
            Expr::Div(lhs, rhs) => self.eval_expr(lhs, cache) / self.eval_expr(rhs, cache),
            Expr::Pow(lhs, rhs) => self.eval_expr(lhs, cache).powf(self.eval_expr(rhs, cache)),
        }
    }

    fn would_create_cycle(&self, name: &str, expr: &Expr) -> bool {
        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (var, def) in &self.vars {
            if let VarDef::Expression(stored) = def {
                adjacency.insert(var.clone(), stored.variables());
            }
        }
        adjacency.insert(name.to_string(), expr.variables());
        let mut states: BTreeMap<String, VisitState> = BTreeMap::new();
        for var in adjacency.keys() {
            states.insert(var.clone(), VisitState::NotVisited);
        }
        for var in states.keys().cloned().collect::<Vec<_>>() {
            if dfs(&var, &adjacency, &mut states) {
                return true;
            }
        }
        false
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    NotVisited,
    Visiting,
    Visited,
}

fn dfs(
    name: &str,
    adjacency: &BTreeMap<String, BTreeSet<String>>,
    states: &mut BTreeMap<String, VisitState>,
) -> bool {
    match states.get(name).copied().unwrap_or(VisitState::NotVisited) {
        VisitState::Visiting => true,
        VisitState::Visited => false,
        VisitState::NotVisited => {
            states.insert(name.to_string(), VisitState::Visiting);
            if let Some(neighbours) = adjacency.get(name) {
                for neighbour in neighbours {
                    if dfs(neighbour, adjacency, states) {
                        return true;
                    }
                }
            }
            states.insert(name.to_string(), VisitState::Visited);
            false
        }
    }
}

fn vars_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
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
