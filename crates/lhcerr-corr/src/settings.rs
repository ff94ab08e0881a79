//! Parser for the MAD-X settings files the correction binary emits.

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_model::Expr;

/// Parses a MAD-X settings file into ordered `(name, expression)` pairs.
///
/// `!` and `//` comments run to the end of the line, statements are
/// separated by `;` and may span lines, and a bare `return` statement
/// is ignored. Variable names are folded to lower case.
pub fn parse_settings(text: &str) -> Result<Vec<(String, Expr)>, Fault> {
    let mut stripped = String::with_capacity(text.len());
    for line in text.lines() {
        let line = match line.find('!') {
            Some(cut) => &line[..cut],
            None => line,
        };
        let line = match line.find("//") {
            Some(cut) => &line[..cut],
            None => line,
        };
        stripped.push_str(line);
        stripped.push('\n');
    }

    let mut settings = Vec::new();
    for statement in stripped.split(';') {
        let statement = statement.trim().to_ascii_lowercase();
        if statement.is_empty() || statement == "return" {
            continue;
        }
        let (name, value) = split_assignment(&statement)?;
        let expr = Expr::parse(value).map_err(|fault| {
            settings_fault("bad-setting", "cannot parse the assigned expression")
                .with_context("statement", &statement)
                .with_context("cause", fault)
        })?;
        settings.push((name, expr));
    }
    Ok(settings)
}

fn split_assignment(statement: &str) -> Result<(String, &str), Fault> {
    let (lhs, rhs) = match statement.split_once(":=") {
        Some(parts) => parts,
        None => statement.split_once('=').ok_or_else(|| {
            settings_fault("bad-setting", "statement is not an assignment")
                .with_context("statement", statement)
        })?,
    };
    let name = lhs.trim().to_string();
    if name.is_empty() {
        return Err(
            settings_fault("bad-setting", "assignment carries no variable name")
                .with_context("statement", statement),
        );
    }
    Ok((name, rhs))
}

fn settings_fault(code: &str, message: &str) -> Fault {
    Fault::Correction(ErrorInfo::new(code, message))
}

trait ContextExt {
    fn with_context(self, key: &str, value: impl ToString) -> Fault;
}

impl ContextExt for Fault {
    fn with_context(self, key: &str, value: impl ToString) -> Fault {
        match self {
            Fault::Correction(info) => Fault::Correction(info.with_context(key, value.to_string())),
            other => other,
        }
    }
}
