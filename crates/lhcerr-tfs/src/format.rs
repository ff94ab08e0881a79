//! Fixed-width float rendering for the legacy table files.
//!
//! The external correction binary parses its inputs with Fortran edit
//! descriptors, so every numeric field must land right-justified in a
//! fourteen character column with at most a two digit exponent.

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::Result;

/// Column width of every numeric field in the legacy table files.
pub const FIELD_WIDTH: usize = 14;

/// Renders a value into the fixed-width Fortran field.
///
/// Magnitudes in `[1e-4, 999999999]` (down to `-99999999` on the negative
/// side) use fixed-point notation with trailing zeros trimmed but at least
/// one decimal kept; everything else uses exponential notation with a
/// trimmed mantissa and a signed two digit exponent. Magnitudes below
/// `1e-99` collapse to `0.0`; magnitudes that would need a three digit
/// exponent are a fault.
pub fn fortran_float(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(format_fault(
            "non-finite-value",
            "only finite values can be rendered into a table field",
        ));
    }
    if value.abs() > 9.99e99 {
        return Err(format_fault(
            "value-too-large",
            format!("{value:e} does not fit a two digit exponent field"),
        ));
    }
    if value.abs() < 1e-99 {
        return Ok(format!("{:>FIELD_WIDTH$}", "0.0"));
    }
    let text = if (1e-4..=999_999_999.0).contains(&value)
        || (-99_999_999.0..=-1e-4).contains(&value)
    {
        render_fixed(value)
    } else {
        render_exponential(value)
    };
    Ok(text)
}

/// Fixed-point rendering with a 12 (positive) or 11 (negative) digit budget.
fn render_fixed(value: f64) -> String {
    let max_digits: i32 = if value > 0.0 { 12 } else { 11 };
    let magnitude = value.abs().log10().floor() as i32;
    let n_decimal = (max_digits - magnitude.max(0)) as usize;
    let rendered = format!("{value:.n_decimal$}");
    let text = match rendered.split_once('.') {
        Some((whole, decimals)) => {
            let kept = decimals.trim_end_matches('0');
            let kept = if kept.is_empty() { "0" } else { kept };
            format!("{whole}.{kept}")
        }
        None => format!("{rendered}."),
    };
    format!("{text:>FIELD_WIDTH$}")
}

/// Exponential rendering with an 8 (positive) or 7 (negative) digit mantissa.
fn render_exponential(value: f64) -> String {
    let max_digits: usize = if value > 0.0 { 8 } else { 7 };
    let rendered = format!("{value:.max_digits$E}");
    let parsed = rendered
        .split_once('E')
        .and_then(|(mantissa, exp)| exp.parse::<i32>().ok().map(|exp| (mantissa, exp)));
    let Some((mantissa, mut exponent)) = parsed else {
        return format!("{rendered:>FIELD_WIDTH$}");
    };
    let negative = mantissa.starts_with('-');
    let mut digits = mantissa.strip_prefix('-').unwrap_or(mantissa).to_string();
    if digits.starts_with("10.") {
        // Rounding at the mantissa budget can carry past a decade.
        digits = format!("1.{}", &digits[3..]);
        exponent += 1;
    }
    let compact = match digits.split_once('.') {
        Some((whole, decimals)) => {
            let kept = decimals.trim_end_matches('0');
            if kept.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{kept}")
            }
        }
        None => digits.clone(),
    };
    let sign = if negative { "-" } else { "" };
    let exp_sign = if exponent < 0 { '-' } else { '+' };
    let text = format!(
        "{sign}{compact}E{exp_sign}{:02}",
        exponent.unsigned_abs()
    );
    format!("{text:>FIELD_WIDTH$}")
}

fn format_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
    Fault::Table(ErrorInfo::new(code, message))
}
