//! Validator (C1) — cast a raw measured value and test it against a limit rule.
//!
//! Grounded on the teacher's `validation` module for the shape of small,
//! pure validation functions; the casting/limit-rule table itself comes
//! from `spec.md` §4.1.

use bigdecimal::BigDecimal;
use std::str::FromStr;

use crate::plan::{LimitType, MeasuredValue, Outcome, ValueType};

const NO_INSTRUMENT_SENTINEL: &str = "no instrument found";

/// Result of validating one measured value against one limit rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub outcome: Outcome,
    pub error_message: Option<String>,
}

impl ValidationOutcome {
    fn pass() -> Self {
        ValidationOutcome {
            outcome: Outcome::Pass,
            error_message: None,
        }
    }

    fn fail(msg: impl Into<String>) -> Self {
        ValidationOutcome {
            outcome: Outcome::Fail,
            error_message: Some(msg.into()),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        ValidationOutcome {
            outcome: Outcome::Error,
            error_message: Some(msg.into()),
        }
    }
}

/// Validate a raw measured value against a declared type and limit rule.
pub fn validate(
    measured_raw: &MeasuredValue,
    value_type: Option<ValueType>,
    limit_type: Option<LimitType>,
    lower_limit: Option<f64>,
    upper_limit: Option<f64>,
    eq_limit: Option<&str>,
) -> ValidationOutcome {
    if let MeasuredValue::Text(s) = measured_raw {
        if s.eq_ignore_ascii_case(NO_INSTRUMENT_SENTINEL) {
            return ValidationOutcome::error(s.clone());
        }
    }

    let cast = match cast_value(measured_raw, value_type) {
        Ok(cast) => cast,
        Err(msg) => return ValidationOutcome::error(msg),
    };

    match limit_type.unwrap_or(LimitType::None) {
        LimitType::None => ValidationOutcome::pass(),
        LimitType::Lower => check_lower(&cast, lower_limit),
        LimitType::Upper => check_upper(&cast, upper_limit),
        LimitType::Both => {
            let lower = check_lower(&cast, lower_limit);
            if lower.outcome != Outcome::Pass {
                return lower;
            }
            check_upper(&cast, upper_limit)
        }
        LimitType::Equality => check_equality(&cast, eq_limit, value_type, true),
        LimitType::Inequality => check_equality(&cast, eq_limit, value_type, false),
        LimitType::Partial => check_partial(&cast, eq_limit),
    }
}

/// Intermediate cast result: always keeps both a textual and (if
/// applicable) numeric representation so limit checks don't re-parse.
enum Cast {
    Text(String),
    Number(f64),
}

fn cast_value(raw: &MeasuredValue, value_type: Option<ValueType>) -> Result<Cast, String> {
    match value_type {
        None | Some(ValueType::String) => Ok(Cast::Text(raw.as_text())),
        Some(ValueType::Integer) => {
            let text = raw.as_text();
            let trimmed = text.trim();
            let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or(trimmed.strip_prefix("0X")) {
                i64::from_str_radix(hex, 16).ok()
            } else if let Some(oct) = trimmed.strip_prefix("0o").or(trimmed.strip_prefix("0O")) {
                i64::from_str_radix(oct, 8).ok()
            } else if let Some(bin) = trimmed.strip_prefix("0b").or(trimmed.strip_prefix("0B")) {
                i64::from_str_radix(bin, 2).ok()
            } else {
                trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.is_finite())
                        .map(|f| f as i64)
                })
            };
            parsed
                .map(|v| Cast::Number(v as f64))
                .ok_or_else(|| format!("cannot cast '{trimmed}' to integer"))
        }
        Some(ValueType::Float) => {
            let text = raw.as_text();
            let trimmed = text.trim();
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Cast::Number)
                .ok_or_else(|| format!("cannot cast '{trimmed}' to float"))
        }
    }
}

fn cast_as_f64(cast: &Cast) -> Option<f64> {
    match cast {
        Cast::Number(n) => Some(*n),
        Cast::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
    }
}

fn check_lower(cast: &Cast, lower_limit: Option<f64>) -> ValidationOutcome {
    let Some(lower) = lower_limit else {
        return ValidationOutcome::error("lower limit not configured");
    };
    let Some(value) = cast_as_f64(cast) else {
        return ValidationOutcome::error("value is not numeric");
    };
    if value >= lower {
        ValidationOutcome::pass()
    } else {
        ValidationOutcome::fail(format!("{value} < lower limit {lower}"))
    }
}

fn check_upper(cast: &Cast, upper_limit: Option<f64>) -> ValidationOutcome {
    let Some(upper) = upper_limit else {
        return ValidationOutcome::error("upper limit not configured");
    };
    let Some(value) = cast_as_f64(cast) else {
        return ValidationOutcome::error("value is not numeric");
    };
    if value <= upper {
        ValidationOutcome::pass()
    } else {
        ValidationOutcome::fail(format!("{value} > upper limit {upper}"))
    }
}

fn check_equality(
    cast: &Cast,
    eq_limit: Option<&str>,
    value_type: Option<ValueType>,
    want_equal: bool,
) -> ValidationOutcome {
    let Some(eq_limit) = eq_limit else {
        return ValidationOutcome::error("equality limit not configured");
    };

    let is_equal = match value_type {
        Some(ValueType::Float) => {
            let (Some(a), Ok(b)) = (cast_as_f64(cast), eq_limit.trim().parse::<f64>()) else {
                return ValidationOutcome::error("value is not numeric");
            };
            let tolerance = 1e-9 * a.abs().max(b.abs()).max(1.0);
            (a - b).abs() <= tolerance
        }
        Some(ValueType::Integer) => match (cast_as_f64(cast), decimal_of(eq_limit)) {
            (Some(a), Some(b)) => decimal_of(&format!("{a}")).map(|a| a == b).unwrap_or(false),
            _ => return ValidationOutcome::error("value is not numeric"),
        },
        _ => match cast {
            Cast::Text(s) => s == eq_limit,
            Cast::Number(n) => match decimal_of(&format!("{n}")).zip(decimal_of(eq_limit)) {
                Some((a, b)) => a == b,
                None => format_cast_text(cast) == eq_limit,
            },
        },
    };

    if is_equal == want_equal {
        ValidationOutcome::pass()
    } else if want_equal {
        ValidationOutcome::fail(format!("value did not equal '{eq_limit}'"))
    } else {
        ValidationOutcome::fail(format!("value unexpectedly equalled '{eq_limit}'"))
    }
}

fn decimal_of(s: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(s.trim()).ok()
}

fn format_cast_text(cast: &Cast) -> String {
    match cast {
        Cast::Text(s) => s.clone(),
        Cast::Number(n) => crate::plan::format_number(*n),
    }
}

fn check_partial(cast: &Cast, eq_limit: Option<&str>) -> ValidationOutcome {
    let Some(needle) = eq_limit else {
        return ValidationOutcome::error("partial-match limit not configured");
    };
    let haystack = format_cast_text(cast);
    if haystack.contains(needle) {
        ValidationOutcome::pass()
    } else {
        ValidationOutcome::fail(format!("'{needle}' not found in '{haystack}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(s: &str) -> MeasuredValue {
        MeasuredValue::Text(s.to_string())
    }

    #[test]
    fn none_limit_always_passes() {
        let out = validate(&mv("anything"), None, Some(LimitType::None), None, None, None);
        assert_eq!(out.outcome, Outcome::Pass);
    }

    #[test]
    fn both_limits_pass_in_range() {
        let out = validate(
            &MeasuredValue::Number(5.01),
            Some(ValueType::Float),
            Some(LimitType::Both),
            Some(4.8),
            Some(5.2),
            None,
        );
        assert_eq!(out.outcome, Outcome::Pass);
    }

    #[test]
    fn both_limits_fail_out_of_range() {
        let out = validate(
            &MeasuredValue::Number(5.5),
            Some(ValueType::Float),
            Some(LimitType::Both),
            Some(4.8),
            Some(5.2),
            None,
        );
        assert_eq!(out.outcome, Outcome::Fail);
    }

    #[test]
    fn no_instrument_sentinel_forces_error() {
        let out = validate(&mv("No instrument found"), Some(ValueType::Float), Some(LimitType::Both), Some(0.0), Some(1.0), None);
        assert_eq!(out.outcome, Outcome::Error);
    }

    #[test]
    fn integer_cast_accepts_hex() {
        let out = validate(&mv("0x2A"), Some(ValueType::Integer), Some(LimitType::Equality), None, None, Some("42"));
        assert_eq!(out.outcome, Outcome::Pass);
    }

    #[test]
    fn equality_partial_matches_substring() {
        let out = validate(&mv("hello world"), Some(ValueType::String), Some(LimitType::Partial), None, None, Some("hello"));
        assert_eq!(out.outcome, Outcome::Pass);
    }

    #[test]
    fn inequality_fails_when_equal() {
        let out = validate(&mv("456"), Some(ValueType::Integer), Some(LimitType::Inequality), None, None, Some("456"));
        assert_eq!(out.outcome, Outcome::Fail);
    }

    #[test]
    fn float_equality_uses_relative_tolerance() {
        let out = validate(
            &MeasuredValue::Number(1.000000001),
            Some(ValueType::Float),
            Some(LimitType::Equality),
            None,
            None,
            Some("1.0"),
        );
        assert_eq!(out.outcome, Outcome::Pass);
    }
}
