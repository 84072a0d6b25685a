use chrono::NaiveDate;
use serde_json::Value;

use crate::domain::product::{DateBound, FieldKind};
use crate::domain::session::FieldValue;

/// Coerces one extracted value onto the field's kind.
///
/// Returns `None` when the value is absent, empty or cannot be normalised, in
/// which case the merge leaves the existing value untouched.
pub fn normalize_value(kind: &FieldKind, value: &Value, today: NaiveDate) -> Option<FieldValue> {
    if is_empty_value(value) {
        return None;
    }

    match kind {
        FieldKind::Text => normalize_text(value),
        FieldKind::Integer => normalize_integer(value),
        FieldKind::Boolean => normalize_boolean(value),
        FieldKind::Date(bound) => {
            let date = normalize_date(value)?;
            let out_of_bounds = match bound {
                DateBound::NotBeforeToday => date < today,
                DateBound::NotAfterToday => date > today,
            };
            if out_of_bounds {
                return None;
            }
            Some(FieldValue::Text(date.format("%Y-%m-%d").to_string()))
        }
        FieldKind::Choice(options) => {
            let raw = value.as_str()?.trim();
            options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(raw))
                .map(|option| FieldValue::Text((*option).to_string()))
        }
    }
}

pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn normalize_text(value: &Value) -> Option<FieldValue> {
    match value {
        Value::String(text) => Some(FieldValue::Text(text.trim().to_string())),
        Value::Number(number) => Some(FieldValue::Text(number.to_string())),
        Value::Bool(flag) => Some(FieldValue::Text(flag.to_string())),
        _ => None,
    }
}

fn normalize_integer(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|float| float.fract() == 0.0)
                    .filter(|float| (i64::MIN as f64..i64::MAX as f64).contains(float))
                    .map(|float| float as i64)
            })
            .map(FieldValue::Integer),
        Value::String(text) => text.trim().parse::<i64>().ok().map(FieldValue::Integer),
        _ => None,
    }
}

fn normalize_boolean(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Bool(flag) => Some(FieldValue::Boolean(*flag)),
        Value::String(text) => parse_yes_no(text).map(FieldValue::Boolean),
        _ => None,
    }
}

pub fn parse_yes_no(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "yeah" | "yep" => Some(true),
        "no" | "n" | "false" | "nope" => Some(false),
        _ => None,
    }
}

/// Accepted layouts: format, separator, and position of the year segment.
const DATE_FORMATS: [(&str, char, usize); 3] =
    [("%Y-%m-%d", '-', 0), ("%d/%m/%Y", '/', 2), ("%d-%m-%Y", '-', 2)];

/// Parses a date whose year is written with exactly four digits. chrono's `%Y`
/// alone would read "12-05-90" as the year 90.
fn normalize_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    DATE_FORMATS.iter().find_map(|(format, separator, year_index)| {
        let year = raw.split(*separator).nth(*year_index)?;
        if year.len() != 4 || !year.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        NaiveDate::parse_from_str(raw, format).ok()
    })
}
