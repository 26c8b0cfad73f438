//! Value comparison for ordering merged rows.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{ShardError, ShardResult};
use crate::sql::{DatabaseType, NullsOrder, OrderByItem, OrderDirection};

/// Compare two JSON values for ordering.
///
/// Null < anything else. Numbers compare numerically whatever their
/// representation; booleans and strings compare within their own kind.
/// Arrays, objects and mixed kinds are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> ShardResult<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Null, _) => Ok(Ordering::Less),
        (_, Value::Null) => Ok(Ordering::Greater),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Ok(a.cmp(&b));
            }
            if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                return Ok(a.cmp(&b));
            }
            let a_f64 = a.as_f64().unwrap_or(0.0);
            let b_f64 = b.as_f64().unwrap_or(0.0);
            a_f64
                .partial_cmp(&b_f64)
                .ok_or_else(|| ShardError::NotComparable(format!("{} and {}", a, b)))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ShardError::NotComparable(format!(
            "{} and {}",
            describe(a),
            describe(b)
        ))),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Three-way comparison used by every merge ordering.
///
/// # Arguments
/// * `direction` - Applied to non-null comparisons only
/// * `nulls` - Absolute placement of a null against a non-null value
/// * `case_sensitive` - When false, strings compare lower-cased
pub fn compare_to(
    a: &Value,
    b: &Value,
    direction: OrderDirection,
    nulls: NullsOrder,
    case_sensitive: bool,
) -> ShardResult<Ordering> {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => {
            return Ok(match nulls {
                NullsOrder::First => Ordering::Less,
                NullsOrder::Last => Ordering::Greater,
            })
        }
        (false, true) => {
            return Ok(match nulls {
                NullsOrder::First => Ordering::Greater,
                NullsOrder::Last => Ordering::Less,
            })
        }
        (false, false) => {}
    }

    let ordering = match (a, b) {
        (Value::String(a), Value::String(b)) if !case_sensitive => {
            a.to_lowercase().cmp(&b.to_lowercase())
        }
        _ => compare_values(a, b)?,
    };

    Ok(match direction {
        OrderDirection::Asc => ordering,
        OrderDirection::Desc => ordering.reverse(),
    })
}

/// Compares materialized rows item by item.
pub struct RowComparator<'a> {
    items: &'a [OrderByItem],
    database_type: DatabaseType,
    /// Case sensitivity per 1-based column index, stored at `index - 1`.
    case_sensitivity: &'a [bool],
}

impl<'a> RowComparator<'a> {
    pub fn new(items: &'a [OrderByItem], database_type: DatabaseType, case_sensitivity: &'a [bool]) -> Self {
        Self {
            items,
            database_type,
            case_sensitivity,
        }
    }

    /// First non-equal item comparison, or equal.
    pub fn compare(&self, left: &[Value], right: &[Value]) -> ShardResult<Ordering> {
        for item in self.items {
            let position = item.index.checked_sub(1).ok_or_else(|| {
                ShardError::QueryResultError(format!("Unresolved column index for '{}'", item.label))
            })?;
            let (Some(a), Some(b)) = (left.get(position), right.get(position)) else {
                return Err(ShardError::QueryResultError(format!(
                    "Column index {} out of range",
                    item.index
                )));
            };
            let case_sensitive = self.case_sensitivity.get(position).copied().unwrap_or(true);
            let ordering = compare_to(
                a,
                b,
                item.direction,
                item.nulls_order(self.database_type),
                case_sensitive,
            )?;
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }
}
