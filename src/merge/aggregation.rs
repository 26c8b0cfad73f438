//! Aggregation accumulators
//!
//! Each target already aggregated its own rows, so merging combines partial
//! results: counts and sums add up, AVG is recomputed from the derived COUNT
//! and SUM columns, MAX/MIN keep the extreme, BIT_XOR folds the partial
//! values and GROUP_CONCAT joins the partial strings.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::compare::compare_values;
use crate::error::{ShardError, ShardResult};
use crate::sql::{AggregationProjection, AggregationType};

const AVG_SCALE: f64 = 10_000.0;
const DEFAULT_SEPARATOR: &str = ",";

/// Partial numeric result.
///
/// Integral inputs add up exactly in the `integral` part; fractional inputs
/// are summed on the side, so integer totals never depend on the order in
/// which rows are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Numeric {
    integral: i128,
    fractional: Option<f64>,
}

impl Numeric {
    fn integral(value: i128) -> Self {
        Self {
            integral: value,
            fractional: None,
        }
    }

    fn fractional(value: f64) -> Self {
        Self {
            integral: 0,
            fractional: Some(value),
        }
    }

    /// Null is skipped; numeric strings are accepted.
    fn from_value(value: &Value) -> ShardResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Some(Numeric::integral(i128::from(i))));
                }
                if let Some(u) = n.as_u64() {
                    return Ok(Some(Numeric::integral(i128::from(u))));
                }
                n.as_f64()
                    .map(|f| Some(Numeric::fractional(f)))
                    .ok_or_else(|| ShardError::NotComparable(n.to_string()))
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i128>() {
                    Ok(Some(Numeric::integral(i)))
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Ok(Some(Numeric::fractional(f)))
                } else {
                    Err(ShardError::NotComparable(format!(
                        "'{}' is not a number",
                        s
                    )))
                }
            }
            other => Err(ShardError::NotComparable(format!(
                "{} is not a number",
                other
            ))),
        }
    }

    fn as_f64(self) -> f64 {
        self.integral as f64 + self.fractional.unwrap_or(0.0)
    }

    fn add(self, other: Numeric) -> ShardResult<Numeric> {
        let integral = self
            .integral
            .checked_add(other.integral)
            .ok_or_else(|| overflow(self.integral))?;
        let fractional = match (self.fractional, other.fractional) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        Ok(Numeric {
            integral,
            fractional,
        })
    }

    fn is_zero(self) -> bool {
        self.integral == 0 && self.fractional.map_or(true, |f| f == 0.0)
    }

    /// Integral totals must fit a signed or unsigned 64-bit column.
    fn to_value(self) -> ShardResult<Value> {
        if self.fractional.is_some() {
            return Ok(Number::from_f64(self.as_f64())
                .map(Value::Number)
                .unwrap_or(Value::Null));
        }
        if let Ok(i) = i64::try_from(self.integral) {
            return Ok(Value::from(i));
        }
        u64::try_from(self.integral)
            .map(Value::from)
            .map_err(|_| overflow(self.integral))
    }
}

fn overflow(total: i128) -> ShardError {
    ShardError::QueryResultError(format!(
        "Aggregated value {} is out of the 64-bit integer range",
        total
    ))
}

fn accumulate(total: Option<Numeric>, value: Numeric) -> ShardResult<Option<Numeric>> {
    Ok(Some(match total {
        Some(total) => total.add(value)?,
        None => value,
    }))
}

/// Accumulator of one aggregation projection within one group.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationUnit {
    Count(Option<Numeric>),
    Sum(Option<Numeric>),
    Avg {
        count: Option<Numeric>,
        sum: Option<Numeric>,
    },
    Max(Option<Value>),
    Min(Option<Value>),
    BitXor(Option<u64>),
    GroupConcat {
        separator: String,
        parts: Vec<String>,
    },
}

impl AggregationUnit {
    pub fn new(projection: &AggregationProjection) -> Self {
        match projection.kind {
            AggregationType::Count => AggregationUnit::Count(None),
            AggregationType::Sum => AggregationUnit::Sum(None),
            AggregationType::Avg => AggregationUnit::Avg {
                count: None,
                sum: None,
            },
            AggregationType::Max => AggregationUnit::Max(None),
            AggregationType::Min => AggregationUnit::Min(None),
            AggregationType::BitXor => AggregationUnit::BitXor(None),
            AggregationType::GroupConcat => AggregationUnit::GroupConcat {
                separator: projection
                    .separator
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
                parts: Vec::new(),
            },
        }
    }

    /// Value of an aggregation over zero rows.
    pub fn empty_result(kind: AggregationType) -> Value {
        match kind {
            AggregationType::Count => Value::from(0),
            _ => Value::Null,
        }
    }

    /// Merge the partial values of one row.
    ///
    /// AVG expects its derived COUNT and SUM values, in that order; every
    /// other kind reads the first value only.
    pub fn merge(&mut self, values: &[Value]) -> ShardResult<()> {
        let first = values.first().cloned().unwrap_or(Value::Null);
        match self {
            AggregationUnit::Count(total) | AggregationUnit::Sum(total) => {
                if let Some(value) = Numeric::from_value(&first)? {
                    *total = accumulate(*total, value)?;
                }
            }
            AggregationUnit::Avg { count, sum } => {
                let (Some(count_value), Some(sum_value)) = (values.first(), values.get(1)) else {
                    return Err(ShardError::QueryResultError(
                        "AVG requires derived COUNT and SUM values".to_string(),
                    ));
                };
                if let (Some(c), Some(s)) = (
                    Numeric::from_value(count_value)?,
                    Numeric::from_value(sum_value)?,
                ) {
                    *count = accumulate(*count, c)?;
                    *sum = accumulate(*sum, s)?;
                }
            }
            AggregationUnit::Max(current) => keep_extreme(current, &first, Ordering::Greater)?,
            AggregationUnit::Min(current) => keep_extreme(current, &first, Ordering::Less)?,
            AggregationUnit::BitXor(current) => {
                if let Some(bits) = to_bits(&first)? {
                    *current = Some(current.map_or(bits, |acc| acc ^ bits));
                }
            }
            AggregationUnit::GroupConcat { parts, .. } => match &first {
                Value::Null => {}
                Value::String(s) => parts.push(s.clone()),
                other => parts.push(other.to_string()),
            },
        }
        Ok(())
    }

    pub fn result(&self) -> ShardResult<Value> {
        Ok(match self {
            AggregationUnit::Count(total) => total.map_or(Ok(Value::from(0)), Numeric::to_value)?,
            AggregationUnit::Sum(total) => total.map_or(Ok(Value::Null), Numeric::to_value)?,
            AggregationUnit::Avg { count, sum } => match (count, sum) {
                (Some(count), Some(sum)) if !count.is_zero() => {
                    let average = sum.as_f64() / count.as_f64();
                    Number::from_f64((average * AVG_SCALE).round() / AVG_SCALE)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                (count, _) => count.map_or(Ok(Value::Null), Numeric::to_value)?,
            },
            AggregationUnit::Max(value) | AggregationUnit::Min(value) => {
                value.clone().unwrap_or(Value::Null)
            }
            AggregationUnit::BitXor(bits) => bits.map_or(Value::Null, Value::from),
            AggregationUnit::GroupConcat { separator, parts } => {
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::String(parts.join(separator))
                }
            }
        })
    }
}

fn keep_extreme(current: &mut Option<Value>, candidate: &Value, wanted: Ordering) -> ShardResult<()> {
    if candidate.is_null() {
        return Ok(());
    }
    let replace = match current {
        Some(existing) => compare_values(candidate, existing)? == wanted,
        None => true,
    };
    if replace {
        *current = Some(candidate.clone());
    }
    Ok(())
}

fn to_bits(value: &Value) -> ShardResult<Option<u64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i as u64))
            .map(Some)
            .ok_or_else(|| ShardError::NotComparable(format!("{} is not an integer", n))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ShardError::NotComparable(format!("'{}' is not an integer", s))),
        other => Err(ShardError::NotComparable(format!(
            "{} is not an integer",
            other
        ))),
    }
}
