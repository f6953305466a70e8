//! Aggregate functions over projected values.
//!
//! Null values are filtered out by the caller before aggregation, matching
//! SQL semantics: COUNT counts present values, AVG of nothing is null.

use crate::ast::AggFunc;
use rserv_core::error::{Error, Result};
use rserv_core::value::json_cmp;
use serde_json::Value;

/// Apply an aggregate function to the non-null values of one group.
pub fn aggregate(func: AggFunc, values: Vec<Value>) -> Result<Value> {
    match func {
        AggFunc::Count => Ok(Value::from(values.len())),
        AggFunc::Sum => sum(&values),
        AggFunc::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let total = numeric_sum(&values)?;
            Ok(Value::from(total / values.len() as f64))
        }
        AggFunc::Min => Ok(values
            .into_iter()
            .min_by(json_cmp_ref)
            .unwrap_or(Value::Null)),
        AggFunc::Max => Ok(values
            .into_iter()
            .max_by(json_cmp_ref)
            .unwrap_or(Value::Null)),
        AggFunc::Distinct => {
            let mut seen = Vec::new();
            for value in values {
                if !seen.contains(&value) {
                    seen.push(value);
                }
            }
            Ok(Value::Array(seen))
        }
    }
}

fn json_cmp_ref(a: &Value, b: &Value) -> std::cmp::Ordering {
    json_cmp(a, b)
}

/// Integer-preserving sum: stays an integer while every input is one.
fn sum(values: &[Value]) -> Result<Value> {
    if values.iter().all(|v| v.as_i64().is_some()) {
        let mut total = 0i64;
        for v in values {
            total = total.checked_add(v.as_i64().unwrap_or(0)).ok_or_else(|| {
                Error::QueryRuntime("integer overflow in SUM".to_string())
            })?;
        }
        return Ok(Value::from(total));
    }
    Ok(Value::from(numeric_sum(values)?))
}

fn numeric_sum(values: &[Value]) -> Result<f64> {
    let mut total = 0f64;
    for value in values {
        let n = value.as_f64().ok_or_else(|| {
            Error::QueryRuntime(format!("aggregation requires numeric values, got {value}"))
        })?;
        total += n;
    }
    Ok(total)
}
