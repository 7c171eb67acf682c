//! Aggregate functions for `compute`.

use crate::ast::AggregateFunc;
use tabula_core::{Error, Result, Value};

/// Folds non-null values with an aggregate.
///
/// Returns Null when there is nothing to aggregate (Count returns 0). `Var`
/// and `StDev` are sample statistics and need at least two values.
pub fn aggregate<'a>(func: AggregateFunc, values: impl Iterator<Item = &'a Value>) -> Result<Value> {
    let values: Vec<&Value> = values.filter(|v| !v.is_null()).collect();
    match func {
        AggregateFunc::Count => Ok(Value::Int32(values.len() as i32)),
        AggregateFunc::Min => Ok(values.iter().min().map(|v| (*v).clone()).unwrap_or(Value::Null)),
        AggregateFunc::Max => Ok(values.iter().max().map(|v| (*v).clone()).unwrap_or(Value::Null)),
        AggregateFunc::Sum => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            if values.iter().all(|v| v.to_i64().is_some()) {
                let mut total: i64 = 0;
                for v in &values {
                    total = total
                        .checked_add(v.to_i64().unwrap_or_default())
                        .ok_or_else(|| Error::expression("integer overflow in Sum", 0))?;
                }
                return Ok(Value::Int64(total));
            }
            Ok(Value::Float64(numbers(&values, "Sum")?.iter().sum()))
        }
        AggregateFunc::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let nums = numbers(&values, "Avg")?;
            Ok(Value::Float64(nums.iter().sum::<f64>() / nums.len() as f64))
        }
        AggregateFunc::Var | AggregateFunc::StDev => {
            if values.len() < 2 {
                return Ok(Value::Null);
            }
            let nums = numbers(&values, "Var")?;
            let n = nums.len() as f64;
            let mean = nums.iter().sum::<f64>() / n;
            let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Ok(Value::Float64(if func == AggregateFunc::StDev {
                var.sqrt()
            } else {
                var
            }))
        }
    }
}

fn numbers(values: &[&Value], name: &str) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.to_f64()
                .ok_or_else(|| Error::expression(format!("{} requires numeric values, got '{}'", name, v), 0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(xs: &[i32]) -> Vec<Value> {
        xs.iter().map(|x| Value::Int32(*x)).collect()
    }

    #[test]
    fn test_sum_and_count_skip_nulls() {
        let mut vals = ints(&[1, 2, 3]);
        vals.push(Value::Null);
        assert_eq!(aggregate(AggregateFunc::Sum, vals.iter()).unwrap(), Value::Int64(6));
        assert_eq!(aggregate(AggregateFunc::Count, vals.iter()).unwrap(), Value::Int32(3));
    }

    #[test]
    fn test_empty_inputs() {
        let vals: Vec<Value> = vec![Value::Null];
        assert_eq!(aggregate(AggregateFunc::Sum, vals.iter()).unwrap(), Value::Null);
        assert_eq!(aggregate(AggregateFunc::Max, vals.iter()).unwrap(), Value::Null);
        assert_eq!(aggregate(AggregateFunc::Count, vals.iter()).unwrap(), Value::Int32(0));
    }

    #[test]
    fn test_avg_min_max() {
        let vals = ints(&[2, 4, 9]);
        assert_eq!(aggregate(AggregateFunc::Avg, vals.iter()).unwrap(), Value::Float64(5.0));
        assert_eq!(aggregate(AggregateFunc::Min, vals.iter()).unwrap(), Value::Int32(2));
        assert_eq!(aggregate(AggregateFunc::Max, vals.iter()).unwrap(), Value::Int32(9));
    }

    #[test]
    fn test_var_stdev() {
        let vals = ints(&[2, 4, 4, 4, 5, 5, 7, 9]);
        let var = aggregate(AggregateFunc::Var, vals.iter()).unwrap().to_f64().unwrap();
        assert!((var - 4.571428).abs() < 1e-5);
        let sd = aggregate(AggregateFunc::StDev, vals.iter()).unwrap().to_f64().unwrap();
        assert!((sd - var.sqrt()).abs() < 1e-12);
        assert_eq!(aggregate(AggregateFunc::Var, ints(&[1]).iter()).unwrap(), Value::Null);
    }

    #[test]
    fn test_sum_rejects_strings() {
        let vals = vec![Value::from("a")];
        assert!(aggregate(AggregateFunc::Sum, vals.iter()).is_err());
        assert_eq!(aggregate(AggregateFunc::Max, vals.iter()).unwrap(), Value::from("a"));
    }
}
