use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::Value;

/// Where NULL sorts relative to non-null values, independent of direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsOrder {
    /// NULL compares lower than every value (MySQL, SQL Server)
    Low,
    /// NULL compares higher than every value (PostgreSQL, Oracle)
    High,
}

/// Compare two values with NULL placed according to `nulls`.
///
/// The result is the ascending order; callers reverse it for DESC.
pub fn compare_values(a: &Value, b: &Value, nulls: NullsOrder) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => match nulls {
            NullsOrder::Low => Ordering::Less,
            NullsOrder::High => Ordering::Greater,
        },
        (false, true) => match nulls {
            NullsOrder::Low => Ordering::Greater,
            NullsOrder::High => Ordering::Less,
        },
        (false, false) => compare_non_null(a, b),
    }
}

pub fn compare_non_null(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x.total_cmp(y),
        (Value::Int64(x), Value::Float64(y)) => cmp_int_float(*x, *y),
        (Value::Float64(x), Value::Int64(y)) => cmp_int_float(*y, *x).reverse(),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Binary(x), Value::Binary(y)) => x.cmp(y),
        // Mixed kinds: numbers stored as text compare numerically when both parse
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx.total_cmp(&fy),
            _ => x.to_string_value().cmp(&y.to_string_value()),
        },
    }
}

/// Exact int/float ordering, without rounding the int through f64
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if float.is_nan() {
        return (int as f64).total_cmp(&float);
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    int.cmp(&(float.trunc() as i64)).then_with(|| {
        let fract = float.fract();
        if fract > 0.0 {
            Ordering::Less
        } else if fract < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nulls_low_and_high() {
        let n = Value::Null;
        let one = Value::Int64(1);
        assert_eq!(compare_values(&n, &one, NullsOrder::Low), Ordering::Less);
        assert_eq!(compare_values(&n, &one, NullsOrder::High), Ordering::Greater);
        assert_eq!(compare_values(&one, &n, NullsOrder::High), Ordering::Less);
        assert_eq!(compare_values(&n, &n, NullsOrder::Low), Ordering::Equal);
    }

    #[test]
    fn test_mixed_numeric() {
        assert_eq!(compare_non_null(&Value::Int64(2), &Value::Float64(2.5)), Ordering::Less);
        assert_eq!(compare_non_null(&Value::Int64(-2), &Value::Float64(-2.5)), Ordering::Greater);
        let base = 1i64 << 53;
        assert_eq!(compare_non_null(&Value::Int64(base + 1), &Value::Float64(base as f64)), Ordering::Greater);
        assert_eq!(compare_non_null(&Value::Float64(base as f64), &Value::Int64(base)), Ordering::Equal);
        assert_eq!(compare_non_null(&Value::from("10"), &Value::Int64(9)), Ordering::Greater);
    }
}
