//! Interval sharding - one target per fixed date-time interval
//!
//! Properties:
//! - `datetime-pattern`: how values are written (default `%Y-%m-%d %H:%M:%S`)
//! - `datetime-lower` / `datetime-upper`: covered span (upper defaults to now)
//! - `sharding-suffix-pattern`: suffix format of targets, e.g. `%Y%m`
//! - `datetime-interval-amount` / `datetime-interval-unit`: step
//!   (`HOURS`, `DAYS`, `MONTHS`, `YEARS`)
//!
//! Targets are matched by suffix: `t_order_202401` holds the interval whose
//! start formats to `202401`.

use std::ops::Bound;
use std::sync::Arc;

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};

use super::{PreciseShardingValue, RangeShardingAlgorithm, RangeShardingValue, ShardingAlgorithm};
use crate::config::{i64_or, required_prop, Props};
use crate::data::Value;
use crate::{Result, ShardError};

const DEFAULT_DATETIME_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

/// Guards against pathological configurations generating endless intervals
const MAX_INTERVALS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Hours,
    Days,
    Months,
    Years,
}

impl IntervalUnit {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HOURS" => Ok(IntervalUnit::Hours),
            "DAYS" => Ok(IntervalUnit::Days),
            "MONTHS" => Ok(IntervalUnit::Months),
            "YEARS" => Ok(IntervalUnit::Years),
            other => Err(ShardError::Configuration(format!("unsupported interval unit '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntervalShardingAlgorithm {
    datetime_pattern: String,
    lower: NaiveDateTime,
    upper: NaiveDateTime,
    suffix_pattern: String,
    amount: u32,
    unit: IntervalUnit,
}

impl IntervalShardingAlgorithm {
    pub(crate) fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>> {
        let datetime_pattern = props
            .get("datetime-pattern")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_DATETIME_PATTERN.to_string());
        let lower = parse_datetime(required_prop(props, "datetime-lower")?, &datetime_pattern)
            .ok_or_else(|| ShardError::Configuration("unparseable datetime-lower".into()))?;
        let upper = match props.get("datetime-upper") {
            Some(raw) => parse_datetime(raw.trim(), &datetime_pattern)
                .ok_or_else(|| ShardError::Configuration("unparseable datetime-upper".into()))?,
            None => chrono::Local::now().naive_local(),
        };
        let amount = i64_or(props, "datetime-interval-amount", 1)?;
        if amount <= 0 || amount > u32::MAX as i64 {
            return Err(ShardError::Configuration(format!(
                "datetime-interval-amount must be positive, got {}",
                amount
            )));
        }
        let unit = match props.get("datetime-interval-unit") {
            Some(raw) => IntervalUnit::parse(raw)?,
            None => IntervalUnit::Days,
        };
        let suffix_pattern = required_prop(props, "sharding-suffix-pattern")?.to_string();
        Ok(Arc::new(Self {
            datetime_pattern,
            lower,
            upper,
            suffix_pattern,
            amount: amount as u32,
            unit,
        }))
    }

    fn step(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.unit {
            IntervalUnit::Hours => from.checked_add_signed(Duration::hours(self.amount as i64)),
            IntervalUnit::Days => from.checked_add_signed(Duration::days(self.amount as i64)),
            IntervalUnit::Months => from.checked_add_months(Months::new(self.amount)),
            IntervalUnit::Years => from.checked_add_months(Months::new(self.amount.saturating_mul(12))),
        }
    }

    fn value_datetime(&self, value: &Value) -> Result<NaiveDateTime> {
        let raw = value.to_string_value();
        parse_datetime(&raw, &self.datetime_pattern).ok_or_else(|| {
            ShardError::Configuration(format!(
                "value '{}' does not match datetime pattern '{}'",
                raw, self.datetime_pattern
            ))
        })
    }

    fn matched_target(&self, targets: &[String], at: NaiveDateTime) -> Option<String> {
        let suffix = at.format(&self.suffix_pattern).to_string();
        targets.iter().find(|t| t.ends_with(&suffix)).cloned()
    }

    /// Start of the interval `[start, step(start))` holding `at`
    fn interval_start(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut start = self.lower;
        let mut steps = 0;
        while start <= self.upper && steps < MAX_INTERVALS {
            let end = self.step(start)?;
            if at >= start && at < end {
                return Some(start);
            }
            start = end;
            steps += 1;
        }
        None
    }

    fn bound_datetime(&self, bound: &Bound<Value>) -> Result<Bound<NaiveDateTime>> {
        Ok(match bound {
            Bound::Included(v) => Bound::Included(self.value_datetime(v)?),
            Bound::Excluded(v) => Bound::Excluded(self.value_datetime(v)?),
            Bound::Unbounded => Bound::Unbounded,
        })
    }
}

impl ShardingAlgorithm for IntervalShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "INTERVAL"
    }

    fn do_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>> {
        let at = self.value_datetime(&value.value)?;
        if at < self.lower || at > self.upper {
            return Ok(None);
        }
        Ok(self.interval_start(at).and_then(|start| self.matched_target(targets, start)))
    }

    fn as_range(&self) -> Option<&dyn RangeShardingAlgorithm> {
        Some(self)
    }
}

impl RangeShardingAlgorithm for IntervalShardingAlgorithm {
    fn do_range(&self, targets: &[String], value: &RangeShardingValue) -> Result<Vec<String>> {
        let lower = self.bound_datetime(&value.range.lower)?;
        let upper = self.bound_datetime(&value.range.upper)?;
        let mut result: Vec<String> = Vec::new();
        let mut start = self.lower;
        let mut steps = 0;
        while start <= self.upper && steps < MAX_INTERVALS {
            let end = match self.step(start) {
                Some(end) => end,
                None => break,
            };
            if interval_intersects(start, end, &lower, &upper) {
                if let Some(target) = self.matched_target(targets, start) {
                    if !result.contains(&target) {
                        result.push(target);
                    }
                }
            }
            start = end;
            steps += 1;
        }
        // Keep the caller's target order
        Ok(targets.iter().filter(|t| result.contains(t)).cloned().collect())
    }
}

/// Whether `[start, end)` intersects the condition bounds
fn interval_intersects(
    start: NaiveDateTime,
    end: NaiveDateTime,
    lower: &Bound<NaiveDateTime>,
    upper: &Bound<NaiveDateTime>,
) -> bool {
    let below_upper = match upper {
        Bound::Included(u) => start <= *u,
        Bound::Excluded(u) => start < *u,
        Bound::Unbounded => true,
    };
    let above_lower = match lower {
        Bound::Included(l) | Bound::Excluded(l) => end > *l,
        Bound::Unbounded => true,
    };
    below_upper && above_lower
}

fn parse_datetime(raw: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, pattern)
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, pattern).ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::ValueRange;

    fn monthly() -> Arc<dyn ShardingAlgorithm> {
        let mut props = Props::new();
        props.insert("datetime-pattern".into(), "%Y-%m-%d".into());
        props.insert("datetime-lower".into(), "2024-01-01".into());
        props.insert("datetime-upper".into(), "2024-06-30".into());
        props.insert("sharding-suffix-pattern".into(), "%Y%m".into());
        props.insert("datetime-interval-unit".into(), "MONTHS".into());
        IntervalShardingAlgorithm::create(&props).unwrap()
    }

    fn targets() -> Vec<String> {
        (1..=6).map(|m| format!("t_order_2024{:02}", m)).collect()
    }

    fn precise(v: &str) -> PreciseShardingValue {
        PreciseShardingValue {
            logic_table: "t_order".into(),
            column: "created".into(),
            value: Value::from(v),
        }
    }

    #[test]
    fn test_interval_precise() {
        let alg = monthly();
        assert_eq!(alg.do_precise(&targets(), &precise("2024-03-15")).unwrap(), Some("t_order_202403".into()));
        assert_eq!(alg.do_precise(&targets(), &precise("2023-12-31")).unwrap(), None);
        assert!(alg.do_precise(&targets(), &precise("15/03/2024")).is_err());
    }

    #[test]
    fn test_interval_range() {
        let alg = monthly();
        let value = RangeShardingValue {
            logic_table: "t_order".into(),
            column: "created".into(),
            range: ValueRange::new(
                Bound::Included(Value::from("2024-02-10")),
                Bound::Excluded(Value::from("2024-04-01")),
            ),
        };
        let routed = alg.as_range().unwrap().do_range(&targets(), &value).unwrap();
        assert_eq!(routed, vec!["t_order_202402", "t_order_202403"]);
    }

    #[test]
    fn test_interval_unbounded_range() {
        let alg = monthly();
        let value = RangeShardingValue {
            logic_table: "t_order".into(),
            column: "created".into(),
            range: ValueRange::new(Bound::Included(Value::from("2024-05-20")), Bound::Unbounded),
        };
        let routed = alg.as_range().unwrap().do_range(&targets(), &value).unwrap();
        assert_eq!(routed, vec!["t_order_202405", "t_order_202406"]);
    }

    fn quarterly() -> Arc<dyn ShardingAlgorithm> {
        let mut props = Props::new();
        props.insert("datetime-pattern".into(), "%Y-%m-%d".into());
        props.insert("datetime-lower".into(), "2024-01-01".into());
        props.insert("datetime-upper".into(), "2024-12-31".into());
        props.insert("sharding-suffix-pattern".into(), "%Y%m".into());
        props.insert("datetime-interval-unit".into(), "MONTHS".into());
        props.insert("datetime-interval-amount".into(), "3".into());
        IntervalShardingAlgorithm::create(&props).unwrap()
    }

    fn range(lower: Bound<Value>, upper: Bound<Value>) -> RangeShardingValue {
        RangeShardingValue {
            logic_table: "t_order".into(),
            column: "created".into(),
            range: ValueRange::new(lower, upper),
        }
    }

    #[test]
    fn test_interval_precise_uses_interval_start() {
        let alg = quarterly();
        let targets: Vec<String> = ["01", "04", "07", "10"].iter().map(|m| format!("t_order_2024{}", m)).collect();
        assert_eq!(alg.do_precise(&targets, &precise("2024-02-15")).unwrap(), Some("t_order_202401".into()));
        assert_eq!(alg.do_precise(&targets, &precise("2024-04-01")).unwrap(), Some("t_order_202404".into()));
        assert_eq!(alg.do_precise(&targets, &precise("2024-12-31")).unwrap(), Some("t_order_202410".into()));

        // a point range lands on the same target as the precise value
        for day in ["2024-02-15", "2024-06-30", "2024-08-01"] {
            let precise = alg.do_precise(&targets, &precise(day)).unwrap();
            let point = range(Bound::Included(Value::from(day)), Bound::Included(Value::from(day)));
            let routed = alg.as_range().unwrap().do_range(&targets, &point).unwrap();
            assert_eq!(routed, precise.into_iter().collect::<Vec<_>>(), "{}", day);
        }
    }

    #[test]
    fn test_interval_quarterly_range() {
        let alg = quarterly();
        let targets: Vec<String> = ["01", "04", "07", "10"].iter().map(|m| format!("t_order_2024{}", m)).collect();
        let value = range(
            Bound::Included(Value::from("2024-03-20")),
            Bound::Excluded(Value::from("2024-07-01")),
        );
        let routed = alg.as_range().unwrap().do_range(&targets, &value).unwrap();
        assert_eq!(routed, vec!["t_order_202401", "t_order_202404"]);
    }

    #[test]
    fn test_interval_hours_with_amount() {
        let mut props = Props::new();
        props.insert("datetime-lower".into(), "2024-01-01 00:00:00".into());
        props.insert("datetime-upper".into(), "2024-01-01 23:59:59".into());
        props.insert("sharding-suffix-pattern".into(), "%H".into());
        props.insert("datetime-interval-unit".into(), "HOURS".into());
        props.insert("datetime-interval-amount".into(), "6".into());
        let alg = IntervalShardingAlgorithm::create(&props).unwrap();
        let targets: Vec<String> = ["00", "06", "12", "18"].iter().map(|h| format!("t_log_{}", h)).collect();
        let value = |v: &str| PreciseShardingValue {
            logic_table: "t_log".into(),
            column: "created".into(),
            value: Value::from(v),
        };
        assert_eq!(alg.do_precise(&targets, &value("2024-01-01 05:59:59")).unwrap(), Some("t_log_00".into()));
        assert_eq!(alg.do_precise(&targets, &value("2024-01-01 13:30:00")).unwrap(), Some("t_log_12".into()));
    }

    #[test]
    fn test_interval_years_with_amount() {
        let mut props = Props::new();
        props.insert("datetime-pattern".into(), "%Y-%m-%d".into());
        props.insert("datetime-lower".into(), "2020-01-01".into());
        props.insert("datetime-upper".into(), "2025-12-31".into());
        props.insert("sharding-suffix-pattern".into(), "%Y".into());
        props.insert("datetime-interval-unit".into(), "YEARS".into());
        props.insert("datetime-interval-amount".into(), "2".into());
        let alg = IntervalShardingAlgorithm::create(&props).unwrap();
        let targets: Vec<String> = ["2020", "2022", "2024"].iter().map(|y| format!("t_order_{}", y)).collect();
        assert_eq!(alg.do_precise(&targets, &precise("2021-07-04")).unwrap(), Some("t_order_2020".into()));
        assert_eq!(alg.do_precise(&targets, &precise("2024-01-01")).unwrap(), Some("t_order_2024".into()));
        let value = range(
            Bound::Included(Value::from("2021-06-01")),
            Bound::Included(Value::from("2022-02-01")),
        );
        let routed = alg.as_range().unwrap().do_range(&targets, &value).unwrap();
        assert_eq!(routed, vec!["t_order_2020", "t_order_2022"]);
    }

    #[test]
    fn test_interval_unit_parse() {
        assert_eq!(IntervalUnit::parse("years").unwrap(), IntervalUnit::Years);
        assert!(IntervalUnit::parse("weeks").is_err());
    }
}
