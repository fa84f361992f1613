use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::storage::{Fields, Record};

use super::window::WindowPolicy;

pub const IDENTITY_FIELD: &str = "userId";
pub const REMAINING_FIELD: &str = "remaining";
pub const LAST_RESET_FIELD: &str = "lastReset";
pub const NEXT_RESET_FIELD: &str = "nextReset";
pub const CAPACITY_FIELD: &str = "totalLimit";
pub const TOTAL_CONSUMED_FIELD: &str = "totalAdded";

/// Typed view of one identity's quota row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRecord {
    pub identity: String,
    pub remaining: u32,
    pub window_capacity: u32,
    pub last_reset: DateTime<Utc>,
    pub next_reset: DateTime<Utc>,
    pub total_consumed: u64,
}

impl QuotaRecord {
    /// Full allowance for an identity opening its first window at `now`.
    pub fn opened(identity: &str, policy: &WindowPolicy, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.to_string(),
            remaining: policy.default_limit,
            window_capacity: policy.default_limit,
            last_reset: now,
            next_reset: now + policy.window,
            total_consumed: 0,
        }
    }

    /// Parses a stored row, substituting defaults for missing or unreadable
    /// fields. Returns the names of the fields that were defaulted.
    pub fn from_record(
        record: &Record,
        policy: &WindowPolicy,
        now: DateTime<Utc>,
    ) -> (Self, Vec<&'static str>) {
        let mut defaulted = Vec::new();
        let mut pick = |name: &'static str, parsed: Option<u64>, fallback: u64| {
            parsed.unwrap_or_else(|| {
                defaulted.push(name);
                fallback
            })
        };

        let remaining = pick(REMAINING_FIELD, count(record, REMAINING_FIELD), 0);
        let total_consumed = pick(TOTAL_CONSUMED_FIELD, count(record, TOTAL_CONSUMED_FIELD), 0);
        let window_capacity = pick(
            CAPACITY_FIELD,
            count(record, CAPACITY_FIELD),
            policy.default_limit as u64,
        );

        // Due-ness is decided from `last_reset`, so a lost one is rebuilt from
        // the stored schedule when that survived.
        let stored_next = timestamp(record, NEXT_RESET_FIELD);
        let last_reset = timestamp(record, LAST_RESET_FIELD).unwrap_or_else(|| {
            defaulted.push(LAST_RESET_FIELD);
            stored_next.map_or(now - policy.window, |next| next - policy.window)
        });
        let next_reset = stored_next.unwrap_or_else(|| {
            defaulted.push(NEXT_RESET_FIELD);
            last_reset + policy.window
        });

        let window_capacity = clamp_u32(window_capacity);
        let parsed = Self {
            identity: record.text(IDENTITY_FIELD).unwrap_or_default(),
            remaining: clamp_u32(remaining).min(window_capacity),
            window_capacity,
            last_reset,
            next_reset,
            total_consumed,
        };
        (parsed, defaulted)
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = self.window_fields();
        fields.insert(IDENTITY_FIELD.into(), json!(self.identity));
        fields.insert(TOTAL_CONSUMED_FIELD.into(), json!(self.total_consumed));
        fields
    }

    /// Columns touched by a rollover.
    pub fn window_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(REMAINING_FIELD.into(), json!(self.remaining));
        fields.insert(LAST_RESET_FIELD.into(), json!(format_timestamp(self.last_reset)));
        fields.insert(NEXT_RESET_FIELD.into(), json!(format_timestamp(self.next_reset)));
        fields.insert(CAPACITY_FIELD.into(), json!(self.window_capacity));
        fields
    }

    /// Columns touched by a consumption.
    pub fn usage_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(REMAINING_FIELD.into(), json!(self.remaining));
        fields.insert(TOTAL_CONSUMED_FIELD.into(), json!(self.total_consumed));
        fields
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn count(record: &Record, name: &str) -> Option<u64> {
    match record.fields.get(name)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|v| v.max(0) as u64))
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v.max(0.0) as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| v.max(0.0) as u64)
            })
        }
        _ => None,
    }
}

fn timestamp(record: &Record, name: &str) -> Option<DateTime<Utc>> {
    let raw = record.text(name)?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::window::RolloverAnchor;
    use chrono::{Duration, TimeZone};

    fn policy() -> WindowPolicy {
        WindowPolicy::new(4, Duration::days(7), RolloverAnchor::Schedule)
    }

    fn record(value: Value) -> Record {
        Record {
            id: "row-1".into(),
            fields: value.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn parses_sheet_strings() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let row = record(json!({
            "userId": "1618",
            "remaining": "2",
            "totalLimit": "4",
            "totalAdded": "9",
            "lastReset": "2024-04-28T10:00:00.000Z",
            "nextReset": "2024-05-05T10:00:00.000Z",
        }));

        let (parsed, defaulted) = QuotaRecord::from_record(&row, &policy(), now);

        assert!(defaulted.is_empty());
        assert_eq!(parsed.identity, "1618");
        assert_eq!(parsed.remaining, 2);
        assert_eq!(parsed.window_capacity, 4);
        assert_eq!(parsed.total_consumed, 9);
        assert_eq!(
            parsed.next_reset,
            Utc.with_ymd_and_hms(2024, 5, 5, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_fields_fall_back_to_safe_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let row = record(json!({ "userId": "7", "remaining": "" }));

        let (parsed, defaulted) = QuotaRecord::from_record(&row, &policy(), now);

        assert_eq!(parsed.remaining, 0);
        assert_eq!(parsed.total_consumed, 0);
        assert_eq!(parsed.window_capacity, 4);
        assert_eq!(parsed.last_reset, now - Duration::days(7));
        assert_eq!(parsed.next_reset, now);
        assert!(defaulted.contains(&TOTAL_CONSUMED_FIELD));
        assert!(defaulted.contains(&LAST_RESET_FIELD));
    }

    #[test]
    fn missing_last_reset_is_rebuilt_from_next_reset() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let row = record(json!({
            "remaining": 1,
            "nextReset": "2024-05-05T10:00:00.000Z",
        }));

        let (parsed, defaulted) = QuotaRecord::from_record(&row, &policy(), now);

        assert_eq!(
            parsed.last_reset,
            Utc.with_ymd_and_hms(2024, 4, 28, 10, 0, 0).unwrap()
        );
        assert!(defaulted.contains(&LAST_RESET_FIELD));
        assert!(!defaulted.contains(&NEXT_RESET_FIELD));
    }

    #[test]
    fn remaining_never_exceeds_capacity() {
        let now = Utc::now();
        let row = record(json!({ "remaining": 9, "totalLimit": 4, "totalAdded": -3 }));

        let (parsed, _) = QuotaRecord::from_record(&row, &policy(), now);

        assert_eq!(parsed.remaining, 4);
        assert_eq!(parsed.total_consumed, 0);
    }
}
