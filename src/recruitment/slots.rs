use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
use serde::Serialize;
use utoipa::ToSchema;

use crate::integrations::google::BusyInterval;

pub const DAY_START_HOUR: u32 = 9;
pub const DAY_END_HOUR: u32 = 17;
pub const MAX_SLOTS_PER_DAY: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local business time, e.g. "2025-03-04 at 09:00"
    pub formatted: String,
}

fn at(offset: &FixedOffset, date: chrono::NaiveDate, hour: u32) -> Option<DateTime<FixedOffset>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    offset.from_local_datetime(&date.and_time(time)).single()
}

/// Interview slots between tomorrow and `now + days`, in business hours at
/// `offset`. Weekdays only, on the hour, ending before 17:00, at most three a day
/// and never overlapping `busy`.
pub fn available_slots(
    now: DateTime<Utc>,
    days: i64,
    duration_minutes: i64,
    busy: &[BusyInterval],
    offset: FixedOffset,
) -> Vec<Slot> {
    let window_end = now + Duration::days(days);
    let duration = Duration::minutes(duration_minutes.max(1));
    let mut slots = Vec::new();

    let mut date = now.with_timezone(&offset).date_naive() + Duration::days(1);
    while let Some(day_start) = at(&offset, date, DAY_START_HOUR) {
        if day_start >= window_end {
            break;
        }
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            let Some(day_end) = at(&offset, date, DAY_END_HOUR) else { break };
            let mut taken = 0;
            for hour in DAY_START_HOUR..DAY_END_HOUR {
                if taken >= MAX_SLOTS_PER_DAY {
                    break;
                }
                let Some(start) = at(&offset, date, hour) else { continue };
                let end = start + duration;
                if end >= day_end {
                    continue;
                }
                let overlaps = busy
                    .iter()
                    .any(|b| start.with_timezone(&Utc) < b.end && end.with_timezone(&Utc) > b.start);
                if overlaps {
                    continue;
                }
                slots.push(Slot {
                    start: start.with_timezone(&Utc),
                    end: end.with_timezone(&Utc),
                    formatted: start.format("%Y-%m-%d at %H:%M").to_string(),
                });
                taken += 1;
            }
        }
        date += Duration::days(1);
    }

    slots
}
