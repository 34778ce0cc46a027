use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::BookingError;

/// One working window within a day, wall-clock `HH:MM`. A single window per
/// day is modeled; split shifts are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: String,
    pub end: String,
}

/// A provider's recurring weekly hours. `None` means not working that day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub monday: Option<DayWindow>,
    pub tuesday: Option<DayWindow>,
    pub wednesday: Option<DayWindow>,
    pub thursday: Option<DayWindow>,
    pub friday: Option<DayWindow>,
    pub saturday: Option<DayWindow>,
    pub sunday: Option<DayWindow>,
}

impl WeeklyAvailability {
    pub fn from_json(s: &str) -> Result<Self, BookingError> {
        let availability: WeeklyAvailability = serde_json::from_str(s)
            .map_err(|e| BookingError::Validation(format!("bad availability JSON: {e}")))?;
        availability.validate()?;
        Ok(availability)
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        for window in self.days().into_iter().flatten() {
            let start = parse_hhmm(&window.start)?;
            let end = parse_hhmm(&window.end)?;
            if start > end {
                return Err(BookingError::Validation(format!(
                    "window start {} is after end {}",
                    window.start, window.end
                )));
            }
        }
        Ok(())
    }

    pub fn window_for(&self, weekday: Weekday) -> Option<&DayWindow> {
        match weekday {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }

    /// Slot starts for `date`, stepped by `granularity_minutes`, each leaving
    /// room for a full granularity-sized slot before the window closes.
    /// A day off (or a zero-width window) yields an empty list.
    pub fn slots_for_day(
        &self,
        date: NaiveDate,
        granularity_minutes: u32,
    ) -> Result<Vec<NaiveDateTime>, BookingError> {
        if granularity_minutes == 0 {
            return Err(BookingError::Validation(
                "slot granularity must be positive".to_string(),
            ));
        }

        let Some(window) = self.window_for(date.weekday()) else {
            return Ok(vec![]);
        };

        let start = minutes_of_day(&window.start)?;
        let end = minutes_of_day(&window.end)?;

        let mut slots = vec![];
        let mut t = start;
        while t + granularity_minutes <= end {
            let time = NaiveTime::from_hms_opt(t / 60, t % 60, 0)
                .ok_or_else(|| BookingError::Validation(format!("bad slot time {t}")))?;
            slots.push(date.and_time(time));
            t += granularity_minutes;
        }
        Ok(slots)
    }

    /// Whether the whole interval `[start, end)` sits inside the window for
    /// that weekday. Intervals crossing midnight never fit.
    pub fn is_within(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        if end <= start || end.date() != start.date() {
            return false;
        }
        let Some(window) = self.window_for(start.date().weekday()) else {
            return false;
        };
        let (Ok(w_start), Ok(w_end)) =
            (minutes_of_day(&window.start), minutes_of_day(&window.end))
        else {
            return false;
        };
        let s = start.time().hour() * 60 + start.time().minute();
        let e = end.time().hour() * 60 + end.time().minute();
        w_start <= s && e <= w_end
    }

    pub fn to_human_readable(&self) -> String {
        const NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        let lines: Vec<String> = self
            .days()
            .iter()
            .zip(NAMES)
            .filter_map(|(window, name)| {
                window
                    .as_ref()
                    .map(|w| format!("{name}: {}-{}", w.start, w.end))
            })
            .collect();
        if lines.is_empty() {
            "closed all week".to_string()
        } else {
            lines.join(", ")
        }
    }

    fn days(&self) -> [Option<&DayWindow>; 7] {
        [
            self.monday.as_ref(),
            self.tuesday.as_ref(),
            self.wednesday.as_ref(),
            self.thursday.as_ref(),
            self.friday.as_ref(),
            self.saturday.as_ref(),
            self.sunday.as_ref(),
        ]
    }
}

pub fn parse_hhmm(s: &str) -> Result<NaiveTime, BookingError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| BookingError::Validation(format!("invalid time format: {s}")))?;
    let hour: u32 = h
        .parse()
        .map_err(|_| BookingError::Validation(format!("invalid hour in: {s}")))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| BookingError::Validation(format!("invalid minute in: {s}")))?;
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| BookingError::Validation(format!("time out of range: {s}")))
}

fn minutes_of_day(s: &str) -> Result<u32, BookingError> {
    let t = parse_hhmm(s)?;
    Ok(t.hour() * 60 + t.minute())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekdays_nine_to_five() -> WeeklyAvailability {
        let json = r#"{
            "monday": {"start": "09:00", "end": "17:00"},
            "tuesday": {"start": "09:00", "end": "17:00"},
            "wednesday": {"start": "09:00", "end": "17:00"},
            "thursday": {"start": "09:00", "end": "17:00"},
            "friday": {"start": "09:00", "end": "17:00"},
            "saturday": null,
            "sunday": null
        }"#;
        WeeklyAvailability::from_json(json).unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_valid_json() {
        let avail = weekdays_nine_to_five();
        assert_eq!(avail.monday.as_ref().unwrap().start, "09:00");
        assert!(avail.sunday.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_time() {
        let json = r#"{"monday": {"start": "nine", "end": "17:00"}}"#;
        assert!(matches!(
            WeeklyAvailability::from_json(json),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_rejects_out_of_range_time() {
        let json = r#"{"monday": {"start": "25:00", "end": "17:00"}}"#;
        assert!(WeeklyAvailability::from_json(json).is_err());
    }

    #[test]
    fn test_parse_rejects_inverted_window() {
        let json = r#"{"monday": {"start": "17:00", "end": "09:00"}}"#;
        assert!(WeeklyAvailability::from_json(json).is_err());
    }

    #[test]
    fn test_slots_monday_nine_to_five() {
        let avail = weekdays_nine_to_five();
        // 2025-06-16 is a Monday: 16 half-hour slots, 09:00 through 16:30
        let slots = avail.slots_for_day(date("2025-06-16"), 30).unwrap();
        assert_eq!(slots.len(), 16);
        assert_eq!(slots[0], dt("2025-06-16 09:00"));
        assert_eq!(slots[15], dt("2025-06-16 16:30"));
    }

    #[test]
    fn test_slots_evenly_spaced_and_contained() {
        let avail = weekdays_nine_to_five();
        let slots = avail.slots_for_day(date("2025-06-17"), 45).unwrap();
        let start = dt("2025-06-17 09:00");
        let end = dt("2025-06-17 17:00");
        assert_eq!(slots.len(), (8 * 60) / 45);
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(*slot, start + chrono::Duration::minutes(45 * i as i64));
            assert!(*slot + chrono::Duration::minutes(45) <= end);
        }
    }

    #[test]
    fn test_slots_day_off_is_empty() {
        let avail = weekdays_nine_to_five();
        // 2025-06-15 is a Sunday
        assert!(avail.slots_for_day(date("2025-06-15"), 30).unwrap().is_empty());
    }

    #[test]
    fn test_slots_zero_width_window_is_empty() {
        let json = r#"{"monday": {"start": "09:00", "end": "09:00"}}"#;
        let avail = WeeklyAvailability::from_json(json).unwrap();
        assert!(avail.slots_for_day(date("2025-06-16"), 30).unwrap().is_empty());
    }

    #[test]
    fn test_is_within_bounds() {
        let avail = weekdays_nine_to_five();
        assert!(avail.is_within(dt("2025-06-16 09:00"), dt("2025-06-16 09:30")));
        assert!(avail.is_within(dt("2025-06-16 16:30"), dt("2025-06-16 17:00")));
        // Spills past closing
        assert!(!avail.is_within(dt("2025-06-16 16:45"), dt("2025-06-16 17:15")));
        // Before opening
        assert!(!avail.is_within(dt("2025-06-16 08:30"), dt("2025-06-16 09:00")));
        // Day off
        assert!(!avail.is_within(dt("2025-06-15 10:00"), dt("2025-06-15 10:30")));
    }

    #[test]
    fn test_is_within_rejects_degenerate_intervals() {
        let avail = weekdays_nine_to_five();
        assert!(!avail.is_within(dt("2025-06-16 10:00"), dt("2025-06-16 10:00")));
        assert!(!avail.is_within(dt("2025-06-16 10:30"), dt("2025-06-16 10:00")));
    }

    #[test]
    fn test_to_human_readable() {
        let json = r#"{
            "monday": {"start": "09:00", "end": "17:00"},
            "friday": {"start": "10:00", "end": "16:00"}
        }"#;
        let avail = WeeklyAvailability::from_json(json).unwrap();
        assert_eq!(avail.to_human_readable(), "Mon: 09:00-17:00, Fri: 10:00-16:00");
    }

    #[test]
    fn test_to_human_readable_closed() {
        let avail = WeeklyAvailability::default();
        assert_eq!(avail.to_human_readable(), "closed all week");
    }
}
