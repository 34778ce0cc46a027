use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

/// Booking fields accumulated across turns. Merging never clears a field
/// that an earlier turn already filled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingDraft {
    pub provider_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub service_ids: Vec<i64>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

impl BookingDraft {
    pub fn merge(&mut self, newer: BookingDraft) {
        if newer.provider_id.is_some() {
            self.provider_id = newer.provider_id;
        }
        if newer.date.is_some() {
            self.date = newer.date;
        }
        if newer.time.is_some() {
            self.time = newer.time;
        }
        if !newer.service_ids.is_empty() {
            self.service_ids = newer.service_ids;
        }
        if newer.customer_name.is_some() {
            self.customer_name = newer.customer_name;
        }
        if newer.customer_email.is_some() {
            self.customer_email = newer.customer_email;
        }
        if newer.customer_phone.is_some() {
            self.customer_phone = newer.customer_phone;
        }
    }

    /// Fields still required before a hold can be attempted, in the order
    /// they are asked for.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.provider_id.is_none() {
            missing.push("barber");
        }
        if self.service_ids.is_empty() {
            missing.push("service");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        if self.time.is_none() {
            missing.push("time");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// One chat session's state. Owned by the conversation alone; the pending
/// appointment id is carried here, never smuggled through reply text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    pub draft: Option<BookingDraft>,
    pub pending_appointment_id: Option<String>,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_fills_and_overwrites() {
        let mut draft = BookingDraft {
            provider_id: Some(1),
            date: NaiveDate::from_ymd_opt(2025, 6, 16),
            ..Default::default()
        };
        draft.merge(BookingDraft {
            date: NaiveDate::from_ymd_opt(2025, 6, 17),
            time: NaiveTime::from_hms_opt(14, 0, 0),
            service_ids: vec![10],
            ..Default::default()
        });
        assert_eq!(draft.provider_id, Some(1));
        assert_eq!(draft.date, NaiveDate::from_ymd_opt(2025, 6, 17));
        assert_eq!(draft.time, NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(draft.service_ids, vec![10]);
    }

    #[test]
    fn test_merge_never_nulls_out() {
        let mut draft = BookingDraft {
            provider_id: Some(1),
            time: NaiveTime::from_hms_opt(14, 0, 0),
            service_ids: vec![10],
            ..Default::default()
        };
        draft.merge(BookingDraft::default());
        assert_eq!(draft.provider_id, Some(1));
        assert!(draft.time.is_some());
        assert_eq!(draft.service_ids, vec![10]);
    }

    #[test]
    fn test_missing_fields_order() {
        let draft = BookingDraft::default();
        assert_eq!(draft.missing_fields(), vec!["barber", "service", "date", "time"]);
        assert!(!draft.is_complete());

        let full = BookingDraft {
            provider_id: Some(1),
            date: NaiveDate::from_ymd_opt(2025, 6, 16),
            time: NaiveTime::from_hms_opt(14, 0, 0),
            service_ids: vec![10],
            ..Default::default()
        };
        assert!(full.is_complete());
    }
}
