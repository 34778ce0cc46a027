use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::errors::BookingError;
use crate::models::availability::parse_hhmm;
use crate::models::{ConversationMessage, Provider};
use crate::services::ai::{LlmProvider, Message};

/// Fields the extractor collaborator pulled out of a turn. Service choices
/// come back as names; the dialogue layer resolves them against the chosen
/// barber's catalog.
#[derive(Debug, Default)]
pub struct ExtractedFields {
    pub provider_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub service_names: Vec<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    barber_id: Option<i64>,
    date: Option<String>,
    time: Option<String>,
    #[serde(default)]
    services: Option<Vec<String>>,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
}

/// Asks the collaborator for a constrained JSON object describing the
/// booking fields in the latest turn. The prompt carries today's date (so
/// "tomorrow" and weekday names resolve) and the barber roster (so names
/// resolve to ids).
pub async fn extract_booking_fields(
    llm: &dyn LlmProvider,
    history: &[ConversationMessage],
    latest_message: &str,
    roster: &[Provider],
    today: NaiveDate,
) -> Result<ExtractedFields, BookingError> {
    let roster_lines: Vec<String> = roster
        .iter()
        .map(|p| {
            let services: Vec<&str> = p.services.iter().map(|s| s.name.as_str()).collect();
            format!("- id {}: {} (services: {})", p.id, p.name, services.join(", "))
        })
        .collect();

    let system = format!(
        r#"You extract appointment booking details for a barbershop. Today is {today} ({weekday}).

Barbers:
{roster}

Return ONLY a JSON object (no markdown, no prose) with this exact shape; use null for anything not mentioned:
{{
  "barber_id": 1,
  "date": "YYYY-MM-DD",
  "time": "HH:MM",
  "services": ["Haircut"],
  "customer_name": null,
  "customer_email": null,
  "customer_phone": null
}}

Rules:
- Resolve relative dates ("tomorrow", "next friday") against today's date.
- Resolve a barber mentioned by name to their id from the list above.
- "services" must use the service names listed for that barber.
- Times are 24-hour clock ("2pm" -> "14:00")."#,
        today = today.format("%Y-%m-%d"),
        weekday = today.format("%A"),
        roster = roster_lines.join("\n"),
    );

    let mut messages: Vec<Message> = history
        .iter()
        .map(|m| Message {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();
    messages.push(Message {
        role: "user".to_string(),
        content: latest_message.to_string(),
    });

    let response = llm
        .chat(&system, &messages)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "extraction call failed");
            BookingError::ExtractionFailed
        })?;

    let raw = parse_extraction(&response)?;
    Ok(typed_fields(raw))
}

/// Accepts the bare JSON object or one wrapped in a markdown code fence.
/// Anything else is `ExtractionFailed` — no freeform text surgery.
fn parse_extraction(response: &str) -> Result<RawExtraction, BookingError> {
    let trimmed = response.trim();
    if let Ok(raw) = serde_json::from_str::<RawExtraction>(trimmed) {
        return Ok(raw);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim);

    match unfenced {
        Some(inner) => serde_json::from_str::<RawExtraction>(inner).map_err(|e| {
            tracing::warn!(error = %e, "extractor returned unparseable JSON");
            BookingError::ExtractionFailed
        }),
        None => {
            tracing::warn!("extractor response was not a JSON object");
            Err(BookingError::ExtractionFailed)
        }
    }
}

/// Field-level leniency: a malformed date or time is dropped (the dialogue
/// re-asks for it) instead of failing the whole extraction.
fn typed_fields(raw: RawExtraction) -> ExtractedFields {
    let date = raw.date.as_deref().and_then(|s| {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .inspect_err(|_| tracing::warn!(value = s, "dropping unparseable extracted date"))
            .ok()
    });
    let time = raw.time.as_deref().and_then(|s| match parse_hhmm(s.trim()) {
        Ok(t) => Some(t),
        Err(_) => {
            tracing::warn!(value = s, "dropping unparseable extracted time");
            None
        }
    });

    ExtractedFields {
        provider_id: raw.barber_id,
        date,
        time,
        service_names: raw.services.unwrap_or_default(),
        customer_name: none_if_blank(raw.customer_name),
        customer_email: none_if_blank(raw.customer_email),
        customer_phone: none_if_blank(raw.customer_phone),
    }
}

fn none_if_blank(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let raw = parse_extraction(
            r#"{"barber_id":1,"date":"2025-06-17","time":"14:00","services":["Haircut"],"customer_name":null,"customer_email":null,"customer_phone":null}"#,
        )
        .unwrap();
        let fields = typed_fields(raw);
        assert_eq!(fields.provider_id, Some(1));
        assert_eq!(fields.date, NaiveDate::from_ymd_opt(2025, 6, 17));
        assert_eq!(fields.time, NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(fields.service_names, vec!["Haircut"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = parse_extraction(
            "```json\n{\"barber_id\":2,\"date\":null,\"time\":null,\"services\":null,\"customer_name\":\"Jane\",\"customer_email\":\"jane@x.com\",\"customer_phone\":null}\n```",
        )
        .unwrap();
        let fields = typed_fields(raw);
        assert_eq!(fields.provider_id, Some(2));
        assert_eq!(fields.customer_name.as_deref(), Some("Jane"));
        assert_eq!(fields.customer_email.as_deref(), Some("jane@x.com"));
    }

    #[test]
    fn test_prose_is_extraction_failed() {
        assert!(matches!(
            parse_extraction("Sure! I'd book you with Alex at 2pm."),
            Err(BookingError::ExtractionFailed)
        ));
    }

    #[test]
    fn test_malformed_date_and_time_are_dropped() {
        let raw = parse_extraction(
            r#"{"barber_id":1,"date":"next tuesday","time":"2pm","services":[],"customer_name":null,"customer_email":null,"customer_phone":null}"#,
        )
        .unwrap();
        let fields = typed_fields(raw);
        assert_eq!(fields.provider_id, Some(1));
        assert!(fields.date.is_none());
        assert!(fields.time.is_none());
    }

    #[test]
    fn test_blank_strings_become_none() {
        assert_eq!(none_if_blank(Some("  ".to_string())), None);
        assert_eq!(none_if_blank(Some("null".to_string())), None);
        assert_eq!(none_if_blank(Some(" Jane ".to_string())), Some("Jane".to_string()));
    }
}
