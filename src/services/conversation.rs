use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDateTime, Utc};

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{
    BookingDraft, ContactInfo, Conversation, ConversationMessage, Intent, Provider,
};
use crate::services::ai::extract::{extract_booking_fields, ExtractedFields};
use crate::services::ai::intent::classify;
use crate::services::scheduling;
use crate::state::AppState;

const CONVERSATION_TTL_MINUTES: i64 = 30;

const FALLBACK_REPLY: &str =
    "Sorry, I didn't quite catch that. Tell me which barber, which service, and what date and time you'd like.";

const CONTACT_PROMPT: &str =
    "To confirm the booking, please reply with your name and email address.";

/// One conversational turn: classify, update the session's draft, and drive
/// the reservation lifecycle. Collaborator failures degrade to clarifying
/// replies; they never fail the turn.
pub async fn process_message(
    state: &Arc<AppState>,
    session_id: &str,
    message: &str,
) -> anyhow::Result<String> {
    let mut conv = {
        let db = state.db.lock().unwrap();
        queries::get_conversation(&db, session_id)?
    }
    .unwrap_or_else(|| new_conversation(session_id));

    let history = conv.messages.clone();
    conv.messages.push(ConversationMessage {
        role: "user".to_string(),
        content: message.to_string(),
    });

    let intent = classify(state.llm.as_ref(), &history, message).await;

    tracing::info!(
        session = session_id,
        intent = intent.as_str(),
        pending = conv.pending_appointment_id.is_some(),
        "processing turn"
    );

    let reply = match intent {
        Intent::Booking => handle_booking(state, &mut conv, &history, message).await?,
        Intent::CustomerInfo => handle_customer_info(state, &mut conv, &history, message).await?,
        Intent::AvailabilityQuery => {
            handle_availability_query(state, &mut conv, &history, message).await?
        }
        Intent::Cancellation => handle_cancellation(state, &mut conv)?,
        Intent::Rescheduling => handle_rescheduling(state, &mut conv)?,
        Intent::General => handle_general(state, &history, message).await,
    };

    conv.messages.push(ConversationMessage {
        role: "assistant".to_string(),
        content: reply.clone(),
    });

    let now = Utc::now().naive_utc();
    conv.last_activity = now;
    conv.expires_at = now + Duration::minutes(CONVERSATION_TTL_MINUTES);

    {
        let db = state.db.lock().unwrap();
        queries::save_conversation(&db, &conv)?;
    }

    Ok(reply)
}

async fn handle_booking(
    state: &Arc<AppState>,
    conv: &mut Conversation,
    history: &[ConversationMessage],
    message: &str,
) -> anyhow::Result<String> {
    let roster = state.directory.list()?;
    if roster.is_empty() {
        return Ok("We don't have any barbers set up yet. Please check back later.".to_string());
    }

    let today = Utc::now().date_naive();
    let fields = match extract_booking_fields(state.llm.as_ref(), history, message, &roster, today)
        .await
    {
        Ok(fields) => fields,
        Err(_) => return Ok(FALLBACK_REPLY.to_string()),
    };

    let mut draft = conv.draft.take().unwrap_or_default();
    let unresolved = merge_fields(&mut draft, fields, &roster);
    if let Some(service_name) = unresolved {
        let reply = match draft
            .provider_id
            .and_then(|id| roster.iter().find(|p| p.id == id))
        {
            Some(provider) => format!(
                "{} doesn't offer \"{}\". They do: {}. Which would you like?",
                provider.name,
                service_name,
                service_list(provider)
            ),
            None => format!(
                "I couldn't match the service \"{service_name}\". Which barber would you like to see?"
            ),
        };
        conv.draft = Some(draft);
        return Ok(reply);
    }

    let missing = draft.missing_fields();
    if !missing.is_empty() {
        let reply = format!("Almost there! I still need: {}.", missing.join(", "));
        conv.draft = Some(draft);
        return Ok(reply);
    }

    // Draft complete; the only remaining gates are hours and conflicts.
    let provider_id = draft.provider_id.unwrap_or_default();
    let Some(provider) = roster.into_iter().find(|p| p.id == provider_id) else {
        draft.provider_id = None;
        conv.draft = Some(draft);
        return Ok("That barber isn't available any more. Who else would you like to see?".to_string());
    };

    let start = match (draft.date, draft.time) {
        (Some(date), Some(time)) => date.and_time(time),
        _ => {
            conv.draft = Some(draft);
            return Ok(FALLBACK_REPLY.to_string());
        }
    };

    let contact = ContactInfo {
        name: draft.customer_name.clone(),
        email: draft.customer_email.clone(),
        phone: draft.customer_phone.clone(),
    };

    let created = {
        let mut db = state.db.lock().unwrap();
        scheduling::create(
            &mut db,
            &provider,
            start,
            &draft.service_ids,
            &contact,
            state.config.hold_ttl_minutes,
        )
    };

    let reply = match created {
        Ok(appointment) => {
            conv.pending_appointment_id = Some(appointment.id.clone());
            conv.draft = Some(draft);
            format!(
                "You're pencilled in with {} on {} at {}. {}",
                provider.name,
                start.format("%Y-%m-%d"),
                start.format("%H:%M"),
                CONTACT_PROMPT
            )
        }
        Err(BookingError::SlotUnavailable { hours }) => {
            // The time (and, on a closed day, the date) is invalid; keep
            // the barber and service selections.
            draft.time = None;
            if provider.availability.window_for(start.date().weekday()).is_none() {
                draft.date = None;
            }
            conv.draft = Some(draft);
            format!(
                "{} isn't working then. Their hours are {}. What other time suits you?",
                provider.name, hours
            )
        }
        Err(BookingError::SlotConflict) => {
            draft.time = None;
            let alternatives = {
                let db = state.db.lock().unwrap();
                scheduling::list_open_slots(
                    &db,
                    &provider,
                    start.date(),
                    state.config.slot_granularity_minutes,
                )
                .unwrap_or_default()
            };
            conv.draft = Some(draft);
            if alternatives.is_empty() {
                format!(
                    "That slot is already booked and {} has nothing else free that day. Want to try another date?",
                    provider.name
                )
            } else {
                format!(
                    "That slot is already booked. {} is free at: {}. Would one of those work?",
                    provider.name,
                    format_slot_times(&alternatives, 4)
                )
            }
        }
        Err(BookingError::Validation(msg)) => {
            conv.draft = Some(draft);
            format!("{msg}. Could you rephrase that?")
        }
        Err(e) => return Err(e.into()),
    };

    Ok(reply)
}

async fn handle_customer_info(
    state: &Arc<AppState>,
    conv: &mut Conversation,
    history: &[ConversationMessage],
    message: &str,
) -> anyhow::Result<String> {
    let Some(appointment_id) = conv.pending_appointment_id.clone() else {
        return Ok(
            "There's no booking waiting to be confirmed. Would you like to make one?".to_string(),
        );
    };

    let roster = state.directory.list()?;
    let today = Utc::now().date_naive();
    let fields = match extract_booking_fields(state.llm.as_ref(), history, message, &roster, today)
        .await
    {
        Ok(fields) => fields,
        Err(_) => return Ok(CONTACT_PROMPT.to_string()),
    };

    let mut draft = conv.draft.take().unwrap_or_default();
    merge_fields(&mut draft, fields, &roster);

    let contact = ContactInfo {
        name: draft.customer_name.clone(),
        email: draft.customer_email.clone(),
        phone: draft.customer_phone.clone(),
    };

    let confirmed = {
        let mut db = state.db.lock().unwrap();
        scheduling::confirm(&mut db, &appointment_id, &contact)
    };

    let reply = match confirmed {
        Ok(appointment) => {
            conv.pending_appointment_id = None;
            conv.draft = None;
            format!(
                "All confirmed! See you on {} at {}.",
                appointment.start_time.format("%Y-%m-%d"),
                appointment.start_time.format("%H:%M")
            )
        }
        Err(BookingError::InvalidContact(reason)) => {
            conv.draft = Some(draft);
            format!("I can't confirm yet: {reason}. {CONTACT_PROMPT}")
        }
        Err(BookingError::ReservationNotFound(_)) | Err(BookingError::Validation(_)) => {
            // The hold was swept or cancelled out from under the session.
            conv.pending_appointment_id = None;
            draft.time = None;
            conv.draft = Some(draft);
            "It looks like that held slot lapsed. Let's pick a new time. When suits you?"
                .to_string()
        }
        Err(e) => return Err(e.into()),
    };

    Ok(reply)
}

async fn handle_availability_query(
    state: &Arc<AppState>,
    conv: &mut Conversation,
    history: &[ConversationMessage],
    message: &str,
) -> anyhow::Result<String> {
    let roster = state.directory.list()?;
    if roster.is_empty() {
        return Ok("We don't have any barbers set up yet.".to_string());
    }

    let today = Utc::now().date_naive();
    let fields = match extract_booking_fields(state.llm.as_ref(), history, message, &roster, today)
        .await
    {
        Ok(fields) => fields,
        Err(_) => {
            return Ok("Whose availability would you like, and for which date?".to_string())
        }
    };

    let mut draft = conv.draft.take().unwrap_or_default();
    merge_fields(&mut draft, fields, &roster);

    let (provider_id, date) = (draft.provider_id, draft.date);
    conv.draft = Some(draft);

    let Some(provider) = provider_id.and_then(|id| roster.into_iter().find(|p| p.id == id)) else {
        return Ok("Which barber's availability would you like to check?".to_string());
    };
    let Some(date) = date else {
        return Ok(format!("Which date should I check for {}?", provider.name));
    };

    let slots = {
        let db = state.db.lock().unwrap();
        scheduling::list_open_slots(&db, &provider, date, state.config.slot_granularity_minutes)?
    };

    if slots.is_empty() {
        Ok(format!(
            "{} has no open slots on {}. Their hours are {}.",
            provider.name,
            date.format("%Y-%m-%d"),
            provider.availability.to_human_readable()
        ))
    } else {
        Ok(format!(
            "{} is free on {} at: {}.",
            provider.name,
            date.format("%Y-%m-%d"),
            format_slot_times(&slots, 8)
        ))
    }
}

fn handle_cancellation(state: &Arc<AppState>, conv: &mut Conversation) -> anyhow::Result<String> {
    let Some(appointment_id) = conv.pending_appointment_id.clone() else {
        return Ok(
            "I can cancel a booking for you. Which appointment do you mean? If you just made it here, say \"cancel my pending booking\"."
                .to_string(),
        );
    };

    let cancelled = {
        let mut db = state.db.lock().unwrap();
        scheduling::cancel(&mut db, &appointment_id)
    };

    match cancelled {
        Ok(_) => {
            conv.pending_appointment_id = None;
            conv.draft = None;
            Ok("Done, that booking is cancelled. Anything else I can help with?".to_string())
        }
        Err(BookingError::ReservationNotFound(_)) => {
            conv.pending_appointment_id = None;
            Ok("I couldn't find that booking any more; nothing left to cancel.".to_string())
        }
        Err(e) => Err(e.into()),
    }
}

fn handle_rescheduling(state: &Arc<AppState>, conv: &mut Conversation) -> anyhow::Result<String> {
    let Some(appointment_id) = conv.pending_appointment_id.clone() else {
        return Ok(
            "Happy to help reschedule. Which appointment is it, and what new time would you like?"
                .to_string(),
        );
    };

    // Release the held slot, keep the barber/service selections, and ask
    // for a fresh time.
    {
        let mut db = state.db.lock().unwrap();
        scheduling::cancel(&mut db, &appointment_id)?;
    }
    conv.pending_appointment_id = None;
    if let Some(draft) = conv.draft.as_mut() {
        draft.time = None;
        draft.date = None;
    }
    Ok("No problem, I've released that slot. What new date and time would you like?".to_string())
}

async fn handle_general(
    state: &Arc<AppState>,
    history: &[ConversationMessage],
    message: &str,
) -> String {
    let roster_summary = state
        .directory
        .list()
        .map(|roster| {
            roster
                .iter()
                .map(|p| {
                    format!(
                        "{} (hours: {}; services: {})",
                        p.name,
                        p.availability.to_human_readable(),
                        service_list(p)
                    )
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default();

    let system = format!(
        "You are a friendly barbershop assistant. Answer briefly and helpfully. \
         Our barbers: {roster_summary}. If the customer wants to book, ask for barber, \
         service, date and time."
    );

    let mut messages: Vec<crate::services::ai::Message> = history
        .iter()
        .map(|m| crate::services::ai::Message {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();
    messages.push(crate::services::ai::Message {
        role: "user".to_string(),
        content: message.to_string(),
    });

    match state.llm.chat(&system, &messages).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "general reply failed, using fallback");
            FALLBACK_REPLY.to_string()
        }
    }
}

/// Folds freshly extracted fields into the draft. Service names are
/// resolved against the (possibly just-chosen) barber's catalog; returns
/// the first name that doesn't resolve, if any.
fn merge_fields(
    draft: &mut BookingDraft,
    fields: ExtractedFields,
    roster: &[Provider],
) -> Option<String> {
    let mut update = BookingDraft {
        provider_id: fields.provider_id,
        date: fields.date,
        time: fields.time,
        service_ids: vec![],
        customer_name: fields.customer_name,
        customer_email: fields.customer_email,
        customer_phone: fields.customer_phone,
    };

    let mut unresolved = None;
    if !fields.service_names.is_empty() {
        let provider_id = fields.provider_id.or(draft.provider_id);
        let provider = provider_id.and_then(|id| roster.iter().find(|p| p.id == id));
        match provider {
            Some(provider) => {
                let mut ids = vec![];
                for name in &fields.service_names {
                    match provider.service_by_name(name) {
                        Some(service) => ids.push(service.id),
                        None => {
                            unresolved = Some(name.clone());
                            ids.clear();
                            break;
                        }
                    }
                }
                update.service_ids = ids;
            }
            None => {
                // Can't resolve names without a barber; the missing-fields
                // follow-up will ask for one.
            }
        }
    }

    draft.merge(update);
    unresolved
}

fn format_slot_times(slots: &[NaiveDateTime], limit: usize) -> String {
    slots
        .iter()
        .take(limit)
        .map(|s| s.format("%H:%M").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn service_list(provider: &Provider) -> String {
    provider
        .services
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn new_conversation(session_id: &str) -> Conversation {
    let now = Utc::now().naive_utc();
    Conversation {
        session_id: session_id.to_string(),
        messages: vec![],
        draft: None,
        pending_appointment_id: None,
        last_activity: now,
        expires_at: now + Duration::minutes(CONVERSATION_TTL_MINUTES),
    }
}
