use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Appointment, AppointmentStatus, ContactInfo, Provider};

/// Floor for a booking's length regardless of how short the chosen
/// services are.
pub const MIN_APPOINTMENT_MINUTES: i64 = 30;

/// Half-open interval overlap: `[a_start, a_end)` intersects
/// `[b_start, b_end)`. Back-to-back appointments do not conflict.
pub fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Total length of the chosen services, floored at 30 minutes. Unknown
/// service ids are a validation failure.
pub fn appointment_minutes(provider: &Provider, service_ids: &[i64]) -> Result<i64, BookingError> {
    if service_ids.is_empty() {
        return Err(BookingError::Validation(
            "at least one service is required".to_string(),
        ));
    }
    let mut total = 0;
    for id in service_ids {
        let service = provider.service(*id).ok_or_else(|| {
            BookingError::Validation(format!("unknown service id {id} for {}", provider.name))
        })?;
        total += service.duration_minutes;
    }
    Ok(total.max(MIN_APPOINTMENT_MINUTES))
}

/// Grid slots for `date` that are inside working hours and clear of every
/// non-cancelled appointment. An empty list is a normal answer.
pub fn list_open_slots(
    conn: &Connection,
    provider: &Provider,
    date: NaiveDate,
    granularity_minutes: u32,
) -> Result<Vec<NaiveDateTime>, BookingError> {
    let now = chrono::Utc::now().naive_utc();
    queries::cancel_expired_holds(conn, &now)?;

    let slots = provider.availability.slots_for_day(date, granularity_minutes)?;
    if slots.is_empty() {
        return Ok(vec![]);
    }

    let day_start = date.and_time(chrono::NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);
    let booked = queries::get_overlapping(conn, provider.id, &day_start, &day_end)?;

    let slot_len = Duration::minutes(granularity_minutes as i64);
    Ok(slots
        .into_iter()
        .filter(|slot| {
            let slot_end = *slot + slot_len;
            !booked
                .iter()
                .any(|appt| overlaps(*slot, slot_end, appt.start_time, appt.end_time))
        })
        .collect())
}

/// Places a provisional hold: `pending`, blocking the slot until confirmed,
/// cancelled, or swept after `hold_ttl_minutes`.
pub fn create(
    conn: &mut Connection,
    provider: &Provider,
    start: NaiveDateTime,
    service_ids: &[i64],
    contact: &ContactInfo,
    hold_ttl_minutes: i64,
) -> Result<Appointment, BookingError> {
    reserve_with_retry(
        conn,
        provider,
        start,
        service_ids,
        contact,
        AppointmentStatus::Pending,
        hold_ttl_minutes,
    )
}

/// Create and confirm in one atomic step, for direct (non-conversational)
/// bookings. Contact details are required up front.
pub fn book(
    conn: &mut Connection,
    provider: &Provider,
    start: NaiveDateTime,
    service_ids: &[i64],
    contact: &ContactInfo,
) -> Result<Appointment, BookingError> {
    validate_contact(contact)?;
    reserve_with_retry(
        conn,
        provider,
        start,
        service_ids,
        contact,
        AppointmentStatus::Confirmed,
        0,
    )
}

fn reserve_with_retry(
    conn: &mut Connection,
    provider: &Provider,
    start: NaiveDateTime,
    service_ids: &[i64],
    contact: &ContactInfo,
    status: AppointmentStatus,
    hold_ttl_minutes: i64,
) -> Result<Appointment, BookingError> {
    match reserve(conn, provider, start, service_ids, contact, status, hold_ttl_minutes) {
        // One retry of the read-then-decide cycle; a second loss means the
        // slot really is contended.
        Err(BookingError::PersistenceConflict) => {
            tracing::warn!(provider_id = provider.id, "reservation write lost a race, retrying");
            reserve(conn, provider, start, service_ids, contact, status, hold_ttl_minutes)
                .map_err(|e| match e {
                    BookingError::PersistenceConflict => BookingError::SlotConflict,
                    other => other,
                })
        }
        other => other,
    }
}

fn reserve(
    conn: &mut Connection,
    provider: &Provider,
    start: NaiveDateTime,
    service_ids: &[i64],
    contact: &ContactInfo,
    status: AppointmentStatus,
    hold_ttl_minutes: i64,
) -> Result<Appointment, BookingError> {
    let minutes = appointment_minutes(provider, service_ids)?;
    let end = start + Duration::minutes(minutes);

    if !provider.availability.is_within(start, end) {
        return Err(BookingError::SlotUnavailable {
            hours: provider.availability.to_human_readable(),
        });
    }

    let now = chrono::Utc::now().naive_utc();

    // Hold sweep, conflict check, and insert are one unit; the connection
    // mutex serializes transactions across the process.
    let tx = conn.transaction().map_err(persistence_error)?;

    queries::cancel_expired_holds(&tx, &now)?;

    let existing = queries::get_overlapping(&tx, provider.id, &start, &end)?;
    if !existing.is_empty() {
        return Err(BookingError::SlotConflict);
    }

    let appointment = Appointment {
        id: Uuid::new_v4().to_string(),
        provider_id: provider.id,
        service_ids: service_ids.to_vec(),
        start_time: start,
        end_time: end,
        customer_name: contact.name.clone(),
        customer_email: contact.email.clone(),
        customer_phone: contact.phone.clone(),
        status,
        hold_expires_at: match status {
            AppointmentStatus::Pending => Some(now + Duration::minutes(hold_ttl_minutes)),
            _ => None,
        },
        created_at: now,
        updated_at: now,
    };

    queries::insert_appointment(&tx, &appointment).map_err(persistence_error)?;
    tx.commit().map_err(persistence_error)?;

    tracing::info!(
        appointment_id = %appointment.id,
        provider_id = provider.id,
        start = %start,
        status = status.as_str(),
        "reservation created"
    );
    Ok(appointment)
}

/// Moves a pending reservation to confirmed once valid contact details
/// arrive.
pub fn confirm(
    conn: &mut Connection,
    id: &str,
    contact: &ContactInfo,
) -> Result<Appointment, BookingError> {
    validate_contact(contact)?;

    let tx = conn.transaction().map_err(persistence_error)?;

    let appointment = queries::get_appointment(&tx, id)?
        .ok_or_else(|| BookingError::ReservationNotFound(id.to_string()))?;

    match appointment.status {
        AppointmentStatus::Pending => {}
        AppointmentStatus::Confirmed | AppointmentStatus::Cancelled => {
            return Err(BookingError::Validation(format!(
                "reservation is {}, not pending",
                appointment.status.as_str()
            )));
        }
    }

    queries::update_appointment_status(&tx, id, AppointmentStatus::Confirmed, Some(contact))?;
    tx.commit().map_err(persistence_error)?;

    tracing::info!(appointment_id = %id, "reservation confirmed");
    Ok(Appointment {
        status: AppointmentStatus::Confirmed,
        customer_name: contact.name.clone(),
        customer_email: contact.email.clone(),
        customer_phone: contact.phone.clone(),
        hold_expires_at: None,
        ..appointment
    })
}

/// Cancels from any state. Cancelling twice is a no-op success.
pub fn cancel(conn: &mut Connection, id: &str) -> Result<Appointment, BookingError> {
    let tx = conn.transaction().map_err(persistence_error)?;

    let appointment = queries::get_appointment(&tx, id)?
        .ok_or_else(|| BookingError::ReservationNotFound(id.to_string()))?;

    if appointment.status == AppointmentStatus::Cancelled {
        return Ok(appointment);
    }

    queries::update_appointment_status(&tx, id, AppointmentStatus::Cancelled, None)?;
    tx.commit().map_err(persistence_error)?;

    tracing::info!(appointment_id = %id, "reservation cancelled");
    Ok(Appointment {
        status: AppointmentStatus::Cancelled,
        ..appointment
    })
}

pub fn validate_contact(contact: &ContactInfo) -> Result<(), BookingError> {
    let name_ok = contact.name.as_deref().is_some_and(|n| !n.trim().is_empty());
    if !name_ok {
        return Err(BookingError::InvalidContact("name is required".to_string()));
    }
    match contact.email.as_deref() {
        Some(email) if is_valid_email(email) => Ok(()),
        Some(_) => Err(BookingError::InvalidContact(
            "email address looks malformed".to_string(),
        )),
        None => Err(BookingError::InvalidContact("email is required".to_string())),
    }
}

/// Basic shape check: non-empty local part, one `@`, dotted domain, no
/// whitespace.
pub fn is_valid_email(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

fn persistence_error(e: rusqlite::Error) -> BookingError {
    if is_contended(&e) {
        BookingError::PersistenceConflict
    } else {
        BookingError::Storage(e.into())
    }
}

fn is_contended(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::ConstraintViolation
            )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{DayWindow, WeeklyAvailability};

    fn setup() -> (Connection, Provider) {
        let conn = db::init_db(":memory:").unwrap();
        let availability = WeeklyAvailability {
            monday: Some(DayWindow {
                start: "09:00".to_string(),
                end: "17:00".to_string(),
            }),
            ..Default::default()
        };
        let provider_id = queries::create_provider(&conn, "Alex", &availability).unwrap();
        queries::create_service(&conn, provider_id, "Haircut", 30, 3000).unwrap();
        queries::create_service(&conn, provider_id, "Beard Trim", 10, 2000).unwrap();
        let provider = queries::get_provider(&conn, provider_id).unwrap().unwrap();
        (conn, provider)
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn haircut(provider: &Provider) -> Vec<i64> {
        vec![provider.service_by_name("Haircut").unwrap().id]
    }

    fn contact() -> ContactInfo {
        ContactInfo {
            name: Some("Jane".to_string()),
            email: Some("jane@x.com".to_string()),
            phone: None,
        }
    }

    #[test]
    fn test_overlaps_table() {
        // Existing 10:00-10:30 (Scenario B)
        let (b_start, b_end) = (dt("2025-06-16 10:00"), dt("2025-06-16 10:30"));
        assert!(overlaps(dt("2025-06-16 10:00"), dt("2025-06-16 10:30"), b_start, b_end));
        assert!(!overlaps(dt("2025-06-16 09:30"), dt("2025-06-16 10:00"), b_start, b_end));
        assert!(overlaps(dt("2025-06-16 09:45"), dt("2025-06-16 10:15"), b_start, b_end));
        // Candidate fully containing the existing interval
        assert!(overlaps(dt("2025-06-16 09:00"), dt("2025-06-16 11:00"), b_start, b_end));
        // Adjacent after
        assert!(!overlaps(dt("2025-06-16 10:30"), dt("2025-06-16 11:00"), b_start, b_end));
    }

    #[test]
    fn test_overlaps_symmetry() {
        let pairs = [
            (dt("2025-06-16 10:00"), dt("2025-06-16 11:00")),
            (dt("2025-06-16 10:30"), dt("2025-06-16 10:45")),
            (dt("2025-06-16 12:00"), dt("2025-06-16 13:00")),
        ];
        for (a_start, a_end) in pairs {
            for (b_start, b_end) in pairs {
                assert_eq!(
                    overlaps(a_start, a_end, b_start, b_end),
                    overlaps(b_start, b_end, a_start, a_end)
                );
            }
            // Any non-degenerate interval conflicts with itself
            assert!(overlaps(a_start, a_end, a_start, a_end));
        }
    }

    #[test]
    fn test_appointment_minutes_floor() {
        let (_conn, provider) = setup();
        let trim = vec![provider.service_by_name("Beard Trim").unwrap().id];
        // 10 minutes floors to 30
        assert_eq!(appointment_minutes(&provider, &trim).unwrap(), 30);
        let both: Vec<i64> = provider.services.iter().map(|s| s.id).collect();
        assert_eq!(appointment_minutes(&provider, &both).unwrap(), 40);
        assert!(appointment_minutes(&provider, &[]).is_err());
        assert!(appointment_minutes(&provider, &[999]).is_err());
    }

    #[test]
    fn test_create_outside_hours() {
        let (mut conn, provider) = setup();
        let err = create(&mut conn, &provider, dt("2025-06-16 20:00"), &haircut(&provider), &ContactInfo::default(), 30)
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));
        // Sunday is a day off
        let err = create(&mut conn, &provider, dt("2025-06-15 10:00"), &haircut(&provider), &ContactInfo::default(), 30)
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));
    }

    #[test]
    fn test_create_then_conflicting_create() {
        let (mut conn, provider) = setup();
        let services = haircut(&provider);
        let first = create(&mut conn, &provider, dt("2025-06-16 10:00"), &services, &ContactInfo::default(), 30).unwrap();
        assert_eq!(first.status, AppointmentStatus::Pending);
        assert!(first.hold_expires_at.is_some());

        let err = create(&mut conn, &provider, dt("2025-06-16 10:15"), &services, &ContactInfo::default(), 30)
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict));

        // Back-to-back is fine
        assert!(create(&mut conn, &provider, dt("2025-06-16 10:30"), &services, &ContactInfo::default(), 30).is_ok());
    }

    #[test]
    fn test_pending_hold_blocks_until_expired() {
        let (mut conn, provider) = setup();
        let services = haircut(&provider);
        let hold = create(&mut conn, &provider, dt("2025-06-16 11:00"), &services, &ContactInfo::default(), 30).unwrap();

        assert!(matches!(
            create(&mut conn, &provider, dt("2025-06-16 11:00"), &services, &ContactInfo::default(), 30),
            Err(BookingError::SlotConflict)
        ));

        // Age the hold past its TTL; the next attempt sweeps it and wins.
        conn.execute(
            "UPDATE appointments SET hold_expires_at = '2020-01-01 00:00:00' WHERE id = ?1",
            rusqlite::params![hold.id],
        )
        .unwrap();
        let second =
            create(&mut conn, &provider, dt("2025-06-16 11:00"), &services, &ContactInfo::default(), 30).unwrap();
        assert_eq!(second.status, AppointmentStatus::Pending);

        let old = queries::get_appointment(&conn, &hold.id).unwrap().unwrap();
        assert_eq!(old.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn test_confirm_happy_path() {
        let (mut conn, provider) = setup();
        let hold = create(&mut conn, &provider, dt("2025-06-16 10:00"), &haircut(&provider), &ContactInfo::default(), 30).unwrap();
        let confirmed = confirm(&mut conn, &hold.id, &contact()).unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        assert!(confirmed.hold_expires_at.is_none());

        let stored = queries::get_appointment(&conn, &hold.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Confirmed);
        assert_eq!(stored.customer_email.as_deref(), Some("jane@x.com"));
    }

    #[test]
    fn test_confirm_rejects_empty_email() {
        let (mut conn, provider) = setup();
        let hold = create(&mut conn, &provider, dt("2025-06-16 10:00"), &haircut(&provider), &ContactInfo::default(), 30).unwrap();

        let bad = ContactInfo {
            name: Some("Jane".to_string()),
            email: Some("".to_string()),
            phone: None,
        };
        assert!(matches!(
            confirm(&mut conn, &hold.id, &bad),
            Err(BookingError::InvalidContact(_))
        ));

        // Reservation stays pending
        let stored = queries::get_appointment(&conn, &hold.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
    }

    #[test]
    fn test_confirm_unknown_id() {
        let (mut conn, _provider) = setup();
        assert!(matches!(
            confirm(&mut conn, "nope", &contact()),
            Err(BookingError::ReservationNotFound(_))
        ));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (mut conn, provider) = setup();
        let hold = create(&mut conn, &provider, dt("2025-06-16 10:00"), &haircut(&provider), &ContactInfo::default(), 30).unwrap();

        let first = cancel(&mut conn, &hold.id).unwrap();
        assert_eq!(first.status, AppointmentStatus::Cancelled);
        let second = cancel(&mut conn, &hold.id).unwrap();
        assert_eq!(second.status, AppointmentStatus::Cancelled);

        // Cancelled hold no longer blocks the slot
        assert!(create(&mut conn, &provider, dt("2025-06-16 10:00"), &haircut(&provider), &ContactInfo::default(), 30).is_ok());
    }

    #[test]
    fn test_book_creates_confirmed() {
        let (mut conn, provider) = setup();
        let booked = book(&mut conn, &provider, dt("2025-06-16 14:00"), &haircut(&provider), &contact()).unwrap();
        assert_eq!(booked.status, AppointmentStatus::Confirmed);
        assert!(booked.hold_expires_at.is_none());

        assert!(matches!(
            book(&mut conn, &provider, dt("2025-06-16 14:00"), &haircut(&provider), &contact()),
            Err(BookingError::SlotConflict)
        ));
    }

    #[test]
    fn test_list_open_slots_filters_booked() {
        let (mut conn, provider) = setup();
        let services = haircut(&provider);
        book(&mut conn, &provider, dt("2025-06-16 10:00"), &services, &contact()).unwrap();

        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let slots = list_open_slots(&conn, &provider, date, 30).unwrap();
        assert_eq!(slots.len(), 15);
        assert!(!slots.contains(&dt("2025-06-16 10:00")));
        assert!(slots.contains(&dt("2025-06-16 10:30")));

        // Day off yields an empty list, not an error
        let sunday = chrono::NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert!(list_open_slots(&conn, &provider, sunday, 30).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_insert_classified_as_persistence_conflict() {
        let (conn, provider) = setup();
        let now = chrono::Utc::now().naive_utc();
        let appointment = Appointment {
            id: "fixed-id".to_string(),
            provider_id: provider.id,
            service_ids: haircut(&provider),
            start_time: dt("2025-06-16 10:00"),
            end_time: dt("2025-06-16 10:30"),
            customer_name: Some("Jane".to_string()),
            customer_email: Some("jane@x.com".to_string()),
            customer_phone: None,
            status: AppointmentStatus::Confirmed,
            hold_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_appointment(&conn, &appointment).unwrap();

        // A second insert with the same id hits the primary key; the raw
        // rusqlite error must reach the contention classifier intact.
        let err = queries::insert_appointment(&conn, &appointment).unwrap_err();
        assert!(is_contended(&err));
        assert!(matches!(
            persistence_error(err),
            BookingError::PersistenceConflict
        ));
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("jane@x.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("jane@xcom"));
        assert!(!is_valid_email("ja ne@x.com"));
        assert!(!is_valid_email("jane@x..com"));
    }
}
