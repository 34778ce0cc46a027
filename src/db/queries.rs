use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::models::{
    Appointment, AppointmentStatus, BookingDraft, ContactInfo, Conversation, ConversationMessage,
    Provider, Service, WeeklyAvailability,
};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FMT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FMT).unwrap_or_else(|_| chrono::Utc::now().naive_utc())
}

// ── Providers ──

pub fn create_provider(
    conn: &Connection,
    name: &str,
    availability: &WeeklyAvailability,
) -> anyhow::Result<i64> {
    let availability_json = serde_json::to_string(availability)?;
    conn.execute(
        "INSERT INTO providers (name, availability) VALUES (?1, ?2)",
        params![name, availability_json],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn create_service(
    conn: &Connection,
    provider_id: i64,
    name: &str,
    duration_minutes: i64,
    price_cents: i64,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO services (provider_id, name, duration_minutes, price_cents) VALUES (?1, ?2, ?3, ?4)",
        params![provider_id, name, duration_minutes, price_cents],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_provider(conn: &Connection, id: i64) -> anyhow::Result<Option<Provider>> {
    let result = conn.query_row(
        "SELECT id, name, availability FROM providers WHERE id = ?1",
        params![id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    );

    match result {
        Ok((id, name, availability_json)) => {
            let availability: WeeklyAvailability =
                serde_json::from_str(&availability_json).unwrap_or_default();
            let services = services_for_provider(conn, id)?;
            Ok(Some(Provider {
                id,
                name,
                availability,
                services,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_providers(conn: &Connection) -> anyhow::Result<Vec<Provider>> {
    let mut stmt = conn.prepare("SELECT id, name, availability FROM providers ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut providers = vec![];
    for row in rows {
        let (id, name, availability_json) = row?;
        let availability: WeeklyAvailability =
            serde_json::from_str(&availability_json).unwrap_or_default();
        let services = services_for_provider(conn, id)?;
        providers.push(Provider {
            id,
            name,
            availability,
            services,
        });
    }
    Ok(providers)
}

pub fn count_providers(conn: &Connection) -> anyhow::Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM providers", [], |row| row.get(0))?;
    Ok(count)
}

fn services_for_provider(conn: &Connection, provider_id: i64) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, duration_minutes, price_cents FROM services
         WHERE provider_id = ?1 AND active = 1 ORDER BY name ASC",
    )?;
    let rows = stmt.query_map(params![provider_id], |row| {
        Ok(Service {
            id: row.get(0)?,
            name: row.get(1)?,
            duration_minutes: row.get(2)?,
            price_cents: row.get(3)?,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

// ── Appointments ──

// Returns the raw `rusqlite::Error` so callers can inspect SQLite error
// codes and classify busy/locked/constraint failures.
pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> rusqlite::Result<()> {
    let service_ids = serde_json::to_string(&appt.service_ids)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let hold_expires_at = appt.hold_expires_at.as_ref().map(fmt_dt);

    conn.execute(
        "INSERT INTO appointments
             (id, provider_id, service_ids, start_time, end_time,
              customer_name, customer_email, customer_phone, status,
              hold_expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            appt.id,
            appt.provider_id,
            service_ids,
            fmt_dt(&appt.start_time),
            fmt_dt(&appt.end_time),
            appt.customer_name,
            appt.customer_email,
            appt.customer_phone,
            appt.status.as_str(),
            hold_expires_at,
            fmt_dt(&appt.created_at),
            fmt_dt(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let result = conn.query_row(
        &format!("{SELECT_APPOINTMENT} WHERE id = ?1"),
        params![id],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appt) => Ok(Some(appt?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Non-cancelled appointments for one provider whose interval overlaps
/// `[start, end)` under half-open semantics.
pub fn get_overlapping(
    conn: &Connection,
    provider_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_APPOINTMENT}
         WHERE provider_id = ?1 AND status != 'cancelled'
           AND start_time < ?2 AND end_time > ?3
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(
        params![provider_id, fmt_dt(end), fmt_dt(start)],
        |row| Ok(parse_appointment_row(row)),
    )?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn get_upcoming_for_provider(
    conn: &Connection,
    provider_id: i64,
    after: &NaiveDateTime,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_APPOINTMENT}
         WHERE provider_id = ?1 AND status != 'cancelled' AND start_time >= ?2
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![provider_id, fmt_dt(after)], |row| {
        Ok(parse_appointment_row(row))
    })?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
    contact: Option<&ContactInfo>,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    let count = match contact {
        Some(c) => conn.execute(
            "UPDATE appointments
             SET status = ?1, customer_name = ?2, customer_email = ?3,
                 customer_phone = ?4, hold_expires_at = NULL, updated_at = ?5
             WHERE id = ?6",
            params![status.as_str(), c.name, c.email, c.phone, now, id],
        )?,
        None => conn.execute(
            "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?,
    };
    Ok(count > 0)
}

/// Sweeps pending holds whose TTL elapsed. Run inside every scheduling
/// transaction so an abandoned hold never blocks a slot past its TTL.
pub fn cancel_expired_holds(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE appointments SET status = 'cancelled', updated_at = ?1
         WHERE status = 'pending' AND hold_expires_at IS NOT NULL AND hold_expires_at <= ?1",
        params![fmt_dt(now)],
    )?;
    Ok(count)
}

const SELECT_APPOINTMENT: &str = "SELECT id, provider_id, service_ids, start_time, end_time,
        customer_name, customer_email, customer_phone, status,
        hold_expires_at, created_at, updated_at
 FROM appointments";

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let service_ids_json: String = row.get(2)?;
    let start_time: String = row.get(3)?;
    let end_time: String = row.get(4)?;
    let status_str: String = row.get(8)?;
    let hold_expires_at: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(Appointment {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        service_ids: serde_json::from_str(&service_ids_json).unwrap_or_default(),
        start_time: parse_dt(&start_time),
        end_time: parse_dt(&end_time),
        customer_name: row.get(5)?,
        customer_email: row.get(6)?,
        customer_phone: row.get(7)?,
        status: AppointmentStatus::parse(&status_str),
        hold_expires_at: hold_expires_at.as_deref().map(parse_dt),
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

// ── Conversations ──

pub fn get_conversation(conn: &Connection, session_id: &str) -> anyhow::Result<Option<Conversation>> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    let result = conn.query_row(
        "SELECT session_id, data, last_activity, expires_at
         FROM conversations WHERE session_id = ?1 AND expires_at > ?2",
        params![session_id, now],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    );

    match result {
        Ok((session_id, data_json, last_activity, expires_at)) => {
            let data: serde_json::Value =
                serde_json::from_str(&data_json).unwrap_or(serde_json::json!({}));

            let messages: Vec<ConversationMessage> = data
                .get("messages")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let draft: Option<BookingDraft> = data
                .get("draft")
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            let pending_appointment_id = data
                .get("pending_appointment_id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            Ok(Some(Conversation {
                session_id,
                messages,
                draft,
                pending_appointment_id,
                last_activity: parse_dt(&last_activity),
                expires_at: parse_dt(&expires_at),
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_conversation(conn: &Connection, conv: &Conversation) -> anyhow::Result<()> {
    let data = serde_json::json!({
        "messages": conv.messages,
        "draft": conv.draft,
        "pending_appointment_id": conv.pending_appointment_id,
    });
    let data_json = serde_json::to_string(&data)?;

    conn.execute(
        "INSERT INTO conversations (session_id, data, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(session_id) DO UPDATE SET
           data = excluded.data,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![
            conv.session_id,
            data_json,
            fmt_dt(&conv.last_activity),
            fmt_dt(&conv.expires_at)
        ],
    )?;
    Ok(())
}
