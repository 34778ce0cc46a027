use rusqlite::Connection;

use crate::db::queries;
use crate::models::{DayWindow, WeeklyAvailability};

fn window(start: &str, end: &str) -> Option<DayWindow> {
    Some(DayWindow {
        start: start.to_string(),
        end: end.to_string(),
    })
}

/// Seeds two demo barbers with services. No-op when providers already exist.
pub fn seed_demo_data(conn: &Connection) -> anyhow::Result<()> {
    if queries::count_providers(conn)? > 0 {
        tracing::info!("providers already present, skipping demo seed");
        return Ok(());
    }

    let alex_hours = WeeklyAvailability {
        monday: window("09:00", "17:00"),
        tuesday: window("09:00", "17:00"),
        wednesday: window("09:00", "17:00"),
        thursday: window("09:00", "17:00"),
        friday: window("09:00", "17:00"),
        saturday: window("10:00", "15:00"),
        sunday: None,
    };
    let alex = queries::create_provider(conn, "Alex Thompson", &alex_hours)?;
    queries::create_service(conn, alex, "Haircut", 30, 3000)?;
    queries::create_service(conn, alex, "Beard Trim", 30, 2000)?;
    queries::create_service(conn, alex, "Haircut & Beard", 60, 4500)?;

    let john_hours = WeeklyAvailability {
        monday: window("10:00", "18:00"),
        tuesday: window("10:00", "18:00"),
        wednesday: window("10:00", "18:00"),
        thursday: window("10:00", "18:00"),
        friday: window("10:00", "18:00"),
        saturday: None,
        sunday: None,
    };
    let john = queries::create_provider(conn, "John Smith", &john_hours)?;
    queries::create_service(conn, john, "Haircut", 30, 2800)?;
    queries::create_service(conn, john, "Hot Towel Shave", 30, 1800)?;

    tracing::info!("seeded demo barbers and services");
    Ok(())
}
