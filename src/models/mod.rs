pub mod appointment;
pub mod availability;
pub mod conversation;
pub mod intent;
pub mod provider;

pub use appointment::{Appointment, AppointmentStatus, ContactInfo};
pub use availability::{DayWindow, WeeklyAvailability};
pub use conversation::{BookingDraft, Conversation, ConversationMessage};
pub use intent::Intent;
pub use provider::{Provider, Service};
