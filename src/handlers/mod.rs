pub mod appointments;
pub mod barbers;
pub mod chat;
pub mod health;
