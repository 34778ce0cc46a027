pub mod ai;
pub mod conversation;
pub mod directory;
pub mod scheduling;
