pub mod appointments;
pub mod availability;
pub mod business;
pub mod display;
pub mod history;
pub mod notify;
pub mod overlap;
pub mod reconciliation;
pub mod slots;
