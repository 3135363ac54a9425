pub mod agent;
pub mod authorization;
pub mod reconciliation;
pub mod sessions;
pub mod settlement;
