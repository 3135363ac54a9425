pub mod invoice;
pub mod money;
pub mod policy;
pub mod ports;
pub mod session;
pub mod snapshot;
