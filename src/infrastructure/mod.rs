pub mod in_memory;
pub mod stub_ledger;
pub mod verifier;
