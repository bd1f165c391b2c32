//! Shared integration-test harness: a throwaway database, an in-process
//! router client, and a capture hook on the audit log channel

pub mod test_app;

pub use test_app::*;
