#![allow(clippy::unwrap_used, reason = "test infrastructure can panic on errors")]

pub mod fake_server;
pub mod logging;
pub mod process;
