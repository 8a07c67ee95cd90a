//! Utilities shared by the Hiroba binaries and test suites.

pub mod logger;
pub mod time;
