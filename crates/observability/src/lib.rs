//! Tracing setup shared by binaries, tests and benches.

mod subscriber;

pub use subscriber::{DEFAULT_FILTER, LogFormat, init, init_for_tests, init_with};
