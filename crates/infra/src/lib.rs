//! Infrastructure layer: stream storage, command dispatch, sequences, config,
//! and the engine services built on them.

pub mod alerts;
pub mod command_dispatcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orders;
pub mod sequence;
pub mod store;

mod integration_tests;

pub use config::EngineConfig;
pub use engine::StockEngine;
pub use error::{EngineError, EngineResult};
