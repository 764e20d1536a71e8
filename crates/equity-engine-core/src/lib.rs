pub mod allocation;
pub mod backtest;
pub mod builder;
pub mod config;
pub mod data;
pub mod error;
pub mod growth;
pub mod multiples;
pub mod optimizer;
pub mod panel;
pub mod series;
pub mod signals;
pub mod types;
pub mod universe;

pub use error::EngineError;
pub use types::*;

/// Standard result type for all engine operations
pub type EngineResult<T> = Result<T, EngineError>;
