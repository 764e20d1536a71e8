pub mod stats;
pub mod technical;

pub use stats::{MultipleSnapshot, MultipleStatsEstimator, MultipleStatsParameters, MultiplesStats};
pub use technical::{ReturnWindows, TechnicalSnapshot};
