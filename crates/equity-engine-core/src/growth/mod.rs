pub mod cagr;
pub mod table;

pub use cagr::{
    estimate_cagr, tempo, CagrEstimate, CagrHorizons, CagrRecord, GrowthLine, GrowthOrdering,
    DELAY_SENTINEL,
};
pub use table::{CagrTable, GrowthEstimator};
