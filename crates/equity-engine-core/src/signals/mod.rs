pub mod hpr;
pub mod macro_adjustment;

pub use hpr::{ExclusionReason, ExpectedReturnSignal, ReturnSignalBuilder, SignalContext, SignalParameters};
pub use macro_adjustment::{linear_adjust, LinearRamp, MacroAdjustmentEstimator, RatePenaltyParameters};
