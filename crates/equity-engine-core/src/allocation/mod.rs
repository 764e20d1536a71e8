pub mod discrete;

pub use discrete::{to_money, AllocationResult, DiscreteAllocator};
