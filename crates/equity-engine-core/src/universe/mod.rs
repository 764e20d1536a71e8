pub mod filter;

pub use filter::{Candidate, FilteredUniverse, UniverseFilter, UniverseParameters};
