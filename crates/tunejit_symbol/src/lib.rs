pub mod tracker;

pub use tracker::{GlobalMapping, SymbolTracker, TrackedFunction};
