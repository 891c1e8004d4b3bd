//! Heuristics module: tour construction, local search and packing.

pub mod construction;
pub mod local_search;
pub mod packing;

pub use construction::*;
pub use local_search::*;
pub use packing::*;
