//! Analysis modules.
//!
//! Everything here is pure computation over a loaded snapshot: no I/O, no
//! rounding. Presentation happens in `report`.

pub mod aggregator;
pub mod anomaly;
pub mod distribution;
pub mod risk;
pub mod stats;
pub mod temporal;

pub use aggregator::*;
