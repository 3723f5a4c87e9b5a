//! Metric definitions for the extension subsystem.
//!
//! Only the `metrics` facade is used here. The embedding browser installs
//! whatever recorder it exports with; without one every macro is a no-op.
//!
//! ```rust,ignore
//! use browseros_metrics::{counter, extensions};
//!
//! counter!(extensions::MAINTENANCE_CYCLES_TOTAL).increment(1);
//! ```

mod definitions;

pub use definitions::*;

pub use metrics::{counter, gauge, histogram};
