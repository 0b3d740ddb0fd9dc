//! Camera device implementations
//!
//! Real camera drivers live outside this crate; this module provides the
//! simulated device used by the CLI and the test suite.

pub mod simulated;

pub use simulated::{CallLog, CameraStats, SimulatedBehavior, SimulatedCamera};
