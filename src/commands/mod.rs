//! Command handlers
//!
//! These are the operations behind the CLI subcommands.

pub mod destination;
pub mod recording;
pub mod report;

pub use destination::{check_destination, DestinationCheck};
pub use recording::{RecordOutcome, SessionRunner};
pub use report::{inspect_report, InspectedReport};
