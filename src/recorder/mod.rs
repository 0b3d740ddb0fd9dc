//! Recording session module
//!
//! This module implements the two-camera session architecture:
//! - CameraDevice trait for the capture devices
//! - SessionController to drive the session state machine
//! - Session event loop merging operator intents with clock ticks

pub mod channel;
pub mod clock;
pub mod controller;
pub mod destination;
pub mod driver;
pub mod error;
pub mod state;

pub use channel::{CameraDevice, ChannelLabel, ConfigMap, DeviceError, DeviceResult};
pub use clock::{Clock, ManualClock, SystemClock, Ticker};
pub use controller::{
    ControlEvent, ControllerEvent, ControllerOptions, SessionController, StartCheck,
};
pub use driver::{intent_channel, run_session, Intent};
pub use error::{SessionError, SessionResult};
pub use state::{
    ChannelIssue, Session, SessionSettings, SessionState, SessionView, StopMethod, StopReason,
};
