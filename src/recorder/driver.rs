//! Session event loop
//!
//! Merges operator intents and clock ticks into one ordered stream of
//! [`ControlEvent`]s for the controller. Intents already queued when a tick
//! is due are handled first, so a stop that races the timer deadline is
//! recorded as an operator stop.

use super::clock::Ticker;
use super::controller::{ControlEvent, SessionController};
use super::error::{SessionError, SessionResult};
use super::state::SessionState;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Operator intents accepted while a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Stop,
    Cancel,
}

impl From<Intent> for ControlEvent {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::Stop => ControlEvent::Stop,
            Intent::Cancel => ControlEvent::Cancel,
        }
    }
}

/// Create the intent channel feeding [`run_session`]
pub fn intent_channel() -> (mpsc::Sender<Intent>, mpsc::Receiver<Intent>) {
    mpsc::channel(16)
}

/// Drive a confirmed session until it leaves `Countdown` and `Recording`.
///
/// Returns the state the session settled in. Intents that do not apply to the
/// current state are logged and dropped; any other controller error ends the
/// loop. A closed intent channel leaves the session running on ticks alone.
pub async fn run_session(
    controller: &mut SessionController,
    intents: &mut mpsc::Receiver<Intent>,
    ticker: &mut Ticker,
) -> SessionResult<SessionState> {
    loop {
        let state = controller.state();
        if !matches!(state, SessionState::Countdown | SessionState::Recording) {
            return Ok(state);
        }

        let event = tokio::select! {
            biased;
            Some(intent) = intents.recv() => ControlEvent::from(intent),
            _ = ticker.tick() => ControlEvent::Tick,
        };

        let span = controller.span();
        match controller.handle(event).instrument(span).await {
            Ok(()) => {}
            Err(err @ SessionError::InvalidTransition { .. }) => {
                tracing::warn!("Ignoring {:?}: {}", event, err);
            }
            Err(err) => return Err(err),
        }
    }
}
