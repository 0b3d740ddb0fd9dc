//! Recording session controller
//!
//! Owns the session state machine and the two camera devices. User intents
//! and clock ticks arrive as [`ControlEvent`]s; start and stop commands are
//! dispatched to both cameras at once and joined before the state advances.

use super::channel::{CameraDevice, ChannelLabel, DeviceError, DeviceResult};
use super::clock::Clock;
use super::destination::{existing_outputs, validate_destination};
use super::error::{SessionError, SessionResult};
use super::state::{
    ChannelIssue, CountdownState, Session, SessionSettings, SessionState, SessionView, StopMethod,
    StopReason,
};
use crate::report::{write_report, SessionReport};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

/// Default bound on waiting for both cameras to acknowledge a stop
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A camera owned by the controller
pub type BoxedCamera = Box<dyn CameraDevice>;

type SharedCamera = Arc<Mutex<BoxedCamera>>;

/// Input to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// One clock period elapsed
    Tick,
    /// Operator asked to stop recording
    Stop,
    /// Operator asked to abandon the session
    Cancel,
}

/// Outcome of a start intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartCheck {
    /// Destination is clear; `confirm` starts the session
    Ready,
    /// These files exist and would be overwritten; `confirm` or `cancel`
    OverwriteRisk(Vec<String>),
}

/// Events emitted to presentation layers
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Seconds left before the cameras start
    Countdown { remaining_secs: u32 },
    /// Recording progress, once per tick
    Progress {
        elapsed_secs: u64,
        remaining_secs: Option<u64>,
    },
    /// A channel problem that did not stop the session
    Warning {
        channel: ChannelLabel,
        issue: ChannelIssue,
    },
    ReportWritten(PathBuf),
    ReportFailed(String),
}

/// Controller options
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Bound on the stop join
    pub stop_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Drives one recording session at a time over two cameras
pub struct SessionController {
    /// Primary at index 0, secondary at index 1
    cameras: [SharedCamera; 2],

    /// Device names captured at construction
    device_names: [String; 2],

    clock: Arc<dyn Clock>,

    options: ControllerOptions,

    /// Current session, absent while idle
    session: Option<Session>,

    /// Present only while counting down
    countdown: Option<CountdownState>,

    /// Files reported by the last start intent
    overwrite_candidates: Vec<String>,

    /// Operator accepted overwriting `overwrite_candidates`
    overwrite_accepted: bool,

    /// Report of the completed session
    report: Option<SessionReport>,

    /// Last report write failure, cleared on successful retry
    report_error: Option<String>,

    /// Span carrying the session id and name
    span: tracing::Span,

    event_tx: broadcast::Sender<ControllerEvent>,
}

impl SessionController {
    /// Create a controller over a primary and a secondary camera
    pub fn new(
        primary: BoxedCamera,
        secondary: BoxedCamera,
        clock: Arc<dyn Clock>,
        options: ControllerOptions,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let device_names = [primary.name().to_string(), secondary.name().to_string()];
        tracing::info!(
            "Session controller ready: primary={}, secondary={}",
            primary.id(),
            secondary.id()
        );
        Self {
            cameras: [Arc::new(Mutex::new(primary)), Arc::new(Mutex::new(secondary))],
            device_names,
            clock,
            options,
            session: None,
            countdown: None,
            overwrite_candidates: Vec::new(),
            overwrite_accepted: false,
            report: None,
            report_error: None,
            span: tracing::Span::none(),
            event_tx,
        }
    }

    /// Current state; `Idle` when no session exists
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.event_tx.subscribe()
    }

    /// Read-only access to the current session
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn countdown(&self) -> Option<CountdownState> {
        self.countdown
    }

    /// Report of the last completed session
    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    pub fn report_error(&self) -> Option<&str> {
        self.report_error.as_deref()
    }

    /// Span of the current session; instrument calls into the controller with it
    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }

    /// Projection for presentation layers
    pub fn view(&self) -> Option<SessionView> {
        let session = self.session.as_ref()?;
        let elapsed_secs = self.elapsed_secs();
        let recording = session.state == SessionState::Recording;
        let remaining_secs = match (session.stop_method, elapsed_secs) {
            (StopMethod::Timer { duration_secs }, Some(elapsed)) if recording => {
                Some(u64::from(duration_secs).saturating_sub(elapsed))
            }
            _ => None,
        };
        Some(SessionView {
            session_id: session.id,
            name: session.name.clone(),
            state: session.state,
            stop_method: session.stop_method,
            countdown_remaining_secs: self.countdown.map(|c| c.remaining_secs),
            elapsed_secs,
            remaining_secs,
            overwrite_candidates: self.overwrite_candidates.clone(),
        })
    }

    /// Seconds since recording started, frozen at the session end.
    ///
    /// Rounded to the nearest second: ticks land a few milliseconds either
    /// side of each boundary, and the timer deadline is checked on ticks.
    fn elapsed_secs(&self) -> Option<u64> {
        let session = self.session.as_ref()?;
        let start = session.started_at?;
        let end = session.ended_at.unwrap_or_else(|| self.clock.now());
        Some(rounded_secs(end - start))
    }

    /// First channel whose device is still held by an unfinished stop
    fn busy_channel(&self) -> Option<ChannelLabel> {
        ChannelLabel::ALL
            .into_iter()
            .find(|label| self.cameras[label.index()].try_lock().is_err())
    }

    /// Start intent: validate the destination and move to `AwaitingDestination`.
    ///
    /// Invalid input leaves the controller `Idle`. A new session may also be
    /// requested once the previous one is `Completed` or `Aborted`.
    pub fn request_start(&mut self, settings: SessionSettings) -> SessionResult<StartCheck> {
        let state = self.state();
        if state != SessionState::Idle && !state.is_terminal() {
            return Err(SessionError::InvalidTransition {
                state,
                intent: "start a session",
            });
        }
        if let Some(channel) = self.busy_channel() {
            tracing::warn!("{} camera has not finished its last stop", channel);
            return Err(SessionError::ChannelBusy { channel });
        }

        settings.validate()?;
        validate_destination(&settings.save_path, &settings.name)?;

        let device_names = [self.device_names[0].as_str(), self.device_names[1].as_str()];
        let mut session = Session::new(&settings, device_names);
        session.state = SessionState::AwaitingDestination;

        self.span = tracing::info_span!("session", id = %session.id, name = %session.name);
        let _entered = self.span.clone().entered();
        tracing::info!("Session requested in {:?}", session.save_path);

        self.countdown = None;
        self.report = None;
        self.report_error = None;
        self.overwrite_candidates = existing_outputs(&settings);
        self.overwrite_accepted = false;
        self.session = Some(session);
        self.emit(ControllerEvent::StateChanged {
            from: state,
            to: SessionState::AwaitingDestination,
        });

        if self.overwrite_candidates.is_empty() {
            Ok(StartCheck::Ready)
        } else {
            tracing::warn!(
                "Session would overwrite existing files: {}",
                self.overwrite_candidates.join(", ")
            );
            Ok(StartCheck::OverwriteRisk(self.overwrite_candidates.clone()))
        }
    }

    /// Operator agreed to overwrite the files listed by `request_start`
    pub fn accept_overwrite(&mut self) -> SessionResult<()> {
        self.require_state(SessionState::AwaitingDestination, "accept an overwrite")?;
        self.overwrite_accepted = true;
        Ok(())
    }

    /// Confirm the destination and begin the session.
    ///
    /// Enters `Countdown`, or `Recording` directly when there is no delay.
    /// Fails with `OverwriteRisk`, leaving the state unchanged, while files
    /// at risk have not been accepted.
    pub async fn confirm(&mut self) -> SessionResult<()> {
        let session = self.require_state(SessionState::AwaitingDestination, "confirm")?;

        if !self.overwrite_candidates.is_empty() && !self.overwrite_accepted {
            return Err(SessionError::OverwriteRisk {
                files: self.overwrite_candidates.clone(),
            });
        }

        // The directory may have changed while the operator was deciding.
        let revalidated = validate_destination(&session.save_path, &session.name);
        let delay = session.countdown_delay_secs;
        if let Err(err) = revalidated {
            tracing::error!("Destination no longer usable: {}", err);
            self.set_state(SessionState::Aborted);
            return Err(err);
        }

        if !self.overwrite_candidates.is_empty() {
            tracing::info!("Overwrite confirmed for: {}", self.overwrite_candidates.join(", "));
            self.overwrite_candidates.clear();
        }

        if delay > 0 {
            self.countdown = Some(CountdownState::new(delay));
            self.set_state(SessionState::Countdown);
            self.emit(ControllerEvent::Countdown {
                remaining_secs: delay,
            });
            Ok(())
        } else {
            self.enter_recording().await
        }
    }

    /// Feed one event into the state machine
    pub async fn handle(&mut self, event: ControlEvent) -> SessionResult<()> {
        match event {
            ControlEvent::Tick => self.on_tick().await,
            ControlEvent::Stop => self.on_stop().await,
            ControlEvent::Cancel => self.on_cancel().await,
        }
    }

    async fn on_tick(&mut self) -> SessionResult<()> {
        match self.state() {
            SessionState::Countdown => self.tick_countdown().await,
            SessionState::Recording => self.tick_recording().await,
            state => {
                tracing::trace!("Tick ignored while {}", state);
                Ok(())
            }
        }
    }

    async fn on_stop(&mut self) -> SessionResult<()> {
        match self.state() {
            SessionState::Recording => self.stop(StopReason::Operator).await,
            SessionState::Stopping | SessionState::Completed => {
                tracing::debug!("Stop ignored, session already stopping");
                Ok(())
            }
            state => Err(SessionError::InvalidTransition {
                state,
                intent: "stop",
            }),
        }
    }

    async fn on_cancel(&mut self) -> SessionResult<()> {
        match self.state() {
            SessionState::AwaitingDestination => {
                tracing::info!("Session start cancelled, back to idle");
                self.set_state(SessionState::Idle);
                self.session = None;
                self.overwrite_candidates.clear();
                self.overwrite_accepted = false;
                Ok(())
            }
            SessionState::Countdown => {
                tracing::info!("Countdown cancelled, no camera was started");
                self.countdown = None;
                self.set_state(SessionState::Aborted);
                Ok(())
            }
            // Cancelling a running recording is a manual stop.
            SessionState::Recording => self.stop(StopReason::Operator).await,
            state => Err(SessionError::InvalidTransition {
                state,
                intent: "cancel",
            }),
        }
    }

    async fn tick_countdown(&mut self) -> SessionResult<()> {
        let Some(countdown) = self.countdown.as_mut() else {
            return Ok(());
        };
        countdown.remaining_secs = countdown.remaining_secs.saturating_sub(1);
        let remaining_secs = countdown.remaining_secs;
        tracing::debug!("Countdown: {}s remaining", remaining_secs);
        self.emit(ControllerEvent::Countdown { remaining_secs });

        if remaining_secs == 0 {
            self.countdown = None;
            self.enter_recording().await
        } else {
            Ok(())
        }
    }

    async fn tick_recording(&mut self) -> SessionResult<()> {
        let Some(elapsed_secs) = self.elapsed_secs() else {
            return Ok(());
        };
        let timer = self
            .session
            .as_ref()
            .and_then(|s| s.stop_method.timer_duration_secs());
        let remaining_secs = timer.map(|t| u64::from(t).saturating_sub(elapsed_secs));
        self.emit(ControllerEvent::Progress {
            elapsed_secs,
            remaining_secs,
        });

        match timer {
            Some(duration) if elapsed_secs >= u64::from(duration) => {
                tracing::info!("Timer reached {}s, stopping", duration);
                self.stop(StopReason::Timer).await
            }
            _ => Ok(()),
        }
    }

    /// `Recording` entry: start both cameras at once
    async fn enter_recording(&mut self) -> SessionResult<()> {
        let paths = match self.session.as_ref() {
            Some(session) => session.channels.clone().map(|c| c.output_file),
            None => return Ok(()),
        };

        tracing::info!("Starting both cameras");
        let dispatched_at = self.clock.now();
        let handles = ChannelLabel::ALL.map(|label| {
            let camera = self.cameras[label.index()].clone();
            let clock = self.clock.clone();
            let path = paths[label.index()].clone();
            tokio::spawn(
                async move {
                    let Ok(mut camera) = camera.try_lock_owned() else {
                        return (clock.now(), Err(DeviceError::Busy));
                    };
                    let at = clock.now();
                    let result = camera.start_recording(&path).await;
                    (at, result)
                }
                .instrument(tracing::debug_span!(parent: &self.span, "start", channel = %label)),
            )
        });

        let [primary, secondary] = handles;
        let results = [
            join_device(primary, self.clock.as_ref()).await,
            join_device(secondary, self.clock.as_ref()).await,
        ];

        let failures: Vec<(ChannelLabel, DeviceError)> = ChannelLabel::ALL
            .iter()
            .filter_map(|label| match &results[label.index()].1 {
                Err(err) => Some((*label, err.clone())),
                Ok(()) => None,
            })
            .collect();

        if !failures.is_empty() {
            return Err(self.abort_partial_start(&results, failures).await);
        }

        let mut configs = Vec::with_capacity(2);
        for camera in &self.cameras {
            configs.push(camera.lock().await.snapshot_config());
        }

        if let Some(session) = self.session.as_mut() {
            for (label, config) in ChannelLabel::ALL.into_iter().zip(configs) {
                let channel = session.channel_mut(label);
                channel.started_at = Some(results[label.index()].0);
                channel.config_at_start = config;
            }
            session.started_at = Some(dispatched_at);
            tracing::info!(
                "Recording '{}' to {:?} and {:?}",
                session.name,
                paths[0],
                paths[1]
            );
        }
        self.set_state(SessionState::Recording);
        Ok(())
    }

    /// Stop whichever camera did start and abort the session
    async fn abort_partial_start(
        &mut self,
        results: &[(DateTime<Local>, DeviceResult<()>); 2],
        failures: Vec<(ChannelLabel, DeviceError)>,
    ) -> SessionError {
        for (label, err) in &failures {
            tracing::error!("{} camera failed to start: {}", label, err);
        }

        let started: Vec<ChannelLabel> = ChannelLabel::ALL
            .into_iter()
            .filter(|label| results[label.index()].1.is_ok())
            .collect();
        let handles: Vec<_> = started
            .iter()
            .map(|label| (*label, self.spawn_stop(*label)))
            .collect();
        let deadline = Instant::now() + self.options.stop_timeout;
        for (label, handle) in handles {
            match timeout_at(deadline, handle).await {
                Ok(Ok((_, Ok(())))) => {
                    tracing::info!("Stopped {} camera after failed start", label)
                }
                Ok(Ok((_, Err(err)))) => {
                    tracing::warn!("Best-effort stop of {} camera failed: {}", label, err)
                }
                Ok(Err(err)) => {
                    tracing::warn!("Best-effort stop of {} camera panicked: {}", label, err)
                }
                Err(_) => tracing::warn!("Best-effort stop of {} camera timed out", label),
            }
        }

        if let Some(session) = self.session.as_mut() {
            for (label, err) in &failures {
                session.channel_mut(*label).issues.push(ChannelIssue::StartFailed {
                    message: err.to_string(),
                });
            }
            for label in &started {
                session.channel_mut(*label).started_at = Some(results[label.index()].0);
            }
            session.started_at = None;
        }
        self.set_state(SessionState::Aborted);

        SessionError::PartialStartFailure { failures }
    }

    fn spawn_stop(&self, label: ChannelLabel) -> JoinHandle<(DateTime<Local>, DeviceResult<()>)> {
        let camera = self.cameras[label.index()].clone();
        let clock = self.clock.clone();
        tokio::spawn(
            async move {
                let mut camera = camera.lock_owned().await;
                let result = camera.stop_recording().await;
                (clock.now(), result)
            }
            .instrument(tracing::debug_span!(parent: &self.span, "stop", channel = %label)),
        )
    }

    /// `Stopping` entry: stop both cameras, then complete the session
    async fn stop(&mut self, reason: StopReason) -> SessionResult<()> {
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            session.stop_reason = Some(reason);
            session.ended_at = Some(now);
        }
        self.set_state(SessionState::Stopping);
        tracing::info!("Stopping both cameras ({})", reason);

        let handles = ChannelLabel::ALL.map(|label| self.spawn_stop(label));
        let deadline = Instant::now() + self.options.stop_timeout;
        let timeout_ms = self.options.stop_timeout.as_millis() as u64;

        let mut outcomes = Vec::with_capacity(2);
        for (label, handle) in ChannelLabel::ALL.into_iter().zip(handles) {
            let outcome = match timeout_at(deadline, handle).await {
                Ok(Ok((at, Ok(())))) => (at, false, None),
                Ok(Ok((at, Err(err)))) => {
                    tracing::warn!("{} camera reported an error while stopping: {}", label, err);
                    (at, false, Some(ChannelIssue::StopFailed { message: err.to_string() }))
                }
                Ok(Err(err)) => {
                    tracing::warn!("{} camera stop task failed: {}", label, err);
                    (
                        self.clock.now(),
                        true,
                        Some(ChannelIssue::StopFailed { message: err.to_string() }),
                    )
                }
                Err(_) => {
                    tracing::warn!(
                        "{} camera did not acknowledge stop within {} ms",
                        label,
                        timeout_ms
                    );
                    (self.clock.now(), true, Some(ChannelIssue::StopTimeout { timeout_ms }))
                }
            };
            outcomes.push((label, outcome));
        }

        // A camera still stuck in its stop task holds the lock; its stop
        // snapshot is left empty rather than waiting on it.
        let mut configs = Vec::with_capacity(2);
        for camera in &self.cameras {
            configs.push(camera.try_lock().ok().map(|c| c.snapshot_config()));
        }

        let mut warnings = Vec::new();
        if let Some(session) = self.session.as_mut() {
            for ((label, (at, best_effort, issue)), config) in outcomes.into_iter().zip(configs) {
                let channel = session.channel_mut(label);
                channel.ended_at = Some(at);
                channel.ended_best_effort = best_effort;
                if let Some(config) = config {
                    channel.config_at_stop = config;
                }
                if let Some(issue) = issue {
                    channel.issues.push(issue.clone());
                    warnings.push((label, issue));
                }
            }
        }
        for (channel, issue) in warnings {
            self.emit(ControllerEvent::Warning { channel, issue });
        }

        self.complete()
    }

    /// `Stopping → Completed`: build and write the report
    fn complete(&mut self) -> SessionResult<()> {
        self.set_state(SessionState::Completed);
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };

        tracing::info!(
            "Session '{}' completed after {}s",
            session.name,
            session.elapsed_secs().unwrap_or(0)
        );
        self.report = Some(SessionReport::from_session(session));
        self.write_report()
    }

    /// Retry writing the report after a failed write
    pub fn retry_report_write(&mut self) -> SessionResult<()> {
        if self.state() != SessionState::Completed || self.report.is_none() {
            return Err(SessionError::InvalidTransition {
                state: self.state(),
                intent: "write the report",
            });
        }
        self.write_report()
    }

    fn write_report(&mut self) -> SessionResult<()> {
        let (Some(session), Some(report)) = (self.session.as_ref(), self.report.as_ref()) else {
            return Ok(());
        };
        let path = session.data_file_path();

        match write_report(report, &path) {
            Ok(()) => {
                tracing::info!("Session report saved to {:?}", path);
                self.report_error = None;
                self.emit(ControllerEvent::ReportWritten(path));
                Ok(())
            }
            Err(err) => {
                tracing::error!("Recording kept but report could not be written: {}", err);
                self.report_error = Some(err.to_string());
                self.emit(ControllerEvent::ReportFailed(err.to_string()));
                Err(err.into())
            }
        }
    }

    fn require_state(
        &self,
        expected: SessionState,
        intent: &'static str,
    ) -> SessionResult<&Session> {
        match self.session.as_ref() {
            Some(session) if session.state == expected => Ok(session),
            _ => Err(SessionError::InvalidTransition {
                state: self.state(),
                intent,
            }),
        }
    }

    fn set_state(&mut self, to: SessionState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let from = session.state;
        session.state = to;
        tracing::info!(parent: &self.span, "State: {} -> {}", from, to);
        let _ = self.event_tx.send(ControllerEvent::StateChanged { from, to });
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Whole seconds in `delta`, rounded to nearest
fn rounded_secs(delta: chrono::Duration) -> u64 {
    ((delta.num_milliseconds().max(0) + 500) / 1000) as u64
}

/// Await a device task, folding a panic into a device error
async fn join_device(
    handle: JoinHandle<(DateTime<Local>, DeviceResult<()>)>,
    clock: &dyn Clock,
) -> (DateTime<Local>, DeviceResult<()>) {
    match handle.await {
        Ok(outcome) => outcome,
        Err(err) => (
            clock.now(),
            Err(DeviceError::CaptureError(format!("device task failed: {err}"))),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraStats, SimulatedBehavior, SimulatedCamera};
    use crate::recorder::clock::ManualClock;
    use chrono::TimeZone;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    struct Harness {
        controller: SessionController,
        clock: Arc<ManualClock>,
        primary: CameraStats,
        secondary: CameraStats,
    }

    fn harness_with(
        primary: SimulatedBehavior,
        secondary: SimulatedBehavior,
        stop_timeout: Duration,
    ) -> Harness {
        let start = Local.with_ymd_and_hms(2026, 10, 15, 14, 30, 5).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cam1 = SimulatedCamera::new("cam0", "LightRoom").with_behavior(primary);
        let cam2 = SimulatedCamera::new("cam1", "DarkRoom").with_behavior(secondary);
        let (primary, secondary) = (cam1.stats(), cam2.stats());
        let controller = SessionController::new(
            Box::new(cam1),
            Box::new(cam2),
            clock.clone(),
            ControllerOptions { stop_timeout },
        );
        Harness {
            controller,
            clock,
            primary,
            secondary,
        }
    }

    fn harness() -> Harness {
        harness_with(Default::default(), Default::default(), DEFAULT_STOP_TIMEOUT)
    }

    impl Harness {
        async fn tick(&mut self) {
            self.clock.advance_secs(1);
            self.controller.handle(ControlEvent::Tick).await.unwrap();
        }

        fn assert_started_invariant(&self) {
            let session = self.controller.session().unwrap();
            assert_eq!(session.started_at.is_some(), session.state.has_started());
        }
    }

    fn settings(dir: &Path) -> SessionSettings {
        SessionSettings::new("experiment_001", dir)
    }

    fn timer_settings(dir: &Path, duration_secs: u32) -> SessionSettings {
        settings(dir).with_stop_method(StopMethod::Timer { duration_secs })
    }

    #[tokio::test]
    async fn test_invalid_destination_stays_idle() {
        let dir = tempdir().unwrap();
        let mut h = harness();

        let err = h
            .controller
            .request_start(SessionSettings::new("", dir.path()))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidDestination(_)));
        assert_eq!(h.controller.state(), SessionState::Idle);

        let err = h
            .controller
            .request_start(SessionSettings::new("run", dir.path().join("missing")))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidDestination(_)));
        assert_eq!(h.controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_timer_rejected() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        let err = h
            .controller
            .request_start(timer_settings(dir.path(), 45))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidSettings(_)));
        assert_eq!(h.controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_overwrite_requires_confirmation() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("experiment_001_camera_1.h264"), "old").unwrap();
        let mut h = harness();

        let check = h.controller.request_start(settings(dir.path())).unwrap();
        assert_eq!(
            check,
            StartCheck::OverwriteRisk(vec!["experiment_001_camera_1.h264".to_string()])
        );

        // ticks and stop intents do not move past the prompt
        h.tick().await;
        assert!(h.controller.handle(ControlEvent::Stop).await.is_err());
        assert_eq!(h.controller.state(), SessionState::AwaitingDestination);
        assert_eq!(h.primary.start_calls(), 0);

        // nor does a confirm before the overwrite is accepted
        let err = h.controller.confirm().await.unwrap_err();
        match err {
            SessionError::OverwriteRisk { files } => {
                assert_eq!(files, vec!["experiment_001_camera_1.h264".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.controller.state(), SessionState::AwaitingDestination);
        assert_eq!(h.primary.start_calls(), 0);

        h.controller.accept_overwrite().unwrap();
        h.controller.confirm().await.unwrap();
        assert_eq!(h.controller.state(), SessionState::Recording);
    }

    #[tokio::test]
    async fn test_accept_overwrite_outside_prompt_rejected() {
        let mut h = harness();
        let err = h.controller.accept_overwrite().unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_destination_removed_before_confirm_aborts() {
        let dir = tempdir().unwrap();
        let save_path = dir.path().join("takes");
        fs::create_dir(&save_path).unwrap();
        let mut h = harness();

        h.controller.request_start(settings(&save_path)).unwrap();
        fs::remove_dir(&save_path).unwrap();
        let err = h.controller.confirm().await.unwrap_err();

        assert!(matches!(err, SessionError::InvalidDestination(_)));
        assert_eq!(h.controller.state(), SessionState::Aborted);
        assert_eq!(h.primary.start_calls(), 0);
        assert_eq!(h.secondary.start_calls(), 0);
        assert!(h.controller.session().unwrap().started_at.is_none());
        assert!(h.controller.report().is_none());
        h.assert_started_invariant();
    }

    #[tokio::test]
    async fn test_overwrite_cancel_returns_to_idle() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("experiment_001_data.txt"), "old").unwrap();
        let mut h = harness();

        h.controller.request_start(settings(dir.path())).unwrap();
        h.controller.handle(ControlEvent::Cancel).await.unwrap();

        assert_eq!(h.controller.state(), SessionState::Idle);
        assert!(h.controller.session().is_none());
        assert_eq!(fs::read_to_string(dir.path().join("experiment_001_data.txt")).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_countdown_reaches_recording_on_last_tick() {
        for delay in [1u32, 3, 20] {
            let dir = tempdir().unwrap();
            let mut h = harness();
            h.controller
                .request_start(settings(dir.path()).with_countdown(delay))
                .unwrap();
            h.controller.confirm().await.unwrap();
            assert_eq!(h.controller.state(), SessionState::Countdown);

            for _ in 0..delay - 1 {
                h.tick().await;
                assert_eq!(h.controller.state(), SessionState::Countdown);
                assert_eq!(h.primary.start_calls(), 0);
                h.assert_started_invariant();
            }
            h.tick().await;
            assert_eq!(h.controller.state(), SessionState::Recording);
            assert_eq!(h.primary.start_calls(), 1);
            assert_eq!(h.secondary.start_calls(), 1);
            h.assert_started_invariant();

            // further ticks never restart the cameras
            h.tick().await;
            assert_eq!(h.primary.start_calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_zero_delay_starts_immediately() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        h.controller.request_start(settings(dir.path())).unwrap();
        h.controller.confirm().await.unwrap();

        assert_eq!(h.controller.state(), SessionState::Recording);
        assert!(h.controller.countdown().is_none());
        let session = h.controller.session().unwrap();
        assert_eq!(session.started_at, Some(h.clock.now()));
        assert!(session.channels.iter().all(|c| !c.config_at_start.is_empty()));
        assert!(dir.path().join("experiment_001_camera_1.h264").exists());
        assert!(dir.path().join("experiment_001_camera_2.h264").exists());
    }

    #[tokio::test]
    async fn test_cancel_during_countdown_aborts_without_starting() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        h.controller
            .request_start(settings(dir.path()).with_countdown(10))
            .unwrap();
        h.controller.confirm().await.unwrap();
        h.tick().await;
        h.tick().await;
        h.controller.handle(ControlEvent::Cancel).await.unwrap();

        assert_eq!(h.controller.state(), SessionState::Aborted);
        assert_eq!(h.primary.start_calls(), 0);
        assert_eq!(h.secondary.start_calls(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        h.assert_started_invariant();

        // terminal
        h.tick().await;
        assert_eq!(h.controller.state(), SessionState::Aborted);
    }

    #[tokio::test]
    async fn test_timer_stops_automatically() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        h.controller
            .request_start(timer_settings(dir.path(), 60))
            .unwrap();
        h.controller.confirm().await.unwrap();

        for _ in 0..59 {
            h.tick().await;
            assert_eq!(h.controller.state(), SessionState::Recording);
        }
        assert_eq!(h.controller.view().unwrap().remaining_secs, Some(1));
        h.tick().await;

        assert_eq!(h.controller.state(), SessionState::Completed);
        let session = h.controller.session().unwrap();
        assert_eq!(session.stop_reason, Some(StopReason::Timer));
        assert_eq!(session.elapsed_secs(), Some(60));
        assert_eq!(h.primary.stop_calls(), 1);
        assert_eq!(h.secondary.stop_calls(), 1);
        assert!(dir.path().join("experiment_001_data.txt").exists());
    }

    #[tokio::test]
    async fn test_timer_tolerates_tick_jitter() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        let mut events = h.controller.subscribe();
        h.controller
            .request_start(timer_settings(dir.path(), 60))
            .unwrap();
        h.controller.confirm().await.unwrap();

        // every tick lands a little before the second boundary
        h.clock.advance(Duration::from_millis(997));
        h.controller.handle(ControlEvent::Tick).await.unwrap();
        let mut progress = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ControllerEvent::Progress { elapsed_secs, remaining_secs } = event {
                progress.push((elapsed_secs, remaining_secs));
            }
        }
        assert_eq!(progress, vec![(1, Some(59))]);

        for _ in 1..59 {
            h.clock.advance(Duration::from_millis(997));
            h.controller.handle(ControlEvent::Tick).await.unwrap();
            assert_eq!(h.controller.state(), SessionState::Recording);
        }
        h.clock.advance(Duration::from_millis(997));
        h.controller.handle(ControlEvent::Tick).await.unwrap();

        assert_eq!(h.controller.state(), SessionState::Completed);
        let session = h.controller.session().unwrap();
        assert_eq!(session.stop_reason, Some(StopReason::Timer));
        assert_eq!(h.controller.view().unwrap().elapsed_secs, Some(60));
    }

    #[tokio::test]
    async fn test_manual_stop_in_timer_mode() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        h.controller
            .request_start(timer_settings(dir.path(), 600))
            .unwrap();
        h.controller.confirm().await.unwrap();
        h.tick().await;
        h.controller.handle(ControlEvent::Stop).await.unwrap();

        assert_eq!(h.controller.state(), SessionState::Completed);
        assert_eq!(h.controller.session().unwrap().stop_reason, Some(StopReason::Operator));

        // a late stop is a no-op
        h.controller.handle(ControlEvent::Stop).await.unwrap();
        assert_eq!(h.primary.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_example_session_report() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        h.controller
            .request_start(settings(dir.path()).with_countdown(20))
            .unwrap();
        h.controller.confirm().await.unwrap();
        for _ in 0..20 {
            h.tick().await;
        }
        assert_eq!(h.clock.now().format("%H:%M:%S").to_string(), "14:30:25");
        assert_eq!(h.controller.state(), SessionState::Recording);

        for _ in 0..315 {
            h.tick().await;
        }
        h.controller.handle(ControlEvent::Stop).await.unwrap();

        let text = fs::read_to_string(dir.path().join("experiment_001_data.txt")).unwrap();
        assert!(text.contains("Total Duration: 00:05:15\n"));
        assert!(text.contains("Elapsed Seconds: 315\n"));
        assert!(text.contains("Start Time: 14:30:25\n"));
        assert!(text.contains("End Time: 14:35:40\n"));
        assert!(h.controller.report().is_some());
        h.assert_started_invariant();
    }

    #[tokio::test]
    async fn test_partial_start_failure_aborts_and_stops_other() {
        let dir = tempdir().unwrap();
        let mut h = harness_with(
            Default::default(),
            SimulatedBehavior {
                fail_start: Some("no sensor".to_string()),
                ..Default::default()
            },
            DEFAULT_STOP_TIMEOUT,
        );
        h.controller.request_start(settings(dir.path())).unwrap();
        let err = h.controller.confirm().await.unwrap_err();

        assert_eq!(err.failed_channels(), vec![ChannelLabel::Secondary]);
        assert_eq!(h.controller.state(), SessionState::Aborted);
        assert_eq!(h.primary.stop_calls(), 1);
        assert_eq!(h.secondary.stop_calls(), 0);
        assert!(!dir.path().join("experiment_001_data.txt").exists());
        assert!(h.controller.report().is_none());
        h.assert_started_invariant();

        let session = h.controller.session().unwrap();
        assert!(matches!(
            session.channel(ChannelLabel::Secondary).issues[..],
            [ChannelIssue::StartFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_stop_timeout_completes_with_best_effort() {
        let dir = tempdir().unwrap();
        let mut h = harness_with(
            Default::default(),
            SimulatedBehavior {
                stop_latency: Duration::from_secs(30),
                ..Default::default()
            },
            Duration::from_millis(50),
        );
        let mut events = h.controller.subscribe();
        h.controller.request_start(settings(dir.path())).unwrap();
        h.controller.confirm().await.unwrap();
        h.tick().await;
        h.controller.handle(ControlEvent::Stop).await.unwrap();

        assert_eq!(h.controller.state(), SessionState::Completed);
        let session = h.controller.session().unwrap();
        let slow = session.channel(ChannelLabel::Secondary);
        assert!(slow.ended_best_effort);
        assert!(slow.ended_at.is_some());
        assert_eq!(slow.issues, vec![ChannelIssue::StopTimeout { timeout_ms: 50 }]);
        assert!(!session.channel(ChannelLabel::Primary).ended_best_effort);

        let text = fs::read_to_string(session.data_file_path()).unwrap();
        assert!(text.contains("End Time Status: best-effort"));

        let mut saw_warning = false;
        while let Ok(event) = events.try_recv() {
            if let ControllerEvent::Warning { channel, .. } = event {
                assert_eq!(channel, ChannelLabel::Secondary);
                saw_warning = true;
            }
        }
        assert!(saw_warning);
    }

    #[tokio::test]
    async fn test_stuck_stop_blocks_next_session() {
        let dir = tempdir().unwrap();
        let mut h = harness_with(
            Default::default(),
            SimulatedBehavior {
                stop_latency: Duration::from_secs(3600),
                ..Default::default()
            },
            Duration::from_millis(50),
        );
        h.controller.request_start(settings(dir.path())).unwrap();
        h.controller.confirm().await.unwrap();
        h.controller.handle(ControlEvent::Stop).await.unwrap();
        assert_eq!(h.controller.state(), SessionState::Completed);

        let err = h
            .controller
            .request_start(SessionSettings::new("experiment_002", dir.path()))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::ChannelBusy {
                channel: ChannelLabel::Secondary
            }
        ));
        assert_eq!(h.controller.state(), SessionState::Completed);
        assert_eq!(h.secondary.start_calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_error_attached_to_channel() {
        let dir = tempdir().unwrap();
        let mut h = harness_with(
            SimulatedBehavior {
                fail_stop: Some("encoder flush failed".to_string()),
                ..Default::default()
            },
            Default::default(),
            DEFAULT_STOP_TIMEOUT,
        );
        h.controller.request_start(settings(dir.path())).unwrap();
        h.controller.confirm().await.unwrap();
        h.controller.handle(ControlEvent::Stop).await.unwrap();

        let report = h.controller.report().unwrap();
        let cam1 = report.camera_section(ChannelLabel::Primary).unwrap();
        assert_eq!(
            cam1.get("Issue"),
            Some("stop failed: Capture error: encoder flush failed")
        );
    }

    #[tokio::test]
    async fn test_report_write_failure_keeps_completed() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        h.controller.request_start(settings(dir.path())).unwrap();
        h.controller.confirm().await.unwrap();

        // make the report path unwritable by occupying it with a directory
        let report_path = dir.path().join("experiment_001_data.txt");
        fs::create_dir(&report_path).unwrap();
        let err = h.controller.handle(ControlEvent::Stop).await.unwrap_err();

        assert!(matches!(err, SessionError::Report(_)));
        assert_eq!(h.controller.state(), SessionState::Completed);
        assert!(h.controller.report_error().is_some());

        fs::remove_dir(&report_path).unwrap();
        h.controller.retry_report_write().unwrap();
        assert!(report_path.is_file());
        assert!(h.controller.report_error().is_none());
    }

    #[tokio::test]
    async fn test_cameras_start_concurrently() {
        let dir = tempdir().unwrap();
        let latency = SimulatedBehavior {
            start_latency: Duration::from_millis(200),
            ..Default::default()
        };
        let mut h = harness_with(latency.clone(), latency, DEFAULT_STOP_TIMEOUT);
        h.controller.request_start(settings(dir.path())).unwrap();

        let before = std::time::Instant::now();
        h.controller.confirm().await.unwrap();
        assert!(before.elapsed() < Duration::from_millis(390));

        let a = h.primary.snapshot().start_entered_at[0];
        let b = h.secondary.snapshot().start_entered_at[0];
        let skew = if a > b { a - b } else { b - a };
        assert!(skew < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_panicked_device_task_uses_session_clock() {
        let clock = ManualClock::new(Local.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap());
        let handle: JoinHandle<(DateTime<Local>, DeviceResult<()>)> =
            tokio::spawn(async { panic!("driver crashed") });

        let (at, result) = join_device(handle, &clock).await;
        assert_eq!(at, clock.now());
        assert!(matches!(result, Err(DeviceError::CaptureError(ref m)) if m.contains("panic")));
    }

    #[tokio::test]
    async fn test_new_session_after_completion() {
        let dir = tempdir().unwrap();
        let mut h = harness();
        h.controller.request_start(settings(dir.path())).unwrap();
        assert!(h.controller.request_start(settings(dir.path())).is_err());
        h.controller.confirm().await.unwrap();
        h.controller.handle(ControlEvent::Stop).await.unwrap();
        let first_id = h.controller.session().unwrap().id;

        let check = h
            .controller
            .request_start(SessionSettings::new("experiment_002", dir.path()))
            .unwrap();
        assert_eq!(check, StartCheck::Ready);
        assert_ne!(h.controller.session().unwrap().id, first_id);
        assert!(h.controller.report().is_none());
    }
}
