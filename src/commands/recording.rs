//! Recording commands
//!
//! Builds a controller over the configured cameras and runs one session to
//! completion. Prompting and progress output stay with the caller.

use crate::capture::{SimulatedBehavior, SimulatedCamera};
use crate::config::AppConfig;
use crate::recorder::{
    run_session, ControllerEvent, Intent, SessionController, SessionState, SessionView,
    StartCheck, SystemClock, Ticker,
};
use crate::report::ReportSummary;
use crate::utils::error::AppResult;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

/// Result of a recording command
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub state: SessionState,
    pub view: Option<SessionView>,

    /// Set when the report was written
    pub report_path: Option<PathBuf>,
    pub summary: Option<ReportSummary>,

    /// Set when the session completed but its report could not be written
    pub report_error: Option<String>,
}

/// One session over the configured cameras
pub struct SessionRunner {
    controller: SessionController,
    ticker: Ticker,
}

impl SessionRunner {
    /// Create a runner over two simulated cameras named from the config
    pub fn simulated(config: &AppConfig) -> Self {
        Self::simulated_with(config, SimulatedBehavior::default(), SimulatedBehavior::default())
    }

    pub fn simulated_with(
        config: &AppConfig,
        primary: SimulatedBehavior,
        secondary: SimulatedBehavior,
    ) -> Self {
        let primary = SimulatedCamera::new("cam0", &config.cameras.primary).with_behavior(primary);
        let secondary =
            SimulatedCamera::new("cam1", &config.cameras.secondary).with_behavior(secondary);
        let controller = SessionController::new(
            Box::new(primary),
            Box::new(secondary),
            Arc::new(SystemClock),
            config.controller_options(),
        );
        Self {
            controller,
            ticker: Ticker::new(config.tick_interval()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.controller.subscribe()
    }

    /// Validate the destination and report any files at risk
    pub fn prepare(&mut self, config: &AppConfig, name: &str) -> AppResult<StartCheck> {
        let check = self.controller.request_start(config.session_settings(name))?;
        Ok(check)
    }

    /// Accept overwriting the files reported by `prepare`
    pub fn accept_overwrite(&mut self) -> AppResult<()> {
        self.controller.accept_overwrite()?;
        Ok(())
    }

    /// Back out of a prepared session
    pub async fn decline(&mut self) -> AppResult<()> {
        let span = self.controller.span();
        self.controller
            .handle(crate::recorder::ControlEvent::Cancel)
            .instrument(span)
            .await?;
        Ok(())
    }

    /// Confirm the prepared session and drive it until it ends
    pub async fn run(&mut self, mut intents: mpsc::Receiver<Intent>) -> AppResult<RecordOutcome> {
        let span = self.controller.span();
        self.controller.confirm().instrument(span).await?;

        // The ticker period restarts at confirmation.
        self.ticker.reset();
        let result = run_session(&mut self.controller, &mut intents, &mut self.ticker).await;

        match result {
            // The recording is kept; the outcome carries the report error.
            Ok(_) | Err(crate::recorder::SessionError::Report(_)) => Ok(self.outcome()),
            Err(err) => Err(err.into()),
        }
    }

    /// Retry a failed report write
    pub fn retry_report(&mut self) -> AppResult<RecordOutcome> {
        self.controller.retry_report_write()?;
        Ok(self.outcome())
    }

    fn outcome(&self) -> RecordOutcome {
        let written = self.controller.state() == SessionState::Completed
            && self.controller.report_error().is_none();
        RecordOutcome {
            state: self.controller.state(),
            view: self.controller.view(),
            report_path: self
                .controller
                .session()
                .filter(|_| written)
                .map(|s| s.data_file_path()),
            summary: self.controller.report().and_then(|r| r.summary().ok()),
            report_error: self.controller.report_error().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::intent_channel;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_manual_session_end_to_end() {
        let dir = tempdir().unwrap();
        let config = AppConfig::from_toml(&format!(
            "save_path = {:?}\ntick_interval_ms = 50\n\n[cameras]\nprimary = \"Left\"\n",
            dir.path()
        ))
        .unwrap();

        let mut runner = SessionRunner::simulated(&config);
        assert_eq!(runner.prepare(&config, "manual").unwrap(), StartCheck::Ready);

        let (tx, rx) = intent_channel();
        tx.send(Intent::Stop).await.unwrap();
        let outcome = runner.run(rx).await.unwrap();

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.report_path, Some(dir.path().join("manual_data.txt")));
        assert!(outcome.report_error.is_none());

        let summary = outcome.summary.unwrap();
        assert_eq!(summary.stop_method, "Manual");
        assert_eq!(summary.camera_files[0], "manual_camera_1.h264");
        let text = std::fs::read_to_string(dir.path().join("manual_data.txt")).unwrap();
        assert!(text.contains("CAMERA 1 (Left)"));
        assert!(text.contains("CAMERA 2 (DarkRoom)"));
    }

    #[tokio::test]
    async fn test_start_failure_surfaces_as_error() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.save_path = dir.path().to_path_buf();

        let mut runner = SessionRunner::simulated_with(
            &config,
            SimulatedBehavior {
                fail_start: Some("busy".to_string()),
                ..Default::default()
            },
            SimulatedBehavior::default(),
        );
        runner.prepare(&config, "broken").unwrap();
        let (_tx, rx) = intent_channel();
        let err = runner.run(rx).await.unwrap_err();

        let response: crate::utils::error::ErrorResponse = err.into();
        assert_eq!(response.code, "PARTIAL_START_FAILURE");
    }

    #[tokio::test]
    async fn test_decline_overwrite() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("again_data.txt"), "keep").unwrap();
        let mut config = AppConfig::default();
        config.save_path = dir.path().to_path_buf();

        let mut runner = SessionRunner::simulated(&config);
        let check = runner.prepare(&config, "again").unwrap();
        assert_eq!(check, StartCheck::OverwriteRisk(vec!["again_data.txt".to_string()]));
        runner.decline().await.unwrap();
        assert_eq!(runner.controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_run_requires_accepted_overwrite() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("again_data.txt"), "old").unwrap();
        let mut config = AppConfig::default();
        config.save_path = dir.path().to_path_buf();

        let mut runner = SessionRunner::simulated(&config);
        runner.prepare(&config, "again").unwrap();
        let (_tx, rx) = intent_channel();
        let response: crate::utils::error::ErrorResponse =
            runner.run(rx).await.unwrap_err().into();
        assert_eq!(response.code, "OVERWRITE_RISK");
        assert_eq!(runner.controller.state(), SessionState::AwaitingDestination);

        runner.accept_overwrite().unwrap();
        let (tx, rx) = intent_channel();
        tx.send(Intent::Stop).await.unwrap();
        let outcome = runner.run(rx).await.unwrap();
        assert_eq!(outcome.state, SessionState::Completed);
        let text = std::fs::read_to_string(dir.path().join("again_data.txt")).unwrap();
        assert!(text.contains("RECORDING SESSION DATA"));
    }
}
