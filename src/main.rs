//! Duocam CLI
//!
//! ```bash
//! duocam record session_01 --countdown 10      # stop with Enter
//! duocam record session_02 --timer 600 --yes   # stop after ten minutes
//! duocam inspect ./session_01_data.txt
//! duocam check-destination session_03 -s /data
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use duocam::cli::{Cli, Commands, DestinationArgs, InspectArgs, RecordArgs};
use duocam::commands::{check_destination, inspect_report, RecordOutcome, SessionRunner};
use duocam::config::AppConfig;
use duocam::recorder::{intent_channel, ControllerEvent, Intent, SessionState, StartCheck};
use std::io::{BufRead, Write};
use std::process::ExitCode;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    duocam::init_tracing(cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Commands::Record(args) => {
            args.apply(&mut config);
            config.validate().context("invalid settings")?;
            run_record(&config, &args).await
        }
        Commands::Inspect(args) => run_inspect(&args),
        Commands::CheckDestination(args) => {
            args.apply(&mut config);
            run_check_destination(&config, &args)
        }
    }
}

async fn run_record(config: &AppConfig, args: &RecordArgs) -> Result<()> {
    let mut runner = SessionRunner::simulated(config);

    if let StartCheck::OverwriteRisk(files) = runner.prepare(config, &args.name)? {
        println!("These files already exist and will be overwritten:");
        for file in &files {
            println!("  {file}");
        }
        if !args.yes && !confirm("Overwrite? [y/N] ")? {
            runner.decline().await?;
            bail!("session cancelled, existing files kept");
        }
        runner.accept_overwrite()?;
    }

    let (tx, rx) = intent_channel();
    spawn_intent_sources(tx);
    spawn_progress(runner.subscribe());

    if config.stop_method().timer_duration_secs().is_none() {
        println!("Press Enter to stop recording, or type 'c' then Enter to cancel a countdown.");
    }

    let mut outcome = runner.run(rx).await?;
    if outcome.report_error.is_some() {
        eprintln!("Report could not be written, retrying once");
        outcome = runner.retry_report()?;
    }
    print_outcome(&outcome, args.json)
}

/// Ask a yes/no question on stdin
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Enter stops, `c` cancels, Ctrl-C cancels (a stop once recording)
fn spawn_intent_sources(tx: mpsc::Sender<Intent>) {
    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if ctrl_c_tx.send(Intent::Cancel).await.is_err() {
                break;
            }
        }
    });

    // Blocking reads on a plain thread so a pending read never holds up
    // runtime shutdown.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let intent = match line.trim() {
                "c" | "cancel" => Intent::Cancel,
                _ => Intent::Stop,
            };
            if tx.blocking_send(intent).is_err() {
                break;
            }
        }
    });
}

fn spawn_progress(mut events: tokio::sync::broadcast::Receiver<ControllerEvent>) {
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ControllerEvent::Countdown { remaining_secs } if remaining_secs > 0 => {
                    println!("Starting in {remaining_secs}s");
                }
                ControllerEvent::StateChanged { to: SessionState::Recording, .. } => {
                    println!("Recording");
                }
                ControllerEvent::Progress {
                    elapsed_secs,
                    remaining_secs,
                } => match remaining_secs {
                    Some(remaining) => println!("  {elapsed_secs}s elapsed, {remaining}s left"),
                    None => println!("  {elapsed_secs}s elapsed"),
                },
                ControllerEvent::Warning { channel, issue } => {
                    eprintln!("Warning: {channel} camera: {issue}");
                }
                _ => {}
            }
        }
    });
}

fn print_outcome(outcome: &RecordOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match outcome.state {
        SessionState::Completed => {
            if let Some(summary) = &outcome.summary {
                println!(
                    "Recorded '{}' for {} ({}s)",
                    summary.session_name, summary.total_duration, summary.elapsed_secs
                );
                for file in &summary.camera_files {
                    println!("  {file}");
                }
            }
            match (&outcome.report_path, &outcome.report_error) {
                (Some(path), _) => println!("Report: {}", path.display()),
                (None, Some(err)) => bail!("recording kept, report not written: {err}"),
                (None, None) => {}
            }
        }
        SessionState::Aborted => println!("Session aborted before recording"),
        state => println!("Session ended in state {state}"),
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let inspected = inspect_report(&args.report)
        .with_context(|| format!("reading {}", args.report.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inspected)?);
        return Ok(());
    }

    let summary = &inspected.summary;
    println!("Session:   {}", summary.session_name);
    println!("Saved to:  {}", summary.save_path);
    println!("Duration:  {} ({}s)", summary.total_duration, summary.elapsed_secs);
    println!("Stop:      {}", summary.stop_method);
    println!("Camera 1:  {}", summary.camera_files[0]);
    println!("Camera 2:  {}", summary.camera_files[1]);
    Ok(())
}

fn run_check_destination(config: &AppConfig, args: &DestinationArgs) -> Result<()> {
    let check = check_destination(config, &args.name)?;

    println!("Destination: {}", check.save_path.display());
    for file in &check.output_files {
        let marker = if check.overwrite_candidates.contains(file) {
            " (exists, will be overwritten)"
        } else {
            ""
        };
        println!("  {file}{marker}");
    }
    Ok(())
}
