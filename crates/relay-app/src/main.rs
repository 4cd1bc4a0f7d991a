//! Relay application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Build the shared context (router, batch scheduler, decision engine)
//! 3. Restore persisted decision state and start the background jobs
//! 4. Run the requested subcommand
//! 5. Shut the jobs down, flushing batches and saving state

mod cli;
mod simulated;
mod workload;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use relay_core::config::RelayConfig;
use relay_decision::JsonFilePersistence;
use relay_engine::{BackgroundJobs, Orchestrator, RelayContext, TaskOutcome};
use serde_json::Value;
use tokio::task::JoinSet;

use cli::{CliArgs, Command};
use simulated::SimulatedRemote;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing is installed; load errors are logged below.
    let config_file = args.resolve_config_path();
    let loaded = RelayConfig::load(&config_file);
    let config_level = loaded
        .as_ref()
        .map(|c| c.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(args.resolve_log_level(&config_level))
            }),
        )
        .init();

    tracing::info!("Starting Relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Err(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Using default configuration");
            RelayConfig::default()
        }
    };
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    match args.command.clone() {
        Command::Classify { category, action } => {
            let ctx = RelayContext::new(config, Arc::new(SimulatedRemote::new(Duration::ZERO)));
            let classification = ctx.classifier.classify(&category, &action);
            let recommendation = ctx
                .classifier
                .recommend_routing(&category, &serde_json::json!({ "action": action }));
            print_json(&serde_json::json!({
                "classification": classification,
                "recommendation": recommendation,
            }))?;
        }
        Command::Decide {
            category,
            action,
            context,
        } => {
            let context: Value = serde_json::from_str(&context)?;
            let remote = Arc::new(SimulatedRemote::new(Duration::ZERO));
            let (orchestrator, jobs) = start(config, remote).await?;
            let decision = orchestrator.decide(&category, &action, &context);
            print_json(&serde_json::to_value(&decision)?)?;
            jobs.shutdown().await;
        }
        Command::Simulate { tasks, latency_ms } => {
            let remote = Arc::new(SimulatedRemote::new(Duration::from_millis(latency_ms)));
            let (orchestrator, jobs) = start(config, Arc::clone(&remote)).await?;
            let orchestrator = Arc::new(orchestrator);
            simulate(Arc::clone(&orchestrator), tasks).await;

            let metrics = orchestrator.metrics();
            let report = orchestrator.check_target_performance();
            tracing::info!(
                remote_calls = remote.calls(),
                savings = metrics.savings_percentage,
                automation = metrics.automation_rate,
                "Simulation complete"
            );
            print_json(&serde_json::json!({
                "metrics": metrics,
                "performance": report,
                "remoteCalls": remote.calls(),
            }))?;
            jobs.shutdown().await;
        }
    }

    tracing::info!("Relay stopped");
    Ok(())
}

/// Build the context, restore persisted state and start the background jobs.
async fn start(
    config: RelayConfig,
    remote: Arc<SimulatedRemote>,
) -> Result<(Orchestrator, BackgroundJobs), Box<dyn std::error::Error>> {
    let mut builder = RelayContext::builder(config.clone(), remote);
    if config.persistence.enabled {
        let path = config.persistence_path();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(path = %parent.display(), error = %e, "Failed to create data directory");
                return Err(e.into());
            }
        }
        tracing::info!(path = %path.display(), "Decision state file");
        builder = builder.persistence(Arc::new(JsonFilePersistence::new(path)));
    }
    let ctx = builder.build();
    let orchestrator = Orchestrator::new(ctx.clone());
    if orchestrator.load_state().await {
        tracing::info!("Decision state restored");
    }
    let jobs = BackgroundJobs::start(&ctx);
    Ok((orchestrator, jobs))
}

/// Route the synthetic workload concurrently, then replay the decision
/// prompts and mark the automated answers as correct.
async fn simulate(orchestrator: Arc<Orchestrator>, count: usize) {
    let started = Instant::now();
    let mut set = JoinSet::new();
    for request in workload::generate(count) {
        let orchestrator = Arc::clone(&orchestrator);
        set.spawn(async move { orchestrator.process(request).await });
    }

    let (mut completed, mut awaiting, mut rejected, mut failed) = (0u64, 0u64, 0u64, 0u64);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(TaskOutcome::Completed { .. })) => completed += 1,
            Ok(Ok(TaskOutcome::AwaitingApproval { .. })) => awaiting += 1,
            Ok(Ok(TaskOutcome::Rejected { .. })) => rejected += 1,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Task failed");
                failed += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Task panicked");
                failed += 1;
            }
        }
    }
    tracing::info!(
        completed,
        awaiting,
        rejected,
        failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Workload routed"
    );

    for (category, action, context) in workload::decision_prompts() {
        let decision = orchestrator.decide(category, action, &context);
        if decision.is_automated() {
            orchestrator.record_feedback(decision.record_id, true);
        }
    }
}

fn print_json(value: &Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
