use std::sync::Arc;

use anyhow::{Context, Result};

use autopost::config::Config;
use autopost::credentials;
use autopost::hooks::{LinkExport, PostRunHook};
use autopost::runner::{assemble, RunMode, RunSettings};
use autopost::storage::{PublishLog, RecordingPublishLog};

use super::{clock, open_collaborators};

/// Options of the `run` command
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    /// Simulate publishing and keep every store untouched
    pub dry_run: bool,

    /// Per-account goal overriding the settings source
    pub goal: Option<u32>,
}

pub async fn run(config: Config, params: RunParams) -> Result<()> {
    config.validate()?;

    println!("Starting publishing run");
    println!("=======================");

    let clock = clock(&config);
    let prefix = &config.generator.credential_env_prefix;
    let loaded = credentials::load_from_env(prefix, config.generator.credential_slots);
    if loaded.is_empty() {
        anyhow::bail!(
            "No generation credentials found ({prefix}1..{prefix}{})",
            config.generator.credential_slots
        );
    }
    println!("Credentials: {}", loaded.len());

    let mode = if params.dry_run {
        println!("Mode: dry run (generation and publishing simulated, nothing persisted)");
        RunMode::DryRun
    } else {
        RunMode::Live
    };

    let mut collaborators = open_collaborators(&config, clock.clone())?;
    let hook = match mode {
        RunMode::Live => PostRunHook::from_config(&config.hooks),
        RunMode::DryRun => None,
    };
    let recording = hook.as_ref().map(|_| {
        let log = Arc::new(RecordingPublishLog::new(collaborators.publish_log.clone()));
        collaborators.publish_log = log.clone() as Arc<dyn PublishLog>;
        log
    });

    let mut settings = RunSettings::from_config(&config);
    settings.goal_override = params.goal;

    let runner = assemble(&config, collaborators, loaded, clock, mode, settings)
        .await
        .context("Failed to assemble run")?;
    let handle = runner.start();
    println!("Run id: {}", handle.run_id());

    let stop = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping run");
            stop.cancel();
        }
    });

    let run_id = handle.run_id().to_string();
    let summary = handle.wait().await?;

    println!("\nRun finished: {}", summary.stop_reason);
    println!("  Per-account goal:  {}", summary.target.per_account_goal);
    println!("  Remaining at start: {}", summary.target.global_goal);
    println!("  Sessions started:  {}", summary.sessions_started);
    println!("  Succeeded:         {}", summary.succeeded);
    println!("  Failed:            {}", summary.failed);
    println!("  Flushed:           {}", summary.flushed);
    if summary.pending_unflushed > 0 {
        println!("  Not flushed:       {}", summary.pending_unflushed);
    }
    println!("SUCCESS_COUNT: {}", summary.succeeded);

    if let (Some(hook), Some(recording)) = (hook, recording) {
        let export = LinkExport::from_results(run_id, &recording.recorded());
        if export.is_empty() {
            tracing::info!("No links published, skipping post-run hook");
        } else {
            // The run's results stand even when the hook fails
            match hook.run(&export).await {
                Ok(_) => println!("Post-run hook: {} links handed over", export.link_count()),
                Err(e) => {
                    tracing::error!(error = %e, "Post-run hook failed");
                    println!("Post-run hook failed: {e}");
                }
            }
        }
    }

    Ok(())
}
