use std::sync::Arc;

use anyhow::Result;

use autopost::config::Config;
use autopost::credentials::{self, CredentialSelector, JsonFileUsageStore};

use super::{clock, open_collaborators};

/// Print today's progress of every account against the goal
pub async fn progress(config: Config) -> Result<()> {
    let clock = clock(&config);
    let today = clock.today();
    let collaborators = open_collaborators(&config, clock)?;

    let goal = match collaborators.settings.fetch_goal().await {
        Ok(Some(goal)) => goal,
        Ok(None) => config.runner.default_goal,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read goal, using default");
            config.runner.default_goal
        }
    };
    let accounts = collaborators.accounts.fetch_accounts().await?;
    let records = collaborators.progress.fetch_today().await?;

    println!("Progress for {today} (goal {goal} per account)");
    println!("==========================================");

    if accounts.is_empty() {
        println!("No accounts registered.");
        return Ok(());
    }

    let mut total = 0;
    for account in &accounts {
        let done = records
            .iter()
            .find(|r| r.account == account.username)
            .map(|r| r.success_count)
            .unwrap_or(0);
        total += done;
        let marker = if done >= goal { "done" } else { "" };
        println!("  {:<24} {:>4} / {:<4} {marker}", account.username, done, goal);
    }
    println!("\nTotal published today: {total}");

    Ok(())
}

/// Print today's usage of every configured credential
pub async fn usage(config: Config) -> Result<()> {
    let clock = clock(&config);
    let today = clock.today();
    let loaded = credentials::load_from_env(
        &config.generator.credential_env_prefix,
        config.generator.credential_slots,
    );
    let selector = CredentialSelector::load(
        loaded,
        Arc::new(JsonFileUsageStore::new(&config.storage.usage_path)),
        clock,
        config.generator.daily_limit,
    )
    .await?;

    println!("Credential usage for {today} (limit {})", selector.daily_limit());
    println!("==========================================");

    if selector.is_empty() {
        println!("No credentials configured.");
        return Ok(());
    }

    let mut available = 0;
    for (id, usage) in selector.snapshot().await {
        let left = selector.daily_limit().saturating_sub(usage.count);
        available += left;
        println!("  {id:<24} {:>4} used, {left:>4} left", usage.count);
    }
    println!("\nGenerations left today: {available}");

    Ok(())
}
