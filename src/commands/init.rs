use std::path::PathBuf;

use anyhow::{Context, Result};

use autopost::config::{Config, StorageBackend};
use autopost::models::Account;
use autopost::storage::SqliteStore;

use super::{clock, open_collaborators};

/// Options of the `init` command
#[derive(Debug, Clone, Default)]
pub struct InitParams {
    /// Text file with one keyword per line (SQLite backend)
    pub keywords: Option<PathBuf>,

    /// JSON array of `{username, password, link}` (SQLite backend)
    pub accounts: Option<PathBuf>,

    /// Per-account daily goal to store (SQLite backend)
    pub goal: Option<u32>,
}

/// Prepare the store and today's zero progress rows
pub async fn init(config: Config, params: InitParams) -> Result<()> {
    let clock = clock(&config);

    println!("Initializing {:?} backend", config.storage.backend);
    println!("==========================");

    if config.storage.backend == StorageBackend::Sqlite {
        let store = SqliteStore::new(&config.storage.sqlite_path, clock.clone())
            .context("Failed to open SQLite store")?;
        println!("Database: {}", config.storage.sqlite_path.display());

        if let Some(path) = &params.accounts {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read accounts file: {}", path.display()))?;
            let accounts: Vec<Account> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse accounts file: {}", path.display()))?;
            for account in &accounts {
                store.upsert_account(account)?;
            }
            println!("Accounts registered: {}", accounts.len());
        }

        if let Some(path) = &params.keywords {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read keywords file: {}", path.display()))?;
            let added = store.add_keywords(content.lines())?;
            println!("Keywords added: {added}");
        }

        if let Some(goal) = params.goal {
            store.set_goal(goal)?;
            println!("Goal set: {goal}");
        }
    } else if params.accounts.is_some() || params.keywords.is_some() || params.goal.is_some() {
        anyhow::bail!("--accounts, --keywords and --goal are only supported with the sqlite backend");
    }

    let collaborators = open_collaborators(&config, clock)?;
    let usernames: Vec<String> = collaborators
        .accounts
        .fetch_accounts()
        .await?
        .into_iter()
        .map(|a| a.username)
        .collect();
    collaborators.progress.ensure_today(&usernames).await?;
    println!("Progress rows ready for {} accounts", usernames.len());

    Ok(())
}
