//! Post-run hook
//!
//! After a live run the links it published can be handed to an external
//! program, for example one that submits them to a search console for
//! indexing. The links are written to a JSON file grouped by account and the
//! program receives the file path as its last argument.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::HooksConfig;
use crate::error::{Error, Result};
use crate::models::PublishResult;
use crate::utils::truncate_text;

/// Links of one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountLinks {
    pub username: String,
    pub links: Vec<String>,
}

/// File handed to the post-run command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkExport {
    pub run_id: String,
    pub exported_at: DateTime<Utc>,
    /// Accounts with at least one link, by username
    pub accounts: Vec<AccountLinks>,
}

impl LinkExport {
    /// Group `results` by account, keeping publish order within an account
    pub fn from_results(run_id: impl Into<String>, results: &[PublishResult]) -> Self {
        let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for result in results {
            grouped
                .entry(result.account.as_str())
                .or_default()
                .push(result.published_url.clone());
        }

        Self {
            run_id: run_id.into(),
            exported_at: Utc::now(),
            accounts: grouped
                .into_iter()
                .map(|(username, links)| AccountLinks {
                    username: username.to_string(),
                    links,
                })
                .collect(),
        }
    }

    pub fn link_count(&self) -> usize {
        self.accounts.iter().map(|a| a.links.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Exit of a finished post-run command
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

/// External command run with the exported links
#[derive(Debug, Clone)]
pub struct PostRunHook {
    program: String,
    args: Vec<String>,
    export_path: PathBuf,
    timeout: Duration,
}

impl PostRunHook {
    /// Hook from configuration, if a command is configured
    pub fn from_config(config: &HooksConfig) -> Option<Self> {
        let program = config.post_run_command.as_deref()?.trim();
        if program.is_empty() {
            return None;
        }
        Some(Self {
            program: program.to_string(),
            args: config.post_run_args.clone(),
            export_path: config.export_path.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Write `export` and run the command on it
    ///
    /// A non-zero exit or a timeout is an error; on timeout the child is
    /// killed.
    pub async fn run(&self, export: &LinkExport) -> Result<HookOutcome> {
        self.write_export(export).await?;

        info!(
            program = %self.program,
            accounts = export.accounts.len(),
            links = export.link_count(),
            path = %self.export_path.display(),
            "Running post-run hook"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&self.export_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = command
            .spawn()
            .map_err(|e| Error::with_source(format!("failed to start '{}'", self.program), e))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(program = %self.program, timeout = ?self.timeout, "Post-run hook timed out");
                return Err(Error::other(format!(
                    "post-run hook '{}' timed out after {:?}",
                    self.program, self.timeout
                )));
            }
        };

        let outcome = HookOutcome {
            exit_code: output.status.code(),
            duration: start.elapsed(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(stdout = %truncate_text(&outcome.stdout, 500), "Post-run hook output");

        if !output.status.success() {
            return Err(Error::other(format!(
                "post-run hook '{}' exited with {:?}: {}",
                self.program,
                outcome.exit_code,
                truncate_text(outcome.stderr.trim(), 500)
            )));
        }

        info!(duration_ms = outcome.duration.as_millis() as u64, "Post-run hook finished");
        Ok(outcome)
    }

    async fn write_export(&self, export: &LinkExport) -> Result<()> {
        if let Some(parent) = self.export_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.export_path, serde_json::to_vec_pretty(export)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(account: &str, n: u32) -> PublishResult {
        PublishResult {
            account: account.into(),
            keyword: format!("kw{n}"),
            title: format!("title {n}"),
            published_url: format!("https://{account}.example/?p={n}"),
            timestamp: Utc::now(),
        }
    }

    fn hook(dir: &Path, args: &[&str], timeout_secs: u64) -> PostRunHook {
        PostRunHook::from_config(&HooksConfig {
            post_run_command: Some("sh".into()),
            post_run_args: args.iter().map(|a| a.to_string()).collect(),
            export_path: dir.join("out").join("links.json"),
            timeout_secs,
        })
        .unwrap()
    }

    #[test]
    fn test_export_groups_by_account() {
        let export = LinkExport::from_results(
            "run-1",
            &[result("b", 1), result("a", 2), result("b", 3)],
        );

        assert_eq!(export.link_count(), 3);
        assert_eq!(export.accounts[0].username, "a");
        assert_eq!(
            export.accounts[1].links,
            vec!["https://b.example/?p=1", "https://b.example/?p=3"]
        );
        assert!(LinkExport::from_results("run-2", &[]).is_empty());
    }

    #[test]
    fn test_no_hook_without_command() {
        assert!(PostRunHook::from_config(&HooksConfig::default()).is_none());

        let config = HooksConfig {
            post_run_command: Some("   ".into()),
            ..Default::default()
        };
        assert!(PostRunHook::from_config(&config).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_export_path() {
        let dir = tempfile::tempdir().unwrap();
        let hook = hook(dir.path(), &["-c", "cp \"$0\" \"$0.seen\""], 10);
        let export = LinkExport::from_results("run-1", &[result("a", 1)]);

        let outcome = hook.run(&export).await.unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        let copied = std::fs::read_to_string(dir.path().join("out").join("links.json.seen")).unwrap();
        let parsed: LinkExport = serde_json::from_str(&copied).unwrap();
        assert_eq!(parsed, export);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let hook = hook(dir.path(), &["-c", "echo refused >&2; exit 3"], 10);

        let err = hook
            .run(&LinkExport::from_results("run-1", &[result("a", 1)]))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Some(3)"), "{message}");
        assert!(message.contains("refused"), "{message}");
        assert!(hook.export_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let mut hook = hook(dir.path(), &["-c", "sleep 5"], 10);
        hook.timeout = Duration::from_millis(100);

        let started = Instant::now();
        let err = hook
            .run(&LinkExport::from_results("run-1", &[result("a", 1)]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
