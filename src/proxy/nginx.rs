// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Local nginx control.
//!
//! Validation writes the candidate next to the live file and runs the configured
//! validate command (default `nginx -t -c {config}`), where `{config}` is replaced
//! by the candidate path. Apply replaces the live file atomically and runs the
//! reload command (default `nginx -s reload`).
//!
//! An empty command disables that step, which is how the status server runs
//! without a local nginx.

use super::ProxyControl;
use crate::constants::PROXY_CONFIG_PLACEHOLDER;
use crate::errors::ProxyError;
use crate::fsutil::atomic_write;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Drives nginx through its command line.
#[derive(Clone, Debug)]
pub struct NginxControl {
    pub config_path: PathBuf,
    pub validate_command: Vec<String>,
    pub reload_command: Vec<String>,
    pub timeout: Duration,
}

/// Outcome of a finished command.
struct CommandOutput {
    success: bool,
    detail: String,
}

impl NginxControl {
    fn config_dir(&self) -> &Path {
        self.config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Run `argv` under the configured timeout.
    ///
    /// `Ok(None)` means the command did not finish in time.
    async fn run(&self, argv: &[String]) -> std::io::Result<Option<CommandOutput>> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(Some(CommandOutput {
                success: true,
                detail: String::new(),
            }));
        };

        debug!(command = ?argv, "Running proxy command");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(output) => {
                let output = output?;
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let detail = if stderr.is_empty() {
                    String::from_utf8_lossy(&output.stdout).trim().to_string()
                } else {
                    stderr
                };
                Ok(Some(CommandOutput {
                    success: output.status.success(),
                    detail: if detail.is_empty() {
                        format!("exited with {}", output.status)
                    } else {
                        detail
                    },
                }))
            }
            Err(_) => Ok(None),
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Replace the placeholder in every argument with `path`.
#[must_use]
pub fn substitute_config_path(argv: &[String], path: &Path) -> Vec<String> {
    let path = path.display().to_string();
    argv.iter()
        .map(|arg| arg.replace(PROXY_CONFIG_PLACEHOLDER, &path))
        .collect()
}

/// Run blocking file work on the blocking pool.
async fn off_runtime<T, F>(path: &Path, work: F) -> Result<T, ProxyError>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let write_error = |reason: String| ProxyError::Write {
        path: path.display().to_string(),
        reason,
    };
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| write_error(format!("write task failed: {e}")))?
        .map_err(|e| write_error(e.to_string()))
}

#[async_trait]
impl ProxyControl for NginxControl {
    async fn validate(&self, config: &str) -> Result<(), ProxyError> {
        if self.validate_command.is_empty() {
            debug!("No validate command configured, skipping proxy validation");
            return Ok(());
        }

        let dir = self.config_dir().to_path_buf();
        let target = dir.clone();
        let contents = config.to_owned();
        let candidate = off_runtime(&dir, move || {
            std::fs::create_dir_all(&target)?;
            let mut candidate = NamedTempFile::new_in(&target)?;
            candidate.write_all(contents.as_bytes())?;
            candidate.as_file().sync_all()?;
            Ok(candidate)
        })
        .await?;

        let argv = substitute_config_path(&self.validate_command, candidate.path());
        match self.run(&argv).await {
            Ok(Some(output)) if output.success => Ok(()),
            Ok(Some(output)) => {
                warn!(detail = %output.detail, "Proxy rejected candidate configuration");
                Err(ProxyError::Validation {
                    reason: output.detail,
                })
            }
            Ok(None) => Err(ProxyError::Timeout {
                operation: "validate",
                timeout_ms: self.timeout_ms(),
            }),
            Err(e) => Err(ProxyError::Validation {
                reason: format!("failed to run {}: {e}", argv.join(" ")),
            }),
        }
    }

    async fn apply(&self, config: &str) -> Result<(), ProxyError> {
        let target = self.config_path.clone();
        let contents = config.to_owned();
        off_runtime(&self.config_path, move || atomic_write(&target, contents.as_bytes(), false))
            .await?;
        debug!(path = %self.config_path.display(), "Wrote proxy configuration");

        match self.run(&self.reload_command).await {
            Ok(Some(output)) if output.success => {
                info!(path = %self.config_path.display(), "Proxy reloaded");
                Ok(())
            }
            Ok(Some(output)) => Err(ProxyError::Reload {
                reason: output.detail,
            }),
            Ok(None) => Err(ProxyError::Timeout {
                operation: "reload",
                timeout_ms: self.timeout_ms(),
            }),
            Err(e) => Err(ProxyError::Reload {
                reason: format!("failed to run {}: {e}", self.reload_command.join(" ")),
            }),
        }
    }
}

#[cfg(test)]
#[path = "nginx_tests.rs"]
mod nginx_tests;
