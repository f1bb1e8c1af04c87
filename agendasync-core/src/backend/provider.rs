//! Provider subprocess backend.
//!
//! This module handles communication with external provider binaries
//! (e.g., `agendasync-provider-outlook`) using JSON over stdin/stdout.
//!
//! The protocol is designed to be language-agnostic: any executable
//! that speaks the JSON protocol can be a provider.
//!
//! Providers manage their own credentials and tokens. One process is spawned
//! per call, so a provider never has to keep state between requests.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::backend::protocol::{
    Command, CreateEvent, DeleteEvent, EnsureCategories, ListEvents, ProviderCommand, Request,
    Response,
};
use crate::backend::{BackendError, CalendarBackend, RemoteEvent};
use crate::entry::TeacherId;
use crate::error::{SyncError, SyncResult};
use crate::event_spec::{Category, EventSpec};

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ProviderBackend {
    name: String,
    binary_path: PathBuf,
    timeout: Duration,
}

impl ProviderBackend {
    /// Find `agendasync-provider-<name>` in `PATH`.
    pub fn from_name(name: &str, timeout: Duration) -> SyncResult<Self> {
        let binary_name = format!("agendasync-provider-{name}");
        let binary_path = which::which(&binary_name)
            .map_err(|_| SyncError::ProviderNotInstalled(binary_name.clone()))?;

        Ok(ProviderBackend {
            name: name.to_string(),
            binary_path,
            timeout,
        })
    }

    /// Use a provider binary at an explicit path.
    pub fn with_binary(binary_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        let binary_path = binary_path.into();
        let name = binary_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        ProviderBackend {
            name,
            binary_path,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call a typed provider command and return the result.
    ///
    /// The response type is inferred from the command's associated type.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> Result<C::Response, BackendError> {
        timeout(self.timeout, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| {
                BackendError::Transient(format!(
                    "provider timed out after {}",
                    humantime::format_duration(self.timeout)
                ))
            })?
    }

    /// Low-level call that sends a command with params and deserializes the response.
    async fn call_raw<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> Result<R, BackendError> {
        let params = serde_json::to_value(params)
            .map_err(|e| BackendError::Permanent(format!("could not encode request: {e}")))?;
        let request_json = serde_json::to_string(&Request { command, params })
            .map_err(|e| BackendError::Permanent(format!("could not encode request: {e}")))?;

        let mut child = TokioCommand::new(&self.binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BackendError::Permanent(format!(
                    "failed to spawn {}: {e}",
                    self.binary_path.display()
                ))
            })?;

        let Some(mut stdin) = child.stdin.take() else {
            return Err(BackendError::Permanent("provider stdin unavailable".into()));
        };
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await
            .map_err(|e| BackendError::Transient(format!("could not write to provider: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackendError::Transient(format!("provider did not finish: {e}")))?;

        if !output.status.success() {
            return Err(BackendError::Transient(format!(
                "provider exited with status: {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(BackendError::Transient("provider returned no response".into()));
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| BackendError::Transient(format!("failed to parse response: {e}")))?;

        response.into_result()
    }
}

#[async_trait]
impl CalendarBackend for ProviderBackend {
    async fn create_event(&self, teacher: &TeacherId, event: &EventSpec) -> Result<String, BackendError> {
        self.call(CreateEvent {
            teacher: teacher.clone(),
            event: event.clone(),
        })
        .await
    }

    async fn delete_event(&self, teacher: &TeacherId, remote_event_id: &str) -> Result<(), BackendError> {
        self.call(DeleteEvent {
            teacher: teacher.clone(),
            remote_event_id: remote_event_id.to_string(),
        })
        .await
    }

    async fn list_events(
        &self,
        teacher: &TeacherId,
        subject_prefix: &str,
    ) -> Result<Vec<RemoteEvent>, BackendError> {
        self.call(ListEvents {
            teacher: teacher.clone(),
            subject_prefix: subject_prefix.to_string(),
        })
        .await
    }

    async fn ensure_categories(
        &self,
        teacher: &TeacherId,
        categories: &[Category],
    ) -> Result<(), BackendError> {
        self.call(EnsureCategories {
            teacher: teacher.clone(),
            categories: categories.to_vec(),
        })
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A provider that ignores its input and prints a canned response.
    fn fake_provider(dir: &tempfile::TempDir, response: &str) -> ProviderBackend {
        let path = dir.path().join("agendasync-provider-fake");
        let script = format!("#!/bin/sh\ncat > /dev/null\necho '{response}'\n");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        ProviderBackend::with_binary(path, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_create_event_returns_remote_id() {
        let dir = tempfile::tempdir().unwrap();
        let provider = fake_provider(&dir, r#"{"status":"success","data":"AAMk-42"}"#);

        let spec = crate::event_spec::EventTemplate::new(
            crate::entry::SyncType::Recurring,
            "Teaching",
            chrono_tz::Europe::Zurich,
        )
        .build(&crate::entry::ScheduleEntry::Recurring(crate::entry::RecurringEntry {
            weekday: chrono::Weekday::Mon,
            start: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        }));

        let id = provider
            .create_event(&"anna@school.ch".into(), &spec)
            .await
            .unwrap();

        assert_eq!(id, "AAMk-42");
        assert_eq!(provider.name(), "agendasync-provider-fake");
    }

    #[tokio::test]
    async fn test_permission_error_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let provider = fake_provider(
            &dir,
            r#"{"status":"error","error":"Access is denied","kind":"permanent"}"#,
        );

        let err = provider
            .delete_event(&"anna@school.ch".into(), "AAMk-1")
            .await
            .unwrap_err();

        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let provider = ProviderBackend::with_binary("/nonexistent/provider", Duration::from_secs(1));

        let err = provider
            .list_events(&"anna@school.ch".into(), "Teaching")
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Permanent(_)));
    }
}
