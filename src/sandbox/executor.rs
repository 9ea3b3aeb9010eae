//! Docker executor - runs one guest snippet per container
//!
//! Each call creates exactly one `docker run --rm` process with a unique
//! container name and waits for it under the policy's wall-clock timeout.
//! On timeout the client process is killed and the container is force-removed
//! so the guest process tree inside it dies as well.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::policy::SandboxPolicy;
use crate::metrics::{SANDBOX_DURATION, SANDBOX_EXECUTIONS};

/// Upper bound for the background `docker rm -f` after a timeout
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Output of a container run that finished on its own
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (-1 if killed by a signal)
    pub exit_code: i32,
}

/// Failure categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SandboxErrorKind {
    #[serde(rename = "docker_not_available")]
    DockerUnavailable,
    #[serde(rename = "sandbox_timeout")]
    Timeout,
    #[serde(rename = "policy_rejected")]
    PolicyRejected,
}

/// Outcome of one sandbox execution
///
/// A non-zero exit code is still `Completed`; only infrastructure problems
/// (missing runtime, timeout, rejected policy) are `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxResult {
    Completed(ExecOutput),
    Failed {
        error: SandboxErrorKind,
        message: String,
    },
}

impl SandboxResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, SandboxResult::Completed(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SandboxResult::Completed(out) => Some(out.exit_code),
            SandboxResult::Failed { .. } => None,
        }
    }
}

// Wire shape: {ok:true, stdout, stderr, exit_code} | {ok:false, error, message}
impl Serialize for SandboxResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SandboxResult::Completed(out) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("stdout", &out.stdout)?;
                map.serialize_entry("stderr", &out.stderr)?;
                map.serialize_entry("exit_code", &out.exit_code)?;
                map.end()
            }
            SandboxResult::Failed { error, message } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("error", error)?;
                map.serialize_entry("message", message)?;
                map.end()
            }
        }
    }
}

/// Error type for sandbox operations
#[derive(Debug)]
pub enum SandboxError {
    /// The container runtime binary could not be found
    DockerUnavailable(String),
    /// The run exceeded the policy timeout
    Timeout(Duration),
    /// The runtime exists but could not be started or waited on
    Spawn(std::io::Error),
    /// The policy would run the guest as root or an unknown user
    UnsafePolicy(String),
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::DockerUnavailable(runtime) => write!(
                f,
                "Container runtime '{}' not found. Install Docker to use sandboxed execution.",
                runtime
            ),
            SandboxError::Timeout(limit) => {
                write!(f, "Sandbox execution exceeded timeout of {:?}.", limit)
            }
            SandboxError::Spawn(e) => write!(f, "Failed to start container runtime: {}", e),
            SandboxError::UnsafePolicy(reason) => write!(f, "Sandbox policy rejected: {}", reason),
        }
    }
}

impl std::error::Error for SandboxError {}

impl SandboxError {
    /// Metric label for this failure
    fn outcome(&self) -> &'static str {
        match self {
            SandboxError::DockerUnavailable(_) => "docker_unavailable",
            SandboxError::Timeout(_) => "timeout",
            SandboxError::Spawn(_) => "spawn_error",
            SandboxError::UnsafePolicy(_) => "rejected",
        }
    }
}

impl From<SandboxError> for SandboxResult {
    fn from(e: SandboxError) -> Self {
        let error = match e {
            SandboxError::Timeout(_) => SandboxErrorKind::Timeout,
            SandboxError::UnsafePolicy(_) => SandboxErrorKind::PolicyRejected,
            SandboxError::DockerUnavailable(_) | SandboxError::Spawn(_) => {
                SandboxErrorKind::DockerUnavailable
            }
        };
        SandboxResult::Failed {
            error,
            message: e.to_string(),
        }
    }
}

/// Anything that can execute a guest snippet under a policy
///
/// The router and the line protocol depend on this seam rather than on Docker
/// directly, so tests can substitute scripted runners.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str, policy: &SandboxPolicy) -> SandboxResult;
}

/// Runs guest code with `docker run`, one container per call
#[derive(Debug, Clone, Default)]
pub struct DockerExecutor;

impl DockerExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute `code` under `policy`
    ///
    /// # Returns
    /// `ExecOutput` for any exit code, or a `SandboxError` when the policy's
    /// user is unsafe, the runtime is missing or the run times out. Never retries.
    pub async fn execute(
        &self,
        code: &str,
        policy: &SandboxPolicy,
    ) -> Result<ExecOutput, SandboxError> {
        if let Err(reason) = policy.check_user() {
            let err = SandboxError::UnsafePolicy(reason);
            SANDBOX_EXECUTIONS.with_label_values(&[err.outcome()]).inc();
            warn!(user = %policy.user, error = %err, "Refusing sandbox execution");
            return Err(err);
        }

        let container = format!("cody-sandbox-{}", Uuid::now_v7());
        let start = Instant::now();

        info!(
            container = %container,
            image = %policy.image,
            code_len = code.len(),
            timeout_ms = policy.timeout.as_millis() as u64,
            "Starting sandbox execution"
        );

        let mut cmd = Command::new(&policy.runtime);
        cmd.args(policy.run_args(&container, code))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::DockerUnavailable(policy.runtime.clone())
            } else {
                SandboxError::Spawn(e)
            }
        });

        let result = match child {
            Ok(child) => match timeout(policy.timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(ExecOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code().unwrap_or(-1),
                }),
                Ok(Err(e)) => Err(SandboxError::Spawn(e)),
                Err(_) => {
                    // the dropped future already killed the local client
                    remove_container(&policy.runtime, &container);
                    Err(SandboxError::Timeout(policy.timeout))
                }
            },
            Err(e) => Err(e),
        };

        let elapsed = start.elapsed();
        SANDBOX_DURATION.observe(elapsed.as_secs_f64());

        match &result {
            Ok(output) => {
                SANDBOX_EXECUTIONS.with_label_values(&["completed"]).inc();
                info!(
                    container = %container,
                    exit_code = output.exit_code,
                    duration_ms = elapsed.as_secs_f64() * 1000.0,
                    "Sandbox execution complete"
                );
            }
            Err(e) => {
                SANDBOX_EXECUTIONS.with_label_values(&[e.outcome()]).inc();
                warn!(container = %container, error = %e, "Sandbox execution failed");
            }
        }

        result
    }
}

#[async_trait]
impl CodeRunner for DockerExecutor {
    async fn run(&self, code: &str, policy: &SandboxPolicy) -> SandboxResult {
        match self.execute(code, policy).await {
            Ok(output) => SandboxResult::Completed(output),
            Err(e) => e.into(),
        }
    }
}

/// Force-remove a container in the background, bounded by `CLEANUP_TIMEOUT`
fn remove_container(runtime: &str, container: &str) {
    let mut cmd = Command::new(runtime);
    cmd.args(["rm", "-f", container])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let container = container.to_string();
    tokio::spawn(async move {
        match timeout(CLEANUP_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => debug!(container = %container, %status, "Removed timed-out container"),
            Ok(Err(e)) => warn!(container = %container, error = %e, "Failed to remove container"),
            Err(_) => warn!(container = %container, "Container removal timed out"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_wire_shape() {
        let result = SandboxResult::Completed(ExecOutput {
            stdout: "22\n".into(),
            stderr: String::new(),
            exit_code: 0,
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["stdout"], "22\n");
        assert_eq!(json["exit_code"], 0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_wire_shape() {
        let result: SandboxResult = SandboxError::Timeout(Duration::from_secs(5)).into();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "sandbox_timeout");
        assert!(json.get("stdout").is_none());

        let result: SandboxResult = SandboxError::DockerUnavailable("docker".into()).into();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error"], "docker_not_available");
        assert!(json["message"].as_str().unwrap().contains("docker"));
    }

    #[tokio::test]
    async fn test_root_user_is_refused_before_spawn() {
        let policy = SandboxPolicy {
            runtime: "/nonexistent/cody-docker".to_string(),
            user: "0:0".to_string(),
            ..SandboxPolicy::default()
        };

        let err = DockerExecutor::new().execute("print(1)", &policy).await.unwrap_err();
        assert!(matches!(err, SandboxError::UnsafePolicy(_)));

        let json = serde_json::to_value(SandboxResult::from(err)).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "policy_rejected");
    }

    #[test]
    fn test_spawn_failure_reports_unavailable() {
        let err = SandboxError::Spawn(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        let result: SandboxResult = err.into();
        assert!(!result.is_ok());
        assert_eq!(result.exit_code(), None);
        match result {
            SandboxResult::Failed { error, .. } => {
                assert_eq!(error, SandboxErrorKind::DockerUnavailable)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
