//! External command execution
//!
//! Every interaction with a provider or with the packaging tool is a
//! subprocess:
//! - [`run`] / [`run_with_env`] spawn a program and capture its output
//! - [`CommandExecutor`] is the seam adapters and drivers call through
//! - [`RemoteExec`] runs every invocation inside a container via `docker exec`

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    /// Successful result with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed result with the given exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors that prevent a command from producing a [`RunResult`]
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command execution failed: {0}")]
    ExecutionFailed(String),
}

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Run a command and capture stdout, stderr and the exit code
pub async fn run(program: &str, args: &[&str]) -> Result<RunResult, RunnerError> {
    run_with_env(program, args, &HashMap::new()).await
}

/// Run a command with extra environment variables
pub async fn run_with_env(
    program: &str,
    args: &[&str],
    env: &HashMap<String, String>,
) -> Result<RunResult, RunnerError> {
    let output = Command::new(program)
        .args(args)
        .envs(env)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RunnerError::CommandNotFound(program.to_string()),
            _ => RunnerError::ExecutionFailed(format!("{program}: {e}")),
        })?;

    Ok(RunResult {
        // Killed by a signal: no exit code
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Executes invocations on behalf of adapters and drivers
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<RunResult, RunnerError>;
}

/// Runs invocations as local subprocesses
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    #[instrument(skip(self), fields(command = %invocation))]
    async fn execute(&self, invocation: &Invocation) -> Result<RunResult, RunnerError> {
        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        let result = run(&invocation.program, &args).await?;
        debug!(exit_code = result.exit_code, "command finished");
        Ok(result)
    }
}

/// Wraps every invocation in `docker exec -i <container> ...`
///
/// Used for providers whose client only exists inside a host container, such
/// as an all-in-one OpenShift origin container.
pub struct RemoteExec {
    container: String,
    inner: Arc<dyn CommandExecutor>,
}

impl RemoteExec {
    pub fn new(container: impl Into<String>, inner: Arc<dyn CommandExecutor>) -> Self {
        Self {
            container: container.into(),
            inner,
        }
    }

    /// The invocation actually handed to the inner executor
    pub fn wrap(&self, invocation: &Invocation) -> Invocation {
        Invocation::new("docker")
            .args(["exec", "-i", self.container.as_str()])
            .arg(invocation.program.as_str())
            .args(invocation.args.iter().map(String::as_str))
    }
}

#[async_trait]
impl CommandExecutor for RemoteExec {
    async fn execute(&self, invocation: &Invocation) -> Result<RunResult, RunnerError> {
        self.inner.execute(&self.wrap(invocation)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<Invocation>>,
    }

    #[async_trait]
    impl CommandExecutor for Recorder {
        async fn execute(&self, invocation: &Invocation) -> Result<RunResult, RunnerError> {
            self.seen.lock().unwrap().push(invocation.clone());
            Ok(RunResult::success("ok"))
        }
    }

    #[test]
    fn test_run_result_passed() {
        let result = RunResult {
            exit_code: 0,
            stdout: "All tests passed".to_string(),
            stderr: String::new(),
        };
        assert!(result.passed());
    }

    #[test]
    fn test_run_result_failed() {
        let result = RunResult::failure(1, "Test failed");
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn test_run_simple_command() {
        let result = run("echo", &["hello"]).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
        assert!(result.passed());
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let result = run("sh", &["-c", "exit 1"]).await.unwrap();

        assert_eq!(result.exit_code, 1);
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn test_run_captures_stderr() {
        let result = run("sh", &["-c", "echo error >&2"]).await.unwrap();

        assert!(result.stderr.contains("error"));
    }

    #[tokio::test]
    async fn test_run_with_env() {
        let mut env = HashMap::new();
        env.insert("MY_VAR".to_string(), "my_value".to_string());

        let result = run_with_env("sh", &["-c", "echo $MY_VAR"], &env).await.unwrap();

        assert!(result.stdout.contains("my_value"));
    }

    #[tokio::test]
    async fn test_run_command_not_found() {
        let result = run("nonexistent_command_xyz", &[]).await;

        assert!(matches!(result, Err(RunnerError::CommandNotFound(_))));
    }

    #[test]
    fn test_runner_error_display() {
        let err = RunnerError::CommandNotFound("missing".to_string());
        assert!(err.to_string().contains("missing"));

        let err = RunnerError::ExecutionFailed("spawn error".to_string());
        assert!(err.to_string().contains("spawn"));
    }

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation::new("kubectl").args(["get", "pod", "wordpress"]);
        assert_eq!(invocation.to_string(), "kubectl get pod wordpress");
    }

    #[tokio::test]
    async fn test_system_executor_runs_invocation() {
        let result = SystemExecutor
            .execute(&Invocation::new("echo").arg("from-executor"))
            .await
            .unwrap();
        assert!(result.stdout.contains("from-executor"));
    }

    #[tokio::test]
    async fn test_remote_exec_wraps_every_call() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let remote = RemoteExec::new("origin", recorder.clone());

        remote
            .execute(&Invocation::new("oc").args(["get", "pods"]))
            .await
            .unwrap();
        remote
            .execute(&Invocation::new("oc").args(["delete", "pod", "web"]))
            .await
            .unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].to_string(), "docker exec -i origin oc get pods");
        assert_eq!(seen[1].to_string(), "docker exec -i origin oc delete pod web");
    }
}
