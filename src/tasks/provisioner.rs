//! Stack provisioning backends executed by task workers.
//!
//! A [`StackProvisioner`] performs the actual cloud-side work for a task.
//! [`CommandProvisioner`] delegates it to external programs: parameters are
//! passed as environment variables, the orchestration template on stdin,
//! and the program reports its result as a single JSON value on stdout.

use std::process::Stdio;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::WorkerConfig;
use crate::models::stack::ProviderCredentials;
use crate::models::task::{LaunchParams, SuspendParams};

use super::TaskFuture;

/// Raw task outcome: the produced value, or the failure cause as text.
pub type ProvisionResult = std::result::Result<Value, String>;

/// Executes launch-or-resume and suspend work for a single stack.
pub trait StackProvisioner: Send + Sync {
    /// Launch the stack if it does not exist, resume it if it is suspended.
    fn launch_or_resume(&self, params: LaunchParams) -> TaskFuture<'_, ProvisionResult>;

    /// Suspend the stack.
    fn suspend(&self, params: SuspendParams) -> TaskFuture<'_, ProvisionResult>;
}

/// Provisioner that runs configured external commands.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    launch_command: Vec<String>,
    suspend_command: Vec<String>,
}

impl CommandProvisioner {
    /// Build a provisioner from explicit command lines.
    #[must_use]
    pub fn new(launch_command: Vec<String>, suspend_command: Vec<String>) -> Self {
        Self {
            launch_command,
            suspend_command,
        }
    }

    /// Build a provisioner from the worker configuration.
    #[must_use]
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.launch_command.clone(), config.suspend_command.clone())
    }
}

impl StackProvisioner for CommandProvisioner {
    fn launch_or_resume(&self, params: LaunchParams) -> TaskFuture<'_, ProvisionResult> {
        let span = info_span!("launch_command", stack_name = %params.stack_name);
        Box::pin(
            async move {
                let mut env = credential_env(&params.credentials);
                env.push(("STACK_NAME", params.stack_name));
                env.push(("STACK_USER_NAME", params.stack_user_name));
                run_command(&self.launch_command, env, Some(params.template)).await
            }
            .instrument(span),
        )
    }

    fn suspend(&self, params: SuspendParams) -> TaskFuture<'_, ProvisionResult> {
        let span = info_span!("suspend_command", stack_name = %params.stack_name);
        Box::pin(
            async move {
                let mut env = credential_env(&params.credentials);
                env.push(("STACK_NAME", params.stack_name));
                run_command(&self.suspend_command, env, None).await
            }
            .instrument(span),
        )
    }
}

fn credential_env(credentials: &ProviderCredentials) -> Vec<(&'static str, String)> {
    vec![
        ("OS_AUTH_URL", credentials.auth_url.clone()),
        ("OS_TENANT_NAME", credentials.tenant_name.clone()),
        ("OS_USERNAME", credentials.username.clone()),
        ("OS_PASSWORD", credentials.password.clone()),
    ]
}

/// Spawn `argv`, feed `stdin`, and parse stdout as a JSON value.
async fn run_command(
    argv: &[String],
    env: Vec<(&'static str, String)>,
    stdin: Option<String>,
) -> ProvisionResult {
    let Some((program, args)) = argv.split_first() else {
        return Err("provisioning command is empty".into());
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| format!("failed to spawn {program}: {err}"))?;

    // Fed concurrently with draining stdout/stderr, so a command that writes
    // before it reads cannot fill both pipes and stall.
    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let program = program.clone();
            Some(tokio::spawn(async move {
                if let Err(err) = pipe.write_all(input.as_bytes()).await {
                    warn!(%err, %program, "failed to write template to stdin");
                }
                // Dropping the pipe closes stdin so the command sees EOF.
            }))
        }
        _ => None,
    };

    let output = child
        .wait_with_output()
        .await
        .map_err(|err| format!("failed to wait for {program}: {err}"))?;

    if let Some(writer) = writer {
        if let Err(err) = writer.await {
            warn!(%err, %program, "stdin writer task failed");
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    debug!(%program, bytes = output.stdout.len(), "command finished");
    serde_json::from_slice(&output.stdout)
        .map_err(|err| format!("{program} printed invalid JSON: {err}"))
}
