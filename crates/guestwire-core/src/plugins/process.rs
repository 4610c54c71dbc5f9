//! Running commands on the guest.

use crate::error::{CoreError, Result};
use crate::plugin::Plugin;
use crate::proxy::{RemoteAttributes, RemoteObject};
use crate::session::RemoteSession;
use crate::value::RemoteValue;
use async_trait::async_trait;
use std::any::Any;

/// Result of a finished guest command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (negative if the process was killed by a signal).
    pub exit_code: i64,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Guest processes through `subprocess`.
#[derive(Debug, Default)]
pub struct ProcessPlugin {
    session: Option<RemoteSession>,
}

impl ProcessPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<&RemoteSession> {
        self.session
            .as_ref()
            .ok_or_else(|| CoreError::PluginNotFound("process (not loaded)".into()))
    }

    /// Run a program with arguments and wait for it.
    pub async fn run(&self, argv: &[&str]) -> Result<ProcessOutput> {
        let argv = RemoteValue::List(argv.iter().map(|arg| RemoteValue::from(*arg)).collect());
        self.spawn(argv, false).await
    }

    /// Run a command line through the guest's shell.
    pub async fn shell(&self, command: &str) -> Result<ProcessOutput> {
        self.spawn(command.into(), true).await
    }

    /// Process id of the guest agent.
    pub async fn pid(&self) -> Result<i64> {
        self.session()?
            .invoke("os.getpid", &[], &[])
            .await?
            .try_into()
    }

    async fn spawn(&self, args: RemoteValue, shell: bool) -> Result<ProcessOutput> {
        let session = self.session()?;
        tracing::debug!(shell, "Running guest command");
        let completed: RemoteObject = session
            .invoke("subprocess.run", &[args], &[("shell", shell.into())])
            .await?
            .try_into()?;

        let output = Self::collect(&completed).await;
        session.release(&completed).await?;
        let output = output?;
        tracing::debug!(exit_code = output.exit_code, "Guest command finished");
        Ok(output)
    }

    async fn collect(completed: &RemoteObject) -> Result<ProcessOutput> {
        Ok(ProcessOutput {
            exit_code: completed.get("returncode").await?.try_into()?,
            stdout: completed.get("stdout").await?.try_into()?,
            stderr: completed.get("stderr").await?.try_into()?,
        })
    }
}

#[async_trait]
impl Plugin for ProcessPlugin {
    fn name(&self) -> &'static str {
        "process"
    }

    fn supported_os(&self) -> &'static [&'static str] {
        &["linux", "darwin"]
    }

    async fn load(&mut self, session: &RemoteSession) -> Result<()> {
        self.session = Some(session.clone());
        Ok(())
    }

    async fn unload(&mut self) -> Result<()> {
        self.session = None;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_output_success() {
        let output = ProcessOutput {
            exit_code: 0,
            stdout: "hello".to_string(),
            stderr: String::new(),
        };
        assert!(output.success());
    }

    #[test]
    fn test_process_output_failure() {
        let output = ProcessOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "error".to_string(),
        };
        assert!(!output.success());
    }
}
