use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use super::LocalHost;
use crate::executor::{Executor, ProcessConfiguration, ProcessError, ProcessOutput};

#[async_trait]
impl Executor for LocalHost {
    async fn execute(&self, process_configuration: &ProcessConfiguration) -> Result<ProcessOutput, ProcessError> {
        let mut command = create_command_from_config(process_configuration);
        tracing::debug!(program = %process_configuration.program, args = ?process_configuration.args, "spawning local process");
        let os_output = command.output().await?;
        Ok(os_output.into())
    }
}

impl From<Output> for ProcessOutput {
    fn from(value: Output) -> Self {
        ProcessOutput {
            stdout: value.stdout,
            stderr: value.stderr,
            status_code: value.status.code().map(|i| i.into()),
        }
    }
}

fn create_command_from_config(process_configuration: &ProcessConfiguration) -> Command {
    let mut command = Command::new(&process_configuration.program);
    command.args(&process_configuration.args);
    command.stdin(Stdio::null());
    command.kill_on_drop(true);

    if let Some(working_dir) = &process_configuration.working_dir {
        command.current_dir(working_dir);
    }

    if process_configuration.redirect_stdout {
        command.stdout(Stdio::piped());
    } else {
        command.stdout(Stdio::null());
    }

    if process_configuration.redirect_stderr {
        command.stderr(Stdio::piped());
    } else {
        command.stderr(Stdio::null());
    }

    command
}

#[cfg(test)]
mod tests {
    use crate::{
        executor::{Executor, ProcessConfiguration},
        native::LocalHost,
    };

    #[tokio::test]
    async fn execution_with_only_stdout() {
        let mut config = ProcessConfiguration::new("/bin/sh");
        config.arg("-c").arg("echo hello").redirect_stdout();
        let output = LocalHost.execute(&config).await.expect("Execution failed");
        assert_eq!(output.status_code, Some(0));
        assert_eq!(String::from_utf8(output.stdout).unwrap(), "hello\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn execution_with_only_stderr() {
        let mut config = ProcessConfiguration::new("/bin/sh");
        config.arg("-c").arg("echo oops >&2; exit 3").redirect_stderr();
        let output = LocalHost.execute(&config).await.expect("Execution failed");
        assert_eq!(output.status_code, Some(3));
        assert_eq!(String::from_utf8(output.stderr).unwrap(), "oops\n");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let config = ProcessConfiguration::new("/definitely/not/a/program");
        assert!(LocalHost.execute(&config).await.is_err());
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProcessConfiguration::new("/bin/sh");
        config
            .arg("-c")
            .arg("pwd")
            .working_dir(dir.path().to_str().unwrap())
            .redirect_stdout();
        let output = LocalHost.execute(&config).await.unwrap();
        let printed = String::from_utf8(output.stdout).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(printed.trim()).canonicalize().unwrap(), expected);
    }
}
