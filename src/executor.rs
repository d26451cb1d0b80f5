use async_trait::async_trait;
use thiserror::Error;

/// A single process launch: a program, its arguments and where to run it.
#[derive(Debug, Clone)]
pub struct ProcessConfiguration {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
    pub(crate) working_dir: Option<String>,
    pub(crate) redirect_stdout: bool,
    pub(crate) redirect_stderr: bool,
}

impl ProcessConfiguration {
    pub fn new(program: impl Into<String>) -> ProcessConfiguration {
        ProcessConfiguration {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            redirect_stdout: false,
            redirect_stderr: false,
        }
    }

    pub fn arg(&mut self, argument: impl Into<String>) -> &mut Self {
        self.args.push(argument.into());
        self
    }

    pub fn args<I, S>(&mut self, arguments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(arguments.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(&mut self, working_dir: impl Into<String>) -> &mut Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn redirect_stdout(&mut self) -> &mut Self {
        self.redirect_stdout = true;
        self
    }

    pub fn redirect_stderr(&mut self) -> &mut Self {
        self.redirect_stderr = true;
        self
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("could not launch process: {0}")]
    Io(#[from] std::io::Error),
    #[error("ssh channel failure")]
    Channel(#[from] russh::Error),
    #[error("connection {0} is closed")]
    ConnectionClosed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process ended without reporting a code, e.g. on a signal.
    pub status_code: Option<i64>,
}

impl ProcessOutput {
    pub fn succeeded(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Runs a process to completion, locally or over a connection.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, process_configuration: &ProcessConfiguration) -> Result<ProcessOutput, ProcessError>;
}
