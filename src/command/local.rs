use std::path::{Path, PathBuf};

use super::Command;
use crate::{
    authorization::local_hostname,
    file_handler::FileHandler,
    filesystem::{path_to_str, Filesystem},
    native::LocalHost,
    status::CommandStatus,
};

impl Command {
    /// Copies every input into the local working directory unless it is already there.
    pub(super) async fn stage_local_inputs(&mut self) -> CommandStatus {
        let Some(working_directory) = self.configuration.working_directory().map(Path::to_path_buf) else {
            return CommandStatus::InfoError;
        };
        if !LocalHost.is_dir(&working_directory).await.unwrap_or(false) {
            tracing::warn!(directory = %working_directory.display(), "working directory does not exist");
            return CommandStatus::Failed;
        }

        let handler = FileHandler::local();
        for input in self.configuration.input_files() {
            let source = resolve_input(&working_directory, &input.path);
            let staged = working_directory.join(input.staged_name());
            tracing::debug!(name = %input.name, source = %source.display(), "staging input");
            match handler.copy(&source, &staged).await {
                Ok(CommandStatus::Success) => {}
                Ok(status) => return status,
                Err(err) => {
                    tracing::warn!(name = %input.name, source = %source.display(), "cannot stage input: {err}");
                    return CommandStatus::Failed;
                }
            }
        }
        CommandStatus::Processing
    }

    pub(super) async fn launch_local(&mut self) -> CommandStatus {
        let Some(working_directory) = self.configuration.working_directory().map(Path::to_path_buf) else {
            return CommandStatus::InfoError;
        };
        let working_dir = match path_to_str(&working_directory) {
            Ok(working_dir) => working_dir,
            Err(err) => {
                tracing::warn!("{err}");
                return CommandStatus::InfoError;
            }
        };

        let windows = self.configuration.is_windows();
        let status = self.run_stages(&LocalHost, &working_dir, windows).await;

        if let Err(err) = self
            .write_capture_files(&LocalHost, &working_directory, &local_hostname())
            .await
        {
            tracing::warn!(directory = %working_directory.display(), "could not write capture files: {err}");
            return CommandStatus::Failed;
        }
        status
    }
}

/// Relative input paths are taken from `base`.
pub(super) fn resolve_input(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
