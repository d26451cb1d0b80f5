use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{local::resolve_input, Command};
use crate::{
    file_handler::{Endpoint, FileHandler},
    filesystem::Filesystem,
    ssh::Connection,
    status::CommandStatus,
};

const EXECUTABLE_MODE: u32 = 0o755;

impl Command {
    /// Creates the remote working directory on `target` and copies the inputs
    /// and a script executable into it, from the local machine or from `jump`.
    pub(super) async fn stage_remote_inputs(
        &mut self,
        jump: Option<&Arc<Connection>>,
        target: &Arc<Connection>,
    ) -> CommandStatus {
        let (Some(working_directory), Some(remote_directory)) = (
            self.configuration.working_directory().map(Path::to_path_buf),
            self.configuration.remote_working_directory().map(str::to_string),
        ) else {
            tracing::warn!(id = self.configuration.id(), "remote staging needs a local and a remote working directory");
            return CommandStatus::InfoError;
        };

        let source = match jump {
            Some(jump) => Endpoint::Remote(jump.clone()),
            None => Endpoint::Local,
        };
        match source.filesystem().is_dir(&working_directory).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(directory = %working_directory.display(), "working directory does not exist");
                return CommandStatus::Failed;
            }
            Err(err) => {
                tracing::warn!(directory = %working_directory.display(), "cannot inspect working directory: {err}");
                return CommandStatus::Failed;
            }
        }

        if let Err(err) = target.create_dir_recursively(Path::new(&remote_directory)).await {
            tracing::warn!(name = %target.name(), directory = %remote_directory, "cannot create remote working directory: {err}");
            return CommandStatus::Failed;
        }
        target.remember_working_directory(&remote_directory);

        let handler = FileHandler::between(source.clone(), Endpoint::Remote(target.clone()));
        let destination = PathBuf::from(format!("{}/", remote_directory.trim_end_matches('/')));

        let mut uploads: Vec<PathBuf> = self
            .configuration
            .input_files()
            .iter()
            .map(|input| resolve_input(&working_directory, &input.path))
            .collect();
        let script = self.script_name();
        if let Some(script) = &script {
            let candidate = working_directory.join(script);
            if !uploads.contains(&candidate) && source.filesystem().exists(&candidate).await.unwrap_or(false) {
                uploads.push(candidate);
            }
        }

        for upload in &uploads {
            tracing::debug!(name = %target.name(), source = %upload.display(), "staging remote input");
            match handler.copy(upload, &destination).await {
                Ok(CommandStatus::Success) => {}
                Ok(status) => return status,
                Err(err) => {
                    tracing::warn!(source = %upload.display(), "cannot stage input: {err}");
                    return CommandStatus::Failed;
                }
            }
        }

        if let Some(script) = script {
            let remote_script = destination.join(&script);
            if target.exists(&remote_script).await.unwrap_or(false) {
                if let Err(err) = target.set_permissions(&remote_script, EXECUTABLE_MODE).await {
                    tracing::warn!(path = %remote_script.display(), "cannot mark executable: {err}");
                    return CommandStatus::Failed;
                }
            }
        }
        CommandStatus::Processing
    }

    pub(super) async fn launch_remote(&mut self, connection: &Arc<Connection>) -> CommandStatus {
        let Some(remote_directory) = self.configuration.remote_working_directory().map(str::to_string) else {
            return CommandStatus::InfoError;
        };

        let status = self.run_stages(connection.as_ref(), &remote_directory, false).await;

        if let Err(err) = self
            .write_capture_files(connection.as_ref(), Path::new(&remote_directory), connection.hostname())
            .await
        {
            tracing::warn!(name = %connection.name(), directory = %remote_directory, "could not write capture files: {err}");
            return CommandStatus::Failed;
        }
        status
    }

    /// The executable's file name when it names a script relative to the working directory.
    fn script_name(&self) -> Option<String> {
        let first = self.configuration.executable()?.split_whitespace().next()?;
        let relative = first.strip_prefix("./").unwrap_or(first);
        if relative.is_empty() || relative.contains('/') || relative.contains('$') {
            return None;
        }
        Some(relative.to_string())
    }
}
