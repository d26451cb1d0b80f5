use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::io::AsyncWriteExt;

use crate::{
    filesystem::{same_file, Filesystem, OpenOptions},
    native::LocalHost,
    ssh::Connection,
    status::CommandStatus,
};

/// One side of a file operation.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Local,
    Remote(Arc<Connection>),
}

impl Endpoint {
    pub fn filesystem(&self) -> &dyn Filesystem {
        match self {
            Endpoint::Local => &LocalHost,
            Endpoint::Remote(connection) => connection.as_ref(),
        }
    }

    fn same_as(&self, other: &Endpoint) -> bool {
        match (self, other) {
            (Endpoint::Local, Endpoint::Local) => true,
            (Endpoint::Remote(a), Endpoint::Remote(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Copies and moves files between the local machine and connections.
///
/// A destination that is an existing directory, or that ends in `/`, receives
/// the file under its source name. Missing destination directories are created.
#[derive(Debug, Clone)]
pub struct FileHandler {
    source: Endpoint,
    destination: Endpoint,
}

impl FileHandler {
    pub fn local() -> FileHandler {
        Self::between(Endpoint::Local, Endpoint::Local)
    }

    /// Both paths live on `connection`.
    pub fn remote(connection: Arc<Connection>) -> FileHandler {
        Self::between(Endpoint::Remote(connection.clone()), Endpoint::Remote(connection))
    }

    pub fn upload(connection: Arc<Connection>) -> FileHandler {
        Self::between(Endpoint::Local, Endpoint::Remote(connection))
    }

    pub fn download(connection: Arc<Connection>) -> FileHandler {
        Self::between(Endpoint::Remote(connection), Endpoint::Local)
    }

    pub fn between(source: Endpoint, destination: Endpoint) -> FileHandler {
        FileHandler { source, destination }
    }

    pub fn source(&self) -> &Endpoint {
        &self.source
    }

    pub fn destination(&self) -> &Endpoint {
        &self.destination
    }

    /// Fails only when the source cannot be found; transfer problems are
    /// reported as [`CommandStatus::Failed`].
    pub async fn copy(&self, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> io::Result<CommandStatus> {
        self.transfer(source.as_ref(), destination.as_ref(), false).await
    }

    /// Like [`FileHandler::copy`], removing the source afterwards.
    pub async fn move_file(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> io::Result<CommandStatus> {
        self.transfer(source.as_ref(), destination.as_ref(), true).await
    }

    /// Whether `path` exists on the destination side. A missing path is `false`, not an error.
    pub async fn exists(&self, path: impl AsRef<Path>) -> io::Result<bool> {
        self.destination.filesystem().exists(path.as_ref()).await
    }

    pub async fn source_exists(&self, path: impl AsRef<Path>) -> io::Result<bool> {
        self.source.filesystem().exists(path.as_ref()).await
    }

    async fn transfer(&self, source: &Path, destination: &Path, remove_source: bool) -> io::Result<CommandStatus> {
        let source_fs = self.source.filesystem();
        if !source_fs.exists(source).await? {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("source {} does not exist", source.display()),
            ));
        }

        let result: io::Result<()> = async {
            let destination = self.resolve_destination(source, destination).await?;
            tracing::debug!(source = %source.display(), destination = %destination.display(), remove_source, "transferring file");
            if self.source.same_as(&self.destination) {
                if same_file(source_fs, source, &destination).await? {
                    tracing::debug!(path = %destination.display(), "source and destination are the same file");
                    return Ok(());
                }
                if remove_source {
                    move_within(source_fs, source, &destination).await
                } else {
                    source_fs.copy_file(source, &destination).await
                }
            } else {
                match (&self.source, &self.destination) {
                    (Endpoint::Remote(from), Endpoint::Remote(to)) => relay(from, source, to, &destination).await?,
                    _ => stream(source_fs, source, self.destination.filesystem(), &destination).await?,
                };
                if remove_source {
                    source_fs.remove_file(source).await?;
                }
                Ok(())
            }
        }
        .await;

        match result {
            Ok(()) => Ok(CommandStatus::Success),
            Err(err) => {
                tracing::warn!(source = %source.display(), destination = %destination.display(), "transfer failed: {err}");
                Ok(CommandStatus::Failed)
            }
        }
    }

    async fn resolve_destination(&self, source: &Path, destination: &Path) -> io::Result<PathBuf> {
        let destination_fs = self.destination.filesystem();
        let names_directory = destination.as_os_str().to_string_lossy().ends_with('/');

        if names_directory || destination_fs.is_dir(destination).await? {
            destination_fs.create_dir_recursively(destination).await?;
            let file_name = source.file_name().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("source {} has no file name", source.display()),
                )
            })?;
            return Ok(destination.join(file_name));
        }

        if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            destination_fs.create_dir_recursively(parent).await?;
        }
        Ok(destination.to_path_buf())
    }
}

async fn move_within(filesystem: &dyn Filesystem, source: &Path, destination: &Path) -> io::Result<()> {
    // sftp rename refuses to replace an existing file
    if filesystem.is_remote() && filesystem.exists(destination).await? {
        filesystem.remove_file(destination).await?;
    }
    filesystem.rename_file(source, destination).await
}

/// Streams bytes from one filesystem to the other.
async fn stream(
    source_fs: &dyn Filesystem,
    source: &Path,
    destination_fs: &dyn Filesystem,
    destination: &Path,
) -> io::Result<u64> {
    let mut reader = source_fs.open_file(source, &OpenOptions::new().read()).await?;
    let mut writer = destination_fs
        .open_file(destination, &OpenOptions::new().write().create().truncate())
        .await?;
    let copied = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.shutdown().await?;
    Ok(copied)
}

/// Moves a file between two different connections through a local temporary file.
async fn relay(from: &Connection, source: &Path, to: &Connection, destination: &Path) -> io::Result<u64> {
    let staging = std::env::temp_dir().join(format!("jobwire-relay-{}", uuid::Uuid::new_v4()));
    tracing::debug!(from = %from.name(), to = %to.name(), staging = %staging.display(), "relaying through local file");

    let result = async {
        stream(from, source, &LocalHost, &staging).await?;
        stream(&LocalHost, &staging, to, destination).await
    }
    .await;

    if let Err(err) = tokio::fs::remove_file(&staging).await {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(staging = %staging.display(), "could not remove relay file: {err}");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::FileHandler;
    use crate::status::CommandStatus;

    #[tokio::test]
    async fn copy_into_existing_directory_keeps_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        let destination = dir.path().join("dest");
        tokio::fs::write(&source, b"payload").await.unwrap();
        tokio::fs::create_dir(&destination).await.unwrap();

        let handler = FileHandler::local();
        let status = handler.copy(&source, &destination).await.unwrap();
        assert_eq!(status, CommandStatus::Success);
        assert!(handler.exists(destination.join("input.txt")).await.unwrap());
        assert!(handler.source_exists(&source).await.unwrap());
    }

    #[tokio::test]
    async fn move_creates_missing_directories_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        let destination = dir.path().join("new/dir/renamed.txt");
        tokio::fs::write(&source, b"payload").await.unwrap();

        let handler = FileHandler::local();
        let status = handler.move_file(&source, &destination).await.unwrap();
        assert_eq!(status, CommandStatus::Success);
        assert!(!handler.exists(&source).await.unwrap());
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn copy_over_existing_file_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let destination = dir.path().join("b.txt");
        tokio::fs::write(&source, b"new").await.unwrap();
        tokio::fs::write(&destination, b"old").await.unwrap();

        let status = FileHandler::local().copy(&source, &destination).await.unwrap();
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn copy_onto_itself_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        tokio::fs::write(&source, b"payload").await.unwrap();

        let handler = FileHandler::local();
        assert_eq!(handler.copy(&source, &source).await.unwrap(), CommandStatus::Success);
        // the file's own directory resolves to the same path
        assert_eq!(handler.copy(&source, dir.path()).await.unwrap(), CommandStatus::Success);
        let dotted = dir.path().join(".").join("input.txt");
        assert_eq!(handler.copy(&source, &dotted).await.unwrap(), CommandStatus::Success);
        assert_eq!(tokio::fs::read(&source).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn move_onto_itself_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        tokio::fs::write(&source, b"payload").await.unwrap();

        let status = FileHandler::local().move_file(&source, dir.path()).await.unwrap();
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(tokio::fs::read(&source).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileHandler::local()
            .move_file(dir.path().join("missing"), dir.path().join("dest"))
            .await;
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn exists_is_false_for_missing_path() {
        let handler = FileHandler::local();
        assert!(!handler
            .exists("/usr/file_that_definitely_does_not_exist.txt")
            .await
            .unwrap());
    }
}
