use std::{io, path::Path, sync::Arc};

use crate::{
    filesystem::{path_to_str, DirEntryType, Filesystem},
    ssh::Connection,
};

/// One-level listings of a remote directory.
#[derive(Debug, Clone)]
pub struct RemoteBrowser {
    connection: Arc<Connection>,
}

impl RemoteBrowser {
    pub fn new(connection: Arc<Connection>) -> RemoteBrowser {
        RemoteBrowser { connection }
    }

    /// Absolute paths of the regular files directly under `path`.
    pub async fn get_file_list(&self, path: impl AsRef<Path>) -> io::Result<Vec<String>> {
        self.list(path.as_ref(), DirEntryType::File).await
    }

    /// Absolute paths of the subdirectories directly under `path`.
    pub async fn get_directory_list(&self, path: impl AsRef<Path>) -> io::Result<Vec<String>> {
        self.list(path.as_ref(), DirEntryType::Dir).await
    }

    async fn list(&self, path: &Path, wanted: DirEntryType) -> io::Result<Vec<String>> {
        let paths = list_absolute(self.connection.as_ref(), path, wanted).await?;
        tracing::debug!(name = %self.connection.name(), path = %path.display(), found = paths.len(), "listed remote directory");
        Ok(paths)
    }
}

/// Sorted absolute paths of the `wanted` entries directly under `path`,
/// which may itself be relative.
async fn list_absolute(filesystem: &dyn Filesystem, path: &Path, wanted: DirEntryType) -> io::Result<Vec<String>> {
    let directory = filesystem.canonicalize(path).await?;
    let entries = filesystem.list_dir(&directory).await?;
    let mut paths = entries
        .iter()
        .filter(|entry| entry.entry_type() == wanted)
        .map(|entry| path_to_str(entry.path()))
        .collect::<io::Result<Vec<String>>>()?;
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::list_absolute;
    use crate::{filesystem::DirEntryType, native::LocalHost};

    #[tokio::test]
    async fn relative_directory_lists_absolute_paths() {
        let files = list_absolute(&LocalHost, Path::new("src/../src"), DirEntryType::File)
            .await
            .unwrap();
        assert!(files.iter().all(|file| Path::new(file).is_absolute()));
        let lib = tokio::fs::canonicalize("src/lib.rs").await.unwrap();
        assert!(files.contains(&lib.to_str().unwrap().to_string()));

        let directories = list_absolute(&LocalHost, Path::new("src"), DirEntryType::Dir)
            .await
            .unwrap();
        assert!(directories.iter().any(|directory| directory.ends_with("/src/ssh")));
        assert!(!directories.iter().any(|directory| directory.ends_with(".rs")));
    }
}
