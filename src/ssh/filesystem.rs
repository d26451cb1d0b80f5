use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    pin::Pin,
};

use async_trait::async_trait;
use russh_sftp::{
    client::{
        fs::{File, Metadata},
        SftpSession,
    },
    protocol::OpenFlags,
};

use super::Connection;
use crate::{
    executor::{Executor, ProcessConfiguration},
    filesystem::{path_to_str, DirEntry, DirEntryType, FileStream, Filesystem, OpenOptions},
};

#[async_trait]
impl Filesystem for Connection {
    fn is_remote(&self) -> bool {
        true
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        let sftp = self.sftp().await?;
        sftp.try_exists(path_to_str(path)?).await.map_err(io::Error::other)
    }

    async fn is_dir(&self, path: &Path) -> io::Result<bool> {
        let sftp = self.sftp().await?;
        let path = path_to_str(path)?;
        if !sftp.try_exists(path.clone()).await.map_err(io::Error::other)? {
            return Ok(false);
        }
        let metadata = sftp.metadata(path).await.map_err(io::Error::other)?;
        Ok(metadata.is_dir())
    }

    async fn open_file(&self, path: &Path, open_options: &OpenOptions) -> io::Result<Box<dyn FileStream>> {
        let mut flags = OpenFlags::empty();
        if open_options.is_read() {
            flags.insert(OpenFlags::READ);
        }
        if open_options.is_write() {
            flags.insert(OpenFlags::WRITE);
        }
        if open_options.is_append() {
            flags.insert(OpenFlags::APPEND);
        }
        if open_options.is_truncate() {
            flags.insert(OpenFlags::TRUNCATE);
        }
        if open_options.is_create() {
            flags.insert(OpenFlags::CREATE);
        }

        let sftp = self.sftp().await?;
        let file: File = sftp
            .open_with_flags(path_to_str(path)?, flags)
            .await
            .map_err(io::Error::other)?;
        Ok(Box::new(file))
    }

    async fn rename_file(&self, old_path: &Path, new_path: &Path) -> io::Result<()> {
        let sftp = self.sftp().await?;
        sftp.rename(path_to_str(old_path)?, path_to_str(new_path)?)
            .await
            .map_err(io::Error::other)
    }

    async fn copy_file(&self, old_path: &Path, new_path: &Path) -> io::Result<()> {
        // sftp has no server-side copy, run cp on the host instead
        let mut config = ProcessConfiguration::new("cp");
        config
            .arg(path_to_str(old_path)?)
            .arg(path_to_str(new_path)?)
            .redirect_stderr();
        let output = self.execute(&config).await.map_err(io::Error::other)?;
        if output.succeeded() {
            return Ok(());
        }
        Err(io::Error::other(format!(
            "remote cp exited with {:?}: {}",
            output.status_code,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let sftp = self.sftp().await?;
        sftp.remove_file(path_to_str(path)?).await.map_err(io::Error::other)
    }

    async fn create_dir_recursively(&self, path: &Path) -> io::Result<()> {
        let sftp = self.sftp().await?;
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            if current.parent().is_none() {
                continue;
            }
            let current_str = path_to_str(&current)?;
            if sftp.try_exists(current_str.clone()).await.map_err(io::Error::other)? {
                continue;
            }
            if let Err(err) = sftp.create_dir(current_str).await {
                // lost a race with another creator, which is fine as long as a directory is there now
                if !self.is_dir(&current).await? {
                    return Err(io::Error::other(err));
                }
            }
        }
        Ok(())
    }

    async fn remove_dir_recursively(&self, path: &Path) -> io::Result<()> {
        let sftp = self.sftp().await?;
        remove_tree(&sftp, path_to_str(path)?).await
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let sftp = self.sftp().await?;
        let read_dir = sftp.read_dir(path_to_str(path)?).await.map_err(io::Error::other)?;

        let entries = read_dir
            .filter(|entry| !matches!(entry.file_name().as_str(), "." | ".."))
            .map(|entry| {
                let file_type = entry.file_type();
                let entry_type = if file_type.is_dir() {
                    DirEntryType::Dir
                } else if file_type.is_file() {
                    DirEntryType::File
                } else if file_type.is_symlink() {
                    DirEntryType::Symlink
                } else {
                    DirEntryType::Other
                };
                let name = entry.file_name();
                let entry_path = path.join(&name);
                DirEntry::new(name, entry_type, entry_path)
            })
            .collect();
        Ok(entries)
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        let sftp = self.sftp().await?;
        sftp.set_metadata(
            path_to_str(path)?,
            Metadata {
                size: None,
                uid: None,
                user: None,
                gid: None,
                group: None,
                permissions: Some(mode),
                atime: None,
                mtime: None,
            },
        )
        .await
        .map_err(io::Error::other)
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let sftp = self.sftp().await?;
        let canonical = sftp.canonicalize(path_to_str(path)?).await.map_err(io::Error::other)?;
        Ok(PathBuf::from(canonical))
    }
}

fn remove_tree(sftp: &SftpSession, path: String) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
    Box::pin(async move {
        let read_dir = sftp.read_dir(path.clone()).await.map_err(io::Error::other)?;
        for entry in read_dir {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let child = format!("{}/{}", path.trim_end_matches('/'), name);
            if entry.file_type().is_dir() {
                remove_tree(sftp, child).await?;
            } else {
                sftp.remove_file(child).await.map_err(io::Error::other)?;
            }
        }
        sftp.remove_dir(path).await.map_err(io::Error::other)
    })
}
