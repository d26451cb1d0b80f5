use std::{
    fs::{FileType, Permissions},
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs::{
    canonicalize, copy, create_dir_all, metadata, read_dir, remove_dir_all, remove_file, rename, set_permissions, try_exists,
    OpenOptions as TokioOpenOptions,
};

use super::LocalHost;
use crate::filesystem::{DirEntry, DirEntryType, FileStream, Filesystem, OpenOptions};

#[async_trait]
impl Filesystem for LocalHost {
    fn is_remote(&self) -> bool {
        false
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        try_exists(path).await
    }

    async fn is_dir(&self, path: &Path) -> io::Result<bool> {
        match metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn open_file(&self, path: &Path, open_options: &OpenOptions) -> io::Result<Box<dyn FileStream>> {
        let mut final_options = TokioOpenOptions::new();
        final_options
            .read(open_options.is_read())
            .write(open_options.is_write())
            .append(open_options.is_append())
            .truncate(open_options.is_truncate())
            .create(open_options.is_create());

        let file = final_options.open(path).await?;
        Ok(Box::new(file))
    }

    async fn rename_file(&self, old_path: &Path, new_path: &Path) -> io::Result<()> {
        match rename(old_path, new_path).await {
            Ok(()) => Ok(()),
            // rename cannot cross devices, fall back to copy and delete
            Err(err) if err.raw_os_error() == Some(nix::libc::EXDEV) => {
                copy(old_path, new_path).await?;
                remove_file(old_path).await
            }
            Err(err) => Err(err),
        }
    }

    async fn copy_file(&self, old_path: &Path, new_path: &Path) -> io::Result<()> {
        copy(old_path, new_path).await.map(|_| ())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        remove_file(path).await
    }

    async fn create_dir_recursively(&self, path: &Path) -> io::Result<()> {
        create_dir_all(path).await
    }

    async fn remove_dir_recursively(&self, path: &Path) -> io::Result<()> {
        remove_dir_all(path).await
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut read_dir = read_dir(path).await?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let entry_name = entry
                .file_name()
                .into_string()
                .map_err(|_| io::Error::other("could not convert os_str into str"))?;
            let entry_type = entry.file_type().await?.into();
            entries.push(DirEntry::new(entry_name, entry_type, entry.path()));
        }

        Ok(entries)
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        set_permissions(path, Permissions::from_mode(mode)).await
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        canonicalize(path).await
    }
}

impl From<FileType> for DirEntryType {
    fn from(value: FileType) -> Self {
        if value.is_file() {
            return DirEntryType::File;
        }
        if value.is_dir() {
            return DirEntryType::Dir;
        }
        if value.is_symlink() {
            return DirEntryType::Symlink;
        }

        DirEntryType::Other
    }
}
