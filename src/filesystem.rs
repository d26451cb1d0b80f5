use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bitflags::bitflags;
use tokio::io::{AsyncRead, AsyncWrite};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct OpenFlags: u8 {
        const READ = 1;
        const WRITE = 1 << 1;
        const APPEND = 1 << 2;
        const TRUNCATE = 1 << 3;
        const CREATE = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    flags: OpenFlags,
}

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions {
            flags: OpenFlags::empty(),
        }
    }

    pub fn read(mut self) -> Self {
        self.flags.insert(OpenFlags::READ);
        self
    }

    pub fn write(mut self) -> Self {
        self.flags.insert(OpenFlags::WRITE);
        self
    }

    pub fn append(mut self) -> Self {
        self.flags.insert(OpenFlags::APPEND);
        self
    }

    pub fn truncate(mut self) -> Self {
        self.flags.insert(OpenFlags::TRUNCATE);
        self
    }

    pub fn create(mut self) -> Self {
        self.flags.insert(OpenFlags::CREATE);
        self
    }

    pub fn is_read(&self) -> bool {
        self.flags.contains(OpenFlags::READ)
    }

    pub fn is_write(&self) -> bool {
        self.flags.contains(OpenFlags::WRITE)
    }

    pub fn is_append(&self) -> bool {
        self.flags.contains(OpenFlags::APPEND)
    }

    pub fn is_truncate(&self) -> bool {
        self.flags.contains(OpenFlags::TRUNCATE)
    }

    pub fn is_create(&self) -> bool {
        self.flags.contains(OpenFlags::CREATE)
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

pub trait FileStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> FileStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryType {
    File,
    Dir,
    Symlink,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: String,
    entry_type: DirEntryType,
    path: PathBuf,
}

impl DirEntry {
    pub(crate) fn new(name: String, entry_type: DirEntryType, path: PathBuf) -> DirEntry {
        DirEntry { name, entry_type, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_type(&self) -> DirEntryType {
        self.entry_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// File operations on one side of a transfer: the local machine or the
/// file-transfer sub-channel of a connection.
#[async_trait]
pub trait Filesystem: Send + Sync {
    fn is_remote(&self) -> bool;

    /// Returns `false` rather than an error for a path that does not exist.
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    async fn is_dir(&self, path: &Path) -> io::Result<bool>;

    async fn open_file(&self, path: &Path, open_options: &OpenOptions) -> io::Result<Box<dyn FileStream>>;

    async fn rename_file(&self, old_path: &Path, new_path: &Path) -> io::Result<()>;

    /// Copies within this filesystem without routing bytes through the caller.
    async fn copy_file(&self, old_path: &Path, new_path: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Creates the directory and its parents. Succeeds when it already exists,
    /// including when another caller created it concurrently.
    async fn create_dir_recursively(&self, path: &Path) -> io::Result<()>;

    async fn remove_dir_recursively(&self, path: &Path) -> io::Result<()>;

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// The absolute path with links and `.`/`..` components resolved.
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Whether `a` and `b` name the same existing file on `filesystem`.
pub(crate) async fn same_file(filesystem: &dyn Filesystem, a: &Path, b: &Path) -> io::Result<bool> {
    if !filesystem.exists(b).await? {
        return Ok(false);
    }
    Ok(filesystem.canonicalize(a).await? == filesystem.canonicalize(b).await?)
}

pub(crate) fn path_to_str(path: &Path) -> io::Result<String> {
    path.to_str()
        .map(String::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("path {path:?} is not valid UTF-8")))
}
