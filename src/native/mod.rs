mod executor;
mod filesystem;

/// The machine this process runs on, seen through the same filesystem and
/// executor seams as a remote connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHost;
