use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::types::ProcessSpec;

/// A started process. Each stream accessor hands its stream out once.
#[async_trait]
pub trait ProcessSession: Send {
    fn pid(&self) -> Option<u32>;
    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>>;
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    /// Exit code of the process; `-1` when it has none (killed by a signal).
    async fn wait(&mut self) -> anyhow::Result<i32>;
}

#[async_trait]
pub trait ProcessManager: Send + Sync {
    fn name(&self) -> &str;
    /// Errors here mean the process could not be started at all.
    async fn start(&self, spec: &ProcessSpec) -> anyhow::Result<Box<dyn ProcessSession>>;
}
