//! Trait definitions for the engine module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::EngineError;
use super::types::{EngineEvent, VfsEntry};

/// A transcoding engine with a private, flat virtual filesystem.
///
/// One engine instance runs a single invocation at a time; callers must
/// await each operation before issuing the next.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Checks that the engine is initialized and able to run commands.
    async fn validate(&self) -> Result<(), EngineError>;

    /// Places a named byte buffer into the virtual filesystem.
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError>;

    /// Runs one command.
    ///
    /// Log lines and progress fractions are sent on `events` while the
    /// command runs. The sender is dropped when the command settles, so
    /// a receiver loop ends on its own.
    async fn exec(
        &self,
        args: &[String],
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError>;

    /// Reads a named buffer out of the virtual filesystem.
    async fn read(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Deletes a named buffer. Fails with [`EngineError::NotFound`] when absent.
    async fn delete(&self, name: &str) -> Result<(), EngineError>;

    /// Lists the entries of a directory; `"."` is the root.
    async fn list(&self, dir: &str) -> Result<Vec<VfsEntry>, EngineError>;

    /// Whether a name exists in the root directory.
    async fn exists(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self.list(".").await?.iter().any(|entry| entry.name == name))
    }
}
