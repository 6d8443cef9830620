//! The system under test: input injection and screen capture.

mod client;
mod keys;

use std::future::Future;
use std::time::Duration;

pub use client::{SutClient, SutStatus};
pub use keys::canonical_key;

use crate::detector::Screenshot;
use crate::error::ExecutorError;

/// Sends input to the SUT and captures its screen.
pub trait Executor: Send + Sync {
    fn click(&self, x: i32, y: i32) -> impl Future<Output = Result<(), ExecutorError>> + Send;

    fn key(&self, name: &str) -> impl Future<Output = Result<(), ExecutorError>> + Send;

    /// Pauses locally. Nothing is sent to the SUT.
    fn wait(&self, duration: Duration) -> impl Future<Output = Result<(), ExecutorError>> + Send {
        async move {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }

    fn capture(&self) -> impl Future<Output = Result<Screenshot, ExecutorError>> + Send;
}
