use serde::Serialize;

use crate::config::ModelConfig;
use crate::error::ModelError;

/// An expensive-to-load text model, owned by exactly one worker thread.
///
/// Implementations are constructed on the thread that uses them and never
/// leave it, so `Send` is not required.
pub trait ModelRunner: Sized + 'static {
    type Record: Serialize;

    /// Loads the model. Called at most once per worker.
    fn load(config: &ModelConfig) -> Result<Self, ModelError>;

    /// Runs the model against `text`. `Ok(None)` means the model produced
    /// no result at all, which callers treat as a failure.
    fn run(&mut self, text: &str) -> Result<Option<Vec<Self::Record>>, ModelError>;
}
