use textpool_core::{ModelConfig, ModelRunner};

enum SlotState<R> {
    Uninitialized,
    Ready(R),
    /// Holds the description of the construction error. Never retried.
    Failed(String),
}

/// The one model runner owned by a worker thread.
///
/// Built on the first request the worker handles and kept for the worker's
/// lifetime. A failed construction is cached: every later request on this
/// worker fails fast instead of paying the load cost again.
pub struct ModelSlot<R> {
    state: SlotState<R>,
    attempts: usize,
}

impl<R: ModelRunner> ModelSlot<R> {
    pub fn new() -> Self {
        Self {
            state: SlotState::Uninitialized,
            attempts: 0,
        }
    }

    pub fn get_or_init(&mut self, config: &ModelConfig) -> Result<&mut R, &str> {
        if let SlotState::Uninitialized = self.state {
            self.attempts += 1;
            let thread = std::thread::current();
            let name = thread.name().unwrap_or("unnamed");
            tracing::info!("Creating new model runner for thread {name}");

            self.state = match R::load(config) {
                Ok(runner) => SlotState::Ready(runner),
                Err(e) => {
                    let reason = crate::task::error_chain(&e);
                    tracing::error!("Unable to initialize model runner on {name}: {reason}");
                    SlotState::Failed(reason)
                }
            };
        }

        match &mut self.state {
            SlotState::Ready(runner) => Ok(runner),
            SlotState::Failed(reason) => Err(reason.as_str()),
            SlotState::Uninitialized => unreachable!("slot initialized above"),
        }
    }

    /// Retires a runner that panicked mid-invocation. Its internal state can
    /// no longer be trusted, and the slot is not rebuilt.
    pub fn poison(&mut self, reason: String) {
        self.state = SlotState::Failed(reason);
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SlotState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SlotState::Failed(_))
    }

    /// Number of times this slot tried to load a runner. Never above 1.
    pub fn construction_attempts(&self) -> usize {
        self.attempts
    }
}

impl<R: ModelRunner> Default for ModelSlot<R> {
    fn default() -> Self {
        Self::new()
    }
}
