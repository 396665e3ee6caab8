//! Application state shared across all request handlers.

use duel_core::config::SharedConfig;
use duel_core::processors::CoordinatorHandle;

/// Cloneable; the handle is an mpsc sender and every config section sits
/// behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Front door to the coordinator task.
    pub coordinator: CoordinatorHandle,
    /// Runtime configuration (reloaded via SIGHUP).
    pub config: SharedConfig,
}

impl AppState {
    pub fn new(coordinator: CoordinatorHandle, config: SharedConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Outbound queue capacity for a new play session.
    pub async fn outbound_buffer(&self) -> usize {
        self.config.matchmaking.read().await.outbound_buffer
    }
}
