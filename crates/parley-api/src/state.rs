use std::sync::Arc;

use tracing::error;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    /// Signs and verifies session tokens.
    pub jwt_secret: String,
    /// Shared with the messaging bridge and the payment provider.
    pub webhook_secret: Option<String>,
    /// Recorded as `from_number` on outbound messages.
    pub business_number: String,
}

/// Run blocking database work off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Upstream(anyhow::anyhow!("blocking task failed: {}", e))
        })?
}
