use std::sync::Arc;

use crate::auth::FieldCipher;
use crate::database::DatabaseManager;
use crate::mail::Mailer;
use crate::middleware::rate_limit::ClientRateLimiter;
use crate::services::sync_service::SyncService;

/// Shared per-process dependencies, constructed once in `main` and
/// injected into every handler via axum state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DatabaseManager>,
    pub cipher: Arc<FieldCipher>,
    pub mailer: Arc<Mailer>,
    pub mail_limiter: Arc<ClientRateLimiter>,
    pub sync: Arc<SyncService>,
}
