use std::sync::Arc;

use crate::config::Config;
use crate::mail::Mailer;

/// Shared application state. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub mailer: Arc<Mailer>,
}

impl AppState {
    pub fn new(config: Config, mailer: Mailer) -> Self {
        Self {
            config: Arc::new(config),
            mailer: Arc::new(mailer),
        }
    }
}
