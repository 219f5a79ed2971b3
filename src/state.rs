//! Shared application state handed to every ingress path.

use std::sync::Arc;

use crate::calendar::{BusinessCalendar, Clock};
use crate::config::GlobalConfig;
use crate::persistence::config_repo::ConfigRepo;
use crate::persistence::db::Database;
use crate::persistence::task_repo::TaskRepo;
use crate::slack::client::ChatGateway;

/// Everything a handler, the scheduler, or the janitor needs.
#[derive(Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// `SQLite` connection pool.
    pub db: Arc<Database>,
    /// Chat egress.
    pub chat: Arc<dyn ChatGateway>,
    /// Source of "now".
    pub clock: Arc<dyn Clock>,
    /// Business-day calendar.
    pub calendar: Arc<BusinessCalendar>,
}

impl AppState {
    /// Channel config repository over the shared pool.
    #[must_use]
    pub fn configs(&self) -> ConfigRepo {
        ConfigRepo::new(Arc::clone(&self.db))
    }

    /// Review task repository over the shared pool.
    #[must_use]
    pub fn tasks(&self) -> TaskRepo {
        TaskRepo::new(Arc::clone(&self.db))
    }
}
