use crate::config::AppConfig;
use crate::db::db_pool::DuckDbConnectionManager;
use crate::llm::LlmManager;
use crate::session::SessionState;
use crate::web::templates::init_templates;
use minijinja::Environment;
use r2d2::Pool;
use tokio::sync::{Mutex, RwLock};

/// Shared application state for the web server. The session lives here as
/// an explicit field and is passed into handlers through this state - no
/// process-wide singletons.
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Pool<DuckDbConnectionManager>,
    pub template_env: Environment<'static>,
    pub llm_manager: Mutex<LlmManager>,
    pub session: RwLock<SessionState>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db_pool: Pool<DuckDbConnectionManager>,
        llm_manager: LlmManager,
    ) -> Self {
        Self {
            config,
            db_pool,
            template_env: init_templates(),
            llm_manager: Mutex::new(llm_manager),
            session: RwLock::new(SessionState::new()),
            startup_time: chrono::Utc::now(),
        }
    }
}
