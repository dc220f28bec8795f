use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::database::models::{BOOKINGS, REVIEWS, TOURS, USERS};
use crate::database::{
    DatabaseManager, MemoryPrincipalStore, MemoryRecordStore, PgPrincipalStore, PrincipalStore, RecordStore,
    Repository,
};
use crate::services::checkout::{CheckoutProvider, LocalCheckout};
use crate::services::mailer::{LogMailer, Mailer};

/// Everything a request handler may touch. Configuration is immutable once
/// the state is built.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenIssuer>,
    pub users: Arc<dyn PrincipalStore>,
    pub user_records: Arc<dyn RecordStore>,
    pub tours: Arc<dyn RecordStore>,
    pub reviews: Arc<dyn RecordStore>,
    pub bookings: Arc<dyn RecordStore>,
    pub mailer: Arc<dyn Mailer>,
    pub checkout: Arc<dyn CheckoutProvider>,
}

impl AppState {
    pub fn postgres(config: AppConfig, database: &DatabaseManager) -> Self {
        let pool = database.pool().clone();
        Self::assemble(
            config,
            Arc::new(PgPrincipalStore::new(pool.clone())),
            Arc::new(Repository::new(&USERS, pool.clone())),
            Arc::new(Repository::new(&TOURS, pool.clone())),
            Arc::new(Repository::new(&REVIEWS, pool.clone())),
            Arc::new(Repository::new(&BOOKINGS, pool)),
        )
    }

    pub fn in_memory(config: AppConfig) -> Self {
        let user_records = MemoryRecordStore::new(&USERS);
        let principals = MemoryPrincipalStore::new(user_records.documents());
        Self::assemble(
            config,
            Arc::new(principals),
            Arc::new(user_records),
            Arc::new(MemoryRecordStore::new(&TOURS)),
            Arc::new(MemoryRecordStore::new(&REVIEWS)),
            Arc::new(MemoryRecordStore::new(&BOOKINGS)),
        )
    }

    fn assemble(
        config: AppConfig,
        users: Arc<dyn PrincipalStore>,
        user_records: Arc<dyn RecordStore>,
        tours: Arc<dyn RecordStore>,
        reviews: Arc<dyn RecordStore>,
        bookings: Arc<dyn RecordStore>,
    ) -> Self {
        let base_url = config
            .server
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));
        Self {
            tokens: Arc::new(TokenIssuer::from_config(&config.security)),
            config: Arc::new(config),
            users,
            user_records,
            tours,
            reviews,
            bookings,
            mailer: Arc::new(LogMailer),
            checkout: Arc::new(LocalCheckout::new(base_url)),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }
}
