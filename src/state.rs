use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Db;
use crate::mailer::{LogDelivery, UserMailer};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    pub mailer: UserMailer,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = Db::connect(&config).await?;
        let mailer = UserMailer::new(&config.mail, Arc::new(LogDelivery))?;
        Ok(Self::from_parts(db, config, mailer))
    }

    pub fn from_parts(db: Db, config: Arc<AppConfig>, mailer: UserMailer) -> Self {
        Self { db, config, mailer }
    }
}
