use std::sync::Arc;

use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::credentials::{Argon2Codec, CredentialCodec};
use crate::datastore::{Datastore, MemoryDatastore, PgDatastore};

/// Everything the models need to reach the outside world: the datastore,
/// the credential codec and the clock. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    pub store: Arc<dyn Datastore>,
    pub codec: Arc<dyn CredentialCodec>,
    pub clock: Arc<dyn Clock>,
}

impl Db {
    pub fn new(
        store: Arc<dyn Datastore>,
        codec: Arc<dyn CredentialCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            codec,
            clock,
        }
    }

    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn Datastore> = match &config.database_url {
            Some(url) => Arc::new(PgDatastore::connect(url).await?),
            None => {
                warn!("DATABASE_URL not set; using the in-memory datastore");
                Arc::new(MemoryDatastore::new())
            }
        };
        let codec = Arc::new(Argon2Codec::from_config(&config.hashing)?);
        Ok(Self::new(store, codec, Arc::new(SystemClock)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::FixedClock;
    use time::macros::datetime;

    /// In-memory handle with cheap hashing and a ticking test clock. The
    /// concrete store and clock are returned for inspection.
    pub fn db() -> (Db, MemoryDatastore, Arc<FixedClock>) {
        let store = MemoryDatastore::new();
        let clock = Arc::new(FixedClock::new(datetime!(2024-01-01 00:00 UTC)));
        let db = Db::new(
            Arc::new(store.clone()),
            Arc::new(Argon2Codec::fast()),
            clock.clone(),
        );
        (db, store, clock)
    }
}
