use std::sync::Arc;

use tracing::{info, warn};

use super::{
    config::Config,
    database::{RedisStore, Store},
    error::StoreError,
    generator::ReviewGenerator,
    memory::MemoryStore,
    neis::{MealSource, NeisClient},
    openai::{Completion, OpenAiClient},
    registry::Registry,
    review::InFlight,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub source: Arc<dyn MealSource>,
    pub generator: ReviewGenerator,
    pub registry: Registry,
    pub in_flight: InFlight,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let store = open_store(&config).await?;
        let source = Arc::new(NeisClient::new(&config));
        let completion = Arc::new(OpenAiClient::new(&config));

        Ok(Self::from_parts(config, store, source, completion))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        source: Arc<dyn MealSource>,
        completion: Arc<dyn Completion>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            source,
            generator: ReviewGenerator::new(completion),
            registry: Registry::new(),
            in_flight: InFlight::default(),
        })
    }
}

pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>, StoreError> {
    match &config.redis_url {
        Some(redis_url) => {
            info!("Connecting to redis...");
            Ok(Arc::new(RedisStore::connect(redis_url).await?))
        }
        None => {
            warn!("REDIS_URL not set, keeping data in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
