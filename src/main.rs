use std::sync::Arc;
use std::time::Duration;

use haulbid::config::Config;
use haulbid::db::{MemoryStore, PgStore, Store};
use haulbid::engine::{spawn_reaper, Engine, Settings};
use haulbid::error::Error;
use haulbid::external::{GatewayLedger, Ledger};
use haulbid::logger::init_tracing;
use haulbid::notify::Hub;
use haulbid::seed::Fixture;
use haulbid::server::{serve, DynAPI};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_json);

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::new(url, config.database_max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-process store");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(path) = &config.seed_file {
        Fixture::from_file(path).await?.load(&*store).await?;
    }

    let ledger: Arc<dyn Ledger> = Arc::new(GatewayLedger::new(
        &config.ledger_gateway_url,
        &config.ledger_channel,
        &config.ledger_chaincode,
        Duration::from_secs(config.ledger_timeout_secs),
    )?);

    let hub = Arc::new(Hub::new());

    let settings = Settings {
        bid_ttl: chrono::Duration::seconds(config.bid_ttl_secs),
        reaper_batch_size: config.reaper_batch_size,
        ledger_reader: config.ledger_reader_identity.clone(),
    };
    let engine = Arc::new(Engine::new(store, ledger, hub.clone(), settings)?);

    if config.reaper_interval_secs > 0 {
        spawn_reaper(
            engine.clone(),
            Duration::from_secs(config.reaper_interval_secs),
        );
    }

    serve(engine as DynAPI, hub, config.listen_addr).await
}
