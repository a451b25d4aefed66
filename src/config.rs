use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{config_error, Error};

/// Upper bound on the bid window: one week.
const MAX_BID_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Postgres connection string. When absent the service runs on the
    /// process-local store, which is only suitable for a single instance.
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    /// How long a bid stays open for confirmation after creation.
    pub bid_ttl_secs: i64,

    /// Period of the expiry sweep; 0 turns the sweep off and leaves expiry to
    /// confirmation attempts alone.
    pub reaper_interval_secs: u64,
    pub reaper_batch_size: i64,

    pub ledger_gateway_url: String,
    pub ledger_channel: String,
    pub ledger_chaincode: String,
    pub ledger_timeout_secs: u64,

    /// Enrolled identity used for read-only ledger queries.
    pub ledger_reader_identity: String,

    /// Optional JSON fixture loaded into the store at start-up.
    pub seed_file: Option<String>,

    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, Error> {
        let get = |key: &str| vars.get(key).filter(|value| !value.is_empty()).cloned();

        let ledger_gateway_url = get("LEDGER_GATEWAY_URL")
            .ok_or_else(|| config_error("LEDGER_GATEWAY_URL is required"))?;

        let config = Self {
            listen_addr: parse_or(&get, "LISTEN_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            bid_ttl_secs: parse_or(&get, "BID_TTL_SECS", 60)?,
            reaper_interval_secs: parse_or(&get, "REAPER_INTERVAL_SECS", 30)?,
            reaper_batch_size: parse_or(&get, "REAPER_BATCH_SIZE", 100)?,
            ledger_gateway_url,
            ledger_channel: get("LEDGER_CHANNEL").unwrap_or_else(|| "mychannel".into()),
            ledger_chaincode: get("LEDGER_CHAINCODE").unwrap_or_else(|| "meat_traceability".into()),
            ledger_timeout_secs: parse_or(&get, "LEDGER_TIMEOUT_SECS", 30)?,
            ledger_reader_identity: get("LEDGER_READER_IDENTITY").unwrap_or_else(|| "admin".into()),
            seed_file: get("SEED_FILE"),
            log_json: get("LOG_FORMAT").map_or(false, |format| format == "json"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_BID_TTL_SECS).contains(&self.bid_ttl_secs) {
            return Err(config_error(format!(
                "BID_TTL_SECS must be between 1 and {}, got {}",
                MAX_BID_TTL_SECS, self.bid_ttl_secs
            )));
        }
        if self.reaper_batch_size < 1 {
            return Err(config_error(format!(
                "REAPER_BATCH_SIZE must be positive, got {}",
                self.reaper_batch_size
            )));
        }
        if self.database_max_connections == 0 {
            return Err(config_error("DATABASE_MAX_CONNECTIONS must be positive"));
        }
        if self.ledger_timeout_secs == 0 {
            return Err(config_error("LEDGER_TIMEOUT_SECS must be positive"));
        }
        Ok(())
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| config_error(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

#[test]
fn defaults_apply() {
    let vars = HashMap::from([(
        "LEDGER_GATEWAY_URL".to_string(),
        "http://localhost:8801".to_string(),
    )]);

    let config = Config::from_vars(vars).unwrap();
    assert_eq!(config.bid_ttl_secs, 60);
    assert_eq!(config.listen_addr.port(), 3000);
    assert_eq!(config.ledger_channel, "mychannel");
    assert!(config.database_url.is_none());
    assert!(!config.log_json);
}

#[test]
fn ledger_gateway_is_required() {
    let err = Config::from_vars(HashMap::new()).unwrap_err();
    assert!(err.is_internal());
}

#[test]
fn malformed_numbers_are_rejected() {
    let vars = HashMap::from([
        ("LEDGER_GATEWAY_URL".to_string(), "http://localhost:8801".to_string()),
        ("BID_TTL_SECS".to_string(), "sixty".to_string()),
    ]);

    let err = Config::from_vars(vars).unwrap_err();
    assert!(err.message.contains("BID_TTL_SECS"));
}

#[test]
fn bid_ttl_must_be_positive_and_bounded() {
    for ttl in ["0", "-5", "9223372036854775807"] {
        let vars = HashMap::from([
            ("LEDGER_GATEWAY_URL".to_string(), "http://localhost:8801".to_string()),
            ("BID_TTL_SECS".to_string(), ttl.to_string()),
        ]);

        let err = Config::from_vars(vars).unwrap_err();
        assert!(err.is_internal());
        assert!(err.message.contains("BID_TTL_SECS"), "{}", ttl);
    }

    let vars = HashMap::from([
        ("LEDGER_GATEWAY_URL".to_string(), "http://localhost:8801".to_string()),
        ("BID_TTL_SECS".to_string(), MAX_BID_TTL_SECS.to_string()),
    ]);
    assert_eq!(Config::from_vars(vars).unwrap().bid_ttl_secs, MAX_BID_TTL_SECS);
}

#[test]
fn reaper_batch_size_must_be_positive() {
    for size in ["0", "-1"] {
        let vars = HashMap::from([
            ("LEDGER_GATEWAY_URL".to_string(), "http://localhost:8801".to_string()),
            ("REAPER_BATCH_SIZE".to_string(), size.to_string()),
        ]);

        let err = Config::from_vars(vars).unwrap_err();
        assert!(err.message.contains("REAPER_BATCH_SIZE"), "{}", size);
    }
}
