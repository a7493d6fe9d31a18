use std::{
    collections::HashMap,
    env::{self, VarError},
    fs, io,
    ops::Deref,
    sync::Arc,
    time::Duration,
};

use tracing::info;
use url::Url;

use crate::{
    cache::ApiCache,
    error::Error,
    provider::{Transport, HTTP},
    service::{BlockchainService, ExchangeService, MarketService, PortfolioService},
};

const DEFAULT_TIMEOUT: u64 = 10;
const DEFAULT_REFRESH_INTERVAL: u64 = 300;
const DEFAULT_MAX_CACHE_ENTRIES: usize = 512;
const DEFAULT_SOCKET_RECONNECT_INTERVAL: u64 = 5;

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

/// Everything the binary shares between the push listener, the cache
/// refresher and the presentation layer.
pub struct State {
    pub config: Config,
    pub cache: Arc<ApiCache>,
    pub blockchain: BlockchainService,
    pub exchange: ExchangeService,
    pub portfolio: PortfolioService,
    pub market: MarketService,
}

impl State {
    pub fn new(config: Config) -> Result<State, Error> {
        let http = HTTP::from_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(http)))
    }

    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
    ) -> State {
        let cache = Arc::new(ApiCache::new(
            Duration::from_secs(config.refresh_interval),
            config.max_cache_entries,
        ));

        info!(
            "Cache ready: refresh interval {}s, {} entries per result shape",
            config.refresh_interval, config.max_cache_entries
        );

        Self {
            blockchain: BlockchainService::new(
                Arc::clone(&transport),
                Arc::clone(&cache),
            ),
            exchange: ExchangeService::new(
                Arc::clone(&transport),
                Arc::clone(&cache),
            ),
            portfolio: PortfolioService::new(
                Arc::clone(&transport),
                Arc::clone(&cache),
            ),
            market: MarketService::new(transport, Arc::clone(&cache)),
            cache,
            config,
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub websocket_url: Option<String>,
    pub timeout: u64,
    pub refresh_interval: u64,
    pub max_cache_entries: usize,
    pub tracked_chains: Vec<String>,
    pub tracked_exchanges: Vec<String>,
    pub socket_reconnect_interval: u64,
    pub cache_warmup: bool,
}

pub fn get_configuration() -> Result<Config, Error> {
    get_configuration_from(|key| env::var(key))
}

/// Builds the config from any key lookup shaped like `env::var`.
pub fn get_configuration_from<F>(lookup: F) -> Result<Config, Error>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let optional = |key: &str| -> Result<Option<String>, Error> {
        match lookup(key) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value.trim().to_owned())),
            Err(VarError::NotPresent) => Ok(None),
            Err(e) => Err(Error::VAR(e)),
        }
    };
    let list = |key: &str| -> Result<Vec<String>, Error> {
        Ok(optional(key)?
            .map(|value| {
                value
                    .split(',')
                    .map(|item| item.trim().to_owned())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default())
    };

    let api_base_url = lookup("API_BASE_URL")?.trim().to_owned();
    Url::parse(&api_base_url)?;

    let api_key = optional("API_KEY")?;
    let websocket_url = optional("WS_URL")?;
    if let Some(url) = &websocket_url {
        Url::parse(url)?;
    }

    let timeout = match optional("TIMEOUT")? {
        Some(value) => value.parse()?,
        None => DEFAULT_TIMEOUT,
    };
    let refresh_interval = match optional("REFRESH_INTERVAL")? {
        Some(value) => value.parse()?,
        None => DEFAULT_REFRESH_INTERVAL,
    };
    let max_cache_entries = match optional("MAX_CACHE_ENTRIES")? {
        Some(value) => value.parse()?,
        None => DEFAULT_MAX_CACHE_ENTRIES,
    };
    let socket_reconnect_interval = match optional("SOCKET_RECONNECT_INTERVAL")? {
        Some(value) => value.parse()?,
        None => DEFAULT_SOCKET_RECONNECT_INTERVAL,
    };
    let cache_warmup = match optional("CACHE_WARMUP")? {
        Some(value) => value.parse()?,
        None => true,
    };

    if timeout == 0 {
        return Err(Error::ConfigurationError(String::from(
            "TIMEOUT must be at least one second",
        )));
    }

    if refresh_interval == 0 {
        return Err(Error::ConfigurationError(String::from(
            "REFRESH_INTERVAL must be at least one second",
        )));
    }

    if max_cache_entries == 0 {
        return Err(Error::ConfigurationError(String::from(
            "MAX_CACHE_ENTRIES must be positive",
        )));
    }

    let config = Config {
        api_base_url,
        api_key,
        websocket_url,
        timeout,
        refresh_interval,
        max_cache_entries,
        tracked_chains: list("TRACKED_CHAINS")?,
        tracked_exchanges: list("TRACKED_EXCHANGES")?,
        socket_reconnect_interval,
        cache_warmup,
    };

    Ok(config)
}

/// Loads `KEY=VALUE` lines of the `.env` file next to the manifest into
/// the process environment. A missing file is not an error.
pub fn set_configuration() -> Result<(), Error> {
    let config_file: &str = ".env";

    let directory = env!("CARGO_MANIFEST_DIR");
    let path = format!("{}/{}", directory, config_file);

    let config_string = match fs::read_to_string(path) {
        Ok(config_string) => config_string,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e)),
    };

    for (key, value) in parse_config_string(&config_string) {
        env::set_var(key, value);
    }

    Ok(())
}

fn parse_config_string(config: &str) -> HashMap<String, String> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_owned(), value.to_owned())
        })
        .collect()
}
