//! Command-line interface parsing for mes-fetch
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the data service and refresh settings the binary runs with.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::cache::DEFAULT_TTL;
use crate::refresh::RefreshConfig;
use crate::service::DataServiceOptions;
use crate::source::Source;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The source location is empty
    #[error("Source must be a URL or a path to a JSON file")]
    EmptySource,

    /// At least one load cycle has to run
    #[error("Invalid repeat count: {0}. At least 1 load is required")]
    InvalidRepeat(u32),

    /// A zero polling interval would spin
    #[error("Invalid watch interval: 0 seconds")]
    InvalidWatchInterval,
}

/// mes-fetch - Load MES data through the cached data service
#[derive(Parser, Debug)]
#[command(name = "mes-fetch")]
#[command(about = "Fetch MES data through a cached, de-duplicated data service")]
#[command(version)]
pub struct Cli {
    /// URL (http/https) or path to a JSON file
    ///
    /// The response may be the payload itself or an envelope:
    ///   {"success": true, "data": [...]}
    ///   {"success": false, "error": {"message": "..."}}
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Explicit cache key shared by every load (defaults to the source)
    #[arg(long, value_name = "KEY")]
    pub cache_key: Option<String>,

    /// Time-to-live of cached responses in milliseconds
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_TTL.as_millis() as u64)]
    pub cache_ttl_ms: u64,

    /// Bypass the cache entirely
    #[arg(long)]
    pub no_cache: bool,

    /// Number of independent loads sharing one cache
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub repeat: u32,

    /// Finish with a forced refetch that bypasses the cache
    #[arg(long)]
    pub refetch: bool,

    /// Keep refetching every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Enable debug logging on stderr
    #[arg(long)]
    pub debug: bool,
}

/// Settings derived from CLI arguments
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Source location as given on the command line
    pub location: String,
    /// Options for every data service the run mounts
    pub options: DataServiceOptions,
    /// How many services to mount one after another
    pub repeat: u32,
    /// Whether to finish with a refetch
    pub refetch: bool,
    /// Background refresh, when `--watch` was given
    pub watch: Option<RefreshConfig>,
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with appropriate settings
    /// * `Err(CliError)` if an argument is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let location = cli.source.trim();
        if location.is_empty() {
            return Err(CliError::EmptySource);
        }
        if cli.repeat == 0 {
            return Err(CliError::InvalidRepeat(cli.repeat));
        }

        let watch = match cli.watch {
            None => None,
            Some(0) => return Err(CliError::InvalidWatchInterval),
            Some(secs) => Some(RefreshConfig {
                interval: Duration::from_secs(secs),
                enabled: true,
            }),
        };

        let cache_key = cli
            .cache_key
            .clone()
            .unwrap_or_else(|| format!("source:{}", location));

        Ok(RunConfig {
            location: location.to_string(),
            options: DataServiceOptions::default()
                .use_cache(!cli.no_cache)
                .cache_ttl(Duration::from_millis(cli.cache_ttl_ms))
                .cache_key(cache_key),
            repeat: cli.repeat,
            refetch: cli.refetch,
            watch,
        })
    }

    pub fn source(&self) -> Source {
        Source::parse(&self.location)
    }
}
