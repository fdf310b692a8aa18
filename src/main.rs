//! mes-fetch - Load MES data through the cached data service
//!
//! Mounts one or more data services against a shared cache and prints their
//! state after every load cycle as one JSON line on stdout.

use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mes_data::cli::{Cli, RunConfig};
use mes_data::refresh::{RefreshHandle, RefreshMessage};
use mes_data::{CacheManager, DataService, FetchState, Fetcher};

/// One line of output
#[derive(Debug, Serialize)]
struct CycleReport<'a> {
    cycle: u32,
    kind: &'static str,
    state: &'a FetchState,
    fetches: usize,
}

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("mes_data=debug,mes_fetch=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mes_data=info,mes_fetch=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Wraps a fetcher so every invocation is counted
fn counted(fetcher: Fetcher, fetches: Arc<AtomicUsize>) -> Fetcher {
    Fetcher::new(move || {
        fetches.fetch_add(1, Ordering::SeqCst);
        fetcher.call()
    })
}

fn print_report(cycle: u32, kind: &'static str, state: &FetchState, fetches: &AtomicUsize) {
    let report = CycleReport {
        cycle,
        kind,
        state,
        fetches: fetches.load(Ordering::SeqCst),
    };
    match serde_json::to_string(&report) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::error!("failed to serialize report: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tracing::debug!("mes-fetch starting with args: {:?}", cli);

    let config = match RunConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    let cache = Arc::new(CacheManager::new());
    let fetches = Arc::new(AtomicUsize::new(0));
    let fetcher = counted(config.source().into_fetcher(), Arc::clone(&fetches));

    // Each cycle mounts a fresh service, like separate screens asking for the same data
    let mut cycle = 1;
    let mut service = DataService::new(fetcher.clone(), Arc::clone(&cache), config.options.clone());
    let mut last = service.mount().await;
    print_report(cycle, "mount", &last, &fetches);

    for _ in 1..config.repeat {
        cycle += 1;
        service = DataService::new(fetcher.clone(), Arc::clone(&cache), config.options.clone());
        last = service.mount().await;
        print_report(cycle, "mount", &last, &fetches);
    }

    if config.refetch {
        cycle += 1;
        last = service.refetch().await;
        print_report(cycle, "refetch", &last, &fetches);
    }

    if let Some(refresh) = config.watch.clone() {
        tracing::info!(
            "refreshing {} every {:?}, press Ctrl-C to stop",
            config.location,
            refresh.interval
        );
        let mut handle = RefreshHandle::spawn(service.handle(), refresh);

        loop {
            tokio::select! {
                message = handle.receiver.recv() => match message {
                    Some(RefreshMessage::RefreshStarted) => {
                        tracing::debug!("refresh started: key={}", service.cache_key());
                    }
                    Some(RefreshMessage::RefreshCompleted(_)) | Some(RefreshMessage::RefreshError(_)) => {
                        cycle += 1;
                        print_report(cycle, "refresh", &service.snapshot(), &fetches);
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        handle.shutdown().await;
        last = service.snapshot();
    }

    if let Some(e) = &last.error {
        eprintln!("error: {}", e);
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
