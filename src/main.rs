use logdna_relay::batcher::{self, BatcherConfig};
use logdna_relay::transform::forward_events;
use logdna_relay::{Config, HttpExporter};
use tracing::{debug, error};

/// Exceptional init failure: log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("LOGDNA_RELAY_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid LOGDNA_RELAY_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));

    let exporter = HttpExporter::new(
        config.endpoint.clone(),
        config.export_timeout,
        config.compression,
    )
    .unwrap_or_else(|e| fatal("failed to build HTTP client", &e));

    debug!(
        endpoint = %config.endpoint,
        batch_max_records = config.batch_max_records,
        flush_interval_ms = config.flush_interval.as_millis() as u64,
        "starting relay"
    );

    let (handle, task) = batcher::spawn(exporter, &BatcherConfig::from(&config));

    // The handle moves into the reader so EOF also releases intake.
    let read = async move { forward_events(tokio::io::stdin(), &handle).await };

    let code = tokio::select! {
        result = read => match result {
            Ok(forwarded) => {
                debug!(forwarded, "input closed");
                0
            }
            Err(e) => {
                error!(error = %e, "failed to read host events");
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            debug!("received interrupt");
            0
        }
    };

    task.shutdown().await;

    // A blocked stdin read cannot be cancelled and would hold runtime shutdown.
    std::process::exit(code);
}
