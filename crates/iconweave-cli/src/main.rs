//! iconweave CLI - ローカルディレクトリからアイコンを解決して CSS を出力する
//!
//! ```text
//! iconweave --assets ./assets --store ./.iconweave house:regular:24 folder:duotone:48
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info};

use iconweave_core::impls::{
    DirectoryFetcher, FileKeyValueStore, FsBlobBackend, GeometryRasterHost, MemoryChannelProvider,
};
use iconweave_core::{AssetPipeline, PipelineConfig};

#[derive(Debug, Clone, PartialEq)]
struct Request {
    name: String,
    variant: String,
    size: f64,
}

/// `name:variant:size`, or `name:variant` with a size of 24.
fn parse_request(raw: &str) -> Result<Request, String> {
    let mut parts = raw.split(':');
    let name = parts.next().filter(|s| !s.is_empty());
    let variant = parts.next().filter(|s| !s.is_empty());
    let (Some(name), Some(variant)) = (name, variant) else {
        return Err(format!("expected name:variant[:size], got {raw:?}"));
    };
    let size = match parts.next() {
        Some(size) => size
            .parse::<f64>()
            .map_err(|e| format!("bad size in {raw:?}: {e}"))?,
        None => 24.0,
    };
    if parts.next().is_some() {
        return Err(format!("too many fields in {raw:?}"));
    }
    Ok(Request {
        name: name.to_string(),
        variant: variant.to_string(),
        size,
    })
}

#[derive(Debug, Parser)]
#[command(name = "iconweave", about = "Resolve icons into output rules")]
struct Args {
    /// JSON config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory that URL paths are mapped under.
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Persistent store and rule-set directory. No persistence when omitted.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Rasterize instead of emitting vector URLs.
    #[arg(long)]
    raster: bool,

    /// Print pipeline counters to stderr as JSON.
    #[arg(long)]
    stats: bool,

    /// Assets as name:variant[:size].
    #[arg(value_parser = parse_request, required = true)]
    requests: Vec<Request>,
}

fn load_config(args: &Args) -> Result<PipelineConfig, String> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path).map_err(|e| e.to_string())?,
        None => PipelineConfig::default(),
    };
    config.raster |= args.raster;
    Ok(config)
}

fn build(args: &Args, config: PipelineConfig) -> Result<(Arc<AssetPipeline>, Arc<MemoryChannelProvider>), String> {
    let channels = Arc::new(MemoryChannelProvider::new());
    let mut builder = AssetPipeline::builder(config)
        .fetcher(Arc::new(DirectoryFetcher::new(&args.assets)))
        .channels(channels.clone())
        .raster_host(Arc::new(GeometryRasterHost::new()));
    if let Some(dir) = &args.store {
        builder = builder
            .blob_backend(Arc::new(FsBlobBackend::new(dir.join("blobs"))))
            .key_value_store(Arc::new(FileKeyValueStore::new(dir.join("rules.json"))));
    }
    let pipeline = builder.build().map_err(|e| e.to_string())?;
    Ok((Arc::new(pipeline), channels))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (pipeline, channels) = match load_config(&args).and_then(|config| build(&args, config)) {
        Ok(wired) => wired,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let warm = pipeline.warm_up().await;
    info!(store = warm.store_ready, channel = warm.channel_ready, "ready");

    let mut tasks = JoinSet::new();
    for request in args.requests.iter().cloned() {
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn(async move {
            pipeline
                .request(&request.name, &request.variant, request.size)
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "request task failed");
        }
    }
    pipeline.flush();

    if let Some(channel) = channels.current() {
        print!("{}", channel.to_css());
    }
    if args.stats {
        match serde_json::to_string_pretty(&pipeline.counts()) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => error!(error = %e, "cannot render counters"),
        }
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_short_forms() {
        assert_eq!(
            parse_request("house:regular:48").unwrap(),
            Request {
                name: "house".to_string(),
                variant: "regular".to_string(),
                size: 48.0
            }
        );
        assert_eq!(parse_request("house:bold").unwrap().size, 24.0);
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(parse_request("house").is_err());
        assert!(parse_request(":regular").is_err());
        assert!(parse_request("house:regular:big").is_err());
        assert!(parse_request("a:b:1:2").is_err());
    }

    #[test]
    fn cli_parses_requests() {
        let args = Args::try_parse_from(["iconweave", "--raster", "a:b:32", "c:d"]).unwrap();
        assert!(args.raster);
        assert_eq!(args.requests.len(), 2);
        assert!(args.store.is_none());
    }
}
