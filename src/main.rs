//! BGP Sentinel entrypoint: live ndjson stream on stdin, or a bounded replay of a file
//! or a BGPlay window. Ctrl+C stops reading; queued alerts are still diagnosed.
//!
//! Usage: bgp-sentinel [live|replay] [--input PATH] [--from RFC3339] [--until RFC3339]
//!                     [--prefix P] [--bgplay]

use bgp_sentinel::{
    config::{ReplayInput, SentinelConfig, SourceMode},
    feed::{BgplaySource, JsonLinesSource, ReplayWindow, StopHandle, Stoppable, UpdateSource},
    logging::StructuredLogger,
    Sentinel, SentinelError,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{error, info};

/// Apply command-line overrides on top of the loaded configuration.
fn apply_args(config: &mut SentinelConfig, args: &[String]) -> Result<(), SentinelError> {
    fn time(flag: &str, value: Option<&String>) -> Result<DateTime<Utc>, SentinelError> {
        let raw = value.ok_or_else(|| SentinelError::Config(format!("{flag} needs a value")))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| SentinelError::Config(format!("{flag} {raw}: {e}")))
    }

    let replay = &mut config.source.replay;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "live" => config.source.mode = SourceMode::Live,
            "replay" => config.source.mode = SourceMode::Replay,
            "--input" => {
                let path = it
                    .next()
                    .ok_or_else(|| SentinelError::Config("--input needs a path".into()))?;
                replay.path = Some(PathBuf::from(path));
                replay.input = ReplayInput::File;
            }
            "--from" => replay.from = Some(time("--from", it.next())?),
            "--until" => replay.until = Some(time("--until", it.next())?),
            "--prefix" => {
                replay.prefix = Some(
                    it.next()
                        .ok_or_else(|| SentinelError::Config("--prefix needs a value".into()))?
                        .clone(),
                )
            }
            "--bgplay" => replay.input = ReplayInput::Bgplay,
            other => return Err(SentinelError::Config(format!("unknown argument: {other}"))),
        }
    }
    Ok(())
}

async fn open_source(config: &SentinelConfig) -> Result<Box<dyn UpdateSource>, SentinelError> {
    let replay = &config.source.replay;
    let source: Box<dyn UpdateSource> = match (config.source.mode, replay.input) {
        (SourceMode::Live, _) => Box::new(JsonLinesSource::stdin()),
        (SourceMode::Replay, ReplayInput::File) => {
            let path = replay.path.as_ref().ok_or_else(|| {
                SentinelError::Config("replay from file needs --input PATH".into())
            })?;
            Box::new(ReplayWindow::from_config(
                JsonLinesSource::open(path).await?,
                replay,
            ))
        }
        (SourceMode::Replay, ReplayInput::Bgplay) => {
            let (Some(prefix), Some(from), Some(until)) =
                (replay.prefix.as_ref(), replay.from, replay.until)
            else {
                return Err(SentinelError::Config(
                    "BGPlay replay needs --prefix, --from and --until".into(),
                ));
            };
            let bgplay = BgplaySource::new(
                replay.bgplay_url.clone(),
                prefix.clone(),
                from,
                until,
                config.evidence.source_app.clone(),
            )?;
            Box::new(ReplayWindow::from_config(bgplay, replay))
        }
    };
    Ok(source)
}

async fn run(config: SentinelConfig) -> Result<(), SentinelError> {
    let source = open_source(&config).await?;
    let stop = StopHandle::new();
    let on_signal = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || on_signal.stop()) {
        tracing::warn!(error = %e, "Ctrl+C handler not installed");
    }

    let sentinel = Sentinel::from_config(&config)?;
    let summary = sentinel.run(Stoppable::new(source, stop)).await?;
    info!(
        summary = %serde_json::to_string(&summary).unwrap_or_default(),
        "BGP sentinel finished"
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("BGP_SENTINEL_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let mut config = SentinelConfig::load(&config_path);
    let args: Vec<String> = std::env::args().skip(1).collect();
    apply_args(&mut config, &args)?;

    StructuredLogger::init(config.log.json, &config.log.level);
    info!(
        mode = ?config.source.mode,
        report_dir = ?config.report_dir,
        workers = config.dispatch.workers,
        "BGP sentinel starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    if let Err(e) = runtime.block_on(run(config)) {
        error!(error = %e, "BGP sentinel failed");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn replay_overrides() {
        let mut config = SentinelConfig::default();
        apply_args(
            &mut config,
            &args("replay --bgplay --prefix 104.244.42.0/24 --from 2024-01-01T00:00:00Z --until 2024-01-01T01:00:00Z"),
        )
        .unwrap();
        assert_eq!(config.source.mode, SourceMode::Replay);
        assert_eq!(config.source.replay.input, ReplayInput::Bgplay);
        assert_eq!(config.source.replay.prefix.as_deref(), Some("104.244.42.0/24"));
        assert_eq!(
            config.source.replay.until.unwrap().timestamp() - config.source.replay.from.unwrap().timestamp(),
            3600
        );
    }

    #[test]
    fn bad_arguments_are_config_errors() {
        let mut config = SentinelConfig::default();
        assert!(apply_args(&mut config, &args("--frobnicate")).is_err());
        assert!(apply_args(&mut config, &args("--from yesterday")).is_err());
        assert!(apply_args(&mut config, &args("--input")).is_err());
    }
}
