mod config;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::info;
use vlbi_blast::{BlastConfig, TracingLogger, TransportMode, run_blast};
use vlbi_epoch::{datetime_to_mjd, mjd_to_day_of_year, mjd_to_time_string};

fn describe_start(config: &BlastConfig) {
    let finish = config.start_mjd + config.duration_secs / vlbi_epoch::SECONDS_PER_DAY;
    let (start_day, start_year, _) = mjd_to_day_of_year(config.start_mjd);
    let (finish_day, finish_year, _) = mjd_to_day_of_year(finish);

    let mode = match config.transport {
        TransportMode::Stream { frame_bytes } => format!("tcp framesize={}", frame_bytes),
        TransportMode::Datagram { mtu, sequence, .. } => {
            format!("udp mtu={} vtp={}", mtu, sequence)
        }
    };
    info!(
        "sending {:?} to {}:{} ({}) {}/{:03} {} -> {}/{:03} {}",
        config.format,
        config.destination.host,
        config.destination.port,
        mode,
        start_year,
        start_day,
        mjd_to_time_string(config.start_mjd, 0),
        finish_year,
        finish_day,
        mjd_to_time_string(finish, 0),
    );
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vlbi_fake=info,vlbi_blast=info".into()),
        )
        .init();

    let now = datetime_to_mjd(&Utc::now());
    let mut config = config::load(|key| std::env::var(key).ok(), now)
        .context("invalid VLBI_FAKE_* configuration")?;
    config.logger = Some(Arc::new(TracingLogger));

    describe_start(&config);

    let summary = run_blast(config).context("blast aborted")?;

    info!(
        "sent {} frames ({} dropped), {:.1} MB in {:.1} sec, {:.2} Mbps",
        summary.frames_sent,
        summary.frames_skipped,
        summary.bytes_sent as f64 / 1e6,
        summary.elapsed.as_secs_f64(),
        summary.mbps(),
    );
    Ok(())
}
