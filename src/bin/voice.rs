//! Voice relay command line
//!
//! ```text
//! voice                 local echo
//! voice server          relay on the configured port
//! voice client <ip>     talk through the relay at <ip>[:port]
//! ```

use anyhow::{Context, Result};
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_relay::{Backend, Mode, Session, SessionConfig, SessionStats};

const USAGE: &str = "\
Usage:
  voice                 Local echo (microphone to speakers)
  voice server          Run the relay
  voice client <ip>     Connect to the relay at <ip> or <ip:port>";

fn parse_args(args: &[String], config: &mut SessionConfig) -> Option<()> {
    match args {
        [] => config.mode = Mode::LocalEcho,
        [mode] if mode == "server" => config.mode = Mode::Server,
        [mode, remote] if mode == "client" => {
            config.mode = Mode::Client;
            config.remote_address = Some(remote.clone());
        }
        _ => return None,
    }
    Some(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<ExitCode> {
    let mut config = SessionConfig::load().context("Failed to load configuration")?;
    if parse_args(args, &mut config).is_none() {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::FAILURE);
    }

    tracing::info!(mode = %config.mode, "Starting voice relay");

    let backend = Backend::system(&config).context("Failed to open audio backend")?;
    let mut session = Session::new(config);
    session.init(backend).context("Failed to initialize session")?;
    session.start().context("Failed to start session")?;

    if let Some(addr) = session.local_addr() {
        tracing::info!(%addr, "Listening");
    }
    tracing::info!("Press Ctrl+C to stop");

    let started = Instant::now();
    let mut previous = session.stats();
    monitor(Duration::from_secs(1), tokio::signal::ctrl_c(), || {
        let current = session.stats();
        println!("{}", status_line(started.elapsed(), &previous, &current));
        previous = current;
    })
    .await
    .context("Failed to listen for Ctrl+C")?;

    println!();
    tracing::info!("Shutting down");
    session.stop();

    let stats = session.stats();
    tracing::info!(
        sent = stats.packets_sent,
        received = stats.packets_received,
        relayed = stats.packets_relayed,
        dropped_out = stats.outbound_dropped,
        dropped_in = stats.inbound_dropped,
        underruns = stats.playback_underruns,
        overruns = stats.loop_overruns,
        "Final statistics"
    );
    Ok(ExitCode::SUCCESS)
}

/// Call `on_tick` every `period` until `shutdown` resolves. The shutdown
/// future lives across ticks so a signal arriving mid-tick is not lost.
async fn monitor<F>(period: Duration, shutdown: F, mut on_tick: impl FnMut()) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => on_tick(),
            result = &mut shutdown => return result,
        }
    }
}

fn status_line(uptime: Duration, previous: &SessionStats, current: &SessionStats) -> String {
    let secs = uptime.as_secs();
    let clock = format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);

    match current.mode {
        Mode::Server => format!(
            "[{}] peers: {} | in: {}/s | relayed: {}/s",
            clock,
            current.peers,
            current.packets_received.saturating_sub(previous.packets_received),
            current.packets_relayed.saturating_sub(previous.packets_relayed),
        ),
        _ => {
            let latency = current
                .last_latency
                .map(|r| format!("{:.1} ms", r.average_us as f64 / 1000.0))
                .unwrap_or_else(|| "-".into());
            format!(
                "[{}] sent: {}/s | recv: {}/s | buffer: {} | latency: {}",
                clock,
                current.packets_sent.saturating_sub(previous.packets_sent),
                current.packets_received.saturating_sub(previous.packets_received),
                current.inbound_depth,
                latency,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_monitor_keeps_shutdown_across_ticks() {
        let mut ticks = 0;
        // Outlasts several ticks
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(())
        };

        let finished = tokio::time::timeout(
            Duration::from_secs(2),
            monitor(Duration::from_millis(10), shutdown, || ticks += 1),
        )
        .await;

        assert!(matches!(finished, Ok(Ok(()))));
        assert!(ticks >= 2);
    }

    #[tokio::test]
    async fn test_monitor_propagates_signal_error() {
        let shutdown = async { Err(io::Error::new(io::ErrorKind::Other, "no handler")) };
        let result = monitor(Duration::from_millis(10), shutdown, || {}).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_args() {
        let mut config = SessionConfig::default();
        assert!(parse_args(&["server".into()], &mut config).is_some());
        assert_eq!(config.mode, Mode::Server);

        assert!(parse_args(&["client".into(), "10.0.0.2".into()], &mut config).is_some());
        assert_eq!(config.mode, Mode::Client);
        assert_eq!(config.remote_address.as_deref(), Some("10.0.0.2"));

        assert!(parse_args(&["bogus".into()], &mut config).is_none());
    }
}
