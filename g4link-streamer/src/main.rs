//! g4link — entry point.
//!
//! ```text
//! g4link stream                 Stream the desktop region until Ctrl-C (Windows)
//! g4link once                   Send a single desktop frame (Windows)
//! g4link probe                  Query the controller's status endpoints
//! g4link show <image>           Convert an image file and send it
//! g4link --config <path> ...    Load a custom config TOML
//! g4link --host <addr> ...      Override the configured device host
//! g4link --gen-config           Write default config to stdout
//! g4link --write-config         Write default config to the --config path
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use g4link_core::TransportKind;
use g4link_streamer::config::StreamerConfig;
use g4link_streamer::service::Streamer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "g4link", about = "Stream a desktop region to a 4-bit grayscale panel")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "g4link.toml")]
    config: PathBuf,

    /// Device host, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Delivery strategy, overriding the config file.
    #[arg(long, value_parser = parse_transport)]
    transport: Option<TransportKind>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long, conflicts_with = "gen_config")]
    write_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream the configured desktop region until Ctrl-C (Windows only).
    ///
    /// Desktop capture uses DXGI Desktop Duplication. On other platforms the
    /// command fails with a capability error; use `show` instead.
    Stream,
    /// Capture and send a single desktop frame (Windows only).
    ///
    /// Desktop capture uses DXGI Desktop Duplication. On other platforms the
    /// command fails with a capability error; use `show` instead.
    Once,
    /// Check the controller's status endpoints.
    Probe,
    /// Decode an image, convert it and send it as one frame.
    Show {
        /// PNG, JPEG, BMP or GIF file.
        image: PathBuf,
    },
}

fn parse_transport(s: &str) -> Result<TransportKind, String> {
    match s {
        "websocket" | "ws" => Ok(TransportKind::WebSocket),
        "chunk-push" => Ok(TransportKind::ChunkPush),
        "upload-apply" => Ok(TransportKind::UploadApply),
        other => Err(format!(
            "unknown transport {other:?} (websocket, chunk-push, upload-apply)"
        )),
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", StreamerConfig::default_toml()?);
        return Ok(());
    }
    if cli.write_config {
        StreamerConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let Some(command) = cli.command else {
        eprintln!("no command given; try `g4link --help`");
        std::process::exit(2);
    };

    // Load config and apply overrides. A broken file is fatal.
    let mut config = StreamerConfig::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.device.host = host;
    }
    if let Some(kind) = cli.transport {
        config.stream.transport = kind;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("g4link v{}", env!("CARGO_PKG_VERSION"));
    if cli.config.exists() {
        info!("config: {}", cli.config.display());
    } else {
        info!("no config at {}; using defaults", cli.config.display());
    }
    info!("device: {}", config.device.host);
    info!("transport: {:?}", config.stream.transport);

    let streamer = Streamer::new(config);
    match command {
        Command::Stream => {
            info!("target FPS: {}", streamer.config().stream.fps);
            streamer.stream().await?;
        }
        Command::Once => {
            let report = streamer.once().await?;
            println!(
                "sent {} chunk(s), {} bytes in {:?}",
                report.delivery.chunks, report.delivery.bytes, report.elapsed
            );
        }
        Command::Probe => {
            let report = streamer.probe().await?;
            for (path, line) in [
                ("/api/fs-status", &report.fs_status),
                ("/api/runtime-status", &report.runtime_status),
            ] {
                println!("{path}: {} {}", line.status, line.body);
            }
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }
        Command::Show { image } => {
            let report = streamer.show(&image).await?;
            println!(
                "{} sent: {} chunk(s), {} bytes in {:?}",
                image.display(),
                report.delivery.chunks,
                report.delivery.bytes,
                report.elapsed
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn desktop_commands_say_they_need_windows() {
        let cli = Cli::command();
        for name in ["stream", "once"] {
            let sub = cli.find_subcommand(name).unwrap();
            let about = sub.get_about().unwrap().to_string();
            assert!(about.contains("Windows only"), "{name}: {about}");
            let long = sub.get_long_about().unwrap().to_string();
            assert!(long.contains("DXGI"), "{name}: {long}");
        }
    }

    #[test]
    fn transport_flag_accepts_config_names() {
        let cli = Cli::try_parse_from(["g4link", "--transport", "websocket", "probe"]).unwrap();
        assert_eq!(cli.transport, Some(TransportKind::WebSocket));
        assert!(Cli::try_parse_from(["g4link", "--transport", "smoke", "probe"]).is_err());
    }
}
