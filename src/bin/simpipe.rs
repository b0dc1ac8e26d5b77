use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use simpipe::{DEFAULT_FPS, RawFrameSink, RunConfig, StopToken, adapter};

#[derive(Parser, Debug)]
#[command(
    name = "simpipe",
    version,
    about = "Streams robot-simulation frames to stdout for a video encoder"
)]
struct Cli {
    /// Frame production rate in frames per second.
    #[arg(long, default_value_t = DEFAULT_FPS, value_parser = lenient_fps)]
    fps: u32,

    /// Config file override for the external backend.
    #[arg(long = "config_path", visible_alias = "config")]
    config_path: Option<PathBuf>,
}

/// Malformed or zero fps values silently fall back to the default.
fn lenient_fps(raw: &str) -> Result<u32, std::convert::Infallible> {
    Ok(raw
        .parse::<u32>()
        .ok()
        .filter(|fps| *fps > 0)
        .unwrap_or(DEFAULT_FPS))
}

fn main() -> ExitCode {
    // Diagnostics go to stderr; stdout carries nothing but frame bytes.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = RunConfig {
        fps: cli.fps,
        config_path: cli.config_path,
    };

    let stop = StopToken::new();
    if let Err(e) = stop.register_signals() {
        tracing::error!("signal wiring failed: {e}");
        return ExitCode::FAILURE;
    }

    let stdout = std::io::stdout().lock();
    let mut sink = RawFrameSink::new(stdout, stop.clone());

    match adapter::run(&cfg, &stop, &mut sink) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_fps_accepts_integers_and_masks_garbage() {
        assert_eq!(lenient_fps("10"), Ok(10));
        assert_eq!(lenient_fps("abc"), Ok(DEFAULT_FPS));
        assert_eq!(lenient_fps("0"), Ok(DEFAULT_FPS));
        assert_eq!(lenient_fps("-5"), Ok(DEFAULT_FPS));
        assert_eq!(lenient_fps("29.97"), Ok(DEFAULT_FPS));
    }

    #[test]
    fn cli_parses_both_config_spellings() {
        let cli = Cli::parse_from(["simpipe", "--config_path", "/tmp/a.json"]);
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/a.json")));
        let cli = Cli::parse_from(["simpipe", "--config", "/tmp/b.json"]);
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/b.json")));
        let cli = Cli::parse_from(["simpipe"]);
        assert_eq!(cli.fps, DEFAULT_FPS);
        assert_eq!(cli.config_path, None);
    }
}
