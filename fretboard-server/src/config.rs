//! Command line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::{Parser, ValueEnum};
use fretboard_core::audio::YtDlp;
use fretboard_core::basic_pitch::BasicPitchCli;
use fretboard_core::pitch::YinDetector;
use fretboard_core::transcription::MAX_DURATION_SECS;
use fretboard_core::tuning::{Tuning, DROP_D_TUNING, STANDARD_TUNING};
use fretboard_core::{Pipeline, Transcribe};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Which pitch-detection collaborator to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DetectorKind {
    /// Pretrained Basic Pitch model through its CLI.
    BasicPitch,
    /// In-process YIN tracker, for hosts without Basic Pitch installed.
    Yin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TuningKind {
    Standard,
    DropD,
}

impl TuningKind {
    pub fn tuning(self) -> &'static Tuning {
        match self {
            TuningKind::Standard => &STANDARD_TUNING,
            TuningKind::DropD => &DROP_D_TUNING,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "fretboard-server",
    version,
    about = "Transcribes media URLs to guitar fretboard positions"
)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// yt-dlp executable used for audio acquisition [default: yt-dlp on PATH].
    #[arg(long = "ytdlp", env = "YTDLP_BIN")]
    pub ytdlp_bin: Option<PathBuf>,

    /// Pitch detector; `yin` runs without the Basic Pitch install.
    #[arg(
        long,
        env = "PITCH_DETECTOR",
        value_enum,
        default_value_t = DetectorKind::BasicPitch
    )]
    pub detector: DetectorKind,

    /// basic-pitch executable [default: basic-pitch on PATH].
    #[arg(long = "basic-pitch", env = "BASIC_PITCH_BIN")]
    pub basic_pitch_bin: Option<PathBuf>,

    #[arg(long, env = "GUITAR_TUNING", value_enum, default_value_t = TuningKind::Standard)]
    pub tuning: TuningKind,

    /// Longest clip a request may ask for, in seconds.
    #[arg(long, env = "MAX_DURATION_SECS", default_value_t = MAX_DURATION_SECS)]
    pub max_duration: u32,

    /// Allowed CORS origins; any origin when empty.
    #[arg(long = "cors-origin", env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn build_transcriber(&self) -> Arc<dyn Transcribe> {
        let source = self
            .ytdlp_bin
            .as_ref()
            .map_or_else(YtDlp::default, |bin| YtDlp::new(bin));
        let tuning = self.tuning.tuning();
        match self.detector {
            DetectorKind::BasicPitch => {
                let detector = self
                    .basic_pitch_bin
                    .as_ref()
                    .map_or_else(BasicPitchCli::default, |bin| BasicPitchCli::new(bin));
                Arc::new(
                    Pipeline::new(source, detector)
                        .with_tuning(tuning)
                        .with_max_duration(self.max_duration),
                )
            }
            DetectorKind::Yin => Arc::new(
                Pipeline::new(source, YinDetector::default())
                    .with_tuning(tuning)
                    .with_max_duration(self.max_duration),
            ),
        }
    }

    pub fn cors_layer(&self) -> Result<CorsLayer> {
        if self.cors_origins.is_empty() {
            return Ok(CorsLayer::permissive());
        }
        let origins = self
            .cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin.trim())
                    .with_context(|| format!("invalid CORS origin {origin:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse_from(["fretboard-server"]);
        assert_eq!(config.detector, DetectorKind::BasicPitch);
        assert!(config.ytdlp_bin.is_none());
        assert!(config.basic_pitch_bin.is_none());
        assert_eq!(config.max_duration, 60);
        assert_eq!(config.tuning.tuning().name(), "standard");
        assert!(config.cors_origins.is_empty());
        assert!(config.cors_layer().is_ok());
    }

    #[test]
    fn flags() {
        let config = Config::parse_from([
            "fretboard-server",
            "--port",
            "9000",
            "--detector",
            "yin",
            "--basic-pitch",
            "/opt/bp/bin/basic-pitch",
            "--tuning",
            "drop-d",
            "--cors-origin",
            "https://a.example,https://b.example",
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.socket_addr().port(), 9000);
        assert_eq!(config.detector, DetectorKind::Yin);
        assert_eq!(config.basic_pitch_bin, Some(PathBuf::from("/opt/bp/bin/basic-pitch")));
        assert_eq!(config.tuning.tuning().name(), "drop-d");
        assert_eq!(config.cors_origins.len(), 2);
        assert!(config.cors_layer().is_ok());
    }

    #[test]
    fn bad_cors_origin_is_reported() {
        let config = Config::parse_from(["fretboard-server", "--cors-origin", "bad\norigin"]);
        assert!(config.cors_layer().is_err());
    }
}
