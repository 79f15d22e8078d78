use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::MixerConfig;
use crate::capture::CaptureConfig;
use crate::recording::ControllerConfig;
use crate::video::CompositorConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub compositor: CompositorSection,
    pub audio: AudioSection,
    pub capture: CaptureSection,
    pub storage: StorageConfig,
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "session-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8686,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompositorSection {
    pub width: u32,
    pub height: u32,
    pub refresh_hz: u32,
}

impl Default for CompositorSection {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            refresh_hz: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub sample_rate: u32,
    pub channels: u16,
    pub quantum_ms: u64,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            quantum_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub mime_type: String,
    pub capture_fps: u32,
    pub timeslice_ms: u64,
}

impl Default for CaptureSection {
    fn default() -> Self {
        let defaults = CaptureConfig::default();
        Self {
            mime_type: defaults.mime_type,
            capture_fps: defaults.capture_fps,
            timeslice_ms: defaults.timeslice.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Filesystem,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    pub recordings_path: String,
    pub upload_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Filesystem,
            recordings_path: "recordings".to_string(),
            upload_url: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Lifecycle events are only published when set
    pub url: Option<String>,
}

impl Config {
    /// Load from `path` (any extension the `config` crate understands) with
    /// `SESSION_RECORDER__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SESSION_RECORDER").separator("__"))
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.compositor.width == 0 || self.compositor.height == 0 {
            bail!(
                "compositor canvas must not be empty ({}x{})",
                self.compositor.width,
                self.compositor.height
            );
        }
        if self.capture.capture_fps == 0 || self.capture.timeslice_ms == 0 {
            bail!("capture.capture_fps and capture.timeslice_ms must be positive");
        }
        self.mixer_config()
            .validate()
            .context("invalid [audio] section")?;
        Ok(())
    }

    pub fn compositor_config(&self) -> CompositorConfig {
        CompositorConfig {
            width: self.compositor.width,
            height: self.compositor.height,
            refresh_hz: self.compositor.refresh_hz,
        }
    }

    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            quantum: Duration::from_millis(self.audio.quantum_ms),
            ..MixerConfig::default()
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            mime_type: self.capture.mime_type.clone(),
            capture_fps: self.capture.capture_fps,
            timeslice: Duration::from_millis(self.capture.timeslice_ms),
        }
    }

    /// Pipeline settings for new recording controllers
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            compositor: self.compositor_config(),
            mixer: self.mixer_config(),
            capture: self.capture_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_use_hd_canvas() {
        let cfg = Config::default();
        assert_eq!(cfg.compositor.width, 1280);
        assert_eq!(cfg.compositor.height, 720);
        assert_eq!(cfg.capture.capture_fps, 30);
        assert_eq!(cfg.capture.timeslice_ms, 1000);
        assert_eq!(cfg.storage.backend, StorageKind::Filesystem);
        assert!(cfg.nats.url.is_none());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("recorder.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[compositor]\nwidth = 640\nheight = 360\n").unwrap();
        writeln!(file, "[storage]\nbackend = \"http\"\nupload_url = \"http://localhost/api/recordings\"").unwrap();

        let cfg = Config::load(path.with_extension("").to_str().unwrap()).unwrap();

        assert_eq!(cfg.compositor.width, 640);
        assert_eq!(cfg.compositor.refresh_hz, 60);
        assert_eq!(cfg.storage.backend, StorageKind::Http);
        assert_eq!(cfg.storage.timeout_secs, 60);
        assert_eq!(cfg.mixer_config().quantum, Duration::from_millis(20));
    }

    #[test]
    fn test_load_rejects_zero_quantum() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("recorder.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[audio]\nquantum_ms = 0\n").unwrap();

        let err = Config::load(path.with_extension("").to_str().unwrap()).unwrap_err();
        assert!(format!("{:#}", err).contains("quantum"));
    }

    #[test]
    fn test_validate_rejects_zero_capture_rate() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());
        cfg.capture.capture_fps = 0;
        assert!(cfg.validate().is_err());
    }
}
