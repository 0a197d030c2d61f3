//! The pair of audio devices shared by every session.
//!
//! Devices are opened once at server start and kept running until the server
//! stops, independent of whether a peer is connected.

use std::sync::Arc;

use super::sink::{AlsaSink, PlaybackSink};
use super::source::{AlsaSource, CaptureSource};
use crate::error::Result;

/// Audio system configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// ALSA playback device name (e.g. "default", "plughw:0,0")
    pub playback_device: String,
    /// Desired ALSA playback sample rate
    pub playback_sample_rate: u32,
    /// Desired ALSA playback channel count
    pub playback_channels: u32,
    /// Desired ALSA playback period size (0 = let ALSA decide)
    pub playback_period_size: usize,
    /// ALSA capture device name
    pub capture_device: String,
    /// Desired ALSA capture sample rate
    pub capture_sample_rate: u32,
    /// Desired ALSA capture channel count
    pub capture_channels: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            playback_device: "default".to_string(),
            playback_sample_rate: 48000,
            playback_channels: 2,
            playback_period_size: 1024,
            capture_device: "default".to_string(),
            capture_sample_rate: 48000,
            capture_channels: 1,
        }
    }
}

/// Opens the devices a server runs on. ALSA in production, test doubles in
/// tests.
pub trait AudioBackend {
    fn open_sink(&self, config: &AudioConfig) -> Result<Arc<dyn PlaybackSink>>;
    fn open_source(&self, config: &AudioConfig) -> Result<Arc<dyn CaptureSource>>;
}

pub struct AlsaBackend;

impl AudioBackend for AlsaBackend {
    fn open_sink(&self, config: &AudioConfig) -> Result<Arc<dyn PlaybackSink>> {
        Ok(Arc::new(AlsaSink::open(config)?))
    }

    fn open_source(&self, config: &AudioConfig) -> Result<Arc<dyn CaptureSource>> {
        Ok(Arc::new(AlsaSource::open(config)?))
    }
}

/// The opened playback and capture devices.
pub struct AudioSystem {
    sink: Arc<dyn PlaybackSink>,
    source: Arc<dyn CaptureSource>,
}

impl AudioSystem {
    /// Open the playback device, then the capture device.
    ///
    /// If capture fails to open, the already opened playback device is
    /// released before the error is returned.
    pub fn open(backend: &dyn AudioBackend, config: &AudioConfig) -> Result<Self> {
        log::info!(
            "AudioSystem starting — playback: \"{}\" {}Hz/{}ch, capture: \"{}\" {}Hz/{}ch",
            config.playback_device,
            config.playback_sample_rate,
            config.playback_channels,
            config.capture_device,
            config.capture_sample_rate,
            config.capture_channels,
        );

        let sink = backend.open_sink(config)?;
        let source = match backend.open_source(config) {
            Ok(source) => source,
            Err(e) => {
                if let Err(close_err) = sink.close() {
                    log::error!("Failed to release playback device: {}", close_err);
                }
                return Err(e);
            }
        };

        Ok(Self { sink, source })
    }

    pub fn sink(&self) -> Arc<dyn PlaybackSink> {
        self.sink.clone()
    }

    pub fn source(&self) -> Arc<dyn CaptureSource> {
        self.source.clone()
    }

    /// Stop and release both devices. Failures are logged, not returned.
    pub fn stop(&self) {
        if let Err(e) = self.sink.close() {
            log::error!("Failed to release playback device: {}", e);
        }
        if let Err(e) = self.source.close() {
            log::error!("Failed to release capture device: {}", e);
        }
    }
}
