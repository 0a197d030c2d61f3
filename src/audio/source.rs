//! Capture side: samples from the input device, read into caller buffers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use alsa::pcm::PCM;

use super::alsa_device;
use super::audio_system::AudioConfig;
use super::sink::whole_frames;
use crate::error::{BridgeError, Result};

/// An input device producing interleaved S16LE samples.
pub trait CaptureSource: Send + Sync {
    /// Block until samples are available and copy them into `buf`.
    ///
    /// Returns the number of bytes written. `Ok(0)` means nothing was
    /// captured this time (e.g. an overrun was recovered) and the caller
    /// should simply read again.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Stop capture and release the device. Later reads fail with
    /// [`BridgeError::DeviceClosed`]. Calling it twice is a no-op.
    fn close(&self) -> Result<()>;
}

struct Capture {
    pcm: PCM,
    frame_bytes: usize,
}

pub struct AlsaSource {
    device: String,
    /// Set by `close` before it waits for the lock; reads check it first.
    closing: AtomicBool,
    state: Mutex<Option<Capture>>,
}

impl AlsaSource {
    /// Open the capture device with the fixed format and start recording.
    ///
    /// Capture keeps running while no peer is connected; the device drops
    /// samples on overrun and the next read recovers.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let (pcm, params) = alsa_device::open_capture(
            &config.capture_device,
            config.capture_sample_rate,
            config.capture_channels,
        )?;
        pcm.start()
            .map_err(|e| alsa_device::device_open_error(&config.capture_device, "capture", e))?;

        log::info!(
            "Recording started: device={}, rate={}, ch={}, period={}",
            config.capture_device,
            params.sample_rate,
            params.channels,
            params.period_size,
        );

        Ok(Self {
            device: config.capture_device.clone(),
            closing: AtomicBool::new(false),
            state: Mutex::new(Some(Capture {
                pcm,
                frame_bytes: params.frame_bytes(),
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Capture>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CaptureSource for AlsaSource {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(BridgeError::DeviceClosed);
        }
        let guard = self.lock();
        let capture = guard.as_ref().ok_or(BridgeError::DeviceClosed)?;

        let len = whole_frames(buf.len(), capture.frame_bytes);
        if len == 0 {
            return Ok(0);
        }

        let io = capture.pcm.io_bytes();
        match io.readi(&mut buf[..len]) {
            Ok(frames) => Ok(frames * capture.frame_bytes),
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = capture.pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    return Err(e2.into());
                }
                Ok(0)
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);
        let Some(capture) = self.lock().take() else {
            return Ok(());
        };
        log::info!("Recording stopped: device={}", self.device);
        capture.pcm.drop()?;
        Ok(())
    }
}
