//! Playback side: raw PCM bytes from the peer go to the output device.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use alsa::pcm::PCM;

use super::alsa_device;
use super::audio_system::AudioConfig;
use crate::error::{BridgeError, Result};

/// Stop dropping frames after this many consecutive failed recoveries.
const MAX_RECOVERY_RETRIES: u32 = 3;

/// An output device accepting interleaved S16LE samples.
///
/// `write` blocks while the device buffer is full; that is the only flow
/// control between the peer and the hardware.
pub trait PlaybackSink: Send + Sync {
    fn write(&self, samples: &[u8]) -> Result<()>;

    /// Stop playback and release the device. Later writes fail with
    /// [`BridgeError::DeviceClosed`]. Calling it twice is a no-op.
    fn close(&self) -> Result<()>;
}

struct Playback {
    pcm: PCM,
    frame_bytes: usize,
    /// Trailing bytes of the last write that did not fill a whole frame
    pending: Vec<u8>,
}

pub struct AlsaSink {
    device: String,
    /// Set by `close` before it waits for the lock; writes check it first.
    closing: AtomicBool,
    state: Mutex<Option<Playback>>,
}

impl AlsaSink {
    /// Open the playback device with the fixed format and start it.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let period_size_opt = if config.playback_period_size > 0 {
            Some(config.playback_period_size)
        } else {
            None
        };
        let (pcm, params) = alsa_device::open_playback(
            &config.playback_device,
            config.playback_sample_rate,
            config.playback_channels,
            period_size_opt,
        )?;

        log::info!(
            "Playback started: device={}, rate={}, ch={}, period={}",
            config.playback_device,
            params.sample_rate,
            params.channels,
            params.period_size,
        );

        Ok(Self {
            device: config.playback_device.clone(),
            closing: AtomicBool::new(false),
            state: Mutex::new(Some(Playback {
                pcm,
                frame_bytes: params.frame_bytes(),
                pending: Vec::new(),
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Playback>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlaybackSink for AlsaSink {
    fn write(&self, samples: &[u8]) -> Result<()> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(BridgeError::DeviceClosed);
        }
        let mut guard = self.lock();
        let playback = guard.as_mut().ok_or(BridgeError::DeviceClosed)?;

        let data = align_frames(&mut playback.pending, samples, playback.frame_bytes);
        if data.is_empty() {
            return Ok(());
        }
        write_frames(&playback.pcm, playback.frame_bytes, &data, &self.closing)
    }

    fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);
        let Some(playback) = self.lock().take() else {
            return Ok(());
        };
        log::info!("Playback stopped: device={}", self.device);
        playback.pcm.drop()?;
        Ok(())
    }
}

/// Length of the largest prefix of `len` bytes made of whole frames.
pub(crate) fn whole_frames(len: usize, frame_bytes: usize) -> usize {
    len - len % frame_bytes
}

/// Join `samples` to the bytes carried over in `pending` and return the whole
/// frames ready to write.
///
/// The trailing partial frame is left in `pending` before anything is
/// written, so a failed write never shifts the alignment of the next one.
pub(crate) fn align_frames<'a>(
    pending: &mut Vec<u8>,
    samples: &'a [u8],
    frame_bytes: usize,
) -> Cow<'a, [u8]> {
    if pending.is_empty() {
        let whole = whole_frames(samples.len(), frame_bytes);
        pending.extend_from_slice(&samples[whole..]);
        return Cow::Borrowed(&samples[..whole]);
    }
    pending.extend_from_slice(samples);
    let whole = whole_frames(pending.len(), frame_bytes);
    let tail = pending.split_off(whole);
    Cow::Owned(std::mem::replace(pending, tail))
}

// Write decoded PCM to ALSA with retry loop to handle
// short writes and XRUN recovery without losing frames.
fn write_frames(pcm: &PCM, frame_bytes: usize, data: &[u8], closing: &AtomicBool) -> Result<()> {
    let io = pcm.io_bytes();
    let total_frames = data.len() / frame_bytes;
    let mut frames_written = 0;
    let mut retry_count = 0u32;

    while frames_written < total_frames {
        if closing.load(Ordering::SeqCst) {
            return Err(BridgeError::DeviceClosed);
        }
        let offset = frames_written * frame_bytes;
        match io.writei(&data[offset..]) {
            Ok(n) => {
                frames_written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                retry_count += 1;

                // 触发 ALSA 硬件恢复状态机
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM playback: {}", e2);
                    return Err(e2.into());
                }

                // 熔断器：底层持续跟不上写入速度时，丢弃剩余帧防止死循环
                if retry_count >= MAX_RECOVERY_RETRIES {
                    log::error!(
                        "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                        retry_count,
                        total_frames - frames_written
                    );
                    break;
                }
            }
        }
    }
    Ok(())
}
