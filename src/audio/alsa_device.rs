//! ALSA PCM device wrappers for audio capture and playback.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};

use crate::error::{BridgeError, Result};

/// Bytes per sample of the fixed S16LE wire format.
pub const SAMPLE_BYTES: usize = 2;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames (one frame = channels × sample width)
    pub period_size: usize,
}

impl AlsaParams {
    /// Size of one interleaved frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * SAMPLE_BYTES
    }
}

/// Wrap an ALSA failure during device setup with the device it concerns.
pub(crate) fn device_open_error(
    device: &str,
    direction: &'static str,
    source: alsa::Error,
) -> BridgeError {
    BridgeError::DeviceOpen {
        device: device.to_string(),
        direction,
        source,
    }
}

/// Open a PCM device for capture (recording).
pub fn open_capture(device: &str, sample_rate: u32, channels: u32) -> Result<(PCM, AlsaParams)> {
    open_pcm(device, Direction::Capture, sample_rate, channels, None, "capture")
}

/// Open a PCM device for playback.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    channels: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams)> {
    open_pcm(
        device,
        Direction::Playback,
        sample_rate,
        channels,
        period_size,
        "playback",
    )
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    channels: u32,
    period_size: Option<usize>,
    dir_name: &'static str,
) -> Result<(PCM, AlsaParams)> {
    let open_err = |source: alsa::Error| device_open_error(device, dir_name, source);

    let pcm = PCM::new(device, direction, false).map_err(open_err)?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).map_err(open_err)?;
        hwp.set_access(Access::RWInterleaved).map_err(open_err)?;
        hwp.set_format(Format::S16LE).map_err(open_err)?;
        hwp.set_channels(channels).map_err(open_err)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)
            .map_err(open_err)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)
                .map_err(open_err)?;
        }
        pcm.hw_params(&hwp).map_err(open_err)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current().map_err(open_err)?;
        let rate = hwp.get_rate().map_err(open_err)?;
        let ch = hwp.get_channels().map_err(open_err)?;
        let ps = hwp.get_period_size().map_err(open_err)? as usize;
        (rate, ch, ps)
    };

    if actual_rate != sample_rate || actual_channels != channels {
        // 线路格式是固定的，没有协商，对端会按固定格式解释数据
        log::warn!(
            "ALSA {} device '{}' negotiated {}Hz/{}ch instead of {}Hz/{}ch",
            dir_name,
            device,
            actual_rate,
            actual_channels,
            sample_rate,
            channels,
        );
    }

    let params = AlsaParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size,
    };

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok((pcm, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_error_names_device_and_direction() {
        let err = device_open_error("hw:1,0", "capture", alsa::Error::unsupported("snd_pcm_start"));
        let message = err.to_string();

        assert!(matches!(err, BridgeError::DeviceOpen { direction: "capture", .. }));
        assert!(message.contains("hw:1,0"), "{message}");
        assert!(message.contains("capture"), "{message}");
    }
}
