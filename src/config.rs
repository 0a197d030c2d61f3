use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::AudioConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    // 服务端配置
    pub socket_path: String,
    pub shutdown_timeout_ms: u64,
    /// Size of the per-loop read and capture buffers, tag byte included
    pub buffer_size: usize,

    // 播放设备配置
    pub playback_device: String,
    pub playback_sample_rate: u32,
    pub playback_channels: u32,
    /// 0 = let ALSA decide
    pub playback_period_size: usize,

    // 录音设备配置
    pub capture_device: String,
    pub capture_sample_rate: u32,
    pub capture_channels: u32,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self> {
        Self {
            socket_path: env!("BRIDGE_SOCKET_PATH").to_string(),
            shutdown_timeout_ms: env!("BRIDGE_SHUTDOWN_TIMEOUT_MS")
                .parse()
                .context("Failed to parse BRIDGE_SHUTDOWN_TIMEOUT_MS")?,
            buffer_size: env!("BRIDGE_BUFFER_SIZE")
                .parse()
                .context("Failed to parse BRIDGE_BUFFER_SIZE")?,

            playback_device: env!("PLAYBACK_DEVICE").to_string(),
            playback_sample_rate: env!("PLAYBACK_SAMPLE_RATE")
                .parse()
                .context("Failed to parse PLAYBACK_SAMPLE_RATE")?,
            playback_channels: env!("PLAYBACK_CHANNELS")
                .parse()
                .context("Failed to parse PLAYBACK_CHANNELS")?,
            playback_period_size: env!("PLAYBACK_PERIOD_SIZE")
                .parse()
                .context("Failed to parse PLAYBACK_PERIOD_SIZE")?,

            capture_device: env!("CAPTURE_DEVICE").to_string(),
            capture_sample_rate: env!("CAPTURE_SAMPLE_RATE")
                .parse()
                .context("Failed to parse CAPTURE_SAMPLE_RATE")?,
            capture_channels: env!("CAPTURE_CHANNELS")
                .parse()
                .context("Failed to parse CAPTURE_CHANNELS")?,
        }
        .validated()
    }

    /// Override the socket path, e.g. from the command line.
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn audio(&self) -> AudioConfig {
        AudioConfig {
            playback_device: self.playback_device.clone(),
            playback_sample_rate: self.playback_sample_rate,
            playback_channels: self.playback_channels,
            playback_period_size: self.playback_period_size,
            capture_device: self.capture_device.clone(),
            capture_sample_rate: self.capture_sample_rate,
            capture_channels: self.capture_channels,
        }
    }

    fn validated(self) -> Result<Self> {
        // 至少要能放下标签字节和一个字节的负载
        if self.buffer_size < 2 {
            anyhow::bail!("buffer_size must be at least 2, got {}", self.buffer_size);
        }
        if self.playback_channels == 0 || self.capture_channels == 0 {
            anyhow::bail!("channel counts must be non-zero");
        }
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/audio_socket_bridge.sock".to_string(),
            shutdown_timeout_ms: 100,
            buffer_size: 10240,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_time_config_matches_fixed_wire_format() {
        let config = Config::new().unwrap();
        assert_eq!(config.playback_sample_rate, 48000);
        assert_eq!(config.capture_sample_rate, 48000);
        assert_eq!(config.playback_channels, 2);
        assert_eq!(config.capture_channels, 1);
        assert_eq!(config.buffer_size, 10240);
    }

    #[test]
    fn rejects_buffer_without_room_for_payload() {
        let config = Config {
            buffer_size: 1,
            ..Config::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn socket_path_override() {
        let config = Config::default().with_socket_path("/run/bridge.sock");
        assert_eq!(config.socket_path, "/run/bridge.sock");
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(100));
    }
}
