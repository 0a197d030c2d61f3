use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    server: Server,
    playback: Playback,
    capture: Capture,
}

#[derive(Deserialize)]
struct Server {
    socket_path: String,
    shutdown_timeout_ms: u64,
    buffer_size: usize,
}

#[derive(Deserialize)]
struct Playback {
    device: String,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
}

#[derive(Deserialize)]
struct Capture {
    device: String,
    sample_rate: u32,
    channels: u32,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 服务端配置
    println!("cargo:rustc-env=BRIDGE_SOCKET_PATH={}", config.server.socket_path);
    println!("cargo:rustc-env=BRIDGE_SHUTDOWN_TIMEOUT_MS={}", config.server.shutdown_timeout_ms);
    println!("cargo:rustc-env=BRIDGE_BUFFER_SIZE={}", config.server.buffer_size);

    // 播放设备
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.playback.device);
    println!("cargo:rustc-env=PLAYBACK_SAMPLE_RATE={}", config.playback.sample_rate);
    println!("cargo:rustc-env=PLAYBACK_CHANNELS={}", config.playback.channels);
    println!("cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}", config.playback.period_size);

    // 录音设备
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.capture.device);
    println!("cargo:rustc-env=CAPTURE_SAMPLE_RATE={}", config.capture.sample_rate);
    println!("cargo:rustc-env=CAPTURE_CHANNELS={}", config.capture.channels);
}
