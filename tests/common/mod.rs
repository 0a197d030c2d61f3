//! Test doubles for the audio devices and helpers for socket paths.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use audio_socket_bridge::audio::{AudioBackend, AudioConfig, CaptureSource, PlaybackSink};
use audio_socket_bridge::{BridgeError, Config, Result};
use tokio::sync::mpsc;

/// Records every payload and reports it on a channel.
pub struct TestSink {
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub closed: AtomicBool,
    /// Block each write this long after reporting it, like a device whose
    /// buffer never drains.
    pub stall_write_ms: AtomicU64,
    notify: mpsc::UnboundedSender<Vec<u8>>,
}

impl TestSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (notify, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            stall_write_ms: AtomicU64::new(0),
            notify,
        });
        (sink, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl PlaybackSink for TestSink {
    fn write(&self, samples: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::DeviceClosed);
        }
        self.writes.lock().unwrap().push(samples.to_vec());
        let _ = self.notify.send(samples.to_vec());
        let stall = self.stall_write_ms.load(Ordering::SeqCst);
        if stall > 0 {
            std::thread::sleep(Duration::from_millis(stall));
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Behaves like a live microphone: returns queued chunks as they arrive and
/// comes back empty-handed every few milliseconds otherwise.
pub struct TestSource {
    chunks: Mutex<std_mpsc::Receiver<Vec<u8>>>,
    pub closed: AtomicBool,
}

impl TestSource {
    pub fn new() -> (Arc<Self>, std_mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = std_mpsc::channel();
        let source = Arc::new(Self {
            chunks: Mutex::new(rx),
            closed: AtomicBool::new(false),
        });
        (source, tx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CaptureSource for TestSource {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(BridgeError::DeviceClosed);
        }
        match self.chunks.lock().unwrap().recv_timeout(Duration::from_millis(10)) {
            Ok(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => Ok(0),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                std::thread::sleep(Duration::from_millis(10));
                Ok(0)
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct TestBackend {
    pub sink: Arc<TestSink>,
    pub source: Arc<TestSource>,
    pub fail_capture: bool,
}

impl AudioBackend for TestBackend {
    fn open_sink(&self, _config: &AudioConfig) -> Result<Arc<dyn PlaybackSink>> {
        Ok(self.sink.clone())
    }

    fn open_source(&self, _config: &AudioConfig) -> Result<Arc<dyn CaptureSource>> {
        if self.fail_capture {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no capture device",
            )));
        }
        Ok(self.source.clone())
    }
}

pub struct Harness {
    pub backend: TestBackend,
    pub sink_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pub capture_tx: std_mpsc::Sender<Vec<u8>>,
}

impl Harness {
    pub fn new() -> Self {
        let (sink, sink_rx) = TestSink::new();
        let (source, capture_tx) = TestSource::new();
        Self {
            backend: TestBackend {
                sink,
                source,
                fail_capture: false,
            },
            sink_rx,
            capture_tx,
        }
    }

    /// Next payload that reached the sink, or `None` after one second.
    pub async fn next_played(&mut self) -> Option<Vec<u8>> {
        tokio::time::timeout(Duration::from_secs(1), self.sink_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Unique socket path under the temp dir.
pub fn temp_socket_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "asb-{}-{}-{:x}.sock",
        name,
        std::process::id(),
        nanos
    ))
}

pub fn test_config(path: &Path) -> Config {
    Config {
        socket_path: path.to_string_lossy().into_owned(),
        shutdown_timeout_ms: 1000,
        ..Config::default()
    }
}
