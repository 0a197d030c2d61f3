//! One connected peer, bridged to the shared audio devices.
//!
//! A session runs two OS threads:
//!
//! - Reader: socket → decode → playback sink
//! - Writer: capture source → tag → socket
//!
//! Either thread ending cancels the whole session. Cancellation shuts the
//! socket down, which unblocks the other thread's pending socket call.

use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::{CaptureSource, PlaybackSink};
use crate::error::{BridgeError, Result};
use crate::protocol::{self, Direction, Frame, FrameBuffer};

/// Why a session loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// The peer closed its end of the socket.
    PeerClosed,
    /// The session was cancelled, by the other loop or by shutdown.
    Cancelled,
    ChannelError,
    DeviceClosed,
    DeviceError,
}

/// Per-session traffic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_to_device: u64,
    pub bytes_to_device: u64,
    /// Units dropped by the tolerant decoder (no payload or unknown tag)
    pub frames_dropped: u64,
    pub frames_from_device: u64,
    pub bytes_from_device: u64,
    pub reader_end: Option<LoopEnd>,
    pub writer_end: Option<LoopEnd>,
}

impl SessionStats {
    fn merge(self, other: SessionStats) -> SessionStats {
        SessionStats {
            frames_to_device: self.frames_to_device + other.frames_to_device,
            bytes_to_device: self.bytes_to_device + other.bytes_to_device,
            frames_dropped: self.frames_dropped + other.frames_dropped,
            frames_from_device: self.frames_from_device + other.frames_from_device,
            bytes_from_device: self.bytes_from_device + other.bytes_from_device,
            reader_end: self.reader_end.or(other.reader_end),
            writer_end: self.writer_end.or(other.writer_end),
        }
    }
}

/// Ends a session from any thread. Cloning shares the same session.
#[derive(Clone)]
pub struct SessionCancel {
    cancelled: Arc<AtomicBool>,
    stream: Arc<UnixStream>,
}

impl SessionCancel {
    fn new(stream: UnixStream) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            stream: Arc::new(stream),
        }
    }

    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // The peer may already be gone, in which case there is nothing to shut.
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                log::debug!("Socket shutdown failed: {}", e);
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct Session {
    id: u64,
    cancel: SessionCancel,
    reader: Option<JoinHandle<SessionStats>>,
    writer: Option<JoinHandle<SessionStats>>,
}

impl Session {
    /// Start the reader and writer threads on an accepted, blocking stream.
    pub fn spawn(
        id: u64,
        stream: UnixStream,
        sink: Arc<dyn PlaybackSink>,
        source: Arc<dyn CaptureSource>,
        buffer_size: usize,
    ) -> Result<Self> {
        let read_half = stream.try_clone()?;
        let write_half = stream.try_clone()?;
        let cancel = SessionCancel::new(stream);

        let reader = {
            let cancel = cancel.clone();
            thread::Builder::new()
                .name(format!("session-{}-reader", id))
                .spawn(move || {
                    let stats =
                        reader_loop(id, read_half, sink.as_ref(), buffer_size, &cancel.cancelled);
                    cancel.cancel();
                    stats
                })?
        };

        let writer = {
            let cancel = cancel.clone();
            thread::Builder::new()
                .name(format!("session-{}-writer", id))
                .spawn(move || {
                    let stats = writer_loop(
                        id,
                        write_half,
                        source.as_ref(),
                        buffer_size,
                        &cancel.cancelled,
                    );
                    cancel.cancel();
                    stats
                })
        };

        let writer = match writer {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                let _ = reader.join();
                return Err(e.into());
            }
        };

        Ok(Self {
            id,
            cancel,
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel_handle(&self) -> SessionCancel {
        self.cancel.clone()
    }

    /// Block until both threads have finished.
    pub fn join(mut self) -> SessionStats {
        let mut stats = SessionStats::default();
        for (name, handle) in [("reader", self.reader.take()), ("writer", self.writer.take())] {
            let Some(handle) = handle else { continue };
            match handle.join() {
                Ok(s) => stats = stats.merge(s),
                Err(_) => log::error!("Session {}: {} thread panicked", self.id, name),
            }
        }
        stats
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Threads still running here are detached; make sure they wind down.
        if self.reader.is_some() || self.writer.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Forward every output frame read from `channel` to `sink`, in order.
///
/// Each read is treated as one unit. Returns when the peer closes the
/// channel, on a channel error, or when the sink is closed.
pub fn reader_loop<R: Read>(
    id: u64,
    mut channel: R,
    sink: &dyn PlaybackSink,
    buffer_size: usize,
    cancelled: &AtomicBool,
) -> SessionStats {
    let mut stats = SessionStats::default();
    let mut buf = vec![0u8; buffer_size];

    let end = loop {
        if cancelled.load(Ordering::SeqCst) {
            break LoopEnd::Cancelled;
        }
        let n = match channel.read(&mut buf) {
            // Our own socket shutdown also reads as end-of-stream.
            Ok(0) if cancelled.load(Ordering::SeqCst) => break LoopEnd::Cancelled,
            Ok(0) => {
                log::info!("Session {}: peer closed the connection", id);
                break LoopEnd::PeerClosed;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) if cancelled.load(Ordering::SeqCst) => break LoopEnd::Cancelled,
            Err(e) => {
                log::warn!("Session {}: error reading from client: {}", id, e);
                break LoopEnd::ChannelError;
            }
        };

        match protocol::decode(&buf, n) {
            Some(Frame {
                direction: Direction::OutputToDevice,
                payload,
            }) => {
                match sink.write(payload) {
                    Ok(()) => {}
                    Err(BridgeError::DeviceClosed) => break LoopEnd::DeviceClosed,
                    Err(e) => {
                        log::error!("Session {}: playback write failed: {}", id, e);
                        break LoopEnd::DeviceError;
                    }
                }
                stats.frames_to_device += 1;
                stats.bytes_to_device += payload.len() as u64;
                log::debug!("Received audio output data: {} bytes", payload.len());
            }
            _ => {
                stats.frames_dropped += 1;
                log::debug!("Session {}: dropped {}-byte unit", id, n);
            }
        }
    };

    stats.reader_end = Some(end);
    stats
}

/// Forward captured audio to `channel` as input frames, in capture order.
///
/// A single [`FrameBuffer`] is reused: the source fills the payload region
/// and the tag + payload go out in one write. Returns on a channel error, when
/// the source is closed, or once `cancelled` is set.
pub fn writer_loop<W: Write>(
    id: u64,
    mut channel: W,
    source: &dyn CaptureSource,
    buffer_size: usize,
    cancelled: &AtomicBool,
) -> SessionStats {
    let mut stats = SessionStats::default();
    let mut frame = FrameBuffer::new(Direction::InputFromDevice, buffer_size);

    let end = loop {
        if cancelled.load(Ordering::SeqCst) {
            break LoopEnd::Cancelled;
        }
        let count = match source.read(frame.payload_mut()) {
            Ok(count) => count,
            Err(BridgeError::DeviceClosed) => break LoopEnd::DeviceClosed,
            Err(e) => {
                log::error!("Session {}: capture read failed: {}", id, e);
                break LoopEnd::DeviceError;
            }
        };
        if count == 0 {
            continue;
        }

        if let Err(e) = channel.write_all(frame.frame(count)) {
            if cancelled.load(Ordering::SeqCst) {
                break LoopEnd::Cancelled;
            }
            log::warn!("Session {}: error sending microphone data: {}", id, e);
            break LoopEnd::ChannelError;
        }
        stats.frames_from_device += 1;
        stats.bytes_from_device += count as u64;
    };

    stats.writer_end = Some(end);
    stats
}
