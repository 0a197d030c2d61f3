//! audio - Playback and capture devices for the socket bridge
//!
//! Uses ALSA for audio I/O with a fixed S16LE 48 kHz format: stereo playback,
//! mono capture. Both devices sit behind traits so sessions can run against
//! any implementation.

mod alsa_device;
mod audio_system;
mod sink;
mod source;

pub use alsa_device::{AlsaParams, SAMPLE_BYTES};
pub use audio_system::{AlsaBackend, AudioBackend, AudioConfig, AudioSystem};
pub use sink::{AlsaSink, PlaybackSink};
pub use source::{AlsaSource, CaptureSource};
