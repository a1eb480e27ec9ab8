//! C6 — Audio Port Registry: a handle-indexed table of output ports.
//! The actual audio device is an external collaborator (spec §1); this
//! registry owns port lifecycle and real-time pacing and hands PCM frames
//! to whatever `Sink` the host injected, mirroring the teacher's
//! lazy-init-on-first-use single engine (`kernel/src/audio/mod.rs`)
//! generalized to a handle table of many ports.

use crate::error::AudioError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const SAMPLE_RATE_HZ: u32 = 48_000;
pub const CHANNELS: u8 = 2;
pub const BITS_PER_SAMPLE: u8 = 16;

/// Host audio-device glue, injected by the Emulator Core's caller. A
/// `NullSink` satisfies this without producing real sound, matching the
/// teacher's lazy-init pattern when no driver has claimed the device yet.
pub trait Sink: Send {
    fn start(&mut self, sample_rate: u32, channels: u8, bits_per_sample: u8);
    fn write_pcm(&mut self, samples: &[u8]);
    fn set_volume(&mut self, volume: f32);
    fn stop(&mut self);
}

pub struct NullSink;

impl Sink for NullSink {
    fn start(&mut self, _sample_rate: u32, _channels: u8, _bits_per_sample: u8) {}
    fn write_pcm(&mut self, _samples: &[u8]) {}
    fn set_volume(&mut self, _volume: f32) {}
    fn stop(&mut self) {}
}

pub struct AudioPort {
    pub handle: u32,
    pub port_type: u32,
    pub sample_count: u32,
    pub grain: u32,
    pub is_muted: bool,
    pub volume: f32,
    pub frames_output_counter: u64,
    sink: Option<Box<dyn Sink>>,
}

pub struct AudioPortRegistry {
    ports: Mutex<HashMap<u32, AudioPort>>,
    next_handle: Mutex<u32>,
    sink_factory: Mutex<Option<Box<dyn Fn() -> Box<dyn Sink> + Send>>>,
}

impl Default for AudioPortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPortRegistry {
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(1),
            sink_factory: Mutex::new(None),
        }
    }

    /// Registers a factory that produces a fresh `Sink` per opened port.
    /// Without one, ports operate silently (equivalent to the teacher's
    /// un-initialized `SYNTH` state before `ensure_init`).
    pub fn set_sink_factory(&self, factory: Box<dyn Fn() -> Box<dyn Sink> + Send>) {
        *self.sink_factory.lock().unwrap() = Some(factory);
    }

    pub fn open(&self, port_type: u32, sample_count: u32) -> u32 {
        let mut handle_guard = self.next_handle.lock().unwrap();
        let handle = *handle_guard;
        *handle_guard += 1;
        drop(handle_guard);

        let grain = if sample_count != 0 { sample_count } else { 256 };
        let mut sink = self.sink_factory.lock().unwrap().as_ref().map(|f| f());
        if let Some(s) = sink.as_mut() {
            s.start(SAMPLE_RATE_HZ, CHANNELS, BITS_PER_SAMPLE);
        }

        self.ports.lock().unwrap().insert(
            handle,
            AudioPort {
                handle,
                port_type,
                sample_count,
                grain,
                is_muted: false,
                volume: 1.0,
                frames_output_counter: 0,
                sink,
            },
        );
        handle
    }

    pub fn buffer_size_bytes(sample_count: u32) -> usize {
        sample_count as usize * 4 * 4
    }

    /// Writes PCM to the port's sink and blocks for roughly 80% of the
    /// playback duration so the guest cannot outrun real time (spec §4.7).
    pub fn output(&self, handle: u32, pcm: &[u8]) -> Result<(), AudioError> {
        let mut ports = self.ports.lock().unwrap();
        let port = ports.get_mut(&handle).ok_or(AudioError::UnknownPort(handle))?;
        if let Some(sink) = port.sink.as_mut() {
            if !port.is_muted {
                sink.write_pcm(pcm);
            }
        }
        port.frames_output_counter += 1;
        let sample_count = port.sample_count;
        drop(ports);

        let playback_secs = sample_count as f64 / SAMPLE_RATE_HZ as f64;
        let pacing = Duration::from_secs_f64(playback_secs * 0.8);
        std::thread::sleep(pacing);
        Ok(())
    }

    pub fn set_muted(&self, handle: u32, muted: bool) -> Result<(), AudioError> {
        let mut ports = self.ports.lock().unwrap();
        let port = ports.get_mut(&handle).ok_or(AudioError::UnknownPort(handle))?;
        port.is_muted = muted;
        Ok(())
    }

    pub fn set_volume(&self, handle: u32, volume: f32) -> Result<(), AudioError> {
        let mut ports = self.ports.lock().unwrap();
        let port = ports.get_mut(&handle).ok_or(AudioError::UnknownPort(handle))?;
        port.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = port.sink.as_mut() {
            sink.set_volume(port.volume);
        }
        Ok(())
    }

    pub fn close(&self, handle: u32) -> Result<(), AudioError> {
        let mut ports = self.ports.lock().unwrap();
        let mut port = ports.remove(&handle).ok_or(AudioError::UnknownPort(handle))?;
        if let Some(sink) = port.sink.as_mut() {
            sink.stop();
        }
        Ok(())
    }

    pub fn frames_output(&self, handle: u32) -> Result<u64, AudioError> {
        let ports = self.ports.lock().unwrap();
        ports.get(&handle).map(|p| p.frames_output_counter).ok_or(AudioError::UnknownPort(handle))
    }
}
