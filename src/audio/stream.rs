//! Device streams driving the voice engine
//!
//! cpal streams are not `Send`, so both streams are built and owned by a
//! dedicated thread that lives until [`StreamHost::stop`]. A device that
//! fails to open degrades the host instead of failing it.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::{input_device, output_device};
use crate::constants::{OUTPUT_CHANNELS, SAMPLE_RATE};
use crate::engine::VoiceEngine;
use crate::error::AudioError;

/// How long `start` waits for the stream thread to report
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Which device streams are live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Full,
    CaptureOnly,
    PlaybackOnly,
    /// No device streams; the host drives the engine itself
    Bypass,
}

impl StreamMode {
    pub fn from_streams(capture: bool, playback: bool) -> Self {
        match (capture, playback) {
            (true, true) => StreamMode::Full,
            (true, false) => StreamMode::CaptureOnly,
            (false, true) => StreamMode::PlaybackOnly,
            (false, false) => StreamMode::Bypass,
        }
    }

    pub fn has_capture(self) -> bool {
        matches!(self, StreamMode::Full | StreamMode::CaptureOnly)
    }

    pub fn has_playback(self) -> bool {
        matches!(self, StreamMode::Full | StreamMode::PlaybackOnly)
    }
}

/// Capture and playback streams bound to one engine
pub struct StreamHost {
    running: Arc<AtomicBool>,
    mode: StreamMode,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
}

impl StreamHost {
    /// Open the input and output devices (`None` = host default) and start
    /// feeding `engine` from their callbacks
    pub fn start(
        engine: Arc<VoiceEngine>,
        input_id: Option<&str>,
        output_id: Option<&str>,
    ) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (mode_tx, mode_rx) = bounded::<StreamMode>(1);

        let input_id = input_id.map(str::to_string);
        let output_id = output_id.map(str::to_string);
        let running_for_loop = running.clone();
        let thread_engine = engine.clone();

        let handle = thread::Builder::new()
            .name("voice-streams".to_string())
            .spawn(move || {
                let capture = open_or_report(
                    &thread_engine,
                    "capture",
                    open_capture(thread_engine.clone(), input_id.as_deref(), error_tx.clone()),
                );
                let playback = open_or_report(
                    &thread_engine,
                    "playback",
                    open_playback(thread_engine.clone(), output_id.as_deref(), error_tx),
                );

                let mode = StreamMode::from_streams(capture.is_some(), playback.is_some());
                if !publish_mode(&mode_tx, &running_for_loop, mode) || mode == StreamMode::Bypass {
                    return;
                }

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                // Streams are dropped here, stopping the devices
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mode = match await_mode(mode_rx, &running, OPEN_TIMEOUT) {
            Some(mode) => mode,
            None => {
                engine.record_error("Audio device open timed out");
                tracing::warn!("Audio device open timed out, running in bypass mode");
                StreamMode::Bypass
            }
        };
        tracing::info!("Audio streams started in {:?} mode", mode);

        Ok(Self {
            running,
            mode,
            thread_handle: Some(handle),
            error_rx,
        })
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop both streams; returns once the devices are released
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Audio streams stopped");
        }
    }

    /// Next asynchronous stream error, if any
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl Drop for StreamHost {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wait for the stream thread's mode
///
/// On timeout `running` is cleared and the receiver dropped, so a late
/// open tears its streams down instead of keeping them alive.
fn await_mode(
    mode_rx: Receiver<StreamMode>,
    running: &AtomicBool,
    timeout: Duration,
) -> Option<StreamMode> {
    match mode_rx.recv_timeout(timeout) {
        Ok(mode) => Some(mode),
        Err(_) => {
            running.store(false, Ordering::SeqCst);
            None
        }
    }
}

/// Report the opened mode; `false` means the streams must be dropped
fn publish_mode(mode_tx: &Sender<StreamMode>, running: &AtomicBool, mode: StreamMode) -> bool {
    running.load(Ordering::SeqCst) && mode_tx.send(mode).is_ok()
}

fn open_or_report(
    engine: &VoiceEngine,
    what: &str,
    result: Result<cpal::Stream, AudioError>,
) -> Option<cpal::Stream> {
    match result {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!("Audio {} unavailable: {}", what, e);
            engine.record_error(format!("{} unavailable: {}", what, e));
            None
        }
    }
}

fn stream_config(channels: u16) -> StreamConfig {
    StreamConfig {
        channels,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: BufferSize::Default,
    }
}

fn error_callback(
    engine: Arc<VoiceEngine>,
    error_tx: Sender<AudioError>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        engine.record_error(err.to_string());
        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
    }
}

fn open_capture(
    engine: Arc<VoiceEngine>,
    device_id: Option<&str>,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    let device = input_device(device_id)?;
    let callback_engine = engine.clone();

    let stream = device
        .build_input_stream(
            &stream_config(1),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                callback_engine.process_capture(data);
            },
            error_callback(engine, error_tx),
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StartFailed(e.to_string()))?;
    Ok(stream)
}

fn open_playback(
    engine: Arc<VoiceEngine>,
    device_id: Option<&str>,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    let device = output_device(device_id)?;
    let callback_engine = engine.clone();

    let stream = device
        .build_output_stream(
            &stream_config(OUTPUT_CHANNELS as u16),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback_engine.process_playback(data);
            },
            error_callback(engine, error_tx),
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StartFailed(e.to_string()))?;
    Ok(stream)
}
