//! Render stream on a dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use overdub_core::{AudioOutput, EngineError, RenderCallback};

use crate::HostError;

const OUTPUT_CHANNELS: u16 = 2;

/// The audible destination: a stereo render stream on the default
/// output device.
pub struct CpalOutput {
    sample_rate: u32,
    base_latency_secs: f64,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalOutput {
    /// Probe the default output device and negotiate `sample_rate`,
    /// falling back to the device default when unsupported.
    pub fn new(sample_rate: u32) -> Result<Self, EngineError> {
        let device = default_output_device()?;
        let default = device
            .default_output_config()
            .map_err(|e| EngineError::from(HostError::Enumeration(e.to_string())))?;

        let requested = cpal::SampleRate(sample_rate);
        let mut negotiated = default.sample_rate().0;
        if let Ok(ranges) = device.supported_output_configs() {
            for range in ranges {
                if range.channels() == OUTPUT_CHANNELS
                    && range.min_sample_rate() <= requested
                    && requested <= range.max_sample_rate()
                {
                    negotiated = sample_rate;
                    break;
                }
            }
        }

        let base_latency_secs = match default.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => *min as f64 / negotiated as f64,
            cpal::SupportedBufferSize::Unknown => 0.0,
        };

        Ok(Self {
            sample_rate: negotiated,
            base_latency_secs,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn start(&mut self, callback: RenderCallback) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Backend("output stream already started".into()));
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let running = Arc::clone(&self.running);
        let sample_rate = self.sample_rate;

        let handle = thread::Builder::new()
            .name("cpal-output".into())
            .spawn(move || {
                render_loop(running, sample_rate, callback, ready_tx);
            })
            .map_err(|e| EngineError::Backend(format!("failed to spawn output thread: {}", e)))?;
        *self.handle.lock() = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.stop();
                Err(err)
            }
            Err(_) => {
                self.stop();
                Err(EngineError::Backend(
                    "output thread exited before the stream started".into(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        OUTPUT_CHANNELS
    }

    fn base_latency_secs(&self) -> f64 {
        self.base_latency_secs
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn default_output_device() -> Result<cpal::Device, EngineError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| HostError::NoDefaultDevice("output").into())
}

fn render_loop(
    running: Arc<AtomicBool>,
    sample_rate: u32,
    callback: RenderCallback,
    ready: mpsc::Sender<Result<(), EngineError>>,
) {
    let device = match default_output_device() {
        Ok(device) => device,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let config = cpal::StreamConfig {
        channels: OUTPUT_CHANNELS,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let data_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        callback(data, OUTPUT_CHANNELS);
    };
    let error_callback = |err: cpal::StreamError| {
        log::error!("output stream error: {}", err);
    };

    let stream = match device.build_output_stream(&config, data_callback, error_callback, None) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(HostError::BuildStream(err.to_string()).into()));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready.send(Err(HostError::PlayStream(err.to_string()).into()));
        return;
    }
    let _ = ready.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(20));
    }
    drop(stream);
    log::debug!("output stream released");
}
