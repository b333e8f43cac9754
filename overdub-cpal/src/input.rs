//! Capture stream on a dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;

use overdub_core::{ChunkCallback, EngineError, InputStream};

use crate::devices::resolve_input_device;
use crate::HostError;

/// One live capture stream.
///
/// The cpal `Stream` lives entirely on a named thread; `start`
/// blocks until that thread reports the stream playing, so build and
/// play failures surface synchronously.
pub struct CpalInputStream {
    device_id: Option<String>,
    sample_rate: u32,
    channels: u16,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalInputStream {
    pub(crate) fn new(device_id: Option<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            device_id,
            sample_rate,
            channels,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }
}

impl InputStream for CpalInputStream {
    fn start(&mut self, callback: ChunkCallback) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Backend("input stream already started".into()));
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let running = Arc::clone(&self.running);
        let device_id = self.device_id.clone();
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let handle = thread::Builder::new()
            .name("cpal-input".into())
            .spawn(move || {
                capture_loop(running, device_id, sample_rate, channels, callback, ready_tx);
            })
            .map_err(|e| EngineError::Backend(format!("failed to spawn input thread: {}", e)))?;
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
                    "input thread exited before the stream started".into(),
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
        self.channels
    }
}

impl Drop for CpalInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the stream for its whole life. Reports readiness once the
/// stream plays, then idles until the flag clears.
fn capture_loop(
    running: Arc<AtomicBool>,
    device_id: Option<String>,
    sample_rate: u32,
    channels: u16,
    callback: ChunkCallback,
    ready: mpsc::Sender<Result<(), EngineError>>,
) {
    let device = match resolve_input_device(device_id.as_deref()) {
        Ok(device) => device,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let data_callback = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        callback(data, sample_rate, channels);
    };
    let error_callback = |err: cpal::StreamError| {
        log::error!("input stream error: {}", err);
    };

    let stream = match device.build_input_stream(&config, data_callback, error_callback, None) {
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
    log::debug!("input stream released");
}
