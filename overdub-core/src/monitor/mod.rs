//! Continuous peak/RMS metering over the graph's analysis taps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::graph::MixGraph;
use crate::models::levels::LevelSnapshot;

/// Receives one complete snapshot per monitor tick.
pub type LevelCallback = Arc<dyn Fn(LevelSnapshot) + Send + Sync + 'static>;

/// Tick interval, roughly one display refresh.
const TICK: Duration = Duration::from_millis(16);

/// Polls every analysis tap (master, each track, input when present)
/// on a steady tick and emits aggregated peak/RMS snapshots.
///
/// Runs independently of recording and playback state; the input
/// reading simply disappears from snapshots while no recording holds
/// the input tap open.
pub struct LevelMonitor {
    graph: Arc<Mutex<MixGraph>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl LevelMonitor {
    pub fn new(graph: Arc<Mutex<MixGraph>>) -> Self {
        Self {
            graph,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Begin emitting snapshots via `callback`.
    ///
    /// Idempotent: a second start while running is a no-op and does
    /// NOT replace the callback.
    pub fn start(&self, callback: LevelCallback) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let running = Arc::clone(&self.running);
        let graph = Arc::clone(&self.graph);

        let handle = thread::Builder::new()
            .name("level-monitor".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(TICK);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let snapshot = Self::take_snapshot(&graph);
                    callback(snapshot);
                }
            })
            .expect("failed to spawn level-monitor thread");

        *self.handle.lock() = Some(handle);
    }

    /// Cancel the tick loop. Safe to call when not running.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn take_snapshot(graph: &Mutex<MixGraph>) -> LevelSnapshot {
        let graph = graph.lock();
        let tracks = (1..=graph.track_count() as u32)
            .map(|id| (id, graph.track_levels(id).unwrap_or_default()))
            .collect();
        LevelSnapshot {
            input: graph.input_levels(),
            tracks,
            master: graph.master_levels(),
        }
    }
}

impl Drop for LevelMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn graph() -> Arc<Mutex<MixGraph>> {
        let mut g = MixGraph::new(256);
        g.create_track_nodes(2);
        Arc::new(Mutex::new(g))
    }

    #[test]
    fn emits_snapshots_for_all_taps() {
        let graph = graph();
        graph.lock().commit_master(&[0.5, 0.5]);

        let monitor = LevelMonitor::new(Arc::clone(&graph));
        let last = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last);
        monitor.start(Arc::new(move |s| *sink.lock() = Some(s)));

        thread::sleep(Duration::from_millis(80));
        monitor.stop();

        let snapshot = last.lock().clone().expect("no snapshot emitted");
        assert_eq!(snapshot.tracks.len(), 2);
        assert!(snapshot.input.is_none());
        assert!(snapshot.master.peak > 0.0);
    }

    #[test]
    fn second_start_keeps_original_callback() {
        let monitor = LevelMonitor::new(graph());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&first);
        monitor.start(Arc::new(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        }));
        let sink = Arc::clone(&second);
        monitor.start(Arc::new(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        }));

        thread::sleep(Duration::from_millis(80));
        monitor.stop();

        assert!(first.load(Ordering::SeqCst) > 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_when_not_running_is_safe() {
        let monitor = LevelMonitor::new(graph());
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn input_reading_appears_while_attached() {
        let graph = graph();
        graph.lock().attach_input(crate::capture::InputRouting::Detached);
        graph.lock().ingest_input(&[0.25; 64]);

        let monitor = LevelMonitor::new(Arc::clone(&graph));
        let last = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last);
        monitor.start(Arc::new(move |s| *sink.lock() = Some(s)));
        thread::sleep(Duration::from_millis(60));
        monitor.stop();

        let snapshot = last.lock().clone().unwrap();
        let input = snapshot.input.expect("input tap should be reported");
        assert!((input.peak - 0.25).abs() < 1e-6);
    }
}
