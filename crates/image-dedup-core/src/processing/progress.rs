use crossbeam::channel::Sender;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use crate::scan::ScanState;

/// Notification emitted by a running scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// The scan moved to a new state
    State(ScanState),

    /// Percentage of candidates processed, 0-100, never decreasing
    Progress(u8),
}

/// Receiver of scan state changes and progress percentages.
///
/// Progress values handed to a sink are already clamped to be
/// non-decreasing.
pub trait ProgressSink {
    fn state_changed(&self, _state: ScanState) {}

    fn progress(&self, percent: u8);
}

/// Sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _percent: u8) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u8),
{
    fn progress(&self, percent: u8) {
        self(percent)
    }
}

/// Forwards events over a channel, for callers on another thread
pub struct ChannelProgress {
    tx: Sender<ScanEvent>,
}

impl ChannelProgress {
    pub fn new(tx: Sender<ScanEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn state_changed(&self, state: ScanState) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(ScanEvent::State(state));
    }

    fn progress(&self, percent: u8) {
        let _ = self.tx.send(ScanEvent::Progress(percent));
    }
}

/// Terminal progress bar for scans
pub struct ProgressTracker {
    bar: ProgressBar,
    start_time: Instant,
    last_percent: AtomicU8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.set_message("Starting...");
        bar.tick();

        Self {
            bar,
            start_time: Instant::now(),
            last_percent: AtomicU8::new(0),
        }
    }

    /// Apply an event received from a background scan
    pub fn handle(&self, event: ScanEvent) {
        match event {
            ScanEvent::State(state) => self.state_changed(state),
            ScanEvent::Progress(percent) => self.progress(percent),
        }
    }

    /// Complete the progress bar with a final message
    pub fn finish(&self, message: &str) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        self.bar
            .finish_with_message(format!("{} ({:.1}s elapsed)", message, elapsed));
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressTracker {
    fn state_changed(&self, state: ScanState) {
        let message = match state {
            ScanState::Idle => "Idle",
            ScanState::Discovering => "Discovering images...",
            ScanState::Processing => "Computing fingerprints...",
            ScanState::Finalizing => "Grouping duplicates...",
            ScanState::Done => "Done",
            ScanState::Cancelled => "Cancelled",
            ScanState::Errored => "Failed",
        };
        self.bar.set_message(message);
    }

    fn progress(&self, percent: u8) {
        let previous = self.last_percent.swap(percent, Ordering::Relaxed);
        if percent != previous {
            debug!("Scan progress: {}%", percent);
        }
        self.bar.set_position(u64::from(percent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_channel_progress_forwards_events() {
        let (tx, rx) = unbounded();
        let sink = ChannelProgress::new(tx);

        sink.state_changed(ScanState::Processing);
        sink.progress(40);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ScanEvent::State(ScanState::Processing),
                ScanEvent::Progress(40)
            ]
        );
    }

    #[test]
    fn test_channel_progress_tolerates_dropped_receiver() {
        let (tx, rx) = unbounded();
        drop(rx);
        let sink = ChannelProgress::new(tx);
        sink.progress(10);
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::cell::RefCell::new(Vec::new());
        let sink = |p: u8| seen.borrow_mut().push(p);
        sink.progress(5);
        ProgressSink::progress(&sink, 7);
        assert_eq!(*seen.borrow(), vec![5, 7]);
    }
}
