//! Generic progress callback trait and the terminal progress bar.

use std::io::Write;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard};

use crate::constants::PROGRESS_BAR_WIDTH;

/// Generic progress callback trait.
///
/// Type parameter `T` is the progress data type, allowing different
/// operations to report different progress information while sharing
/// the same callback pattern.
pub trait ProgressCallback<T>: Send + Sync {
    /// Called with progress updates.
    ///
    /// # Arguments
    /// * `progress` - Progress data for the current operation
    ///
    /// # Returns
    /// - `true` to continue the operation
    /// - `false` to cancel the operation
    fn on_progress(&self, progress: &T) -> bool;
}

/// A no-op progress callback that always continues.
pub struct NoOpProgress;

impl<T> ProgressCallback<T> for NoOpProgress {
    fn on_progress(&self, _progress: &T) -> bool {
        true
    }
}

/// A progress callback that wraps a closure.
pub struct FnProgress<F, T> {
    callback: F,
    _marker: PhantomData<fn(&T)>,
}

impl<F, T> ProgressCallback<T> for FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn on_progress(&self, progress: &T) -> bool {
        (self.callback)(progress)
    }
}

/// Create a progress callback from a closure.
///
/// # Arguments
/// * `f` - Closure that receives progress and returns whether to continue
pub fn progress_fn<F, T>(f: F) -> FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    FnProgress {
        callback: f,
        _marker: PhantomData,
    }
}

/// Direction of a transfer in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Downloading,
    Uploading,
    Copying,
}

/// Cumulative byte count for a single transfer.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Current operation type.
    pub operation: OperationType,
    /// Logical path or URL being transferred.
    pub key: String,
    /// Bytes transferred so far.
    pub bytes_transferred: u64,
    /// Total bytes, when the source reported a length.
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// Create a progress update.
    pub fn new(
        operation: OperationType,
        key: impl Into<String>,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    ) -> Self {
        Self {
            operation,
            key: key.into(),
            bytes_transferred,
            total_bytes,
        }
    }
}

/// Whole-percent completion of a transfer, rounded half-to-even.
///
/// A zero-length transfer is complete by definition. Values past the total
/// clamp to 100.
///
/// # Arguments
/// * `transferred` - Bytes transferred so far
/// * `total` - Total bytes in the transfer
pub fn percent_complete(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let total: u128 = total as u128;
    let scaled: u128 = (transferred as u128).min(total) * 100;
    let quotient: u128 = scaled / total;
    let twice_remainder: u128 = (scaled % total) * 2;

    let rounded: u128 = if twice_remainder > total
        || (twice_remainder == total && quotient % 2 == 1)
    {
        quotient + 1
    } else {
        quotient
    };
    rounded.min(100) as u8
}

/// Render one frame of the bar, e.g. `[#####     ] 10%`.
fn render_bar(percent: u8) -> String {
    let filled: usize = percent as usize * PROGRESS_BAR_WIDTH / 100;
    let mut line: String = String::with_capacity(PROGRESS_BAR_WIDTH + 8);
    line.push('[');
    for i in 0..PROGRESS_BAR_WIDTH {
        line.push(if i < filled { '#' } else { ' ' });
    }
    line.push_str("] ");
    line.push_str(&percent.to_string());
    line.push('%');
    line
}

struct BarState<W> {
    sink: W,
    last_percent: Option<u8>,
}

/// Fixed-width terminal progress bar.
///
/// Redraws in place (carriage return) and only when the displayed
/// percentage changes, so high-frequency byte callbacks stay cheap. The
/// displayed value never decreases.
pub struct ProgressBar<W: Write + Send> {
    state: Mutex<BarState<W>>,
}

impl ProgressBar<std::io::Stderr> {
    /// Progress bar drawing to standard error.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> ProgressBar<W> {
    /// Create a progress bar drawing to `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            state: Mutex::new(BarState {
                sink,
                last_percent: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarState<W>> {
        // Rendering is cosmetic; a poisoned lock still holds a usable sink.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record `transferred` of `total` bytes, redrawing if the percentage moved.
    ///
    /// # Returns
    /// The percentage now displayed, if anything has been drawn.
    pub fn update(&self, transferred: u64, total: u64) -> Option<u8> {
        let percent: u8 = percent_complete(transferred, total);
        let mut state = self.lock();
        Self::draw(&mut state, percent);
        state.last_percent
    }

    fn draw(state: &mut BarState<W>, percent: u8) {
        if let Some(last) = state.last_percent {
            if percent <= last {
                return;
            }
        }
        let prefix: &str = if state.last_percent.is_some() { "\r" } else { "" };
        let _ = write!(state.sink, "{}{}", prefix, render_bar(percent));
        let _ = state.sink.flush();
        state.last_percent = Some(percent);
    }

    /// Mark the transfer complete: draw 100% and end the line.
    pub fn complete(&self) {
        let mut state = self.lock();
        Self::draw(&mut state, 100);
        let _ = writeln!(state.sink);
        let _ = state.sink.flush();
    }

    /// End the line after a failed transfer without claiming completion.
    pub fn abandon(&self) {
        let mut state = self.lock();
        if state.last_percent.is_some() {
            let _ = writeln!(state.sink);
            let _ = state.sink.flush();
        }
    }

    /// The last percentage drawn.
    pub fn last_percent(&self) -> Option<u8> {
        self.lock().last_percent
    }

    /// Consume the bar and return its sink.
    pub fn into_inner(self) -> W {
        match self.state.into_inner() {
            Ok(state) => state.sink,
            Err(poisoned) => poisoned.into_inner().sink,
        }
    }
}

impl<W: Write + Send> ProgressCallback<TransferProgress> for ProgressBar<W> {
    fn on_progress(&self, progress: &TransferProgress) -> bool {
        // Without a known length there is nothing meaningful to draw.
        if let Some(total) = progress.total_bytes {
            self.update(progress.bytes_transferred, total);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn frames(output: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(output)
            .trim_end_matches('\n')
            .split('\r')
            .map(|s: &str| s.to_string())
            .collect()
    }

    fn frame_percent(frame: &str) -> u8 {
        frame
            .rsplit(' ')
            .next()
            .unwrap()
            .trim_end_matches('%')
            .parse()
            .unwrap()
    }

    #[test]
    fn test_noop_progress() {
        let progress: NoOpProgress = NoOpProgress;
        let data: TransferProgress =
            TransferProgress::new(OperationType::Downloading, "k", 1, Some(2));
        assert!(progress.on_progress(&data));
    }

    #[test]
    fn test_fn_progress_cancel() {
        let callback = progress_fn(|p: &TransferProgress| p.bytes_transferred < 100);
        let update: TransferProgress =
            TransferProgress::new(OperationType::Uploading, "k", 150, None);
        assert!(!callback.on_progress(&update));
    }

    #[test]
    fn test_fn_progress_captures_state() {
        let counter: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
        let counter_clone: Arc<AtomicU64> = counter.clone();

        let callback = progress_fn(move |p: &TransferProgress| {
            counter_clone.store(p.bytes_transferred, Ordering::SeqCst);
            true
        });

        callback.on_progress(&TransferProgress::new(OperationType::Copying, "k", 7, None));
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_percent_complete_bankers_rounding() {
        // 12.5% rounds down to the even neighbour, 37.5% rounds up.
        assert_eq!(percent_complete(1, 8), 12);
        assert_eq!(percent_complete(3, 8), 38);
        assert_eq!(percent_complete(1, 200), 0);
        assert_eq!(percent_complete(3, 200), 2);
        assert_eq!(percent_complete(2, 3), 67);
    }

    #[test]
    fn test_percent_complete_bounds() {
        assert_eq!(percent_complete(0, 10), 0);
        assert_eq!(percent_complete(10, 10), 100);
        assert_eq!(percent_complete(50, 10), 100);
        assert_eq!(percent_complete(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_percent_complete_zero_length() {
        assert_eq!(percent_complete(0, 0), 100);
    }

    #[test]
    fn test_render_bar_width() {
        let bar: String = render_bar(42);
        assert_eq!(bar, format!("[{}{}] 42%", "#".repeat(21), " ".repeat(29)));

        let full: String = render_bar(100);
        assert_eq!(full, format!("[{}] 100%", "#".repeat(PROGRESS_BAR_WIDTH)));
    }

    #[test]
    fn test_bar_redraws_only_on_change() {
        let bar: ProgressBar<Vec<u8>> = ProgressBar::new(Vec::new());
        for transferred in 0..=1000u64 {
            bar.update(transferred, 1000);
        }
        let output: Vec<u8> = bar.into_inner();
        // 0..=100 inclusive, one frame each.
        assert_eq!(frames(&output).len(), 101);
    }

    #[test]
    fn test_bar_is_monotonic() {
        let bar: ProgressBar<Vec<u8>> = ProgressBar::new(Vec::new());
        for transferred in [10u64, 50, 30, 70, 70, 20, 100] {
            bar.update(transferred, 100);
        }
        let percents: Vec<u8> = frames(&bar.into_inner())
            .iter()
            .map(|f: &String| frame_percent(f))
            .collect();
        assert_eq!(percents, vec![10, 50, 70, 100]);
        assert!(percents.windows(2).all(|w: &[u8]| w[0] < w[1]));
    }

    #[test]
    fn test_bar_complete_zero_length() {
        let bar: ProgressBar<Vec<u8>> = ProgressBar::new(Vec::new());
        bar.update(0, 0);
        bar.complete();
        assert_eq!(bar.last_percent(), Some(100));
        let text: String = String::from_utf8(bar.into_inner()).unwrap();
        assert!(text.ends_with("100%\n"));
        assert_eq!(frames(text.as_bytes()).len(), 1);
    }

    #[test]
    fn test_bar_unknown_total_draws_on_complete() {
        let bar: ProgressBar<Vec<u8>> = ProgressBar::new(Vec::new());
        let update: TransferProgress =
            TransferProgress::new(OperationType::Downloading, "k", 123, None);
        assert!(bar.on_progress(&update));
        assert_eq!(bar.last_percent(), None);
        bar.complete();
        assert_eq!(bar.last_percent(), Some(100));
    }

    #[test]
    fn test_bar_abandon_without_frames_is_silent() {
        let bar: ProgressBar<Vec<u8>> = ProgressBar::new(Vec::new());
        bar.abandon();
        assert!(bar.into_inner().is_empty());
    }
}
