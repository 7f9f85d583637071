//! Consumer interface for decoded samples.

use crate::types::Sample;

/// Receives every decoded [`Sample`] while a session is streaming.
///
/// The sink runs inline on the session task: a slow sink delays the next
/// notification.  Keep the work short, or hand the sample off to another
/// task (an `mpsc` channel, for instance) inside `on_sample`.
///
/// Any closure `FnMut(Sample) + Send` is a sink:
///
/// ```
/// # use blueberry_rs::sink::SampleSink;
/// # use blueberry_rs::types::Sample;
/// let mut count = 0;
/// let mut sink = |_s: Sample| count += 1;
/// sink.on_sample(Sample::compact("short_path", 0, 0, 1, 2, 3));
/// # drop(sink);
/// assert_eq!(count, 1);
/// ```
pub trait SampleSink: Send {
    /// Handle one sample.  Must not panic; errors are the sink's own concern.
    fn on_sample(&mut self, sample: Sample);
}

impl<F> SampleSink for F
where
    F: FnMut(Sample) + Send,
{
    fn on_sample(&mut self, sample: Sample) {
        self(sample)
    }
}
