//! Sliding-window measurement averaging
//!
//! The physical layer reports CPICH RSCP and Ec/No samples for every cell it
//! hears. Ranking and reporting decisions use the mean of the samples inside
//! a fixed time window rather than the latest sample.

use std::collections::VecDeque;
use std::time::Duration;

use umtsim_common::SimTime;

/// Time-windowed sample accumulator.
///
/// Samples older than the window are evicted when a new one arrives, but the
/// newest sample is always retained so an isolated measurement still yields
/// an average.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use umtsim_common::SimTime;
/// use umtsim_ue::rrc::MeasurementWindow;
///
/// let mut w = MeasurementWindow::new(Duration::from_secs(2));
/// w.add(SimTime::from_millis(0), -80.0);
/// w.add(SimTime::from_millis(1000), -90.0);
/// assert_eq!(w.average(), Some(-85.0));
///
/// w.add(SimTime::from_millis(2500), -70.0);
/// assert_eq!(w.average(), Some(-80.0));
/// ```
#[derive(Debug, Clone)]
pub struct MeasurementWindow {
    window: Duration,
    samples: VecDeque<(SimTime, f64)>,
}

impl MeasurementWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Adds a sample and evicts the ones that fell out of the window.
    pub fn add(&mut self, at: SimTime, value: f64) {
        self.samples.push_back((at, value));
        while self.samples.len() > 1 {
            match self.samples.front() {
                Some((t, _)) if at.saturating_since(*t) > self.window => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Mean of the samples in the window.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|(_, v)| v).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Time of the newest sample.
    pub fn last_sample(&self) -> Option<SimTime> {
        self.samples.back().map(|(t, _)| *t)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
