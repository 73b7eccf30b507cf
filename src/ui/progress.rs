//! Progress indicators for long-running operations
//!
//! Uses `linya` for allocation-free, concurrency-optimized progress bars.
//! Batches publish packages in parallel, so the container is thread-safe.

use linya::{Bar, Progress};
use std::sync::{Arc, Mutex};

/// Multi-bar progress for parallel operations
#[derive(Clone)]
pub struct MultiProgress {
  progress: Arc<Mutex<Progress>>,
}

impl MultiProgress {
  pub fn new() -> Self {
    Self {
      progress: Arc::new(Mutex::new(Progress::new())),
    }
  }

  /// Add a new bar with a label and total
  pub fn add_bar(&self, total: usize, label: impl Into<String>) -> Bar {
    let mut progress = self.progress.lock().unwrap();
    progress.bar(total, label.into())
  }

  /// Increment a bar (thread-safe)
  pub fn inc(&self, bar: &Bar) {
    let mut progress = self.progress.lock().unwrap();
    progress.inc_and_draw(bar, 1);
  }
}

impl Default for MultiProgress {
  fn default() -> Self {
    Self::new()
  }
}
