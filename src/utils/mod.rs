//! Utility functions and types

pub mod data_loader;

pub use data_loader::{dataframe_to_array2, save_predictions, DataLoader, Dataset};

use std::time::{Duration, Instant};

/// Wall-clock timer for pipeline stages
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
