//! Thread pool configuration
//!
//! Spatial reductions run on rayon's global pool. The binary sizes that pool
//! once at start-up; library callers may do the same or keep rayon's default.

use crate::errors::{EnsoMetricsError, Result};
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::info;

/// Configuration for parallel processing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    #[must_use]
    pub const fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Use every available CPU core
    #[must_use]
    pub fn all_cores() -> Self {
        Self::new(Some(num_cpus::get()))
    }

    /// Set up the global rayon pool
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero thread count or when the
    /// global pool has already been initialized.
    pub fn setup_global_pool(&self) -> Result<()> {
        match self.num_threads {
            Some(0) => Err(EnsoMetricsError::InvalidConfiguration {
                message: "thread count must be at least 1".to_string(),
            }),
            Some(n) => {
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build_global()
                    .map_err(|e| EnsoMetricsError::InvalidConfiguration {
                        message: format!("failed to initialize thread pool with {n} threads: {e}"),
                    })?;
                info!(threads = n, "configured parallel processing");
                Ok(())
            }
            None => {
                info!(threads = rayon::current_num_threads(), "using default thread pool");
                Ok(())
            }
        }
    }
}

/// Snapshot of the parallel environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
}

#[must_use]
pub fn parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
    }
}
