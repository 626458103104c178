use std::hint::black_box;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::shutdown::ShutdownSignal;

/// Iterations of arithmetic between two cancellation checks.
pub const DEFAULT_BATCH_SIZE: u64 = 1_000_000;

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub batches: u64,
}

/// Burns one CPU until the signal fires.
pub struct Worker {
    id: usize,
    batch_size: u64,
    rng: StdRng,
}

impl Worker {
    pub fn new(id: usize, batch_size: u64) -> Self {
        Self {
            id,
            batch_size,
            rng: StdRng::seed_from_u64(seed_for(id)),
        }
    }

    /// Runs batches back to back. The signal is only looked at between batches,
    /// so a stop request takes at most one batch to be honoured.
    pub fn run(mut self, signal: ShutdownSignal) -> WorkerReport {
        println!("Worker {} started on CPU core", self.id);
        debug!(worker = self.id, batch_size = self.batch_size, "worker started");

        let mut batches = 0u64;
        while !signal.is_cancelled() {
            self.batch();
            batches += 1;
        }

        println!("Worker {} shutting down", self.id);
        debug!(worker = self.id, batches, "worker stopped");
        WorkerReport {
            id: self.id,
            batches,
        }
    }

    fn batch(&mut self) {
        let rng = &mut self.rng;
        for _ in 0..self.batch_size {
            let a: f64 = rng.random();
            let b: f64 = rng.random();
            let c: f64 = rng.random();
            black_box(a * b / (c + 0.1));

            let x = rng.random_range(0..1_000_000i64);
            let y = rng.random_range(0..1_000_000i64);
            black_box(x.wrapping_mul(y));
        }
    }
}

// Workers started in the same instant still get distinct streams.
fn seed_for(id: usize) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    nanos.wrapping_add(id as u64)
}
