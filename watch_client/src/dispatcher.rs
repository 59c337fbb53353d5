//! Staggered subscription of the instrument catalog.
//!
//! A subscribe-all request is split into fixed-size batches. The session sends
//! the first batch right away and each following batch after the batch delay,
//! so a large catalog never turns into one burst of subscribe messages. Every
//! plan carries a generation number; starting a new plan or cancelling makes
//! the timers of the old plan harmless.
use std::collections::VecDeque;

use log::debug;
use watch_common::Instrument;

/// Batch planner and cursor.
#[derive(Debug)]
pub struct SubscriptionDispatcher {
    batch_size: usize,
    pending: VecDeque<Vec<Instrument>>,
    generation: u64,
}

impl SubscriptionDispatcher {
    /// Dispatcher emitting `batch_size` instruments per batch.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: VecDeque::new(),
            generation: 0,
        }
    }

    /// Generation of the current plan.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Batches not yet handed out.
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }

    /// Replaces any previous plan with one covering `catalog`.
    ///
    /// Returns the new generation. An empty catalog produces an empty plan.
    pub fn plan(&mut self, catalog: &[Instrument]) -> u64 {
        self.generation += 1;
        self.pending = catalog
            .chunks(self.batch_size)
            .map(<[Instrument]>::to_vec)
            .collect();
        debug!(
            "Subscription plan {}: {} instruments in {} batches",
            self.generation,
            catalog.len(),
            self.pending.len()
        );
        self.generation
    }

    /// Next batch of the plan `generation`, if that plan is still current.
    pub fn next_batch(&mut self, generation: u64) -> Option<Vec<Instrument>> {
        if generation != self.generation {
            return None;
        }
        self.pending.pop_front()
    }

    /// `true` when plan `generation` still has batches left.
    pub fn has_more(&self, generation: u64) -> bool {
        generation == self.generation && !self.pending.is_empty()
    }

    /// Drops the current plan.
    pub fn cancel(&mut self) {
        if !self.pending.is_empty() {
            debug!("Cancelling {} pending subscription batches", self.pending.len());
        }
        self.generation += 1;
        self.pending.clear();
    }
}
