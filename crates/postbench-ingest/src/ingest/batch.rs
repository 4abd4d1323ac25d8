//! Same-kind entity accumulators for the batched strategy.

use crate::Result;
use crate::store::write_many;
use postbench_core::{Actor, Location, NormalizedRecord, Post};
use rusqlite::Connection;
use std::num::NonZeroUsize;

/// Rows inserted by one flush (rows already present are not counted).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub actors: usize,
    pub locations: usize,
    pub posts: usize,
}

/// Accumulates actors, locations and posts until one of them reaches the
/// batch size, then writes all three together in one transaction.
///
/// Flushing the three kinds together keeps every post in the same unit of
/// work as the actor and location it references.
pub struct EntityBatch {
    batch_size: usize,
    actors: Vec<Actor>,
    locations: Vec<Location>,
    posts: Vec<Post>,
}

impl EntityBatch {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        let batch_size = batch_size.get();
        Self {
            batch_size,
            actors: Vec::with_capacity(batch_size),
            locations: Vec::with_capacity(batch_size),
            posts: Vec::with_capacity(batch_size),
        }
    }

    pub fn push(&mut self, record: NormalizedRecord) {
        self.actors.push(record.actor);
        if let Some(location) = record.location {
            self.locations.push(location);
        }
        self.posts.push(record.post);
    }

    /// Whether any accumulator reached the batch size.
    pub fn is_full(&self) -> bool {
        self.actors.len() >= self.batch_size
            || self.locations.len() >= self.batch_size
            || self.posts.len() >= self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty() && self.locations.is_empty() && self.posts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Write and commit all three accumulators, then clear them.
    pub fn flush(&mut self, conn: &mut Connection) -> Result<FlushStats> {
        let tx = conn.transaction()?;
        let stats = FlushStats {
            actors: write_many(&tx, &self.actors)?,
            locations: write_many(&tx, &self.locations)?,
            posts: write_many(&tx, &self.posts)?,
        };
        tx.commit()?;

        tracing::debug!(
            "Flushed batch of {} posts ({} actors, {} locations, {} posts new)",
            self.posts.len(),
            stats.actors,
            stats.locations,
            stats.posts
        );

        self.actors.clear();
        self.locations.clear();
        self.posts.clear();
        Ok(stats)
    }
}
