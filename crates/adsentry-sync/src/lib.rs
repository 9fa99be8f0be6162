//! Offline maintenance jobs over the historical case corpus.
//!
//! - [`BacklogTagger`] fills in tag flags for cases that have none, using the
//!   same identifier as the online pipeline.
//! - [`IndexSync`] embeds tagged cases and upserts them into the vector index.
//!
//! Both work in fixed-size batches with keyset pagination on case id, so a
//! run that is interrupted can simply be started again.

mod index_sync;
mod tagger;

#[cfg(test)]
mod testing;

/// Cases handled per batch by both jobs unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 50;

pub use index_sync::{IndexSync, SyncStats};
pub use tagger::{BacklogTagger, TaggerStats};
