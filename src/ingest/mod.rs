//! Event ingestion: bounded batch writes and the random data generator

mod batcher;
mod generator;

pub use batcher::{chunk_events, ChunkFailure, IngestReport, IngestionBatcher};
pub use generator::{fleet_events, random_events, spawn_generator, GeneratorConfig};
