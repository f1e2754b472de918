pub mod embedder;
pub mod ingest;
