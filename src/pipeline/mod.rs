mod annotate;
mod ingest;
mod liveness;
mod montage;

pub use ingest::IngestLoop;
