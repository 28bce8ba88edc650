//! Retrieval-augmented answering over a local document collection.
//!
//! Documents are loaded, split into overlapping character windows, embedded
//! and persisted in a SQLite-backed vector index. Questions are embedded with
//! the same scheme, matched by cosine similarity and answered by a generation
//! model from a budgeted prompt. [`CareService`] wraps the pipeline and the
//! clinic directory for transport layers.

pub mod chunker;
pub mod clinics;
pub mod embeddings;
pub mod generator;
pub mod index;
pub mod limiter;
pub mod parser;
pub mod pipeline;
pub mod retriever;
pub mod service;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::Chunker;
pub use clinics::{Clinic, ClinicDirectory, ClinicMatch, GeoPoint, DEFAULT_CLINIC_LIMIT};
pub use embeddings::{Embedder, EmbeddingProvider};
pub use generator::Generator;
pub use index::{BuildMode, SqliteVectorIndex};
pub use limiter::ExternalCallLimiter;
pub use parser::load_documents;
pub use pipeline::{IngestMode, Pipeline, PipelineState, QueryChain, QuerySettings};
pub use retriever::Retriever;
pub use service::{
    CareService, ErrorCode, HealthStatus, ServiceError, ServiceResult,
    GENERATION_FALLBACK_MESSAGE,
};
pub use types::{
    Answer, Chunk, Document, IndexStats, IngestReport, RetrievalResult, ScoredChunk,
    SourceMetadata, SourceRef,
};
