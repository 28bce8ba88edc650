//! Request/response facade for transport layers (HTTP handlers, the CLI).
//!
//! Everything here returns a [`ServiceError`] with a stable code instead of
//! the internal error enum. Provider failures are reported with a fixed,
//! user-safe message; details go to the log.

use crate::clinics::{ClinicDirectory, ClinicMatch, GeoPoint, DEFAULT_CLINIC_LIMIT};
use crate::pipeline::{IngestMode, Pipeline, PipelineState};
use crate::types::{Answer, IndexStats, IngestReport};
use cyclecare_core::{AppConfig, AppError, IndexError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Shown instead of provider error text when generation fails.
pub const GENERATION_FALLBACK_MESSAGE: &str =
    "The answer service is temporarily unavailable. Please try again later, and \
     consult a doctor directly if your symptoms are severe or urgent.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    NotReady,
    Configuration,
    SourceUnavailable,
    IndexUnavailable,
    EmbeddingUnavailable,
    GenerationUnavailable,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::NotReady => "not_ready",
            ErrorCode::Configuration => "configuration",
            ErrorCode::SourceUnavailable => "source_unavailable",
            ErrorCode::IndexUnavailable => "index_unavailable",
            ErrorCode::EmbeddingUnavailable => "embedding_unavailable",
            ErrorCode::GenerationUnavailable => "generation_unavailable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned across the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        tracing::error!(error = %err, "Request failed");

        let (code, message) = match &err {
            AppError::InvalidArgument(_) | AppError::Prompt(_) => {
                (ErrorCode::InvalidRequest, err.to_string())
            }
            AppError::NotReady(_) => (ErrorCode::NotReady, err.to_string()),
            AppError::Config(_) => (ErrorCode::Configuration, err.to_string()),
            AppError::Ingest(_) | AppError::Io(_) => {
                (ErrorCode::SourceUnavailable, err.to_string())
            }
            AppError::Index(IndexError::NotFound(_)) => (ErrorCode::NotReady, err.to_string()),
            AppError::Index(_) => (ErrorCode::IndexUnavailable, err.to_string()),
            AppError::Embedding { .. } | AppError::Retrieval(_) => {
                (ErrorCode::EmbeddingUnavailable, err.to_string())
            }
            AppError::Generation { .. } => (
                ErrorCode::GenerationUnavailable,
                GENERATION_FALLBACK_MESSAGE.to_string(),
            ),
            AppError::Timeout { .. } => {
                (ErrorCode::Timeout, GENERATION_FALLBACK_MESSAGE.to_string())
            }
            AppError::Serialization(_) | AppError::Other(_) => {
                (ErrorCode::Internal, "Internal error".to_string())
            }
        };

        Self { code, message }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub index_ready: bool,
    pub generator_reachable: bool,
}

/// The pipeline plus the clinic directory behind one narrow interface.
#[derive(Debug)]
pub struct CareService {
    pipeline: Pipeline,
    clinics: ClinicDirectory,
    documents_dir: Option<PathBuf>,
}

impl CareService {
    pub fn new(
        pipeline: Pipeline,
        clinics: ClinicDirectory,
        documents_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            clinics,
            documents_dir,
        }
    }

    /// Build every component from configuration and open any existing index.
    pub async fn from_config(config: &AppConfig) -> ServiceResult<Self> {
        let pipeline = Pipeline::from_config(config)?;
        let clinics = ClinicDirectory::from_config(config)?;
        let service = Self::new(pipeline, clinics, config.documents_dir());
        let state = service.pipeline.start().await?;
        tracing::info!(?state, "Service started");
        Ok(service)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn state(&self) -> PipelineState {
        self.pipeline.state().await
    }

    /// Ingest `source` (or the configured documents directory) and make the
    /// pipeline ready to answer. With `overwrite` the index is rebuilt from
    /// this source alone.
    pub async fn ingest(
        &self,
        source: Option<&Path>,
        overwrite: bool,
    ) -> ServiceResult<IngestReport> {
        let source = match source {
            Some(path) => path.to_path_buf(),
            None => self.documents_dir.clone().ok_or_else(|| ServiceError {
                code: ErrorCode::InvalidRequest,
                message: "No source given and no documents directory configured".to_string(),
            })?,
        };

        let mode = if overwrite {
            IngestMode::Rebuild
        } else {
            IngestMode::Append
        };
        let report = self.pipeline.ingest(&source, mode).await?;
        self.pipeline.wire().await?;
        Ok(report)
    }

    pub async fn query(&self, question: &str) -> ServiceResult<Answer> {
        Ok(self.pipeline.query(question).await?)
    }

    pub async fn query_with_k(&self, question: &str, k: usize) -> ServiceResult<Answer> {
        Ok(self.pipeline.query_with_k(question, Some(k)).await?)
    }

    pub async fn health(&self) -> HealthStatus {
        let index_ready = self.pipeline.state().await == PipelineState::Ready;
        let generator_reachable = match self.pipeline.generator().health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Generator health check failed");
                false
            }
        };
        HealthStatus {
            index_ready,
            generator_reachable,
        }
    }

    /// Nearest clinics to `location`; empty when no clinic data is loaded.
    pub fn recommend_clinics(&self, location: GeoPoint) -> Vec<ClinicMatch> {
        self.recommend_clinics_with_limit(location, DEFAULT_CLINIC_LIMIT)
    }

    pub fn recommend_clinics_with_limit(
        &self,
        location: GeoPoint,
        limit: usize,
    ) -> Vec<ClinicMatch> {
        self.clinics.recommend(location, limit)
    }

    pub async fn stats(&self) -> ServiceResult<IndexStats> {
        self.pipeline.stats().await.ok_or_else(|| ServiceError {
            code: ErrorCode::NotReady,
            message: "No index yet; ingest documents first".to_string(),
        })
    }
}
