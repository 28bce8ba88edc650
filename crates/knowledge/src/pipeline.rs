//! Ingest and query orchestration.
//!
//! The pipeline owns its components and moves through
//! `Uninitialized → Indexed → Ready`. Ingestion is serialised by a writer
//! mutex and only takes the state lock briefly to publish its result, so
//! queries already running keep the chain (and index snapshot) they started
//! with.

use crate::chunker::Chunker;
use crate::embeddings::Embedder;
use crate::generator::Generator;
use crate::index::{BuildMode, SqliteVectorIndex};
use crate::limiter::ExternalCallLimiter;
use crate::parser::load_documents;
use crate::retriever::Retriever;
use crate::types::{
    Answer, DocumentRecord, IndexBatch, IndexEntry, IndexStats, IngestReport, RetrievalResult,
    SourceRef,
};
use cyclecare_core::{AppConfig, AppError, AppResult, IndexError};
use cyclecare_prompt::{assemble, resolve_template, AssembledPrompt, PromptTemplate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::Instrument;

/// Maximum snippet length for source references.
const MAX_SNIPPET_CHARS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Uninitialized,
    Indexed,
    Ready,
}

/// How `ingest` treats an existing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Add new documents to the existing index (or create one)
    Append,
    /// Replace the index with one built from this source only
    Rebuild,
}

/// Query-time knobs.
#[derive(Debug, Clone, Copy)]
pub struct QuerySettings {
    pub top_k: usize,
    pub temperature: f32,
    pub max_prompt_chars: usize,
}

/// The query path as three named stages.
#[derive(Debug)]
pub struct QueryChain {
    retriever: Retriever,
    template: PromptTemplate,
    generator: Generator,
    settings: QuerySettings,
}

impl QueryChain {
    pub fn new(
        retriever: Retriever,
        template: PromptTemplate,
        generator: Generator,
        settings: QuerySettings,
    ) -> Self {
        Self {
            retriever,
            template,
            generator,
            settings,
        }
    }

    async fn retrieve_stage(&self, question: &str, k: Option<usize>) -> AppResult<RetrievalResult> {
        self.retriever
            .retrieve(question, k)
            .await
            .inspect_err(|e| tracing::warn!(stage = "retrieve", error = %e, "Query stage failed"))
    }

    fn assemble_stage(
        &self,
        question: &str,
        retrieved: &RetrievalResult,
    ) -> AppResult<AssembledPrompt> {
        assemble(
            question,
            &retrieved.texts(),
            &self.template,
            self.settings.max_prompt_chars,
        )
        .inspect_err(|e| tracing::warn!(stage = "assemble", error = %e, "Query stage failed"))
    }

    async fn generate_stage(&self, prompt: &AssembledPrompt) -> AppResult<String> {
        self.generator
            .generate(&prompt.text, self.settings.temperature)
            .await
            .inspect_err(|e| tracing::warn!(stage = "generate", error = %e, "Query stage failed"))
    }

    /// Answer `question`. When nothing relevant fits in the prompt the model
    /// is not called and an insufficient-information answer is returned.
    pub async fn run(&self, question: &str, k: Option<usize>) -> AppResult<Answer> {
        let retrieved = self.retrieve_stage(question, k).await?;
        if retrieved.is_empty() {
            tracing::info!("No passages retrieved");
            return Ok(Answer::insufficient_information(question));
        }

        let prompt = self.assemble_stage(question, &retrieved)?;
        if !prompt.has_context() {
            tracing::info!("No passage fits the prompt budget");
            return Ok(Answer::insufficient_information(question));
        }

        let text = self.generate_stage(&prompt).await?;

        tracing::info!(
            passages = prompt.included,
            max_score = retrieved.max_score(),
            "Answered question"
        );

        Ok(Answer {
            text,
            sources: source_refs(&retrieved, prompt.included),
            grounded: true,
            max_score: retrieved.max_score(),
        })
    }
}

/// Close an index that is no longer published. Queries still running on it
/// keep it open; it is then released when the last of them drops it.
/// Returns whether the index was closed here.
async fn close_replaced(old: Arc<SqliteVectorIndex>) -> bool {
    let Ok(old) = Arc::try_unwrap(old) else {
        tracing::debug!("Replaced index still in use by running queries");
        return false;
    };

    match tokio::task::spawn_blocking(move || old.close()).await {
        Ok(Ok(())) => {
            tracing::debug!("Closed replaced index");
            true
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Failed to close replaced index");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "Index close task failed");
            false
        }
    }
}

/// Deduplicated references for the passages that made it into the prompt.
fn source_refs(retrieved: &RetrievalResult, included: usize) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for hit in retrieved.hits.iter().take(included) {
        let metadata = &hit.chunk.metadata;
        let location = metadata.location();
        if seen.insert((metadata.source_name.clone(), location.clone())) {
            sources.push(SourceRef {
                source: metadata.source_name.clone(),
                location,
                snippet: truncate_snippet(&hit.chunk.text, MAX_SNIPPET_CHARS),
            });
        }
    }

    sources
}

fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut snippet: String = collapsed.chars().take(max_chars).collect();
    snippet.push_str("...");
    snippet
}

#[derive(Debug)]
struct Inner {
    state: PipelineState,
    index: Option<Arc<SqliteVectorIndex>>,
    chain: Option<Arc<QueryChain>>,
}

/// The RAG pipeline.
#[derive(Debug)]
pub struct Pipeline {
    embedder: Arc<Embedder>,
    generator: Generator,
    chunker: Chunker,
    template: PromptTemplate,
    settings: QuerySettings,
    index_dir: PathBuf,
    inner: RwLock<Inner>,
    ingest_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        embedder: Embedder,
        generator: Generator,
        chunker: Chunker,
        template: PromptTemplate,
        settings: QuerySettings,
        index_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            embedder: Arc::new(embedder),
            generator,
            chunker,
            template,
            settings,
            index_dir: index_dir.into(),
            inner: RwLock::new(Inner {
                state: PipelineState::Uninitialized,
                index: None,
                chain: None,
            }),
            ingest_lock: Mutex::new(()),
        }
    }

    /// Construct every component from configuration. Nothing is opened or
    /// contacted yet; call [`Pipeline::start`] for that.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let limiter = ExternalCallLimiter::from_config(&config.rag);
        let embedder = Embedder::from_config(&config.embedding, limiter.clone())?;
        let client = cyclecare_llm::create_client(
            &config.provider,
            config.generation.endpoint.as_deref(),
            config.resolve_api_key().as_deref(),
        )?;
        let generator = Generator::new(
            client,
            config.model.clone(),
            config.generation.max_output_tokens,
            limiter,
        );
        let chunker = Chunker::from_config(&config.rag)?;
        let template = resolve_template(config)?;

        tracing::info!(
            provider = %config.provider,
            model = %config.model,
            scheme = %embedder.scheme_id(),
            template = template.id(),
            "Configured pipeline"
        );

        Ok(Self::new(
            embedder,
            generator,
            chunker,
            template,
            QuerySettings {
                top_k: config.rag.top_k,
                temperature: config.generation.temperature,
                max_prompt_chars: config.rag.max_prompt_chars,
            },
            config.index_dir(),
        ))
    }

    pub async fn state(&self) -> PipelineState {
        self.inner.read().await.state
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Open the persisted index if there is one.
    ///
    /// A missing index leaves the pipeline `Uninitialized`; an index built
    /// with a different embedding scheme is an error. Calling this again once
    /// an index is open does nothing.
    pub async fn open_index(&self) -> AppResult<PipelineState> {
        let mut inner = self.inner.write().await;
        if inner.index.is_some() {
            return Ok(inner.state);
        }

        match self.open_existing().await? {
            Some(index) => {
                inner.index = Some(Arc::new(index));
                inner.state = PipelineState::Indexed;
            }
            None => tracing::info!("No index at {:?}; ingest documents first", self.index_dir),
        }
        Ok(inner.state)
    }

    async fn open_existing(&self) -> AppResult<Option<SqliteVectorIndex>> {
        let location = self.index_dir.clone();
        let opened = tokio::task::spawn_blocking(move || SqliteVectorIndex::open(&location))
            .await
            .map_err(|e| AppError::Other(format!("index open task failed: {}", e)))?;

        let index = match opened {
            Ok(index) => index,
            Err(AppError::Index(IndexError::NotFound(_))) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.check_compatible(&index)?;

        tracing::info!(
            chunks = index.len(),
            scheme = index.scheme(),
            "Opened existing index"
        );
        Ok(Some(index))
    }

    fn check_compatible(&self, index: &SqliteVectorIndex) -> AppResult<()> {
        index.ensure_scheme(&self.embedder.scheme_id())?;
        if index.dimensions() != self.embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimensions(),
                actual: self.embedder.dimensions(),
            }
            .into());
        }
        Ok(())
    }

    fn make_chain(&self, index: Arc<SqliteVectorIndex>) -> Arc<QueryChain> {
        Arc::new(QueryChain::new(
            Retriever::new(Arc::clone(&self.embedder), index, self.settings.top_k),
            self.template.clone(),
            self.generator.clone(),
            self.settings,
        ))
    }

    /// Connect the query chain to the open index: `Indexed → Ready`.
    pub async fn wire(&self) -> AppResult<PipelineState> {
        let mut inner = self.inner.write().await;
        match inner.state {
            PipelineState::Ready => Ok(PipelineState::Ready),
            PipelineState::Uninitialized => Err(AppError::NotReady(
                "no index to query; ingest documents first".to_string(),
            )),
            PipelineState::Indexed => {
                let index = inner.index.clone().ok_or_else(|| {
                    AppError::NotReady("index handle missing".to_string())
                })?;
                inner.chain = Some(self.make_chain(index));
                inner.state = PipelineState::Ready;
                tracing::info!("Query chain ready");
                Ok(PipelineState::Ready)
            }
        }
    }

    /// Open the existing index and, if there is one, wire the query chain.
    pub async fn start(&self) -> AppResult<PipelineState> {
        match self.open_index().await? {
            PipelineState::Uninitialized => Ok(PipelineState::Uninitialized),
            _ => self.wire().await,
        }
    }

    /// Load, chunk, embed and index everything under `source`.
    ///
    /// Documents already in the index (same content hash) are skipped. The
    /// write is one transaction: on error the index keeps its previous
    /// contents. A `Ready` pipeline stays `Ready`.
    pub async fn ingest(&self, source: &Path, mode: IngestMode) -> AppResult<IngestReport> {
        let _writer = self.ingest_lock.lock().await;
        tracing::info!(source = %source.display(), ?mode, "Starting ingest");

        let existing = match mode {
            IngestMode::Rebuild => None,
            IngestMode::Append => {
                let current = self.inner.read().await.index.clone();
                match current {
                    Some(index) => Some(index),
                    None => self.open_existing().await?.map(Arc::new),
                }
            }
        };

        let source_path = source.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || load_documents(&source_path))
            .await
            .map_err(|e| AppError::Ingest(format!("document loading task failed: {}", e)))??;

        let mut report = IngestReport {
            documents_seen: loaded.documents.len(),
            files_skipped: loaded.skipped_files,
            ..Default::default()
        };

        let mut seen_hashes = HashSet::new();
        let mut batch = IndexBatch::default();
        let mut chunks = Vec::new();
        for document in &loaded.documents {
            let already_indexed = existing
                .as_ref()
                .is_some_and(|index| index.contains_document(&document.content_hash));
            if already_indexed || !seen_hashes.insert(document.content_hash.clone()) {
                tracing::debug!(
                    source = %document.metadata.source_name,
                    "Skipping already indexed document"
                );
                report.documents_skipped += 1;
                continue;
            }

            batch.documents.push(DocumentRecord::from(document));
            chunks.extend(
                self.chunker
                    .split(document)
                    .filter(|chunk| !chunk.text.trim().is_empty()),
            );
        }
        report.documents_indexed = batch.documents.len();

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| match e {
            AppError::Timeout { .. } => e,
            other => AppError::Ingest(format!("Failed to embed chunks: {}", other)),
        })?;
        batch.entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        report.chunks_indexed = batch.entries.len();

        let index = match existing {
            Some(index) => {
                index.append(batch).await?;
                index
            }
            None => {
                let build_mode = match mode {
                    IngestMode::Rebuild => BuildMode::Overwrite,
                    IngestMode::Append => BuildMode::CreateNew,
                };
                let location = self.index_dir.clone();
                let scheme = self.embedder.scheme_id();
                let dimensions = self.embedder.dimensions();
                let built = tokio::task::spawn_blocking(move || {
                    SqliteVectorIndex::build(&location, &scheme, dimensions, batch, build_mode)
                })
                .await
                .map_err(|e| AppError::Ingest(format!("index build task failed: {}", e)))??;
                Arc::new(built)
            }
        };

        self.publish(index).await;

        tracing::info!(
            documents = report.documents_indexed,
            skipped = report.documents_skipped,
            chunks = report.chunks_indexed,
            "Ingest complete"
        );
        Ok(report)
    }

    /// Install `index` as the current one and advance the state.
    async fn publish(&self, index: Arc<SqliteVectorIndex>) {
        let previous = {
            let mut inner = self.inner.write().await;
            let replaced = !inner
                .index
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &index));

            match inner.state {
                PipelineState::Ready if replaced => {
                    inner.chain = Some(self.make_chain(Arc::clone(&index)));
                }
                PipelineState::Ready => {}
                _ => inner.state = PipelineState::Indexed,
            }
            inner.index.replace(index).filter(|_| replaced)
        };

        if let Some(old) = previous {
            close_replaced(old).await;
        }
    }

    /// Answer a question with the configured `top_k`.
    pub async fn query(&self, question: &str) -> AppResult<Answer> {
        self.query_with_k(question, None).await
    }

    /// Answer a question. Fails with `NotReady` unless the pipeline is
    /// `Ready`; nothing is embedded or generated in that case.
    pub async fn query_with_k(&self, question: &str, k: Option<usize>) -> AppResult<Answer> {
        let chain = {
            let inner = self.inner.read().await;
            match (&inner.state, &inner.chain) {
                (PipelineState::Ready, Some(chain)) => Arc::clone(chain),
                (state, _) => {
                    return Err(AppError::NotReady(format!(
                        "pipeline is {:?}; ingest documents and start the pipeline first",
                        state
                    )))
                }
            }
        };

        if question.trim().is_empty() {
            return Err(AppError::InvalidArgument("question must not be empty".to_string()));
        }

        chain
            .run(question, k)
            .instrument(tracing::info_span!("query", question_chars = question.chars().count()))
            .await
    }

    /// Statistics of the open index, if any.
    pub async fn stats(&self) -> Option<IndexStats> {
        self.inner
            .read()
            .await
            .index
            .as_ref()
            .map(|index| index.stats())
    }
}
