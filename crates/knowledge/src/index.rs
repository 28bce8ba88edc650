//! SQLite-backed vector index for knowledge chunks.
//!
//! One SQLite file per index directory holds a key/value manifest (format
//! version, embedding scheme, dimensions, creation time), the indexed
//! documents and the chunks with their embeddings as little-endian `f32`
//! blobs. Searches run against an in-memory snapshot that is replaced, never
//! mutated, after each committed append, so readers are not blocked by
//! writers.

use crate::types::{
    Chunk, DocumentRecord, IndexBatch, IndexEntry, IndexStats, RetrievalResult, ScoredChunk,
    SourceMetadata,
};
use chrono::{DateTime, Utc};
use cyclecare_core::{AppError, AppResult, IndexError};
use rusqlite::{params, Connection, OpenFlags, Transaction};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// File name of the index database inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";
const BUILD_FILE: &str = "index.sqlite.building";
const FORMAT_VERSION: &str = "1";

/// What `build` does when the location already holds an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Fail with `IndexError::AlreadyExists`
    CreateNew,
    /// Replace the existing index; the old one stays intact until the new
    /// one is complete
    Overwrite,
}

#[derive(Debug, Default)]
struct Snapshot {
    entries: Vec<IndexEntry>,
    document_hashes: HashSet<String>,
}

/// Handle to an open vector index.
///
/// Dropping the handle closes the database.
#[derive(Debug)]
pub struct SqliteVectorIndex {
    location: PathBuf,
    scheme: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    conn: Arc<Mutex<Connection>>,
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
}

fn storage(context: &str, err: impl std::fmt::Display) -> AppError {
    IndexError::Storage(format!("{}: {}", context, err)).into()
}

impl SqliteVectorIndex {
    /// Create a fresh index at `location` containing `batch`.
    ///
    /// The database is written to a temporary file and renamed into place,
    /// so a failed build never leaves a half-written index behind.
    pub fn build(
        location: &Path,
        scheme: &str,
        dimensions: usize,
        batch: IndexBatch,
        mode: BuildMode,
    ) -> AppResult<Self> {
        let final_path = location.join(INDEX_FILE);
        if mode == BuildMode::CreateNew && final_path.exists() {
            return Err(IndexError::AlreadyExists(location.to_path_buf()).into());
        }
        if dimensions == 0 {
            return Err(AppError::InvalidArgument(
                "index dimensions must be positive".to_string(),
            ));
        }
        check_dimensions(&batch.entries, dimensions)?;

        fs::create_dir_all(location)?;
        let build_path = location.join(BUILD_FILE);
        if build_path.exists() {
            fs::remove_file(&build_path)?;
        }

        let written = write_new(&build_path, scheme, dimensions, &batch);
        if let Err(e) = written {
            let _ = fs::remove_file(&build_path);
            return Err(e);
        }
        fs::rename(&build_path, &final_path)?;

        tracing::info!(
            location = %location.display(),
            scheme,
            dimensions,
            documents = batch.documents.len(),
            chunks = batch.entries.len(),
            "Built vector index"
        );

        Self::open(location)
    }

    /// Open a previously built index. Nothing is re-embedded.
    pub fn open(location: &Path) -> AppResult<Self> {
        let path = location.join(INDEX_FILE);
        if !path.is_file() {
            return Err(IndexError::NotFound(location.to_path_buf()).into());
        }

        let corrupt = |reason: String| -> AppError {
            IndexError::Corrupt {
                path: path.clone(),
                reason,
            }
            .into()
        };

        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|e| corrupt(e.to_string()))?;

        let manifest = read_manifest(&conn).map_err(|e| corrupt(e.to_string()))?;
        let version = manifest.require(&path, "format_version")?;
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", version)));
        }
        let scheme = manifest.require(&path, "scheme")?.to_string();
        let dimensions: usize = manifest
            .require(&path, "dimensions")?
            .parse()
            .map_err(|_| corrupt("invalid dimensions in manifest".to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(manifest.require(&path, "created_at")?)
            .map_err(|e| corrupt(format!("invalid creation time: {}", e)))?
            .with_timezone(&Utc);

        let snapshot = load_snapshot(&conn, dimensions).map_err(|e| match e {
            LoadError::Sql(e) => corrupt(e.to_string()),
            LoadError::Blob { chunk_id, bytes } => corrupt(format!(
                "embedding of chunk {} has {} bytes, expected {}",
                chunk_id,
                bytes,
                dimensions * 4
            )),
        })?;

        tracing::debug!(
            location = %location.display(),
            chunks = snapshot.entries.len(),
            "Opened vector index"
        );

        Ok(Self {
            location: location.to_path_buf(),
            scheme,
            dimensions,
            created_at,
            conn: Arc::new(Mutex::new(conn)),
            snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
        })
    }

    /// Add documents and entries in one transaction, then publish a new
    /// snapshot. On failure the index and its snapshot are unchanged.
    pub async fn append(&self, batch: IndexBatch) -> AppResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        check_dimensions(&batch.entries, self.dimensions)?;

        let conn = Arc::clone(&self.conn);
        let snapshot = Arc::clone(&self.snapshot);

        tokio::task::spawn_blocking(move || -> AppResult<()> {
            let mut conn = conn
                .lock()
                .map_err(|_| storage("append", "connection lock poisoned"))?;

            let tx = conn
                .transaction()
                .map_err(|e| storage("begin transaction", e))?;
            insert_batch(&tx, &batch)?;
            tx.commit().map_err(|e| storage("commit", e))?;

            // Copy-on-write: in-flight searches keep the snapshot they hold.
            let mut current = snapshot.write().unwrap_or_else(|p| p.into_inner());
            let mut entries = current.entries.clone();
            let mut document_hashes = current.document_hashes.clone();
            document_hashes.extend(batch.documents.iter().map(|d| d.content_hash.clone()));
            entries.extend(batch.entries);
            *current = Arc::new(Snapshot {
                entries,
                document_hashes,
            });
            Ok(())
        })
        .await
        .map_err(|e| storage("append task", e))??;

        tracing::debug!(chunks = self.len(), "Appended to vector index");
        Ok(())
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|p| p.into_inner()))
    }

    /// The `k` entries most similar to `query` by cosine similarity, best
    /// first. Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> AppResult<RetrievalResult> {
        if k == 0 {
            return Err(AppError::InvalidArgument("k must be at least 1".to_string()));
        }
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            }
            .into());
        }

        let snapshot = self.current();
        let mut hits: Vec<ScoredChunk> = snapshot
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        // sort_by is stable, so ties stay in insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        tracing::debug!(
            "Retrieved {} chunks (requested top-{})",
            hits.len(),
            k
        );

        Ok(RetrievalResult { hits })
    }

    /// Whether a document with this content hash is already indexed.
    pub fn contains_document(&self, content_hash: &str) -> bool {
        self.current().document_hashes.contains(content_hash)
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Fail with `SchemeMismatch` unless vectors from `scheme` are
    /// comparable with the ones stored here.
    pub fn ensure_scheme(&self, scheme: &str) -> AppResult<()> {
        if self.scheme != scheme {
            return Err(IndexError::SchemeMismatch {
                indexed: self.scheme.clone(),
                current: scheme.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.current();
        IndexStats {
            documents: snapshot.document_hashes.len(),
            chunks: snapshot.entries.len(),
            dimensions: self.dimensions,
            scheme: self.scheme.clone(),
            created_at: self.created_at,
        }
    }

    /// Close the database, reporting any error from SQLite. If an append is
    /// still running the connection is closed when it finishes instead.
    pub fn close(self) -> AppResult<()> {
        if let Ok(mutex) = Arc::try_unwrap(self.conn) {
            let conn = mutex.into_inner().unwrap_or_else(|p| p.into_inner());
            conn.close().map_err(|(_, e)| storage("close", e))?;
        }
        Ok(())
    }
}

fn check_dimensions(entries: &[IndexEntry], dimensions: usize) -> AppResult<()> {
    if let Some(entry) = entries.iter().find(|e| e.vector.len() != dimensions) {
        return Err(IndexError::DimensionMismatch {
            expected: dimensions,
            actual: entry.vector.len(),
        }
        .into());
    }
    Ok(())
}

fn write_new(path: &Path, scheme: &str, dimensions: usize, batch: &IndexBatch) -> AppResult<()> {
    let mut conn = Connection::open(path).map_err(|e| storage("create index", e))?;

    conn.execute_batch(
        r#"
        CREATE TABLE manifest (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE documents (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL UNIQUE,
            source_name TEXT NOT NULL,
            page INTEGER,
            section TEXT,
            char_count INTEGER NOT NULL
        );

        CREATE TABLE chunks (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            document_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            char_start INTEGER NOT NULL,
            char_end INTEGER NOT NULL,
            source_name TEXT NOT NULL,
            page INTEGER,
            section TEXT,
            embedding BLOB NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        );
        "#,
    )
    .map_err(|e| storage("create tables", e))?;

    let tx = conn
        .transaction()
        .map_err(|e| storage("begin transaction", e))?;
    let dimensions = dimensions.to_string();
    let created_at = Utc::now().to_rfc3339();
    for (key, value) in [
        ("format_version", FORMAT_VERSION),
        ("scheme", scheme),
        ("dimensions", dimensions.as_str()),
        ("created_at", created_at.as_str()),
    ] {
        tx.execute(
            "INSERT INTO manifest (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(|e| storage("write manifest", e))?;
    }
    insert_batch(&tx, batch)?;
    tx.commit().map_err(|e| storage("commit", e))?;

    conn.close().map_err(|(_, e)| storage("close", e))
}

fn insert_batch(tx: &Transaction<'_>, batch: &IndexBatch) -> AppResult<()> {
    for document in &batch.documents {
        insert_document(tx, document)?;
    }
    for entry in &batch.entries {
        insert_entry(tx, entry)?;
    }
    Ok(())
}

fn insert_document(tx: &Transaction<'_>, document: &DocumentRecord) -> AppResult<()> {
    tx.execute(
        "INSERT INTO documents (id, content_hash, source_name, page, section, char_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            document.id,
            document.content_hash,
            document.metadata.source_name,
            document.metadata.page,
            document.metadata.section,
            document.char_count as i64,
        ],
    )
    .map_err(|e| storage("insert document", e))?;
    Ok(())
}

fn insert_entry(tx: &Transaction<'_>, entry: &IndexEntry) -> AppResult<()> {
    let chunk = &entry.chunk;
    tx.execute(
        "INSERT INTO chunks (id, document_id, position, text, char_start, char_end,
                             source_name, page, section, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            chunk.id,
            chunk.document_id,
            chunk.position as i64,
            chunk.text,
            chunk.char_start as i64,
            chunk.char_end as i64,
            chunk.metadata.source_name,
            chunk.metadata.page,
            chunk.metadata.section,
            embedding_to_bytes(&entry.vector),
        ],
    )
    .map_err(|e| storage("insert chunk", e))?;
    Ok(())
}

struct Manifest(Vec<(String, String)>);

impl Manifest {
    fn require(&self, path: &Path, key: &str) -> AppResult<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| {
                IndexError::Corrupt {
                    path: path.to_path_buf(),
                    reason: format!("manifest is missing '{}'", key),
                }
                .into()
            })
    }
}

fn read_manifest(conn: &Connection) -> rusqlite::Result<Manifest> {
    let mut stmt = conn.prepare("SELECT key, value FROM manifest")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    Ok(Manifest(rows.collect::<rusqlite::Result<Vec<_>>>()?))
}

enum LoadError {
    Sql(rusqlite::Error),
    Blob { chunk_id: String, bytes: usize },
}

impl From<rusqlite::Error> for LoadError {
    fn from(e: rusqlite::Error) -> Self {
        LoadError::Sql(e)
    }
}

fn load_snapshot(conn: &Connection, dimensions: usize) -> Result<Snapshot, LoadError> {
    let mut snapshot = Snapshot::default();

    let mut stmt = conn.prepare("SELECT content_hash FROM documents")?;
    for hash in stmt.query_map([], |row| row.get::<_, String>(0))? {
        snapshot.document_hashes.insert(hash?);
    }

    let mut stmt = conn.prepare(
        "SELECT id, document_id, position, text, char_start, char_end,
                source_name, page, section, embedding
         FROM chunks ORDER BY seq",
    )?;
    let rows = stmt.query_map([], |row| {
        let chunk = Chunk {
            id: row.get(0)?,
            document_id: row.get(1)?,
            position: row.get::<_, i64>(2)? as usize,
            text: row.get(3)?,
            char_start: row.get::<_, i64>(4)? as usize,
            char_end: row.get::<_, i64>(5)? as usize,
            metadata: SourceMetadata {
                source_name: row.get(6)?,
                page: row.get(7)?,
                section: row.get(8)?,
            },
        };
        let blob: Vec<u8> = row.get(9)?;
        Ok((chunk, blob))
    })?;

    for row in rows {
        let (chunk, blob) = row?;
        if blob.len() != dimensions * 4 {
            return Err(LoadError::Blob {
                chunk_id: chunk.id,
                bytes: blob.len(),
            });
        }
        snapshot.entries.push(IndexEntry {
            chunk,
            vector: bytes_to_embedding(&blob),
        });
    }

    Ok(snapshot)
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to an embedding vector; the length is checked by the caller.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity; zero when either vector has no magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
