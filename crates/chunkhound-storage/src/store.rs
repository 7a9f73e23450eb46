//! The single-writer chunk store
//!
//! Exactly one `ChunkStore` owns the live writer connection; all mutation
//! funnels through it via the scheduler's worker. Readers ride the same
//! connection because the worker serializes every DB-touching task.
//!
//! Durability rules enforced here:
//! 1. explicit checkpoints on an operation-count threshold, a wall-clock
//!    timeout, bulk-load completion, and shutdown;
//! 2. shutdown is drain, then checkpoint, then close, driven by the worker
//!    loop and never from a signal context;
//! 3. a WAL that cannot replay because the vector index type is unknown is
//!    recovered by attaching from a throwaway connection with the extension
//!    pre-loaded, checkpointing, and detaching; failing that, the WAL is
//!    backed up and removed;
//! 4. bulk loads drop the HNSW index, insert, recreate it, and checkpoint.

use crate::error::{StorageError, StorageResult};
use crate::models::{EmbeddingTableInfo, FileRecord, NewFile, StoreStats};
use chunkhound_parsing::Chunk;
use duckdb::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// When to force an explicit checkpoint
#[derive(Debug, Clone, Copy)]
pub struct CheckpointPolicy {
    /// Mutating operations between checkpoints
    pub ops_threshold: u64,
    /// Wall-clock time between checkpoints
    pub interval: Duration,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            ops_threshold: 500,
            interval: Duration::from_secs(60),
        }
    }
}

/// Single-writer store over files, chunks, and embedding tables
pub struct ChunkStore {
    conn: Connection,
    db_path: PathBuf,
    policy: CheckpointPolicy,
    ops_since_checkpoint: u64,
    last_checkpoint: Instant,
    ann_ready: bool,
}

const SCHEMA: &str = r"
CREATE SEQUENCE IF NOT EXISTS files_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS chunks_id_seq START 1;

CREATE TABLE IF NOT EXISTS files (
    id BIGINT PRIMARY KEY DEFAULT nextval('files_id_seq'),
    path VARCHAR NOT NULL UNIQUE,
    size_bytes BIGINT NOT NULL,
    mtime DOUBLE NOT NULL,
    content_crc32 BIGINT NOT NULL,
    language VARCHAR NOT NULL,
    first_seen TIMESTAMP NOT NULL DEFAULT current_timestamp,
    last_indexed TIMESTAMP
);

CREATE TABLE IF NOT EXISTS chunks (
    id BIGINT PRIMARY KEY DEFAULT nextval('chunks_id_seq'),
    file_id BIGINT NOT NULL,
    kind VARCHAR NOT NULL,
    symbol VARCHAR NOT NULL,
    code VARCHAR NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    language VARCHAR NOT NULL,
    qualified_name VARCHAR
);
CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id);

CREATE TABLE IF NOT EXISTS embedding_tables (
    table_name VARCHAR PRIMARY KEY,
    provider VARCHAR NOT NULL,
    model VARCHAR NOT NULL,
    dimension INTEGER NOT NULL
);
";

impl ChunkStore {
    /// Open (or create) the database at `path`, running WAL recovery if the
    /// log references the vector index type before the extension loads.
    ///
    /// # Errors
    /// Fatal open failures (bad path, irrecoverable corruption).
    pub fn open(path: &Path, policy: CheckpointPolicy) -> StorageResult<Self> {
        let conn = match Self::try_open(path) {
            Ok(conn) => conn,
            Err(e) if is_wal_replay_failure(&e) => {
                warn!(db = %path.display(), "WAL replay failed on open, starting recovery");
                recover_wal(path)?;
                Self::try_open(path)?
            }
            Err(e) => return Err(e.into()),
        };

        let ann_ready = load_ann_extension(&conn);
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn,
            db_path: path.to_path_buf(),
            policy,
            ops_since_checkpoint: 0,
            last_checkpoint: Instant::now(),
            ann_ready,
        })
    }

    fn try_open(path: &Path) -> duckdb::Result<Connection> {
        Connection::open(path)
    }

    /// Whether vector search is available on this connection
    pub const fn ann_ready(&self) -> bool {
        self.ann_ready
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) const fn connection(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Insert or update the file row for `file.path`, returning its id
    ///
    /// # Errors
    /// Database failures.
    pub fn upsert_file(&mut self, file: &NewFile) -> StorageResult<i64> {
        let id = self.conn.query_row(
            "INSERT INTO files (path, size_bytes, mtime, content_crc32, language)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (path) DO UPDATE SET
                 size_bytes = excluded.size_bytes,
                 mtime = excluded.mtime,
                 content_crc32 = excluded.content_crc32,
                 language = excluded.language
             RETURNING id",
            params![
                file.path,
                file.size_bytes,
                file.mtime,
                i64::from(file.content_crc32),
                file.language
            ],
            |row| row.get::<_, i64>(0),
        )?;
        self.note_mutations(1);
        Ok(id)
    }

    /// Load a file row by canonical path
    pub fn get_file(&self, path: &str) -> StorageResult<Option<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, size_bytes, mtime, content_crc32, language,
                    CAST(epoch(first_seen) AS DOUBLE),
                    CAST(epoch(last_indexed) AS DOUBLE)
             FROM files WHERE path = ?",
        )?;
        let mut rows = stmt.query_map(params![path], file_from_row)?;
        rows.next().transpose().map_err(StorageError::from)
    }

    /// All file rows, ordered by path
    pub fn list_files(&self) -> StorageResult<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, size_bytes, mtime, content_crc32, language,
                    CAST(epoch(first_seen) AS DOUBLE),
                    CAST(epoch(last_indexed) AS DOUBLE)
             FROM files ORDER BY path",
        )?;
        let rows = stmt.query_map([], file_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Mark a file as freshly indexed
    pub fn touch_last_indexed(&mut self, file_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE files SET last_indexed = current_timestamp WHERE id = ?",
            params![file_id],
        )?;
        self.note_mutations(1);
        Ok(())
    }

    /// Delete a file row, cascading to its chunks and their embeddings
    ///
    /// DuckDB has no cascading foreign keys; the cascade is explicit and
    /// runs inside one transaction.
    pub fn delete_file(&mut self, path: &str) -> StorageResult<bool> {
        let Some(record) = self.get_file(path)? else {
            return Ok(false);
        };
        let tables = self.embedding_tables()?;

        let tx = self.conn.transaction()?;
        for table in &tables {
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE chunk_id IN (SELECT id FROM chunks WHERE file_id = ?)",
                    table.table_name
                ),
                params![record.id],
            )?;
        }
        tx.execute("DELETE FROM chunks WHERE file_id = ?", params![record.id])?;
        tx.execute("DELETE FROM files WHERE id = ?", params![record.id])?;
        tx.commit()?;

        self.note_mutations(1);
        self.maybe_checkpoint()?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------

    /// Atomically replace all chunks for a file
    ///
    /// Old chunks and their embeddings go away and the new set is inserted
    /// in one transaction; a re-parse never leaves a file half-replaced.
    /// Returns the new chunk ids in input order.
    pub fn replace_file_chunks(
        &mut self,
        file_id: i64,
        chunks: &[Chunk],
    ) -> StorageResult<Vec<i64>> {
        let tables = self.embedding_tables()?;

        let tx = self.conn.transaction()?;
        for table in &tables {
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE chunk_id IN (SELECT id FROM chunks WHERE file_id = ?)",
                    table.table_name
                ),
                params![file_id],
            )?;
        }
        tx.execute("DELETE FROM chunks WHERE file_id = ?", params![file_id])?;

        let mut ids = Vec::with_capacity(chunks.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (file_id, kind, symbol, code, start_line, end_line, language, qualified_name)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )?;
            for chunk in chunks {
                let id = stmt.query_row(
                    params![
                        file_id,
                        chunk.kind.as_str(),
                        chunk.symbol,
                        chunk.code,
                        chunk.start_line as i64,
                        chunk.end_line as i64,
                        chunk.language,
                        chunk.qualified_name
                    ],
                    |row| row.get::<_, i64>(0),
                )?;
                ids.push(id);
            }
        }
        tx.commit()?;

        self.note_mutations(1 + chunks.len() as u64);
        self.maybe_checkpoint()?;
        Ok(ids)
    }

    /// Total chunk count
    pub fn chunk_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Embeddings
    // ------------------------------------------------------------------

    /// Ensure the physical table for a (provider, model, dimension) triple
    /// exists and return its name
    ///
    /// Keeping models in separate tables avoids dimension-mixing bugs and
    /// lets each table carry its own HNSW index.
    pub fn ensure_embedding_table(
        &mut self,
        provider: &str,
        model: &str,
        dimension: usize,
    ) -> StorageResult<String> {
        let table = embedding_table_name(provider, model, dimension);
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 chunk_id BIGINT NOT NULL UNIQUE,
                 vector FLOAT[{dimension}] NOT NULL
             );"
        ))?;
        self.conn.execute(
            "INSERT INTO embedding_tables (table_name, provider, model, dimension)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (table_name) DO NOTHING",
            params![table, provider, model, dimension as i64],
        )?;
        if self.ann_ready {
            self.create_ann_index(&table)?;
        }
        self.note_mutations(1);
        Ok(table)
    }

    /// Registered embedding tables with their vector counts
    pub fn embedding_tables(&self) -> StorageResult<Vec<EmbeddingTableInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name, provider, model, dimension FROM embedding_tables ORDER BY table_name")?;
        let infos = stmt
            .query_map([], |row| {
                Ok(EmbeddingTableInfo {
                    table_name: row.get(0)?,
                    provider: row.get(1)?,
                    model: row.get(2)?,
                    dimension: row.get::<_, i64>(3)? as usize,
                    vector_count: 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(infos.len());
        for mut info in infos {
            let count: i64 = self.conn.query_row(
                &format!("SELECT count(*) FROM {}", info.table_name),
                [],
                |row| row.get(0),
            )?;
            info.vector_count = count as u64;
            result.push(info);
        }
        Ok(result)
    }

    /// Insert embedding vectors for chunks
    ///
    /// Vectors must match the table dimension, be finite, and be non-zero
    /// (cosine distance must be defined).
    pub fn insert_embeddings(
        &mut self,
        table: &str,
        dimension: usize,
        rows: &[(i64, &[f32])],
    ) -> StorageResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        for (chunk_id, vector) in rows {
            validate_vector(*chunk_id, vector, dimension)?;
        }

        // The FLOAT[n] column takes array literals; batched multi-row
        // inserts keep statement counts reasonable.
        let mut sql = format!("INSERT OR REPLACE INTO {table} (chunk_id, vector) VALUES ");
        for (i, (chunk_id, vector)) in rows.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&format!(
                "({chunk_id}, {}::FLOAT[{dimension}])",
                vector_literal(vector)
            ));
        }
        sql.push(';');
        self.conn.execute_batch(&sql)?;

        self.note_mutations(rows.len() as u64);
        self.maybe_checkpoint()?;
        Ok(rows.len())
    }

    /// Chunks in the store that have no vector in `table` yet
    pub fn chunks_missing_embeddings(
        &self,
        table: &str,
        limit: usize,
    ) -> StorageResult<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT c.id, c.code FROM chunks c
             LEFT JOIN {table} e ON e.chunk_id = c.id
             WHERE e.chunk_id IS NULL
             ORDER BY c.id
             LIMIT ?"
        ))?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Drop the HNSW index ahead of a bulk load
    ///
    /// Graph construction benefits from seeing the full vector set; per-row
    /// index maintenance dominates load time otherwise.
    pub fn begin_bulk_load(&mut self, table: &str) -> StorageResult<()> {
        if self.ann_ready {
            self.conn
                .execute_batch(&format!("DROP INDEX IF EXISTS idx_hnsw_{table};"))?;
        }
        Ok(())
    }

    /// Recreate the HNSW index after a bulk load and checkpoint
    pub fn finish_bulk_load(&mut self, table: &str) -> StorageResult<()> {
        if self.ann_ready {
            self.create_ann_index(table)?;
        }
        self.checkpoint()?;
        Ok(())
    }

    fn create_ann_index(&self, table: &str) -> StorageResult<()> {
        self.conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS idx_hnsw_{table} ON {table} USING HNSW (vector) WITH (metric = 'cosine');"
        ))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Durability
    // ------------------------------------------------------------------

    /// Record mutating operations against the checkpoint policy
    pub fn note_mutations(&mut self, count: u64) {
        self.ops_since_checkpoint += count;
    }

    /// Checkpoint if the ops threshold or wall-clock timeout fired
    pub fn maybe_checkpoint(&mut self) -> StorageResult<()> {
        if self.ops_since_checkpoint >= self.policy.ops_threshold
            || self.last_checkpoint.elapsed() >= self.policy.interval
        {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Flush the write-ahead log into the database file
    ///
    /// # Errors
    /// Database failures; a plain CHECKPOINT blocked by concurrent activity
    /// is retried as FORCE CHECKPOINT before giving up.
    pub fn checkpoint(&mut self) -> StorageResult<()> {
        if let Err(e) = self.conn.execute_batch("CHECKPOINT;") {
            debug!(error = %e, "CHECKPOINT blocked, forcing");
            self.conn.execute_batch("FORCE CHECKPOINT;")?;
        }
        self.ops_since_checkpoint = 0;
        self.last_checkpoint = Instant::now();
        debug!("Checkpoint complete");
        Ok(())
    }

    /// Time since the last successful checkpoint
    pub fn last_checkpoint_age(&self) -> Duration {
        self.last_checkpoint.elapsed()
    }

    /// Final shutdown path: checkpoint, then close
    ///
    /// The worker calls this after draining; signal handlers never do.
    pub fn close(mut self) -> StorageResult<()> {
        self.checkpoint()?;
        info!(db = %self.db_path.display(), "Store closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    /// Aggregate counts for `get_stats`
    pub fn stats(&self) -> StorageResult<StoreStats> {
        let files: i64 = self
            .conn
            .query_row("SELECT count(*) FROM files", [], |row| row.get(0))?;
        let chunks: i64 = self
            .conn
            .query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))?;
        Ok(StoreStats {
            files: files as u64,
            chunks: chunks as u64,
            embeddings_by_model: self.embedding_tables()?,
        })
    }
}

fn file_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        size_bytes: row.get(2)?,
        mtime: row.get(3)?,
        content_crc32: row.get::<_, i64>(4)? as u32,
        language: row.get(5)?,
        first_seen: row.get(6)?,
        last_indexed: row.get(7)?,
    })
}

/// Load the vector-search extension with experimental index persistence
///
/// Failure degrades semantic search rather than refusing to open the store;
/// regex search and indexing stay available.
fn load_ann_extension(conn: &Connection) -> bool {
    let result = conn.execute_batch(
        "INSTALL vss;
         LOAD vss;
         SET hnsw_enable_experimental_persistence = true;",
    );
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Vector extension unavailable, semantic search disabled");
            false
        }
    }
}

/// Recognize the replay failure where the WAL references the custom index
/// type before the extension is loaded
fn is_wal_replay_failure(error: &duckdb::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("hnsw")
        || message.contains("unknown index type")
        || (message.contains("wal") && message.contains("replay"))
}

/// WAL recovery protocol
///
/// Open a throwaway in-memory connection with the extension pre-loaded and
/// ATTACH the database, which replays the log with the index type known;
/// checkpoint and detach. If that fails, back the WAL up beside the
/// database and remove it: losing un-checkpointed work is safer than
/// refusing to start.
fn recover_wal(db_path: &Path) -> StorageResult<()> {
    match replay_with_extension(db_path) {
        Ok(()) => {
            info!(db = %db_path.display(), "WAL replayed via attach recovery");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Attach recovery failed, backing up WAL");
            backup_and_remove_wal(db_path)
        }
    }
}

fn replay_with_extension(db_path: &Path) -> StorageResult<()> {
    let recovery = Connection::open_in_memory()?;
    recovery.execute_batch(
        "INSTALL vss;
         LOAD vss;
         SET hnsw_enable_experimental_persistence = true;",
    )?;
    let escaped = db_path.to_string_lossy().replace('\'', "''");
    recovery.execute_batch(&format!(
        "ATTACH '{escaped}' AS recovery_db;
         CHECKPOINT recovery_db;
         DETACH recovery_db;"
    ))?;
    Ok(())
}

fn backup_and_remove_wal(db_path: &Path) -> StorageResult<()> {
    let wal_path = wal_sibling(db_path);
    if !wal_path.exists() {
        return Err(StorageError::WalRecovery(format!(
            "no WAL file found at {}",
            wal_path.display()
        )));
    }
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let backup = wal_path.with_extension(format!("wal.corrupt.{stamp}"));
    std::fs::rename(&wal_path, &backup)?;
    warn!(
        backup = %backup.display(),
        "WAL backed up and removed; un-checkpointed work was discarded"
    );
    Ok(())
}

/// The WAL sibling DuckDB keeps beside the database file
pub(crate) fn wal_sibling(db_path: &Path) -> PathBuf {
    let mut name = db_path.file_name().map_or_else(
        || std::ffi::OsString::from("db"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".wal");
    db_path.with_file_name(name)
}

/// Physical table name for a (provider, model, dimension) triple
pub(crate) fn embedding_table_name(provider: &str, model: &str, dimension: usize) -> String {
    format!(
        "embeddings_{}_{}_{dimension}",
        sanitize_identifier(provider),
        sanitize_identifier(model)
    )
}

/// Lowercase and strip anything that is not a valid identifier character
fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// DuckDB array literal for a vector
pub(crate) fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{value:?}"));
    }
    out.push(']');
    out
}

fn validate_vector(chunk_id: i64, vector: &[f32], dimension: usize) -> StorageResult<()> {
    if vector.len() != dimension {
        return Err(StorageError::InvalidVector(format!(
            "chunk {chunk_id}: length {} != dimension {dimension}",
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(StorageError::InvalidVector(format!(
            "chunk {chunk_id}: non-finite component"
        )));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(StorageError::InvalidVector(format!(
            "chunk {chunk_id}: zero vector has no cosine distance"
        )));
    }
    Ok(())
}
