//! Postgres-backed raster storage using chunked blobs.
//!
//! Payloads split into ordered chunk rows below a configured size
//! ceiling. Writes replace the chunk set first and upsert the header
//! row last, so a reader that fetches a header always finds the
//! complete chunk set it references.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use raster_core::{
    codec, CellType, PositionIndex, RasterDataset, RasterError, RasterHeader, RasterResult,
};

use crate::backend::{validate_name, RasterBackend};
use crate::chunk;
use crate::config::DatabaseConfig;

/// Chunk stream holding layer payload bytes.
const DATA_STREAM: &str = "data";
/// Chunk stream holding the encoded position index of masked rasters.
const INDEX_STREAM: &str = "index";

/// Raster store over a Postgres database.
pub struct DatabaseBackend {
    pool: PgPool,
    max_chunk_size: usize,
    scope: String,
}

impl DatabaseBackend {
    /// Create a new backend from configuration.
    pub async fn connect(config: &DatabaseConfig) -> RasterResult<Self> {
        config.validate().map_err(RasterError::DatabaseError)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| RasterError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self {
            pool,
            max_chunk_size: config.max_chunk_size,
            scope: config.database_url.clone(),
        })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> RasterResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| RasterError::DatabaseError(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }

    async fn fetch_row(&self, name: &str) -> RasterResult<HeaderRow> {
        let row = sqlx::query_as::<_, HeaderRow>(
            "SELECT n_rows, n_cols, cell_size, x_origin, y_origin, nodata, \
             layer_count, valid_cell_count, cell_type, srs, \
             chunk_count, payload_len, payload_crc32, index_chunk_count, index_len \
             FROM raster_headers WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RasterError::DatabaseError(format!("Query failed: {}", e)))?;

        row.ok_or_else(|| RasterError::NotFound(name.to_string()))
    }

    /// Fetch one chunk stream and verify it against the header's
    /// bookkeeping: declared chunk count, gap-free sequence, total
    /// byte length.
    async fn fetch_stream(
        &self,
        name: &str,
        stream: &str,
        declared_chunks: u32,
        declared_len: u64,
    ) -> RasterResult<Vec<u8>> {
        let rows: Vec<(i32, Vec<u8>)> = sqlx::query_as(
            "SELECT seq, payload FROM raster_chunks \
             WHERE name = $1 AND stream = $2 ORDER BY seq ASC",
        )
        .bind(name)
        .bind(stream)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RasterError::DatabaseError(format!("Query failed: {}", e)))?;

        if rows.len() as u32 != declared_chunks {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' {} stream has {} chunks, header declares {}",
                name,
                stream,
                rows.len(),
                declared_chunks
            )));
        }
        let mut bytes = Vec::with_capacity(declared_len as usize);
        for (expected_seq, (seq, payload)) in rows.iter().enumerate() {
            if *seq != expected_seq as i32 {
                return Err(RasterError::CorruptPayload(format!(
                    "'{}' {} stream jumps from chunk {} to {}",
                    name, stream, expected_seq, seq
                )));
            }
            bytes.extend_from_slice(payload);
        }
        if bytes.len() as u64 != declared_len {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' {} stream carries {} bytes, header declares {}",
                name,
                stream,
                bytes.len(),
                declared_len
            )));
        }
        Ok(bytes)
    }

    async fn read_index_chunks(
        &self,
        name: &str,
        header: &RasterHeader,
        refs: &ChunkRefs,
    ) -> RasterResult<Arc<PositionIndex>> {
        if header.is_dense() {
            return Ok(Arc::new(PositionIndex::dense(header.rows, header.cols)));
        }
        let bytes = self
            .fetch_stream(name, INDEX_STREAM, refs.index_chunk_count, refs.index_len)
            .await?;
        let index = codec::decode_index(header.rows, header.cols, &bytes)?;
        if index.valid_cell_count() != header.valid_cell_count {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' index stream covers {} cells, header declares {}",
                name,
                index.valid_cell_count(),
                header.valid_cell_count
            )));
        }
        Ok(Arc::new(index))
    }

    async fn insert_stream(&self, name: &str, stream: &str, chunks: &[Bytes]) -> RasterResult<()> {
        for (seq, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO raster_chunks (name, stream, seq, payload) VALUES ($1, $2, $3, $4)",
            )
            .bind(name)
            .bind(stream)
            .bind(seq as i32)
            .bind(chunk.as_ref())
            .execute(&self.pool)
            .await
            .map_err(|e| RasterError::DatabaseError(format!("Insert failed: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl RasterBackend for DatabaseBackend {
    fn lock_scope(&self) -> String {
        format!("db:{}", self.scope)
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn exists(&self, name: &str) -> RasterResult<bool> {
        validate_name(name)?;
        let present = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM raster_headers WHERE name = $1)",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RasterError::DatabaseError(format!("Query failed: {}", e)))?;
        Ok(present)
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn read_header(&self, name: &str) -> RasterResult<RasterHeader> {
        validate_name(name)?;
        let (header, _) = self.fetch_row(name).await?.into_parts()?;
        Ok(header)
    }

    #[instrument(skip(self, header), fields(name = %name))]
    async fn read_index(
        &self,
        name: &str,
        header: &RasterHeader,
    ) -> RasterResult<Arc<PositionIndex>> {
        validate_name(name)?;
        if header.is_dense() {
            return Ok(Arc::new(PositionIndex::dense(header.rows, header.cols)));
        }
        let (_, refs) = self.fetch_row(name).await?.into_parts()?;
        self.read_index_chunks(name, header, &refs).await
    }

    #[instrument(skip(self, index), fields(name = %name))]
    async fn read_dataset(
        &self,
        name: &str,
        index: Option<Arc<PositionIndex>>,
    ) -> RasterResult<RasterDataset> {
        validate_name(name)?;
        let (header, refs) = self.fetch_row(name).await?.into_parts()?;
        let index = match index {
            Some(index) => index,
            None => self.read_index_chunks(name, &header, &refs).await?,
        };
        let payload = self
            .fetch_stream(name, DATA_STREAM, refs.chunk_count, refs.payload_len)
            .await?;
        if codec::checksum(&payload) != refs.payload_crc32 {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' payload fails its checksum",
                name
            )));
        }
        debug!(payload_len = payload.len(), "Read raster payload");
        codec::decode_payload(header, index, &payload)
    }

    #[instrument(skip(self, dataset), fields(name = %name))]
    async fn write_dataset(&self, name: &str, dataset: &RasterDataset) -> RasterResult<()> {
        validate_name(name)?;
        let header = dataset.header();
        let payload = codec::encode_payload(dataset);
        let payload_crc = codec::checksum(&payload);
        let data_chunks = chunk::split_payload(&payload, self.max_chunk_size);
        let (index_bytes, index_chunks) = if header.is_dense() {
            (Bytes::new(), Vec::new())
        } else {
            let bytes = codec::encode_index(dataset.index());
            let chunks = chunk::split_payload(&bytes, self.max_chunk_size);
            (bytes, chunks)
        };

        debug!(
            chunks = data_chunks.len(),
            payload_len = payload.len(),
            "Writing raster chunks"
        );

        // Replace the chunk set before touching the header row. The
        // header upsert is the commit point: a reader that fetches the
        // new header finds its full chunk set already present.
        sqlx::query("DELETE FROM raster_chunks WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| RasterError::DatabaseError(format!("Delete failed: {}", e)))?;
        self.insert_stream(name, INDEX_STREAM, &index_chunks).await?;
        self.insert_stream(name, DATA_STREAM, &data_chunks).await?;

        sqlx::query(
            r#"
            INSERT INTO raster_headers (
                id, name, n_rows, n_cols, cell_size,
                x_origin, y_origin, nodata, layer_count, valid_cell_count,
                cell_type, srs, chunk_count, payload_len, payload_crc32,
                index_chunk_count, index_len, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15,
                $16, $17, $18
            )
            ON CONFLICT (name)
            DO UPDATE SET
                n_rows = EXCLUDED.n_rows,
                n_cols = EXCLUDED.n_cols,
                cell_size = EXCLUDED.cell_size,
                x_origin = EXCLUDED.x_origin,
                y_origin = EXCLUDED.y_origin,
                nodata = EXCLUDED.nodata,
                layer_count = EXCLUDED.layer_count,
                valid_cell_count = EXCLUDED.valid_cell_count,
                cell_type = EXCLUDED.cell_type,
                srs = EXCLUDED.srs,
                chunk_count = EXCLUDED.chunk_count,
                payload_len = EXCLUDED.payload_len,
                payload_crc32 = EXCLUDED.payload_crc32,
                index_chunk_count = EXCLUDED.index_chunk_count,
                index_len = EXCLUDED.index_len,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(header.rows as i32)
        .bind(header.cols as i32)
        .bind(header.cell_size)
        .bind(header.x_origin)
        .bind(header.y_origin)
        .bind(header.nodata)
        .bind(header.layer_count as i32)
        .bind(header.valid_cell_count as i64)
        .bind(header.cell_type.as_str())
        .bind(header.srs.as_deref())
        .bind(data_chunks.len() as i32)
        .bind(payload.len() as i64)
        .bind(payload_crc as i64)
        .bind(index_chunks.len() as i32)
        .bind(index_bytes.len() as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RasterError::DatabaseError(format!("Insert failed: {}", e)))?;

        Ok(())
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn remove(&self, name: &str) -> RasterResult<()> {
        validate_name(name)?;
        // Deleting the header first makes the raster absent to readers;
        // chunk rows without a header are unreachable.
        sqlx::query("DELETE FROM raster_headers WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| RasterError::DatabaseError(format!("Delete failed: {}", e)))?;
        sqlx::query("DELETE FROM raster_chunks WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| RasterError::DatabaseError(format!("Delete failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(old = %old_name, new = %new_name))]
    async fn rename(&self, old_name: &str, new_name: &str) -> RasterResult<()> {
        validate_name(old_name)?;
        validate_name(new_name)?;
        if !self.exists(old_name).await? {
            return Err(RasterError::NotFound(old_name.to_string()));
        }
        if old_name == new_name {
            return Ok(());
        }

        // Clear whatever the new name holds, move the chunks, then
        // commit by moving the header row.
        self.remove(new_name).await?;
        sqlx::query("UPDATE raster_chunks SET name = $2 WHERE name = $1")
            .bind(old_name)
            .bind(new_name)
            .execute(&self.pool)
            .await
            .map_err(|e| RasterError::DatabaseError(format!("Update failed: {}", e)))?;
        sqlx::query("UPDATE raster_headers SET name = $2, updated_at = NOW() WHERE name = $1")
            .bind(old_name)
            .bind(new_name)
            .execute(&self.pool)
            .await
            .map_err(|e| RasterError::DatabaseError(format!("Update failed: {}", e)))?;
        Ok(())
    }
}

/// Internal row type for header queries.
#[derive(FromRow)]
struct HeaderRow {
    n_rows: i32,
    n_cols: i32,
    cell_size: f64,
    x_origin: f64,
    y_origin: f64,
    nodata: f64,
    layer_count: i32,
    valid_cell_count: i64,
    cell_type: String,
    srs: Option<String>,
    chunk_count: i32,
    payload_len: i64,
    payload_crc32: i64,
    index_chunk_count: i32,
    index_len: i64,
}

/// Chunk bookkeeping carried by a header row.
struct ChunkRefs {
    chunk_count: u32,
    payload_len: u64,
    payload_crc32: u32,
    index_chunk_count: u32,
    index_len: u64,
}

impl HeaderRow {
    fn into_parts(self) -> RasterResult<(RasterHeader, ChunkRefs)> {
        let cell_type = CellType::parse(&self.cell_type).ok_or_else(|| {
            RasterError::MalformedHeader(format!("unknown cell type '{}'", self.cell_type))
        })?;
        let header = RasterHeader {
            rows: self.n_rows as u32,
            cols: self.n_cols as u32,
            cell_size: self.cell_size,
            x_origin: self.x_origin,
            y_origin: self.y_origin,
            nodata: self.nodata,
            layer_count: self.layer_count as u32,
            valid_cell_count: self.valid_cell_count as u64,
            cell_type,
            srs: self.srs,
        };
        header.validate()?;
        Ok((
            header,
            ChunkRefs {
                chunk_count: self.chunk_count as u32,
                payload_len: self.payload_len as u64,
                payload_crc32: self.payload_crc32 as u32,
                index_chunk_count: self.index_chunk_count as u32,
                index_len: self.index_len as u64,
            },
        ))
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS raster_headers (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    n_rows INTEGER NOT NULL,
    n_cols INTEGER NOT NULL,
    cell_size DOUBLE PRECISION NOT NULL,
    x_origin DOUBLE PRECISION NOT NULL,
    y_origin DOUBLE PRECISION NOT NULL,
    nodata DOUBLE PRECISION NOT NULL,
    layer_count INTEGER NOT NULL,
    valid_cell_count BIGINT NOT NULL,
    cell_type VARCHAR(16) NOT NULL,
    srs TEXT,
    chunk_count INTEGER NOT NULL,
    payload_len BIGINT NOT NULL,
    payload_crc32 BIGINT NOT NULL,
    index_chunk_count INTEGER NOT NULL,
    index_len BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS raster_chunks (
    name TEXT NOT NULL,
    stream VARCHAR(8) NOT NULL,
    seq INTEGER NOT NULL,
    payload BYTEA NOT NULL,

    PRIMARY KEY (name, stream, seq)
);
"#;
