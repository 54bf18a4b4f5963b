//! Folder scan pipeline and the single-file operations used by the watcher
//!
//! A scan walks the folder, diffs content hashes against the metadata store,
//! and for every new or changed file deletes its old points, embeds its chunks,
//! writes the new points and only then replaces the metadata record. Vector
//! points are always deleted before the matching metadata.

use super::CodeIndexClient;
use super::folder_lock::{ScanLockResult, SharedScanResult};
use crate::error::{self, EmbeddingError, IndexingError, MetadataError};
use crate::indexer::{ChunkSpan, FileWalker, ScannedFile};
use crate::metadata::{self, ChunkRecord, FileRecord, FolderRecord, FolderStatus};
use crate::types::ScanResponse;
use crate::vector_store::{ChunkPayload, Point, PointFilter};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use rmcp::{Peer, RoleServer, model::ProgressNotificationParam, model::ProgressToken};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;

/// Metadata is flushed to disk after this many processed files
const FLUSH_EVERY: usize = 25;

/// MCP progress sink for a scan
pub(crate) struct ScanProgress {
    peer: Peer<RoleServer>,
    token: ProgressToken,
}

impl ScanProgress {
    pub(crate) fn new(peer: Peer<RoleServer>, token: ProgressToken) -> Self {
        Self { peer, token }
    }

    async fn report(&self, progress: f64, message: String) {
        if let Err(e) = self
            .peer
            .notify_progress(ProgressNotificationParam {
                progress_token: self.token.clone(),
                progress,
                total: Some(100.0),
                message: Some(message),
            })
            .await
        {
            tracing::debug!("Failed to send scan progress: {}", e);
        }
    }
}

async fn report(progress: Option<&ScanProgress>, value: f64, message: impl FnOnce() -> String) {
    if let Some(progress) = progress {
        progress.report(value, message()).await;
    }
}

/// Absolute stored path of a file: host folder path joined with the relative path
pub(crate) fn stored_path(folder_path: &str, relative_path: &str) -> String {
    Path::new(folder_path)
        .join(relative_path)
        .to_string_lossy()
        .into_owned()
}

/// Text sent to the embedding provider for one chunk. The path prefix keeps
/// whitespace-only chunks embeddable and gives the vector file context.
fn embedding_text(relative_path: &str, content: &str) -> String {
    format!("{}\n{}", relative_path, content)
}

/// Scan a folder, joining an in-flight scan of the same folder when there is one
pub(crate) async fn scan_folder(
    client: &CodeIndexClient,
    folder_id: &str,
    progress: Option<ScanProgress>,
) -> Result<ScanResponse> {
    loop {
        match client.locks.try_acquire_scan(folder_id).await {
            ScanLockResult::WaitForResult(mut rx) => match rx.recv().await {
                Ok(result) => return result.map_err(anyhow::Error::msg),
                // Finished between our subscribe and its send; try again
                Err(RecvError::Closed) | Err(RecvError::Lagged(_)) => continue,
            },
            ScanLockResult::Acquired(guard) => {
                let result = run_scan(client, folder_id, progress.as_ref()).await;
                let shared: SharedScanResult = match &result {
                    Ok(response) => Ok(response.clone()),
                    Err(e) => Err(format!("{:#}", e)),
                };
                guard.broadcast_result(&shared);
                guard.release().await;
                return result;
            }
        }
    }
}

async fn run_scan(
    client: &CodeIndexClient,
    folder_id: &str,
    progress: Option<&ScanProgress>,
) -> Result<ScanResponse> {
    let _gate = client.locks.lock_folder(folder_id).await;

    // Re-read under the gate: the folder may have been removed while we waited
    let folder = client
        .metadata
        .folder(folder_id)
        .await
        .ok_or_else(|| MetadataError::FolderNotFound(folder_id.to_string()))?;

    match scan_locked(client, &folder, progress).await {
        Ok(response) => Ok(response),
        Err(e) => {
            let cancelled = e
                .downcast_ref::<IndexingError>()
                .is_some_and(|e| matches!(e, IndexingError::Cancelled(_)));
            if cancelled {
                tracing::info!("Scan of {} cancelled", folder.path);
            } else {
                tracing::error!("Scan of {} failed: {:#}", folder.path, e);
                if let Err(status_err) = client
                    .metadata
                    .set_folder_status(&folder.id, FolderStatus::Error, Some(format!("{:#}", e)))
                    .await
                {
                    tracing::warn!("Failed to record scan error: {}", status_err);
                }
            }
            Err(e)
        }
    }
}

/// Body of one scan; the caller holds the folder gate
async fn scan_locked(
    client: &CodeIndexClient,
    folder: &FolderRecord,
    progress: Option<&ScanProgress>,
) -> Result<ScanResponse> {
    let start = Instant::now();
    let cancel = client.locks.cancel_token(&folder.id).await;
    let root = client.path_mapper.to_container_path(Path::new(&folder.path));

    if !root.exists() {
        return Err(IndexingError::FolderMissing(folder.path.clone()).into());
    }
    if !root.is_dir() {
        return Err(IndexingError::NotADirectory(folder.path.clone()).into());
    }

    client
        .metadata
        .set_folder_status(&folder.id, FolderStatus::Scanning, None)
        .await?;
    client.ensure_collection().await?;
    sweep_orphans(client, folder).await?;

    tracing::info!("Scanning {} ({})", folder.path, root.display());
    report(progress, 0.0, || format!("Walking {}...", folder.path)).await;

    let walker = FileWalker::new(&root, client.config.indexing.max_file_size)
        .with_ignore_dirs(client.config.indexing.ignore_dirs.clone())
        .with_cancellation(cancel.clone());
    let scanned = tokio::task::spawn_blocking(move || walker.walk())
        .await
        .context("Failed to spawn file walker task")?
        .with_context(|| format!("Failed to walk {}", folder.path))?;

    let mut response = ScanResponse {
        folder_path: folder.path.clone(),
        total_files: scanned.len(),
        ..Default::default()
    };

    let mut existing: HashMap<String, FileRecord> = client
        .metadata
        .files_for_folder(&folder.id)
        .await
        .into_iter()
        .map(|f| (f.path.clone(), f))
        .collect();

    let mut seen = HashSet::with_capacity(scanned.len());
    let mut pending = Vec::new();
    for file in scanned {
        let path = stored_path(&folder.path, &file.relative_path);
        seen.insert(path.clone());
        match existing.get(&path) {
            Some(record) if record.sha256 == file.sha256 => response.files_skipped += 1,
            Some(record) => pending.push((file, Some(record.indexed_at))),
            None => pending.push((file, None)),
        }
    }

    report(progress, 20.0, || {
        format!(
            "{} files found, {} to index",
            response.total_files,
            pending.len()
        )
    })
    .await;

    // Chunk changed files in parallel
    let chunker = client.chunker.clone();
    let work: Vec<(ScannedFile, Option<DateTime<Utc>>, Vec<ChunkSpan>)> =
        tokio::task::spawn_blocking(move || {
            pending
                .into_par_iter()
                .map(|(file, indexed_at)| {
                    let spans = chunker.chunk(&file.content, &file.language);
                    (file, indexed_at, spans)
                })
                .collect()
        })
        .await
        .context("Failed to spawn chunking task")?;

    let total_work = work.len();
    for (i, (file, previously_indexed, spans)) in work.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(IndexingError::Cancelled(folder.path.clone()).into());
        }

        let relative = file.relative_path.clone();
        match index_file(client, folder, file, spans, previously_indexed).await {
            Ok(chunks) => {
                response.chunks_indexed += chunks;
                if previously_indexed.is_some() {
                    response.files_updated += 1;
                } else {
                    response.files_indexed += 1;
                }
            }
            Err(e) => {
                if error::is_retryable(&e) {
                    tracing::warn!(
                        "Transient failure indexing {} in {}, will retry on next scan: {:#}",
                        relative,
                        folder.path,
                        e
                    );
                } else {
                    tracing::warn!("Failed to index {} in {}: {:#}", relative, folder.path, e);
                }
                response.errors.push(format!("{}: {:#}", relative, e));
            }
        }

        if (i + 1) % FLUSH_EVERY == 0 {
            client.metadata.flush().await?;
        }

        report(
            progress,
            20.0 + ((i + 1) as f64 / total_work as f64) * 70.0,
            || format!("Indexed {}/{} files", i + 1, total_work),
        )
        .await;
    }

    // Files that vanished from disk
    existing.retain(|path, _| !seen.contains(path));
    for record in existing.into_values() {
        if cancel.is_cancelled() {
            return Err(IndexingError::Cancelled(folder.path.clone()).into());
        }
        match remove_record(client, &record).await {
            Ok(()) => response.files_removed += 1,
            Err(e) => {
                tracing::warn!("Failed to remove {}: {:#}", record.path, e);
                response
                    .errors
                    .push(format!("{}: {:#}", record.relative_path, e));
            }
        }
    }

    let file_count = client.metadata.files_for_folder(&folder.id).await.len();
    client.metadata.finish_scan(&folder.id, file_count).await?;
    client.metadata.flush().await?;
    client.watch_folder(&folder.path);

    response.duration_ms = start.elapsed().as_millis() as u64;
    report(progress, 100.0, || "Scan complete".to_string()).await;

    tracing::info!(
        "Scanned {}: {} indexed, {} updated, {} skipped, {} removed, {} errors in {} ms",
        folder.path,
        response.files_indexed,
        response.files_updated,
        response.files_skipped,
        response.files_removed,
        response.errors.len(),
        response.duration_ms
    );

    Ok(response)
}

/// Replace the indexed content of one file, returning the number of chunks written.
///
/// On failure after the old points were deleted, the old metadata record is
/// dropped too so both stores agree; the next scan sees no record and retries.
async fn index_file(
    client: &CodeIndexClient,
    folder: &FolderRecord,
    file: ScannedFile,
    spans: Vec<ChunkSpan>,
    previously_indexed: Option<DateTime<Utc>>,
) -> Result<usize> {
    let file_id = metadata::file_id(&folder.id, &file.relative_path);
    let collection = client.collection();

    // Also clears orphans a crashed run may have left for new files
    client
        .vector_store
        .delete_by_filter(collection, PointFilter::file(&file_id))
        .await
        .context("Failed to delete previous points")?;

    match write_file(client, folder, &file_id, file, spans, previously_indexed).await {
        Ok(count) => Ok(count),
        Err(e) => {
            if client.metadata.remove_file(&file_id).await {
                tracing::debug!("Dropped stale record for file {}", file_id);
            }
            Err(e)
        }
    }
}

async fn write_file(
    client: &CodeIndexClient,
    folder: &FolderRecord,
    file_id: &str,
    file: ScannedFile,
    spans: Vec<ChunkSpan>,
    previously_indexed: Option<DateTime<Utc>>,
) -> Result<usize> {
    let vectors = embed_chunks(client, &file.relative_path, &spans).await?;
    let path = stored_path(&folder.path, &file.relative_path);
    let now = Utc::now();

    let (points, chunks): (Vec<Point>, Vec<ChunkRecord>) = spans
        .into_iter()
        .zip(vectors)
        .map(|(span, vector)| {
            let vector_id = metadata::vector_id(file_id, span.chunk_num);
            let point = Point {
                id: vector_id.clone(),
                vector,
                payload: ChunkPayload {
                    file_id: file_id.to_string(),
                    folder_id: folder.id.clone(),
                    folder_path: folder.path.clone(),
                    file_path: path.clone(),
                    relative_path: file.relative_path.clone(),
                    language: file.language.clone(),
                    chunk_num: span.chunk_num,
                    start_line: span.start_line,
                    end_line: span.end_line,
                    content: span.content.clone(),
                },
            };
            let chunk = ChunkRecord {
                file_id: file_id.to_string(),
                chunk_num: span.chunk_num,
                start_line: span.start_line,
                end_line: span.end_line,
                content: span.content,
                vector_id,
                indexed_at: now,
            };
            (point, chunk)
        })
        .unzip();

    let chunk_count = chunks.len();
    if !points.is_empty() {
        client
            .vector_store
            .upsert_points(client.collection(), points)
            .await
            .context("Failed to upsert points")?;
    }

    let record = FileRecord {
        id: file_id.to_string(),
        folder_id: folder.id.clone(),
        path,
        relative_path: file.relative_path,
        language: file.language,
        sha256: file.sha256,
        size: file.size,
        line_count: file.line_count,
        chunk_count,
        modified_at: file.modified_at,
        indexed_at: previously_indexed.unwrap_or(now),
        updated_at: now,
    };
    client.metadata.replace_file(record, chunks).await?;

    Ok(chunk_count)
}

/// Embed all chunks of a file with bounded concurrency; any failure fails the file
async fn embed_chunks(
    client: &CodeIndexClient,
    relative_path: &str,
    spans: &[ChunkSpan],
) -> Result<Vec<Vec<f32>>> {
    let timeout = Duration::from_secs(client.config.embedding.timeout_secs);
    let concurrency = client.config.embedding.max_concurrency.max(1);

    // Owned futures: nothing borrowed from the client crosses an await in the stream
    let provider = client.embedding.clone();
    let calls: Vec<_> = spans
        .iter()
        .map(|span| {
            let provider = provider.clone();
            let text = embedding_text(relative_path, &span.content);
            let chunk_num = span.chunk_num;
            async move {
                let result = match tokio::time::timeout(timeout, provider.embed(&text)).await {
                    Ok(result) => result,
                    Err(_) => Err(EmbeddingError::Timeout(timeout.as_secs())),
                };
                (chunk_num, result)
            }
        })
        .collect();

    let mut results: Vec<(usize, Result<Vec<f32>, EmbeddingError>)> = stream::iter(calls)
        .buffer_unordered(concurrency)
        .collect()
        .await;

    results.sort_by_key(|(chunk_num, _)| *chunk_num);
    results
        .into_iter()
        .map(|(chunk_num, result)| {
            result.with_context(|| format!("Failed to embed chunk {}", chunk_num))
        })
        .collect()
}

/// Drop the folder's points whose file has no metadata record. Records are flushed in
/// batches, so a crash can leave points for files the persisted state never saw; once
/// such a file is deleted no per-file path would reach them.
async fn sweep_orphans(client: &CodeIndexClient, folder: &FolderRecord) -> Result<()> {
    let known: Vec<String> = client
        .metadata
        .files_for_folder(&folder.id)
        .await
        .into_iter()
        .map(|f| f.id)
        .collect();

    client
        .vector_store
        .delete_by_filter(
            client.collection(),
            PointFilter::folder(&folder.id).excluding("fileId", known),
        )
        .await
        .with_context(|| format!("Failed to clear orphaned points for {}", folder.path))?;
    Ok(())
}

/// Delete a file's points, then its record
async fn remove_record(client: &CodeIndexClient, record: &FileRecord) -> Result<()> {
    client
        .vector_store
        .delete_by_filter(client.collection(), PointFilter::file(&record.id))
        .await
        .context("Failed to delete points")?;
    client.metadata.remove_file(&record.id).await;
    Ok(())
}

/// Re-index one file after a filesystem change. Returns true when the index changed.
pub(crate) async fn reindex_file(
    client: &CodeIndexClient,
    folder_id: &str,
    host_path: &Path,
) -> Result<bool> {
    let _gate = client.locks.lock_folder(folder_id).await;
    let Some(folder) = client.metadata.folder(folder_id).await else {
        return Ok(false);
    };

    let container_path = client.path_mapper.to_container_path(host_path);
    if !container_path.exists() {
        return remove_under(client, &folder, host_path).await;
    }
    if container_path.is_dir() {
        return Ok(false);
    }

    let root = client.path_mapper.to_container_path(Path::new(&folder.path));
    let walker = FileWalker::new(&root, client.config.indexing.max_file_size)
        .with_ignore_dirs(client.config.indexing.ignore_dirs.clone());
    let scanned = {
        let path = container_path.clone();
        tokio::task::spawn_blocking(move || walker.scan_file(&path))
            .await
            .context("Failed to spawn file scan task")??
    };

    let stored = host_path.to_string_lossy().into_owned();
    let existing = client.metadata.file_by_path(&folder.id, &stored).await;

    let changed = match (scanned, existing) {
        (None, None) => false,
        // No longer eligible (grew too large, turned binary)
        (None, Some(record)) => {
            remove_record(client, &record).await?;
            true
        }
        (Some(file), Some(record)) if record.sha256 == file.sha256 => false,
        (Some(file), existing) => {
            client.ensure_collection().await?;
            let spans = client.chunker.chunk(&file.content, &file.language);
            let count = index_file(
                client,
                &folder,
                file,
                spans,
                existing.map(|r| r.indexed_at),
            )
            .await?;
            tracing::debug!("Re-indexed {} ({} chunks)", stored, count);
            true
        }
    };

    if changed {
        client.metadata.refresh_file_count(&folder.id).await?;
        client.metadata.flush().await?;
    }
    Ok(changed)
}

/// Remove every file at or below `host_path` from the index
pub(crate) async fn remove_file(
    client: &CodeIndexClient,
    folder_id: &str,
    host_path: &Path,
) -> Result<bool> {
    let _gate = client.locks.lock_folder(folder_id).await;
    let Some(folder) = client.metadata.folder(folder_id).await else {
        return Ok(false);
    };
    remove_under(client, &folder, host_path).await
}

/// Caller holds the folder gate
async fn remove_under(
    client: &CodeIndexClient,
    folder: &FolderRecord,
    host_path: &Path,
) -> Result<bool> {
    let doomed: Vec<FileRecord> = client
        .metadata
        .files_for_folder(&folder.id)
        .await
        .into_iter()
        .filter(|f| Path::new(&f.path).starts_with(host_path))
        .collect();

    if doomed.is_empty() {
        return Ok(false);
    }

    for record in &doomed {
        remove_record(client, record).await?;
        tracing::debug!("Removed {} from index", record.path);
    }
    client.metadata.refresh_file_count(&folder.id).await?;
    client.metadata.flush().await?;
    Ok(true)
}
