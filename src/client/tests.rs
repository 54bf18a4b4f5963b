use super::*;
use crate::error::EmbeddingError;
use crate::vector_store::MemoryVectorStore;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

const TEST_DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder that counts calls and can be told to fail or stall
pub(crate) struct HashEmbedder {
    calls: AtomicUsize,
    fail_marker: Mutex<Option<String>>,
    slow_marker: Mutex<Option<(String, Duration)>>,
}

impl HashEmbedder {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_marker: Mutex::new(None),
            slow_marker: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail every text containing `marker`
    pub(crate) fn fail_on(&self, marker: Option<&str>) {
        *self.fail_marker.lock().unwrap() = marker.map(String::from);
    }

    /// Sleep `delay` before embedding any text containing `marker` ("" matches everything)
    pub(crate) fn slow_on(&self, marker: Option<(&str, Duration)>) {
        *self.slow_marker.lock().unwrap() = marker.map(|(m, d)| (m.to_string(), d));
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .slow_marker
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(marker, _)| text.contains(marker.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref()
            && text.contains(marker)
        {
            return Err(EmbeddingError::Status {
                status: 503,
                body: "model unavailable".to_string(),
            });
        }

        let mut vector = vec![0.0f32; TEST_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % TEST_DIMENSION] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn model_name(&self) -> &str {
        "hash-test"
    }
}

pub(crate) struct Harness {
    pub(crate) client: CodeIndexClient,
    pub(crate) embedder: Arc<HashEmbedder>,
    pub(crate) store: Arc<MemoryVectorStore>,
    pub(crate) dir: TempDir,
}

impl Harness {
    /// Absolute path of `name` inside the temp dir
    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub(crate) fn write(&self, name: &str, content: &str) {
        let path = self.path(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub(crate) async fn add(&self, folder: &str) -> FolderInfo {
        std::fs::create_dir_all(self.path(folder)).unwrap();
        self.client
            .add_folder(AddFolderRequest {
                folder_path: self.path(folder).to_string_lossy().into_owned(),
                description: None,
            })
            .await
            .unwrap()
            .folder
    }

    pub(crate) async fn scan(&self, folder: &str) -> Result<ScanResponse> {
        self.client
            .scan_folder(ScanRequest {
                folder_path: self.path(folder).to_string_lossy().into_owned(),
            })
            .await
    }

    pub(crate) async fn points(&self, filter: PointFilter) -> usize {
        self.store
            .count(self.client.collection(), Some(filter))
            .await
            .unwrap()
    }
}

pub(crate) fn harness() -> Harness {
    harness_with_chunk_lines(200)
}

pub(crate) fn harness_with_chunk_lines(chunk_lines: usize) -> Harness {
    harness_with(|config| config.indexing.chunk_lines = chunk_lines)
}

/// Harness over a memory backend, with further config tweaks applied
pub(crate) fn harness_with(configure: impl FnOnce(&mut Config)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.vector_store.backend = "memory".to_string();
    config.indexing.chunk_lines = 200;
    config.metadata.path = dir.path().join("state").join("metadata.json");
    configure(&mut config);

    let embedder = Arc::new(HashEmbedder::new());
    let store = Arc::new(MemoryVectorStore::new());
    let client = CodeIndexClient::with_components(
        config,
        embedder.clone(),
        store.clone(),
        Arc::new(MetadataStore::in_memory()),
    );

    Harness {
        client,
        embedder,
        store,
        dir,
    }
}

fn lines(prefix: &str, n: usize) -> String {
    (1..=n).map(|i| format!("{} line {}\n", prefix, i)).collect()
}

fn search_request(query: &str) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        limit: None,
        folder_path: None,
        retrieve: RetrieveMode::Chunk,
    }
}

// ===== Registration =====

#[tokio::test]
async fn test_add_folder_registers_pending() {
    let h = harness();
    let folder = h.add("proj").await;
    assert_eq!(folder.status, FolderStatus::Pending);
    assert_eq!(folder.file_count, 0);
    assert!(folder.last_scanned.is_none());
    assert!(Path::new(&folder.folder_path).is_absolute());
}

#[tokio::test]
async fn test_add_folder_is_idempotent() {
    let h = harness();
    let first = h.add("proj").await;

    let again = h
        .client
        .add_folder(AddFolderRequest {
            folder_path: format!("{}/", h.path("proj").display()),
            description: Some("ignored".to_string()),
        })
        .await
        .unwrap();

    assert!(again.already_registered);
    assert_eq!(again.folder.id, first.id);
    assert_eq!(h.client.status().await.unwrap().total_folders, 1);
}

#[tokio::test]
async fn test_add_folder_rejects_missing_directory() {
    let h = harness();
    let err = h
        .client
        .add_folder(AddFolderRequest {
            folder_path: h.path("nope").to_string_lossy().into_owned(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("nope"));
}

#[test]
fn test_normalize_folder_path() {
    assert_eq!(normalize_folder_path("/a/b/").unwrap(), "/a/b");
    assert_eq!(normalize_folder_path("/a/./b/../c").unwrap(), "/a/c");
    assert!(Path::new(&normalize_folder_path("rel").unwrap()).is_absolute());
}

// ===== Removal =====

#[tokio::test]
async fn test_remove_folder_cascades_to_points() {
    let h = harness();
    let proj = h.add("proj").await;
    let other = h.add("other").await;
    h.write("proj/a.go", &lines("alpha", 10));
    h.write("proj/b.go", &lines("beta", 10));
    h.write("other/c.go", &lines("gamma", 10));
    h.scan("proj").await.unwrap();
    h.scan("other").await.unwrap();
    assert_eq!(h.points(PointFilter::folder(&proj.id)).await, 2);

    let response = h
        .client
        .remove_folder(RemoveFolderRequest {
            folder_path: proj.folder_path.clone(),
        })
        .await
        .unwrap();

    assert_eq!(response.files_removed, 2);
    assert_eq!(h.points(PointFilter::folder(&proj.id)).await, 0);
    assert!(h.client.metadata.files_for_folder(&proj.id).await.is_empty());
    assert_eq!(h.points(PointFilter::folder(&other.id)).await, 1);

    let status = h.client.status().await.unwrap();
    assert_eq!(status.total_folders, 1);
    assert_eq!(status.total_files, 1);
}

#[tokio::test]
async fn test_remove_unknown_folder_fails() {
    let h = harness();
    let err = h
        .client
        .remove_folder(RemoveFolderRequest {
            folder_path: "/not/registered".to_string(),
        })
        .await
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("not found"));
    assert!(message.contains("/not/registered"));
}

#[tokio::test]
async fn test_scan_unregistered_folder_fails() {
    let h = harness();
    assert!(h.scan("proj").await.is_err());
}

// ===== Search =====

#[tokio::test]
async fn test_search_round_trip_chunk_mode() {
    let h = harness();
    h.add("proj").await;
    h.write(
        "proj/rates.py",
        "def compute_exchange_rate(currency):\n    return lookup_currency_table(currency)\n",
    );
    h.write(
        "proj/render.js",
        "function paintCanvas(ctx) {\n  ctx.fillRect(0, 0, 10, 10);\n}\n",
    );
    h.scan("proj").await.unwrap();

    let response = h
        .client
        .search(search_request("compute exchange rate currency"))
        .await
        .unwrap();

    assert!(response.total_results >= 1);
    let top = &response.results[0];
    assert_eq!(top.relative_path, "rates.py");
    assert_eq!(top.language, "python");
    assert_eq!(top.start_line, 1);
    assert!(top.content.contains("compute_exchange_rate"));
    assert!(!top.full_file_retrieved);
}

#[tokio::test]
async fn test_search_full_mode_reconstructs_file() {
    let h = harness_with_chunk_lines(5);
    h.add("proj").await;
    let content = lines("walrus", 12);
    h.write("proj/big.go", &content);
    h.scan("proj").await.unwrap();

    let mut request = search_request("walrus line 11");
    request.retrieve = RetrieveMode::Full;
    let response = h.client.search(request).await.unwrap();

    let top = &response.results[0];
    assert!(top.full_file_retrieved);
    assert_eq!(top.content, content);
    assert_eq!(response.retrieve, RetrieveMode::Full);
}

#[tokio::test]
async fn test_search_full_mode_falls_back_to_chunk() {
    let h = harness();
    let folder = h.add("proj").await;
    h.write("proj/a.go", &lines("orphan", 3));
    h.scan("proj").await.unwrap();

    // Points remain while the metadata record is gone
    let file = &h.client.metadata.files_for_folder(&folder.id).await[0];
    h.client.metadata.remove_file(&file.id).await;

    let mut request = search_request("orphan");
    request.retrieve = RetrieveMode::Full;
    let response = h.client.search(request).await.unwrap();
    assert!(!response.results[0].full_file_retrieved);
    assert_eq!(response.results[0].content, lines("orphan", 3));
}

#[tokio::test]
async fn test_search_filtered_by_folder() {
    let h = harness();
    h.add("one").await;
    h.add("two").await;
    h.write("one/a.go", "shared token\n");
    h.write("two/b.go", "shared token\n");
    h.scan("one").await.unwrap();
    h.scan("two").await.unwrap();

    let mut request = search_request("shared token");
    request.folder_path = Some(h.path("two").to_string_lossy().into_owned());
    let response = h.client.search(request).await.unwrap();

    assert_eq!(response.total_results, 1);
    assert_eq!(response.results[0].relative_path, "b.go");

    let mut unknown = search_request("shared token");
    unknown.folder_path = Some("/not/registered".to_string());
    assert!(h.client.search(unknown).await.is_err());
}

#[tokio::test]
async fn test_search_validation_and_limits() {
    let h = harness();
    h.add("proj").await;
    for i in 0..15 {
        h.write(&format!("proj/f{}.go", i), "common words here\n");
    }
    h.scan("proj").await.unwrap();

    assert!(h.client.search(search_request("  ")).await.is_err());

    let response = h.client.search(search_request("common words")).await.unwrap();
    assert_eq!(response.total_results, 10);

    let mut request = search_request("common words");
    request.limit = Some(500);
    assert_eq!(h.client.search(request).await.unwrap().total_results, 15);
}

#[tokio::test]
async fn test_search_on_empty_index() {
    let h = harness();
    let response = h.client.search(search_request("anything")).await.unwrap();
    assert_eq!(response.total_results, 0);
    assert!(response.results.is_empty());
}

// ===== Status =====

#[tokio::test]
async fn test_status_for_proj_scenario() {
    let h = harness();
    h.add("proj").await;
    h.write("proj/a.go", &lines("a", 50));
    h.write("proj/b.go", &lines("b", 10));

    let scan = h.scan("proj").await.unwrap();
    assert_eq!(scan.files_indexed, 2);
    assert_eq!(scan.chunks_indexed, 2);

    let status = h.client.status().await.unwrap();
    assert_eq!(status.total_folders, 1);
    assert_eq!(status.total_files, 2);
    assert_eq!(status.total_chunks, 2);
    assert!(!status.watcher_running);
    assert!(status.last_scan.is_some());

    let entry = &status.folders[0];
    assert_eq!(entry.file_count, 2);
    assert!(entry.enabled);
    assert_eq!(entry.status, FolderStatus::Active);
}

#[tokio::test]
async fn test_status_counts_folders_by_state() {
    let h = harness();
    h.add("ok").await;
    h.add("gone").await;
    h.add("fresh").await;
    h.write("ok/a.md", "# A\n");
    h.write("gone/a.md", "# A\n");
    h.scan("ok").await.unwrap();
    h.scan("gone").await.unwrap();

    std::fs::remove_dir_all(h.path("gone")).unwrap();
    h.scan("gone").await.unwrap_err();

    let status = h.client.status().await.unwrap();
    assert_eq!(status.total_folders, 3);
    assert_eq!(status.active_folders, 1);
    assert_eq!(status.scanning_folders, 0);
    assert_eq!(status.error_folders, 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["activeFolders"], 1);
    assert_eq!(json["errorFolders"], 1);
}

#[tokio::test]
async fn test_status_disabled_until_scanned() {
    let h = harness();
    h.add("proj").await;
    let status = h.client.status().await.unwrap();
    assert!(!status.folders[0].enabled);
    assert_eq!(status.folders[0].status, FolderStatus::Pending);
}
