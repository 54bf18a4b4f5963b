/// Benchmarks for chunking and scanning
use async_trait::async_trait;
use code_index::CodeIndexClient;
use code_index::config::Config;
use code_index::embedding::EmbeddingProvider;
use code_index::error::EmbeddingError;
use code_index::indexer::{ChunkStrategy, CodeChunker, FileWalker};
use code_index::metadata::MetadataStore;
use code_index::types::{AddFolderRequest, ScanRequest};
use code_index::vector_store::MemoryVectorStore;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Constant-time embedder so the scan benchmark measures the pipeline, not a model
struct FlatEmbedder;

#[async_trait]
impl EmbeddingProvider for FlatEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; 32];
        vector[text.len() % 32] = 1.0;
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        32
    }

    fn model_name(&self) -> &str {
        "flat"
    }
}

/// Writes `count` Python modules of a few functions each under `pkg/`
fn create_test_files(dir: &TempDir, count: usize) -> anyhow::Result<()> {
    let pkg_dir = dir.path().join("pkg");
    std::fs::create_dir_all(&pkg_dir)?;

    for i in 0..count {
        let mut content = format!("\"\"\"Handlers for shard {i}.\"\"\"\n\nimport json\n\n");
        for j in 0..(3 + i % 4) {
            content.push_str(&format!(
                "\ndef handle_{i}_{j}(payload):\n    data = json.loads(payload)\n    total = sum(data.get(\"values\", []))\n    return {{\"shard\": {i}, \"total\": total * {j}}}\n"
            ));
        }
        std::fs::write(pkg_dir.join(format!("shard_{}.py", i)), content)?;
    }

    Ok(())
}

fn benchmark_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    for file_count in [10, 50, 100].iter() {
        let codebase_dir = TempDir::new().unwrap();
        create_test_files(&codebase_dir, *file_count).unwrap();
        let files = FileWalker::new(codebase_dir.path(), 1_048_576)
            .walk()
            .unwrap();

        for (name, strategy) in [
            ("fixed", ChunkStrategy::FixedLines(10)),
            ("semantic", ChunkStrategy::Semantic { max_lines: 10 }),
        ] {
            let chunker = CodeChunker::new(strategy);
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}_files", file_count)),
                &files,
                |b, files| {
                    b.iter(|| {
                        let chunks: Vec<_> = files
                            .par_iter()
                            .flat_map(|file| chunker.chunk(black_box(&file.content), &file.language))
                            .collect();
                        chunks
                    });
                },
            );
        }
    }

    group.finish();
}

fn benchmark_scan(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("scan");

    for file_count in [10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_files", file_count)),
            file_count,
            |b, &count| {
                b.iter(|| {
                    rt.block_on(async {
                        let codebase_dir = TempDir::new().unwrap();
                        create_test_files(&codebase_dir, count).unwrap();
                        let folder_path = codebase_dir.path().to_string_lossy().into_owned();

                        let mut config = Config::default();
                        config.vector_store.backend = "memory".to_string();
                        let client = CodeIndexClient::with_components(
                            config,
                            Arc::new(FlatEmbedder),
                            Arc::new(MemoryVectorStore::new()),
                            Arc::new(MetadataStore::in_memory()),
                        );

                        client
                            .add_folder(AddFolderRequest {
                                folder_path: folder_path.clone(),
                                description: None,
                            })
                            .await
                            .unwrap();
                        client
                            .scan_folder(black_box(ScanRequest { folder_path }))
                            .await
                            .unwrap()
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_chunking, benchmark_scan);
criterion_main!(benches);
