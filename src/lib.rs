//! # Code Index - Semantic Search over Local Folders
//!
//! Registers folders, splits their source files into line-bounded chunks, embeds each chunk and
//! stores the vectors so that natural-language queries find the relevant code. A filesystem
//! watcher keeps scanned folders current, and an MCP stdio server exposes the whole thing as five
//! `code_index_*` tools.
//!
//! ## Architecture
//!
//! ```text
//! MCP client (stdio)
//!        |
//! CodeIndexMcpServer   add_folder / remove_folder / scan / search / status
//!        |
//! CodeIndexClient -----+------------------+-----------------+
//!        |             |                  |                 |
//!   indexer         embedding         vector_store       metadata
//!   (walk, chunk)   (Ollama/OpenAI)   (Qdrant/memory)    (folders, files, chunks)
//!        ^
//!     watcher (notify, debounced)
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use code_index::{CodeIndexClient, Config};
//! use code_index::types::{AddFolderRequest, ScanRequest, SearchRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CodeIndexClient::new(Config::load(None)?).await?;
//!
//!     client
//!         .add_folder(AddFolderRequest {
//!             folder_path: "/work/app".into(),
//!             description: None,
//!         })
//!         .await?;
//!     client
//!         .scan_folder(ScanRequest { folder_path: "/work/app".into() })
//!         .await?;
//!
//!     let response = client
//!         .search(SearchRequest {
//!             query: "where are retries configured".into(),
//!             limit: Some(5),
//!             folder_path: None,
//!             retrieve: Default::default(),
//!         })
//!         .await?;
//!     for result in response.results {
//!         println!("{}:{} ({:.3})", result.file_path, result.start_line, result.score);
//!     }
//!     Ok(())
//! }
//! ```

/// Client API tying the pipeline together
pub mod client;

/// Configuration with TOML file and environment variable support
pub mod config;

/// Embedding providers (Ollama, OpenAI)
pub mod embedding;

/// Error types
pub mod error;

/// File walking, language detection and chunking
pub mod indexer;

/// MCP server with the `code_index_*` tools and prompts
pub mod mcp_server;

/// Folder, file and chunk records
pub mod metadata;

/// Host/container path translation
pub mod path_mapper;

/// Platform directories
pub mod paths;

/// MCP request/response types with JSON schema definitions
pub mod types;

/// Vector store abstraction (Qdrant REST and in-memory)
pub mod vector_store;

/// Debounced filesystem watcher
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::CodeIndexClient;
pub use config::Config;
pub use error::CodeIndexError;
pub use mcp_server::CodeIndexMcpServer;
