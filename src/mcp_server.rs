use crate::client::{CodeIndexClient, ScanProgress};
use crate::config::Config;
use crate::error;
use crate::types::*;

use anyhow::{Context, Result};
use rmcp::{
    ErrorData as McpError, Peer, RoleServer, ServerHandler, ServiceExt,
    handler::server::{router::prompt::PromptRouter, tool::ToolRouter, wrapper::Parameters},
    model::*,
    prompt, prompt_handler, prompt_router,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct CodeIndexMcpServer {
    client: Arc<CodeIndexClient>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl CodeIndexMcpServer {
    /// Create a server and its client from configuration
    pub async fn new(config: Config) -> Result<Self> {
        let client = CodeIndexClient::new(config).await?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create a server over an existing client
    pub fn with_client(client: Arc<CodeIndexClient>) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    pub fn client(&self) -> &CodeIndexClient {
        &self.client
    }
}

/// Render a failed operation for the tool response, logging system failures
fn tool_error(tool: &str, err: anyhow::Error) -> String {
    if error::is_user_error(&err) {
        tracing::debug!("{} rejected: {:#}", tool, err);
    } else {
        tracing::error!("{} failed: {:#}", tool, err);
    }
    format!("{:#}", err)
}

fn to_json<T: serde::Serialize>(response: &T) -> Result<String, String> {
    serde_json::to_string_pretty(response).map_err(|e| format!("Serialization failed: {}", e))
}

#[tool_router(router = tool_router)]
impl CodeIndexMcpServer {
    #[tool(
        description = "Register a folder for code indexing. Relative paths are resolved against the server's working directory. Registering an already registered folder returns the existing entry. Run code_index_scan afterwards to index its files."
    )]
    async fn code_index_add_folder(
        &self,
        Parameters(req): Parameters<AddFolderRequest>,
    ) -> Result<String, String> {
        req.validate()?;

        let response = self
            .client
            .add_folder(req)
            .await
            .map_err(|e| tool_error("code_index_add_folder", e))?;

        to_json(&response)
    }

    #[tool(
        description = "Unregister a folder and delete all of its files, chunks and embeddings from the index"
    )]
    async fn code_index_remove_folder(
        &self,
        Parameters(req): Parameters<RemoveFolderRequest>,
    ) -> Result<String, String> {
        req.validate()?;

        let response = self
            .client
            .remove_folder(req)
            .await
            .map_err(|e| tool_error("code_index_remove_folder", e))?;

        to_json(&response)
    }

    #[tool(
        description = "Scan or rescan a registered folder. New and modified files are embedded, unchanged files are skipped by content hash, and deleted files are removed from the index."
    )]
    async fn code_index_scan(
        &self,
        meta: Meta,
        peer: Peer<RoleServer>,
        Parameters(req): Parameters<ScanRequest>,
    ) -> Result<String, String> {
        req.validate()?;

        let progress = meta
            .get_progress_token()
            .map(|token| ScanProgress::new(peer, token));

        let response = self
            .client
            .scan_folder_with_progress(req, progress)
            .await
            .map_err(|e| tool_error("code_index_scan", e))?;

        to_json(&response)
    }

    #[tool(
        description = "Semantic search over indexed code. Returns matching chunks by default, or whole files with retrieve=\"full\". Optionally restrict to one registered folder."
    )]
    async fn code_index_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> Result<String, String> {
        req.validate()?;

        let response = self
            .client
            .search(req)
            .await
            .map_err(|e| tool_error("code_index_search", e))?;

        to_json(&response)
    }

    #[tool(
        description = "Show registered folders with their file counts and status, index totals, and whether the filesystem watcher is running"
    )]
    async fn code_index_status(
        &self,
        Parameters(_req): Parameters<StatusRequest>,
    ) -> Result<String, String> {
        let response = self
            .client
            .status()
            .await
            .map_err(|e| tool_error("code_index_status", e))?;

        to_json(&response)
    }
}

// Prompts for slash commands
#[prompt_router]
impl CodeIndexMcpServer {
    #[prompt(
        name = "index-folder",
        description = "Register a folder and index its files for semantic search"
    )]
    async fn index_folder_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<GetPromptResult, McpError> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");

        let messages = vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Please register the folder '{}' with code_index_add_folder, then index it with code_index_scan.",
                path
            ),
        )];

        Ok(GetPromptResult {
            description: Some(format!("Register and scan {}", path)),
            messages,
        })
    }

    #[prompt(name = "search", description = "Search indexed code by meaning")]
    async fn search_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!("Please search the indexed code with code_index_search for: {}", query),
        )])
    }

    #[prompt(name = "status", description = "Show what is indexed")]
    async fn status_prompt(&self) -> Vec<PromptMessage> {
        vec![PromptMessage::new_text(
            PromptMessageRole::User,
            "Please show the code index status with code_index_status.",
        )]
    }
}

#[tool_handler(router = self.tool_router)]
#[prompt_handler]
impl ServerHandler for CodeIndexMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "code-index".into(),
                title: Some("Code Index - Semantic Search over Local Folders".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Semantic code search over registered folders. \
                Use code_index_add_folder to register a folder, code_index_scan to index it, \
                code_index_search to query, and code_index_status to inspect the index. \
                A filesystem watcher keeps scanned folders up to date. (build {})",
                env!("BUILD_TIMESTAMP")
            )),
        }
    }
}

impl CodeIndexMcpServer {
    /// Serve MCP over stdin/stdout until the client disconnects
    pub async fn serve_stdio(self) -> Result<()> {
        tracing::info!("Starting code index MCP server");

        let transport = rmcp::transport::io::stdio();

        self.serve(transport)
            .await
            .context("Failed to start MCP server")?
            .waiting()
            .await?;

        Ok(())
    }
}
