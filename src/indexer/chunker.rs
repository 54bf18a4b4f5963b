use super::ast_parser::AstParser;

/// A contiguous line range of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub chunk_num: usize,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    /// Lines in the range with their original line endings
    pub content: String,
}

/// Strategy for chunking code
#[derive(Debug, Clone, Copy)]
pub enum ChunkStrategy {
    /// Fixed number of lines per chunk
    FixedLines(usize),
    /// Break at declaration boundaries when a grammar is available, never
    /// exceeding `max_lines` per chunk
    Semantic { max_lines: usize },
}

pub struct CodeChunker {
    strategy: ChunkStrategy,
}

impl CodeChunker {
    pub fn new(strategy: ChunkStrategy) -> Self {
        Self { strategy }
    }

    /// Split `content` into chunks that tile it exactly, in order
    pub fn chunk(&self, content: &str, language: &str) -> Vec<ChunkSpan> {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let (max_lines, boundaries) = match self.strategy {
            ChunkStrategy::FixedLines(n) => (n.max(1), Vec::new()),
            ChunkStrategy::Semantic { max_lines } => {
                (max_lines.max(1), semantic_boundaries(content, language))
            }
        };

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < lines.len() {
            let limit = start + max_lines;
            let end = if limit >= lines.len() {
                lines.len()
            } else {
                boundaries
                    .iter()
                    .rev()
                    .find(|&&b| b > start && b <= limit)
                    .copied()
                    .unwrap_or(limit)
            };

            chunks.push(ChunkSpan {
                chunk_num: chunks.len(),
                start_line: start + 1,
                end_line: end,
                content: lines[start..end].concat(),
            });
            start = end;
        }

        chunks
    }
}

fn semantic_boundaries(content: &str, language: &str) -> Vec<usize> {
    match AstParser::for_language(language) {
        Some(Ok(mut parser)) => parser.boundaries(content).unwrap_or_else(|e| {
            tracing::debug!("Falling back to fixed chunks for {}: {}", language, e);
            Vec::new()
        }),
        Some(Err(e)) => {
            tracing::warn!("Failed to load {} grammar: {}", language, e);
            Vec::new()
        }
        None => Vec::new(),
    }
}

impl Default for CodeChunker {
    fn default() -> Self {
        Self::new(ChunkStrategy::Semantic { max_lines: 200 })
    }
}
