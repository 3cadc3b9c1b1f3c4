//! Paragraph chunking of plain-text knowledge documents for the local index.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::DocumentChunk;

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 500, overlap_percent: 0.2 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn list_documents(&self, data_dir: &Path) -> Vec<PathBuf> { self.list_txt_files(data_dir) }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<DocumentChunk>> {
        let files = self.list_txt_files(data_dir);
        if files.is_empty() {
            tracing::warn!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        let mut all_chunks = Vec::new();
        for file_path in &files {
            all_chunks.extend(self.process_file(file_path)?);
        }
        tracing::info!(files = files.len(), chunks = all_chunks.len(), "processed documents");
        Ok(all_chunks)
    }

    pub fn process_file(&self, file_path: &Path) -> Result<Vec<DocumentChunk>> {
        let content = self.read_file_content(file_path)?;
        Ok(self.chunk_content(&content, file_path))
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => {
                let bytes = fs::read(file_path).with_context(|| format!("reading {}", file_path.display()))?;
                Ok(String::from_utf8_lossy(&bytes).to_string())
            }
        }
    }

    fn chunk_content(&self, content: &str, file_path: &Path) -> Vec<DocumentChunk> {
        let doc_id = file_path.file_stem().map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().to_string());
        let filename = file_path.file_name().map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().to_string());
        let doc_path = file_path.to_string_lossy().to_string();
        let make = |chunk_index: usize, content: String| DocumentChunk {
            id: format!("{doc_id}:{chunk_index}"),
            doc_id: doc_id.clone(),
            doc_path: doc_path.clone(),
            filename: filename.clone(),
            content,
            chunk_index,
            total_chunks: 0,
        };

        let mut document_chunks = Vec::new();
        for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if self.count_tokens(paragraph) <= self.chunking_config.max_tokens {
                document_chunks.push(make(document_chunks.len(), paragraph.to_string()));
            } else {
                for sub_chunk in self.split_paragraph_with_overlap(paragraph) {
                    document_chunks.push(make(document_chunks.len(), sub_chunk));
                }
            }
        }
        let total_chunks = document_chunks.len();
        for chunk in &mut document_chunks { chunk.total_chunks = total_chunks; }
        document_chunks
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn count_tokens(&self, text: &str) -> usize { (text.split_whitespace().count() as f32 / 0.75) as usize }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = ((self.chunking_config.max_tokens as f32) * 0.75).max(1.0) as usize;
        let overlap_words = ((words_per_chunk as f32) * self.chunking_config.overlap_percent) as usize;
        let overlap_words = overlap_words.min(words_per_chunk.saturating_sub(1));
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
            .collect();
        txt_files.sort();
        txt_files
    }
}
