use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{Query, QueryParser};
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use kbchat_core::traits::KnowledgeIndex;
use kbchat_core::types::{DocumentChunk, QueryMode, SearchHit, SearchQuery, SearchResponse};

use crate::schema::{build_schema, register_tokenizer};

#[derive(Clone, Copy)]
struct Fields {
	id: Field,
	doc_path: Field,
	filename: Field,
	text: Field,
}

impl Fields {
	fn resolve(index: &Index) -> Result<Self> {
		let schema = index.schema();
		Ok(Self {
			id: schema.get_field("id")?,
			doc_path: schema.get_field("doc_path")?,
			filename: schema.get_field("filename")?,
			text: schema.get_field("text")?,
		})
	}
}

/// On-disk keyword index answering [`KnowledgeIndex`] queries.
#[derive(Clone)]
pub struct LocalIndex {
	index: Index,
	reader: IndexReader,
	fields: Fields,
}

impl LocalIndex {
	/// Create a fresh index at `index_dir`, wiping anything already there.
	pub fn create(index_dir: &Path) -> Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(index_dir)?; }
		std::fs::create_dir_all(index_dir)?;
		let index = Index::create_in_dir(index_dir, build_schema())?;
		Self::from_index(index)
	}

	pub fn open(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir)
			.map_err(|e| anyhow::anyhow!("Failed to open local index at {}: {}", index_dir.display(), e))?;
		Self::from_index(index)
	}

	/// Volatile index, used by tests and demos.
	pub fn in_memory() -> Result<Self> { Self::from_index(Index::create_in_ram(build_schema())) }

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let fields = Fields::resolve(&index)?;
		Ok(Self { index, reader, fields })
	}

	pub fn index_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize> {
		let mut index_writer: IndexWriter = self.index.writer(50_000_000)?;
		for c in chunks {
			index_writer.add_document(doc!(
				self.fields.id => c.id.clone(),
				self.fields.doc_path => c.doc_path.clone(),
				self.fields.filename => c.filename.clone(),
				self.fields.text => c.content.clone(),
			))?;
		}
		index_writer.commit()?;
		self.reader.reload()?;
		Ok(chunks.len())
	}

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }

	/// Synchronous search; the async trait impl runs this on the blocking pool.
	pub fn search_blocking(&self, query: &SearchQuery) -> Result<SearchResponse> {
		if query.top == 0 { return Ok(SearchResponse::empty()); }
		if query.vector.is_some() {
			tracing::debug!("local index ignores the vector component of hybrid queries");
		}
		let parsed = self.parse(query);
		let searcher = self.reader.searcher();
		let (top_docs, total_count) = searcher.search(&*parsed, &(TopDocs::with_limit(query.top), Count))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let text_of = |field: Field| doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string);
			hits.push(SearchHit {
				content: text_of(self.fields.text).unwrap_or_default(),
				filename: text_of(self.fields.filename).unwrap_or_else(|| "unknown".to_string()),
				score,
				path: text_of(self.fields.doc_path),
			});
		}
		Ok(SearchResponse { hits, total_count })
	}

	fn parse(&self, query: &SearchQuery) -> Box<dyn Query> {
		let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
		let text = match query.mode {
			QueryMode::Hybrid => query.text.clone(),
			QueryMode::KeywordOnly => keywords_only(&query.text),
		};
		let (parsed, errors) = parser.parse_query_lenient(&text);
		if let Some(first) = errors.first() {
			tracing::debug!(error_count = errors.len(), first_error = %first, "lenient query parse produced warnings");
		}
		parsed
	}
}

/// Strip query syntax so every remaining token is a plain term.
fn keywords_only(text: &str) -> String {
	let plain: String = text.to_lowercase().chars().map(|c| if c.is_alphanumeric() { c } else { ' ' }).collect();
	plain.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl KnowledgeIndex for LocalIndex {
	async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
		let this = self.clone();
		let query = query.clone();
		tokio::task::spawn_blocking(move || this.search_blocking(&query)).await?
	}
}

#[cfg(test)]
mod tests {
	use super::keywords_only;

	#[test]
	fn keyword_mode_drops_query_syntax() {
		assert_eq!(keywords_only("\"late joiner\" AND (penalty)?"), "late joiner and penalty");
		assert_eq!(keywords_only("  -- "), "");
	}
}
