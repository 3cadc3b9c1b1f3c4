//! Azure AI Search client speaking the `docs/search` REST contract.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kbchat_core::config::SearchTarget;
use kbchat_core::traits::KnowledgeIndex;
use kbchat_core::types::{QueryMode, SearchHit, SearchQuery, SearchResponse};

const SELECT_FIELDS: &str = "content,metadata_storage_name,metadata_storage_path";

pub struct AzureSearchIndex {
    client: reqwest::Client,
    target: SearchTarget,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchBody<'a> {
    count: bool,
    top: usize,
    select: &'static str,
    search: &'a str,
    search_fields: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    vector_queries: Vec<VectorQuery<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VectorQuery<'a> {
    kind: &'static str,
    fields: &'a str,
    vector: &'a [f32],
    k_nearest_neighbors_count: usize,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    value: Vec<SearchDocument>,
    #[serde(rename = "@odata.count", default)]
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchDocument {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata_storage_name: Option<String>,
    #[serde(default)]
    metadata_storage_path: Option<String>,
    #[serde(rename = "@search.score", default)]
    score: Option<f32>,
}

impl From<SearchDocument> for SearchHit {
    fn from(doc: SearchDocument) -> Self {
        Self {
            content: doc.content.unwrap_or_default(),
            filename: doc.metadata_storage_name.unwrap_or_else(|| "unknown".to_string()),
            score: doc.score.unwrap_or(0.0),
            path: doc.metadata_storage_path,
        }
    }
}

impl AzureSearchIndex {
    pub fn new(client: reqwest::Client, target: SearchTarget) -> Self { Self { client, target } }

    fn url(&self) -> String {
        format!("{}/indexes/{}/docs/search?api-version={}", self.target.endpoint, self.target.index, self.target.api_version)
    }

    pub(crate) fn body<'a>(&'a self, query: &'a SearchQuery) -> SearchBody<'a> {
        let mut body = SearchBody {
            count: true,
            top: query.top,
            select: SELECT_FIELDS,
            search: &query.text,
            search_fields: "content",
            query_type: None,
            vector_queries: Vec::new(),
        };
        match query.mode {
            QueryMode::Hybrid => {
                if let Some(vector) = query.vector.as_deref() {
                    body.vector_queries.push(VectorQuery {
                        kind: "vector",
                        fields: &self.target.vector_field,
                        vector,
                        k_nearest_neighbors_count: query.top,
                    });
                }
            }
            QueryMode::KeywordOnly => body.query_type = Some("simple"),
        }
        body
    }
}

#[async_trait]
impl KnowledgeIndex for AzureSearchIndex {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.target.api_key)
            .json(&self.body(query))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Azure Search API error {}: {}", status, body));
        }

        let payload: SearchPayload = response.json().await?;
        let hits: Vec<SearchHit> = payload.value.into_iter().map(SearchHit::from).collect();
        let total_count = payload.count.unwrap_or(0);
        Ok(SearchResponse { hits, total_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> AzureSearchIndex {
        AzureSearchIndex::new(
            reqwest::Client::new(),
            SearchTarget {
                endpoint: "https://kb.search.windows.net".into(),
                api_key: "k".into(),
                index: "docs".into(),
                api_version: "2023-11-01".into(),
                vector_field: "contentVector".into(),
            },
        )
    }

    #[test]
    fn hybrid_body_carries_vector_query() {
        let idx = index();
        let q = SearchQuery::hybrid("join vitality", Some(vec![0.5, 0.25]), 3);
        let v = serde_json::to_value(idx.body(&q)).unwrap();
        assert_eq!(v["search"], "join vitality");
        assert_eq!(v["top"], 3);
        assert_eq!(v["count"], true);
        assert_eq!(v["searchFields"], "content");
        assert_eq!(v["vectorQueries"][0]["fields"], "contentVector");
        assert_eq!(v["vectorQueries"][0]["kNearestNeighborsCount"], 3);
        assert!(v.get("queryType").is_none());
    }

    #[test]
    fn hybrid_without_embedding_is_lexical_only() {
        let idx = index();
        let v = serde_json::to_value(idx.body(&SearchQuery::hybrid("claims", None, 3))).unwrap();
        assert!(v.get("vectorQueries").is_none());
        assert!(v.get("queryType").is_none());
    }

    #[test]
    fn keyword_body_uses_simple_query_type() {
        let idx = index();
        let v = serde_json::to_value(idx.body(&SearchQuery::keyword("claims", 3))).unwrap();
        assert_eq!(v["queryType"], "simple");
        assert!(v.get("vectorQueries").is_none());
    }

    #[test]
    fn payload_defaults_missing_fields() {
        let payload: SearchPayload = serde_json::from_value(serde_json::json!({
            "value": [
                {"content": "Vitality rewards", "metadata_storage_name": "vitality.pdf", "@search.score": 1.5},
                {"metadata_storage_path": "https://blob/x"}
            ],
            "@odata.count": 12
        }))
        .unwrap();
        assert_eq!(payload.count, Some(12));
        let hits: Vec<SearchHit> = payload.value.into_iter().map(SearchHit::from).collect();
        assert_eq!(hits[0].filename, "vitality.pdf");
        assert!((hits[0].score - 1.5).abs() < f32::EPSILON);
        assert_eq!(hits[1].filename, "unknown");
        assert_eq!(hits[1].content, "");
        assert_eq!(hits[1].path.as_deref(), Some("https://blob/x"));
    }
}
