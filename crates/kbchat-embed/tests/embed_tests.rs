use kbchat_core::config::{EmbeddingBackend, EmbeddingSettings, GenerationSettings};
use kbchat_core::traits::Embedder;
use kbchat_embed::{embedder_from_settings, FakeEmbedder};

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(1024);
    let v1 = embedder.embed("how do I join vitality").await.expect("embed");
    let v2 = embedder.embed("how do I join vitality").await.expect("embed");

    assert_eq!(v1.len(), 1024, "embedding dim is 1024");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[tokio::test]
async fn fake_backend_needs_no_credentials() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Fake, dim: 64, ..EmbeddingSettings::default() };
    let embedder = embedder_from_settings(reqwest::Client::new(), &settings, &GenerationSettings::default()).expect("fake");
    assert_eq!(embedder.dim(), 64);
    assert_eq!(embedder.embed("keycare").await.expect("embed").len(), 64);
}

#[test]
fn azure_backend_without_endpoint_is_a_config_error() {
    if std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok() { return; }
    let err = embedder_from_settings(reqwest::Client::new(), &EmbeddingSettings::default(), &GenerationSettings::default())
        .err()
        .expect("must fail");
    assert!(err.to_string().contains("embedding.endpoint"), "{err}");
}
