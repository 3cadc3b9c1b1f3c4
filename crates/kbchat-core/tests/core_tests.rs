use std::fs;
use std::io::Write;
use tempfile::TempDir;

use kbchat_core::data_processor::{ChunkingConfig, DataProcessor};

#[test]
fn process_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let file_path = dir.join("vitality.txt");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, "Vitality rewards healthy living").unwrap();

    let processor = DataProcessor::new();
    let chunks = processor.process_directory(dir).expect("process");

    assert_eq!(chunks.len(), 1, "one small paragraph becomes one chunk");
    assert_eq!(chunks[0].content.trim(), "Vitality rewards healthy living");
    assert_eq!(chunks[0].filename, "vitality.txt");
    assert_eq!(chunks[0].doc_id, "vitality");
}

#[test]
fn paragraphs_become_ordered_chunks() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("keycare.txt"), "First paragraph.\n\n\n\nSecond paragraph.\n\nThird.").unwrap();
    fs::write(tmp.path().join("notes.md"), "ignored").unwrap();

    let chunks = DataProcessor::new().process_directory(tmp.path()).expect("process");
    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["First paragraph.", "Second paragraph.", "Third."]);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.total_chunks, 3);
        assert_eq!(c.id, format!("keycare:{i}"));
    }
}

#[test]
fn long_paragraph_is_split_with_overlap() {
    let tmp = TempDir::new().unwrap();
    let words: Vec<String> = (0..40).map(|i| format!("w{i}")).collect();
    fs::write(tmp.path().join("long.txt"), words.join(" ")).unwrap();

    let processor = DataProcessor::with_config(ChunkingConfig { max_tokens: 20, overlap_percent: 0.2 });
    let chunks = processor.process_directory(tmp.path()).expect("process");

    // 20 tokens ≈ 15 words per chunk, 3 words of overlap.
    assert!(chunks.len() >= 3);
    assert!(chunks[0].content.starts_with("w0 "));
    assert!(chunks[1].content.starts_with("w12 "));
    assert!(chunks.last().unwrap().content.ends_with("w39"));
}
