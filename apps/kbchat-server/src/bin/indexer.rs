use std::env;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use kbchat_core::config::{expand_path, Config};
use kbchat_core::data_processor::DataProcessor;
use kbchat_text::LocalIndex;
use kbchat_server::init_tracing;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load()?;
    let settings = config.settings_unchecked()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut data_dir = None;
    let mut index_dir = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--index-dir" | "-o" => {
                index_dir = args.get(i + 1).map(PathBuf::from);
                i += 1;
            }
            arg if !arg.starts_with('-') => data_dir = Some(PathBuf::from(arg)),
            other => {
                eprintln!("Unknown flag: {other}");
                eprintln!("Usage: kbchat-indexer <data_dir> [--index-dir <dir>]");
                std::process::exit(1);
            }
        }
        i += 1;
    }
    let Some(data_dir) = data_dir.or_else(|| config.get::<String>("indexer.data_dir").ok().map(expand_path)) else {
        eprintln!("Usage: kbchat-indexer <data_dir> [--index-dir <dir>]  (or set indexer.data_dir)");
        std::process::exit(1);
    };
    let index_dir = match index_dir {
        Some(dir) => dir,
        None => settings.search.local_dir()?,
    };

    println!("kbchat indexer\n==============");
    println!("Data directory:  {}", data_dir.display());
    println!("Index directory: {}", index_dir.display());

    let processor = DataProcessor::new();
    let files = processor.list_documents(&data_dir);
    if files.is_empty() {
        println!("No .txt files found; nothing to index.");
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("#>-"),
    );
    let mut chunks = Vec::new();
    for file in &files {
        pb.set_message(file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
        chunks.extend(processor.process_file(file)?);
        pb.inc(1);
    }
    pb.finish_with_message("chunked");

    let index = LocalIndex::create(&index_dir)?;
    let written = index.index_chunks(&chunks)?;
    println!("Indexed {} chunks from {} files", written, files.len());
    println!("Serve it with search.backend = \"local\" and search.local_index_dir = \"{}\"", index_dir.display());
    Ok(())
}
