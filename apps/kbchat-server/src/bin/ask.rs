use std::env;

use kbchat_core::config::Config;
use kbchat_core::deadline::CancelSignal;
use kbchat_core::types::ChatRequest;
use kbchat_pipeline::{Collaborators, Pipeline};
use kbchat_server::init_tracing;

fn parse_args() -> (String, Option<String>) {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut lang = None;
    let mut words = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--lang" | "-l" => {
                lang = args.get(i + 1).cloned();
                i += 1;
            }
            word => words.push(word.to_string()),
        }
        i += 1;
    }
    if words.is_empty() {
        eprintln!("Usage: kbchat-ask [--lang <code>] <question...>");
        std::process::exit(1);
    }
    (words.join(" "), lang)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let (question, lang) = parse_args();

    let settings = Config::load()?.settings()?;
    let (collaborators, telemetry) = Collaborators::from_settings(&settings)?;
    let pipeline = Pipeline::new(collaborators, &settings)?;
    let request = ChatRequest::new(question)?.with_language_hint(lang).with_channel(Some("cli".to_string()));

    let outcome = pipeline.handle(&request, &CancelSignal::never()).await;
    telemetry.shutdown().await;
    let reply = outcome?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}
