// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// coachstream-replay: feed a recorded generation through the stream parser
// and print the events it produces.
//
// Usage:
//   cargo run --bin coachstream-replay -- transcript.txt
//   cargo run --bin coachstream-replay -- transcript.txt --chunk-size 3 --sse
//   cat transcript.txt | cargo run --bin coachstream-replay -- --config coachstream.yaml

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::Parser;
use coachstream::config::{self, Config, FileSource, StringSource};
use coachstream::server::build_processor;
use coachstream::stream::sse::encode_event;
use tokio_stream::StreamExt;

#[derive(Parser)]
#[command(name = "coachstream-replay", about = "Replay a generation through the stream parser")]
struct Cli {
    /// Transcript file; reads stdin when omitted
    transcript: Option<PathBuf>,

    /// Path to a coachstream config YAML; built-in defaults when omitted
    #[arg(long, env = "COACHSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Characters per simulated fragment
    #[arg(long, default_value_t = 16)]
    chunk_size: usize,

    /// Locale override for this replay
    #[arg(long)]
    locale: Option<String>,

    /// Print SSE frames instead of one JSON event per line
    #[arg(long, default_value_t = false)]
    sse: bool,
}

/// Split `text` into fragments of at most `size` characters.
fn fragments(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn load(path: Option<&PathBuf>) -> Result<Config, config::ConfigError> {
    match path {
        Some(path) => config::load_config(&FileSource { path: path.clone() }),
        None => config::load_config(&StringSource {
            content: "coachstream: v1\n".to_string(),
        }),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let transcript = match &cli.transcript {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map(|_| buf)
        }
    };
    let transcript = match transcript {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to read transcript: {e}");
            std::process::exit(1);
        }
    };

    let pieces = fragments(&transcript, cli.chunk_size);
    eprintln!("replaying {} fragments...", pieces.len());

    let processor = build_processor(&config, reqwest::Client::new());
    let input = tokio_stream::iter(pieces.into_iter().map(Ok::<_, std::convert::Infallible>));
    let mut events = processor.process(input, cli.locale);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(event) = events.next().await {
        let written = if cli.sse {
            out.write_all(&encode_event(&event))
        } else {
            match serde_json::to_string(&event) {
                Ok(line) => writeln!(out, "{line}"),
                Err(e) => {
                    eprintln!("failed to serialize event: {e}");
                    continue;
                }
            }
        };
        if let Err(e) = written {
            eprintln!("failed to write output: {e}");
            std::process::exit(1);
        }
    }
}
