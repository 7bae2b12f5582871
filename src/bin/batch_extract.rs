//! Batch extraction over a directory of statement text files.
//!
//! Run with: cargo run --bin batch_extract -- <directory>
//!
//! Processes every .txt file on the worker pool and prints a per-document
//! summary table.

use anyhow::Result;
use holdings_extract::models::DocumentInput;
use holdings_extract::{run_batch, PipelineConfig};
use std::env;
use std::fs;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: batch_extract <directory>");
        std::process::exit(1);
    }

    let dir = PathBuf::from(&args[1]);
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "txt").unwrap_or(false))
        .collect();
    paths.sort();

    if paths.is_empty() {
        eprintln!("No .txt files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("=== Batch Extraction ===\n");
    println!("Documents: {}\n", paths.len());

    let mut inputs = Vec::with_capacity(paths.len());
    for path in &paths {
        inputs.push(DocumentInput {
            text: fs::read_to_string(path)?,
            document_id: Some(path.display().to_string()),
            ..Default::default()
        });
    }

    let config = PipelineConfig::default();
    let results = run_batch(&config, inputs).await;

    let mut ok = 0;
    let mut failed = 0;
    let mut total_holdings = 0;

    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(output) => {
                ok += 1;
                total_holdings += output.validation.holdings_count;
                println!(
                    "✓ {} - {} holdings, total {:.2}, {} unresolved",
                    path.display(),
                    output.validation.holdings_count,
                    output.validation.extracted_total,
                    output.validation.unresolved.len()
                );
            }
            Err(e) => {
                failed += 1;
                println!("✗ {} - {}", path.display(), e);
            }
        }
    }

    println!("\n=== Summary ===");
    println!("Processed: {}", ok);
    println!("Failed:    {}", failed);
    println!("Holdings:  {}", total_holdings);

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
