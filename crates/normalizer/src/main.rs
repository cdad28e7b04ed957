use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use statement_normalizer::{normalize_statement, WorkbookSource, ALFA};

/// Normalizes broker statement workbooks into a single chronological JSON
/// stream of operations.
#[derive(Debug, Parser)]
#[command(name = "statement_normalizer", author, version, about = "Normalize broker statement spreadsheets", long_about = None)]
struct Args {
    /// Statement workbooks to process (.xls / .xlsx)
    #[arg(required = true)]
    statements: Vec<PathBuf>,

    /// Write the result next to each input as <input>.normalized.json
    /// instead of printing to stdout
    #[arg(short = 'w', long = "write")]
    write: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    for path in &args.statements {
        let mut source = WorkbookSource::open(path)?;
        let result = normalize_statement(&mut source, &ALFA);

        eprintln!(
            "{}: {} operations, period {} — {}",
            path.display(),
            result.operations.len(),
            result.date_start,
            result.date_end
        );

        let json = serde_json::to_string_pretty(&result)?;
        if args.write {
            let out_path = path.with_extension("normalized.json");
            let file = File::create(&out_path)
                .with_context(|| format!("Cannot create {}", out_path.display()))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(json.as_bytes())?;
            writer.write_all(b"\n")?;
            eprintln!("✓ Wrote {}", out_path.display());
        } else {
            println!("{json}");
        }
    }

    Ok(())
}
