//! `bcsv-head`: print the first rows of a BCSV file as delimited text.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use bcsv::{CellValue, Reader};

#[derive(Debug, Parser)]
#[command(
    name = "bcsv-head",
    about = "Print the first rows of a BCSV file as delimited text",
    version
)]
struct Args {
    /// Input file.
    file: String,

    /// Number of rows to print.
    #[arg(short = 'n', long = "rows", default_value_t = 10)]
    rows: u64,

    /// Field delimiter.
    #[arg(short = 'd', long = "delimiter", default_value_t = ',')]
    delimiter: char,

    /// Quote character for string fields.
    #[arg(short = 'q', long = "quote", default_value_t = '"')]
    quote: char,

    /// Quote every field, not just strings that need it.
    #[arg(long = "quote-all")]
    quote_all: bool,

    /// Do not print the column-name header line.
    #[arg(long = "no-header")]
    no_header: bool,

    /// Digits after the decimal point for FLOAT and DOUBLE cells.
    #[arg(short = 'p', long = "precision")]
    precision: Option<usize>,

    /// Print file details to stderr.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn format_cell(cell: &CellValue, args: &Args) -> String {
    let text = match (cell, args.precision) {
        (CellValue::Float(v), Some(p)) => format!("{v:.p$}"),
        (CellValue::Double(v), Some(p)) => format!("{v:.p$}"),
        (cell, _) => cell.to_string(),
    };
    let is_string = matches!(cell, CellValue::Str(_));
    let needs_quote = args.quote_all
        || (is_string
            && (text.contains(args.delimiter) || text.contains(args.quote) || text.is_empty()));
    if needs_quote {
        let q = args.quote;
        let escaped = text.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    } else {
        text
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut reader = Reader::new();
    reader
        .open(&args.file)
        .with_context(|| format!("cannot open '{}'", args.file))?;

    if args.verbose {
        let header = reader.file_header().expect("reader is open");
        eprintln!(
            "{}: {} rows, {} / {}, sealed: {}",
            args.file,
            reader.row_count(),
            header.file_codec.name(),
            header.row_codec.name(),
            reader.is_sealed()
        );
        if let Some(w) = reader.warning() {
            eprintln!("warning: {w}");
        }
    }

    let layout = reader.layout().clone();
    if !args.no_header {
        let names: Vec<&str> = (0..layout.column_count()).map(|i| layout.name(i)).collect();
        println!("{}", names.join(&args.delimiter.to_string()));
    }

    let mut printed = 0u64;
    while printed < args.rows && reader.read_next()? {
        let row = reader.row();
        let fields: Vec<String> = (0..layout.column_count())
            .map(|i| format_cell(row.value(i), args))
            .collect();
        println!("{}", fields.join(&args.delimiter.to_string()));
        printed += 1;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bcsv-head: {e:#}");
            ExitCode::FAILURE
        }
    }
}
