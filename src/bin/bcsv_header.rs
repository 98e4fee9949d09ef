//! `bcsv-header`: print a BCSV file's column table and, verbosely, its
//! codec metadata.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use bcsv::{FileFlags, Reader};

#[derive(Debug, Parser)]
#[command(
    name = "bcsv-header",
    about = "Print the column layout of a BCSV file",
    version
)]
struct Args {
    /// Input file.
    file: String,

    /// Also print codec ids, flags, compression level, block size, row
    /// count, and sealing state.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut reader = Reader::new();
    reader
        .open(&args.file)
        .with_context(|| format!("cannot open '{}'", args.file))?;
    let layout = reader.layout().clone();

    let name_width = (0..layout.column_count())
        .map(|i| layout.name(i).len())
        .max()
        .unwrap_or(4)
        .max(4);
    println!("{:>5}  {:<name_width$}  {}", "index", "name", "type");
    for i in 0..layout.column_count() {
        println!(
            "{i:>5}  {:<name_width$}  {}",
            layout.name(i),
            layout.column_type(i)
        );
    }

    if args.verbose {
        let header = reader.file_header().expect("reader is open");
        println!();
        println!("file codec:        {}", header.file_codec.name());
        println!("row codec:         {}", header.row_codec.name());
        println!(
            "flags:             {:#010x}{}",
            header.flags.bits(),
            if header.flags.contains(FileFlags::ZERO_ORDER_HOLD) {
                " (ZERO_ORDER_HOLD)"
            } else {
                ""
            }
        );
        println!("compression level: {}", header.compression_level);
        println!("block size hint:   {}", header.block_size_hint);
        println!("row count:         {}", reader.row_count());
        println!("sealed:            {}", reader.is_sealed());
        if let Some(w) = reader.warning() {
            println!("warning:           {w}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bcsv-header: {e:#}");
            ExitCode::FAILURE
        }
    }
}
