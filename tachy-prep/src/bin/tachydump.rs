//! Inspect a built artifact set.
//!
//! Dumps the base font's typed header and RLE statistics, the closure
//! file shape, and optionally the closure of sample texts.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tachy_font::artifact::file_names;
use tachy_prep::{closure_stats, dump_base, text_closure_report};

#[derive(Parser, Debug)]
#[command(version, about = "Dump the parts of a TachyFont artifact set.")]
struct Args {
    /// The artifact directory produced by tachyprep.
    artifacts: PathBuf,

    /// Report the closure of these texts.
    #[arg(short, long, num_args = 0..)]
    texts: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tachydump: {}: {e}", args.artifacts.display());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let read = |name: &str| fs::read(args.artifacts.join(name));

    let base = read(file_names::BASE)?;
    println!("{}", dump_base(&base)?);

    let closure_idx = read(file_names::CLOSURE_IDX)?;
    let stats = closure_stats(&closure_idx)?;
    println!(
        "closures: {} glyphs, {} with dependencies, largest {} (gid {})",
        stats.glyphs, stats.nontrivial, stats.largest, stats.largest_gid
    );

    if !args.texts.is_empty() {
        let codepoints = read(file_names::CODEPOINTS)?;
        let gids = read(file_names::GIDS)?;
        let closure_data = read(file_names::CLOSURE_DATA)?;
        for text in &args.texts {
            println!("\ntext: {text}");
            println!(
                "{}",
                text_closure_report(&codepoints, &gids, &closure_idx, &closure_data, text)?
            );
        }
    }
    Ok(())
}
