//! Preprocess a font for incremental delivery.
//!
//! Produces the artifact set (base font plus per-glyph side files) the
//! bundle assembler serves from.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tachy_prep::Preprocessor;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Preprocess an OpenType font into a TachyFont base font and glyph artifacts."
)]
struct Args {
    /// The input font file.
    fontfile: PathBuf,

    /// Keep hinting instructions and tables.
    #[arg(long)]
    hinting: bool,

    /// Output folder; artifacts land in a subfolder named after the font.
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let font_name = args
        .fontfile
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("font")
        .to_string();
    let artifact_dir = args.output.join(&font_name);

    let preprocessor = Preprocessor::new(args.hinting);
    match preprocessor.run(&args.fontfile, &artifact_dir) {
        Ok(summary) => {
            println!(
                "{}: {} glyphs, base {} bytes -> {}",
                font_name,
                summary.num_glyphs,
                summary.base_len,
                summary.artifact_dir.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("tachyprep: {}: {e}", args.fontfile.display());
            ExitCode::FAILURE
        }
    }
}
