//! Serve one glyph request from a preprocessed artifact set.
//!
//! Reads a JSON glyph request, assembles the bundle and writes the raw
//! bundle bytes, optionally paced to a declared bandwidth.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tachy_bundler::{artifact_dir, assemble_bundle, FontArtifacts, GlyphRequest, ThrottledWriter};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Assemble a TachyFont glyph bundle for a JSON glyph request."
)]
struct Args {
    /// Root directory holding one artifact set per font.
    #[arg(long)]
    fonts: PathBuf,

    /// The JSON request file, or '-' for stdin.
    #[arg(long, default_value = "-")]
    request: PathBuf,

    /// Output file for the bundle, or '-' for stdout.
    #[arg(long, default_value = "-")]
    output: PathBuf,

    /// Declared client bandwidth in Kbps; 0 disables pacing.
    #[arg(long, default_value_t = 0.0)]
    bandwidth: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(len) => {
            eprintln!("wrote {len} bundle bytes");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("tachy-bundler: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<usize, Box<dyn std::error::Error>> {
    let body = if args.request.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(&args.request)?
    };
    let request = GlyphRequest::from_json(&body)?;

    let dir = artifact_dir(&args.fonts, &request.name, &request.weight);
    let artifacts = FontArtifacts::load(&dir)?;
    let bundle = assemble_bundle(&artifacts, &request.arr)?;
    let len = bundle.len();

    if args.output.as_os_str() == "-" {
        let stdout = std::io::stdout();
        let mut writer = ThrottledWriter::new(stdout.lock(), args.bandwidth, true);
        writer.write_all(&bundle)?;
        writer.flush()?;
    } else {
        let file = std::fs::File::create(&args.output)?;
        let mut writer = ThrottledWriter::new(file, args.bandwidth, false);
        writer.write_all(&bundle)?;
        writer.flush()?;
    }
    Ok(len)
}
