use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use pdf_proof_rust::Alignment;

#[derive(Parser, Debug)]
#[command(
    name = "pdf-proof-rust",
    version,
    about = "Place text lines inside the marked region of a PDF template"
)]
struct Cli {
    /// Template PDF carrying the colored marker rectangle
    template: PathBuf,

    /// Text line to place (repeatable; the first line is set bold). Reads stdin when omitted
    #[arg(short = 'l', long = "line")]
    lines: Vec<String>,

    /// Directory for generated files (default: next to the template)
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// File name stem for generated files (default: template file stem)
    #[arg(long = "output-name")]
    output_name: Option<String>,

    /// Page number to proof (1-based)
    #[arg(short = 'p', long = "page", default_value_t = 1)]
    page: usize,

    /// Use an already rendered page image instead of rasterizing the template
    #[arg(long = "raster")]
    raster: Option<PathBuf>,

    /// Rasterization scale relative to 72 dpi
    #[arg(long = "zoom")]
    zoom: Option<f32>,

    /// Line alignment inside the region (left, center)
    #[arg(long = "align")]
    align: Option<Alignment>,

    /// Inset from the region edges in points
    #[arg(long = "padding")]
    padding: Option<f32>,

    /// Also keep the standalone overlay PDF
    #[arg(long = "overlay")]
    overlay: bool,

    /// Skip the PNG preview
    #[arg(long = "no-preview")]
    no_preview: bool,

    /// Outline the placement region on the proof
    #[arg(long = "debug-border")]
    debug_border: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    pdf_proof_rust::logging::init(cli.verbose)?;

    let lines = if cli.lines.is_empty() {
        read_stdin_lines()?
    } else {
        cli.lines
    };

    let report = pdf_proof_rust::run(pdf_proof_rust::Config {
        template: cli.template,
        lines,
        output_dir: cli.output_dir,
        output_name: cli.output_name,
        page: Some(cli.page),
        raster: cli.raster,
        zoom: cli.zoom,
        alignment: cli.align,
        padding: cli.padding,
        overlay: cli.overlay,
        no_preview: cli.no_preview,
        debug_border: cli.debug_border,
        settings_path: cli.read_settings,
    })?;

    let json = serde_json::to_string_pretty(&report).with_context(|| "failed to encode report")?;
    println!("{}", json);
    Ok(())
}

fn read_stdin_lines() -> Result<Vec<String>> {
    if io::stdin().is_terminal() {
        return Err(anyhow!("no text lines given (use --line or pipe lines on stdin)"));
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .with_context(|| "stdin must be UTF-8 text")?;
    Ok(buffer
        .lines()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}
