//! build-dmrpp-h4: annotate a schema document with the chunk catalog of an
//! HDF4 file.
//!
//! The annotated document goes to stdout (or `-o`); diagnostics go to
//! stderr. Any fatal problem exits with status 1 and writes no document.

mod error;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clap::Parser;
use h4_dmrpp_core::{
    BuildOptions, TrailingChunks,
    document::{BuildMetadata, Document, RenderOptions},
    schema::Group,
};
use snafu::ResultExt;

use crate::error::{BuildSnafu, CliResult, ParseSchemaSnafu, ReadSchemaSnafu, RenderSnafu};

#[derive(Debug, Parser)]
#[command(
    name = "build-dmrpp-h4",
    version,
    about = "Annotate a schema document with the byte ranges of every chunk in an HDF4 file"
)]
struct Cli {
    /// HDF4 data file to index
    #[arg(short = 'f', long = "input")]
    input: PathBuf,

    /// Schema document (JSON) naming the variables to annotate
    #[arg(short = 'r', long = "schema")]
    schema: PathBuf,

    /// Data URL written into the document (default: the input path)
    #[arg(short = 'u', long)]
    href: Option<String>,

    /// Write the document to this file instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Debug-level diagnostics on stderr
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,

    /// Leave out chunks that only partly overlap the array
    #[arg(long, default_value_t = false)]
    truncate_partial_chunks: bool,

    /// Record the tool version and command line in the document
    #[arg(long, default_value_t = false)]
    production_metadata: bool,
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn read_schema(path: &Path) -> CliResult<Group> {
    let text = fs::read_to_string(path).context(ReadSchemaSnafu {
        path: path.display().to_string(),
    })?;
    serde_json::from_str(&text).context(ParseSchemaSnafu {
        path: path.display().to_string(),
    })
}

fn production_metadata() -> BuildMetadata {
    BuildMetadata {
        tool: env!("CARGO_BIN_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        invocation: std::env::args().collect::<Vec<_>>().join(" "),
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let schema = read_schema(&cli.schema)?;

    let trailing = if cli.truncate_partial_chunks {
        TrailingChunks::Truncate
    } else {
        TrailingChunks::Cover
    };
    let options = BuildOptions::default().with_trailing_chunks(trailing);
    let built = h4_dmrpp_core::build(schema, &cli.input, &options).context(BuildSnafu)?;

    let render = RenderOptions {
        href: cli
            .href
            .unwrap_or_else(|| cli.input.display().to_string()),
        build_metadata: cli.production_metadata.then(production_metadata),
    };
    let document = Document::new(built.schema, render);

    match &cli.output {
        Some(path) => document.write_file(path).context(RenderSnafu)?,
        None => document.write_to(io::stdout().lock()).context(RenderSnafu)?,
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
