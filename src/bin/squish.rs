//! squish CLI - compress delimited tables with learned column models.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use squish::compression::SAMPLE_ROWS;
use squish::text::{format_row, parse_row, read_dictionaries, write_dictionaries, EnumDictionary};
use squish::{parse_config, CompressionConfig, Compressor, Decompressor, Schema};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Compress delimited tables with learned column models.
///
/// `-c` writes INPUT.squish and INPUT.squish.enums; `-d` reads a .squish
/// file and its .enums file and writes INPUT.rec.
#[derive(Parser, Debug)]
#[command(name = "squish")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["compress", "decompress"])))]
struct Cli {
    /// Compress INPUT.
    #[arg(short = 'c')]
    compress: bool,

    /// Decompress INPUT.
    #[arg(short = 'd')]
    decompress: bool,

    /// Table to compress, or .squish file to decompress.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Column configuration.
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// 1 for '|' separated fields, anything else for ','.
    #[arg(value_name = "DELIMITER")]
    delimiter: u8,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn compress(input: &Path, schema: Schema, config: &CompressionConfig, delimiter: char) -> Result<()> {
    let output = with_suffix(input, "squish");
    let mut dictionaries = vec![EnumDictionary::new(); schema.len()];
    let mut compressor = Compressor::new(create(&output)?, schema.clone(), config)?;
    while compressor.require_more_iterations() {
        let limit = if compressor.require_full_pass() {
            usize::MAX
        } else {
            SAMPLE_ROWS
        };
        for (index, line) in open(input)?.lines().take(limit).enumerate() {
            let line = line?;
            let tuple = parse_row(&line, &schema, &mut dictionaries, delimiter)
                .with_context(|| format!("{}:{}", input.display(), index + 1))?;
            compressor.read_tuple(&tuple)?;
        }
        compressor.end_of_data()?;
    }
    let tuples = compressor.tuples();
    compressor.finish()?.flush()?;
    write_dictionaries(&dictionaries, create(&with_suffix(&output, "enums"))?)?;
    info!(tuples, output = %output.display(), "wrote compressed table");
    Ok(())
}

fn decompress(input: &Path, schema: Schema, delimiter: char) -> Result<()> {
    let output = with_suffix(input, "rec");
    let dictionaries = read_dictionaries(open(&with_suffix(input, "enums"))?, schema.len())?;
    let mut decompressor = Decompressor::new(open(input)?, schema)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let mut writer = create(&output)?;
    while decompressor.has_next() {
        let tuple = decompressor.read_next_tuple()?;
        writeln!(writer, "{}", format_row(&tuple, &dictionaries, delimiter)?)?;
    }
    decompressor.verify_end()?;
    writer.flush()?;
    info!(
        tuples = decompressor.tuple_count(),
        output = %output.display(),
        "wrote decompressed table"
    );
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let text = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("cannot read {}", cli.config.display()))?;
    let (schema, config) =
        parse_config(&text).with_context(|| format!("in {}", cli.config.display()))?;
    let delimiter = if cli.delimiter == 1 { '|' } else { ',' };

    if cli.compress {
        compress(&cli.input, schema, &config, delimiter)
    } else {
        decompress(&cli.input, schema, delimiter)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}
