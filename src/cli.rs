// Command-line front end for oxisync.
//
// `signature` generates a signature from a basis file or stdin, `inspect`
// loads one or more signature files and reports their header and block
// statistics, `config` prints build details.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::generate::{GenerateOptions, generate_signature};
use crate::io::{LoadStats, load_signature_file};
use crate::map::{CHUNK_SIZE, MAX_MAP_SIZE};
use crate::signature::event::Hex;
use crate::signature::index::{MAX_STRONG_SUM_LEN, SigMagic, SignatureIndex};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_BLOCK_LEN: u64 = 2048;
const DEFAULT_STRONG_LEN: usize = 32;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

fn parse_block_len(s: &str) -> Result<u32, String> {
    let n = parse_byte_size(s)?;
    if n == 0 {
        return Err("block length must be at least 1".into());
    }
    i32::try_from(n)
        .map(|n| n as u32)
        .map_err(|_| format!("block length too large: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// rsync-style signature generator and inspector.
#[derive(Parser, Debug)]
#[command(
    name = "oxisync",
    version,
    about = "rsync-style signature generator and inspector",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (errors only).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output results as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Generate the signature of a basis file.
    Signature(SignatureArgs),
    /// Load signature files and print their contents.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct SignatureArgs {
    /// Block length (supports K/M/G suffix).
    #[arg(long = "block-len", short = 'b', value_parser = parse_block_len, default_value_t = DEFAULT_BLOCK_LEN as u32)]
    block_len: u32,

    /// Strong checksum bytes kept per block.
    #[arg(long = "strong-len", short = 'S', value_parser = clap::value_parser!(u8).range(0..=MAX_STRONG_SUM_LEN as i64), default_value_t = DEFAULT_STRONG_LEN as u8)]
    strong_len: u8,

    /// Write the signature to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Basis file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    basis: Option<PathBuf>,

    /// Signature output file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    sig: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// List every block record.
    #[arg(long)]
    blocks: bool,

    /// Signature files.
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Signature,
    Inspect,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    block_len: u32,
    strong_len: usize,
    list_blocks: bool,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    sig_files: Vec<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        use_stdout: false,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        block_len: DEFAULT_BLOCK_LEN as u32,
        strong_len: DEFAULT_STRONG_LEN,
        list_blocks: false,
        input_file: None,
        output_file: None,
        sig_files: Vec::new(),
    };

    match cli.command {
        Cmd::Signature(args) => {
            opts.command = Command::Signature;
            opts.use_stdout = args.stdout;
            opts.block_len = args.block_len;
            opts.strong_len = usize::from(args.strong_len);
            opts.input_file = args.basis;
            opts.output_file = args.sig;
        }
        Cmd::Inspect(args) => {
            opts.command = Command::Inspect;
            opts.list_blocks = args.blocks;
            opts.sig_files = args.files;
        }
        Cmd::Config => {}
    }
    opts
}

/// Parse CLI arguments without running a command.
#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxisync".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("oxisync version {version} (Rust), Copyright (C) oxisync contributors");
    eprintln!("Licensed under the MIT License");

    let adler32 = cfg!(feature = "adler32") as u8;
    let sha256 = cfg!(feature = "sha256") as u8;
    let parallel = cfg!(feature = "parallel") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("ADLER32_SIMD={adler32}");
    eprintln!("SHA256={sha256}");
    eprintln!("PARALLEL={parallel}");
    eprintln!("DEFAULT_BLOCK_LEN={DEFAULT_BLOCK_LEN}");
    eprintln!("DEFAULT_STRONG_LEN={DEFAULT_STRONG_LEN}");
    eprintln!("MAX_STRONG_SUM_LEN={MAX_STRONG_SUM_LEN}");
    eprintln!("MAP_CHUNK_SIZE={CHUNK_SIZE}");
    eprintln!("MAP_MAX_SIZE={MAX_MAP_SIZE}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Signature command
// ---------------------------------------------------------------------------

fn cmd_signature(opts: &Options) -> i32 {
    let basis: Box<dyn Read> = match &opts.input_file {
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(f),
            Err(e) => {
                eprintln!("oxisync: basis file: {}: {e}", path.display());
                return 1;
            }
        },
        None => Box::new(io::stdin().lock()),
    };

    let output: Box<dyn Write> = match opts.output_file.as_ref() {
        Some(path) if !opts.use_stdout => {
            if path.exists() && !opts.force {
                eprintln!(
                    "oxisync: output file exists, use -f to overwrite: {}",
                    path.display()
                );
                return 1;
            }
            match File::create(path) {
                Ok(f) => Box::new(BufWriter::with_capacity(BUF_SIZE, f)),
                Err(e) => {
                    eprintln!("oxisync: output file: {}: {e}", path.display());
                    return 1;
                }
            }
        }
        _ => Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock())),
    };

    let gen_opts = GenerateOptions {
        magic: SigMagic::Adler32Sha256.into(),
        block_len: opts.block_len,
        strong_len: opts.strong_len,
    };

    let (mut output, stats) = match generate_signature(basis, output, gen_opts) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("oxisync: signature error: {e}");
            return 1;
        }
    };

    if let Err(e) = output.flush() {
        eprintln!("oxisync: write flush error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxisync: signature: basis size: {}, blocks: {}, signature size: {}",
            stats.basis_bytes, stats.blocks, stats.sig_bytes
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "signature",
            "block_len": opts.block_len,
            "strong_len": opts.strong_len,
            "basis_size": stats.basis_bytes,
            "blocks": stats.blocks,
            "signature_size": stats.sig_bytes,
            "reads": stats.map.reads,
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

type Loaded = Result<(SignatureIndex, LoadStats), String>;

fn load_one(path: &Path) -> Loaded {
    load_signature_file(path).map_err(|e| format!("{}: {e}", path.display()))
}

#[cfg(feature = "parallel")]
fn load_all(paths: &[PathBuf]) -> Vec<Loaded> {
    use rayon::prelude::*;
    paths.par_iter().map(|p| load_one(p)).collect()
}

#[cfg(not(feature = "parallel"))]
fn load_all(paths: &[PathBuf]) -> Vec<Loaded> {
    paths.iter().map(|p| load_one(p)).collect()
}

fn format_name(magic: u32) -> &'static str {
    SigMagic::from_u32(magic).map_or("unknown", SigMagic::name)
}

fn print_signature(path: &Path, index: &SignatureIndex, stats: &LoadStats, list_blocks: bool) {
    println!("file:                {}", path.display());
    println!(
        "format:              {:#010x} ({})",
        stats.magic,
        format_name(stats.magic)
    );
    println!("block length:        {}", stats.block_len);
    println!("strong sum length:   {}", stats.strong_len);
    println!("blocks:              {}", stats.blocks);
    println!("distinct weak sums:  {}", index.distinct_weak());
    println!("signature size:      {}", stats.sig_bytes);

    if list_blocks {
        let block_len = index.block_len();
        for b in index.iter() {
            println!(
                "  {:>8}  {:>14}  {:08x}  {}",
                b.index,
                b.offset(block_len),
                b.weak,
                Hex(b.strong)
            );
        }
    }
}

fn signature_json(
    path: &Path,
    index: &SignatureIndex,
    stats: &LoadStats,
    list_blocks: bool,
) -> serde_json::Value {
    let mut json = serde_json::json!({
        "file": path.display().to_string(),
        "magic": stats.magic,
        "format": format_name(stats.magic),
        "block_len": stats.block_len,
        "strong_len": stats.strong_len,
        "blocks": stats.blocks,
        "distinct_weak": index.distinct_weak(),
        "signature_size": stats.sig_bytes,
    });
    if list_blocks {
        let blocks: Vec<serde_json::Value> = index
            .iter()
            .map(|b| {
                serde_json::json!({
                    "index": b.index,
                    "weak": b.weak,
                    "strong": Hex(b.strong).to_string(),
                })
            })
            .collect();
        json["block_list"] = serde_json::Value::Array(blocks);
    }
    json
}

fn cmd_inspect(opts: &Options) -> i32 {
    let results = load_all(&opts.sig_files);
    let mut exit_code = 0;
    let mut reports = Vec::new();

    for (i, (path, result)) in opts.sig_files.iter().zip(results).enumerate() {
        match result {
            Ok((index, stats)) => {
                if opts.json_output {
                    reports.push(signature_json(path, &index, &stats, opts.list_blocks));
                } else {
                    if i > 0 {
                        println!();
                    }
                    print_signature(path, &index, &stats, opts.list_blocks);
                }
                if opts.verbose > 1 && !opts.quiet {
                    eprintln!("oxisync: {}: {} reads", path.display(), stats.reads);
                }
            }
            Err(e) => {
                eprintln!("oxisync: {e}");
                exit_code = 1;
            }
        }
    }

    if opts.json_output {
        println!("{:#}", serde_json::Value::Array(reports));
    }

    exit_code
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn log_filter(opts: &Options) -> &'static str {
    if opts.quiet {
        return "error";
    }
    match opts.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

pub fn run() -> ! {
    let cli = Cli::parse();
    let mut opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&opts)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if opts.use_stdout
        && let Some(path) = opts.output_file.take()
        && !opts.quiet
    {
        eprintln!(
            "oxisync: warning: -c option overrides output filename: {}",
            path.display()
        );
    }

    let exit_code = match opts.command {
        Command::Signature => cmd_signature(&opts),
        Command::Inspect => cmd_inspect(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
