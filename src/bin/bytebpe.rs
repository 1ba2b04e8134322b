use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bytebpe::config::{IngestConfig, TokenizerConfig, TrainerConfig, END_OF_TEXT};
use bytebpe::model::{BpeModel, TokenId};
use bytebpe::serialization::{self, MERGES_FILE, VOCAB_FILE};
use bytebpe::{Tokenizer, Trainer};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use serde_json::json;

const DEFAULT_OUTPUT: &str = "model";

#[derive(Parser, Debug)]
#[command(author, version, about = "Byte-level BPE toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train vocab.json and merges.txt from UTF-8 text files
    Train(TrainArgs),
    /// Encode text files with a trained model
    Encode(EncodeArgs),
    /// Decode token ids back into text
    Decode(DecodeArgs),
    /// Inspect a model directory
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory receiving vocab.json and merges.txt
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Target vocabulary size (bytes + special tokens + merges)
    #[arg(long, value_name = "SIZE")]
    vocab_size: Option<usize>,

    /// Minimum frequency for merges
    #[arg(long, value_name = "COUNT")]
    min_frequency: Option<usize>,

    /// Stop after this many merges
    #[arg(long, value_name = "COUNT")]
    max_merges: Option<usize>,

    /// Special tokens to reserve (repeat flag; replaces <|endoftext|>)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,

    /// Write training metrics as JSON
    #[arg(long, value_name = "PATH")]
    metrics: Option<PathBuf>,

    /// Disable per-iteration logging/progress
    #[arg(long)]
    no_progress: bool,

    /// Limit Rayon worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Disable recursive directory traversal
    #[arg(long)]
    no_recursive: bool,

    /// Follow symlinks during traversal
    #[arg(long)]
    follow_symlinks: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Directory containing vocab.json and merges.txt
    #[arg(short = 'm', long, value_name = "DIR")]
    model: PathBuf,

    /// Special tokens (repeat flag; defaults to <|endoftext|> when the vocabulary has it)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Text files to encode
    #[arg(required_unless_present = "text")]
    inputs: Vec<PathBuf>,

    /// Encode this string instead of files
    #[arg(long, conflicts_with = "inputs")]
    text: Option<String>,

    /// Emit JSON lines instead of human-readable output
    #[arg(long)]
    json: bool,

    /// Pretokens kept in the encode cache (0 disables it)
    #[arg(long, value_name = "COUNT")]
    cache_capacity: Option<usize>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Path to whitespace separated token ids
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Token ids to decode when --input is omitted
    #[arg(value_name = "ID", required_unless_present = "input")]
    tokens: Vec<TokenId>,

    /// Output file for decoded text (defaults to stdout)
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Directory containing vocab.json and merges.txt
    #[arg(short = 'm', long, value_name = "DIR")]
    model: PathBuf,

    /// Emit machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Encode(args) => run_encode(args),
        Commands::Decode(args) => run_decode(args),
        Commands::Info(args) => run_info(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = match (quiet, verbose) {
        (0, 0) => LevelFilter::Info,
        (0, 1) => LevelFilter::Debug,
        (0, _) => LevelFilter::Trace,
        (1, _) => LevelFilter::Warn,
        _ => LevelFilter::Error,
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn run_train(args: TrainArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("unable to configure Rayon thread pool")?;
    }

    let mut cfg = TrainerConfig::builder();
    if let Some(vocab_size) = args.vocab_size {
        cfg = cfg.target_vocab_size(vocab_size);
    }
    if let Some(min_frequency) = args.min_frequency {
        cfg = cfg.min_frequency(min_frequency);
    }
    if !args.special_tokens.is_empty() {
        cfg = cfg.special_tokens(args.special_tokens.clone());
    }
    cfg = cfg.max_merges(args.max_merges);
    cfg = cfg.show_progress(!args.no_progress);
    let trainer_cfg = cfg.build()?;

    let ingest_cfg = IngestConfig::builder()
        .recursive(!args.no_recursive)
        .follow_symlinks(args.follow_symlinks)
        .build();
    let documents = bytebpe::corpus::load_text_corpus(&args.inputs, &ingest_cfg)
        .with_context(|| "failed to load text corpus")?;
    let corpus_bytes: usize = documents.iter().map(String::len).sum();
    info!(
        "loaded {} documents totalling {:.2} MiB",
        documents.len(),
        bytes_to_mebibytes(corpus_bytes)
    );

    let spinner = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} training merges... {elapsed}")
            .context("invalid progress template")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    };

    let trainer = Trainer::new(trainer_cfg);
    let start = Instant::now();
    let artifacts = trainer.train_from_texts(&documents)?;
    drop(documents);
    if let Some(pb) = spinner {
        pb.finish_with_message("training complete");
    }

    let elapsed = start.elapsed();
    let merges = artifacts.model.merges().len();
    let vocab_size = artifacts.model.vocab_size();

    artifacts
        .model
        .save(&args.output)
        .with_context(|| format!("failed to save model to {}", args.output.display()))?;
    if let Some(path) = &args.metrics {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &artifacts.metrics)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
        writer.flush()?;
    }

    info!(
        "training complete: merges={merges} vocab={vocab_size} duration={elapsed:.2?} stop={:?}",
        artifacts.metrics.stop_reason
    );
    println!(
        "wrote vocab {} ({} merges) to {}",
        vocab_size,
        merges,
        args.output.display()
    );
    Ok(())
}

fn load_tokenizer(args: &ModelArgs, cache_capacity: Option<usize>) -> Result<Tokenizer> {
    let model = BpeModel::load(&args.model, Vec::new())
        .with_context(|| format!("failed to load model from {}", args.model.display()))?;
    let special_tokens = if args.special_tokens.is_empty() {
        if model.vocab().token_id(END_OF_TEXT.as_bytes()).is_some() {
            vec![END_OF_TEXT.to_string()]
        } else {
            Vec::new()
        }
    } else {
        args.special_tokens.clone()
    };
    let mut config = TokenizerConfig::with_special_tokens(special_tokens);
    if let Some(capacity) = cache_capacity {
        config = config.cache_capacity(capacity);
    }
    Ok(model.tokenizer_with(config)?)
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    let tokenizer = load_tokenizer(&args.model, args.cache_capacity)?;

    if let Some(text) = &args.text {
        let tokens = tokenizer.encode(text)?;
        return emit_tokens("<text>", &tokens, args.json);
    }

    for path in &args.inputs {
        let tokens = encode_file(&tokenizer, path)?;
        emit_tokens(&path.display().to_string(), &tokens, args.json)?;
    }
    Ok(())
}

/// Streams a file line by line through the tokenizer.
fn encode_file(tokenizer: &Tokenizer, path: &Path) -> Result<Vec<TokenId>> {
    let file =
        File::open(path).with_context(|| format!("failed to open input {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut read_error = None;
    let lines = std::iter::from_fn(|| {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(err) => {
                read_error = Some(err);
                None
            }
        }
    });
    let tokens = tokenizer
        .encode_iter(lines)
        .collect::<bytebpe::Result<Vec<_>>>();
    if let Some(err) = read_error {
        return Err(err).with_context(|| format!("failed to read {}", path.display()));
    }
    tokens.with_context(|| format!("failed to encode {}", path.display()))
}

fn emit_tokens(label: &str, tokens: &[TokenId], as_json: bool) -> Result<()> {
    if as_json {
        let record = json!({ "path": label, "tokens": tokens });
        println!("{}", serde_json::to_string(&record)?);
    } else {
        let rendered: Vec<String> = tokens.iter().map(ToString::to_string).collect();
        println!("{label}:\t{}", rendered.join(" "));
    }
    Ok(())
}

fn run_decode(args: DecodeArgs) -> Result<()> {
    let tokenizer = load_tokenizer(&args.model, Some(0))?;

    let tokens = if let Some(input_path) = &args.input {
        let contents = fs::read_to_string(input_path)
            .with_context(|| format!("failed to read {}", input_path.display()))?;
        parse_token_list(&contents)?
    } else {
        args.tokens
    };

    let unknown = tokens
        .iter()
        .filter(|&&id| tokenizer.vocab().token_bytes(id).is_none())
        .count();
    if unknown > 0 {
        warn!("{unknown} token ids are not in the vocabulary and were dropped");
    }
    let bytes = tokenizer.decode_bytes(&tokens);

    if let Some(path) = &args.output {
        fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {} bytes to {}", bytes.len(), path.display());
    } else {
        let text = String::from_utf8_lossy(&bytes);
        io::stdout().write_all(text.as_bytes())?;
    }
    Ok(())
}

fn parse_token_list(contents: &str) -> Result<Vec<TokenId>> {
    contents
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .parse::<TokenId>()
                .with_context(|| format!("invalid token id {field:?}"))
        })
        .collect()
}

fn run_info(args: InfoArgs) -> Result<()> {
    let vocab_path = args.model.join(VOCAB_FILE);
    let merges_path = args.model.join(MERGES_FILE);
    if !vocab_path.is_file() || !merges_path.is_file() {
        bail!(
            "{} must contain {VOCAB_FILE} and {MERGES_FILE}",
            args.model.display()
        );
    }
    let vocab = serialization::load_vocab(&vocab_path)
        .with_context(|| format!("failed to load {}", vocab_path.display()))?;
    let merges = serialization::load_merges(&merges_path)
        .with_context(|| format!("failed to load {}", merges_path.display()))?;

    let longest = vocab
        .entries()
        .into_iter()
        .map(|(_, bytes)| bytes.len())
        .max()
        .unwrap_or(0);
    let summary = json!({
        "path": args.model.display().to_string(),
        "vocab_size": vocab.len(),
        "merges": merges.rules.len(),
        "skipped_merge_lines": merges.skipped.len(),
        "longest_token_bytes": longest,
        "has_end_of_text": vocab.token_id(END_OF_TEXT.as_bytes()).is_some(),
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Vocab size   : {}", vocab.len());
        println!("Merges       : {}", merges.rules.len());
        println!("Skipped lines: {}", merges.skipped.len());
        println!("Longest token: {longest} bytes");
        for skipped in &merges.skipped {
            println!("  line {}: {}", skipped.line, skipped.reason);
        }
    }
    Ok(())
}

fn bytes_to_mebibytes(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
