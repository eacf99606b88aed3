// SPDX-License-Identifier: MIT OR Apache-2.0
//! nj CLI binary - run a JSONPath query against a JSON file.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use nj_core::trace::Tracer;
use nj_engine::{Engine, EngineConfig};
use nj_index::chunk::ChunkConfig;
use nj_query::{Program, Query};

const BENCH_WARMUP_ITERS: u32 = 3;
const BENCH_ITERS: u32 = 10;

#[derive(Parser)]
#[command(name = "nj")]
#[command(version, about = "Streaming JSONPath queries over large JSON documents")]
struct Args {
    /// JSON file to query
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// JSONPath query, e.g. $.items[*].name
    #[arg(value_name = "QUERY")]
    query: String,

    /// Run a warmup-and-measure harness instead of printing matches
    #[arg(long)]
    bench: bool,

    /// Record per-stage timings and write them as CSV
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "trace.csv")]
    trace: Option<PathBuf>,

    /// Chunk size in bytes (power of two, multiple of 64)
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<String>,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let doc = fs::read(&args.file)
        .with_context(|| format!("could not read {}", args.file.display()))?;
    let doc_len = doc.len();

    let query = Query::parse(&args.query)?;
    let program = Program::compile(&query)?;

    let config = engine_config(args.chunk_size.as_deref())?;
    let tracer = if args.trace.is_some() {
        Tracer::enabled()
    } else {
        Tracer::disabled()
    };
    let mut engine = Engine::with_config(program, doc, config, tracer.clone())?;

    if args.bench {
        run_bench(&mut engine, doc_len)?;
    } else {
        print_matches(&mut engine)?;
    }

    if let Some(path) = &args.trace {
        fs::write(path, tracer.export_csv())
            .with_context(|| format!("could not write {}", path.display()))?;
    }
    Ok(())
}

fn print_matches(engine: &mut Engine) -> anyhow::Result<()> {
    let results = engine.run()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for span in &results {
        out.write_all(&engine.doc()[span.start..=span.end])?;
        out.write_all(b"\n")?;
    }
    eprintln!("matches: {}", results.count());
    Ok(())
}

fn run_bench(engine: &mut Engine, doc_len: usize) -> anyhow::Result<()> {
    for _ in 0..BENCH_WARMUP_ITERS {
        engine.run()?;
    }

    let mut total = Duration::ZERO;
    let mut matches = 0;
    for _ in 0..BENCH_ITERS {
        let start = Instant::now();
        let results = engine.run()?;
        total += start.elapsed();
        matches = results.count();
    }
    let avg = total / BENCH_ITERS;

    let gigabytes = doc_len as f64 / 1e9;
    let throughput = gigabytes / avg.as_secs_f64();
    println!("size: {gigabytes:.3} GB");
    println!("matches: {matches}");
    println!("avg: {avg:?} over {BENCH_ITERS} runs ({BENCH_WARMUP_ITERS} warmup)");
    println!("GB/s: {throughput:.3}");
    Ok(())
}

fn engine_config(chunk_size: Option<&str>) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::default();
    if let Some(text) = chunk_size {
        let Some(bytes) = parse_bytes(text) else {
            bail!("invalid --chunk-size value: {text}");
        };
        let block = ChunkConfig::DEFAULT_BLOCK_SIZE.min(bytes);
        config.chunk = ChunkConfig::new(bytes, block)?;
    }
    Ok(config)
}

/// Parse a byte count with an optional `k`/`m`/`g` suffix.
fn parse_bytes(input: &str) -> Option<usize> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let number: usize = trimmed[..split].parse().ok()?;
    match &trimmed[split..] {
        "" => Some(number),
        "k" | "K" => Some(number * 1024),
        "m" | "M" => Some(number * 1024 * 1024),
        "g" | "G" => Some(number * 1024 * 1024 * 1024),
        _ => None,
    }
}
