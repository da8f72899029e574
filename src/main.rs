use std::{
   path::{Path, PathBuf},
   sync::{
      Arc,
      atomic::{AtomicU64, Ordering},
   },
   thread,
   time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use idxsync::{
   ChunkEnumerator, Error, Result, Token, TokenManager,
   chunk::{ChunkIngestor, FileManifest, load_manifest_file},
   config,
   task::DistributorOptions,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for idxsync
#[derive(Parser)]
#[command(name = "idxsync")]
#[command(about = "Parallel chunk ingestion with token quiescence tracking")]
#[command(version)]
struct Cli {
   #[command(subcommand)]
   command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Ingest the chunk files listed in a manifest")]
   Ingest {
      #[arg(help = "Manifest file, one chunk path per line")]
      manifest: PathBuf,

      #[arg(short = 't', long, env = "IDXSYNC_THREADS", help = "Worker threads (default: auto)")]
      threads: Option<usize>,

      #[arg(long, help = "Copy every ingested chunk into this directory")]
      copy_to: Option<PathBuf>,
   },

   #[command(about = "Print the effective configuration")]
   Config,
}

fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli) {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

fn run(cli: Cli) -> Result<()> {
   match cli.command {
      Cmd::Ingest { manifest, threads, copy_to } => ingest(&manifest, threads, copy_to),
      Cmd::Config => {
         let cfg = config::Config::try_load()?;
         print!("{}", cfg.to_toml()?);
         Ok(())
      },
   }
}

/// Running totals over every ingested chunk.
#[derive(Default)]
struct IngestStats {
   chunks: AtomicU64,
   bytes:  AtomicU64,
   lines:  AtomicU64,
}

impl ChunkIngestor for IngestStats {
   fn ingest_chunk(&self, _token: &Token, path: &Path, data: &[u8]) -> Result<()> {
      if std::str::from_utf8(data).is_err() {
         return Err(Error::Ingest { path: path.to_path_buf(), reason: "not valid utf-8".into() });
      }
      let lines = data.iter().filter(|&&b| b == b'\n').count() as u64;
      self.chunks.fetch_add(1, Ordering::Relaxed);
      self.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
      self.lines.fetch_add(lines, Ordering::Relaxed);
      Ok(())
   }
}

fn ingest(manifest_path: &Path, threads: Option<usize>, copy_to: Option<PathBuf>) -> Result<()> {
   let cfg = config::get();
   let paths = load_manifest_file(manifest_path)?;
   let thread_count = cfg.ingest_threads(threads);
   let tokens = TokenManager::new();

   let mut manifest = FileManifest::new(paths, IngestStats::default(), Arc::clone(&tokens));
   if let Some(dir) = copy_to {
      manifest = manifest.with_copy_dir(dir);
   }
   let manifest = Arc::new(manifest);

   let start = Instant::now();
   let options = DistributorOptions {
      thread_name: "chunk".to_string(),
      stack_size:  cfg.effective_thread_stack_bytes(),
   };
   let enumerator = ChunkEnumerator::with_options(manifest.clone(), thread_count, &options)?;

   let poll = Duration::from_millis(cfg.wait_poll_ms.max(1));
   while !enumerator.is_complete() {
      tracing::info!(
         processed = enumerator.processed_chunks(),
         total = enumerator.chunk_count(),
         in_flight = tokens.in_flight_count(),
         "ingesting"
      );
      thread::sleep(poll);
   }
   let outcome = enumerator.wait_for_completion();

   // Everything ingested so far is now safe for maintenance to act on.
   let tracker = tokens.start_tracker();
   tracker.wait_for_completion();
   tokens.shutdown();

   let stats = manifest.ingestor();
   println!(
      "ingested {} of {} chunks ({} bytes, {} lines) on {} threads in {:.2?}; quiescent at serial {}",
      stats.chunks.load(Ordering::Relaxed),
      enumerator.chunk_count(),
      stats.bytes.load(Ordering::Relaxed),
      stats.lines.load(Ordering::Relaxed),
      thread_count,
      start.elapsed(),
      tracker.cutoff_serial_number(),
   );

   outcome
}
