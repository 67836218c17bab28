//! Directory walk and per-file mining loop

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

use super::output::OutputWriter;
use super::report::RunReport;
use crate::accounting::{CostTracker, RateLimiter};
use crate::config::MinerConfig;
use crate::error::{Error, Result};
use crate::generation::{CompletionProvider, Generator, ModelCaller, RetryPolicy, Verifier};
use crate::ingestion::{Extractor, TextChunker};
use crate::types::QaPair;

/// Owns every stateful piece of a run: limiter, cost tracker and output buffer
pub struct Miner {
    config: MinerConfig,
    provider: Box<dyn CompletionProvider>,
    extractor: Extractor,
    chunker: TextChunker,
    limiter: RateLimiter,
    tracker: CostTracker,
    cancel: Arc<AtomicBool>,
}

/// Borrowed stages shared by every file in a run
struct Stages<'a> {
    extractor: &'a Extractor,
    chunker: &'a TextChunker,
    generator: Generator<'a>,
    verifier: Option<Verifier<'a>>,
    cancel: &'a AtomicBool,
}

/// Mutable state threaded through the loop
struct RunState<'a> {
    limiter: &'a mut RateLimiter,
    tracker: &'a mut CostTracker,
    report: RunReport,
    pairs: Vec<QaPair>,
}

impl Miner {
    /// Build a miner from a validated configuration and a backend
    pub fn new(config: MinerConfig, provider: Box<dyn CompletionProvider>) -> Result<Self> {
        config.validate()?;
        let chunker = TextChunker::new(&config.chunking)?;
        let extractor = Extractor::new(config.extraction.clone());
        let limiter = RateLimiter::new(config.rate_limit.resolve(config.backend));
        let tracker = CostTracker::from_config(&config.pricing);

        Ok(Self {
            config,
            provider,
            extractor,
            chunker,
            limiter,
            tracker,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the run at the next file or chunk boundary
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Files to mine, in file-name order, hidden entries excluded
    pub fn discover_files(&self, exclude: Option<&Path>) -> Vec<PathBuf> {
        discover_files(&self.config.source, self.config.recursive, exclude)
    }

    /// Mine every file and write the dataset
    ///
    /// Per-file and per-chunk failures are counted in the report. Only an
    /// unwritable output is returned as an error. An interrupted run writes
    /// nothing and returns a report with `interrupted` set.
    pub async fn run(self) -> Result<RunReport> {
        let started = Instant::now();
        let output_path = self.config.resolved_output();
        let writer = OutputWriter::prepare(&output_path)?;
        let files = self.discover_files(Some(writer.path()));

        let Self {
            config,
            provider,
            extractor,
            chunker,
            mut limiter,
            mut tracker,
            cancel,
        } = self;

        tracing::info!(
            "Mining {} file(s) from {} with {} model '{}'{}",
            files.len(),
            config.source.display(),
            provider.backend().name(),
            config.model,
            if config.verify { " (verification on)" } else { "" }
        );

        let caller = ModelCaller::new(
            provider.as_ref(),
            config.model.clone(),
            RetryPolicy::from_config(&config.retry),
        );
        let stages = Stages {
            extractor: &extractor,
            chunker: &chunker,
            generator: Generator::new(&caller),
            verifier: config.verify.then(|| Verifier::new(&caller)),
            cancel: &cancel,
        };
        let mut state = RunState {
            limiter: &mut limiter,
            tracker: &mut tracker,
            report: RunReport::default(),
            pairs: Vec::new(),
        };

        let progress = progress_bar(files.len(), config.show_progress);
        for path in &files {
            if stages.cancelled() {
                state.report.interrupted = true;
                break;
            }
            progress.set_message(display_name(path));
            stages.mine_file(path, &mut state).await;
            progress.inc(1);
        }
        progress.finish_and_clear();

        let RunState {
            mut report, pairs, ..
        } = state;
        report.interrupted |= stages.cancelled();
        report.cost = tracker.summary(pairs.len());

        if report.interrupted {
            tracing::warn!("Interrupted; {} pair(s) discarded, no output written", pairs.len());
        } else if pairs.is_empty() {
            tracing::warn!(
                "No pairs generated; leaving {} untouched",
                writer.path().display()
            );
        } else {
            writer.write(&pairs)?;
            report.output = Some(writer.path().to_path_buf());
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            "Finished in {:.1}s: {} pair(s), {} token(s), estimated cost ${:.4}",
            report.elapsed.as_secs_f64(),
            report.pairs_generated,
            report.cost.total_tokens(),
            report.cost.total_cost
        );
        Ok(report)
    }
}

impl Stages<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Extract, chunk, generate and verify one file; failures are recorded, never raised
    async fn mine_file(&self, path: &Path, state: &mut RunState<'_>) {
        let document = match self.extractor.extract(path) {
            Ok(document) => document,
            Err(e) => {
                let reason = match &e {
                    Error::UnsupportedFormat(ext) => format!("unsupported file type {}", ext),
                    Error::Extraction { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                tracing::warn!("Skipping {}: {}", path.display(), reason);
                state.report.skip(path, reason);
                return;
            }
        };

        let chunks = self.chunker.chunk_document(&document);
        tracing::info!(
            "{}: {} segment(s), {} chars, {} chunk(s)",
            document.filename(),
            document.segments.len(),
            document.char_count(),
            chunks.len()
        );
        state.report.files_processed += 1;

        for chunk in &chunks {
            if self.cancelled() {
                return;
            }

            let pairs = match self
                .generator
                .generate(chunk, state.limiter, state.tracker)
                .await
            {
                Ok(pairs) => pairs,
                Err(e) => {
                    tracing::error!(
                        "Chunk {} of {} failed: {}",
                        chunk.index,
                        chunk.source.describe(),
                        e
                    );
                    state.report.chunks_failed += 1;
                    continue;
                }
            };
            state.report.chunks_processed += 1;

            let pairs = match &self.verifier {
                Some(verifier) if !pairs.is_empty() => {
                    let pairs = verifier
                        .verify_all(&chunk.content, pairs, state.limiter, state.tracker)
                        .await;
                    for pair in &pairs {
                        match &pair.verification {
                            Some(verification) => state.report.count_verdict(verification.status),
                            None => state.report.verification_failed += 1,
                        }
                    }
                    pairs
                }
                _ => pairs,
            };

            tracing::debug!(
                "Chunk {} of {} (bytes {}..{}) produced {} pair(s)",
                chunk.index,
                chunk.source.describe(),
                chunk.byte_range.start,
                chunk.byte_range.end,
                pairs.len()
            );
            state.report.pairs_generated += pairs.len();
            state.pairs.extend(pairs);
        }
    }
}

/// Walk `source`, skipping hidden entries and `exclude`
pub fn discover_files(source: &Path, recursive: bool, exclude: Option<&Path>) -> Vec<PathBuf> {
    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let walker = WalkDir::new(source)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cannot read directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(exclude) = &exclude {
            if entry.path().canonicalize().ok().as_ref() == Some(exclude) {
                continue;
            }
        }
        files.push(entry.into_path());
    }
    files
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.starts_with('.'))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}
