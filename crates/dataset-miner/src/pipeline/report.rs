//! End-of-run summary

use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use crate::accounting::CostSummary;
use crate::types::{OperationKind, VerificationStatus};

/// A file that produced no chunks, with the reason
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Counters collected by the driver
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub files_processed: usize,
    pub skipped: Vec<SkippedFile>,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub pairs_generated: usize,
    pub pairs_verified: usize,
    /// Pairs kept unverified because the verification call failed
    pub verification_failed: usize,
    pub verdicts: BTreeMap<VerificationStatus, usize>,
    pub cost: CostSummary,
    /// Where the dataset was written; `None` when nothing was written
    pub output: Option<PathBuf>,
    pub interrupted: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn files_skipped(&self) -> usize {
        self.skipped.len()
    }

    pub fn skip(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.skipped.push(SkippedFile {
            path: path.into(),
            reason: reason.into(),
        });
    }

    pub fn count_verdict(&mut self, status: VerificationStatus) {
        self.pairs_verified += 1;
        *self.verdicts.entry(status).or_default() += 1;
    }

    pub fn verdict_count(&self, status: VerificationStatus) -> usize {
        self.verdicts.get(&status).copied().unwrap_or(0)
    }

    /// Render the colored summary block
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let heading = |title: &str| style(title.to_string()).cyan().bold().to_string();

        let _ = writeln!(out, "{}", style(&rule).dim());
        let title = if self.interrupted {
            style("Mining interrupted").yellow().bold()
        } else {
            style("Mining complete").green().bold()
        };
        let _ = writeln!(out, "{} in {:.1}s", title, self.elapsed.as_secs_f64());
        let _ = writeln!(out, "{}", style(&rule).dim());

        let _ = writeln!(out, "{}", heading("Files"));
        let _ = writeln!(out, "  processed: {}", self.files_processed);
        let _ = writeln!(out, "  skipped:   {}", self.files_skipped());
        for skipped in &self.skipped {
            let _ = writeln!(
                out,
                "    {} {}",
                style(skipped.path.display()).yellow(),
                style(format!("({})", skipped.reason)).dim()
            );
        }

        let _ = writeln!(out, "{}", heading("Chunks"));
        let _ = writeln!(out, "  processed: {}", self.chunks_processed);
        let failed = if self.chunks_failed > 0 {
            style(self.chunks_failed).red().to_string()
        } else {
            self.chunks_failed.to_string()
        };
        let _ = writeln!(out, "  failed:    {}", failed);

        let _ = writeln!(out, "{}", heading("Pairs"));
        let _ = writeln!(out, "  generated: {}", self.pairs_generated);
        if self.pairs_verified > 0 || self.verification_failed > 0 {
            let _ = writeln!(out, "  verified:  {}", self.pairs_verified);
            if self.verification_failed > 0 {
                let _ = writeln!(
                    out,
                    "  {} {}",
                    style("unverified:").yellow(),
                    self.verification_failed
                );
            }
            for status in [
                VerificationStatus::Correct,
                VerificationStatus::Incorrect,
                VerificationStatus::Uncertain,
            ] {
                let count = self.verdict_count(status);
                let pct = if self.pairs_verified > 0 {
                    count as f64 * 100.0 / self.pairs_verified as f64
                } else {
                    0.0
                };
                let _ = writeln!(out, "    {:<10} {} ({:.1}%)", status, count, pct);
            }
        }

        let _ = writeln!(out, "{}", heading("Tokens & cost"));
        for kind in [OperationKind::Generate, OperationKind::Verify] {
            let op = self.cost.operation(kind);
            if op.calls == 0 {
                continue;
            }
            let _ = writeln!(
                out,
                "  {:<9} {} calls, {} in / {} out tokens, ${:.6}",
                format!("{}:", kind),
                op.calls,
                op.input_tokens,
                op.output_tokens,
                op.cost
            );
        }
        let _ = writeln!(
            out,
            "  total:    {} tokens ({} in / {} out)",
            self.cost.total_tokens(),
            self.cost.total_input_tokens,
            self.cost.total_output_tokens
        );
        let _ = writeln!(
            out,
            "  average cost per pair: ${:.6}",
            self.cost.average_cost_per_pair
        );
        if !self.cost.unpriced_models.is_empty() {
            let _ = writeln!(
                out,
                "  {}",
                style(format!(
                    "no pricing for: {} (counted as $0)",
                    self.cost.unpriced_models.join(", ")
                ))
                .yellow()
            );
        }
        let _ = writeln!(
            out,
            "  {} ${:.6}",
            style("grand total:").bold(),
            self.cost.total_cost
        );

        match &self.output {
            Some(path) => {
                let _ = writeln!(out, "{} {}", heading("Output"), path.display());
            }
            None => {
                let _ = writeln!(out, "{} {}", heading("Output"), style("not written").yellow());
            }
        }
        let _ = write!(out, "{}", style(&rule).dim());
        out
    }

    /// Print the summary to stderr
    pub fn print(&self) {
        eprintln!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_counts() {
        let mut report = RunReport::default();
        report.count_verdict(VerificationStatus::Correct);
        report.count_verdict(VerificationStatus::Correct);
        report.count_verdict(VerificationStatus::Uncertain);
        assert_eq!(report.pairs_verified, 3);
        assert_eq!(report.verdict_count(VerificationStatus::Correct), 2);
        assert_eq!(report.verdict_count(VerificationStatus::Incorrect), 0);
    }

    #[test]
    fn test_render_lists_skipped_files() {
        console::set_colors_enabled(false);
        let mut report = RunReport::default();
        report.files_processed = 1;
        report.skip("docs/broken.txt", "could not decode text");
        report.pairs_generated = 4;
        report.output = Some(PathBuf::from("mined_dataset.json"));

        let text = report.render();
        assert!(text.contains("skipped:   1"));
        assert!(text.contains("docs/broken.txt (could not decode text)"));
        assert!(text.contains("generated: 4"));
        assert!(text.contains("mined_dataset.json"));
        assert!(!text.contains("verified:"));
    }

    #[test]
    fn test_render_shows_failed_verifications() {
        console::set_colors_enabled(false);
        let mut report = RunReport::default();
        report.pairs_generated = 3;
        report.count_verdict(VerificationStatus::Correct);
        report.verification_failed = 2;

        let text = report.render();
        assert!(text.contains("verified:  1"));
        assert!(text.contains("unverified: 2"));
    }
}
