//! Terminal output: a spinner while a pipeline runs and coloured summaries.
//!
//! Uses `indicatif` for the spinner and `console` for styling.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::RunReport;
use crate::store::StoreStats;

/// Spinner shown while one trigger runs.
pub struct RunProgress {
    // Spinner shown until the run finishes.
    pb: ProgressBar,
    // Success lines.
    green: Style,
    // Failure lines.
    red: Style,
    // Runs stopped at the deadline.
    yellow: Style,
}

impl RunProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Stops the spinner and prints the processed count.
    pub fn complete(&self, report: &RunReport) {
        self.pb.finish_and_clear();
        let interrupted = report.list_sync.as_ref().is_some_and(|s| s.interrupted)
            || report.backfill.as_ref().is_some_and(|b| b.interrupted);
        if interrupted {
            println!(
                "  {} {} processed, stopped at the run deadline",
                self.yellow.apply_to("!"),
                report.processed()
            );
        } else {
            println!("  {} {} processed", self.green.apply_to("✓"), report.processed());
        }
    }

    /// Stops the spinner and prints a generic failure line.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.red.apply_to("✗"));
    }

    /// Prints the run report as pretty JSON.
    pub fn print_report(&self, report: &RunReport) {
        println!();
        println!("{}", self.green.apply_to("─── Run Report ───"));
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
    }
}

pub fn print_stats(stats: &StoreStats) {
    let bold = Style::new().bold();
    println!("{} {}", bold.apply_to("total       "), stats.total);
    println!("{} {}", bold.apply_to("active      "), stats.active);
    println!("{} {}", bold.apply_to("needs detail"), stats.needs_detail);
}
