//! Progress bars for sync runs.

use colored::Colorize;
use declarative::{ChangeEvent, NodeResult, Phase, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar per execution phase; failures are printed above the bar.
pub struct BarProgress {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl BarProgress {
    pub fn new(hidden: bool) -> Self {
        Self { bar: None, hidden }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

impl ProgressCallback for BarProgress {
    fn on_graph_start(&mut self, phase: Phase, count: usize) {
        let bar = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(count as u64)
        };
        bar.set_style(Self::style());
        bar.set_prefix(phase.to_string());
        self.bar = Some(bar);
    }

    fn on_node_start(&mut self, event: &ChangeEvent) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} {}", event.kind, event.identity));
        }
    }

    fn on_node_complete(&mut self, result: &NodeResult) {
        let Some(bar) = &self.bar else {
            return;
        };
        bar.inc(1);
        if let Some(err) = result.error()
            && !err.is_cancelled()
        {
            bar.suspend(|| {
                eprintln!(
                    "  {} {} {} {}: {err}",
                    "✗".red(),
                    result.op,
                    result.kind,
                    result.identity
                );
            });
        }
    }

    fn on_graph_complete(&mut self, _phase: Phase) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
