//! # CLI User Interface Module
//!
//! Progress bars, status lines, tables and prompts for the `gcharge` tool.

use anyhow::Result;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};
use gcharge_diagnostics::{GroupSummary, RunSummary, StepDefinition, StepProgress, StepStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

const STEP_TEMPLATE: &str = "{prefix:<24.bold} {bar:40.cyan/blue} {pos:>3}% {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.blue} {msg}";

fn step_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template(STEP_TEMPLATE)?
        .progress_chars("=> "))
}

/// One percentage bar per diagnostic step
#[derive(Clone)]
pub struct StepBars {
    multi: MultiProgress,
    bars: Vec<ProgressBar>,
}

impl StepBars {
    pub fn new(steps: &[StepDefinition]) -> Result<Self> {
        let multi = MultiProgress::new();
        let style = step_style()?;

        let bars = steps
            .iter()
            .map(|step| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(step.name.clone());
                bar.set_message("pending".dimmed().to_string());
                bar
            })
            .collect();

        Ok(Self { multi, bars })
    }

    /// Reflect a progress notification on the matching bar
    pub fn update(&self, progress: &StepProgress) {
        let Some(bar) = self.bars.get(progress.step_index) else {
            return;
        };

        bar.set_position(u64::from(progress.progress));
        match progress.status {
            StepStatus::Pending => {}
            StepStatus::Running => bar.set_message("running".bright_blue().to_string()),
            StepStatus::Completed => {
                bar.finish_with_message("passed".bright_green().to_string())
            }
            StepStatus::Failed => bar.abandon_with_message("failed".bright_red().to_string()),
        }
    }

    /// Print a line above the bars
    pub fn note(&self, message: &str) -> Result<()> {
        self.multi.println(message)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// One bar per target of a group run, spanning all of its steps
#[derive(Clone)]
pub struct TargetBars {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl TargetBars {
    pub fn new(targets: &[String], steps: &[StepDefinition]) -> Result<Self> {
        let multi = MultiProgress::new();
        let style = step_style()?;
        let length = steps.len() as u64 * 100;

        let bars = targets
            .iter()
            .map(|target| {
                let bar = multi.add(ProgressBar::new(length));
                bar.set_style(style.clone());
                bar.set_prefix(target.clone());
                bar.set_message("pending".dimmed().to_string());
                (target.clone(), bar)
            })
            .collect();

        Ok(Self { multi, bars })
    }

    pub fn update(&self, progress: &StepProgress) {
        let Some(bar) = self.bars.get(&progress.target_id) else {
            return;
        };
        bar.set_position(progress.step_index as u64 * 100 + u64::from(progress.progress));
        if progress.status == StepStatus::Running {
            bar.set_message(progress.step_id.clone());
        }
    }

    /// Close the target's bar with the run outcome
    pub fn finish(&self, summary: &RunSummary) {
        let Some(bar) = self.bars.get(&summary.target_id) else {
            return;
        };
        if summary.all_passed() {
            bar.finish_with_message("passed".bright_green().to_string());
        } else if summary.cancelled {
            bar.abandon_with_message("cancelled".bright_yellow().to_string());
        } else {
            bar.abandon_with_message(
                format!("{} failed", summary.failed_count())
                    .bright_red()
                    .to_string(),
            );
        }
    }

    /// Mark a target that was not started
    pub fn skip(&self, target: &str) {
        if let Some(bar) = self.bars.get(target) {
            bar.abandon_with_message("busy, skipped".bright_yellow().to_string());
        }
    }

    pub fn note(&self, message: &str) -> Result<()> {
        self.multi.println(message)?;
        Ok(())
    }
}

/// Status display utilities
#[derive(Default)]
pub struct StatusDisplay;

impl StatusDisplay {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "✔".bright_green().bold(), message.bright_green());
    }

    pub fn error(&self, message: &str) {
        println!("{} {}", "✘".bright_red().bold(), message.bright_red());
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", "!".bright_yellow().bold(), message.bright_yellow());
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", "›".bright_blue().bold(), message);
    }

    pub fn section_header(&self, title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_cyan());
    }

    pub fn key_value(&self, key: &str, value: &str) {
        println!("  {:<20} {}", format!("{}:", key).bright_white(), value.bright_yellow());
    }

    /// Display the outcome of a diagnostic run
    pub fn run_summary(&self, summary: &RunSummary) {
        self.section_header(&format!("Diagnostics for {}", summary.target_id));

        for result in &summary.results {
            let status = match result.status {
                StepStatus::Completed => "PASS".bright_green(),
                StepStatus::Failed => "FAIL".bright_red(),
                StepStatus::Running => "RUN ".bright_blue(),
                StepStatus::Pending => "WAIT".dimmed(),
            };
            println!(
                "  {} {:<24} {}",
                status,
                result.name,
                result.result.as_deref().unwrap_or("-").dimmed()
            );
        }

        println!();
        self.key_value("Run", &summary.run_id.to_string());
        self.key_value("Passed", &summary.passed_count().to_string());
        self.key_value("Failed", &summary.failed_count().to_string());
        if let Some(duration) = summary.duration().and_then(|d| d.to_std().ok()) {
            self.key_value("Duration", &format_duration(duration));
        }

        if summary.cancelled {
            self.warning("Run was cancelled");
        } else if summary.all_passed() {
            self.success("All checks passed");
        } else {
            self.error("One or more checks failed");
        }
    }

    /// Display the outcome of a group request, one line per target
    pub fn group_summary(&self, summary: &GroupSummary) {
        self.section_header(&format!("Group diagnostics for {}", summary.group_id));

        for run in &summary.runs {
            let status = if run.all_passed() {
                "PASS".bright_green()
            } else if run.cancelled {
                "STOP".bright_yellow()
            } else {
                "FAIL".bright_red()
            };
            let failed: Vec<&str> = run
                .results
                .iter()
                .filter(|r| r.status == StepStatus::Failed)
                .map(|r| r.name.as_str())
                .collect();
            println!("  {} {:<10} {}", status, run.target_id, failed.join(", ").dimmed());
        }
        for target in &summary.skipped {
            println!("  {} {:<10} {}", "SKIP".dimmed(), target, "already under test".dimmed());
        }

        println!();
        if summary.all_passed() {
            self.success("All stations passed");
        } else {
            self.error(&format!(
                "{} of {} stations need attention",
                summary.failed_targets().len() + summary.skipped.len(),
                summary.runs.len() + summary.skipped.len()
            ));
        }
    }
}

/// Plain-text table sized to its widest cells
pub struct TableDisplay {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableDisplay {
    pub fn new<S: Into<String>>(headers: Vec<S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Missing cells render blank; extra cells are dropped
    pub fn add_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.rows
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Table text without colors, one line per row plus a header rule
    pub fn render(&self) -> String {
        let widths = self.widths();
        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| {
                    let pad = width - cell.chars().count();
                    format!("{}{}", cell, " ".repeat(pad))
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        let _ = writeln!(out, "{}", line(&self.headers));
        let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
        let _ = writeln!(out, "{}", rule.join("  "));
        for row in &self.rows {
            let _ = writeln!(out, "{}", line(row));
        }
        out
    }

    pub fn display(&self) {
        if self.is_empty() {
            println!("{}", "(no records)".dimmed());
            return;
        }

        let rendered = self.render();
        let mut lines = rendered.lines();
        if let Some(header) = lines.next() {
            println!("{}", header.bright_cyan().bold());
        }
        for line in lines {
            println!("{}", line);
        }
    }
}

/// Ask a yes/no question on the terminal
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?;
    Ok(answer)
}

/// `1h 2m 5s`, `1m 10s`, `10s`, or milliseconds below one second
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return format!("{}ms", duration.as_millis());
    }

    let parts = [(secs / 3600, "h"), ((secs % 3600) / 60, "m"), (secs % 60, "s")];
    let first = parts.iter().position(|(n, _)| *n > 0).unwrap_or(2);
    parts[first..]
        .iter()
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template(SPINNER_TEMPLATE)?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcharge_diagnostics::config::station_battery;
    use uuid::Uuid;

    #[test]
    fn test_step_bars_follow_progress() {
        let bars = StepBars::new(&station_battery().steps).unwrap();
        assert_eq!(bars.len(), 5);
        assert_eq!(bars.bars[2].prefix(), "Safety Systems");

        let progress = |index: usize, status: StepStatus, value: u8| StepProgress {
            run_id: Uuid::nil(),
            target_id: "CS001".to_string(),
            step_index: index,
            step_id: "power".to_string(),
            status,
            progress: value,
        };

        bars.update(&progress(0, StepStatus::Running, 40));
        assert_eq!(bars.bars[0].position(), 40);
        assert!(!bars.bars[0].is_finished());

        bars.update(&progress(0, StepStatus::Completed, 100));
        assert!(bars.bars[0].is_finished());

        // Out of range indices are ignored
        bars.update(&progress(9, StepStatus::Running, 10));
    }

    #[test]
    fn test_target_bars_span_all_steps() {
        let steps = station_battery().steps;
        let targets = vec!["CS001".to_string(), "CS002".to_string()];
        let bars = TargetBars::new(&targets, &steps).unwrap();
        assert_eq!(bars.bars["CS001"].length(), Some(500));

        bars.update(&StepProgress {
            run_id: Uuid::nil(),
            target_id: "CS002".to_string(),
            step_index: 2,
            step_id: "safety".to_string(),
            status: StepStatus::Running,
            progress: 30,
        });
        assert_eq!(bars.bars["CS002"].position(), 230);
        assert_eq!(bars.bars["CS001"].position(), 0);

        bars.skip("CS001");
        assert!(bars.bars["CS001"].is_finished());
    }

    #[test]
    fn test_table_render() {
        let mut table = TableDisplay::new(vec!["ID", "Condition"]);
        assert!(table.is_empty());

        table.add_row(vec!["1".to_string(), "temperature > 75°C".to_string()]);
        table.add_row(vec!["20".to_string()]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "ID  Condition");
        assert_eq!(lines[2], "1   temperature > 75°C");
        assert_eq!(lines[3], "20");
        assert_eq!(lines[1].chars().count(), 2 + 2 + 18);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_secs(70)), "1m 10s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h 0m 0s");
    }
}
