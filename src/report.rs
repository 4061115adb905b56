use crate::testset::TestSet;
use crate::types::{CaseResult, CaseStatus, Summary};
use crate::{t, t_args};
use colored::Colorize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// Every case, with diagnostics for failures and skips.
    #[default]
    Normal,
    /// One line per case.
    Compact,
    /// One character per case.
    Terse,
    /// Only the totals.
    Final,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub kind: OutputKind,
    pub verbose: bool,
    pub hide_passes: bool,
    pub hide_fails: bool,
}

fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

fn label(status: CaseStatus) -> String {
    match status {
        CaseStatus::Passed => "[PASS]".green().bold().to_string(),
        CaseStatus::Failed => "[FAIL]".red().bold().to_string(),
        CaseStatus::Skipped => "[SKIP]".yellow().bold().to_string(),
    }
}

fn visible(c: &CaseResult, opts: &ReportOptions) -> bool {
    match c.status {
        CaseStatus::Passed => !opts.hide_passes,
        CaseStatus::Failed | CaseStatus::Skipped => !opts.hide_fails,
    }
}

pub fn render_totals(summary: &Summary) -> String {
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().bold().to_string()
    } else {
        summary.failed.to_string().green().to_string()
    };
    let skipped = if summary.skipped > 0 {
        summary.skipped.to_string().yellow().to_string()
    } else {
        summary.skipped.to_string()
    };
    t_args!("report-totals",
        "name" => summary.name.bold(),
        "total" => summary.total,
        "passed" => summary.passed.to_string().green(),
        "failed" => failed,
        "skipped" => skipped,
        "time" => secs(summary.duration)
    )
}

pub fn render_human(summary: &Summary, opts: &ReportOptions) -> String {
    let mut out = String::new();
    match opts.kind {
        OutputKind::Final => {}
        OutputKind::Terse => {
            for c in &summary.cases {
                let mark = match c.status {
                    CaseStatus::Passed => ".".green(),
                    CaseStatus::Failed => "F".red().bold(),
                    CaseStatus::Skipped => "S".yellow(),
                };
                out.push_str(&mark.to_string());
            }
            if !summary.cases.is_empty() {
                out.push('\n');
            }
        }
        OutputKind::Compact => {
            for c in summary.cases.iter().filter(|c| visible(c, opts)) {
                out.push_str(&format!("{} {} ({})\n", label(c.status), c.name, secs(c.duration)));
            }
        }
        OutputKind::Normal => {
            for c in summary.cases.iter().filter(|c| visible(c, opts)) {
                let name = match c.status {
                    CaseStatus::Passed => c.name.green(),
                    CaseStatus::Failed => c.name.red().bold(),
                    CaseStatus::Skipped => c.name.yellow(),
                };
                out.push_str(&format!("{} {} ({})\n", label(c.status), name, secs(c.duration)));
                if let Some(msg) = &c.message {
                    if c.status != CaseStatus::Passed {
                        out.push_str(&format!("  {} {}\n", t!("report-reason").bold(), msg));
                    }
                }
                let show_output = c.status == CaseStatus::Failed || opts.verbose;
                if show_output && !c.output.trim().is_empty() {
                    out.push_str(&format!("  {}\n", t!("report-output").bold()));
                    for line in c.output.lines() {
                        out.push_str(&format!("    {line}\n"));
                    }
                }
            }
        }
    }
    out.push_str(&render_totals(summary));
    out.push('\n');
    out
}

pub fn print_human(summary: &Summary, opts: &ReportOptions) {
    print!("{}", render_human(summary, opts));
}

/// Numbered execution order of a set, with each case's dependencies.
pub fn render_order(set: &TestSet) -> String {
    let mut out = format!("{}\n", set.name.bold().underline());
    for (idx, &node) in set.order().iter().enumerate() {
        let spec = &set.case(node).spec;
        let mut line = t_args!("list-item",
            "index" => (idx + 1),
            "case" => &spec.name,
            "module" => spec.module_key()
        );
        if !spec.depends.is_empty() {
            line.push_str(&format!(" <- {}", spec.depends.join(", ")));
        }
        if spec.always_execute {
            line.push_str(&format!(" {}", t!("list-always-execute").cyan()));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}
