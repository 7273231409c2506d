//! Per-workload outcomes and the summary table.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use conv_rs::{ConvError, ConvWorkload};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendStatus {
    Passed,
    /// Target not registered or not enabled on this machine.
    Skipped { reason: String },
    Failed(ConvError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutcome {
    pub backend: String,
    pub status: BackendStatus,
    pub elapsed_ms: f64,
}

impl BackendOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self.status, BackendStatus::Passed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, BackendStatus::Skipped { .. })
    }

    pub fn error(&self) -> Option<&ConvError> {
        match &self.status {
            BackendStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadReport {
    pub workload: ConvWorkload,
    pub outcomes: Vec<BackendOutcome>,
    /// Multiply-accumulates per kernel run; `None` when the workload is invalid.
    pub macs: Option<u64>,
    /// Failure not attributable to a single backend: reference generation, cache access, or
    /// every backend skipped.
    pub error: Option<ConvError>,
}

impl WorkloadReport {
    pub fn executed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_skipped()).count()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.outcomes.iter().all(|o| o.error().is_none())
    }

    /// Every error recorded for this workload, labelled with its backend when there is one.
    pub fn failures(&self) -> impl Iterator<Item = (Option<&str>, &ConvError)> {
        self.error.iter().map(|err| (None, err)).chain(
            self.outcomes
                .iter()
                .filter_map(|o| o.error().map(|err| (Some(o.backend.as_str()), err))),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarnessReport {
    pub workloads: Vec<WorkloadReport>,
}

impl HarnessReport {
    pub fn passed(&self) -> usize {
        self.count(BackendOutcome::is_passed)
    }

    pub fn skipped(&self) -> usize {
        self.count(BackendOutcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| o.error().is_some())
    }

    fn count(&self, pred: impl Fn(&BackendOutcome) -> bool) -> usize {
        self.workloads
            .iter()
            .flat_map(|w| &w.outcomes)
            .filter(|o| pred(o))
            .count()
    }

    pub fn failed_workloads(&self) -> usize {
        self.workloads.iter().filter(|w| !w.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        self.workloads.iter().all(WorkloadReport::is_success)
    }

    /// Renders workloads as rows and backends as columns, followed by a one-line summary.
    pub fn render_table(&self) -> String {
        let backends: Vec<&str> = self
            .workloads
            .iter()
            .flat_map(|w| w.outcomes.iter().map(|o| o.backend.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut columns = vec![
            Column::new("workload", Align::Left),
            Column::new("GMAC", Align::Right),
            Column::new("status", Align::Center),
        ];
        columns.extend(backends.iter().map(|b| Column::new(b, Align::Right)));

        let rows: Vec<Vec<String>> = self
            .workloads
            .iter()
            .map(|report| {
                let mut row = vec![
                    report.workload.to_string(),
                    report
                        .macs
                        .map(|macs| format!("{:.3}", macs as f64 / 1e9))
                        .unwrap_or_else(|| "-".to_string()),
                    if report.is_success() { "ok" } else { "fail" }.to_string(),
                ];
                row.extend(backends.iter().map(|backend| {
                    report
                        .outcomes
                        .iter()
                        .find(|o| o.backend == *backend)
                        .map(format_outcome)
                        .unwrap_or_else(|| "-".to_string())
                }));
                row
            })
            .collect();

        for row in &rows {
            for (column, cell) in columns.iter_mut().zip(row) {
                column.width = column.width.max(cell.len());
            }
        }

        let rule = separator(&columns);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "{}",
            render_row(&columns, columns.iter().map(|c| c.header.as_str()))
        );
        let _ = writeln!(out, "{rule}");
        for row in &rows {
            let _ = writeln!(out, "{}", render_row(&columns, row.iter().map(String::as_str)));
        }
        let _ = writeln!(out, "{rule}");
        let _ = write!(
            out,
            "{} passed, {} failed, {} skipped; {} of {} workloads failed",
            self.passed(),
            self.failed(),
            self.skipped(),
            self.failed_workloads(),
            self.workloads.len()
        );
        out
    }
}

fn format_outcome(outcome: &BackendOutcome) -> String {
    match outcome.status {
        BackendStatus::Passed => format!("{:.2}ms", outcome.elapsed_ms),
        BackendStatus::Skipped { .. } => "skip".to_string(),
        BackendStatus::Failed(_) => "FAIL".to_string(),
    }
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

struct Column {
    header: String,
    width: usize,
    align: Align,
}

impl Column {
    fn new(header: &str, align: Align) -> Self {
        Self {
            header: header.to_string(),
            width: header.len(),
            align,
        }
    }

    fn pad(&self, value: &str) -> String {
        let slack = self.width.saturating_sub(value.len());
        let (left, right) = match self.align {
            Align::Left => (0, slack),
            Align::Right => (slack, 0),
            Align::Center => (slack / 2, slack - slack / 2),
        };
        format!("{}{value}{}", " ".repeat(left), " ".repeat(right))
    }
}

fn render_row<'a>(columns: &[Column], cells: impl Iterator<Item = &'a str>) -> String {
    let body: Vec<String> = columns.iter().zip(cells).map(|(c, v)| c.pad(v)).collect();
    format!("| {} |", body.join(" | "))
}

fn separator(columns: &[Column]) -> String {
    columns.iter().fold(String::from("+"), |mut line, column| {
        line.push_str(&"-".repeat(column.width + 2));
        line.push('+');
        line
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(backend: &str, status: BackendStatus) -> BackendOutcome {
        BackendOutcome {
            backend: backend.to_string(),
            status,
            elapsed_ms: 1.5,
        }
    }

    #[test]
    fn counts_and_success() {
        let workload = ConvWorkload::new(1, 3, 8, 4, 3, 1, 1);
        let mut report = HarnessReport {
            workloads: vec![WorkloadReport {
                workload,
                outcomes: vec![
                    outcome("cpu", BackendStatus::Passed),
                    outcome(
                        "cuda",
                        BackendStatus::Skipped {
                            reason: "not registered".into(),
                        },
                    ),
                ],
                macs: Some(2_000_000),
                error: None,
            }],
        };
        assert!(report.is_success());
        assert_eq!((report.passed(), report.skipped(), report.failed()), (1, 1, 0));

        report.workloads[0]
            .outcomes
            .push(outcome("faer", BackendStatus::Failed(ConvError::shape("bad"))));
        assert!(!report.is_success());
        assert_eq!(report.failed_workloads(), 1);
        let failures: Vec<_> = report.workloads[0].failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, Some("faer"));
    }

    #[test]
    fn table_has_a_column_per_backend() {
        let report = HarnessReport {
            workloads: vec![WorkloadReport {
                workload: ConvWorkload::new(1, 3, 8, 4, 3, 1, 1),
                outcomes: vec![
                    outcome("faer", BackendStatus::Passed),
                    outcome("cpu", BackendStatus::Failed(ConvError::invalid("x"))),
                ],
                macs: Some(2_000_000),
                error: None,
            }],
        };
        let table = report.render_table();
        let header = table.lines().nth(1).unwrap();
        assert!(header.contains("workload"));
        assert!(header.find("cpu").unwrap() < header.find("faer").unwrap());
        assert!(table.contains("(1, 3, 8, 4, 3, 1, 1, 1)"));
        assert!(table.contains("FAIL"));
        assert!(table.contains("1.50ms"));
        assert!(table.contains("0.002"));
        assert!(table.ends_with("1 passed, 1 failed, 0 skipped; 1 of 1 workloads failed"));
    }

    #[test]
    fn summary_counts_workload_level_failures() {
        let report = HarnessReport {
            workloads: vec![WorkloadReport {
                workload: ConvWorkload::new(1, 3, 8, 4, 3, 1, 1),
                outcomes: vec![outcome(
                    "cuda",
                    BackendStatus::Skipped {
                        reason: "not registered".into(),
                    },
                )],
                macs: None,
                error: Some(ConvError::NoBackendExecuted {
                    workload: "(1, 3, 8, 4, 3, 1, 1, 1)".into(),
                }),
            }],
        };
        assert!(!report.is_success());
        let table = report.render_table();
        assert!(table.ends_with("0 passed, 0 failed, 1 skipped; 1 of 1 workloads failed"));
        assert!(table.contains("fail"));
    }
}
