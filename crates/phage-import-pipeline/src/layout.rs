use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use phage_import_core::{EvaluationTree, Record, TicketRow};
use serde::Serialize;
use time::macros::format_description;
use time::Date;

use crate::tickets::write_tickets;

const TICKET_TABLE: &str = "import_tickets.csv";
const RUN_SUMMARY: &str = "run_summary.json";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Success,
    Fail,
}

impl Area {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

/// How an input artifact reaches its output area.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transfer {
    Move,
    Copy,
}

/// Results directory for one run:
/// `<output>/<YYYYMMDD>_results[_N]/{success,fail}/{genomes,evaluations}/`.
#[derive(Debug, Clone)]
pub struct ResultsLayout {
    root: PathBuf,
}

impl ResultsLayout {
    /// Create a fresh results directory under `output`, adding a `_N` suffix
    /// when the dated name is taken.
    ///
    /// # Errors
    /// Returns an error when the directories cannot be created.
    pub fn create(output: &Path, run_date: Date) -> Result<Self> {
        let stamp = run_date
            .format(format_description!("[year][month][day]"))
            .context("failed to format run date")?;
        fs::create_dir_all(output)
            .with_context(|| format!("failed to create output folder {}", output.display()))?;

        let mut root = output.join(format!("{stamp}_results"));
        let mut suffix = 1;
        while root.exists() {
            root = output.join(format!("{stamp}_results_{suffix}"));
            suffix += 1;
        }

        let layout = Self { root };
        for area in [Area::Success, Area::Fail] {
            for dir in [layout.genomes_dir(area), layout.evaluations_dir(area)] {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
        }
        Ok(layout)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn area_dir(&self, area: Area) -> PathBuf {
        self.root.join(area.as_str())
    }

    #[must_use]
    pub fn genomes_dir(&self, area: Area) -> PathBuf {
        self.area_dir(area).join("genomes")
    }

    #[must_use]
    pub fn evaluations_dir(&self, area: Area) -> PathBuf {
        self.area_dir(area).join("evaluations")
    }

    #[must_use]
    pub fn ticket_table(&self, area: Area) -> PathBuf {
        self.area_dir(area).join(TICKET_TABLE)
    }

    /// Move or copy `artifact` into the area's genome folder and return the
    /// destination.
    ///
    /// # Errors
    /// Returns an error when the artifact cannot be transferred.
    pub fn file_artifact(&self, artifact: &Path, area: Area, transfer: Transfer) -> Result<PathBuf> {
        let name = artifact
            .file_name()
            .ok_or_else(|| anyhow!("artifact {} has no file name", artifact.display()))?;
        let destination = self.genomes_dir(area).join(name);
        match transfer {
            Transfer::Copy => {
                fs::copy(artifact, &destination).with_context(|| {
                    format!("failed to copy {} to {}", artifact.display(), destination.display())
                })?;
            }
            Transfer::Move => {
                if fs::rename(artifact, &destination).is_err() {
                    fs::copy(artifact, &destination).with_context(|| {
                        format!("failed to copy {} to {}", artifact.display(), destination.display())
                    })?;
                    fs::remove_file(artifact).with_context(|| {
                        format!("failed to remove moved artifact {}", artifact.display())
                    })?;
                }
            }
        }
        Ok(destination)
    }

    /// Write the evaluation trace for one ticket or file.
    ///
    /// # Errors
    /// Returns an error when the trace cannot be serialized or written.
    pub fn write_trace(&self, area: Area, name: &str, trace: &BundleTrace<'_>) -> Result<PathBuf> {
        let path = self.trace_path(area, name);
        write_json(&path, trace)?;
        Ok(path)
    }

    #[must_use]
    pub fn trace_path(&self, area: Area, name: &str) -> PathBuf {
        self.evaluations_dir(area).join(format!("{}.json", sanitize(name)))
    }

    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.root.join(RUN_SUMMARY)
    }

    /// Write the run summary next to the two areas.
    ///
    /// # Errors
    /// Returns an error when the summary cannot be serialized or written.
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf> {
        let path = self.summary_path();
        write_json(&path, summary)?;
        Ok(path)
    }

    /// # Errors
    /// Returns an error when the table cannot be written.
    pub fn write_ticket_table(&self, area: Area, rows: &[TicketRow]) -> Result<()> {
        write_tickets(&self.ticket_table(area), rows)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// Summary of a record written alongside its evaluations.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordSummary {
    pub id: String,
    pub name: String,
    pub filename: Option<String>,
    pub accession: Option<String>,
    pub host_genus: Option<String>,
    pub cluster: Option<String>,
    pub subcluster: Option<String>,
    pub annotation_status: Option<String>,
    pub length: usize,
    pub gc_percent: f64,
    pub cds_count: usize,
    pub trna_count: usize,
}

impl RecordSummary {
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            filename: record.filename.clone(),
            accession: record.accession.clone(),
            host_genus: record.host_genus.clone(),
            cluster: record.cluster.clone(),
            subcluster: record.subcluster.clone(),
            annotation_status: record.annotation_status.map(|status| status.as_str().to_string()),
            length: record.sequence_length(),
            gc_percent: record.gc_content(),
            cds_count: record.cds().len(),
            trna_count: record.trna().len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleTrace<'a> {
    pub run_id: String,
    pub state: &'a str,
    pub ticket: Option<&'a TicketRow>,
    pub record: Option<RecordSummary>,
    pub evaluations: &'a EvaluationTree,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;
    use ulid::Ulid;

    #[test]
    fn second_layout_on_the_same_day_gets_a_suffix() -> Result<()> {
        let output = std::env::temp_dir().join(format!("phage-import-layout-{}", Ulid::new()));
        let first = ResultsLayout::create(&output, date!(2026 - 03 - 01))?;
        let second = ResultsLayout::create(&output, date!(2026 - 03 - 01))?;

        assert!(first.root().ends_with("20260301_results"));
        assert!(second.root().ends_with("20260301_results_1"));
        assert!(first.genomes_dir(Area::Success).is_dir());
        assert!(first.evaluations_dir(Area::Fail).is_dir());
        fs::remove_dir_all(&output)?;
        Ok(())
    }

    #[test]
    fn copy_leaves_source_and_move_removes_it() -> Result<()> {
        let output = std::env::temp_dir().join(format!("phage-import-layout-{}", Ulid::new()));
        let layout = ResultsLayout::create(&output, date!(2026 - 03 - 01))?;
        let artifact = output.join("Alice.gb");
        fs::write(&artifact, "LOCUS")?;

        let copied = layout.file_artifact(&artifact, Area::Fail, Transfer::Copy)?;
        assert!(artifact.exists());
        assert!(copied.exists());

        let moved = layout.file_artifact(&artifact, Area::Success, Transfer::Move)?;
        assert!(!artifact.exists());
        assert_eq!(fs::read_to_string(moved)?, "LOCUS");
        fs::remove_dir_all(&output)?;
        Ok(())
    }

    #[test]
    fn trace_names_are_sanitized() {
        assert_eq!(sanitize("3_Alice/../x"), "3_Alice_.._x");
    }
}
