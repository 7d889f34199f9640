use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use anyhow::{anyhow, Context, Result};
use phage_import_core::{
    Bundle, BundleState, CheckContext, ErrorClass, EvalFlag, EvalFlags, EvalStatus, Evaluation,
    EvaluationTree, FlagProvider, Keyword, Record, ReferenceSets, RunMode, Subject, Ticket,
    TicketDefaults, TicketRow, TicketType, Verdict,
};
use phage_import_store_sqlite::{CommitMode, CommitOptions, SqliteStore};
use serde::Serialize;
use time::OffsetDateTime;
use ulid::Ulid;

use crate::catalog::ReferenceCatalog;
use crate::genbank::{list_flat_files, parse_flat_file, GenomeIdField};
use crate::layout::{Area, BundleTrace, RecordSummary, ResultsLayout, Transfer};
use crate::tickets::read_tickets;

pub const DEFAULT_AUTHOR: &str = "Hatfull";

/// Inputs for one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub genome_folder: PathBuf,
    pub import_table: PathBuf,
    pub output_folder: PathBuf,
    pub genome_id_field: GenomeIdField,
    /// Write to the store and move committed artifacts. Otherwise nothing is
    /// written and artifacts are copied.
    pub prod_run: bool,
    pub defaults: TicketDefaults,
    pub expected_author: String,
    pub workers: usize,
}

impl ImportConfig {
    #[must_use]
    pub fn new(genome_folder: PathBuf, import_table: PathBuf, output_folder: PathBuf) -> Self {
        Self {
            genome_folder,
            import_table,
            output_folder,
            genome_id_field: GenomeIdField::default(),
            prod_run: false,
            defaults: TicketDefaults::default(),
            expected_author: DEFAULT_AUTHOR.to_string(),
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub phage_id: String,
    pub state: BundleState,
    pub errors: usize,
    pub warnings: usize,
    pub artifact: Option<PathBuf>,
    pub trace: PathBuf,
    #[serde(skip)]
    index: usize,
    #[serde(skip)]
    row: TicketRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadableFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_date: String,
    pub dry_run: bool,
    pub cancelled: bool,
    /// Infrastructure error that stopped the run, if any.
    pub aborted: Option<String>,
    pub results_dir: PathBuf,
    pub committed: usize,
    pub failed: usize,
    pub unprocessed: Vec<String>,
    pub outcomes: Vec<TicketOutcome>,
    pub unmatched_files: Vec<PathBuf>,
    pub unreadable_files: Vec<UnreadableFile>,
}

struct ParsedFile {
    path: PathBuf,
    record: Record,
}

struct WorkItem {
    index: usize,
    bundle: Bundle,
    flags: EvalFlags,
    file: Option<ParsedFile>,
}

/// Infrastructure error raised while a worker held a ticket.
struct RunFailure {
    /// Index and id of a ticket that did not reach an outcome.
    unfinished: Option<(usize, String)>,
    error: anyhow::Error,
}

struct RunContext<'a> {
    config: &'a ImportConfig,
    run_id: Ulid,
    store: Mutex<&'a mut SqliteStore>,
    catalog: &'a dyn ReferenceCatalog,
    reference_sets: ReferenceSets,
    layout: ResultsLayout,
}

/// Run every ticket of `config.import_table` through resolution, checks, and
/// commit or fail filing.
///
/// Per-ticket problems end up in the failure area. Setting `cancel` stops the
/// run between bundles; tickets not yet started are listed as unprocessed.
/// The ticket tables and `run_summary.json` are written for every run that
/// got as far as creating its results directory.
///
/// # Errors
/// Returns an error before any ticket is processed when the ticket table
/// cannot be read, a ticket selects an unknown run mode, or the store or
/// catalog cannot be queried. A store or filing error during processing
/// stops the run like a cancellation and is returned once the processed
/// tickets are filed. Returns an error when output files cannot be written.
pub fn run_import(
    config: &ImportConfig,
    store: &mut SqliteStore,
    catalog: &dyn ReferenceCatalog,
    provider: &dyn FlagProvider,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    let run_id = Ulid::new();
    let run_date = OffsetDateTime::now_utc().date();
    tracing::info!(run_id = %run_id, prod_run = config.prod_run, "Starting import run");

    let rows = read_tickets(&config.import_table)?;
    let flags_by_mode = resolve_run_modes(&rows, &config.defaults, provider)?;

    let mut reference_sets = store.reference_sets()?;
    reference_sets.merge(&catalog.reference_sets().context("failed to load catalog reference sets")?);

    let (mut files, unreadable) = load_flat_files(&config.genome_folder, config.genome_id_field)?;
    let layout = ResultsLayout::create(&config.output_folder, run_date)?;

    let mut queue = VecDeque::new();
    let mut seen = BTreeSet::new();
    for (index, row) in rows.into_iter().enumerate() {
        let mode = row.effective_run_mode(&config.defaults);
        let flags = flags_by_mode
            .get(&mode)
            .copied()
            .ok_or_else(|| anyhow!("run mode {mode} was not resolved"))?;
        let mut bundle = Bundle::receive(row, &config.defaults);
        let phage_id = bundle.phage_id().to_string();
        let file = if seen.insert(phage_id.clone()) {
            files.remove(&phage_id)
        } else {
            bundle.note(
                &Subject::Ticket,
                Evaluation::error(
                    "TKT_012",
                    ErrorClass::TicketFormat,
                    format!("An earlier ticket in this run already targets {phage_id}."),
                ),
            )?;
            None
        };
        queue.push_back(WorkItem { index, bundle, flags, file });
    }

    let context = RunContext {
        config,
        run_id,
        store: Mutex::new(store),
        catalog,
        reference_sets,
        layout,
    };
    let queue = Mutex::new(queue);
    let outcomes = Mutex::new(Vec::new());
    let failure = Mutex::new(None::<RunFailure>);

    let workers = config.workers.max(1);
    if workers == 1 {
        drain(&context, &queue, &outcomes, &failure, cancel);
    } else {
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| drain(&context, &queue, &outcomes, &failure, cancel));
            }
        });
    }

    let failure = failure.into_inner().map_err(|_| anyhow!("worker panicked"))?;
    let mut outcomes = outcomes.into_inner().map_err(|_| anyhow!("worker panicked"))?;
    outcomes.sort_by_key(|outcome| outcome.index);
    let remaining = queue.into_inner().map_err(|_| anyhow!("worker panicked"))?;
    let mut pending = remaining
        .iter()
        .map(|item| (item.index, item.bundle.row().id.clone()))
        .collect::<Vec<_>>();
    pending.extend(failure.as_ref().and_then(|failure| failure.unfinished.clone()));
    pending.sort();
    let unprocessed = pending.into_iter().map(|(_, id)| id).collect::<Vec<_>>();
    if !unprocessed.is_empty() {
        tracing::warn!(count = unprocessed.len(), "Run stopped before every ticket was processed");
    }

    let layout = &context.layout;
    let (committed_rows, failed_rows): (Vec<_>, Vec<_>) =
        outcomes.iter().partition(|outcome| outcome.state == BundleState::Committed);
    layout.write_ticket_table(
        Area::Success,
        &committed_rows.iter().map(|outcome| outcome.row.clone()).collect::<Vec<_>>(),
    )?;
    layout.write_ticket_table(
        Area::Fail,
        &failed_rows.iter().map(|outcome| outcome.row.clone()).collect::<Vec<_>>(),
    )?;
    let committed = committed_rows.len();
    let failed = failed_rows.len();

    let mut unmatched_files = Vec::new();
    for file in files.into_values() {
        tracing::warn!(file = %file.path.display(), genome = %file.record.id, "No ticket matches flat file");
        layout.file_artifact(&file.path, Area::Fail, Transfer::Copy)?;
        unmatched_files.push(file.path);
    }
    for file in &unreadable {
        layout.file_artifact(&file.path, Area::Fail, Transfer::Copy)?;
        let mut tree = EvaluationTree::new();
        tree.push(
            &Subject::Source(file.path.display().to_string()),
            Evaluation::error("FLT_001", ErrorClass::RecordStructural, file.reason.clone()),
        );
        let name = file.path.file_name().map_or_else(String::new, |name| name.to_string_lossy().into_owned());
        layout.write_trace(
            Area::Fail,
            &format!("file_{name}"),
            &BundleTrace {
                run_id: run_id.to_string(),
                state: BundleState::Failed.as_str(),
                ticket: None,
                record: None,
                evaluations: &tree,
            },
        )?;
    }

    let summary = RunSummary {
        run_id: run_id.to_string(),
        run_date: run_date.to_string(),
        dry_run: !config.prod_run,
        cancelled: !unprocessed.is_empty(),
        aborted: failure.as_ref().map(|failure| format!("{:#}", failure.error)),
        results_dir: layout.root().to_path_buf(),
        committed,
        failed,
        unprocessed,
        unmatched_files,
        unreadable_files: unreadable,
        outcomes,
    };
    tracing::info!(
        run_id = %run_id,
        committed = summary.committed,
        failed = summary.failed,
        unprocessed = summary.unprocessed.len(),
        "Import run finished"
    );
    let summary_path = layout.write_summary(&summary)?;
    if let Some(failure) = failure {
        return Err(failure.error.context(format!(
            "import run aborted; partial summary written to {}",
            summary_path.display()
        )));
    }
    Ok(summary)
}

/// Resolve the flag table of every run mode the tickets select.
///
/// # Errors
/// Returns an error naming the first ticket whose run mode is unknown.
pub fn resolve_run_modes(
    rows: &[TicketRow],
    defaults: &TicketDefaults,
    provider: &dyn FlagProvider,
) -> Result<BTreeMap<String, EvalFlags>> {
    let mut flags = BTreeMap::new();
    for row in rows {
        let name = row.effective_run_mode(defaults);
        if flags.contains_key(&name) {
            continue;
        }
        let mode = RunMode::require(&name)
            .with_context(|| format!("ticket {} selects an unknown run mode", row.id))?;
        flags.insert(name, EvalFlags::for_mode(mode, provider));
    }
    Ok(flags)
}

fn load_flat_files(
    folder: &Path,
    id_field: GenomeIdField,
) -> Result<(BTreeMap<String, ParsedFile>, Vec<UnreadableFile>)> {
    let mut files = BTreeMap::new();
    let mut unreadable = Vec::new();
    for path in list_flat_files(folder)? {
        match parse_flat_file(&path, id_field) {
            Ok(record) => {
                if let Some(existing) = files.get(&record.id).map(|file: &ParsedFile| file.path.clone()) {
                    unreadable.push(UnreadableFile {
                        reason: format!(
                            "Genome {} is also provided by {}.",
                            record.id,
                            existing.display()
                        ),
                        path,
                    });
                } else {
                    files.insert(record.id.clone(), ParsedFile { path, record });
                }
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "Unreadable flat file");
                unreadable.push(UnreadableFile { path, reason: format!("{err:#}") });
            }
        }
    }
    Ok((files, unreadable))
}

fn drain(
    context: &RunContext<'_>,
    queue: &Mutex<VecDeque<WorkItem>>,
    outcomes: &Mutex<Vec<TicketOutcome>>,
    failure: &Mutex<Option<RunFailure>>,
    cancel: &AtomicBool,
) {
    loop {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let Ok(mut pending) = queue.lock() else {
            return;
        };
        let Some(item) = pending.pop_front() else {
            return;
        };
        drop(pending);

        let ticket = (item.index, item.bundle.row().id.clone());
        let (unfinished, error) = match process(context, item) {
            Ok((outcome, filing_error)) => {
                if let Ok(mut done) = outcomes.lock() {
                    done.push(outcome);
                }
                match filing_error {
                    Some(error) => (None, error),
                    None => continue,
                }
            }
            Err(error) => (Some(ticket.clone()), error),
        };
        tracing::error!(ticket = %ticket.1, error = %format!("{error:#}"), "Import run aborted");
        cancel.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = failure.lock() {
            slot.get_or_insert(RunFailure { unfinished, error });
        }
        return;
    }
}

fn wants_retrieval(ticket: &Ticket) -> bool {
    [
        ticket.host_genus.keyword(),
        ticket.cluster.keyword(),
        ticket.subcluster.keyword(),
        ticket.accession.keyword(),
    ]
    .contains(&Some(Keyword::Retrieve))
}

fn with_store<T>(
    context: &RunContext<'_>,
    action: impl FnOnce(&mut SqliteStore) -> Result<T>,
) -> Result<T> {
    let mut guard = context.store.lock().map_err(|_| anyhow!("store lock poisoned"))?;
    action(&mut **guard)
}

/// Evaluate one bundle and file it.
///
/// An error before filing leaves the ticket unfinished. A filing error is
/// returned next to the outcome, since the verdict and any commit stand.
fn process(
    context: &RunContext<'_>,
    item: WorkItem,
) -> Result<(TicketOutcome, Option<anyhow::Error>)> {
    let WorkItem { index, mut bundle, flags, file } = item;
    let phage_id = bundle.phage_id().to_string();
    let artifact = file.as_ref().map(|file| file.path.clone());
    if let Some(file) = file {
        bundle.attach_parsed(file.record)?;
    }

    if let Some(ticket) = bundle.ticket().cloned() {
        if let Some(persisted) = with_store(context, |store| store.load_record(&phage_id))? {
            bundle.attach_persisted(persisted)?;
        }
        if wants_retrieval(&ticket) {
            match context.catalog.lookup(&phage_id) {
                Ok(Some(entry)) => bundle.attach_reference(entry)?,
                Ok(None) => {}
                Err(err) => bundle.note(
                    &Subject::Ticket,
                    Evaluation::error(
                        "RES_008",
                        ErrorClass::FieldResolution,
                        format!("Reference catalog lookup failed: {err:#}"),
                    ),
                )?,
            }
        }
    }

    bundle.resolve()?;

    let (sequence_owner, accession_owner) = match bundle.parsed() {
        Some(parsed) => with_store(context, |store| {
            let sequence_owner = store.phage_id_for_sequence(&parsed.sequence)?;
            let accession_owner = match parsed.accession.as_deref() {
                Some(accession) => store.phage_id_for_accession(accession)?,
                None => None,
            };
            Ok((sequence_owner, accession_owner))
        })?,
        None => (None, None),
    };
    let check_context = CheckContext {
        flags,
        reference_sets: &context.reference_sets,
        sequence_owner,
        accession_owner,
        expected_author: context.config.expected_author.clone(),
    };
    let verdict = bundle.check(&check_context)?;
    tracing::debug!(
        ticket = %bundle.row().id,
        phage_id = %phage_id,
        run_mode = flags.mode().as_str(),
        evaluations = bundle.evaluations().len(),
        "Checks complete"
    );

    match verdict {
        Verdict::Commit if context.config.prod_run => commit(context, &mut bundle, flags)?,
        Verdict::Commit => bundle.mark_committed()?,
        Verdict::Fail => bundle.mark_failed()?,
    }

    Ok(file_bundle(context, index, bundle, artifact.as_deref()))
}

fn commit(context: &RunContext<'_>, bundle: &mut Bundle, flags: EvalFlags) -> Result<()> {
    let (Some(ticket), Some(parsed)) = (bundle.ticket(), bundle.parsed()) else {
        bundle.mark_failed()?;
        return Ok(());
    };
    let options = CommitOptions {
        mode: match ticket.ticket_type {
            TicketType::Add => CommitMode::Insert,
            TicketType::Replace => CommitMode::Replace,
        },
        import_locus_tag: flags.enabled(EvalFlag::ImportLocusTag),
        description_field: ticket.description_field,
        run_id: context.run_id,
        ticket_id: ticket.id.clone(),
    };
    let result = with_store(context, |store| {
        if let Some(owner) = store.phage_id_for_sequence(&parsed.sequence)? {
            if owner != parsed.id {
                return Err(anyhow!("The sequence was stored for {owner} during this run."));
            }
        }
        store.commit_record(parsed, &options)
    });

    match result {
        Ok(()) => bundle.mark_committed()?,
        Err(err) => {
            tracing::error!(phage_id = %bundle.phage_id(), error = %format!("{err:#}"), "Commit failed");
            bundle.fail_commit(format!("{err:#}"))?;
        }
    }
    Ok(())
}

fn file_bundle(
    context: &RunContext<'_>,
    index: usize,
    bundle: Bundle,
    artifact: Option<&Path>,
) -> (TicketOutcome, Option<anyhow::Error>) {
    let state = bundle.state();
    let (area, transfer) = match state {
        BundleState::Committed if context.config.prod_run => (Area::Success, Transfer::Move),
        BundleState::Committed => (Area::Success, Transfer::Copy),
        _ => (Area::Fail, Transfer::Copy),
    };
    let phage_id = bundle.phage_id().to_string();
    let (row, _, parsed, evaluations) = bundle.into_parts();

    let mut filing_error = None;
    let destination = match artifact
        .map(|path| context.layout.file_artifact(path, area, transfer))
        .transpose()
    {
        Ok(destination) => destination,
        Err(err) => {
            filing_error = Some(err);
            None
        }
    };
    let trace_name = format!("{}_{}", row.id, phage_id);
    let trace = context.layout.trace_path(area, &trace_name);
    if filing_error.is_none() {
        let written = context.layout.write_trace(
            area,
            &trace_name,
            &BundleTrace {
                run_id: context.run_id.to_string(),
                state: state.as_str(),
                ticket: Some(&row),
                record: parsed.as_ref().map(RecordSummary::from_record),
                evaluations: &evaluations,
            },
        );
        if let Err(err) = written {
            filing_error = Some(err);
        }
    }

    let errors = evaluations.count(EvalStatus::Error);
    let warnings = evaluations.count(EvalStatus::Warning);
    if state == BundleState::Committed {
        tracing::info!(ticket = %row.id, phage_id = %phage_id, warnings, "Bundle committed");
    } else {
        tracing::warn!(ticket = %row.id, phage_id = %phage_id, errors, "Bundle failed");
    }

    let outcome = TicketOutcome {
        ticket_id: row.id.clone(),
        phage_id,
        state,
        errors,
        warnings,
        artifact: destination,
        trace,
        index,
        row,
    };
    (outcome, filing_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phage_import_core::NoFlags;

    fn row(id: &str, run_mode: Option<&str>) -> TicketRow {
        TicketRow {
            id: id.to_string(),
            ticket_type: "add".to_string(),
            phage_id: format!("Phage{id}"),
            run_mode: run_mode.map(str::to_string),
            ..TicketRow::default()
        }
    }

    #[test]
    fn run_modes_resolve_once_per_name_with_defaults() -> Result<()> {
        let rows = vec![row("1", None), row("2", Some("FINAL")), row("3", Some(""))];
        let flags = resolve_run_modes(&rows, &TicketDefaults::default(), &NoFlags)?;
        assert_eq!(flags.len(), 2);
        assert_eq!(flags.get("draft").map(EvalFlags::mode), Some(RunMode::Draft));
        assert_eq!(flags.get("final").map(EvalFlags::mode), Some(RunMode::Final));
        Ok(())
    }

    #[test]
    fn unknown_run_mode_names_the_ticket() {
        let rows = vec![row("1", None), row("9", Some("turbo"))];
        match resolve_run_modes(&rows, &TicketDefaults::default(), &NoFlags) {
            Err(err) => assert!(format!("{err:#}").contains("ticket 9")),
            Ok(flags) => panic!("expected an unknown run mode error, got {flags:?}"),
        }
    }
}
