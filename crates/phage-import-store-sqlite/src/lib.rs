use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use phage_import_core::{
    AnnotationStatus, Cds, DescriptionField, Record, RecordOrigin, ReferenceSets, Strand,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS phage (
  PhageID TEXT PRIMARY KEY,
  Accession TEXT,
  Name TEXT NOT NULL,
  HostGenus TEXT NOT NULL,
  Sequence TEXT NOT NULL,
  SequenceDigest TEXT NOT NULL,
  Length INTEGER NOT NULL CHECK (Length >= 0),
  GC REAL NOT NULL,
  Status TEXT NOT NULL CHECK (Status IN ('draft','final','unknown')),
  DateLastModified TEXT,
  RetrieveRecord INTEGER NOT NULL CHECK (RetrieveRecord IN (0,1)),
  AnnotationAuthor INTEGER NOT NULL CHECK (AnnotationAuthor IN (0,1)),
  Cluster TEXT,
  Subcluster TEXT
);

CREATE TABLE IF NOT EXISTS gene (
  GeneID TEXT PRIMARY KEY,
  PhageID TEXT NOT NULL,
  Start INTEGER NOT NULL CHECK (Start >= 0),
  Stop INTEGER NOT NULL CHECK (Stop >= 0),
  Length INTEGER NOT NULL CHECK (Length >= 0),
  Name TEXT NOT NULL,
  Translation TEXT NOT NULL,
  Orientation TEXT NOT NULL CHECK (Orientation IN ('F','R')),
  Notes TEXT,
  LocusTag TEXT,
  Parts INTEGER NOT NULL CHECK (Parts >= 1),
  FOREIGN KEY (PhageID) REFERENCES phage(PhageID)
);

CREATE INDEX IF NOT EXISTS idx_phage_sequence_digest ON phage(SequenceDigest);
CREATE INDEX IF NOT EXISTS idx_phage_accession ON phage(Accession);
CREATE INDEX IF NOT EXISTS idx_gene_phage ON gene(PhageID);
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS import_log (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL,
  ticket_id TEXT NOT NULL,
  PhageID TEXT NOT NULL,
  mode TEXT NOT NULL CHECK (mode IN ('insert','replace')),
  gene_count INTEGER NOT NULL CHECK (gene_count >= 0),
  committed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_import_log_run ON import_log(run_id);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    Insert,
    Replace,
}

impl CommitMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Replace => "replace",
        }
    }
}

/// How one validated record is written.
#[derive(Debug, Clone)]
pub struct CommitOptions {
    pub mode: CommitMode,
    pub import_locus_tag: bool,
    pub description_field: DescriptionField,
    pub run_id: Ulid,
    pub ticket_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub phages: i64,
    pub genes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportLogEntry {
    pub run_id: String,
    pub ticket_id: String,
    pub phage_id: String,
    pub mode: String,
    pub gene_count: i64,
    pub committed_at: String,
}

/// Hex sha256 of the uppercased sequence, used to find stored duplicates.
#[must_use]
pub fn sequence_digest(sequence: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence.trim().to_ascii_uppercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl SqliteStore {
    /// Open a SQLite-backed genome store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus { current_version, target_version: LATEST_SCHEMA_VERSION, pending_versions })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;
        for (target, sql) in [(1_i64, MIGRATION_001_SQL), (2_i64, MIGRATION_002_SQL)] {
            if version < target {
                self.apply_migration(target, sql)?;
                version = target;
            }
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }
        Ok(())
    }

    fn apply_migration(&mut self, version: i64, sql: &str) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .with_context(|| format!("failed to start migration v{version} transaction"))?;
        tx.execute_batch(sql).with_context(|| format!("failed to apply migration v{version}"))?;
        record_schema_version(&tx, version)?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        Ok(())
    }

    /// Write one validated record and all of its genes in a single transaction.
    ///
    /// `Replace` removes the stored phage and gene rows for the id first. Any
    /// failure rolls the whole write back.
    ///
    /// # Errors
    /// Returns an error when any statement in the transaction fails.
    pub fn commit_record(&mut self, record: &Record, options: &CommitOptions) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start commit transaction")?;

        if options.mode == CommitMode::Replace {
            let removed = delete_phage(&tx, &record.id)?;
            if removed == 0 {
                return Err(anyhow!("cannot replace {}: no stored genome", record.id));
            }
        }
        insert_phage(&tx, record)?;
        let gene_count = insert_genes(&tx, record, options)?;

        tx.execute(
            "INSERT INTO import_log(run_id, ticket_id, PhageID, mode, gene_count, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                options.run_id.to_string(),
                options.ticket_id,
                record.id,
                options.mode.as_str(),
                gene_count,
                now_rfc3339()?,
            ],
        )
        .context("failed to insert import_log row")?;

        tx.commit().with_context(|| format!("failed to commit genome {}", record.id))?;
        Ok(())
    }

    /// Load the stored snapshot for `phage_id` with its genes.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn load_record(&self, phage_id: &str) -> Result<Option<Record>> {
        let row = self
            .conn
            .query_row(
                "SELECT PhageID, Accession, Name, HostGenus, Sequence, Status, DateLastModified,
                        RetrieveRecord, AnnotationAuthor, Cluster, Subcluster
                 FROM phage WHERE PhageID = ?1",
                params![phage_id],
                |row| {
                    Ok(PhageRow {
                        phage_id: row.get(0)?,
                        accession: row.get(1)?,
                        name: row.get(2)?,
                        host_genus: row.get(3)?,
                        sequence: row.get(4)?,
                        status: row.get(5)?,
                        date: row.get(6)?,
                        retrieve_record: row.get(7)?,
                        annotation_author: row.get(8)?,
                        cluster: row.get(9)?,
                        subcluster: row.get(10)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to load phage {phage_id}"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut record =
            row.into_record().with_context(|| format!("failed to decode phage {phage_id}"))?;
        for feature in self.load_genes(phage_id)? {
            record.push_cds(feature);
        }
        Ok(Some(record))
    }

    fn load_genes(&self, phage_id: &str) -> Result<Vec<Cds>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT GeneID, Start, Stop, Name, Translation, Orientation, Notes, LocusTag, Parts
                 FROM gene WHERE PhageID = ?1
                 ORDER BY Start ASC, GeneID ASC",
            )
            .context("failed to prepare gene query")?;
        let mut rows = stmt.query(params![phage_id])?;
        let mut genes = Vec::new();

        while let Some(row) = rows.next()? {
            let orientation: String = row.get(5)?;
            let strand = Strand::parse(&orientation)
                .ok_or_else(|| anyhow!("unknown gene orientation: {orientation}"))?;
            let start = u64::try_from(row.get::<_, i64>(1)?).context("negative gene start")?;
            let stop = u64::try_from(row.get::<_, i64>(2)?).context("negative gene stop")?;
            let mut feature = Cds::new(phage_id, start, stop, strand);
            feature.id = row.get(0)?;
            feature.name = row.get(3)?;
            feature.translation = row.get(4)?;
            feature.product = row.get::<_, Option<String>>(6)?.unwrap_or_default();
            feature.locus_tag = row.get::<_, Option<String>>(7)?.unwrap_or_default();
            feature.parts = usize::try_from(row.get::<_, i64>(8)?).context("invalid gene parts")?;
            genes.push(feature);
        }
        Ok(genes)
    }

    /// Stored phage already holding `sequence`, if any.
    ///
    /// # Errors
    /// Returns an error when the lookup query fails.
    pub fn phage_id_for_sequence(&self, sequence: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT PhageID FROM phage WHERE SequenceDigest = ?1 ORDER BY PhageID LIMIT 1",
                params![sequence_digest(sequence)],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up phage by sequence digest")
    }

    /// Stored phage already holding `accession`, if any.
    ///
    /// # Errors
    /// Returns an error when the lookup query fails.
    pub fn phage_id_for_accession(&self, accession: &str) -> Result<Option<String>> {
        if accession.trim().is_empty() {
            return Ok(None);
        }
        self.conn
            .query_row(
                "SELECT PhageID FROM phage WHERE Accession = ?1 ORDER BY PhageID LIMIT 1",
                params![accession.trim()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up phage by accession")
    }

    /// Distinct host genera, clusters, and subclusters already stored.
    ///
    /// # Errors
    /// Returns an error when any distinct-value query fails.
    pub fn reference_sets(&self) -> Result<ReferenceSets> {
        Ok(ReferenceSets {
            host_genera: self.distinct("HostGenus")?,
            clusters: self.distinct("Cluster")?,
            subclusters: self.distinct("Subcluster")?,
        })
    }

    fn distinct(&self, column: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT DISTINCT {column} FROM phage WHERE {column} IS NOT NULL"))
            .with_context(|| format!("failed to prepare distinct {column} query"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut values = BTreeSet::new();
        for row in rows {
            values.insert(row?);
        }
        Ok(values)
    }

    /// # Errors
    /// Returns an error when the count queries fail.
    pub fn counts(&self) -> Result<StoreCounts> {
        let phages = self
            .conn
            .query_row("SELECT COUNT(*) FROM phage", [], |row| row.get(0))
            .context("failed to count phage rows")?;
        let genes = self
            .conn
            .query_row("SELECT COUNT(*) FROM gene", [], |row| row.get(0))
            .context("failed to count gene rows")?;
        Ok(StoreCounts { phages, genes })
    }

    /// Commits recorded for one run, in commit order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn import_log(&self, run_id: Ulid) -> Result<Vec<ImportLogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT run_id, ticket_id, PhageID, mode, gene_count, committed_at
                 FROM import_log WHERE run_id = ?1 ORDER BY id ASC",
            )
            .context("failed to prepare import_log query")?;
        let rows = stmt.query_map(params![run_id.to_string()], |row| {
            Ok(ImportLogEntry {
                run_id: row.get(0)?,
                ticket_id: row.get(1)?,
                phage_id: row.get(2)?,
                mode: row.get(3)?,
                gene_count: row.get(4)?,
                committed_at: row.get(5)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

struct PhageRow {
    phage_id: String,
    accession: Option<String>,
    name: String,
    host_genus: String,
    sequence: String,
    status: String,
    date: Option<String>,
    retrieve_record: i64,
    annotation_author: i64,
    cluster: Option<String>,
    subcluster: Option<String>,
}

impl PhageRow {
    fn into_record(self) -> Result<Record> {
        let mut record = Record::new(&self.phage_id, RecordOrigin::Persisted);
        record.name = self.name;
        record.accession = self.accession.filter(|accession| !accession.is_empty());
        record.host_genus = Some(self.host_genus);
        record.sequence = self.sequence;
        record.annotation_status = Some(
            AnnotationStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown annotation status: {}", self.status))?,
        );
        record.date = self.date.as_deref().map(parse_date).transpose()?;
        record.retrieve_record = Some(self.retrieve_record == 1);
        record.annotation_author = Some(self.annotation_author == 1);
        record.cluster = self.cluster;
        record.subcluster = self.subcluster;
        Ok(record)
    }
}

fn delete_phage(tx: &Transaction<'_>, phage_id: &str) -> Result<usize> {
    tx.execute("DELETE FROM gene WHERE PhageID = ?1", params![phage_id])
        .with_context(|| format!("failed to delete genes for {phage_id}"))?;
    tx.execute("DELETE FROM phage WHERE PhageID = ?1", params![phage_id])
        .with_context(|| format!("failed to delete phage {phage_id}"))
}

fn insert_phage(tx: &Transaction<'_>, record: &Record) -> Result<()> {
    let status = record
        .annotation_status
        .map(AnnotationStatus::as_str)
        .ok_or_else(|| anyhow!("genome {} has no annotation status", record.id))?;
    let host_genus = record
        .host_genus
        .as_deref()
        .ok_or_else(|| anyhow!("genome {} has no host genus", record.id))?;
    let date = record.date.map(format_date).transpose()?;

    tx.execute(
        "INSERT INTO phage(
            PhageID, Accession, Name, HostGenus, Sequence, SequenceDigest, Length, GC,
            Status, DateLastModified, RetrieveRecord, AnnotationAuthor, Cluster, Subcluster
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13, ?14
        )",
        params![
            record.id,
            record.accession,
            record.name,
            host_genus,
            record.sequence,
            sequence_digest(&record.sequence),
            i64::try_from(record.sequence_length()).context("sequence length overflow")?,
            record.gc_content(),
            status,
            date,
            i64::from(record.retrieve_record.unwrap_or(false)),
            i64::from(record.annotation_author.unwrap_or(false)),
            record.cluster,
            record.subcluster,
        ],
    )
    .with_context(|| format!("failed to insert phage {}", record.id))?;
    Ok(())
}

fn insert_genes(tx: &Transaction<'_>, record: &Record, options: &CommitOptions) -> Result<i64> {
    let mut stmt = tx
        .prepare(
            "INSERT INTO gene(
                GeneID, PhageID, Start, Stop, Length, Name, Translation,
                Orientation, Notes, LocusTag, Parts
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .context("failed to prepare gene insert")?;

    let mut count = 0_i64;
    for (index, feature) in record.cds().iter().enumerate() {
        let gene_id = format!("{}_CDS_{}", record.id, index + 1);
        let notes = feature.description(options.description_field).trim();
        let locus_tag = if options.import_locus_tag && !feature.locus_tag.is_empty() {
            Some(feature.locus_tag.as_str())
        } else {
            None
        };
        let name = if feature.name.is_empty() { feature.derived_name() } else { feature.name.clone() };
        stmt.execute(params![
            gene_id,
            record.id,
            i64::try_from(feature.start).context("gene start overflow")?,
            i64::try_from(feature.stop).context("gene stop overflow")?,
            i64::try_from(feature.translation_length()).context("gene length overflow")?,
            name,
            feature.translation,
            feature.strand.as_short(),
            if notes.is_empty() { None } else { Some(notes) },
            locus_tag,
            i64::try_from(feature.parts).context("gene parts overflow")?,
        ])
        .with_context(|| format!("failed to insert gene {gene_id}"))?;
        count += 1;
    }
    Ok(count)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn format_date(value: Date) -> Result<String> {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .context("failed to format date")
}

fn parse_date(value: &str) -> Result<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid stored date: {value}"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use time::macros::date;

    fn sample_record(id: &str, genes: usize) -> Record {
        let mut record = Record::new(id, RecordOrigin::FlatFile);
        record.name = format!("{id}_Draft");
        record.host_genus = Some("Mycobacterium".to_string());
        record.cluster = Some("A".to_string());
        record.subcluster = Some("A2".to_string());
        record.annotation_status = Some(AnnotationStatus::Draft);
        record.annotation_author = Some(true);
        record.retrieve_record = Some(true);
        record.date = Some(date!(2026 - 02 - 10));
        record.sequence = format!("{id}GGCCATGAAATAA").to_ascii_uppercase().replace(
            |c: char| !"ACGT".contains(c),
            "A",
        );
        for index in 0..genes {
            let start = u64::try_from(index).unwrap_or_default() * 100;
            let mut feature = Cds::new(id, start, start + 9, Strand::Forward);
            feature.translation = "MK".to_string();
            feature.locus_tag = format!("SEA_{}_{}", id.to_ascii_uppercase(), index + 1);
            feature.gene = (index + 1).to_string();
            feature.product = format!("protein {index}");
            record.push_cds(feature);
        }
        record
    }

    fn options(mode: CommitMode) -> CommitOptions {
        CommitOptions {
            mode,
            import_locus_tag: true,
            description_field: DescriptionField::Product,
            run_id: Ulid::new(),
            ticket_id: "1".to_string(),
        }
    }

    fn open_migrated() -> Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    // Test IDs: STORE-001
    #[test]
    fn migrate_reaches_latest_version_and_is_idempotent() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        let before = store.schema_status()?;
        assert_eq!(before.current_version, 0);
        assert_eq!(before.pending_versions, vec![1, 2]);

        store.migrate()?;
        store.migrate()?;
        let after = store.schema_status()?;
        assert_eq!(after.current_version, LATEST_SCHEMA_VERSION);
        assert!(after.pending_versions.is_empty());
        Ok(())
    }

    // Test IDs: STORE-002
    #[test]
    fn commit_writes_phage_and_gene_rows_and_loads_them_back() -> Result<()> {
        let mut store = open_migrated()?;
        let record = sample_record("Alice", 4);
        let opts = options(CommitMode::Insert);
        store.commit_record(&record, &opts)?;

        assert_eq!(store.counts()?, StoreCounts { phages: 1, genes: 4 });
        let Some(loaded) = store.load_record("Alice")? else {
            panic!("stored genome should load");
        };
        assert_eq!(loaded.origin, RecordOrigin::Persisted);
        assert_eq!(loaded.date, Some(date!(2026 - 02 - 10)));
        assert_eq!(loaded.annotation_status, Some(AnnotationStatus::Draft));
        assert_eq!(loaded.cds().len(), 4);
        assert_eq!(loaded.cds()[0].id, "Alice_CDS_1");
        assert_eq!(loaded.cds()[0].locus_tag, "SEA_ALICE_1");
        assert_eq!(loaded.cds()[0].product, "protein 0");

        let log = store.import_log(opts.run_id)?;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].gene_count, 4);
        assert_eq!(log[0].mode, "insert");
        Ok(())
    }

    // Test IDs: STORE-003
    #[test]
    fn locus_tags_are_skipped_when_not_imported() -> Result<()> {
        let mut store = open_migrated()?;
        let mut opts = options(CommitMode::Insert);
        opts.import_locus_tag = false;
        store.commit_record(&sample_record("Alice", 1), &opts)?;
        let Some(loaded) = store.load_record("Alice")? else {
            panic!("stored genome should load");
        };
        assert!(loaded.cds()[0].locus_tag.is_empty());
        Ok(())
    }

    // Test IDs: STORE-004
    #[test]
    fn duplicate_insert_is_rejected_without_partial_rows() -> Result<()> {
        let mut store = open_migrated()?;
        store.commit_record(&sample_record("Alice", 2), &options(CommitMode::Insert))?;
        let result = store.commit_record(&sample_record("Alice", 5), &options(CommitMode::Insert));
        assert!(result.is_err());
        assert_eq!(store.counts()?, StoreCounts { phages: 1, genes: 2 });
        Ok(())
    }

    // Test IDs: STORE-005
    #[test]
    fn failed_gene_insert_rolls_back_phage_row() -> Result<()> {
        let mut store = open_migrated()?;
        let mut record = sample_record("Alice", 1);
        let mut broken = Cds::new("Alice", 500, 509, Strand::Reverse);
        broken.parts = 0;
        record.push_cds(broken);

        assert!(store.commit_record(&record, &options(CommitMode::Insert)).is_err());
        assert_eq!(store.counts()?, StoreCounts::default());
        assert!(store.load_record("Alice")?.is_none());
        Ok(())
    }

    // Test IDs: STORE-006
    #[test]
    fn replace_swaps_genes_and_requires_existing_row() -> Result<()> {
        let mut store = open_migrated()?;
        assert!(store.commit_record(&sample_record("Alice", 2), &options(CommitMode::Replace)).is_err());

        store.commit_record(&sample_record("Alice", 2), &options(CommitMode::Insert))?;
        let mut replacement = sample_record("Alice", 3);
        replacement.annotation_status = Some(AnnotationStatus::Final);
        store.commit_record(&replacement, &options(CommitMode::Replace))?;

        assert_eq!(store.counts()?, StoreCounts { phages: 1, genes: 3 });
        let Some(loaded) = store.load_record("Alice")? else {
            panic!("stored genome should load");
        };
        assert_eq!(loaded.annotation_status, Some(AnnotationStatus::Final));
        Ok(())
    }

    // Test IDs: STORE-007
    #[test]
    fn lookups_find_sequence_accession_and_reference_values() -> Result<()> {
        let mut store = open_migrated()?;
        let mut record = sample_record("Alice", 1);
        record.accession = Some("MN000001".to_string());
        store.commit_record(&record, &options(CommitMode::Insert))?;
        let mut singleton = sample_record("Bob", 1);
        singleton.cluster = None;
        singleton.subcluster = None;
        singleton.host_genus = Some("Gordonia".to_string());
        store.commit_record(&singleton, &options(CommitMode::Insert))?;

        let lowercase = record.sequence.to_ascii_lowercase();
        assert_eq!(store.phage_id_for_sequence(&lowercase)?.as_deref(), Some("Alice"));
        assert_eq!(store.phage_id_for_sequence("ACGT")?, None);
        assert_eq!(store.phage_id_for_accession("MN000001")?.as_deref(), Some("Alice"));
        assert_eq!(store.phage_id_for_accession("")?, None);

        let sets = store.reference_sets()?;
        assert_eq!(
            sets.host_genera,
            BTreeSet::from(["Gordonia".to_string(), "Mycobacterium".to_string()])
        );
        assert_eq!(sets.clusters, BTreeSet::from(["A".to_string()]));
        assert_eq!(sets.subclusters, BTreeSet::from(["A2".to_string()]));
        Ok(())
    }

    // Test IDs: STORE-008
    #[test]
    fn sqlite_constraints_enforce_checks_and_foreign_keys() -> Result<()> {
        let store = open_migrated()?;
        let check_result = store.conn.execute(
            "INSERT INTO phage(PhageID, Name, HostGenus, Sequence, SequenceDigest, Length, GC,
                Status, RetrieveRecord, AnnotationAuthor)
             VALUES ('X', 'X', 'Mycobacterium', 'A', 'd', 1, 0.0, 'published', 0, 0)",
            [],
        );
        assert!(check_result.is_err());

        let fk_result = store.conn.execute(
            "INSERT INTO gene(GeneID, PhageID, Start, Stop, Length, Name, Translation, Orientation, Parts)
             VALUES ('Ghost_CDS_1', 'Ghost', 0, 9, 2, '1', 'MK', 'F', 1)",
            [],
        );
        assert!(fk_result.is_err());
        Ok(())
    }

    // Test IDs: STORE-009
    #[test]
    fn file_backed_store_persists_across_connections() -> Result<()> {
        let db_path =
            std::env::temp_dir().join(format!("phage-import-store-{}.sqlite3", Ulid::new()));
        {
            let mut store = SqliteStore::open(&db_path)?;
            store.migrate()?;
            store.commit_record(&sample_record("Alice", 2), &options(CommitMode::Insert))?;
        }
        let store = SqliteStore::open(&db_path)?;
        assert_eq!(store.counts()?, StoreCounts { phages: 1, genes: 2 });

        for suffix in ["", "-wal", "-shm"] {
            let path = std::path::PathBuf::from(format!("{}{}", db_path.display(), suffix));
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to cleanup sqlite file {}", path.display()))?;
            }
        }
        Ok(())
    }
}
