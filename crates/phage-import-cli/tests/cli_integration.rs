use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use phage_import_store_sqlite::SqliteStore;
use serde_json::Value;
use ulid::Ulid;

const ALICE_GB: &str = r#"LOCUS       Alice                     88 bp    DNA     linear   PHG 01-MAR-2026
DEFINITION  Mycobacterium phage Alice, complete genome.
SOURCE      Mycobacterium phage Alice
  ORGANISM  Mycobacterium phage Alice
            Viruses.
REFERENCE   1  (bases 1 to 88)
  AUTHORS   Hatfull,G.F. and Russell,D.A.
  TITLE     Direct Submission
  JOURNAL   Submitted (01-MAR-2026)
FEATURES             Location/Qualifiers
     source          1..88
                     /organism="Mycobacterium phage Alice"
                     /host="Mycobacterium smegmatis mc2 155"
     CDS             9..20
                     /gene="1"
                     /locus_tag="SEA_ALICE_1"
                     /product="terminase"
                     /translation="MKP"
     CDS             29..40
                     /gene="2"
                     /locus_tag="SEA_ALICE_2"
                     /product="portal protein"
                     /translation="MAA"
     CDS             49..60
                     /gene="3"
                     /locus_tag="SEA_ALICE_3"
                     /product="hypothetical protein"
                     /translation="MFG"
     CDS             complement(69..80)
                     /gene="4"
                     /locus_tag="SEA_ALICE_4"
                     /product="major capsid protein"
                     /translation="MHH"
ORIGIN
        1 ggccggccat gaaaccctaa ggccggccat ggctgcttga ggccggccat gtttggttag
       61 ggccggcctt aatgatgcat ggccggcc
//
"#;

const TICKETS: &str = "id,type,phage_id,host_genus,cluster,subcluster,accession,description_field,annotation_status,annotation_author,retrieve_record,run_mode
1,add,Alice,Mycobacterium,C,C1,none,,draft,1,1,
";

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", Ulid::new()));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_cli<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_phage-import"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute phage-import binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_cli(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "phage-import failed (status={}):\nstdout:\n{stdout}\nstderr:\n{stderr}",
            output.status
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

struct ImportFixture {
    root: PathBuf,
    db: String,
    genomes: PathBuf,
    table: String,
    output: String,
}

impl ImportFixture {
    fn new() -> Self {
        let root = unique_temp_dir("phage-import-cli");
        let genomes = root.join("genomes");
        fs::create_dir_all(&genomes)
            .unwrap_or_else(|err| panic!("failed to create genome folder: {err}"));
        fs::write(genomes.join("Alice.gb"), ALICE_GB)
            .unwrap_or_else(|err| panic!("failed to write flat file: {err}"));
        let table = root.join("import_table.csv");
        fs::write(&table, TICKETS).unwrap_or_else(|err| panic!("failed to write tickets: {err}"));
        Self {
            db: path_arg(&root.join("phages.sqlite3")),
            table: path_arg(&table),
            output: path_arg(&root.join("output")),
            genomes,
            root,
        }
    }

    fn import_args(&self, extra: &[&str]) -> Vec<String> {
        let mut args = vec![
            "--db".to_string(),
            self.db.clone(),
            "import".to_string(),
            path_arg(&self.genomes),
            self.table.clone(),
            "-o".to_string(),
            self.output.clone(),
        ];
        args.extend(extra.iter().map(|arg| (*arg).to_string()));
        args
    }

    fn phage_count(&self) -> i64 {
        let store = SqliteStore::open(Path::new(&self.db))
            .unwrap_or_else(|err| panic!("failed to open store: {err:#}"));
        store.counts().unwrap_or_else(|err| panic!("failed to count rows: {err:#}")).phages
    }
}

impl Drop for ImportFixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

#[test]
fn run_mode_show_lists_every_flag() {
    let value = run_json(["run-mode", "show", "draft"]);
    assert_eq!(value["contract_version"], "cli.v1");
    assert_eq!(value["run_mode"], "draft");
    let flags = value["flags"].as_object().unwrap_or_else(|| panic!("flags missing: {value}"));
    assert_eq!(flags.len(), 11);
    assert_eq!(flags["check_replace"], true);
    assert_eq!(flags["import_locus_tag"], true);
    assert_eq!(flags["check_locus_tag"], false);
}

#[test]
fn custom_run_mode_reads_yaml_answers() {
    let dir = unique_temp_dir("phage-import-cli-flags");
    let answers = dir.join("flags.yaml");
    fs::write(&answers, "check_trna: true\nimport_locus_tag: false\n")
        .unwrap_or_else(|err| panic!("failed to write flags: {err}"));

    let value = run_json(["run-mode", "show", "custom", "--custom-flags", &path_arg(&answers)]);
    assert_eq!(value["flags"]["check_trna"], true);
    assert_eq!(value["flags"]["import_locus_tag"], false);
    assert_eq!(value["flags"]["check_replace"], false);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unknown_run_mode_exits_with_failure() {
    let output = run_cli(["run-mode", "show", "turbo"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("turbo"));
}

#[test]
fn db_migrate_brings_schema_up_to_date() {
    let dir = unique_temp_dir("phage-import-cli-db");
    let db = path_arg(&dir.join("phages.sqlite3"));

    let before = run_json(["--db", &db, "db", "schema-version"]);
    assert_eq!(before["up_to_date"], false);

    let migrated = run_json(["--db", &db, "db", "migrate"]);
    assert_eq!(migrated["dry_run"], false);
    assert_eq!(migrated["up_to_date"], true);

    let after = run_json(["--db", &db, "db", "schema-version"]);
    assert_eq!(after["up_to_date"], true);
    assert_eq!(after["current_version"], after["target_version"]);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn dry_run_import_reports_without_writing() {
    let fixture = ImportFixture::new();
    let summary = run_json(fixture.import_args(&[]));

    assert_eq!(summary["contract_version"], "cli.v1");
    assert_eq!(summary["dry_run"], true);
    assert_eq!(summary["committed"], 1);
    assert_eq!(summary["outcomes"][0]["state"], "committed");
    assert_eq!(fixture.phage_count(), 0);
    assert!(fixture.genomes.join("Alice.gb").exists());
}

#[test]
fn prod_run_commits_and_writes_the_log_file() {
    let fixture = ImportFixture::new();
    let log_file = path_arg(&fixture.root.join("import.log"));
    let summary = run_json(fixture.import_args(&["--prod-run", "-l", &log_file]));

    assert_eq!(summary["dry_run"], false);
    assert_eq!(summary["committed"], 1);
    assert_eq!(fixture.phage_count(), 1);
    assert!(!fixture.genomes.join("Alice.gb").exists());

    let log = fs::read_to_string(&log_file).unwrap_or_else(|err| panic!("log file missing: {err}"));
    assert!(log.contains("Import run finished"), "log:\n{log}");
}

#[test]
fn invalid_default_run_mode_aborts_before_output() {
    let fixture = ImportFixture::new();
    let output = run_cli(fixture.import_args(&["-r", "turbo"]));
    assert!(!output.status.success());
    assert!(!Path::new(&fixture.output).exists());
}

#[test]
fn unreachable_catalog_aborts_at_startup() {
    let fixture = ImportFixture::new();
    let output = run_cli(fixture.import_args(&["--catalog-url", "http://127.0.0.1:9"]));
    assert!(!output.status.success());
    assert!(!Path::new(&fixture.output).exists());
}
