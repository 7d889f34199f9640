use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use phage_import_core::TicketRow;

/// Column order used when writing ticket tables.
pub const TICKET_COLUMNS: [&str; 12] = [
    "id",
    "type",
    "phage_id",
    "host_genus",
    "cluster",
    "subcluster",
    "accession",
    "description_field",
    "annotation_status",
    "annotation_author",
    "retrieve_record",
    "run_mode",
];

const REQUIRED_COLUMNS: [&str; 3] = ["id", "type", "phage_id"];

/// Read every row of an import table.
///
/// Header names are matched case-insensitively. Columns other than `id`,
/// `type`, and `phage_id` may be missing.
///
/// # Errors
/// Returns an error when the file cannot be read, a required column is
/// missing, or a row cannot be decoded.
pub fn read_tickets(path: &Path) -> Result<Vec<TicketRow>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open import table {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).trim(Trim::All).from_reader(file);

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_ascii_lowercase)
        .collect::<csv::StringRecord>();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| header == column) {
            return Err(anyhow!(
                "import table {} is missing required column `{column}`",
                path.display()
            ));
        }
    }
    reader.set_headers(headers.clone());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("failed to read import table row {}", index + 1))?;
        let row: TicketRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("failed to decode import table row {}", index + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write `rows` as an import table with the full column set.
///
/// # Errors
/// Returns an error when the file cannot be created or written.
pub fn write_tickets(path: &Path, rows: &[TicketRow]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create ticket table {}", path.display()))?;
    writer.write_record(TICKET_COLUMNS).context("failed to write ticket table header")?;
    for row in rows {
        writer
            .write_record(row_cells(row))
            .with_context(|| format!("failed to write ticket {}", row.id))?;
    }
    writer.flush().with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

fn cell(value: Option<&String>) -> &str {
    value.map_or("", String::as_str)
}

fn row_cells(row: &TicketRow) -> [&str; 12] {
    [
        row.id.as_str(),
        row.ticket_type.as_str(),
        row.phage_id.as_str(),
        cell(row.host_genus.as_ref()),
        cell(row.cluster.as_ref()),
        cell(row.subcluster.as_ref()),
        cell(row.accession.as_ref()),
        cell(row.description_field.as_ref()),
        cell(row.annotation_status.as_ref()),
        cell(row.annotation_author.as_ref()),
        cell(row.retrieve_record.as_ref()),
        cell(row.run_mode.as_ref()),
    ]
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use ulid::Ulid;

    fn temp_table(contents: &str) -> Result<std::path::PathBuf> {
        let path = std::env::temp_dir().join(format!("phage-import-tickets-{}.csv", Ulid::new()));
        fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    #[test]
    fn reads_partial_columns_as_unset() -> Result<()> {
        let path = temp_table("ID,Type,Phage_ID,Host_Genus\n1, add ,Alice,Mycobacterium\n")?;
        let rows = read_tickets(&path)?;
        fs::remove_file(&path)?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticket_type, "add");
        assert_eq!(rows[0].host_genus.as_deref(), Some("Mycobacterium"));
        assert_eq!(rows[0].cluster, None);
        assert_eq!(rows[0].run_mode, None);
        Ok(())
    }

    #[test]
    fn missing_required_column_is_fatal() -> Result<()> {
        let path = temp_table("id,type,host_genus\n1,add,Mycobacterium\n")?;
        let result = read_tickets(&path);
        fs::remove_file(&path)?;

        match result {
            Err(err) => assert!(err.to_string().contains("phage_id")),
            Ok(rows) => panic!("expected a missing column error, got {rows:?}"),
        }
        Ok(())
    }

    #[test]
    fn written_tables_read_back_with_every_column() -> Result<()> {
        let path = std::env::temp_dir().join(format!("phage-import-tickets-{}.csv", Ulid::new()));
        let row = TicketRow {
            id: "7".to_string(),
            ticket_type: "replace".to_string(),
            phage_id: "Trixie".to_string(),
            accession: Some("retain".to_string()),
            run_mode: Some("final".to_string()),
            ..TicketRow::default()
        };
        write_tickets(&path, std::slice::from_ref(&row))?;
        let rows = read_tickets(&path)?;
        fs::remove_file(&path)?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].accession.as_deref(), Some("retain"));
        assert_eq!(rows[0].run_mode.as_deref(), Some("final"));
        Ok(())
    }
}
