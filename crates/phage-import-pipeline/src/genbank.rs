use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use gb_io::seq::{Feature, Location, Seq};
use phage_import_core::{
    reverse_complement, Cds, Record, RecordOrigin, SourceFeature, Strand, Trna,
    DEFAULT_TRANSLATION_TABLE,
};
use serde::{Deserialize, Serialize};
use time::{Date, Month};

const FLAT_FILE_EXTENSIONS: [&str; 5] = ["gb", "gbk", "gbf", "genbank", "txt"];
const DRAFT_SUFFIX: &str = "_Draft";

/// Header value the record id is derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenomeIdField {
    #[default]
    OrganismName,
    SourceName,
    DescriptionName,
    Filename,
}

impl GenomeIdField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrganismName => "organism_name",
            Self::SourceName => "source_name",
            Self::DescriptionName => "description_name",
            Self::Filename => "filename",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "organism_name" => Some(Self::OrganismName),
            "source_name" => Some(Self::SourceName),
            "description_name" => Some(Self::DescriptionName),
            "filename" => Some(Self::Filename),
            _ => None,
        }
    }
}

/// Flat files in `folder`, sorted by name. Hidden files are skipped.
///
/// # Errors
/// Returns an error when the folder cannot be listed.
pub fn list_flat_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)
        .with_context(|| format!("failed to list genome folder {}", folder.display()))?
    {
        let path = entry.context("failed to read genome folder entry")?.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        let recognized = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FLAT_FILE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && !hidden && recognized {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse the first record of a GenBank file into a [`Record`].
///
/// # Errors
/// Returns an error when the file cannot be parsed or holds no record.
pub fn parse_flat_file(path: &Path, id_field: GenomeIdField) -> Result<Record> {
    let seqs = gb_io::reader::parse_file(path)
        .with_context(|| format!("failed to parse flat file {}", path.display()))?;
    let seq = seqs
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("flat file {} holds no record", path.display()))?;
    record_from_seq(&seq, path, id_field)
}

/// Map one parsed GenBank entry onto a [`Record`].
///
/// # Errors
/// Returns an error when no record id can be derived.
pub fn record_from_seq(seq: &Seq, path: &Path, id_field: GenomeIdField) -> Result<Record> {
    let description = seq.definition.clone().unwrap_or_default();
    let (source, organism) = seq
        .source
        .as_ref()
        .map(|source| (source.source.clone(), source.organism.clone().unwrap_or_default()))
        .unwrap_or_default();
    let file_name =
        path.file_name().and_then(|name| name.to_str()).unwrap_or_default().to_string();

    let name = match id_field {
        GenomeIdField::OrganismName => last_word(&organism),
        GenomeIdField::SourceName => last_word(&source),
        GenomeIdField::DescriptionName => {
            last_word(description.split(',').next().unwrap_or_default())
        }
        GenomeIdField::Filename => file_name.split('.').next().unwrap_or_default().to_string(),
    };
    if name.is_empty() {
        return Err(anyhow!(
            "cannot derive a genome id from {} using {}",
            path.display(),
            id_field.as_str()
        ));
    }
    let id = name.strip_suffix(DRAFT_SUFFIX).unwrap_or(&name).to_string();

    let mut record = Record::new(&id, RecordOrigin::FlatFile);
    record.name = name;
    record.filename = Some(file_name);
    record.sequence = String::from_utf8_lossy(&seq.seq).to_ascii_uppercase();
    record.description = description;
    record.source = source;
    record.organism = organism;
    record.accession = seq
        .accession
        .as_deref()
        .and_then(|value| value.split_whitespace().next())
        .map(|value| value.split('.').next().unwrap_or(value).to_string())
        .filter(|value| !value.is_empty());
    record.date = seq.date.as_ref().and_then(|date| {
        let month = Month::try_from(u8::try_from(date.month()).ok()?).ok()?;
        Date::from_calendar_date(date.year(), month, u8::try_from(date.day()).ok()?).ok()
    });
    record.authors = seq
        .references
        .iter()
        .filter_map(|reference| reference.authors.as_deref())
        .map(str::trim)
        .filter(|authors| !authors.is_empty())
        .collect::<Vec<_>>()
        .join(";");

    for feature in &seq.features {
        match feature.kind.to_string().as_str() {
            "CDS" => record.push_cds(cds_from_feature(feature, &id, &record.sequence)),
            "tRNA" | "tmRNA" => record.push_trna(trna_from_feature(feature, &id)),
            "source" => record.push_source(SourceFeature {
                id: String::new(),
                organism: qualifier(feature, "organism"),
                host: qualifier(feature, "host"),
                lab_host: qualifier(feature, "lab_host"),
            }),
            _ => {}
        }
    }
    if let Some(table) = record.cds().first().map(|feature| feature.translation_table) {
        record.translation_table = table;
    }
    record.assign_feature_ids();
    Ok(record)
}

fn last_word(value: &str) -> String {
    value.split_whitespace().last().unwrap_or_default().to_string()
}

fn qualifier(feature: &Feature, key: &str) -> String {
    feature
        .qualifier_values(key.into())
        .next()
        .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: i64,
    end: i64,
    fuzzy: bool,
    reverse: bool,
}

/// Collect spans in transcription order.
fn collect_spans(location: &Location, reverse: bool, spans: &mut Vec<Span>) {
    match location {
        Location::Range((from, before), (to, after)) => spans.push(Span {
            start: *from,
            end: *to,
            fuzzy: before.0 || after.0,
            reverse,
        }),
        Location::Complement(inner) => {
            let first = spans.len();
            collect_spans(inner, !reverse, spans);
            spans[first..].reverse();
        }
        Location::Join(parts)
        | Location::Order(parts)
        | Location::Bond(parts)
        | Location::OneOf(parts) => {
            for part in parts {
                collect_spans(part, reverse, spans);
            }
        }
        Location::External(_, Some(inner)) => collect_spans(inner, reverse, spans),
        Location::External(_, None) | Location::Between(_, _) | Location::Gap(_) => {}
    }
}

/// Spans in genome order plus strand, wrap, and exactness.
struct Extent {
    spans: Vec<Span>,
    strand: Strand,
    start: u64,
    stop: u64,
    wraps_origin: bool,
    exact: bool,
}

fn extent(location: &Location) -> Extent {
    let mut spans = Vec::new();
    collect_spans(location, false, &mut spans);
    let reverse = spans.iter().filter(|span| span.reverse).count() * 2 > spans.len();
    if reverse {
        spans.reverse();
    }
    let strand = if reverse { Strand::Reverse } else { Strand::Forward };
    let exact = !spans.is_empty() && spans.iter().all(|span| !span.fuzzy && span.start >= 0);
    let wraps_origin = spans.windows(2).any(|pair| pair[1].start < pair[0].start);

    let to_u64 = |value: i64| u64::try_from(value).unwrap_or_default();
    let (start, stop) = if wraps_origin {
        let high = spans.iter().max_by_key(|span| span.start);
        let low = spans.iter().min_by_key(|span| span.start);
        (high.map_or(0, |span| to_u64(span.start)), low.map_or(0, |span| to_u64(span.end)))
    } else {
        (
            spans.iter().map(|span| span.start).min().map_or(0, to_u64),
            spans.iter().map(|span| span.end).max().map_or(0, to_u64),
        )
    };
    Extent { spans, strand, start, stop, wraps_origin, exact }
}

fn span_sequence(sequence: &str, spans: &[Span], strand: Strand) -> String {
    let mut nucleotides = String::new();
    for span in spans {
        let (Ok(from), Ok(to)) = (usize::try_from(span.start), usize::try_from(span.end)) else {
            continue;
        };
        if let Some(slice) = sequence.get(from..to) {
            nucleotides.push_str(slice);
        }
    }
    match strand {
        Strand::Forward => nucleotides,
        Strand::Reverse => reverse_complement(&nucleotides),
    }
}

fn cds_from_feature(feature: &Feature, genome_id: &str, sequence: &str) -> Cds {
    let extent = extent(&feature.location);
    let mut cds = Cds::new(genome_id, extent.start, extent.stop, extent.strand);
    cds.parts = extent.spans.len().max(1);
    cds.wraps_origin = extent.wraps_origin;
    cds.exact = extent.exact;
    cds.nucleotide_seq = span_sequence(sequence, &extent.spans, extent.strand);
    cds.locus_tag = qualifier(feature, "locus_tag");
    cds.gene = qualifier(feature, "gene");
    cds.product = qualifier(feature, "product");
    cds.function = qualifier(feature, "function");
    cds.note = qualifier(feature, "note");
    cds.translation = qualifier(feature, "translation").replace(' ', "");
    cds.translation_table =
        qualifier(feature, "transl_table").parse().unwrap_or(DEFAULT_TRANSLATION_TABLE);
    cds.name = cds.derived_name();
    cds
}

fn trna_from_feature(feature: &Feature, genome_id: &str) -> Trna {
    let extent = extent(&feature.location);
    Trna {
        id: String::new(),
        genome_id: genome_id.to_string(),
        start: extent.start,
        stop: extent.stop,
        strand: extent.strand,
        exact: extent.exact,
        kind: feature.kind.to_string(),
        product: qualifier(feature, "product"),
        note: qualifier(feature, "note"),
    }
}
