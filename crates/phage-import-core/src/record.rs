use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::translation::{gc_percent, DEFAULT_TRANSLATION_TABLE};
use crate::CoreError;

/// Deferred-value keyword a field may hold until the resolution pass runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Keyword {
    Retrieve,
    Retain,
    Unset,
}

impl Keyword {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retrieve => "retrieve",
            Self::Retain => "retain",
            Self::Unset => "none",
        }
    }

    /// Recognize a keyword case-insensitively; the empty string means `Unset`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retrieve" => Some(Self::Retrieve),
            "retain" => Some(Self::Retain),
            "none" | "" => Some(Self::Unset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    Draft,
    Final,
    Unknown,
}

impl AnnotationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "final" => Some(Self::Final),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionField {
    Product,
    Function,
    Note,
}

impl DescriptionField {
    pub const ALL: [Self; 3] = [Self::Product, Self::Function, Self::Note];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Function => "function",
            Self::Note => "note",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "product" => Some(Self::Product),
            "function" => Some(Self::Function),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    /// Short orientation code stored in the feature table.
    #[must_use]
    pub fn as_short(self) -> &'static str {
        match self {
            Self::Forward => "F",
            Self::Reverse => "R",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "f" | "forward" | "1" => Some(Self::Forward),
            "r" | "reverse" | "-1" => Some(Self::Reverse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    FlatFile,
    Persisted,
    Reference,
    Ticket,
}

impl RecordOrigin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlatFile => "flat_file",
            Self::Persisted => "persisted",
            Self::Reference => "reference",
            Self::Ticket => "ticket",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "flat_file" => Some(Self::FlatFile),
            "persisted" => Some(Self::Persisted),
            "reference" => Some(Self::Reference),
            "ticket" => Some(Self::Ticket),
            _ => None,
        }
    }
}

/// Closed set of record attributes reachable by name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    Name,
    Origin,
    HostGenus,
    Cluster,
    Subcluster,
    Accession,
    AnnotationStatus,
    AnnotationAuthor,
    RetrieveRecord,
    Date,
    Sequence,
    Description,
    Source,
    Organism,
    Authors,
    TranslationTable,
}

impl Field {
    pub const ALL: [Self; 17] = [
        Self::Id,
        Self::Name,
        Self::Origin,
        Self::HostGenus,
        Self::Cluster,
        Self::Subcluster,
        Self::Accession,
        Self::AnnotationStatus,
        Self::AnnotationAuthor,
        Self::RetrieveRecord,
        Self::Date,
        Self::Sequence,
        Self::Description,
        Self::Source,
        Self::Organism,
        Self::Authors,
        Self::TranslationTable,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Origin => "origin",
            Self::HostGenus => "host_genus",
            Self::Cluster => "cluster",
            Self::Subcluster => "subcluster",
            Self::Accession => "accession",
            Self::AnnotationStatus => "annotation_status",
            Self::AnnotationAuthor => "annotation_author",
            Self::RetrieveRecord => "retrieve_record",
            Self::Date => "date",
            Self::Sequence => "sequence",
            Self::Description => "description",
            Self::Source => "source",
            Self::Organism => "organism",
            Self::Authors => "authors",
            Self::TranslationTable => "translation_table",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

/// Value of one record attribute as seen through the field accessor table.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Int(i64),
    Date(Date),
    Keyword(Keyword),
    Absent,
}

impl FieldValue {
    #[must_use]
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    fn optional_text(value: Option<&String>) -> Self {
        value.map_or(Self::Absent, |value| Self::Text(value.clone()))
    }

    fn into_optional_text(self, field: Field) -> Result<Option<String>, CoreError> {
        match self {
            Self::Text(value) => Ok(Some(value)),
            Self::Absent => Ok(None),
            other => Err(mismatch(field, &other)),
        }
    }

    fn into_text(self, field: Field) -> Result<String, CoreError> {
        Ok(self.into_optional_text(field)?.unwrap_or_default())
    }

    fn into_optional_flag(self, field: Field) -> Result<Option<bool>, CoreError> {
        match self {
            Self::Flag(value) => Ok(Some(value)),
            Self::Int(0) => Ok(Some(false)),
            Self::Int(1) => Ok(Some(true)),
            Self::Absent => Ok(None),
            other => Err(mismatch(field, &other)),
        }
    }
}

fn mismatch(field: Field, value: &FieldValue) -> CoreError {
    CoreError::FieldType(format!("{} cannot hold {value:?}", field.as_str()))
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Cds {
    pub id: String,
    pub genome_id: String,
    /// 0-based inclusive start of the feature span.
    pub start: u64,
    /// 0-based exclusive end of the feature span.
    pub stop: u64,
    pub strand: Strand,
    pub parts: usize,
    pub wraps_origin: bool,
    pub exact: bool,
    pub locus_tag: String,
    pub gene: String,
    pub name: String,
    pub product: String,
    pub function: String,
    pub note: String,
    pub translation: String,
    pub translation_table: u8,
    pub nucleotide_seq: String,
}

impl Cds {
    #[must_use]
    pub fn new(genome_id: &str, start: u64, stop: u64, strand: Strand) -> Self {
        Self {
            id: String::new(),
            genome_id: genome_id.to_string(),
            start,
            stop,
            strand,
            parts: 1,
            wraps_origin: false,
            exact: true,
            locus_tag: String::new(),
            gene: String::new(),
            name: String::new(),
            product: String::new(),
            function: String::new(),
            note: String::new(),
            translation: String::new(),
            translation_table: DEFAULT_TRANSLATION_TABLE,
            nucleotide_seq: String::new(),
        }
    }

    #[must_use]
    pub fn coordinates(&self) -> (u64, u64) {
        (self.start, self.stop)
    }

    #[must_use]
    pub fn description(&self, field: DescriptionField) -> &str {
        match field {
            DescriptionField::Product => &self.product,
            DescriptionField::Function => &self.function,
            DescriptionField::Note => &self.note,
        }
    }

    #[must_use]
    pub fn translation_length(&self) -> usize {
        self.translation.chars().count()
    }

    /// Feature number encoded in the locus tag, e.g. `20` for `SEA_TRIXIE_20`
    /// or `10` for `TRIXIE_gp10`.
    #[must_use]
    pub fn locus_tag_number(&self) -> Option<String> {
        if self.locus_tag.is_empty() {
            return None;
        }
        let genome_id = self.genome_id.to_ascii_lowercase();
        let parts = self.locus_tag.split('_').collect::<Vec<_>>();
        let found = if genome_id.is_empty() {
            None
        } else {
            parts.iter().position(|part| part.to_ascii_lowercase().contains(&genome_id))
        };
        let value = match found {
            Some(index) if index == parts.len() - 1 => {
                let part = parts[index];
                let lower = part.to_ascii_lowercase();
                let offset = lower.find(&genome_id).map_or(0, |at| at + genome_id.len());
                part.get(offset..).unwrap_or_default().to_string()
            }
            _ => parts.last().map_or_else(String::new, |part| (*part).to_string()),
        };
        let (prefix, number) = split_alpha_numeric(&value);
        if (prefix.is_empty() || prefix.eq_ignore_ascii_case("gp")) && !number.is_empty() {
            Some(number.to_string())
        } else {
            None
        }
    }

    /// Preferred feature name: the gene qualifier, then the locus tag number.
    #[must_use]
    pub fn derived_name(&self) -> String {
        if !self.gene.trim().is_empty() {
            return self.gene.trim().to_string();
        }
        self.locus_tag_number().unwrap_or_default()
    }
}

fn split_alpha_numeric(value: &str) -> (&str, &str) {
    let boundary = value.find(|c: char| c.is_ascii_digit()).unwrap_or(value.len());
    let (left, right) = value.split_at(boundary);
    if right.chars().all(|c| c.is_ascii_digit()) {
        (left, right)
    } else {
        (value, "")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Trna {
    pub id: String,
    pub genome_id: String,
    pub start: u64,
    pub stop: u64,
    pub strand: Strand,
    pub exact: bool,
    pub kind: String,
    pub product: String,
    pub note: String,
}

impl Trna {
    #[must_use]
    pub fn length(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct SourceFeature {
    pub id: String,
    pub organism: String,
    pub host: String,
    pub lab_host: String,
}

/// Derived feature counts computed on first access.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Tallies {
    pub cds_count: usize,
    pub trna_count: usize,
    pub source_count: usize,
    pub duplicate_coordinates: BTreeSet<(u64, u64)>,
    pub duplicate_descriptions: BTreeSet<String>,
    pub described: BTreeMap<DescriptionField, usize>,
}

impl Tallies {
    fn compute(cds: &[Cds], trna: &[Trna], sources: &[SourceFeature]) -> Self {
        let mut seen_coordinates = BTreeSet::new();
        let mut duplicate_coordinates = BTreeSet::new();
        for feature in cds {
            if !seen_coordinates.insert(feature.coordinates()) {
                duplicate_coordinates.insert(feature.coordinates());
            }
        }

        let mut described = BTreeMap::new();
        for field in DescriptionField::ALL {
            let count = cds
                .iter()
                .filter(|feature| !is_generic_description(feature.description(field)))
                .count();
            described.insert(field, count);
        }

        let mut seen_descriptions = BTreeSet::new();
        let mut duplicate_descriptions = BTreeSet::new();
        for feature in cds {
            let product = feature.product.trim().to_ascii_lowercase();
            if is_generic_description(&product) {
                continue;
            }
            if !seen_descriptions.insert(product.clone()) {
                duplicate_descriptions.insert(product);
            }
        }

        Self {
            cds_count: cds.len(),
            trna_count: trna.len(),
            source_count: sources.len(),
            duplicate_coordinates,
            duplicate_descriptions,
            described,
        }
    }

    #[must_use]
    pub fn described(&self, field: DescriptionField) -> usize {
        self.described.get(&field).copied().unwrap_or(0)
    }
}

const GENERIC_DESCRIPTIONS: &[&str] = &[
    "hypothetical protein",
    "hypothetical",
    "phage protein",
    "protein",
    "unknown",
    "unknown function",
    "putative protein",
    "predicted protein",
    "conserved protein",
    "conserved hypothetical protein",
    "uncharacterized protein",
    "gp",
    "orf",
];

/// True when a feature description carries no functional information.
#[must_use]
pub fn is_generic_description(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    let mut words = lowered.split_whitespace().collect::<Vec<_>>();
    if let Some(first) = words.first() {
        let (prefix, number) = split_alpha_numeric(first.trim_end_matches([';', ',']));
        if (prefix == "gp" || prefix == "orf") && !number.is_empty() {
            words.remove(0);
        }
    }
    let remainder = words.join(" ");
    let remainder = remainder.trim_matches(|c: char| c == ';' || c == ',' || c.is_whitespace());
    remainder.is_empty() || GENERIC_DESCRIPTIONS.contains(&remainder)
}

#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub origin: RecordOrigin,
    pub host_genus: Option<String>,
    pub cluster: Option<String>,
    pub subcluster: Option<String>,
    pub accession: Option<String>,
    pub annotation_status: Option<AnnotationStatus>,
    pub annotation_author: Option<bool>,
    pub retrieve_record: Option<bool>,
    pub date: Option<Date>,
    pub sequence: String,
    pub description: String,
    pub source: String,
    pub organism: String,
    pub authors: String,
    pub translation_table: u8,
    pub filename: Option<String>,
    cds: Vec<Cds>,
    trna: Vec<Trna>,
    sources: Vec<SourceFeature>,
    pending: BTreeMap<Field, Keyword>,
    #[serde(skip)]
    tallies: OnceCell<Tallies>,
}

impl Record {
    #[must_use]
    pub fn new(id: &str, origin: RecordOrigin) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            origin,
            host_genus: None,
            cluster: None,
            subcluster: None,
            accession: None,
            annotation_status: None,
            annotation_author: None,
            retrieve_record: None,
            date: None,
            sequence: String::new(),
            description: String::new(),
            source: String::new(),
            organism: String::new(),
            authors: String::new(),
            translation_table: DEFAULT_TRANSLATION_TABLE,
            filename: None,
            cds: Vec::new(),
            trna: Vec::new(),
            sources: Vec::new(),
            pending: BTreeMap::new(),
            tallies: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn cds(&self) -> &[Cds] {
        &self.cds
    }

    #[must_use]
    pub fn trna(&self) -> &[Trna] {
        &self.trna
    }

    #[must_use]
    pub fn sources(&self) -> &[SourceFeature] {
        &self.sources
    }

    pub fn push_cds(&mut self, feature: Cds) {
        self.cds.push(feature);
        self.tallies = OnceCell::new();
    }

    pub fn push_trna(&mut self, feature: Trna) {
        self.trna.push(feature);
        self.tallies = OnceCell::new();
    }

    pub fn push_source(&mut self, feature: SourceFeature) {
        self.sources.push(feature);
        self.tallies = OnceCell::new();
    }

    /// Assign `{id}_CDS_{n}` style identifiers in record order and stamp the
    /// parent id on every feature.
    pub fn assign_feature_ids(&mut self) {
        for (index, feature) in self.cds.iter_mut().enumerate() {
            feature.genome_id.clone_from(&self.id);
            feature.id = format!("{}_CDS_{}", self.id, index + 1);
        }
        for (index, feature) in self.trna.iter_mut().enumerate() {
            feature.genome_id.clone_from(&self.id);
            feature.id = format!("{}_TRNA_{}", self.id, index + 1);
        }
        for (index, feature) in self.sources.iter_mut().enumerate() {
            feature.id = format!("{}_SRC_{}", self.id, index + 1);
        }
    }

    pub fn tallies(&self) -> &Tallies {
        self.tallies.get_or_init(|| Tallies::compute(&self.cds, &self.trna, &self.sources))
    }

    #[must_use]
    pub fn sequence_length(&self) -> usize {
        self.sequence.len()
    }

    #[must_use]
    pub fn gc_content(&self) -> f64 {
        gc_percent(&self.sequence)
    }

    #[must_use]
    pub fn pending(&self, field: Field) -> Option<Keyword> {
        self.pending.get(&field).copied()
    }

    pub fn pending_fields(&self) -> impl Iterator<Item = (Field, Keyword)> + '_ {
        self.pending.iter().map(|(field, keyword)| (*field, *keyword))
    }

    /// Mark a field as holding a deferred keyword instead of a value.
    pub fn set_pending(&mut self, field: Field, keyword: Keyword) {
        self.pending.insert(field, keyword);
    }

    /// Read one attribute through the accessor table; pending keywords shadow
    /// the stored value.
    #[must_use]
    pub fn get(&self, field: Field) -> FieldValue {
        if let Some(keyword) = self.pending(field) {
            return FieldValue::Keyword(keyword);
        }
        match field {
            Field::Id => FieldValue::text(&self.id),
            Field::Name => FieldValue::text(&self.name),
            Field::Origin => FieldValue::text(self.origin.as_str()),
            Field::HostGenus => FieldValue::optional_text(self.host_genus.as_ref()),
            Field::Cluster => FieldValue::optional_text(self.cluster.as_ref()),
            Field::Subcluster => FieldValue::optional_text(self.subcluster.as_ref()),
            Field::Accession => FieldValue::optional_text(self.accession.as_ref()),
            Field::AnnotationStatus => self
                .annotation_status
                .map_or(FieldValue::Absent, |status| FieldValue::text(status.as_str())),
            Field::AnnotationAuthor => self.annotation_author.map_or(FieldValue::Absent, FieldValue::Flag),
            Field::RetrieveRecord => self.retrieve_record.map_or(FieldValue::Absent, FieldValue::Flag),
            Field::Date => self.date.map_or(FieldValue::Absent, FieldValue::Date),
            Field::Sequence => FieldValue::text(&self.sequence),
            Field::Description => FieldValue::text(&self.description),
            Field::Source => FieldValue::text(&self.source),
            Field::Organism => FieldValue::text(&self.organism),
            Field::Authors => FieldValue::text(&self.authors),
            Field::TranslationTable => FieldValue::Int(i64::from(self.translation_table)),
        }
    }

    /// Write one attribute through the accessor table, clearing any pending
    /// keyword for it. Writing a keyword marks the field pending instead.
    ///
    /// # Errors
    /// Returns [`CoreError::FieldType`] when the value does not fit the field.
    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), CoreError> {
        if let FieldValue::Keyword(keyword) = value {
            self.set_pending(field, keyword);
            return Ok(());
        }
        match field {
            Field::Id => self.id = value.into_text(field)?,
            Field::Name => self.name = value.into_text(field)?,
            Field::Origin => {
                let raw = value.into_text(field)?;
                self.origin = RecordOrigin::parse(&raw)
                    .ok_or_else(|| CoreError::FieldType(format!("unknown origin: {raw}")))?;
            }
            Field::HostGenus => self.host_genus = value.into_optional_text(field)?,
            Field::Cluster => self.cluster = value.into_optional_text(field)?,
            Field::Subcluster => self.subcluster = value.into_optional_text(field)?,
            Field::Accession => self.accession = value.into_optional_text(field)?,
            Field::AnnotationStatus => {
                self.annotation_status = match value.into_optional_text(field)? {
                    Some(raw) => Some(AnnotationStatus::parse(&raw).ok_or_else(|| {
                        CoreError::FieldType(format!("unknown annotation status: {raw}"))
                    })?),
                    None => None,
                };
            }
            Field::AnnotationAuthor => self.annotation_author = value.into_optional_flag(field)?,
            Field::RetrieveRecord => self.retrieve_record = value.into_optional_flag(field)?,
            Field::Date => {
                self.date = match value {
                    FieldValue::Date(date) => Some(date),
                    FieldValue::Absent => None,
                    other => return Err(mismatch(field, &other)),
                };
            }
            Field::Sequence => self.sequence = value.into_text(field)?,
            Field::Description => self.description = value.into_text(field)?,
            Field::Source => self.source = value.into_text(field)?,
            Field::Organism => self.organism = value.into_text(field)?,
            Field::Authors => self.authors = value.into_text(field)?,
            Field::TranslationTable => {
                self.translation_table = match value {
                    FieldValue::Int(table) => u8::try_from(table).map_err(|_| {
                        CoreError::FieldType(format!("translation table out of range: {table}"))
                    })?,
                    other => return Err(mismatch(field, &other)),
                };
            }
        }
        self.pending.remove(&field);
        Ok(())
    }

    /// Copy one attribute, including its pending keyword state, from `other`.
    pub fn copy_field_from(&mut self, other: &Record, field: Field) {
        match field {
            Field::Id => self.id.clone_from(&other.id),
            Field::Name => self.name.clone_from(&other.name),
            Field::Origin => self.origin = other.origin,
            Field::HostGenus => self.host_genus.clone_from(&other.host_genus),
            Field::Cluster => self.cluster.clone_from(&other.cluster),
            Field::Subcluster => self.subcluster.clone_from(&other.subcluster),
            Field::Accession => self.accession.clone_from(&other.accession),
            Field::AnnotationStatus => self.annotation_status = other.annotation_status,
            Field::AnnotationAuthor => self.annotation_author = other.annotation_author,
            Field::RetrieveRecord => self.retrieve_record = other.retrieve_record,
            Field::Date => self.date = other.date,
            Field::Sequence => self.sequence.clone_from(&other.sequence),
            Field::Description => self.description.clone_from(&other.description),
            Field::Source => self.source.clone_from(&other.source),
            Field::Organism => self.organism.clone_from(&other.organism),
            Field::Authors => self.authors.clone_from(&other.authors),
            Field::TranslationTable => self.translation_table = other.translation_table,
        }
        match other.pending(field) {
            Some(keyword) => {
                self.pending.insert(field, keyword);
            }
            None => {
                self.pending.remove(&field);
            }
        }
    }

    /// Copy the feature lists and source filename from `other`.
    ///
    /// Tallies are recomputed on next access.
    pub fn copy_features_from(&mut self, other: &Record) {
        self.cds.clone_from(&other.cds);
        self.trna.clone_from(&other.trna);
        self.sources.clone_from(&other.sources);
        self.filename.clone_from(&other.filename);
        self.tallies = OnceCell::new();
    }
}
