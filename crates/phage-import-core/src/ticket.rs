use serde::{Deserialize, Serialize};

use crate::evaluation::{ErrorClass, Evaluation};
use crate::record::{AnnotationStatus, DescriptionField, Field, Keyword};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Add,
    Replace,
}

impl TicketType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "add" => Some(Self::Add),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

/// Declared value of one ticket field before resolution.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TicketValue<T> {
    Literal(T),
    Retrieve,
    Retain,
    Unset,
}

impl<T> TicketValue<T> {
    #[must_use]
    pub fn keyword(&self) -> Option<Keyword> {
        match self {
            Self::Literal(_) => None,
            Self::Retrieve => Some(Keyword::Retrieve),
            Self::Retain => Some(Keyword::Retain),
            Self::Unset => Some(Keyword::Unset),
        }
    }

    #[must_use]
    pub fn literal(&self) -> Option<&T> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }

    fn from_keyword(keyword: Keyword) -> Self {
        match keyword {
            Keyword::Retrieve => Self::Retrieve,
            Keyword::Retain => Self::Retain,
            Keyword::Unset => Self::Unset,
        }
    }
}

/// Which deferred keywords a ticket field accepts.
#[derive(Debug, Clone, Copy)]
struct FieldPolicy {
    field: Field,
    retrieve: bool,
    retain: bool,
}

const HOST_GENUS: FieldPolicy = FieldPolicy { field: Field::HostGenus, retrieve: true, retain: true };
const CLUSTER: FieldPolicy = FieldPolicy { field: Field::Cluster, retrieve: true, retain: true };
const SUBCLUSTER: FieldPolicy = FieldPolicy { field: Field::Subcluster, retrieve: true, retain: true };
const ACCESSION: FieldPolicy = FieldPolicy { field: Field::Accession, retrieve: true, retain: true };
const ANNOTATION_STATUS: FieldPolicy =
    FieldPolicy { field: Field::AnnotationStatus, retrieve: false, retain: true };
const ANNOTATION_AUTHOR: FieldPolicy =
    FieldPolicy { field: Field::AnnotationAuthor, retrieve: false, retain: true };
const RETRIEVE_RECORD: FieldPolicy =
    FieldPolicy { field: Field::RetrieveRecord, retrieve: false, retain: true };

/// One row of the import table, exactly as read.
///
/// Absent optional columns deserialize to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct TicketRow {
    pub id: String,
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub phage_id: String,
    #[serde(default)]
    pub host_genus: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub subcluster: Option<String>,
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub description_field: Option<String>,
    #[serde(default)]
    pub annotation_status: Option<String>,
    #[serde(default)]
    pub annotation_author: Option<String>,
    #[serde(default)]
    pub retrieve_record: Option<String>,
    #[serde(default)]
    pub run_mode: Option<String>,
}

impl TicketRow {
    /// Run mode this row selects once the run-wide default is applied.
    #[must_use]
    pub fn effective_run_mode(&self, defaults: &TicketDefaults) -> String {
        match self.run_mode.as_deref().map(str::trim) {
            Some(value) if Keyword::parse(value).is_none() => value.to_ascii_lowercase(),
            _ => defaults.run_mode.clone(),
        }
    }
}

/// Run-wide values used for empty `description_field` and `run_mode` cells.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TicketDefaults {
    pub description_field: DescriptionField,
    pub run_mode: String,
}

impl Default for TicketDefaults {
    fn default() -> Self {
        Self { description_field: DescriptionField::Product, run_mode: "draft".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Ticket {
    pub id: String,
    pub ticket_type: TicketType,
    pub phage_id: String,
    pub host_genus: TicketValue<String>,
    pub cluster: TicketValue<String>,
    pub subcluster: TicketValue<String>,
    pub accession: TicketValue<String>,
    pub annotation_status: TicketValue<AnnotationStatus>,
    pub annotation_author: TicketValue<bool>,
    pub retrieve_record: TicketValue<bool>,
    pub description_field: DescriptionField,
    pub run_mode: String,
}

impl Ticket {
    /// Parse a raw row into a typed ticket.
    ///
    /// Returns `None` when the row lacks a usable id, type, or phage id. Field
    /// level problems are reported as `ticket_format` errors and the affected
    /// field is left `Unset`.
    #[must_use]
    pub fn parse(row: &TicketRow, defaults: &TicketDefaults) -> (Option<Self>, Vec<Evaluation>) {
        let mut errors = Vec::new();

        let id = row.id.trim().to_string();
        if id.is_empty() {
            errors.push(Evaluation::error(
                "TKT_001",
                ErrorClass::TicketFormat,
                "The ticket id is missing.".to_string(),
            ));
        }

        let ticket_type = TicketType::parse(&row.ticket_type);
        if ticket_type.is_none() {
            errors.push(Evaluation::error(
                "TKT_002",
                ErrorClass::TicketFormat,
                format!("The ticket type '{}' is not valid.", row.ticket_type.trim()),
            ));
        }

        let phage_id = row.phage_id.trim().to_string();
        let phage_id_valid = !phage_id.is_empty()
            && !phage_id.chars().any(char::is_whitespace)
            && Keyword::parse(&phage_id).is_none();
        if !phage_id_valid {
            errors.push(Evaluation::error(
                "TKT_003",
                ErrorClass::TicketFormat,
                format!("The phage_id '{phage_id}' is not valid."),
            ));
        }

        let host_genus = parse_text(row.host_genus.as_deref(), HOST_GENUS, &mut errors);
        let cluster = parse_text(row.cluster.as_deref(), CLUSTER, &mut errors);
        let subcluster = parse_text(row.subcluster.as_deref(), SUBCLUSTER, &mut errors);
        let accession = parse_text(row.accession.as_deref(), ACCESSION, &mut errors);

        let annotation_status =
            parse_value(row.annotation_status.as_deref(), ANNOTATION_STATUS, &mut errors, |raw| {
                AnnotationStatus::parse(raw).ok_or_else(|| {
                    Evaluation::error(
                        "TKT_005",
                        ErrorClass::TicketFormat,
                        format!("The annotation_status '{raw}' is not valid."),
                    )
                })
            });
        let annotation_author =
            parse_value(row.annotation_author.as_deref(), ANNOTATION_AUTHOR, &mut errors, |raw| {
                parse_binary(raw).ok_or_else(|| {
                    Evaluation::error(
                        "TKT_006",
                        ErrorClass::TicketFormat,
                        format!("The annotation_author '{raw}' is not 0 or 1."),
                    )
                })
            });
        let retrieve_record =
            parse_value(row.retrieve_record.as_deref(), RETRIEVE_RECORD, &mut errors, |raw| {
                parse_binary(raw).ok_or_else(|| {
                    Evaluation::error(
                        "TKT_007",
                        ErrorClass::TicketFormat,
                        format!("The retrieve_record '{raw}' is not 0 or 1."),
                    )
                })
            });

        let description_field = match row.description_field.as_deref().map(str::trim) {
            Some(raw) if Keyword::parse(raw) != Some(Keyword::Unset) => {
                DescriptionField::parse(raw).unwrap_or_else(|| {
                    errors.push(Evaluation::error(
                        "TKT_008",
                        ErrorClass::TicketFormat,
                        format!("The description_field '{raw}' is not valid."),
                    ));
                    defaults.description_field
                })
            }
            _ => defaults.description_field,
        };

        let run_mode = row.effective_run_mode(defaults);

        let ticket = match ticket_type {
            Some(ticket_type) if !id.is_empty() && phage_id_valid => Some(Self {
                id,
                ticket_type,
                phage_id,
                host_genus,
                cluster,
                subcluster,
                accession,
                annotation_status,
                annotation_author,
                retrieve_record,
                description_field,
                run_mode,
            }),
            _ => None,
        };

        (ticket, errors)
    }
}

fn parse_binary(raw: &str) -> Option<bool> {
    match raw {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn keyword_allowed(keyword: Keyword, policy: FieldPolicy, errors: &mut Vec<Evaluation>) -> bool {
    let allowed = match keyword {
        Keyword::Retrieve => policy.retrieve,
        Keyword::Retain => policy.retain,
        Keyword::Unset => true,
    };
    if !allowed {
        errors.push(Evaluation::error(
            "TKT_004",
            ErrorClass::TicketFormat,
            format!(
                "The {} field cannot use the '{}' keyword.",
                policy.field.as_str(),
                keyword.as_str()
            ),
        ));
    }
    allowed
}

fn parse_text(
    cell: Option<&str>,
    policy: FieldPolicy,
    errors: &mut Vec<Evaluation>,
) -> TicketValue<String> {
    parse_value(cell, policy, errors, |raw| Ok(raw.to_string()))
}

fn parse_value<T, F>(
    cell: Option<&str>,
    policy: FieldPolicy,
    errors: &mut Vec<Evaluation>,
    literal: F,
) -> TicketValue<T>
where
    F: FnOnce(&str) -> Result<T, Evaluation>,
{
    let Some(raw) = cell.map(str::trim) else {
        return TicketValue::Unset;
    };
    if let Some(keyword) = Keyword::parse(raw) {
        return if keyword_allowed(keyword, policy, errors) {
            TicketValue::from_keyword(keyword)
        } else {
            TicketValue::Unset
        };
    }
    match literal(raw) {
        Ok(value) => TicketValue::Literal(value),
        Err(evaluation) => {
            errors.push(evaluation);
            TicketValue::Unset
        }
    }
}
