use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::evaluation::{ErrorClass, Evaluation};
use crate::pair::RecordPair;
use crate::record::{Field, FieldValue, Keyword, Record, RecordOrigin};
use crate::ticket::{Ticket, TicketType, TicketValue};

/// Values an external catalog holds for one phage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReferenceEntry {
    #[serde(default)]
    pub host_genus: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub subcluster: Option<String>,
    #[serde(default)]
    pub accession: Option<String>,
}

impl ReferenceEntry {
    fn to_record(&self, id: &str) -> Record {
        let mut record = Record::new(id, RecordOrigin::Reference);
        record.host_genus.clone_from(&self.host_genus);
        record.cluster.clone_from(&self.cluster);
        record.subcluster.clone_from(&self.subcluster);
        record.accession.clone_from(&self.accession);
        record
    }
}

/// Outcome of the resolution pass over one ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Resolution {
    pub retained: Vec<Field>,
    pub retrieved: Vec<Field>,
    pub evaluations: Vec<Evaluation>,
}

impl Resolution {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.evaluations.iter().any(Evaluation::is_error)
    }
}

struct Declared {
    field: Field,
    value: TicketValue<FieldValue>,
    required: bool,
}

fn lift<T>(value: &TicketValue<T>, literal: impl Fn(&T) -> FieldValue) -> TicketValue<FieldValue> {
    match value {
        TicketValue::Literal(inner) => TicketValue::Literal(literal(inner)),
        TicketValue::Retrieve => TicketValue::Retrieve,
        TicketValue::Retain => TicketValue::Retain,
        TicketValue::Unset => TicketValue::Unset,
    }
}

fn declared(ticket: &Ticket) -> [Declared; 7] {
    let text = |value: &String| FieldValue::Text(value.clone());
    [
        Declared { field: Field::HostGenus, value: lift(&ticket.host_genus, text), required: true },
        Declared { field: Field::Cluster, value: lift(&ticket.cluster, text), required: false },
        Declared { field: Field::Subcluster, value: lift(&ticket.subcluster, text), required: false },
        Declared { field: Field::Accession, value: lift(&ticket.accession, text), required: false },
        Declared {
            field: Field::AnnotationStatus,
            value: lift(&ticket.annotation_status, |status| FieldValue::text(status.as_str())),
            required: true,
        },
        Declared {
            field: Field::AnnotationAuthor,
            value: lift(&ticket.annotation_author, |flag| FieldValue::Flag(*flag)),
            required: true,
        },
        Declared {
            field: Field::RetrieveRecord,
            value: lift(&ticket.retrieve_record, |flag| FieldValue::Flag(*flag)),
            required: true,
        },
    ]
}

fn resolution_error(id: &str, message: String) -> Evaluation {
    Evaluation::error(id, ErrorClass::FieldResolution, message)
}

/// Resolve every ticket field into `parsed`.
///
/// Literals are written directly and unset optional fields keep whatever the
/// flat file supplied. `retain` fields are copied from the
/// persisted snapshot and `retrieve` fields from the reference entry, both
/// through [`RecordPair::copy_data`] keyed on record origin. Problems are
/// returned as `field_resolution` errors; nothing here fails the caller.
pub fn resolve_fields(
    ticket: &Ticket,
    persisted: Option<&Record>,
    reference: Option<&ReferenceEntry>,
    parsed: &mut Record,
) -> Resolution {
    let mut resolution = Resolution::default();
    let mut reported = Vec::new();

    for item in declared(ticket) {
        let outcome = match item.value {
            TicketValue::Literal(value) => parsed.set(item.field, value),
            TicketValue::Retain => {
                resolution.retained.push(item.field);
                parsed.set(item.field, FieldValue::Keyword(Keyword::Retain))
            }
            TicketValue::Retrieve => {
                resolution.retrieved.push(item.field);
                parsed.set(item.field, FieldValue::Keyword(Keyword::Retrieve))
            }
            TicketValue::Unset if item.required => {
                reported.push(item.field);
                resolution.evaluations.push(resolution_error(
                    "RES_003",
                    format!("The {} field is required but was not provided.", item.field.as_str()),
                ));
                Ok(())
            }
            TicketValue::Unset => Ok(()),
        };
        if let Err(err) = outcome {
            reported.push(item.field);
            resolution.evaluations.push(resolution_error("RES_006", err.to_string()));
        }
    }

    if !resolution.retained.is_empty() {
        match persisted {
            Some(persisted) => copy_pending(persisted, parsed, Keyword::Retain),
            None => {
                for field in &resolution.retained {
                    reported.push(*field);
                    resolution.evaluations.push(resolution_error(
                        "RES_001",
                        format!(
                            "The {} field is set to 'retain' but no stored genome {} exists.",
                            field.as_str(),
                            ticket.phage_id
                        ),
                    ));
                }
            }
        }
    }

    if !resolution.retrieved.is_empty() {
        match reference {
            Some(entry) => copy_pending(&entry.to_record(&ticket.phage_id), parsed, Keyword::Retrieve),
            None => {
                let context = match ticket.ticket_type {
                    TicketType::Add => "the new genome could not be matched to a reference entry",
                    TicketType::Replace => "no reference entry is available",
                };
                for field in &resolution.retrieved {
                    reported.push(*field);
                    resolution.evaluations.push(resolution_error(
                        "RES_002",
                        format!(
                            "The {} field is set to 'retrieve' but {context} for {}.",
                            field.as_str(),
                            ticket.phage_id
                        ),
                    ));
                }
            }
        }
    }

    let leftover = parsed.pending_fields().collect::<Vec<_>>();
    for (field, keyword) in leftover {
        if !reported.contains(&field) {
            reported.push(field);
            resolution.evaluations.push(resolution_error(
                "RES_005",
                format!("The {} field could not resolve '{}'.", field.as_str(), keyword.as_str()),
            ));
        }
    }

    for item in declared(ticket) {
        if item.required
            && !reported.contains(&item.field)
            && parsed.get(item.field) == FieldValue::Absent
        {
            resolution.evaluations.push(resolution_error(
                "RES_004",
                format!("The {} field resolved to no value.", item.field.as_str()),
            ));
        }
    }

    if parsed.cluster.as_deref().is_some_and(|cluster| cluster.eq_ignore_ascii_case("singleton")) {
        parsed.cluster = None;
    }

    resolution
}

fn copy_pending(source: &Record, parsed: &mut Record, keyword: Keyword) {
    let first = FieldValue::text(source.origin.as_str());
    let second = FieldValue::text(parsed.origin.as_str());
    let placeholder = Record::new(&parsed.id, parsed.origin);
    let owned = std::mem::replace(parsed, placeholder);
    let mut pair = RecordPair::new(Cow::Borrowed(source), Cow::Owned(owned));
    pair.copy_data(Field::Origin, &first, &second, Some(keyword));
    let (_, resolved) = pair.into_records();
    *parsed = resolved.into_owned();
}
