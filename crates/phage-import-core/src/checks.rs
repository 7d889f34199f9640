use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::evaluation::{ErrorClass, EvalStatus, Evaluation, EvaluationTree, Subject};
use crate::pair::{FeaturePair, RecordPair};
use crate::record::{AnnotationStatus, Cds, DescriptionField, Record, Trna};
use crate::run_mode::{EvalFlag, EvalFlags};
use crate::ticket::{Ticket, TicketType, TicketValue};
use crate::translation::{translate_cds, DEFAULT_TRANSLATION_TABLE};

const DNA_ALPHABET: &str = "ACGTRYKMSWBDHVN";
const PROTEIN_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWY";
const TRNA_LENGTH: std::ops::RangeInclusive<u64> = 60..=100;

/// Values already known to the collection; new tickets must use them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReferenceSets {
    pub host_genera: BTreeSet<String>,
    pub clusters: BTreeSet<String>,
    pub subclusters: BTreeSet<String>,
}

impl ReferenceSets {
    pub fn merge(&mut self, other: &Self) {
        self.host_genera.extend(other.host_genera.iter().cloned());
        self.clusters.extend(other.clusters.iter().cloned());
        self.subclusters.extend(other.subclusters.iter().cloned());
    }
}

/// Run-level inputs to the check pass for one bundle.
#[derive(Debug, Clone)]
pub struct CheckContext<'a> {
    pub flags: EvalFlags,
    pub reference_sets: &'a ReferenceSets,
    /// Stored genome already holding the parsed sequence, if any.
    pub sequence_owner: Option<String>,
    /// Stored genome already holding the parsed accession, if any.
    pub accession_owner: Option<String>,
    pub expected_author: String,
}

/// Run every check enabled by `context.flags` and collect the results.
///
/// Checks whose flag is off are skipped entirely.
#[must_use]
pub fn check_bundle(
    ticket: &Ticket,
    parsed: &Record,
    persisted: Option<&Record>,
    context: &CheckContext<'_>,
) -> EvaluationTree {
    let mut tree = EvaluationTree::new();
    tree.extend(&Subject::Ticket, check_ticket(ticket));

    let record_subject = Subject::Record(parsed.id.clone());
    tree.extend(&record_subject, check_record(ticket, parsed, persisted, context));

    for feature in parsed.cds() {
        tree.extend(&Subject::Cds(feature.id.clone()), check_cds(ticket, parsed, feature, context));
    }
    if context.flags.enabled(EvalFlag::CheckTrna) {
        for feature in parsed.trna() {
            tree.extend(&Subject::Trna(feature.id.clone()), check_trna(feature));
        }
    }

    if let (TicketType::Replace, Some(persisted)) = (ticket.ticket_type, persisted) {
        if context.flags.enabled(EvalFlag::CheckReplace) {
            check_replacement(ticket, parsed, persisted, &mut tree);
        }
    }
    tree
}

fn check_ticket(ticket: &Ticket) -> Vec<Evaluation> {
    let mut results = Vec::new();
    let class = ErrorClass::TicketFormat;

    if let TicketValue::Literal(subcluster) = &ticket.subcluster {
        results.push(Evaluation::outcome(
            "TKT_009",
            class,
            !matches!(ticket.cluster, TicketValue::Unset),
            EvalStatus::Error,
            format!("Subcluster {subcluster} needs a cluster."),
        ));
        if let TicketValue::Literal(cluster) = &ticket.cluster {
            let consistent = subcluster
                .strip_prefix(cluster.as_str())
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
            results.push(Evaluation::outcome(
                "TKT_010",
                class,
                consistent,
                EvalStatus::Error,
                format!("Subcluster {subcluster} belongs to cluster {cluster}."),
            ));
        }
    }

    if ticket.ticket_type == TicketType::Add
        && ticket.annotation_status == TicketValue::Literal(AnnotationStatus::Draft)
    {
        results.push(Evaluation::outcome(
            "TKT_011",
            class,
            ticket.accession.literal().is_none(),
            EvalStatus::Error,
            "A new draft genome carries no accession.".to_string(),
        ));
    }
    results
}

fn membership(id: &str, label: &str, value: &str, known: &BTreeSet<String>) -> Evaluation {
    if known.is_empty() {
        return Evaluation::new(
            Some(id),
            EvalStatus::Untested,
            ErrorClass::FieldResolution,
            format!("No known {label} values are available."),
        );
    }
    Evaluation::outcome(
        id,
        ErrorClass::FieldResolution,
        known.contains(value),
        EvalStatus::Error,
        format!("The {label} '{value}' is a known value."),
    )
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn owner_check(id: &str, label: &str, owner: Option<&str>, ticket: &Ticket) -> Evaluation {
    let conflict = match (ticket.ticket_type, owner) {
        (_, None) => false,
        (TicketType::Add, Some(_)) => true,
        (TicketType::Replace, Some(owner)) => owner != ticket.phage_id,
    };
    Evaluation::outcome(
        id,
        ErrorClass::PairMismatch,
        !conflict,
        EvalStatus::Error,
        match owner {
            Some(owner) if conflict => format!("The {label} is already stored for {owner}."),
            _ => format!("The {label} is not stored for another genome."),
        },
    )
}

#[allow(clippy::too_many_lines)]
fn check_record(
    ticket: &Ticket,
    parsed: &Record,
    persisted: Option<&Record>,
    context: &CheckContext<'_>,
) -> Vec<Evaluation> {
    let mut results = Vec::new();
    let structural = ErrorClass::RecordStructural;
    let flags = &context.flags;

    results.push(Evaluation::outcome(
        "GNM_001",
        structural,
        parsed.id == ticket.phage_id,
        EvalStatus::Error,
        format!("The genome id {} matches ticket phage_id {}.", parsed.id, ticket.phage_id),
    ));
    results.push(Evaluation::outcome(
        "GNM_002",
        structural,
        !parsed.sequence.is_empty(),
        EvalStatus::Error,
        format!("The genome sequence has {} bases.", parsed.sequence_length()),
    ));
    let invalid = parsed
        .sequence
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| !DNA_ALPHABET.contains(*c))
        .collect::<BTreeSet<_>>();
    results.push(Evaluation::outcome(
        "GNM_003",
        structural,
        invalid.is_empty(),
        EvalStatus::Error,
        format!("Invalid sequence characters: {}.", invalid.into_iter().collect::<String>()),
    ));

    let tallies = parsed.tallies();
    results.push(Evaluation::outcome(
        "GNM_004",
        structural,
        tallies.cds_count > 0,
        EvalStatus::Error,
        format!("The genome has {} CDS features.", tallies.cds_count),
    ));
    results.push(Evaluation::outcome(
        "GNM_005",
        structural,
        tallies.duplicate_coordinates.is_empty(),
        EvalStatus::Error,
        format!("Duplicate CDS coordinates: {:?}.", tallies.duplicate_coordinates),
    ));
    results.push(Evaluation::outcome(
        "GNM_006",
        structural,
        parsed.translation_table == DEFAULT_TRANSLATION_TABLE,
        EvalStatus::Error,
        format!("The genome uses translation table {}.", parsed.translation_table),
    ));

    if let Some(host) = parsed.host_genus.as_deref() {
        results.push(membership("GNM_007", "host genus", host, &context.reference_sets.host_genera));
    }
    if let Some(cluster) = parsed.cluster.as_deref() {
        results.push(membership("GNM_008", "cluster", cluster, &context.reference_sets.clusters));
    }
    if let Some(subcluster) = parsed.subcluster.as_deref() {
        results.push(membership(
            "GNM_009",
            "subcluster",
            subcluster,
            &context.reference_sets.subclusters,
        ));
    }

    match ticket.ticket_type {
        TicketType::Add => results.push(Evaluation::outcome(
            "GNM_010",
            ErrorClass::PairMismatch,
            persisted.is_none(),
            EvalStatus::Error,
            format!("No genome {} is already stored.", ticket.phage_id),
        )),
        TicketType::Replace => results.push(Evaluation::outcome(
            "GNM_011",
            ErrorClass::PairMismatch,
            persisted.is_some(),
            EvalStatus::Error,
            format!("Genome {} is stored and can be replaced.", ticket.phage_id),
        )),
    }
    results.push(owner_check("GNM_012", "sequence", context.sequence_owner.as_deref(), ticket));
    if parsed.accession.as_deref().is_some_and(|accession| !accession.is_empty()) {
        results.push(owner_check("GNM_013", "accession", context.accession_owner.as_deref(), ticket));
    }

    let annotation = ErrorClass::Annotation;
    let texts = [
        ("description", parsed.description.as_str()),
        ("source", parsed.source.as_str()),
        ("organism", parsed.organism.as_str()),
    ];
    if flags.enabled(EvalFlag::CheckIdTypo) {
        for ((label, text), id) in texts.iter().zip(["GNM_014", "GNM_015", "GNM_016"]) {
            results.push(Evaluation::outcome(
                id,
                annotation,
                contains_word(text, &parsed.id),
                EvalStatus::Error,
                format!("The {label} '{text}' names genome {}.", parsed.id),
            ));
        }
    }
    if flags.enabled(EvalFlag::CheckHostTypo) {
        let host = parsed.host_genus.as_deref().unwrap_or_default();
        for ((label, text), id) in texts.iter().zip(["GNM_017", "GNM_018", "GNM_019"]) {
            results.push(Evaluation::outcome(
                id,
                annotation,
                contains_word(text, host),
                EvalStatus::Error,
                format!("The {label} '{text}' names host {host}."),
            ));
        }
    }
    if flags.enabled(EvalFlag::CheckAuthor) {
        if let Some(expected) = parsed.annotation_author {
            let listed = contains_word(&parsed.authors, &context.expected_author);
            results.push(Evaluation::outcome(
                "GNM_020",
                annotation,
                listed == expected,
                EvalStatus::Error,
                format!(
                    "{} is {}expected among the authors '{}'.",
                    context.expected_author,
                    if expected { "" } else { "not " },
                    parsed.authors
                ),
            ));
        }
    }
    if flags.enabled(EvalFlag::CheckDescriptionTally) {
        let chosen = tallies.described(ticket.description_field);
        let elsewhere = DescriptionField::ALL
            .into_iter()
            .filter(|field| *field != ticket.description_field)
            .map(|field| tallies.described(field))
            .max()
            .unwrap_or(0);
        results.push(Evaluation::outcome(
            "GNM_021",
            annotation,
            !(chosen == 0 && elsewhere > 0),
            EvalStatus::Error,
            format!(
                "The {} field holds {chosen} descriptions; another field holds {elsewhere}.",
                ticket.description_field.as_str()
            ),
        ));
    }
    if flags.enabled(EvalFlag::CheckDescription) {
        results.push(Evaluation::outcome(
            "GNM_022",
            annotation,
            tallies.duplicate_descriptions.is_empty(),
            EvalStatus::Warning,
            format!("Repeated CDS descriptions: {:?}.", tallies.duplicate_descriptions),
        ));
    }
    results
}

fn locus_tag_structure(feature: &Cds) -> bool {
    let parts = feature.locus_tag.split('_').collect::<Vec<_>>();
    match parts.as_slice() {
        [prefix, genome, number] => {
            !prefix.is_empty()
                && genome.eq_ignore_ascii_case(&feature.genome_id)
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn check_cds(ticket: &Ticket, parsed: &Record, feature: &Cds, context: &CheckContext<'_>) -> Vec<Evaluation> {
    let mut results = Vec::new();
    let flags = &context.flags;

    results.push(Evaluation::outcome(
        "CDS_001",
        ErrorClass::RecordStructural,
        feature.exact,
        EvalStatus::Error,
        format!("The coordinates {}..{} are exact.", feature.start, feature.stop),
    ));
    results.push(Evaluation::outcome(
        "CDS_002",
        ErrorClass::RecordStructural,
        feature.translation_table == parsed.translation_table,
        EvalStatus::Error,
        format!("The feature uses translation table {}.", feature.translation_table),
    ));

    let invalid = feature
        .translation
        .chars()
        .filter(|c| !PROTEIN_ALPHABET.contains(*c))
        .collect::<BTreeSet<_>>();
    results.push(Evaluation::outcome(
        "CDS_003",
        ErrorClass::Translation,
        !feature.translation.is_empty() && invalid.is_empty(),
        EvalStatus::Error,
        format!(
            "The translation has {} residues and invalid characters '{}'.",
            feature.translation_length(),
            invalid.into_iter().collect::<String>()
        ),
    ));
    results.push(match translate_cds(&feature.nucleotide_seq, feature.translation_table) {
        Ok(protein) => Evaluation::outcome(
            "CDS_004",
            ErrorClass::Translation,
            protein == feature.translation,
            EvalStatus::Error,
            format!(
                "The supplied translation ({} residues) matches the sequence ({} residues).",
                feature.translation_length(),
                protein.chars().count()
            ),
        ),
        Err(err) => Evaluation::error("CDS_004", ErrorClass::Translation, err.to_string()),
    });

    if flags.enabled(EvalFlag::CheckDescriptionField) {
        let chosen = feature.description(ticket.description_field);
        let elsewhere = DescriptionField::ALL
            .into_iter()
            .filter(|field| *field != ticket.description_field)
            .find(|field| !crate::record::is_generic_description(feature.description(*field)));
        results.push(Evaluation::outcome(
            "CDS_005",
            ErrorClass::Annotation,
            !(crate::record::is_generic_description(chosen) && elsewhere.is_some()),
            EvalStatus::Error,
            format!(
                "The {} field '{}' holds the description{}.",
                ticket.description_field.as_str(),
                chosen,
                elsewhere.map(|field| format!(" found in {}", field.as_str())).unwrap_or_default()
            ),
        ));
    }
    if flags.enabled(EvalFlag::CheckLocusTag) {
        results.push(Evaluation::outcome(
            "CDS_006",
            ErrorClass::Annotation,
            !feature.locus_tag.is_empty(),
            EvalStatus::Error,
            "The feature has a locus_tag.".to_string(),
        ));
        if !feature.locus_tag.is_empty() {
            results.push(Evaluation::outcome(
                "CDS_007",
                ErrorClass::Annotation,
                feature.locus_tag == feature.locus_tag.to_ascii_uppercase(),
                EvalStatus::Error,
                format!("The locus_tag {} is uppercase.", feature.locus_tag),
            ));
            results.push(Evaluation::outcome(
                "CDS_008",
                ErrorClass::Annotation,
                locus_tag_structure(feature),
                EvalStatus::Error,
                format!("The locus_tag {} follows PREFIX_GENOMEID_NUMBER.", feature.locus_tag),
            ));
        }
    }
    if flags.enabled(EvalFlag::CheckGene) {
        let gene = feature.gene.trim();
        results.push(Evaluation::outcome(
            "CDS_009",
            ErrorClass::Annotation,
            !gene.is_empty() && gene.parse::<u64>().is_ok(),
            EvalStatus::Error,
            format!("The gene qualifier '{gene}' is an integer."),
        ));
        if flags.enabled(EvalFlag::CheckLocusTag) {
            let number = feature.locus_tag_number();
            results.push(Evaluation::outcome(
                "CDS_010",
                ErrorClass::Annotation,
                number.as_deref() == Some(gene),
                EvalStatus::Error,
                format!(
                    "The gene qualifier '{gene}' matches the locus_tag number '{}'.",
                    number.unwrap_or_default()
                ),
            ));
        }
    }
    results
}

fn check_trna(feature: &Trna) -> Vec<Evaluation> {
    let product = feature.product.trim();
    let amino_acid = product.strip_prefix("tRNA-").map(|rest| {
        rest.split(|c: char| c == '(' || c.is_whitespace()).next().unwrap_or_default()
    });
    let structured = amino_acid.is_some_and(|amino| {
        amino == "OTHER"
            || (amino.len() == 3
                && amino.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && amino.chars().skip(1).all(|c| c.is_ascii_lowercase()))
    });
    vec![
        Evaluation::outcome(
            "TRN_001",
            ErrorClass::Annotation,
            structured,
            EvalStatus::Error,
            format!("The tRNA product '{product}' is structured as tRNA-Xxx."),
        ),
        Evaluation::outcome(
            "TRN_002",
            ErrorClass::Annotation,
            TRNA_LENGTH.contains(&feature.length()),
            EvalStatus::Warning,
            format!("The tRNA is {} bases long.", feature.length()),
        ),
    ]
}

fn status_transition_allowed(previous: Option<AnnotationStatus>, next: Option<AnnotationStatus>) -> bool {
    match (previous, next) {
        (Some(AnnotationStatus::Draft), Some(AnnotationStatus::Draft | AnnotationStatus::Final))
        | (Some(AnnotationStatus::Final), Some(AnnotationStatus::Final))
        | (Some(AnnotationStatus::Unknown) | None, _) => true,
        _ => false,
    }
}

fn check_replacement(ticket: &Ticket, parsed: &Record, persisted: &Record, tree: &mut EvaluationTree) {
    let pair = RecordPair::new(Cow::Borrowed(persisted), Cow::Borrowed(parsed));
    let status_ok = status_transition_allowed(persisted.annotation_status, parsed.annotation_status);
    let evaluations = vec![
        pair.compare_attribute("sequence", true, Some("PAIR_001")),
        pair.compare_date("older", Some("PAIR_002")),
        Evaluation::outcome(
            "PAIR_003",
            ErrorClass::PairMismatch,
            status_ok,
            EvalStatus::Error,
            format!(
                "The annotation status may move from {} to {}.",
                persisted.annotation_status.map_or("none", AnnotationStatus::as_str),
                parsed.annotation_status.map_or("none", AnnotationStatus::as_str)
            ),
        ),
    ];
    tree.extend(&Subject::RecordPair, evaluations);

    let matched = FeaturePair::match_features(persisted.cds(), parsed.cds());
    for feature_pair in &matched.pairs {
        tree.extend(
            &Subject::FeaturePair(feature_pair.feature_b().id.clone()),
            [
                feature_pair.compare_start("CDS_020"),
                feature_pair.compare_translation("CDS_021"),
                feature_pair.compare_description(ticket.description_field, "CDS_022"),
            ],
        );
    }
    for (origin, features) in [("stored", &matched.unmatched_a), ("new", &matched.unmatched_b)] {
        for feature in features {
            tree.push(
                &Subject::FeaturePair(feature.id.clone()),
                Evaluation::warning(
                    "CDS_023",
                    ErrorClass::PairMismatch,
                    format!(
                        "The {origin} feature {}..{} has no counterpart.",
                        feature.start, feature.stop
                    ),
                ),
            );
        }
    }
}
