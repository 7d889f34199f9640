use time::macros::date;

use crate::record::{AnnotationStatus, Cds, Record, RecordOrigin, SourceFeature, Strand};
use crate::ticket::TicketRow;

pub(crate) const ALICE_SEQUENCE: &str =
    "GGCCGGCCATGAAACCCTAAGGCCGGCCATGGCTGCTTGAGGCCGGCCATGTTTGGTTAGGGCCGGCCTTAATGATGCATGGCCGGCC";

pub(crate) fn alice_row() -> TicketRow {
    TicketRow {
        id: "1".to_string(),
        ticket_type: "add".to_string(),
        phage_id: "Alice".to_string(),
        host_genus: Some("Mycobacterium".to_string()),
        cluster: Some("C".to_string()),
        subcluster: Some("C1".to_string()),
        accession: Some("none".to_string()),
        description_field: Some("product".to_string()),
        annotation_status: Some("draft".to_string()),
        annotation_author: Some("1".to_string()),
        retrieve_record: Some("1".to_string()),
        run_mode: Some("draft".to_string()),
    }
}

fn alice_cds(number: usize, start: u64, strand: Strand, translation: &str, product: &str) -> Cds {
    let mut feature = Cds::new("Alice", start, start + 12, strand);
    feature.locus_tag = format!("SEA_ALICE_{number}");
    feature.gene = number.to_string();
    feature.name = number.to_string();
    feature.product = product.to_string();
    feature.translation = translation.to_string();
    let (Ok(from), Ok(to)) = (usize::try_from(start), usize::try_from(start + 12)) else {
        panic!("fixture coordinates {start}..{} do not fit in usize", start + 12);
    };
    let span = ALICE_SEQUENCE.get(from..to).unwrap_or_else(|| {
        panic!("fixture CDS {number} at {from}..{to} lies outside the Alice sequence")
    });
    feature.nucleotide_seq = match strand {
        Strand::Forward => span.to_string(),
        Strand::Reverse => crate::translation::reverse_complement(span),
    };
    feature
}

/// Parsed draft record for Alice with four non-overlapping, valid CDS.
pub(crate) fn alice_record() -> Record {
    let mut record = Record::new("Alice", RecordOrigin::FlatFile);
    record.name = "Alice_Draft".to_string();
    record.sequence = ALICE_SEQUENCE.to_string();
    record.date = Some(date!(2026 - 03 - 01));
    record.description = "Mycobacterium phage Alice, complete genome".to_string();
    record.source = "Mycobacterium phage Alice".to_string();
    record.organism = "Mycobacterium phage Alice".to_string();
    record.authors = "Hatfull,G.F.;Russell,D.A.".to_string();
    record.filename = Some("Alice.gb".to_string());
    record.push_source(SourceFeature {
        id: String::new(),
        organism: "Mycobacterium phage Alice".to_string(),
        host: "Mycobacterium smegmatis mc2 155".to_string(),
        lab_host: "Mycobacterium smegmatis mc2 155".to_string(),
    });
    record.push_cds(alice_cds(1, 8, Strand::Forward, "MKP", "terminase"));
    record.push_cds(alice_cds(2, 28, Strand::Forward, "MAA", "portal protein"));
    record.push_cds(alice_cds(3, 48, Strand::Forward, "MFG", "hypothetical protein"));
    record.push_cds(alice_cds(4, 68, Strand::Reverse, "MHH", "major capsid protein"));
    record.assign_feature_ids();
    record
}

/// The same genome as already stored, one release older.
pub(crate) fn persisted_alice() -> Record {
    let mut record = alice_record();
    record.origin = RecordOrigin::Persisted;
    record.name = "Alice".to_string();
    record.host_genus = Some("Mycobacterium".to_string());
    record.cluster = Some("C".to_string());
    record.subcluster = Some("C1".to_string());
    record.accession = Some("MN000001".to_string());
    record.annotation_status = Some(AnnotationStatus::Draft);
    record.annotation_author = Some(true);
    record.retrieve_record = Some(true);
    record.date = Some(date!(2025 - 01 - 15));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::translate_cds;

    #[test]
    fn alice_features_translate_from_their_own_spans() {
        let record = alice_record();
        assert_eq!(record.cds().len(), 4);
        for feature in record.cds() {
            assert_eq!(feature.nucleotide_seq.len(), 12, "{}", feature.id);
            let protein = translate_cds(&feature.nucleotide_seq, feature.translation_table)
                .unwrap_or_else(|err| panic!("{} does not translate: {err}", feature.id));
            assert_eq!(protein, feature.translation, "{}", feature.id);
        }
    }
}
