use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::evaluation::{ErrorClass, EvalStatus, Evaluation};
use crate::record::{Cds, DescriptionField, Field, FieldValue, Keyword, Record, Strand};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DateRelation {
    Older,
    Newer,
    Equal,
}

impl DateRelation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Older => "older",
            Self::Newer => "newer",
            Self::Equal => "equal",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "older" => Some(Self::Older),
            "newer" => Some(Self::Newer),
            "equal" => Some(Self::Equal),
            _ => None,
        }
    }
}

/// Direction a `copy_data` call moved values in.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CopyDirection {
    AToB,
    BToA,
}

/// Two snapshots of nominally the same genome.
///
/// Either side may be borrowed; a borrowed side is cloned on first write so
/// the caller's snapshot is never modified.
#[derive(Debug, Clone)]
pub struct RecordPair<'a> {
    record_a: Cow<'a, Record>,
    record_b: Cow<'a, Record>,
}

impl<'a> RecordPair<'a> {
    #[must_use]
    pub fn new(record_a: Cow<'a, Record>, record_b: Cow<'a, Record>) -> Self {
        Self { record_a, record_b }
    }

    #[must_use]
    pub fn record_a(&self) -> &Record {
        &self.record_a
    }

    #[must_use]
    pub fn record_b(&self) -> &Record {
        &self.record_b
    }

    #[must_use]
    pub fn into_records(self) -> (Cow<'a, Record>, Cow<'a, Record>) {
        (self.record_a, self.record_b)
    }

    /// Compare one named attribute across both records.
    ///
    /// Unknown attribute names yield `untested`.
    #[must_use]
    pub fn compare_attribute(&self, attr: &str, expect_same: bool, eval_id: Option<&str>) -> Evaluation {
        let Some(field) = Field::parse(attr) else {
            return Evaluation::new(
                eval_id,
                EvalStatus::Untested,
                ErrorClass::PairMismatch,
                format!("'{attr}' is not a comparable attribute."),
            );
        };
        let value_a = self.record_a.get(field);
        let value_b = self.record_b.get(field);
        let same = value_a == value_b;
        let expectation = if expect_same { "identical" } else { "different" };
        let (status, message) = if same == expect_same {
            (EvalStatus::Correct, format!("The {attr} values are {expectation} as expected."))
        } else {
            (
                EvalStatus::Error,
                format!(
                    "The {attr} values '{}' and '{}' are expected to be {expectation}.",
                    describe(&value_a),
                    describe(&value_b)
                ),
            )
        };
        Evaluation::new(eval_id, status, ErrorClass::PairMismatch, message)
    }

    /// Check that `record_a.date` stands in `direction` to `record_b.date`.
    ///
    /// A missing date sorts before every real date.
    #[must_use]
    pub fn compare_date(&self, direction: &str, eval_id: Option<&str>) -> Evaluation {
        let Some(relation) = DateRelation::parse(direction) else {
            return Evaluation::new(
                eval_id,
                EvalStatus::Untested,
                ErrorClass::PairMismatch,
                format!("'{direction}' is not a date relation."),
            );
        };
        let date_a = self.record_a.date.unwrap_or(Date::MIN);
        let date_b = self.record_b.date.unwrap_or(Date::MIN);
        let holds = match relation {
            DateRelation::Older => date_a < date_b,
            DateRelation::Newer => date_a > date_b,
            DateRelation::Equal => date_a == date_b,
        };
        let status = if holds { EvalStatus::Correct } else { EvalStatus::Error };
        Evaluation::new(
            eval_id,
            status,
            ErrorClass::PairMismatch,
            format!(
                "The {} date {} is{} {} than the {} date {}.",
                self.record_a.origin.as_str(),
                describe_date(self.record_a.date),
                if holds { "" } else { " not" },
                relation.as_str(),
                self.record_b.origin.as_str(),
                describe_date(self.record_b.date)
            ),
        )
    }

    /// Copy fields between the records in the direction established by the
    /// identifying attribute.
    ///
    /// When `record_a[identifying] == first` and `record_b[identifying] ==
    /// second`, values flow a→b; the mirrored assignment flows b→a. Equal or
    /// unmatched identifying values make the call a no-op. With a keyword
    /// only destination fields holding that keyword are overwritten;
    /// otherwise every field except the identifying one is, along with the
    /// feature lists and filename.
    pub fn copy_data(
        &mut self,
        identifying: Field,
        first: &FieldValue,
        second: &FieldValue,
        keyword: Option<Keyword>,
    ) -> Option<CopyDirection> {
        if first == second {
            return None;
        }
        let value_a = self.record_a.get(identifying);
        let value_b = self.record_b.get(identifying);
        let direction = if &value_a == first && &value_b == second {
            CopyDirection::AToB
        } else if &value_a == second && &value_b == first {
            CopyDirection::BToA
        } else {
            return None;
        };

        let (source, destination) = match direction {
            CopyDirection::AToB => (&self.record_a, &mut self.record_b),
            CopyDirection::BToA => (&self.record_b, &mut self.record_a),
        };
        let fields = Field::ALL
            .into_iter()
            .filter(|field| *field != identifying)
            .filter(|field| match keyword {
                Some(keyword) => destination.pending(*field) == Some(keyword),
                None => true,
            })
            .collect::<Vec<_>>();
        if !fields.is_empty() || keyword.is_none() {
            let destination = destination.to_mut();
            for field in fields {
                destination.copy_field_from(source, field);
            }
            if keyword.is_none() {
                destination.copy_features_from(source);
            }
        }
        Some(direction)
    }
}

fn describe_date(date: Option<Date>) -> String {
    date.map_or_else(|| "(none)".to_string(), |date| date.to_string())
}

fn match_key(feature: &Cds) -> (u64, Strand) {
    (feature.stop, feature.strand)
}

fn describe(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => text.clone(),
        FieldValue::Flag(flag) => u8::from(*flag).to_string(),
        FieldValue::Int(number) => number.to_string(),
        FieldValue::Date(date) => date.to_string(),
        FieldValue::Keyword(keyword) => keyword.as_str().to_string(),
        FieldValue::Absent => String::new(),
    }
}

/// Matched coding features from two views of one genome.
#[derive(Debug, Clone, Copy)]
pub struct FeaturePair<'a> {
    feature_a: &'a Cds,
    feature_b: &'a Cds,
}

/// Result of matching two feature lists by stop coordinate and strand.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatch<'a> {
    pub pairs: Vec<FeaturePair<'a>>,
    pub unmatched_a: Vec<&'a Cds>,
    pub unmatched_b: Vec<&'a Cds>,
}

impl<'a> FeaturePair<'a> {
    #[must_use]
    pub fn new(feature_a: &'a Cds, feature_b: &'a Cds) -> Self {
        Self { feature_a, feature_b }
    }

    #[must_use]
    pub fn feature_a(&self) -> &'a Cds {
        self.feature_a
    }

    #[must_use]
    pub fn feature_b(&self) -> &'a Cds {
        self.feature_b
    }

    /// Pair features sharing a `(stop, strand)` key; features whose key is
    /// absent or repeated on either side stay unmatched.
    #[must_use]
    pub fn match_features(features_a: &'a [Cds], features_b: &'a [Cds]) -> FeatureMatch<'a> {
        let unique = |features: &[Cds], feature: &Cds| {
            features.iter().filter(|other| match_key(other) == match_key(feature)).count() == 1
        };

        let mut result = FeatureMatch::default();
        for feature in features_a {
            let partner = features_b.iter().find(|other| match_key(other) == match_key(feature));
            match partner {
                Some(partner) if unique(features_a, feature) && unique(features_b, partner) => {
                    result.pairs.push(Self::new(feature, partner));
                }
                _ => result.unmatched_a.push(feature),
            }
        }
        for feature in features_b {
            if !result.pairs.iter().any(|pair| std::ptr::eq(pair.feature_b, feature)) {
                result.unmatched_b.push(feature);
            }
        }
        result
    }

    #[must_use]
    pub fn compare_start(&self, eval_id: &str) -> Evaluation {
        Evaluation::outcome(
            eval_id,
            ErrorClass::PairMismatch,
            self.feature_a.start == self.feature_b.start,
            EvalStatus::Warning,
            format!(
                "Start coordinates {} and {} of the feature ending at {}.",
                self.feature_a.start, self.feature_b.start, self.feature_a.stop
            ),
        )
    }

    #[must_use]
    pub fn compare_translation(&self, eval_id: &str) -> Evaluation {
        Evaluation::outcome(
            eval_id,
            ErrorClass::PairMismatch,
            self.feature_a.translation == self.feature_b.translation,
            EvalStatus::Warning,
            format!(
                "Translations of the feature ending at {} ({} and {} residues).",
                self.feature_a.stop,
                self.feature_a.translation_length(),
                self.feature_b.translation_length()
            ),
        )
    }

    #[must_use]
    pub fn compare_description(&self, field: DescriptionField, eval_id: &str) -> Evaluation {
        let value_a = self.feature_a.description(field).trim();
        let value_b = self.feature_b.description(field).trim();
        Evaluation::outcome(
            eval_id,
            ErrorClass::PairMismatch,
            value_a.eq_ignore_ascii_case(value_b),
            EvalStatus::Warning,
            format!("The {} descriptions '{value_a}' and '{value_b}'.", field.as_str()),
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::fixtures::{alice_record, persisted_alice};
    use crate::record::RecordOrigin;

    fn pair<'a>(a: &'a Record, b: &'a Record) -> RecordPair<'a> {
        RecordPair::new(Cow::Borrowed(a), Cow::Borrowed(b))
    }

    #[test]
    fn compare_attribute_reports_untested_for_unknown_names() {
        let a = alice_record();
        let b = alice_record();
        let pair = pair(&a, &b);
        assert_eq!(pair.compare_attribute("id", true, Some("PAIR_001")).status, EvalStatus::Correct);
        assert_eq!(pair.compare_attribute("id", false, None).status, EvalStatus::Error);
        let untested = pair.compare_attribute("wingspan", true, Some("PAIR_001"));
        assert_eq!(untested.status, EvalStatus::Untested);
        assert_eq!(untested.id.as_deref(), Some("PAIR_001"));
    }

    #[test]
    fn compare_attribute_detects_differences() {
        let a = alice_record();
        let mut b = alice_record();
        b.id = "Trixie".to_string();
        let pair = pair(&a, &b);
        assert_eq!(pair.compare_attribute("id", true, None).status, EvalStatus::Error);
        assert_eq!(pair.compare_attribute("id", false, None).status, EvalStatus::Correct);
        assert_eq!(pair.compare_attribute("sequence", true, None).status, EvalStatus::Correct);
    }

    #[test]
    fn compare_date_follows_declared_relation() {
        let older = persisted_alice();
        let newer = alice_record();
        let pair = pair(&older, &newer);
        assert_eq!(pair.compare_date("older", None).status, EvalStatus::Correct);
        assert_eq!(pair.compare_date("newer", None).status, EvalStatus::Error);
        assert_eq!(pair.compare_date("equal", None).status, EvalStatus::Error);
        assert_eq!(pair.compare_date("sideways", None).status, EvalStatus::Untested);
    }

    #[test]
    fn missing_dates_sort_before_every_real_date() {
        let mut undated_stored = persisted_alice();
        undated_stored.date = None;
        let parsed = alice_record();
        let pair_with_undated_stored = pair(&undated_stored, &parsed);
        let older = pair_with_undated_stored.compare_date("older", Some("PAIR_002"));
        assert_eq!(older.status, EvalStatus::Correct);
        assert!(older.message.contains("(none)"), "{}", older.message);
        assert_eq!(pair_with_undated_stored.compare_date("newer", None).status, EvalStatus::Error);

        let stored = persisted_alice();
        let mut undated_parsed = alice_record();
        undated_parsed.date = None;
        assert_eq!(pair(&stored, &undated_parsed).compare_date("older", None).status, EvalStatus::Error);
        assert_eq!(
            pair(&undated_stored, &undated_parsed).compare_date("equal", None).status,
            EvalStatus::Correct
        );
    }

    #[test]
    fn copy_data_fills_keyword_fields_and_leaves_borrowed_source_untouched() -> Result<(), crate::CoreError> {
        let persisted = persisted_alice();
        let mut parsed = alice_record();
        parsed.set(Field::Cluster, FieldValue::Keyword(Keyword::Retain))?;
        parsed.set(Field::HostGenus, FieldValue::text("Gordonia"))?;

        let mut pair = RecordPair::new(Cow::Borrowed(&persisted), Cow::Owned(parsed));
        let direction = pair.copy_data(
            Field::Origin,
            &FieldValue::text("persisted"),
            &FieldValue::text("flat_file"),
            Some(Keyword::Retain),
        );
        assert_eq!(direction, Some(CopyDirection::AToB));
        let (persisted_after, parsed) = pair.into_records();
        assert!(matches!(persisted_after, Cow::Borrowed(_)));
        assert_eq!(parsed.cluster.as_deref(), Some("C"));
        assert_eq!(parsed.pending(Field::Cluster), None);
        assert_eq!(parsed.host_genus.as_deref(), Some("Gordonia"));
        assert_eq!(parsed.origin, RecordOrigin::FlatFile);
        Ok(())
    }

    #[test]
    fn copy_data_is_a_no_op_for_ambiguous_or_unmatched_values() {
        let a = persisted_alice();
        let b = alice_record();
        let mut pair = pair(&a, &b);
        let same = FieldValue::text("persisted");
        assert_eq!(pair.copy_data(Field::Origin, &same, &same, None), None);
        assert_eq!(
            pair.copy_data(Field::Origin, &FieldValue::text("x"), &FieldValue::text("y"), None),
            None
        );
        let (a_after, b_after) = pair.into_records();
        assert!(matches!(a_after, Cow::Borrowed(_)));
        assert!(matches!(b_after, Cow::Borrowed(_)));
    }

    #[test]
    fn copy_data_without_keyword_copies_every_field_and_feature() {
        let parsed = alice_record();
        let empty = Record::new("Alice", RecordOrigin::Persisted);
        assert_eq!(empty.tallies().cds_count, 0);

        let mut pair = RecordPair::new(Cow::Borrowed(&parsed), Cow::Borrowed(&empty));
        let direction = pair.copy_data(
            Field::Origin,
            &FieldValue::text("flat_file"),
            &FieldValue::text("persisted"),
            None,
        );
        assert_eq!(direction, Some(CopyDirection::AToB));

        let (parsed_after, copied) = pair.into_records();
        assert!(matches!(parsed_after, Cow::Borrowed(_)));
        assert_eq!(copied.origin, RecordOrigin::Persisted);
        assert_eq!(copied.sequence, parsed.sequence);
        assert_eq!(copied.date, parsed.date);
        assert_eq!(copied.name, "Alice_Draft");
        assert_eq!(copied.cds().len(), 4);
        assert_eq!(copied.sources().len(), 1);
        assert_eq!(copied.filename.as_deref(), Some("Alice.gb"));
        assert_eq!(copied.sequence_length(), parsed.sequence_length());
        assert_eq!(copied.tallies().cds_count, 4);

        let mut partial = Record::new("Alice", RecordOrigin::Persisted);
        partial.push_cds(parsed.cds()[0].clone());
        assert_eq!(partial.tallies().cds_count, 1);
        let mut mirrored = RecordPair::new(Cow::Borrowed(&partial), Cow::Borrowed(&parsed));
        let direction = mirrored.copy_data(
            Field::Origin,
            &FieldValue::text("flat_file"),
            &FieldValue::text("persisted"),
            None,
        );
        assert_eq!(direction, Some(CopyDirection::BToA));
        assert_eq!(mirrored.record_a().cds().len(), 4);
        assert_eq!(mirrored.record_a().tallies().cds_count, 4);
    }

    #[test]
    fn feature_pairs_match_by_stop_and_strand() {
        let a = alice_record();
        let mut b = alice_record();
        let mut changed = b.cds()[0].clone();
        changed.start = 2;
        changed.product = "large terminase".to_string();
        let mut rebuilt = Record::new("Alice", RecordOrigin::Persisted);
        rebuilt.push_cds(changed);
        for feature in &b.cds()[1..3] {
            rebuilt.push_cds(feature.clone());
        }
        b = rebuilt;

        let matched = FeaturePair::match_features(a.cds(), b.cds());
        assert_eq!(matched.pairs.len(), 3);
        assert_eq!(matched.unmatched_a.len(), 1);
        assert!(matched.unmatched_b.is_empty());

        let first = matched.pairs[0];
        assert_eq!(first.compare_start("CDS_020").status, EvalStatus::Warning);
        assert_eq!(first.compare_translation("CDS_021").status, EvalStatus::Correct);
        assert_eq!(
            first.compare_description(DescriptionField::Product, "CDS_022").status,
            EvalStatus::Warning
        );
    }

    fn labelled(id: &str, origin: &str, cluster: Option<Keyword>) -> Record {
        let mut record = Record::new(id, RecordOrigin::FlatFile);
        record.name = origin.to_string();
        record.cluster = Some(format!("{origin}-cluster"));
        if let Some(keyword) = cluster {
            record.set_pending(Field::Cluster, keyword);
        }
        record
    }

    proptest! {
        #[test]
        fn copy_data_is_symmetric_under_relabeling(first in "[a-m]{1,6}", second in "[n-z]{1,6}") {
            let left = labelled("Alice", &first, None);
            let right = labelled("Alice", &second, Some(Keyword::Retain));
            let first_value = FieldValue::Text(first.clone());
            let second_value = FieldValue::Text(second.clone());

            let mut forward = RecordPair::new(Cow::Borrowed(&left), Cow::Borrowed(&right));
            let moved = forward.copy_data(Field::Name, &first_value, &second_value, Some(Keyword::Retain));
            prop_assert_eq!(moved, Some(CopyDirection::AToB));

            let mut mirrored = RecordPair::new(Cow::Borrowed(&right), Cow::Borrowed(&left));
            let moved = mirrored.copy_data(Field::Name, &first_value, &second_value, Some(Keyword::Retain));
            prop_assert_eq!(moved, Some(CopyDirection::BToA));

            let forward_target = forward.record_b().cluster.clone();
            let mirrored_target = mirrored.record_a().cluster.clone();
            prop_assert_eq!(&forward_target, &mirrored_target);
            prop_assert_eq!(forward_target, Some(format!("{first}-cluster")));
            prop_assert_eq!(forward.record_b().pending(Field::Cluster), None);
        }

        #[test]
        fn copy_data_ignores_unrelated_values(first in "[a-m]{1,6}", second in "[n-z]{1,6}") {
            let left = labelled("Alice", "persisted", None);
            let right = labelled("Alice", "parsed", Some(Keyword::Retain));
            let mut pair = RecordPair::new(Cow::Borrowed(&left), Cow::Borrowed(&right));
            let moved = pair.copy_data(
                Field::Name,
                &FieldValue::Text(first),
                &FieldValue::Text(second),
                Some(Keyword::Retain),
            );
            prop_assert_eq!(moved, None);
            prop_assert_eq!(pair.record_b().pending(Field::Cluster), Some(Keyword::Retain));
        }
    }
}
