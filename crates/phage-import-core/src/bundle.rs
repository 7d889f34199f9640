use serde::{Deserialize, Serialize};

use crate::checks::{check_bundle, CheckContext};
use crate::evaluation::{ErrorClass, Evaluation, EvaluationTree, Subject};
use crate::record::Record;
use crate::resolution::{resolve_fields, ReferenceEntry};
use crate::ticket::{Ticket, TicketDefaults, TicketRow};
use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    Received,
    FieldsResolved,
    Checked,
    Committed,
    Failed,
}

impl BundleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::FieldsResolved => "fields_resolved",
            Self::Checked => "checked",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Commit,
    Fail,
}

/// One ticket with its candidate records and every evaluation they earned.
///
/// A bundle moves `received -> fields_resolved -> checked` and then ends
/// `committed` or `failed`. Out-of-order calls return
/// [`CoreError::InvalidTransition`] and leave the bundle unchanged.
#[derive(Debug, Clone)]
pub struct Bundle {
    row: TicketRow,
    ticket: Option<Ticket>,
    parsed: Option<Record>,
    persisted: Option<Record>,
    reference: Option<ReferenceEntry>,
    state: BundleState,
    evaluations: EvaluationTree,
}

impl Bundle {
    /// Parse `row` into a ticket and start a bundle in `received`.
    #[must_use]
    pub fn receive(row: TicketRow, defaults: &TicketDefaults) -> Self {
        let (ticket, errors) = Ticket::parse(&row, defaults);
        let mut evaluations = EvaluationTree::new();
        evaluations.extend(&Subject::Ticket, errors);
        Self {
            row,
            ticket,
            parsed: None,
            persisted: None,
            reference: None,
            state: BundleState::Received,
            evaluations,
        }
    }

    #[must_use]
    pub fn row(&self) -> &TicketRow {
        &self.row
    }

    #[must_use]
    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    /// Ticket phage id, falling back to the raw cell when the row did not parse.
    #[must_use]
    pub fn phage_id(&self) -> &str {
        self.ticket.as_ref().map_or_else(|| self.row.phage_id.trim(), |ticket| ticket.phage_id.as_str())
    }

    #[must_use]
    pub fn parsed(&self) -> Option<&Record> {
        self.parsed.as_ref()
    }

    #[must_use]
    pub fn persisted(&self) -> Option<&Record> {
        self.persisted.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> BundleState {
        self.state
    }

    #[must_use]
    pub fn evaluations(&self) -> &EvaluationTree {
        &self.evaluations
    }

    fn expect_state(&self, expected: BundleState, action: &str) -> Result<(), CoreError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition(format!(
                "cannot {action} a bundle in state {}",
                self.state.as_str()
            )))
        }
    }

    /// Attach the record parsed from the matching flat file.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless the bundle is `received`.
    pub fn attach_parsed(&mut self, record: Record) -> Result<(), CoreError> {
        self.expect_state(BundleState::Received, "attach a parsed record to")?;
        self.parsed = Some(record);
        Ok(())
    }

    /// Attach the stored snapshot for the ticket's phage id.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless the bundle is `received`.
    pub fn attach_persisted(&mut self, record: Record) -> Result<(), CoreError> {
        self.expect_state(BundleState::Received, "attach a stored record to")?;
        self.persisted = Some(record);
        Ok(())
    }

    /// Attach the catalog entry used to satisfy `retrieve` fields.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless the bundle is `received`.
    pub fn attach_reference(&mut self, entry: ReferenceEntry) -> Result<(), CoreError> {
        self.expect_state(BundleState::Received, "attach a reference entry to")?;
        self.reference = Some(entry);
        Ok(())
    }

    /// Record a run-level finding, such as a conflicting duplicate ticket.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] once the bundle is terminal.
    pub fn note(&mut self, subject: &Subject, evaluation: Evaluation) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            return Err(CoreError::InvalidTransition(format!(
                "cannot add evaluations to a bundle in state {}",
                self.state.as_str()
            )));
        }
        self.evaluations.push(subject, evaluation);
        Ok(())
    }

    /// `received -> fields_resolved`: resolve every deferred ticket field.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless the bundle is `received`.
    pub fn resolve(&mut self) -> Result<(), CoreError> {
        self.expect_state(BundleState::Received, "resolve")?;
        match (&self.ticket, self.parsed.as_mut()) {
            (Some(ticket), Some(parsed)) => {
                let resolution =
                    resolve_fields(ticket, self.persisted.as_ref(), self.reference.as_ref(), parsed);
                self.evaluations.extend(&Subject::Ticket, resolution.evaluations);
            }
            (Some(ticket), None) => self.evaluations.push(
                &Subject::Ticket,
                Evaluation::error(
                    "RES_007",
                    ErrorClass::FieldResolution,
                    format!("No flat file provides genome {}.", ticket.phage_id),
                ),
            ),
            (None, _) => {}
        }
        self.state = BundleState::FieldsResolved;
        Ok(())
    }

    /// `fields_resolved -> checked`: run the enabled checks and return the verdict.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless fields are resolved.
    pub fn check(&mut self, context: &CheckContext<'_>) -> Result<Verdict, CoreError> {
        self.expect_state(BundleState::FieldsResolved, "check")?;
        if let (Some(ticket), Some(parsed)) = (&self.ticket, &self.parsed) {
            let tree = check_bundle(ticket, parsed, self.persisted.as_ref(), context);
            self.evaluations.merge(tree);
        }
        self.state = BundleState::Checked;
        Ok(self.verdict())
    }

    /// Commit-eligible iff no evaluation anywhere in the bundle is an error.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.ticket.is_some() && self.parsed.is_some() && !self.evaluations.has_errors() {
            Verdict::Commit
        } else {
            Verdict::Fail
        }
    }

    /// `checked -> committed` once the store accepted the record.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless the bundle is checked and
    /// commit-eligible.
    pub fn mark_committed(&mut self) -> Result<(), CoreError> {
        self.expect_state(BundleState::Checked, "commit")?;
        if self.verdict() != Verdict::Commit {
            return Err(CoreError::InvalidTransition(
                "cannot commit a bundle with error evaluations".to_string(),
            ));
        }
        self.state = BundleState::Committed;
        Ok(())
    }

    /// `checked -> failed` after a failing verdict or a rejected commit.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless the bundle is checked.
    pub fn mark_failed(&mut self) -> Result<(), CoreError> {
        self.expect_state(BundleState::Checked, "fail")?;
        self.state = BundleState::Failed;
        Ok(())
    }

    /// `checked -> failed` with a `persistence` error describing the rejection.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] unless the bundle is checked.
    pub fn fail_commit(&mut self, message: String) -> Result<(), CoreError> {
        self.expect_state(BundleState::Checked, "fail")?;
        self.evaluations
            .push(&Subject::Commit, Evaluation::error("COM_001", ErrorClass::Persistence, message));
        self.state = BundleState::Failed;
        Ok(())
    }

    /// Release the parsed record for writing.
    #[must_use]
    pub fn into_parts(self) -> (TicketRow, Option<Ticket>, Option<Record>, EvaluationTree) {
        (self.row, self.ticket, self.parsed, self.evaluations)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::checks::ReferenceSets;
    use crate::fixtures::{alice_record, alice_row, persisted_alice};
    use crate::run_mode::{EvalFlags, NoFlags, RunMode};

    fn context(sets: &ReferenceSets) -> CheckContext<'_> {
        CheckContext {
            flags: EvalFlags::for_mode(RunMode::Draft, &NoFlags),
            reference_sets: sets,
            sequence_owner: None,
            accession_owner: None,
            expected_author: "Hatfull".to_string(),
        }
    }

    #[test]
    fn valid_bundle_walks_to_committed() -> Result<(), CoreError> {
        let sets = ReferenceSets::default();
        let mut bundle = Bundle::receive(alice_row(), &TicketDefaults::default());
        bundle.attach_parsed(alice_record())?;
        bundle.resolve()?;
        assert_eq!(bundle.state(), BundleState::FieldsResolved);
        assert_eq!(bundle.check(&context(&sets))?, Verdict::Commit);
        bundle.mark_committed()?;
        assert_eq!(bundle.state(), BundleState::Committed);
        Ok(())
    }

    #[test]
    fn out_of_order_transitions_are_rejected() -> Result<(), CoreError> {
        let sets = ReferenceSets::default();
        let mut bundle = Bundle::receive(alice_row(), &TicketDefaults::default());
        assert!(matches!(bundle.check(&context(&sets)), Err(CoreError::InvalidTransition(_))));
        assert!(matches!(bundle.mark_committed(), Err(CoreError::InvalidTransition(_))));
        bundle.resolve()?;
        assert!(matches!(bundle.resolve(), Err(CoreError::InvalidTransition(_))));
        assert!(matches!(bundle.attach_parsed(alice_record()), Err(CoreError::InvalidTransition(_))));
        assert_eq!(bundle.state(), BundleState::FieldsResolved);
        Ok(())
    }

    #[test]
    fn missing_flat_file_fails_with_resolution_error() -> Result<(), CoreError> {
        let sets = ReferenceSets::default();
        let mut bundle = Bundle::receive(alice_row(), &TicketDefaults::default());
        bundle.resolve()?;
        assert_eq!(bundle.check(&context(&sets))?, Verdict::Fail);
        assert!(bundle.evaluations().has_error_class(ErrorClass::FieldResolution));
        assert!(matches!(bundle.mark_committed(), Err(CoreError::InvalidTransition(_))));
        bundle.mark_failed()?;
        assert_eq!(bundle.state(), BundleState::Failed);
        Ok(())
    }

    #[test]
    fn retain_on_add_fails_and_leaves_stored_copy_unchanged() -> Result<(), CoreError> {
        let sets = ReferenceSets {
            host_genera: BTreeSet::from(["Mycobacterium".to_string()]),
            ..ReferenceSets::default()
        };
        let mut row = alice_row();
        row.cluster = Some("retain".to_string());
        let mut bundle = Bundle::receive(row, &TicketDefaults::default());
        bundle.attach_parsed(alice_record())?;
        bundle.resolve()?;
        assert_eq!(bundle.check(&context(&sets))?, Verdict::Fail);
        assert!(bundle.evaluations().has_error_class(ErrorClass::FieldResolution));
        Ok(())
    }

    #[test]
    fn stored_genome_makes_add_fail_with_pair_mismatch() -> Result<(), CoreError> {
        let sets = ReferenceSets::default();
        let mut bundle = Bundle::receive(alice_row(), &TicketDefaults::default());
        bundle.attach_parsed(alice_record())?;
        bundle.attach_persisted(persisted_alice())?;
        bundle.resolve()?;
        assert_eq!(bundle.check(&context(&sets))?, Verdict::Fail);
        assert!(bundle.evaluations().has_error_class(ErrorClass::PairMismatch));
        bundle.fail_commit("not attempted".to_string())?;
        assert!(bundle.evaluations().has_error_class(ErrorClass::Persistence));
        Ok(())
    }

    #[test]
    fn unparseable_row_still_reaches_a_failing_verdict() -> Result<(), CoreError> {
        let sets = ReferenceSets::default();
        let mut row = alice_row();
        row.ticket_type = "update".to_string();
        let mut bundle = Bundle::receive(row, &TicketDefaults::default());
        assert_eq!(bundle.phage_id(), "Alice");
        bundle.resolve()?;
        assert_eq!(bundle.check(&context(&sets))?, Verdict::Fail);
        assert!(bundle.evaluations().has_error_class(ErrorClass::TicketFormat));
        Ok(())
    }
}
