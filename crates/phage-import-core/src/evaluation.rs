use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    Correct,
    Error,
    Warning,
    Untested,
}

impl EvalStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Untested => "untested",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "correct" => Some(Self::Correct),
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "untested" => Some(Self::Untested),
            _ => None,
        }
    }
}

/// Failure taxonomy used to classify every evaluation, including passing ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    TicketFormat,
    FieldResolution,
    RecordStructural,
    Translation,
    PairMismatch,
    Persistence,
    Annotation,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TicketFormat => "ticket_format",
            Self::FieldResolution => "field_resolution",
            Self::RecordStructural => "record_structural",
            Self::Translation => "translation",
            Self::PairMismatch => "pair_mismatch",
            Self::Persistence => "persistence",
            Self::Annotation => "annotation",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Evaluation {
    pub id: Option<String>,
    pub status: EvalStatus,
    pub class: ErrorClass,
    pub message: String,
}

impl Evaluation {
    #[must_use]
    pub fn new(id: Option<&str>, status: EvalStatus, class: ErrorClass, message: String) -> Self {
        Self { id: id.map(str::to_string), status, class, message }
    }

    #[must_use]
    pub fn correct(id: &str, class: ErrorClass, message: String) -> Self {
        Self::new(Some(id), EvalStatus::Correct, class, message)
    }

    #[must_use]
    pub fn error(id: &str, class: ErrorClass, message: String) -> Self {
        Self::new(Some(id), EvalStatus::Error, class, message)
    }

    #[must_use]
    pub fn warning(id: &str, class: ErrorClass, message: String) -> Self {
        Self::new(Some(id), EvalStatus::Warning, class, message)
    }

    /// Build a pass/fail evaluation from a check outcome.
    ///
    /// `fail` is the status recorded when `passed` is false.
    #[must_use]
    pub fn outcome(
        id: &str,
        class: ErrorClass,
        passed: bool,
        fail: EvalStatus,
        message: String,
    ) -> Self {
        let status = if passed { EvalStatus::Correct } else { fail };
        Self::new(Some(id), status, class, message)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == EvalStatus::Error
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(
                f,
                "[{}] {} ({}): {}",
                id,
                self.status.as_str(),
                self.class.as_str(),
                self.message
            ),
            None => {
                write!(f, "{} ({}): {}", self.status.as_str(), self.class.as_str(), self.message)
            }
        }
    }
}

/// Entity an evaluation was attached to.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Ticket,
    Record(String),
    Cds(String),
    Trna(String),
    Source(String),
    RecordPair,
    FeaturePair(String),
    Commit,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvaluationNode {
    pub subject: Subject,
    pub evaluations: Vec<Evaluation>,
}

/// Aggregate of every evaluation produced for one bundle, grouped by subject.
///
/// Nodes keep insertion order so the failure report lists ticket problems
/// before record, feature, and pair problems.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvaluationTree {
    nodes: Vec<EvaluationNode>,
}

impl EvaluationTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subject: &Subject, evaluation: Evaluation) {
        self.extend(subject, std::iter::once(evaluation));
    }

    pub fn extend<I>(&mut self, subject: &Subject, evaluations: I)
    where
        I: IntoIterator<Item = Evaluation>,
    {
        let mut evaluations = evaluations.into_iter().peekable();
        if evaluations.peek().is_none() {
            return;
        }
        if let Some(node) = self.nodes.iter_mut().find(|node| &node.subject == subject) {
            node.evaluations.extend(evaluations);
        } else {
            self.nodes.push(EvaluationNode {
                subject: subject.clone(),
                evaluations: evaluations.collect(),
            });
        }
    }

    pub fn merge(&mut self, other: EvaluationTree) {
        for node in other.nodes {
            self.extend(&node.subject, node.evaluations);
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &[EvaluationNode] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Subject, &Evaluation)> {
        self.nodes
            .iter()
            .flat_map(|node| node.evaluations.iter().map(move |evaluation| (&node.subject, evaluation)))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&Subject, &Evaluation)> {
        self.iter().filter(|(_, evaluation)| evaluation.is_error())
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    #[must_use]
    pub fn count(&self, status: EvalStatus) -> usize {
        self.iter().filter(|(_, evaluation)| evaluation.status == status).count()
    }

    #[must_use]
    pub fn has_error_class(&self, class: ErrorClass) -> bool {
        self.errors().any(|(_, evaluation)| evaluation.class == class)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.iter().map(|node| node.evaluations.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
