mod bundle;
mod checks;
mod evaluation;
#[cfg(test)]
mod fixtures;
mod pair;
mod record;
mod resolution;
mod run_mode;
mod ticket;
mod translation;

pub use bundle::{Bundle, BundleState, Verdict};
pub use checks::{check_bundle, CheckContext, ReferenceSets};
pub use evaluation::{ErrorClass, EvalStatus, Evaluation, EvaluationNode, EvaluationTree, Subject};
pub use pair::{CopyDirection, DateRelation, FeatureMatch, FeaturePair, RecordPair};
pub use record::{
    is_generic_description, AnnotationStatus, Cds, DescriptionField, Field, FieldValue, Keyword,
    Record, RecordOrigin, SourceFeature, Strand, Tallies, Trna,
};
pub use resolution::{resolve_fields, ReferenceEntry, Resolution};
pub use run_mode::{EvalFlag, EvalFlags, FlagProvider, NoFlags, RunMode, StaticFlags};
pub use ticket::{Ticket, TicketDefaults, TicketRow, TicketType, TicketValue};
pub use translation::{gc_percent, reverse_complement, translate_cds, DEFAULT_TRANSLATION_TABLE};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid bundle transition: {0}")]
    InvalidTransition(String),
    #[error("field type mismatch: {0}")]
    FieldType(String),
    #[error("translation error: {0}")]
    Translation(String),
}
