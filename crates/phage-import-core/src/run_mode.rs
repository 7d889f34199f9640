use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Named switch selecting whether one group of checks runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvalFlag {
    CheckReplace,
    ImportLocusTag,
    CheckLocusTag,
    CheckDescriptionTally,
    CheckDescriptionField,
    CheckDescription,
    CheckTrna,
    CheckIdTypo,
    CheckHostTypo,
    CheckAuthor,
    CheckGene,
}

impl EvalFlag {
    pub const ALL: [Self; 11] = [
        Self::CheckReplace,
        Self::ImportLocusTag,
        Self::CheckLocusTag,
        Self::CheckDescriptionTally,
        Self::CheckDescriptionField,
        Self::CheckDescription,
        Self::CheckTrna,
        Self::CheckIdTypo,
        Self::CheckHostTypo,
        Self::CheckAuthor,
        Self::CheckGene,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckReplace => "check_replace",
            Self::ImportLocusTag => "import_locus_tag",
            Self::CheckLocusTag => "check_locus_tag",
            Self::CheckDescriptionTally => "check_description_tally",
            Self::CheckDescriptionField => "check_description_field",
            Self::CheckDescription => "check_description",
            Self::CheckTrna => "check_trna",
            Self::CheckIdTypo => "check_id_typo",
            Self::CheckHostTypo => "check_host_typo",
            Self::CheckAuthor => "check_author",
            Self::CheckGene => "check_gene",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.as_str() == value)
    }

    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::CheckReplace => "Should unexpected genome replacements be reported?",
            Self::ImportLocusTag => "Should CDS locus_tags be imported?",
            Self::CheckLocusTag => "Should the structure of CDS locus_tags be evaluated?",
            Self::CheckDescriptionTally => {
                "Should the number of descriptions in each field be evaluated?"
            }
            Self::CheckDescriptionField => {
                "Should CDS descriptions in unexpected fields be reported?"
            }
            Self::CheckDescription => "Should repeated CDS descriptions be reported?",
            Self::CheckTrna => "Should tRNA features be evaluated?",
            Self::CheckIdTypo => "Should genome ID typos be reported?",
            Self::CheckHostTypo => "Should host typos be reported?",
            Self::CheckAuthor => "Should unexpected authors be reported?",
            Self::CheckGene => "Should the CDS 'gene' qualifier be evaluated?",
        }
    }
}

/// Answers yes/no questions for the `custom` run mode.
pub trait FlagProvider {
    /// Return the answer for `flag`, or `None` when no answer is available.
    fn answer(&self, flag: EvalFlag) -> Option<bool>;
}

/// Provider that never answers, leaving every custom flag false.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFlags;

impl FlagProvider for NoFlags {
    fn answer(&self, _flag: EvalFlag) -> Option<bool> {
        None
    }
}

/// Provider backed by a fixed answer table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct StaticFlags {
    answers: BTreeMap<EvalFlag, bool>,
}

impl StaticFlags {
    #[must_use]
    pub fn new(answers: BTreeMap<EvalFlag, bool>) -> Self {
        Self { answers }
    }

    /// Build from `flag_name -> bool` pairs.
    ///
    /// # Errors
    /// Returns [`CoreError::Configuration`] when a name is not a known flag.
    pub fn from_named<'a, I>(answers: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut map = BTreeMap::new();
        for (name, value) in answers {
            let flag = EvalFlag::parse(name)
                .ok_or_else(|| CoreError::Configuration(format!("unknown evaluation flag: {name}")))?;
            map.insert(flag, value);
        }
        Ok(Self { answers: map })
    }
}

impl FlagProvider for StaticFlags {
    fn answer(&self, flag: EvalFlag) -> Option<bool> {
        self.answers.get(&flag).copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Base,
    Draft,
    Final,
    Auto,
    Misc,
    Custom,
}

impl RunMode {
    pub const ALL: [Self; 6] =
        [Self::Base, Self::Draft, Self::Final, Self::Auto, Self::Misc, Self::Custom];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Draft => "draft",
            Self::Final => "final",
            Self::Auto => "auto",
            Self::Misc => "misc",
            Self::Custom => "custom",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "base" => Some(Self::Base),
            "draft" => Some(Self::Draft),
            "final" => Some(Self::Final),
            "auto" => Some(Self::Auto),
            "misc" => Some(Self::Misc),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Parse a run mode name, treating unknown names as fatal configuration.
    ///
    /// # Errors
    /// Returns [`CoreError::Configuration`] for unrecognized names.
    pub fn require(value: &str) -> Result<Self, CoreError> {
        Self::parse(value)
            .ok_or_else(|| CoreError::Configuration(format!("unknown run mode: {value}")))
    }

    fn relaxed(self) -> &'static [EvalFlag] {
        match self {
            Self::Base | Self::Custom => &[],
            Self::Draft => &[
                EvalFlag::CheckLocusTag,
                EvalFlag::CheckDescriptionTally,
                EvalFlag::CheckDescriptionField,
                EvalFlag::CheckDescription,
                EvalFlag::CheckTrna,
                EvalFlag::CheckIdTypo,
                EvalFlag::CheckHostTypo,
                EvalFlag::CheckAuthor,
                EvalFlag::CheckGene,
            ],
            Self::Final => &[EvalFlag::ImportLocusTag],
            Self::Auto => &[
                EvalFlag::CheckLocusTag,
                EvalFlag::CheckDescriptionField,
                EvalFlag::CheckTrna,
                EvalFlag::CheckIdTypo,
                EvalFlag::CheckAuthor,
                EvalFlag::CheckGene,
            ],
            Self::Misc => &[
                EvalFlag::CheckLocusTag,
                EvalFlag::CheckDescriptionTally,
                EvalFlag::CheckDescriptionField,
                EvalFlag::CheckTrna,
                EvalFlag::CheckIdTypo,
                EvalFlag::CheckAuthor,
                EvalFlag::CheckGene,
            ],
        }
    }
}

/// The eleven check switches selected by one run mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvalFlags {
    mode: RunMode,
    values: [bool; 11],
}

impl EvalFlags {
    /// Resolve the flag table for `mode`; `custom` consults `provider` and
    /// defaults unanswered flags to false.
    #[must_use]
    pub fn for_mode(mode: RunMode, provider: &dyn FlagProvider) -> Self {
        let mut values = [true; 11];
        for (slot, flag) in values.iter_mut().zip(EvalFlag::ALL) {
            *slot = if mode == RunMode::Custom {
                provider.answer(flag).unwrap_or(false)
            } else {
                !mode.relaxed().contains(&flag)
            };
        }
        Self { mode, values }
    }

    /// Resolve flags for a run mode given by name.
    ///
    /// # Errors
    /// Returns [`CoreError::Configuration`] for unrecognized names.
    pub fn for_name(name: &str, provider: &dyn FlagProvider) -> Result<Self, CoreError> {
        Ok(Self::for_mode(RunMode::require(name)?, provider))
    }

    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    #[must_use]
    pub fn enabled(&self, flag: EvalFlag) -> bool {
        EvalFlag::ALL
            .iter()
            .position(|candidate| *candidate == flag)
            .is_some_and(|index| self.values[index])
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&'static str, bool> {
        EvalFlag::ALL.iter().zip(self.values).map(|(flag, value)| (flag.as_str(), value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_yields_eleven_flags() {
        for mode in RunMode::ALL {
            let flags = EvalFlags::for_mode(mode, &NoFlags);
            assert_eq!(flags.to_map().len(), 11, "mode {}", mode.as_str());
        }
    }

    #[test]
    fn base_is_fully_strict() {
        let flags = EvalFlags::for_mode(RunMode::Base, &NoFlags);
        assert!(EvalFlag::ALL.iter().all(|flag| flags.enabled(*flag)));
    }

    #[test]
    fn draft_auto_and_misc_skip_locus_tag_checks() {
        for mode in [RunMode::Draft, RunMode::Auto, RunMode::Misc] {
            let flags = EvalFlags::for_mode(mode, &NoFlags);
            assert!(!flags.enabled(EvalFlag::CheckLocusTag), "mode {}", mode.as_str());
            assert!(flags.enabled(EvalFlag::ImportLocusTag), "mode {}", mode.as_str());
        }
    }

    #[test]
    fn final_skips_locus_tag_import_only() {
        let flags = EvalFlags::for_mode(RunMode::Final, &NoFlags);
        assert!(!flags.enabled(EvalFlag::ImportLocusTag));
        assert!(flags.enabled(EvalFlag::CheckLocusTag));
        assert_eq!(flags.to_map().values().filter(|value| !**value).count(), 1);
    }

    #[test]
    fn custom_uses_provider_and_defaults_to_false() -> Result<(), CoreError> {
        let provider = StaticFlags::from_named([("check_gene", true), ("check_locus_tag", false)])?;
        let flags = EvalFlags::for_name("custom", &provider)?;
        assert_eq!(flags.to_map().len(), 11);
        assert!(flags.enabled(EvalFlag::CheckGene));
        assert!(!flags.enabled(EvalFlag::CheckLocusTag));
        assert!(!flags.enabled(EvalFlag::CheckTrna));

        let declined = EvalFlags::for_mode(RunMode::Custom, &NoFlags);
        assert!(!declined.enabled(EvalFlag::CheckLocusTag));
        Ok(())
    }

    #[test]
    fn unknown_mode_and_flag_names_are_configuration_errors() {
        assert!(matches!(EvalFlags::for_name("pecaan", &NoFlags), Err(CoreError::Configuration(_))));
        assert!(matches!(
            StaticFlags::from_named([("check_everything", true)]),
            Err(CoreError::Configuration(_))
        ));
    }
}
