use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use phage_import_core::StaticFlags;

/// Load `custom` run-mode answers from a YAML mapping of `flag_name: bool`.
///
/// # Errors
/// Returns an error when the file cannot be read, is not a flag mapping, or
/// names an unknown flag.
pub fn load_custom_flags(path: &Path) -> Result<StaticFlags> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read custom flags {}", path.display()))?;
    parse_custom_flags(&raw).with_context(|| format!("invalid custom flags {}", path.display()))
}

/// # Errors
/// Returns an error when `raw` is not a flag mapping or names an unknown flag.
pub fn parse_custom_flags(raw: &str) -> Result<StaticFlags> {
    let answers: BTreeMap<String, bool> = if raw.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_yaml::from_str(raw).context("custom flags must map flag names to booleans")?
    };
    let flags =
        StaticFlags::from_named(answers.iter().map(|(name, value)| (name.as_str(), *value)))?;
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phage_import_core::{EvalFlag, EvalFlags, RunMode};

    #[test]
    fn yaml_answers_drive_custom_mode() -> Result<()> {
        let provider = parse_custom_flags("check_replace: true\nimport_locus_tag: true\ncheck_author: false\n")?;
        let flags = EvalFlags::for_mode(RunMode::Custom, &provider);
        assert!(flags.enabled(EvalFlag::CheckReplace));
        assert!(flags.enabled(EvalFlag::ImportLocusTag));
        assert!(!flags.enabled(EvalFlag::CheckAuthor));
        Ok(())
    }

    #[test]
    fn unknown_flag_names_are_rejected() {
        assert!(parse_custom_flags("check_everything: true\n").is_err());
        assert!(parse_custom_flags("- check_replace\n").is_err());
    }

    #[test]
    fn empty_file_answers_nothing() -> Result<()> {
        let provider = parse_custom_flags("")?;
        let flags = EvalFlags::for_mode(RunMode::Custom, &provider);
        assert!(flags.to_map().values().all(|value| !value));
        Ok(())
    }
}
