//! Glob and regex compilation shared by the guards.
//!
//! Function-name and resource patterns use shell-style globs (`*` matches
//! any substring, `?` one character, `[...]` a class). Globs are compiled
//! once, at guard construction, into a single `GlobSet`; a bad pattern is a
//! configuration error, not something discovered mid-evaluation.

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

use warden_contracts::error::{WardenError, WardenResult};

/// An ordered list of glob patterns compiled into one matcher.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl PatternSet {
    /// Compile `patterns`. `field` names the config option in error messages.
    pub fn compile(field: &str, patterns: &[String]) -> WardenResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                WardenError::config(format!("{field}: invalid glob pattern '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| WardenError::config(format!("{field}: {e}")))?;
        Ok(Self { patterns: patterns.to_vec(), set })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.set.is_match(candidate)
    }

    /// The first pattern, in declaration order, that matches `candidate`.
    pub fn first_match(&self, candidate: &str) -> Option<&str> {
        self.set
            .matches(candidate)
            .into_iter()
            .min()
            .map(|index| self.patterns[index].as_str())
    }
}

/// Compile a named regular expression.
pub fn compile_regex(name: &str, pattern: &str) -> WardenResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| WardenError::config(format!("pattern '{name}' is not a valid regex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> PatternSet {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        PatternSet::compile("test", &owned).unwrap()
    }

    #[test]
    fn star_matches_any_substring() {
        let globs = set(&["get_*", "*_backup"]);
        assert!(globs.is_match("get_profile"));
        assert!(globs.is_match("db/prod_backup"));
        assert!(!globs.is_match("delete_profile"));
    }

    #[test]
    fn first_match_follows_declaration_order() {
        let globs = set(&["temp_*", "*", "temp_1"]);
        assert_eq!(globs.first_match("temp_1"), Some("temp_*"));
        assert_eq!(globs.first_match("report"), Some("*"));
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let err = PatternSet::compile("deny_patterns", &["[unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, WardenError::Config { .. }));
        assert!(err.to_string().contains("deny_patterns"));
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let err = compile_regex("employee_id", "EMP-(\\d{6}").unwrap_err();
        assert!(err.to_string().contains("employee_id"));
    }

    #[test]
    fn empty_set_matches_nothing() {
        let globs = PatternSet::compile("allow_functions", &[]).unwrap();
        assert!(globs.is_empty());
        assert!(!globs.is_match("anything"));
    }
}
