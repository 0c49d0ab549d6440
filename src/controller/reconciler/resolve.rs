//! # Application Resolver
//!
//! Selects the applications to render from the catalogue using the CR's
//! include and exclude matchers.
//!
//! Includes form a union of exact and regex matches. Excludes are applied
//! afterwards and always win. Without any include matcher every application
//! is a candidate.

use crate::crd::{Applications, Matchers};
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid {kind} regex matcher \"{pattern}\": {source}")]
pub struct InvalidMatcherError {
    pub kind: &'static str,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Regex(Regex),
}

impl Matcher {
    /// Exact matchers compare the whole name, regex matchers search anywhere in it
    #[must_use]
    pub fn matches(&self, app: &str) -> bool {
        match self {
            Self::Exact(name) => name == app,
            Self::Regex(regex) => regex.is_match(app),
        }
    }
}

/// Compiled include/exclude matchers
#[derive(Debug, Clone, Default)]
pub struct MatcherSet {
    pub includes: Vec<Matcher>,
    pub excludes: Vec<Matcher>,
}

impl MatcherSet {
    /// Compile the CR matchers; any invalid regex fails the whole set
    pub fn compile(applications: &Applications) -> Result<Self, InvalidMatcherError> {
        Ok(Self {
            includes: compile_matchers(&applications.includes, "include")?,
            excludes: compile_matchers(&applications.excludes, "exclude")?,
        })
    }
}

fn compile_matchers(
    matchers: &Matchers,
    kind: &'static str,
) -> Result<Vec<Matcher>, InvalidMatcherError> {
    let exact = matchers
        .exact_matchers
        .iter()
        .map(|name| Ok(Matcher::Exact(name.clone())));
    let regex = matchers.regex_matchers.iter().map(|pattern| {
        Regex::new(pattern)
            .map(Matcher::Regex)
            .map_err(|source| InvalidMatcherError {
                kind,
                pattern: pattern.clone(),
                source,
            })
    });
    exact.chain(regex).collect()
}

/// Outcome of filtering the catalogue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Applications to render, sorted and de-duplicated
    pub matches: Vec<String>,
    /// Exact include matchers naming no application, sorted and de-duplicated
    pub misses: Vec<String>,
}

/// Filter the catalogue with the CR's matchers
///
/// `None` or an empty catalogue resolves to nothing.
pub fn filter_apps(
    catalogue: Option<&[String]>,
    applications: &Applications,
) -> Result<Resolution, InvalidMatcherError> {
    let Some(catalogue) = catalogue.filter(|apps| !apps.is_empty()) else {
        return Ok(Resolution::default());
    };

    let matchers = MatcherSet::compile(applications)?;

    let all: BTreeSet<&str> = catalogue.iter().map(String::as_str).collect();

    let candidates: BTreeSet<&str> = if matchers.includes.is_empty() {
        all.clone()
    } else {
        all.iter()
            .copied()
            .filter(|app| matchers.includes.iter().any(|m| m.matches(app)))
            .collect()
    };

    let matches = candidates
        .into_iter()
        .filter(|app| !matchers.excludes.iter().any(|m| m.matches(app)))
        .map(str::to_string)
        .collect();

    let misses = applications
        .includes
        .exact_matchers
        .iter()
        .filter(|name| !all.contains(name.as_str()))
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();

    Ok(Resolution { matches, misses })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_exact_include_selects_single_app() {
        let catalogue = strings(&["app-1", "app-2", "app-3"]);
        let applications = Applications {
            includes: Matchers {
                exact_matchers: strings(&["app-1"]),
                regex_matchers: vec![],
            },
            excludes: Matchers::default(),
        };

        let resolution = filter_apps(Some(&catalogue), &applications).unwrap();
        assert_eq!(resolution.matches, strings(&["app-1"]));
        assert!(resolution.misses.is_empty());
    }

    #[test]
    fn test_matcher_kinds() {
        assert!(Matcher::Exact("trivy".into()).matches("trivy"));
        assert!(!Matcher::Exact("trivy".into()).matches("trivy-operator"));
        assert!(Matcher::Regex(Regex::new("operator").unwrap()).matches("trivy-operator"));
    }

    #[test]
    fn test_invalid_exclude_regex_is_reported_as_exclude() {
        let applications = Applications {
            includes: Matchers::default(),
            excludes: Matchers {
                exact_matchers: vec![],
                regex_matchers: strings(&["("]),
            },
        };
        let err = filter_apps(Some(&strings(&["a"])), &applications).unwrap_err();
        assert_eq!(err.kind, "exclude");
        assert_eq!(err.pattern, "(");
    }
}
