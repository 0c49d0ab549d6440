//! # Application Filter Tests
//!
//! Table-driven tests for include/exclude matcher resolution.

use konfigure_operator::controller::reconciler::resolve::filter_apps;
use konfigure_operator::crd::{Applications, Matchers};

struct Case {
    name: &'static str,
    all_apps: Option<&'static [&'static str]>,
    include_exact: &'static [&'static str],
    include_regex: &'static [&'static str],
    exclude_exact: &'static [&'static str],
    exclude_regex: &'static [&'static str],
    expected_match: &'static [&'static str],
    expected_miss: &'static [&'static str],
    expect_error: bool,
}

const EMPTY: &[&str] = &[];

impl Case {
    const fn new(name: &'static str, all_apps: Option<&'static [&'static str]>) -> Self {
        Self {
            name,
            all_apps,
            include_exact: EMPTY,
            include_regex: EMPTY,
            exclude_exact: EMPTY,
            exclude_regex: EMPTY,
            expected_match: EMPTY,
            expected_miss: EMPTY,
            expect_error: false,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            expected_match: &["a", "b", "c"],
            ..Case::new("no matchers should return all apps", Some(&["a", "b", "c"]))
        },
        Case::new("no apps, no results", None),
        Case {
            include_exact: &["y", "c", "a", "x"],
            expected_match: &["a", "c"],
            expected_miss: &["x", "y"],
            ..Case::new("results are returned ordered", Some(&["b", "d", "a", "c"]))
        },
        Case {
            include_regex: &["trivy.*", ".*-operator"],
            expected_match: &["app-operator", "trivy", "trivy-operator"],
            ..Case::new(
                "valid regex matchers",
                Some(&[
                    "app-operator",
                    "trivy",
                    "observability-bundle",
                    "trivy-operator",
                    "operator-zero",
                ]),
            )
        },
        Case {
            include_regex: &["^app-([a-zA-Z]+)$"],
            expected_match: &["app-exporter", "app-operator"],
            ..Case::new(
                "using group matcher",
                Some(&[
                    "chart-operator",
                    "app-exporter",
                    "observability-bundle",
                    "app-asd-qwe",
                    "app-operator",
                    "chart-app-controller",
                ]),
            )
        },
        Case {
            include_regex: &[".*p.*", "$^*.a-z\\"],
            expect_error: true,
            ..Case::new(
                "invalid regular expression poisons the whole filter",
                Some(&["apple", "pear", "blueberry"]),
            )
        },
        Case {
            include_regex: &["[b]+[a]{1,2}"],
            expected_match: &["aabaa", "abababa", "cbbacab"],
            ..Case::new(
                "regex does not have to match the whole string",
                Some(&["a", "aa", "aab", "aabaa", "abababa", "abca", "cbbacab"]),
            )
        },
        Case {
            include_regex: &["c[a]{2,3}", "[b]+[a]{1,2}$"],
            expected_match: &["ba", "baa", "caa", "caaa"],
            ..Case::new(
                "greedy regex matchers",
                Some(&["a", "aa", "aaa", "b", "ba", "baa", "baaa", "c", "ca", "caa", "caaa"]),
            )
        },
        Case {
            exclude_exact: &["x", "b"],
            expected_match: &["a", "c", "d", "y", "z"],
            ..Case::new(
                "exact excludes without includes",
                Some(&["a", "c", "x", "y", "z", "b", "d"]),
            )
        },
        Case {
            exclude_regex: &["[4-6]{3}"],
            expected_match: &["123", "64", "789"],
            ..Case::new(
                "regex excludes without includes",
                Some(&["123", "456", "789", "64"]),
            )
        },
        Case {
            include_exact: &["aa"],
            include_regex: &["\\d+"],
            exclude_regex: &["\\d{6}", "24"],
            expected_match: &["123", "456", "789", "aa", "c12"],
            ..Case::new(
                "complex include and exclude matchers",
                Some(&["a", "123", "aa", "456", "a24", "789", "123456", "c12", "3245"]),
            )
        },
        Case {
            include_exact: &["dd", "cc", "d"],
            include_regex: &["^[a]*$"],
            exclude_exact: &["aa"],
            exclude_regex: &["d.+"],
            expected_match: &["a", "aaa", "d"],
            expected_miss: &["cc"],
            ..Case::new(
                "exclude applies after include",
                Some(&["a", "aa", "aab", "b", "d", "c", "aaa", "dd"]),
            )
        },
    ]
}

#[test]
fn test_filter_apps() {
    for (i, case) in cases().into_iter().enumerate() {
        let applications = Applications {
            includes: Matchers {
                exact_matchers: strings(case.include_exact),
                regex_matchers: strings(case.include_regex),
            },
            excludes: Matchers {
                exact_matchers: strings(case.exclude_exact),
                regex_matchers: strings(case.exclude_regex),
            },
        };
        let catalogue = case.all_apps.map(strings);

        let result = filter_apps(catalogue.as_deref(), &applications);

        if case.expect_error {
            assert!(result.is_err(), "case {i}: {}: expected an error", case.name);
            continue;
        }
        let resolution = result.unwrap_or_else(|e| panic!("case {i}: {}: {e}", case.name));
        assert_eq!(
            resolution.matches,
            strings(case.expected_match),
            "case {i}: {}: matches",
            case.name
        );
        assert_eq!(
            resolution.misses,
            strings(case.expected_miss),
            "case {i}: {}: misses",
            case.name
        );
    }
}

#[test]
fn test_exact_include_of_example_app() {
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
fn test_empty_catalogue_resolves_to_nothing() {
    let applications = Applications {
        includes: Matchers {
            exact_matchers: strings(&["app-1"]),
            regex_matchers: vec![],
        },
        excludes: Matchers::default(),
    };

    let resolution = filter_apps(Some(&[]), &applications).unwrap();
    assert!(resolution.matches.is_empty());
}
