//! Conformance test fixture runner
//!
//! Loads YAML fixtures and runs them against a fieldtools catalog. A fixture
//! file holds one or more documents separated by `---`:
//!
//! ```yaml
//! name: lengths
//! description: len() is inclusive on both ends
//! principals: [user]
//! scope_aliases:
//!   post: create
//! constraints:
//!   id: "regexp('^[a-z]{2}$')"
//! expressions:
//!   - tag: "len(1,3)"
//!     cases:
//!       - { name: empty, value: "", expect: false }
//!       - { name: three, value: "abc", expect: true }
//!   - tag: "len(1"
//!     error: "expected"
//! access:
//!   - tag: "rw"
//!     grants: { user: rcu }
//! ```

use std::collections::BTreeMap;

use fieldtools::{Catalog, CatalogBuilder, Constraint, ConstraintRef, ScopeAliases, Value, WILDCARD_SCOPE};
use serde::Deserialize;

/// A complete test fixture
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Custom principals registered before the cases run.
    #[serde(default)]
    pub principals: Vec<String>,
    /// Alias to scope, registered before the cases run.
    #[serde(default)]
    pub scope_aliases: BTreeMap<String, String>,
    /// Named constraint expressions usable as `$name` terms.
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,
    #[serde(default)]
    pub expressions: Vec<ExpressionCase>,
    #[serde(default)]
    pub access: Vec<AccessCase>,
}

/// A validation tag and the values it is checked against
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpressionCase {
    pub tag: String,
    /// Substring of the expected parse error. Set for tags that must not build.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub cases: Vec<ValueCase>,
}

/// One value checked against a tag
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueCase {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Active scope; the wildcard when absent.
    #[serde(default)]
    pub scope: Option<String>,
    pub expect: bool,
}

/// An access tag and the kinds it grants
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessCase {
    pub tag: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub provided: bool,
    /// Principal name to kinds, written `rcu` with `-` or omitted letters for
    /// missing kinds. Unlisted principals expect no access.
    #[serde(default)]
    pub grants: BTreeMap<String, String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running a single test case
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
}

impl Fixture {
    /// Parse a fixture from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Build the catalog this fixture runs against
    pub fn catalog(&self) -> fieldtools::Result<Catalog> {
        let mut builder = CatalogBuilder::new().register_access_principals(self.principals.iter().cloned())?;
        for (alias, scope) in &self.scope_aliases {
            builder = builder.scope_alias(alias.as_str(), scope.as_str())?;
        }
        Ok(builder.register_constraint_expressions(&self.constraints)?.build())
    }

    /// Run all test cases and return results
    pub fn run(&self) -> Vec<CaseResult> {
        let catalog = match self.catalog() {
            Ok(catalog) => catalog,
            Err(e) => {
                return vec![CaseResult {
                    case_name: "catalog".into(),
                    passed: false,
                    expected: "catalog builds".into(),
                    actual: e.to_string(),
                }]
            }
        };
        let mut results = Vec::new();
        for expression in &self.expressions {
            expression.run(&catalog, &mut results);
        }
        for access in &self.access {
            access.run(&catalog, &mut results);
        }
        results
    }

    /// Run all test cases and panic on first failure
    pub fn run_and_assert(&self) {
        let results = self.run();
        for result in results {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed: expected {}, got {}",
                self.name, result.case_name, result.expected, result.actual
            );
        }
    }
}

fn error_result(case_name: String, expected: &str, outcome: Result<(), String>) -> CaseResult {
    match outcome {
        Ok(()) => CaseResult {
            case_name,
            passed: false,
            expected: format!("error containing \"{expected}\""),
            actual: "built".into(),
        },
        Err(message) => CaseResult {
            case_name,
            passed: message.contains(expected),
            expected: format!("error containing \"{expected}\""),
            actual: message,
        },
    }
}

impl ExpressionCase {
    fn run(&self, catalog: &Catalog, results: &mut Vec<CaseResult>) {
        let built = catalog.validation(&self.tag);
        if let Some(expected) = &self.error {
            let outcome = built.map(|_| ()).map_err(|e| e.to_string());
            results.push(error_result(self.tag.clone(), expected, outcome));
            return;
        }
        let groups = match built {
            Ok(groups) => groups,
            Err(e) => {
                results.push(CaseResult {
                    case_name: self.tag.clone(),
                    passed: false,
                    expected: "tag builds".into(),
                    actual: e.to_string(),
                });
                return;
            }
        };
        for case in &self.cases {
            let scope = case.scope.as_deref().unwrap_or(WILDCARD_SCOPE);
            let actual = select(&groups, catalog.aliases(), scope).map_or(true, |c| c.test(&Value::from(case.value.clone())));
            results.push(CaseResult {
                case_name: format!("{} / {}", self.tag, case.name),
                passed: actual == case.expect,
                expected: case.expect.to_string(),
                actual: actual.to_string(),
            });
        }
    }
}

/// Constraint for `scope`: the last group naming it, else the last wildcard
/// group. Both sides resolve through `aliases` first.
fn select<'a>(
    groups: &'a [(String, ConstraintRef)],
    aliases: &ScopeAliases,
    scope: &str,
) -> Option<&'a ConstraintRef> {
    let last = |wanted: &str| {
        groups
            .iter()
            .rev()
            .find(|(s, _)| aliases.resolve(s) == wanted)
            .map(|(_, c)| c)
    };
    last(aliases.resolve(scope)).or_else(|| last(WILDCARD_SCOPE))
}

impl AccessCase {
    fn run(&self, catalog: &Catalog, results: &mut Vec<CaseResult>) {
        let parsed = catalog.principals().parse_tag(&self.tag);
        if let Some(expected) = &self.error {
            let outcome = parsed.map(|_| ()).map_err(|e| e.to_string());
            results.push(error_result(self.tag.clone(), expected, outcome));
            return;
        }
        let spec = match parsed {
            Ok(spec) => spec,
            Err(e) => {
                results.push(CaseResult {
                    case_name: self.tag.clone(),
                    passed: false,
                    expected: "tag parses".into(),
                    actual: e.to_string(),
                });
                return;
            }
        };
        results.push(CaseResult {
            case_name: format!("{} / provided", self.tag),
            passed: spec.provided == self.provided,
            expected: self.provided.to_string(),
            actual: spec.provided.to_string(),
        });
        for (principal, kinds) in catalog.principals().describe(spec.mask) {
            let expected = normalize(self.grants.get(principal).map_or("", String::as_str));
            let actual = kinds.to_string();
            results.push(CaseResult {
                case_name: format!("{} / {principal}", self.tag),
                passed: actual == expected,
                expected,
                actual,
            });
        }
    }
}

/// `"ru"` and `"r-u"` both become `"r-u"`.
fn normalize(kinds: &str) -> String {
    ['r', 'c', 'u']
        .iter()
        .map(|&c| if kinds.contains(c) { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_kinds() {
        assert_eq!(normalize("rcu"), "rcu");
        assert_eq!(normalize("ur"), "r-u");
        assert_eq!(normalize(""), "---");
        assert_eq!(normalize("-"), "---");
    }

    #[test]
    fn inline_fixture_runs() {
        let fixture = Fixture::from_yaml(
            r#"
name: inline
principals: [user]
expressions:
  - tag: "required;create:len(2,3)"
    cases:
      - { name: wildcard, value: "x", expect: true }
      - { name: create-short, value: "x", scope: create, expect: false }
      - { name: "null", value: null, expect: false }
access:
  - tag: "r-,p"
    provided: true
    grants: { user: r }
"#,
        )
        .unwrap();
        fixture.run_and_assert();
    }

    #[test]
    fn aliased_group_scopes_match_their_target() {
        let fixture = Fixture::from_yaml(
            r#"
name: aliased
scope_aliases:
  post: create
expressions:
  - tag: "post:len(2,3);*:notnil"
    cases:
      - { name: create-short, value: "a", scope: create, expect: false }
      - { name: post-short, value: "a", scope: post, expect: false }
      - { name: update-short, value: "a", scope: update, expect: true }
"#,
        )
        .unwrap();
        assert_eq!(fixture.catalog().unwrap().aliases().resolve("post"), "create");
        fixture.run_and_assert();
    }
}
