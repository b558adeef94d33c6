//! Version range resolution using semver.
//!
//! npm range syntax is translated onto [`semver::VersionReq`] one comparator
//! at a time. The translation differs from Cargo's defaults in two places: a
//! bare full version (`1.2.3`) is exact rather than caret, and a bare partial
//! version (`1.2`) is an x-range rather than a caret range.

use super::error::DepsError;
use super::registry::PackageVersions;
use semver::{Version, VersionReq};

const LATEST_TAG: &str = "latest";

/// A parsed npm range: the union of one or more comparator sets.
#[derive(Debug, Clone)]
pub struct RangeSet {
    alternatives: Vec<VersionReq>,
}

impl RangeSet {
    /// Parse an npm range expression.
    ///
    /// # Errors
    /// Returns `DEPS_CONSTRAINT_INVALID` if any alternative is malformed.
    pub fn parse(range: &str) -> Result<Self, DepsError> {
        let mut alternatives = Vec::new();

        for alt in range.split("||").map(str::trim) {
            alternatives.push(parse_alternative(range, alt)?);
        }

        Ok(Self { alternatives })
    }

    /// Check whether a version satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Resolve a range against the available versions of a package.
///
/// Version strings that are not valid semver are skipped. Returns the
/// highest satisfying version, as spelled by the registry.
///
/// # Errors
/// Returns `DEPS_CONSTRAINT_INVALID` if the range is malformed, or
/// `DEPS_NO_COMPATIBLE_VERSION` if nothing satisfies it.
pub fn resolve_version<S: AsRef<str>>(
    name: &str,
    range: &str,
    available: &[S],
) -> Result<String, DepsError> {
    let set = RangeSet::parse(range)?;

    available
        .iter()
        .filter_map(|raw| {
            let raw = raw.as_ref();
            Version::parse(raw).ok().map(|v| (v, raw))
        })
        .filter(|(v, _)| set.matches(v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.to_string())
        .ok_or_else(|| DepsError::no_compatible_version(name, range))
}

/// Resolve a range against a package's versions, honouring `dist-tags.latest`.
///
/// `latest` picks the tagged version when the registry reports one that is
/// actually published; otherwise it is the highest stable version.
///
/// # Errors
/// Same as [`resolve_version`].
pub fn resolve_package_version(
    name: &str,
    range: &str,
    package: &PackageVersions,
) -> Result<String, DepsError> {
    if range.trim() == LATEST_TAG {
        if let Some(tagged) = package
            .latest
            .as_ref()
            .filter(|tag| package.versions.contains(tag))
        {
            return Ok(tagged.clone());
        }
    }
    resolve_version(name, range, &package.versions)
}

/// Check whether a single version string satisfies a range.
#[must_use]
pub fn version_satisfies(version: &str, range: &str) -> bool {
    let (Ok(version), Ok(set)) = (Version::parse(version), RangeSet::parse(range)) else {
        return false;
    };
    set.matches(&version)
}

/// Parse one `||` alternative.
fn parse_alternative(full: &str, alt: &str) -> Result<VersionReq, DepsError> {
    // "", "*", "x" and the latest tag all mean any release
    if alt.is_empty() || alt == LATEST_TAG {
        return Ok(VersionReq::STAR);
    }

    let pairs = match parse_hyphen_range(alt) {
        Some((start, end)) => vec![(">=", start), ("<=", end)],
        None => split_comparators(alt),
    };

    if let Some((op, _)) = pairs
        .iter()
        .find(|(_, version)| version.trim_start_matches(['v', '=']).is_empty())
    {
        return Err(DepsError::constraint_invalid(
            full,
            &format!("operator '{op}' has no version"),
        ));
    }

    // semver only accepts `*` as the sole comparator
    let converted = pairs
        .into_iter()
        .map(|(op, version)| convert_comparator(op, version))
        .filter(|c| c != "*")
        .collect::<Vec<_>>()
        .join(", ");
    if converted.is_empty() {
        return Ok(VersionReq::STAR);
    }

    VersionReq::parse(&converted).map_err(|e| DepsError::constraint_invalid(full, &e.to_string()))
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

const OPERATORS: [&str; 7] = [">=", "<=", ">", "<", "=", "~", "^"];

/// Split a comparator set into `(operator, version)` pairs.
///
/// npm allows spaces between comparators to mean AND, and also between an
/// operator and its version: ">= 2.1.2 < 3.0.0" is two comparators.
fn split_comparators(range: &str) -> Vec<(&str, &str)> {
    let mut result = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in range.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }

        let op = OPERATORS
            .iter()
            .find(|op| token.starts_with(**op))
            .copied()
            .unwrap_or("");
        let version = &token[op.len()..];

        if version.is_empty() {
            // Operator standing alone, its version is the next token
            pending_op = Some(op);
            continue;
        }

        match pending_op.take() {
            Some(prev) if op.is_empty() => result.push((prev, version)),
            Some(prev) => {
                // ">= <2": the first operator never got a version
                result.push((prev, ""));
                result.push((op, version));
            }
            None => result.push((op, version)),
        }
    }

    if let Some(op) = pending_op {
        result.push((op, ""));
    }

    result
}

/// Convert a single npm comparator into semver syntax.
fn convert_comparator(op: &str, version: &str) -> String {
    let version = version.trim_start_matches(['v', '=']);

    // Release part may carry "-pre" or "+build"; only wildcard the release part
    let (release, suffix) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };

    let parts: Vec<&str> = release
        .split('.')
        .take_while(|p| !matches!(*p, "x" | "X" | "*" | ""))
        .collect();

    if parts.is_empty() {
        return "*".to_string();
    }

    let is_full = parts.len() == 3;
    let joined = parts.join(".");

    match op {
        "" if is_full => format!("={joined}{suffix}"),
        "" => format!("{joined}.*"),
        _ if is_full => format!("{op}{joined}{suffix}"),
        _ => format!("{op}{joined}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::error::codes;

    fn resolve(range: &str, versions: &[&str]) -> Result<String, DepsError> {
        resolve_version("test-pkg", range, versions)
    }

    #[test]
    fn test_resolve_exact_version() {
        let version = resolve("2.0.0", &["1.0.0", "2.0.0", "2.1.0"]).unwrap();
        assert_eq!(version, "2.0.0");
    }

    #[test]
    fn test_resolve_exact_missing() {
        let err = resolve("2.0.1", &["1.0.0", "2.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::DEPS_NO_COMPATIBLE_VERSION);
    }

    #[test]
    fn test_resolve_caret_range() {
        let version = resolve("^1.0.0", &["1.0.0", "1.5.0", "2.0.0", "2.5.0"]).unwrap();
        assert_eq!(version, "1.5.0");
    }

    #[test]
    fn test_resolve_caret_zero_major() {
        let version = resolve("^0.2.1", &["0.2.1", "0.2.9", "0.3.0"]).unwrap();
        assert_eq!(version, "0.2.9");
    }

    #[test]
    fn test_resolve_tilde_range() {
        let version = resolve("~1.0.0", &["1.0.0", "1.0.5", "1.1.0", "2.0.0"]).unwrap();
        assert_eq!(version, "1.0.5");
    }

    #[test]
    fn test_resolve_major_only() {
        let version = resolve("2", &["1.0.0", "1.5.0", "2.0.0", "2.5.0", "3.0.0"]).unwrap();
        assert_eq!(version, "2.5.0");
    }

    #[test]
    fn test_resolve_major_minor_is_x_range() {
        let version = resolve("1.2", &["1.2.0", "1.2.7", "1.3.0"]).unwrap();
        assert_eq!(version, "1.2.7");
    }

    #[test]
    fn test_resolve_star_and_empty() {
        let versions = ["0.1.0", "3.4.5", "4.0.0-beta.1"];
        assert_eq!(resolve("*", &versions).unwrap(), "3.4.5");
        assert_eq!(resolve("", &versions).unwrap(), "3.4.5");
        assert_eq!(resolve("latest", &versions).unwrap(), "3.4.5");
    }

    fn package(versions: &[&str], latest: Option<&str>) -> PackageVersions {
        PackageVersions {
            versions: versions.iter().map(|v| (*v).to_string()).collect(),
            latest: latest.map(String::from),
        }
    }

    #[test]
    fn test_latest_follows_dist_tag() {
        // 2.0.0 is published but the maintainers kept latest on 1.x
        let pkg = package(&["1.4.0", "1.5.0", "2.0.0"], Some("1.5.0"));
        assert_eq!(resolve_package_version("p", "latest", &pkg).unwrap(), "1.5.0");
        assert_eq!(resolve_package_version("p", "*", &pkg).unwrap(), "2.0.0");
        assert_eq!(resolve_package_version("p", "^1.0.0", &pkg).unwrap(), "1.5.0");
    }

    #[test]
    fn test_latest_without_usable_dist_tag() {
        let untagged = package(&["1.0.0", "2.0.0", "3.0.0-beta.1"], None);
        assert_eq!(resolve_package_version("p", "latest", &untagged).unwrap(), "2.0.0");

        let dangling = package(&["1.0.0", "2.0.0"], Some("9.9.9"));
        assert_eq!(resolve_package_version("p", "latest", &dangling).unwrap(), "2.0.0");
    }

    #[test]
    fn test_resolve_prerelease_excluded_by_default() {
        let versions = ["1.0.0", "2.0.0-alpha.1", "2.0.0-beta.1", "2.0.0"];
        assert_eq!(resolve("^2.0.0", &versions).unwrap(), "2.0.0");
        assert_eq!(resolve("^1.0.0", &versions).unwrap(), "1.0.0");
    }

    #[test]
    fn test_resolve_prerelease_when_requested() {
        let versions = ["2.0.0-alpha.1", "2.0.0-beta.1"];
        assert_eq!(resolve("^2.0.0-alpha.0", &versions).unwrap(), "2.0.0-beta.1");
        assert_eq!(resolve("2.0.0-alpha.1", &versions).unwrap(), "2.0.0-alpha.1");
    }

    #[test]
    fn test_invalid_versions_are_skipped() {
        let version = resolve("^1.0.0", &["1.0.0", "not-a-version", "1.1", "1.4.0"]).unwrap();
        assert_eq!(version, "1.4.0");
    }

    #[test]
    fn test_invalid_range() {
        let err = resolve("not-a-range!!!", &["1.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::DEPS_CONSTRAINT_INVALID);
    }

    #[test]
    fn test_invalid_range_wins_over_empty_versions() {
        let err = resolve(">=>1", &[] as &[&str]).unwrap_err();
        assert_eq!(err.code(), codes::DEPS_CONSTRAINT_INVALID);
    }

    #[test]
    fn test_no_versions_at_all() {
        let err = resolve("^1.0.0", &[] as &[&str]).unwrap_err();
        assert_eq!(err.code(), codes::DEPS_NO_COMPATIBLE_VERSION);
    }

    #[test]
    fn test_or_range_picks_highest() {
        let version = resolve("^1.0.0 || ^2.0.0", &["1.5.0", "2.5.0", "3.0.0"]).unwrap();
        assert_eq!(version, "2.5.0");
    }

    #[test]
    fn test_or_range_only_first_matches() {
        let version = resolve("^1.0.0 || ^2.0.0", &["1.0.0", "1.5.0"]).unwrap();
        assert_eq!(version, "1.5.0");
    }

    #[test]
    fn test_or_range_without_spaces() {
        let version = resolve("^14.0.0||^15.0.0", &["14.0.0", "15.0.0"]).unwrap();
        assert_eq!(version, "15.0.0");
    }

    #[test]
    fn test_or_range_with_malformed_alternative() {
        let err = resolve("^1.0.0 || garbage!", &["1.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::DEPS_CONSTRAINT_INVALID);
    }

    #[test]
    fn test_operator_without_version_is_invalid() {
        let versions = ["1.0.0", "2.0.0", "9.9.9"];
        for range in [">=", "^", "~", "<", ">=1.0.0 <", ">= <2.0.0", "1.0.0 || >"] {
            let err = resolve(range, &versions).unwrap_err();
            assert_eq!(err.code(), codes::DEPS_CONSTRAINT_INVALID, "range {range:?}");
        }
    }

    #[test]
    fn test_lone_prefix_is_invalid() {
        let err = resolve(">=v", &["1.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::DEPS_CONSTRAINT_INVALID);
        assert!(err.message().contains("has no version"));
    }

    #[test]
    fn test_x_ranges() {
        let versions = ["1.0.0", "1.2.3", "1.5.0", "2.0.0"];
        assert_eq!(resolve("1.x", &versions).unwrap(), "1.5.0");
        assert_eq!(resolve("1.2.x", &versions).unwrap(), "1.2.3");
        assert_eq!(resolve("1.X", &versions).unwrap(), "1.5.0");
        assert_eq!(resolve("x", &versions).unwrap(), "2.0.0");
    }

    #[test]
    fn test_hyphen_range() {
        let versions = ["1.0.0", "1.5.0", "2.0.0", "3.0.0"];
        assert_eq!(resolve("1.0.0 - 2.0.0", &versions).unwrap(), "2.0.0");
    }

    #[test]
    fn test_space_separated_comparators() {
        let versions = ["2.0.0", "2.1.2", "2.5.0", "3.0.0"];
        assert_eq!(resolve(">= 2.1.2 < 3.0.0", &versions).unwrap(), "2.5.0");
        assert_eq!(resolve(">=2.1.2 <3.0.0", &versions).unwrap(), "2.5.0");
    }

    #[test]
    fn test_space_separated_comparators_exact_boundary() {
        let version = resolve(">= 2.1.2 < 3.0.0", &["2.1.2", "3.0.0"]).unwrap();
        assert_eq!(version, "2.1.2");
    }

    #[test]
    fn test_v_prefix_tolerated() {
        assert_eq!(resolve("v1.0.0", &["1.0.0", "1.0.1"]).unwrap(), "1.0.0");
        assert_eq!(resolve("^v1.0.0", &["1.0.0", "1.0.1"]).unwrap(), "1.0.1");
    }

    #[test]
    fn test_version_satisfies() {
        assert!(version_satisfies("1.2.3", "^1.0.0"));
        assert!(!version_satisfies("2.0.0", "^1.0.0"));
        assert!(!version_satisfies("garbage", "*"));
        assert!(!version_satisfies("1.0.0", "!!"));
    }

    #[test]
    fn test_split_comparators() {
        assert_eq!(
            split_comparators(">= 2.1.2 < 3.0.0"),
            vec![(">=", "2.1.2"), ("<", "3.0.0")]
        );
        assert_eq!(split_comparators("^1.2.3"), vec![("^", "1.2.3")]);
        assert_eq!(
            split_comparators(">=1.0.0, <2"),
            vec![(">=", "1.0.0"), ("<", "2")]
        );
    }

    #[test]
    fn test_convert_comparator() {
        assert_eq!(convert_comparator("", "1.2.3"), "=1.2.3");
        assert_eq!(convert_comparator("", "1.2"), "1.2.*");
        assert_eq!(convert_comparator("", "1.x"), "1.*");
        assert_eq!(convert_comparator("^", "1.x"), "^1");
        assert_eq!(convert_comparator("", "*"), "*");
        assert_eq!(convert_comparator("~", "1.2.3-beta.1"), "~1.2.3-beta.1");
    }
}
