//! Version constraint matching for capability discovery.
//!
//! Constraints use a semver-style prefix grammar: `=`, `>`, `>=`, `<`, `<=`,
//! `~` (same major.minor, patch at least), `^` (same major, minor at least).
//! A bare version means exact equality. Pre-release suffixes are stripped
//! before comparison and numeric components are zero-padded to equal length,
//! so `"1.2"` and `"1.2.0"` compare equal.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed version constraint, e.g. `>=1.2.0` or `~2.0.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    Exact(String),
    GreaterThan(String),
    GreaterOrEqual(String),
    LessThan(String),
    LessOrEqual(String),
    /// `~X.Y.Z`: same major and minor, patch >= Z.
    Tilde(String),
    /// `^X.Y.Z`: same major, minor >= Y.
    Caret(String),
}

impl VersionConstraint {
    /// Parse a constraint expression. Never fails: an expression without a
    /// recognized operator prefix is treated as exact equality.
    pub fn parse(expr: &str) -> Self {
        let expr = expr.trim();
        if let Some(rest) = expr.strip_prefix(">=") {
            VersionConstraint::GreaterOrEqual(rest.trim().to_string())
        } else if let Some(rest) = expr.strip_prefix("<=") {
            VersionConstraint::LessOrEqual(rest.trim().to_string())
        } else if let Some(rest) = expr.strip_prefix('>') {
            VersionConstraint::GreaterThan(rest.trim().to_string())
        } else if let Some(rest) = expr.strip_prefix('<') {
            VersionConstraint::LessThan(rest.trim().to_string())
        } else if let Some(rest) = expr.strip_prefix('=') {
            VersionConstraint::Exact(rest.trim().to_string())
        } else if let Some(rest) = expr.strip_prefix('~') {
            VersionConstraint::Tilde(rest.trim().to_string())
        } else if let Some(rest) = expr.strip_prefix('^') {
            VersionConstraint::Caret(rest.trim().to_string())
        } else {
            VersionConstraint::Exact(expr.to_string())
        }
    }

    /// Whether `version` satisfies this constraint.
    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionConstraint::Exact(target) => version == target,
            VersionConstraint::GreaterThan(target) => {
                compare_versions(version, target) == Ordering::Greater
            }
            VersionConstraint::GreaterOrEqual(target) => {
                compare_versions(version, target) != Ordering::Less
            }
            VersionConstraint::LessThan(target) => {
                compare_versions(version, target) == Ordering::Less
            }
            VersionConstraint::LessOrEqual(target) => {
                compare_versions(version, target) != Ordering::Greater
            }
            VersionConstraint::Tilde(target) => is_compatible_patch(version, target),
            VersionConstraint::Caret(target) => is_compatible_minor(version, target),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Exact(v) => write!(f, "={v}"),
            VersionConstraint::GreaterThan(v) => write!(f, ">{v}"),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">={v}"),
            VersionConstraint::LessThan(v) => write!(f, "<{v}"),
            VersionConstraint::LessOrEqual(v) => write!(f, "<={v}"),
            VersionConstraint::Tilde(v) => write!(f, "~{v}"),
            VersionConstraint::Caret(v) => write!(f, "^{v}"),
        }
    }
}

/// Numeric parts of a dotted version, pre-release suffix stripped.
/// Returns `None` when any component fails to parse.
fn parse_parts(version: &str) -> Option<Vec<u64>> {
    let core = version.split('-').next().unwrap_or(version);
    core.split('.')
        .map(|p| p.trim().parse::<u64>().ok())
        .collect()
}

/// Compare two dotted versions numerically, zero-padding the shorter one.
/// Unparsable versions compare equal.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (Some(mut pa), Some(mut pb)) = (parse_parts(a), parse_parts(b)) else {
        return Ordering::Equal;
    };
    let len = pa.len().max(pb.len());
    pa.resize(len, 0);
    pb.resize(len, 0);
    pa.cmp(&pb)
}

fn is_compatible_patch(version: &str, target: &str) -> bool {
    let (Some(v), Some(t)) = (parse_parts(version), parse_parts(target)) else {
        return false;
    };
    if v.len() < 3 || t.len() < 3 {
        return false;
    }
    v[0] == t[0] && v[1] == t[1] && v[2] >= t[2]
}

fn is_compatible_minor(version: &str, target: &str) -> bool {
    let (Some(v), Some(t)) = (parse_parts(version), parse_parts(target)) else {
        return false;
    };
    if v.len() < 2 || t.len() < 2 {
        return false;
    }
    v[0] == t[0] && v[1] >= t[1]
}
