// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Version constraint handling.

See <https://peps.python.org/pep-0440/#version-specifiers> for the syntax.
Pre-releases are always eligible to satisfy a constraint.
*/

use {
    crate::{
        error::{EggError, Result},
        version::Version,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// Regular expression to parse a single version clause.
static RE_CONSTRAINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^\s*
        (?P<operator>~=|===|==|!=|<=|>=|<|>)
        \s*
        # Version runs until whitespace or a delimiter.
        (?P<version>[^\s,;)]+)
        \s*$
        "#,
    )
    .unwrap()
});

/// A version comparison operator.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operator {
    /// `~=`
    Compatible,
    /// `==`
    Equal,
    /// `==` with a trailing `.*`
    EqualPrefix,
    /// `!=`
    NotEqual,
    /// `!=` with a trailing `.*`
    NotEqualPrefix,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `===`
    Arbitrary,
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Compatible => "~=",
            Self::Equal | Self::EqualPrefix => "==",
            Self::NotEqual | Self::NotEqualPrefix => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Arbitrary => "===",
        })
    }
}

/// A comparison operator applied to a version.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VersionConstraint {
    pub operator: Operator,
    /// The version operand. For prefix operators this is the prefix without `.*`.
    pub version: Version,
}

impl Display for VersionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.operator, self.version)?;

        if matches!(
            self.operator,
            Operator::EqualPrefix | Operator::NotEqualPrefix
        ) {
            write!(f, ".*")?;
        }

        Ok(())
    }
}

impl FromStr for VersionConstraint {
    type Err = EggError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl VersionConstraint {
    /// Parse a single constraint clause such as `>=1.0` or `==2.*`.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_CONSTRAINT
            .captures(s)
            .ok_or_else(|| EggError::InvalidSpecifier(s.to_string()))?;

        let version_text = &caps["version"];
        let (operator, version_text) = match (&caps["operator"], version_text.strip_suffix(".*")) {
            ("==", Some(prefix)) => (Operator::EqualPrefix, prefix),
            ("!=", Some(prefix)) => (Operator::NotEqualPrefix, prefix),
            (_, Some(_)) => return Err(EggError::InvalidSpecifier(s.to_string())),
            ("~=", None) => (Operator::Compatible, version_text),
            ("==", None) => (Operator::Equal, version_text),
            ("!=", None) => (Operator::NotEqual, version_text),
            ("<", None) => (Operator::Less, version_text),
            ("<=", None) => (Operator::LessOrEqual, version_text),
            (">", None) => (Operator::Greater, version_text),
            (">=", None) => (Operator::GreaterOrEqual, version_text),
            (_, None) => (Operator::Arbitrary, version_text),
        };

        let version = Version::parse(version_text)
            .map_err(|_| EggError::InvalidSpecifier(s.to_string()))?;

        let valid = match operator {
            // Prefixes only make sense over the release segment.
            Operator::EqualPrefix | Operator::NotEqualPrefix => {
                !version.is_prerelease() && !version.is_postrelease() && !version.is_local()
            }
            Operator::Compatible => version.release().len() >= 2 && !version.is_local(),
            Operator::Less
            | Operator::LessOrEqual
            | Operator::Greater
            | Operator::GreaterOrEqual => !version.is_local(),
            Operator::Equal | Operator::NotEqual | Operator::Arbitrary => true,
        };

        if !valid {
            return Err(EggError::InvalidSpecifier(s.to_string()));
        }

        Ok(Self { operator, version })
    }

    /// Evaluate whether a version satisfies this constraint.
    pub fn contains(&self, candidate: &Version) -> bool {
        let spec = &self.version;

        match self.operator {
            Operator::Equal => {
                if spec.is_local() {
                    candidate == spec
                } else {
                    &candidate.public() == spec
                }
            }
            Operator::NotEqual => !Self {
                operator: Operator::Equal,
                version: spec.clone(),
            }
            .contains(candidate),
            Operator::EqualPrefix => prefix_matches(spec.epoch(), spec.release(), candidate),
            Operator::NotEqualPrefix => !prefix_matches(spec.epoch(), spec.release(), candidate),
            Operator::Compatible => {
                let prefix = &spec.release()[0..spec.release().len() - 1];

                &candidate.public() >= spec && prefix_matches(spec.epoch(), prefix, candidate)
            }
            Operator::LessOrEqual => &candidate.public() <= spec,
            Operator::GreaterOrEqual => &candidate.public() >= spec,
            Operator::Less => {
                // <1.0 should not admit 1.0a1 unless the operand is itself a pre-release.
                candidate < spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.base() == spec.base())
            }
            Operator::Greater => {
                if candidate <= spec {
                    false
                } else if !spec.is_postrelease()
                    && candidate.is_postrelease()
                    && candidate.base() == spec.base()
                {
                    false
                } else {
                    !(candidate.is_local() && candidate.base() == spec.base())
                }
            }
            Operator::Arbitrary => {
                candidate.to_string().to_lowercase() == spec.to_string().to_lowercase()
            }
        }
    }
}

/// Whether the candidate's release segment starts with `prefix`.
///
/// The candidate release is zero padded so `1.0` matches `1.0.0.*`.
fn prefix_matches(epoch: u64, prefix: &[u64], candidate: &Version) -> bool {
    if candidate.epoch() != epoch {
        return false;
    }

    let release = candidate.release();

    prefix
        .iter()
        .enumerate()
        .all(|(i, part)| release.get(i).copied().unwrap_or(0) == *part)
}

/// Evaluate whether a version satisfies a constraint.
pub fn satisfies(version: &Version, constraint: &VersionConstraint) -> bool {
    constraint.contains(version)
}

/// Parse a comma delimited list of constraints.
///
/// An empty or whitespace-only string yields no constraints.
pub fn parse_constraints(s: &str) -> Result<Vec<VersionConstraint>> {
    if s.trim().is_empty() {
        return Ok(vec![]);
    }

    s.split(',').map(VersionConstraint::parse).collect()
}
