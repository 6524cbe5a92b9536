// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Python version string handling.

Versions follow [PEP 440](https://peps.python.org/pep-0440/). The concise
format is `[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`, with a handful of
alternate spellings accepted on input and normalized on output.

Version strings outside this grammar (historically called "legacy" versions)
are rejected instead of being given an ad hoc ordering.

Numeric components are stored as `u64`. A component that does not fit, e.g.
`1.0.99999999999999999999`, is rejected with [EggError::InvalidVersion] even
though PEP 440 places no bound on it.
*/

use {
    crate::error::{EggError, Result},
    once_cell::sync::Lazy,
    regex::{Captures, Regex},
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        hash::{Hash, Hasher},
        str::FromStr,
    },
};

/// Regular expression to parse PEP 440 version strings.
static RE_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?ix)
        ^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>
            [-_.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [-_.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:
                [-_.]?
                (?P<post_l>post|rev|r)
                [-_.]?
                (?P<post_n2>[0-9]+)?
            )
        )?
        (?P<dev>
            [-_.]?
            dev
            [-_.]?
            (?P<dev_n>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$
        "#,
    )
    .unwrap()
});

/// The phase of a pre-release.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PreReleaseKind {
    Alpha,
    Beta,
    ReleaseCandidate,
}

impl Display for PreReleaseKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => write!(f, "a"),
            Self::Beta => write!(f, "b"),
            Self::ReleaseCandidate => write!(f, "rc"),
        }
    }
}

/// A component of the local version label.
///
/// Alphanumeric segments sort before numeric ones.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Sort key for the pre-release component.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum PreKey {
    /// A dev release with no pre or post component, e.g. `1.0.dev1`.
    DevOnly,
    Pre(PreReleaseKind, u64),
    Final,
}

/// A parsed Python version.
///
/// Ordering is total: two versions compare equal exactly when their PEP 440
/// normalized forms are equal modulo trailing zeros in the release
/// (`1.0 == 1.0.0`). [Hash] agrees with equality.
#[derive(Clone, Debug)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreReleaseKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

fn parse_number(s: &str, original: &str) -> Result<u64> {
    u64::from_str(s).map_err(|_| EggError::InvalidVersion(original.to_string()))
}

fn optional_number(caps: &Captures, name: &str, original: &str) -> Result<u64> {
    match caps.name(name) {
        Some(m) => parse_number(m.as_str(), original),
        None => Ok(0),
    }
}

/// Parse a version string.
pub fn parse_version(s: &str) -> Result<Version> {
    Version::parse(s)
}

impl Version {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_VERSION
            .captures(s)
            .ok_or_else(|| EggError::InvalidVersion(s.to_string()))?;

        let epoch = optional_number(&caps, "epoch", s)?;

        let release = caps["release"]
            .split('.')
            .map(|part| parse_number(part, s))
            .collect::<Result<Vec<_>>>()?;

        let pre = if let Some(label) = caps.name("pre_l") {
            let kind = match label.as_str().to_lowercase().as_str() {
                "a" | "alpha" => PreReleaseKind::Alpha,
                "b" | "beta" => PreReleaseKind::Beta,
                _ => PreReleaseKind::ReleaseCandidate,
            };

            Some((kind, optional_number(&caps, "pre_n", s)?))
        } else {
            None
        };

        let post = if caps.name("post").is_some() {
            Some(match (caps.name("post_n1"), caps.name("post_n2")) {
                (Some(n), _) | (None, Some(n)) => parse_number(n.as_str(), s)?,
                (None, None) => 0,
            })
        } else {
            None
        };

        let dev = if caps.name("dev").is_some() {
            Some(optional_number(&caps, "dev_n", s)?)
        } else {
            None
        };

        let local = if let Some(local) = caps.name("local") {
            local
                .as_str()
                .split(|c| matches!(c, '-' | '_' | '.'))
                .map(|segment| {
                    if segment.chars().all(|c| c.is_ascii_digit()) {
                        parse_number(segment, s).map(LocalSegment::Number)
                    } else {
                        Ok(LocalSegment::Text(segment.to_lowercase()))
                    }
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![]
        };

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The release segment, as written.
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<(PreReleaseKind, u64)> {
        self.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// Whether this is a pre-release or a development release.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// Whether a local version label is present.
    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// The version with the local label removed.
    pub fn public(&self) -> Self {
        Self {
            local: vec![],
            ..self.clone()
        }
    }

    /// The epoch and release segment only.
    pub fn base(&self) -> Self {
        Self {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: vec![],
        }
    }

    /// Release segment with trailing zeros removed.
    fn release_trimmed(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|x| *x != 0)
            .map(|pos| pos + 1)
            .unwrap_or(0);

        &self.release[0..end]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            (None, _, _) => PreKey::Final,
        }
    }

    fn dev_key(&self) -> (bool, u64) {
        // No dev component sorts after any dev component.
        (self.dev.is_none(), self.dev.unwrap_or(0))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }

        write!(
            f,
            "{}",
            self.release
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(".")
        )?;

        if let Some((kind, n)) = &self.pre {
            write!(f, "{}{}", kind, n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if !self.local.is_empty() {
            write!(
                f,
                "+{}",
                self.local
                    .iter()
                    .map(|x| x.to_string())
                    .collect::<Vec<_>>()
                    .join(".")
            )?;
        }

        Ok(())
    }
}

impl FromStr for Version {
    type Err = EggError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialOrd<Self> for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Epoch, then release, then pre/post/dev, then local. Each component
        // has its own rules for how an absent value sorts.
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.release_trimmed().cmp(other.release_trimmed()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.release_trimmed().hash(state);
        self.pre_key().hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn parse() -> Result<()> {
        let version = Version::parse("1!2.3.4rc5.post6.dev7+ubuntu.1")?;
        assert_eq!(version.epoch(), 1);
        assert_eq!(version.release(), &[2, 3, 4]);
        assert_eq!(version.pre(), Some((PreReleaseKind::ReleaseCandidate, 5)));
        assert_eq!(version.post(), Some(6));
        assert_eq!(version.dev(), Some(7));
        assert_eq!(
            version.local(),
            &[
                LocalSegment::Text("ubuntu".into()),
                LocalSegment::Number(1)
            ]
        );

        Ok(())
    }

    #[test]
    fn normalized_display() {
        assert_eq!(v("1.0").to_string(), "1.0");
        assert_eq!(v("v1.0").to_string(), "1.0");
        assert_eq!(v("1.0-ALPHA1").to_string(), "1.0a1");
        assert_eq!(v("1.0.beta").to_string(), "1.0b0");
        assert_eq!(v("1.0c2").to_string(), "1.0rc2");
        assert_eq!(v("1.0-preview3").to_string(), "1.0rc3");
        assert_eq!(v("1.0-1").to_string(), "1.0.post1");
        assert_eq!(v("1.0_rev2").to_string(), "1.0.post2");
        assert_eq!(v("1.0.post").to_string(), "1.0.post0");
        assert_eq!(v("1.0-dev").to_string(), "1.0.dev0");
        assert_eq!(v("0!1.0").to_string(), "1.0");
        assert_eq!(v("1.0+Ubuntu-1").to_string(), "1.0+ubuntu.1");
        assert_eq!(v(" 19.10b0 ").to_string(), "19.10b0");
    }

    #[test]
    fn parse_invalid() {
        for s in [
            "",
            "foo",
            "1.0.",
            "1..0",
            "1.0+",
            "1.0-foo",
            "french toast",
            "1.0 beta",
            // Components beyond u64.
            "1.0.99999999999999999999",
            "99999999999999999999!1.0",
        ] {
            assert!(
                matches!(Version::parse(s), Err(EggError::InvalidVersion(_))),
                "{} should not parse",
                s
            );
        }
    }

    #[test]
    fn compare() {
        let ordered = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0rc1.dev456",
            "1.0rc1",
            "1.0",
            "1.0+abc.5",
            "1.0+abc.7",
            "1.0+5",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
            "1.1",
            "2.0",
            "1!0.1",
        ];

        for window in ordered.windows(2) {
            assert!(
                v(window[0]) < v(window[1]),
                "{} < {}",
                window[0],
                window[1]
            );
            assert!(v(window[1]) > v(window[0]));
        }
    }

    #[test]
    fn trailing_zeros_are_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0.0"));
        assert_eq!(v("1.0").cmp(&v("1.0.0")), Ordering::Equal);
        assert_ne!(v("1.0"), v("1.0.1"));

        let mut set = std::collections::HashSet::new();
        set.insert(v("1.0"));
        assert!(set.contains(&v("1.0.0")));
    }

    #[test]
    fn prerelease_predicates() {
        assert!(v("1.0a1").is_prerelease());
        assert!(v("1.0.dev1").is_prerelease());
        assert!(!v("1.0.post1").is_prerelease());
        assert!(v("1.0.post1").is_postrelease());
        assert!(v("1.0+local").is_local());
        assert_eq!(v("1.0rc1.post2+abc").base(), v("1.0"));
        assert_eq!(v("1.0+abc").public(), v("1.0"));
    }
}
