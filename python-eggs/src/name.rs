// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Project name handling.

Two project names refer to the same project when their normalized forms are
equal. Normalization lowercases the name and collapses runs of `-`, `_` and `.`
into a single `-`.
*/

use {
    crate::error::{EggError, Result},
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        borrow::Borrow,
        fmt::{Display, Formatter},
        hash::{Hash, Hasher},
        str::FromStr,
    },
};

/// Valid project names per PEP 508.
static RE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-z0-9]|[a-z0-9][a-z0-9._-]*[a-z0-9])$").unwrap());

static RE_SAFE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9.]+").unwrap());

static RE_SAFE_EXTRA: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9.-]+").unwrap());

/// A normalized project name.
///
/// Instances can only be obtained through [normalize] or [PackageName::key], so
/// the contained string is always in normal form.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NormalizedName(String);

impl NormalizedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NormalizedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NormalizedName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Normalize a project name.
pub fn normalize(name: &str) -> NormalizedName {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;

    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
                in_separator = true;
            }
        } else {
            normalized.extend(c.to_lowercase());
            in_separator = false;
        }
    }

    NormalizedName(normalized)
}

/// Convert an arbitrary string to a standard distribution name.
///
/// Runs of characters other than alphanumerics and `.` become a single `-`.
pub fn safe_name(name: &str) -> String {
    RE_SAFE_NAME.replace_all(name, "-").to_string()
}

/// Convert an arbitrary string to a standard extra name.
pub fn safe_extra(extra: &str) -> String {
    RE_SAFE_EXTRA.replace_all(extra, "_").to_lowercase()
}

/// Escape a project name or version for use in a filename.
pub fn to_filename(name: &str) -> String {
    name.replace('-', "_")
}

/// The name of a Python project as written by its author.
///
/// Equality and hashing go through the normalized form, so `Foo.Bar` and
/// `foo-bar` are the same project.
#[derive(Clone, Debug)]
pub struct PackageName {
    name: String,
    key: NormalizedName,
}

impl PackageName {
    /// Construct an instance after validating the name.
    pub fn new(name: impl ToString) -> Result<Self> {
        let name = name.to_string();

        if !RE_NAME.is_match(&name) {
            return Err(EggError::InvalidName(name));
        }

        let key = normalize(&name);

        Ok(Self { name, key })
    }

    /// The name as originally written.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The normalized form of this name.
    pub fn key(&self) -> &NormalizedName {
        &self.key
    }
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PackageName {}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Display for PackageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for PackageName {
    type Err = EggError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
