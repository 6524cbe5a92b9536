// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Requirement expressions.

A requirement names a project plus either version constraints or a direct
reference URL, optionally with extras and an environment marker. The syntax
is the subset of [PEP 508](https://peps.python.org/pep-0508/) used by build
requirements and `Requires-Dist` metadata:

```text
name[extra1,extra2] >=1.0,<2 ; python_version >= "3.7"
name (>=1.0)
name[extra] @ https://example.com/name-1.0-py3-none-any.whl
```

Environment markers are kept as raw text. Deciding whether a marker applies
is delegated to a [MarkerEvaluator].
*/

use {
    crate::{
        distribution::Distribution,
        error::{EggError, Result},
        name::{safe_extra, NormalizedName, PackageName},
        specifier::{parse_constraints, VersionConstraint},
        version::Version,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        collections::BTreeSet,
        fmt::{Display, Formatter},
        str::FromStr,
    },
    url::Url,
};

/// Regular expression to parse requirement expressions.
static RE_REQUIREMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^\s*
        (?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)
        \s*
        # Optional extras within [..].
        (?:\[(?P<extras>[^\]]*)\])?
        \s*
        (?:
            # Direct reference.
            @\s*(?P<url>[^\s;]+)
            |
            # Constraints, optionally within (..).
            \((?P<paren_constraints>[^;()]*)\)
            |
            (?P<constraints>[^;()@]*)
        )
        \s*
        (?:;\s*(?P<marker>\S.*?))?
        \s*$
        "#,
    )
    .unwrap()
});

/// Finds `extra == "name"` clauses within a marker expression.
static RE_EXTRA_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        \bextra\s*==\s*['"](?P<a>[^'"]*)['"]
        |
        ['"](?P<b>[^'"]*)['"]\s*==\s*extra\b
        "#,
    )
    .unwrap()
});

/// Decides whether an environment marker applies.
///
/// `extra` is the extra being evaluated, if any.
pub trait MarkerEvaluator {
    fn evaluate(&self, marker: &str, extra: Option<&str>) -> bool;
}

impl<F> MarkerEvaluator for F
where
    F: Fn(&str, Option<&str>) -> bool,
{
    fn evaluate(&self, marker: &str, extra: Option<&str>) -> bool {
        self(marker, extra)
    }
}

/// A marker evaluator that only understands `extra` clauses.
///
/// A marker mentioning extras applies when it names the extra being
/// evaluated. Any other marker is assumed to apply.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtraMarkerEvaluator;

impl MarkerEvaluator for ExtraMarkerEvaluator {
    fn evaluate(&self, marker: &str, extra: Option<&str>) -> bool {
        let named = RE_EXTRA_CLAUSE
            .captures_iter(marker)
            .filter_map(|caps| caps.name("a").or_else(|| caps.name("b")))
            .map(|m| safe_extra(m.as_str()))
            .collect::<Vec<_>>();

        if named.is_empty() {
            true
        } else if let Some(extra) = extra {
            let extra = safe_extra(extra);
            named.iter().any(|x| x == &extra)
        } else {
            false
        }
    }
}

/// A parsed requirement expression.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Requirement {
    pub name: PackageName,
    /// Requested extras, normalized and sorted.
    pub extras: Vec<String>,
    /// Version constraints, sorted by their string form.
    pub constraints: Vec<VersionConstraint>,
    /// Direct reference. When present, constraints are empty.
    pub url: Option<Url>,
    /// Raw environment marker text.
    pub marker: Option<String>,
}

impl Requirement {
    /// Parse a requirement expression.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_REQUIREMENT
            .captures(s)
            .ok_or_else(|| EggError::RequirementParse(s.to_string()))?;

        let name = PackageName::new(&caps["name"])?;

        let extras = caps
            .name("extras")
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|x| x.trim())
                    .filter(|x| !x.is_empty())
                    .map(safe_extra)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let url = caps.name("url").map(|m| Url::parse(m.as_str())).transpose()?;

        let constraints_text = caps
            .name("paren_constraints")
            .or_else(|| caps.name("constraints"))
            .map(|m| m.as_str())
            .unwrap_or("");

        let mut constraints = parse_constraints(constraints_text)
            .map_err(|_| EggError::RequirementParse(s.to_string()))?;
        constraints.sort_by_key(|c| c.to_string());
        constraints.dedup();

        let marker = caps.name("marker").map(|m| m.as_str().to_string());

        Ok(Self {
            name,
            extras,
            constraints,
            url,
            marker,
        })
    }

    /// The normalized project name this requirement targets.
    pub fn key(&self) -> &NormalizedName {
        self.name.key()
    }

    /// Whether a version satisfies every constraint.
    ///
    /// Always false for direct reference requirements: those are resolved by
    /// fetching the URL, never by searching.
    pub fn contains_version(&self, version: &Version) -> bool {
        self.url.is_none() && self.constraints.iter().all(|c| c.contains(version))
    }

    /// Whether a distribution satisfies this requirement.
    pub fn contains(&self, dist: &Distribution) -> bool {
        dist.key() == self.key() && self.contains_version(dist.version())
    }

    /// Whether the environment marker, if any, applies.
    pub fn applies(&self, evaluator: &dyn MarkerEvaluator) -> bool {
        match &self.marker {
            Some(marker) => evaluator.evaluate(marker, None),
            None => true,
        }
    }

    /// This requirement with its environment marker removed.
    pub fn without_marker(&self) -> Self {
        Self {
            marker: None,
            ..self.clone()
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;

        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }

        if let Some(url) = &self.url {
            write!(f, " @ {}", url)?;
        } else {
            write!(
                f,
                "{}",
                self.constraints
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            )?;
        }

        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }

        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = EggError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
