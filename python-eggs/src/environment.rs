// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! In-memory index of distributions.

An [Environment] maps normalized project names to the distributions found for
them, best candidate first. Instances are owned by the caller and built
explicitly, typically by scanning a directory with [Environment::scan].
*/

use {
    crate::{
        distribution::Distribution,
        filesystem_scanning::find_distributions,
        name::{normalize, NormalizedName},
        requirement::Requirement,
    },
    log::debug,
    std::{cmp::Ordering, collections::HashMap, path::Path},
};

/// Ordering of distributions sharing a name: best first.
fn compare_distributions(a: &Distribution, b: &Distribution) -> Ordering {
    b.version()
        .cmp(a.version())
        .then_with(|| b.precedence().cmp(&a.precedence()))
        .then_with(|| a.location().cmp(b.location()))
}

/// An index of distributions keyed by normalized project name.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// Required Python version tag. Distributions with a different tag are rejected.
    python: Option<String>,

    /// Required platform tag. Distributions with a different tag are rejected.
    platform: Option<String>,

    /// Map of normalized name to distributions, best first.
    distributions: HashMap<NormalizedName, Vec<Distribution>>,
}

impl Environment {
    /// Construct an empty instance with optional compatibility filters.
    pub fn new(python: Option<String>, platform: Option<String>) -> Self {
        Self {
            python,
            platform,
            distributions: HashMap::new(),
        }
    }

    /// Construct an instance holding the valid distributions found in `path`.
    pub fn from_path(path: &Path, python: Option<String>, platform: Option<String>) -> Self {
        let mut env = Self::new(python, platform);
        env.scan(path);

        env
    }

    /// Whether a distribution is compatible with this environment.
    ///
    /// Distributions without a Python version or platform tag are compatible
    /// with everything.
    pub fn can_add(&self, dist: &Distribution) -> bool {
        let python_ok = match (&self.python, dist.py_version()) {
            (Some(wanted), Some(have)) => wanted == have,
            _ => true,
        };

        let platform_ok = match (&self.platform, dist.platform()) {
            (Some(wanted), Some(have)) => wanted == have,
            _ => true,
        };

        python_ok && platform_ok
    }

    /// Add a distribution.
    ///
    /// A distribution with the same name and version as an existing entry
    /// replaces it. Returns false, leaving the index unchanged, if the
    /// distribution is not compatible.
    pub fn insert(&mut self, dist: Distribution) -> bool {
        if !self.can_add(&dist) {
            debug!("{} is not compatible with environment", dist);
            return false;
        }

        let entries = self.distributions.entry(dist.key().clone()).or_default();

        entries.retain(|existing| existing.version() != dist.version());
        entries.push(dist);
        entries.sort_by(compare_distributions);

        true
    }

    /// Insert every valid distribution found in `path`.
    ///
    /// Returns the number of distributions added.
    pub fn scan(&mut self, path: &Path) -> usize {
        let mut count = 0;

        for dist in find_distributions(path) {
            if self.insert(dist) {
                count += 1;
            }
        }

        debug!("found {} distributions in {}", count, path.display());

        count
    }

    /// Remove a distribution with the same content identity.
    pub fn remove(&mut self, dist: &Distribution) -> bool {
        let identity = dist.content_identity();

        let removed = match self.distributions.get_mut(dist.key()) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|d| d.content_identity() != identity);
                entries.len() != before
            }
            None => false,
        };

        if matches!(self.distributions.get(dist.key()), Some(entries) if entries.is_empty()) {
            self.distributions.remove(dist.key());
        }

        removed
    }

    /// Distributions for a project, best first.
    ///
    /// `name` need not be normalized.
    pub fn get(&self, name: &str) -> &[Distribution] {
        self.distributions
            .get(normalize(name).as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The best distribution satisfying a requirement.
    ///
    /// Requirements with a direct URL never match.
    pub fn best_match(&self, requirement: &Requirement) -> Option<&Distribution> {
        if requirement.url.is_some() {
            return None;
        }

        self.distributions
            .get(requirement.key())?
            .iter()
            .find(|dist| requirement.contains(dist))
    }

    /// Normalized names of all indexed projects, sorted.
    pub fn project_names(&self) -> Vec<&NormalizedName> {
        let mut names = self.distributions.keys().collect::<Vec<_>>();
        names.sort();

        names
    }

    /// All distributions, by project name and then best first.
    pub fn iter(&self) -> impl Iterator<Item = &Distribution> {
        self.project_names()
            .into_iter()
            .flat_map(move |name| self.distributions[name].iter())
    }

    /// Total number of indexed distributions.
    pub fn len(&self) -> usize {
        self.distributions.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            distribution::{DistributionKind, PathMetadata, Precedence},
            error::{EggError, Result},
            filesystem_scanning::distribution_from_path,
            name::PackageName,
            testutil::*,
            version::Version,
        },
        std::sync::Arc,
    };

    fn record(name: &str, version: &str, location: &str) -> Result<Distribution> {
        Ok(Distribution::new(
            PackageName::new(name)?,
            Version::parse(version)?,
            location,
            DistributionKind::UnpackedEgg,
            Precedence::Egg,
            Arc::new(PathMetadata::new(location)),
        ))
    }

    fn versions(env: &Environment, name: &str) -> Vec<String> {
        env.get(name).iter().map(|d| d.version().to_string()).collect()
    }

    #[test]
    fn best_match_prefers_highest_version() -> Result<()> {
        let mut env = Environment::default();
        assert!(env.insert(record("widget", "1.0", "/eggs/widget-1.0.egg")?));
        assert!(env.insert(record("widget", "2.0", "/eggs/widget-2.0.egg")?));
        assert!(env.insert(record("widget", "1.5", "/eggs/widget-1.5.egg")?));

        assert_eq!(versions(&env, "Widget"), vec!["2.0", "1.5", "1.0"]);

        let best = env.best_match(&Requirement::parse("widget")?);
        assert_eq!(best.map(|d| d.version().to_string()), Some("2.0".into()));

        Ok(())
    }

    #[test]
    fn best_match_honors_constraints() -> Result<()> {
        let mut env = Environment::default();
        env.insert(record("widget", "1.0", "/eggs/widget-1.0.egg")?);
        env.insert(record("widget", "2.0", "/eggs/widget-2.0.egg")?);

        let best = env.best_match(&Requirement::parse("widget==1.0")?);
        assert_eq!(best.map(|d| d.version().to_string()), Some("1.0".into()));

        let best = env.best_match(&Requirement::parse("widget<1.5")?);
        assert_eq!(best.map(|d| d.version().to_string()), Some("1.0".into()));

        assert!(env.best_match(&Requirement::parse("widget>=3")?).is_none());
        assert!(env.best_match(&Requirement::parse("gadget")?).is_none());

        Ok(())
    }

    #[test]
    fn best_match_url_requirement() -> Result<()> {
        let mut env = Environment::default();
        env.insert(record("widget", "1.0", "/eggs/widget-1.0.egg")?);

        let req = Requirement::parse("widget @ https://example.com/widget-1.0-py3-none-any.whl")?;
        assert!(env.best_match(&req).is_none());

        Ok(())
    }

    #[test]
    fn names_are_normalized() -> Result<()> {
        let mut env = Environment::default();
        env.insert(record("Foo.Bar", "1.0", "/eggs/Foo.Bar-1.0.egg")?);

        assert_eq!(env.get("foo_bar").len(), 1);
        assert!(env.best_match(&Requirement::parse("FOO-bar")?).is_some());
        assert_eq!(
            env.project_names()
                .iter()
                .map(|n| n.as_str())
                .collect::<Vec<_>>(),
            vec!["foo-bar"]
        );

        Ok(())
    }

    #[test]
    fn same_version_last_write_wins() -> Result<()> {
        let mut env = Environment::default();
        env.insert(record("widget", "1.0", "/first/widget-1.0.egg")?);
        env.insert(record("widget", "1.0.0", "/second/widget-1.0.egg")?);
        env.insert(record("widget", "2.0", "/first/widget-2.0.egg")?);

        assert_eq!(env.len(), 2);
        assert_eq!(
            env.get("widget")[1].location(),
            Path::new("/second/widget-1.0.egg")
        );

        Ok(())
    }

    #[test]
    fn compatibility_filters() -> Result<()> {
        let mut env = Environment::new(Some("3.9".into()), Some("linux_x86_64".into()));

        let untagged = record("widget", "1.0", "/eggs/widget-1.0.egg")?;
        let matching = record("widget", "2.0", "/eggs/widget-2.0-py3.9.egg")?
            .with_py_version(Some("3.9".into()));
        let wrong_python = record("widget", "3.0", "/eggs/widget-3.0-py2.7.egg")?
            .with_py_version(Some("2.7".into()));
        let wrong_platform = record("widget", "4.0", "/eggs/widget-4.0-py3.9-win32.egg")?
            .with_py_version(Some("3.9".into()))
            .with_platform(Some("win32".into()));

        assert!(env.can_add(&untagged));
        assert!(env.can_add(&matching));
        assert!(!env.can_add(&wrong_python));
        assert!(!env.can_add(&wrong_platform));

        assert!(env.insert(untagged));
        assert!(env.insert(matching));
        assert!(!env.insert(wrong_python));
        assert!(!env.insert(wrong_platform));
        assert_eq!(versions(&env, "widget"), vec!["2.0", "1.0"]);

        Ok(())
    }

    #[test]
    fn remove() -> Result<()> {
        let mut env = Environment::default();
        let dist = record("widget", "1.0", "/eggs/widget-1.0.egg")?;
        env.insert(dist.clone());

        assert!(env.remove(&dist));
        assert!(!env.remove(&dist));
        assert!(env.is_empty());
        assert!(env.project_names().is_empty());

        Ok(())
    }

    #[test]
    fn scan_directory() -> Result<()> {
        let td = tempdir()?;
        write_unpacked_egg(td.path(), "widget", "1.0", &[])?;
        write_unpacked_egg(td.path(), "widget", "2.0", &[])?;
        write_zipped_egg(td.path(), "gadget", "0.5", &[])?;
        std::fs::create_dir(td.path().join("not.an.egg"))?;

        let env = Environment::from_path(td.path(), None, None);
        assert_eq!(env.len(), 3);
        assert_eq!(versions(&env, "widget"), vec!["2.0", "1.0"]);
        assert_eq!(
            env.iter().map(|d| d.key().to_string()).collect::<Vec<_>>(),
            vec!["gadget", "widget", "widget"]
        );

        // Scanning again yields the same records.
        let again = Environment::from_path(td.path(), None, None);
        assert_eq!(
            env.iter().map(|d| d.content_identity()).collect::<Vec<_>>(),
            again.iter().map(|d| d.content_identity()).collect::<Vec<_>>()
        );

        let installed = distribution_from_path(&td.path().join("widget-2.0.egg"))?
            .ok_or_else(|| EggError::MetadataNotFound("widget-2.0.egg".into()))?;
        let best = env
            .best_match(&Requirement::parse("widget")?)
            .ok_or_else(|| EggError::MetadataNotFound("widget".into()))?;
        assert_eq!(best.location(), installed.location());

        Ok(())
    }
}
