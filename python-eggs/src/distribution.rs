// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Located distributions and access to their metadata.

A [Distribution] is an immutable record of a project name, version and
filesystem location, plus a [MetadataProvider] able to read the metadata
files that travel with the distribution (`PKG-INFO`, `requires.txt`, ...).

Metadata providers are scoped to their distribution: names that would
escape the metadata directory are refused.
*/

use {
    crate::{
        error::{EggError, Result},
        name::{safe_extra, safe_name, to_filename, NormalizedName, PackageName},
        package_metadata::PythonPackageMetadata,
        requirement::{MarkerEvaluator, Requirement},
        version::Version,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        collections::BTreeMap,
        fmt::{Debug, Display, Formatter},
        fs::File,
        io::Read,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Regular expression to parse egg file names (without the `.egg` suffix).
static RE_EGG_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?xi)
        ^
        (?P<name>[^-]+)
        (?:
            -(?P<version>[^-]+)
            (?:
                -py(?P<pyver>[^-]+)
                (?:-(?P<platform>.+))?
            )?
        )?
        $
        "#,
    )
    .unwrap()
});

/// Components of an egg file name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EggFilename {
    pub name: String,
    pub version: Option<String>,
    pub py_version: Option<String>,
    pub platform: Option<String>,
}

impl EggFilename {
    /// Parse an egg file name without its extension.
    ///
    /// e.g. `zope.interface-5.4.0-py3.9-linux-x86_64`.
    pub fn parse(stem: &str) -> Option<Self> {
        let caps = RE_EGG_NAME.captures(stem)?;

        Some(Self {
            name: caps["name"].to_string(),
            version: caps.name("version").map(|m| m.as_str().to_string()),
            py_version: caps.name("pyver").map(|m| m.as_str().to_string()),
            platform: caps.name("platform").map(|m| m.as_str().to_string()),
        })
    }
}

/// Ranks distributions sharing a name and version.
///
/// Higher values are preferred.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Precedence {
    Develop = -1,
    Checkout = 0,
    Source = 1,
    Binary = 2,
    Egg = 3,
}

/// The on-disk shape a distribution was found in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DistributionKind {
    /// `*.egg` directory with an `EGG-INFO` subdirectory.
    UnpackedEgg,
    /// `*.egg` zip archive.
    ZippedEgg,
    /// `*.egg-info` directory or file next to importable code.
    EggInfo,
    /// `*.dist-info` directory next to importable code.
    DistInfo,
}

impl DistributionKind {
    /// Name of the file holding core metadata.
    pub fn metadata_file(&self) -> &'static str {
        match self {
            Self::DistInfo => "METADATA",
            _ => "PKG-INFO",
        }
    }
}

/// Reads metadata files belonging to a single distribution.
///
/// Names are `/` delimited paths relative to the metadata directory.
pub trait MetadataProvider: Debug + Send + Sync {
    /// Whether a metadata file exists.
    fn has_metadata(&self, name: &str) -> bool;

    /// Obtain the content of a metadata file.
    fn get_metadata(&self, name: &str) -> Result<Vec<u8>>;

    /// List the entries of a metadata subdirectory. `""` lists the root.
    fn metadata_listdir(&self, name: &str) -> Result<Vec<String>>;

    /// Non-blank, non-comment lines of a metadata file, trimmed.
    fn get_metadata_lines(&self, name: &str) -> Result<Vec<String>> {
        let data = self.get_metadata(name)?;

        Ok(String::from_utf8_lossy(&data)
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_string())
            .collect::<Vec<_>>())
    }
}

/// Refuse metadata names that could escape the metadata directory.
fn check_metadata_name(name: &str) -> Result<()> {
    if name.starts_with('/')
        || name.starts_with('\\')
        || Path::new(name).is_absolute()
        || name.split(|c: char| c == '/' || c == '\\').any(|part| part == "..")
    {
        Err(EggError::MetadataPathIllegal(name.to_string()))
    } else {
        Ok(())
    }
}

/// Metadata stored in a filesystem directory (`EGG-INFO`, `*.egg-info`, `*.dist-info`).
#[derive(Clone, Debug)]
pub struct PathMetadata {
    path: PathBuf,
}

impl PathMetadata {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        check_metadata_name(name)?;

        Ok(if name.is_empty() {
            self.path.clone()
        } else {
            self.path.join(name)
        })
    }
}

impl MetadataProvider for PathMetadata {
    fn has_metadata(&self, name: &str) -> bool {
        matches!(self.resolve(name), Ok(path) if path.is_file())
    }

    fn get_metadata(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;

        if !path.is_file() {
            return Err(EggError::MetadataNotFound(name.to_string()));
        }

        std::fs::read(&path).map_err(|e| EggError::io_path(path, e))
    }

    fn metadata_listdir(&self, name: &str) -> Result<Vec<String>> {
        let path = self.resolve(name)?;

        if !path.is_dir() {
            return Ok(vec![]);
        }

        let mut entries = std::fs::read_dir(&path)
            .map_err(|e| EggError::io_path(&path, e))?
            .map(|entry| -> Result<String> {
                Ok(entry?.file_name().to_string_lossy().to_string())
            })
            .collect::<Result<Vec<_>>>()?;
        entries.sort();

        Ok(entries)
    }
}

/// Metadata consisting of a single `PKG-INFO` file (a `*.egg-info` file).
#[derive(Clone, Debug)]
pub struct FileMetadata {
    path: PathBuf,
}

impl FileMetadata {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetadataProvider for FileMetadata {
    fn has_metadata(&self, name: &str) -> bool {
        name == "PKG-INFO" && self.path.is_file()
    }

    fn get_metadata(&self, name: &str) -> Result<Vec<u8>> {
        check_metadata_name(name)?;

        if name != "PKG-INFO" {
            return Err(EggError::MetadataNotFound(name.to_string()));
        }

        std::fs::read(&self.path).map_err(|e| EggError::io_path(&self.path, e))
    }

    fn metadata_listdir(&self, name: &str) -> Result<Vec<String>> {
        check_metadata_name(name)?;

        Ok(vec![])
    }
}

/// Metadata stored under a directory prefix within a zip archive.
#[derive(Clone, Debug)]
pub struct ZipMetadata {
    archive: PathBuf,
    prefix: String,
}

impl ZipMetadata {
    /// Construct an instance reading `prefix/` entries of the zip file at `archive`.
    pub fn new(archive: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            archive: archive.into(),
            prefix: format!("{}/", prefix.trim_end_matches('/')),
        }
    }

    fn open(&self) -> Result<zip::ZipArchive<File>> {
        let fh = File::open(&self.archive).map_err(|e| EggError::io_path(&self.archive, e))?;

        Ok(zip::ZipArchive::new(fh)?)
    }
}

impl MetadataProvider for ZipMetadata {
    fn has_metadata(&self, name: &str) -> bool {
        if check_metadata_name(name).is_err() {
            return false;
        }

        let mut zf = match self.open() {
            Ok(zf) => zf,
            Err(_) => return false,
        };

        let found = matches!(zf.by_name(&format!("{}{}", self.prefix, name)), Ok(f) if f.is_file());

        found
    }

    fn get_metadata(&self, name: &str) -> Result<Vec<u8>> {
        check_metadata_name(name)?;

        let mut zf = self.open()?;
        let mut entry = zf
            .by_name(&format!("{}{}", self.prefix, name))
            .map_err(|_| EggError::MetadataNotFound(name.to_string()))?;

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;

        Ok(data)
    }

    fn metadata_listdir(&self, name: &str) -> Result<Vec<String>> {
        check_metadata_name(name)?;

        let dir = if name.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}{}/", self.prefix, name.trim_end_matches('/'))
        };

        let zf = self.open()?;

        let mut entries = zf
            .file_names()
            .filter_map(|path| path.strip_prefix(&dir))
            .filter_map(|rest| rest.split('/').next())
            .filter(|child| !child.is_empty())
            .map(|child| child.to_string())
            .collect::<Vec<_>>();
        entries.sort();
        entries.dedup();

        Ok(entries)
    }
}

/// Identity of a distribution's content: normalized name, version and location.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ContentIdentity {
    pub key: NormalizedName,
    pub version: Version,
    pub location: PathBuf,
}

/// Requirements keyed by extra. The `None` key holds unconditional requirements.
pub type DependencyMap = BTreeMap<Option<String>, Vec<Requirement>>;

/// A located Python distribution.
#[derive(Clone, Debug)]
pub struct Distribution {
    name: PackageName,
    version: Version,
    location: PathBuf,
    py_version: Option<String>,
    platform: Option<String>,
    precedence: Precedence,
    kind: DistributionKind,
    metadata: Arc<dyn MetadataProvider>,
}

impl Distribution {
    pub fn new(
        name: PackageName,
        version: Version,
        location: impl Into<PathBuf>,
        kind: DistributionKind,
        precedence: Precedence,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self {
            name,
            version,
            location: location.into(),
            py_version: None,
            platform: None,
            precedence,
            kind,
            metadata,
        }
    }

    /// Construct an instance by reading name and version from its metadata provider.
    pub fn from_metadata(
        location: impl Into<PathBuf>,
        kind: DistributionKind,
        precedence: Precedence,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Result<Self> {
        let metadata_file = kind.metadata_file();
        let parsed = PythonPackageMetadata::from_metadata(&metadata.get_metadata(metadata_file)?)?;
        let (name, version) = parsed.identity(metadata_file)?;

        Ok(Self::new(
            PackageName::new(name)?,
            version,
            location,
            kind,
            precedence,
            metadata,
        ))
    }

    /// Set the Python version tag.
    #[must_use]
    pub fn with_py_version(mut self, py_version: Option<String>) -> Self {
        self.py_version = py_version;
        self
    }

    /// Set the platform tag.
    #[must_use]
    pub fn with_platform(mut self, platform: Option<String>) -> Self {
        self.platform = platform;
        self
    }

    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The normalized project name.
    pub fn key(&self) -> &NormalizedName {
        self.name.key()
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Filesystem location: the egg itself, or the directory holding the metadata.
    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn py_version(&self) -> Option<&str> {
        self.py_version.as_deref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    pub fn kind(&self) -> DistributionKind {
        self.kind
    }

    pub fn content_identity(&self) -> ContentIdentity {
        ContentIdentity {
            key: self.key().clone(),
            version: self.version.clone(),
            location: self.location.clone(),
        }
    }

    pub fn has_metadata(&self, name: &str) -> bool {
        self.metadata.has_metadata(name)
    }

    pub fn get_metadata(&self, name: &str) -> Result<Vec<u8>> {
        self.metadata.get_metadata(name)
    }

    pub fn get_metadata_lines(&self, name: &str) -> Result<Vec<String>> {
        self.metadata.get_metadata_lines(name)
    }

    pub fn metadata_listdir(&self, name: &str) -> Result<Vec<String>> {
        self.metadata.metadata_listdir(name)
    }

    /// Parse the core metadata file.
    pub fn package_metadata(&self) -> Result<PythonPackageMetadata> {
        PythonPackageMetadata::from_metadata(&self.get_metadata(self.kind.metadata_file())?)
    }

    /// The canonical egg file name for this distribution, without extension.
    pub fn egg_name(&self) -> String {
        let mut filename = format!(
            "{}-{}",
            to_filename(&safe_name(self.name.as_str())),
            to_filename(&self.version.to_string())
        );

        if let Some(py_version) = &self.py_version {
            filename.push_str(&format!("-py{}", py_version));
        }
        if let Some(platform) = &self.platform {
            filename.push_str(&format!("-{}", platform));
        }

        filename
    }

    /// Requirements declared by this distribution, keyed by extra.
    pub fn dependency_map(&self, evaluator: &dyn MarkerEvaluator) -> Result<DependencyMap> {
        if self.kind == DistributionKind::DistInfo {
            self.dist_info_dependency_map(evaluator)
        } else {
            self.egg_info_dependency_map(evaluator)
        }
    }

    fn egg_info_dependency_map(&self, evaluator: &dyn MarkerEvaluator) -> Result<DependencyMap> {
        let mut dm = DependencyMap::new();
        dm.insert(None, vec![]);

        if !self.has_metadata("requires.txt") {
            return Ok(dm);
        }

        let mut section: Option<String> = None;
        let mut section_applies = true;

        for line in self.get_metadata_lines("requires.txt")? {
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let (extra, marker) = match header.split_once(':') {
                    Some((extra, marker)) => (extra.trim(), Some(marker.trim())),
                    None => (header.trim(), None),
                };

                section = if extra.is_empty() {
                    None
                } else {
                    Some(safe_extra(extra))
                };
                section_applies = match marker {
                    Some(marker) if !marker.is_empty() => evaluator.evaluate(marker, None),
                    _ => true,
                };
                dm.entry(section.clone()).or_default();

                continue;
            }

            let requirement = Requirement::parse(&line)?;

            if section_applies {
                dm.entry(section.clone()).or_default().push(requirement);
            }
        }

        Ok(dm)
    }

    fn dist_info_dependency_map(&self, evaluator: &dyn MarkerEvaluator) -> Result<DependencyMap> {
        let metadata = self.package_metadata()?;

        let requirements = metadata
            .find_all_headers("Requires-Dist")
            .into_iter()
            .map(Requirement::parse)
            .collect::<Result<Vec<_>>>()?;

        let for_extra = |extra: Option<&str>| {
            requirements
                .iter()
                .filter(|req| match &req.marker {
                    Some(marker) => evaluator.evaluate(marker, extra),
                    None => true,
                })
                .map(|req| req.without_marker())
                .collect::<Vec<_>>()
        };

        let common = for_extra(None);

        let mut dm = DependencyMap::new();

        for extra in metadata.find_all_headers("Provides-Extra") {
            let extra = extra.trim();
            let reqs = for_extra(Some(extra))
                .into_iter()
                .filter(|req| !common.contains(req))
                .collect::<Vec<_>>();

            dm.insert(Some(safe_extra(extra)), reqs);
        }

        dm.insert(None, common);

        Ok(dm)
    }

    /// Requirements for this distribution plus the requested extras.
    pub fn requires(
        &self,
        extras: &[String],
        evaluator: &dyn MarkerEvaluator,
    ) -> Result<Vec<Requirement>> {
        let dm = self.dependency_map(evaluator)?;

        let mut deps = dm.get(&None).cloned().unwrap_or_default();

        for extra in extras {
            let reqs = dm.get(&Some(safe_extra(extra))).ok_or_else(|| {
                EggError::UnknownExtra(self.name.to_string(), extra.to_string())
            })?;

            deps.extend(reqs.iter().cloned());
        }

        Ok(deps)
    }
}

impl Display for Distribution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.location.display())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{requirement::ExtraMarkerEvaluator, testutil::*},
    };

    #[test]
    fn egg_filename() {
        assert_eq!(
            EggFilename::parse("zope.interface-5.4.0-py3.9-linux-x86_64"),
            Some(EggFilename {
                name: "zope.interface".into(),
                version: Some("5.4.0".into()),
                py_version: Some("3.9".into()),
                platform: Some("linux-x86_64".into()),
            })
        );
        assert_eq!(
            EggFilename::parse("widget-1.0"),
            Some(EggFilename {
                name: "widget".into(),
                version: Some("1.0".into()),
                py_version: None,
                platform: None,
            })
        );
        assert_eq!(EggFilename::parse(""), None);
    }

    #[test]
    fn metadata_names_are_scoped() -> Result<()> {
        let td = tempdir()?;
        let egg = write_unpacked_egg(td.path(), "widget", "1.0", &[])?;
        let provider = PathMetadata::new(egg.join("EGG-INFO"));

        assert!(provider.has_metadata("PKG-INFO"));
        assert!(!provider.has_metadata("../EGG-INFO/PKG-INFO"));
        assert!(matches!(
            provider.get_metadata("../../etc/passwd"),
            Err(EggError::MetadataPathIllegal(_))
        ));
        assert!(matches!(
            provider.get_metadata("/etc/passwd"),
            Err(EggError::MetadataPathIllegal(_))
        ));
        assert!(matches!(
            provider.get_metadata("missing.txt"),
            Err(EggError::MetadataNotFound(_))
        ));
        assert_eq!(provider.metadata_listdir("")?, vec!["PKG-INFO".to_string()]);

        Ok(())
    }

    #[test]
    fn zip_metadata() -> Result<()> {
        let td = tempdir()?;
        let egg = write_zipped_egg(td.path(), "widget", "1.0", &[("requires.txt", "six\n")])?;
        let provider = ZipMetadata::new(&egg, "EGG-INFO");

        assert!(provider.has_metadata("PKG-INFO"));
        assert!(provider.has_metadata("requires.txt"));
        assert!(!provider.has_metadata("missing"));
        assert_eq!(provider.get_metadata_lines("requires.txt")?, vec!["six"]);
        assert_eq!(
            provider.metadata_listdir("")?,
            vec!["PKG-INFO".to_string(), "requires.txt".to_string()]
        );

        Ok(())
    }

    #[test]
    fn egg_name() -> Result<()> {
        let td = tempdir()?;
        let egg = write_unpacked_egg(td.path(), "my-package", "1.0", &[])?;
        let dist = Distribution::from_metadata(
            &egg,
            DistributionKind::UnpackedEgg,
            Precedence::Egg,
            Arc::new(PathMetadata::new(egg.join("EGG-INFO"))),
        )?;

        assert_eq!(dist.name().as_str(), "my-package");
        assert_eq!(dist.egg_name(), "my_package-1.0");

        let dist = dist
            .with_py_version(Some("3.9".into()))
            .with_platform(Some("linux-x86_64".into()));
        assert_eq!(dist.egg_name(), "my_package-1.0-py3.9-linux-x86_64");

        Ok(())
    }

    #[test]
    fn egg_info_dependencies() -> Result<()> {
        let td = tempdir()?;
        let egg = write_unpacked_egg(
            td.path(),
            "widget",
            "1.0",
            &[(
                "requires.txt",
                "six>=1.0\n\n[Security]\ncryptography\n\n[:sys_platform == \"win32\"]\npywin32\n\n[tests:os_name == \"never\"]\npytest\n",
            )],
        )?;
        let dist = Distribution::from_metadata(
            &egg,
            DistributionKind::UnpackedEgg,
            Precedence::Egg,
            Arc::new(PathMetadata::new(egg.join("EGG-INFO"))),
        )?;

        let only_win32 = |marker: &str, _: Option<&str>| marker.contains("win32");
        let dm = dist.dependency_map(&only_win32)?;

        assert_eq!(
            dm.get(&None)
                .map(|reqs| reqs.iter().map(|r| r.to_string()).collect::<Vec<_>>()),
            Some(vec!["six>=1.0".to_string(), "pywin32".to_string()])
        );
        assert_eq!(dm.get(&Some("security".into())).map(|r| r.len()), Some(1));
        assert_eq!(dm.get(&Some("tests".into())).map(|r| r.len()), Some(0));

        let reqs = dist.requires(&["security".to_string()], &only_win32)?;
        assert_eq!(reqs.len(), 3);

        assert!(matches!(
            dist.requires(&["docs".to_string()], &only_win32),
            Err(EggError::UnknownExtra(_, _))
        ));

        Ok(())
    }

    #[test]
    fn dist_info_dependencies() -> Result<()> {
        let td = tempdir()?;
        let dist_info = write_dist_info(
            td.path(),
            "widget",
            "2.0",
            &[
                "Requires-Dist: six",
                "Requires-Dist: pytest ; extra == 'tests'",
                "Provides-Extra: tests",
            ],
        )?;
        let dist = Distribution::from_metadata(
            td.path(),
            DistributionKind::DistInfo,
            Precedence::Develop,
            Arc::new(PathMetadata::new(dist_info)),
        )?;

        let dm = dist.dependency_map(&ExtraMarkerEvaluator)?;
        assert_eq!(dm.get(&None).map(|r| r.len()), Some(1));
        assert_eq!(
            dm.get(&Some("tests".into()))
                .map(|reqs| reqs.iter().map(|r| r.to_string()).collect::<Vec<_>>()),
            Some(vec!["pytest".to_string()])
        );

        Ok(())
    }
}
