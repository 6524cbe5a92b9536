// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interact with Python wheel files and convert them to eggs.

[WheelArchive::install_as_egg] materializes a wheel as an unpacked `.egg`
directory:

* the `.dist-info` directory becomes `EGG-INFO` and `METADATA` becomes `PKG-INFO`;
* `Requires-Dist` metadata is rewritten as `EGG-INFO/requires.txt`;
* `.data/scripts/` moves to `EGG-INFO/scripts/`;
* the remaining `.data/` locations are merged into the egg root.

Payload bytes are never modified.
*/

use {
    crate::{
        distribution::{Distribution, DistributionKind, PathMetadata, Precedence},
        error::{EggError, Result},
        name::{normalize, safe_name, to_filename},
        package_metadata::PythonPackageMetadata,
        requirement::{MarkerEvaluator, Requirement},
        version::Version,
        wheel_builder::WheelFile,
    },
    itertools::Itertools,
    log::debug,
    once_cell::sync::Lazy,
    std::{
        collections::BTreeMap,
        io::Read,
        path::{Path, PathBuf},
        sync::Arc,
    },
    zip::ZipArchive,
};

/// Regex for parsing wheel file names.
///
/// This is copied from the wheel.wheelfile Python module.
static RE_WHEEL_INFO: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^(?P<namever>(?P<name>.+?)-(?P<ver>.+?))(-(?P<build>\d[^-]*))?-(?P<pyver>.+?)-(?P<abi>.+?)-(?P<plat>.+?)\.whl$").unwrap()
});

const S_IXUSR: u32 = 64;

/// `__init__.py` content for namespace packages lacking one.
const NAMESPACE_PACKAGE_INIT: &str = "\
try:
    __import__('pkg_resources').declare_namespace(__name__)
except ImportError:
    __path__ = __import__('pkgutil').extend_path(__path__, __name__)
";

/// `.data/` locations whose content is merged into the egg root.
const MERGED_DATA_LOCATIONS: &[&str] = &["data", "headers", "purelib", "platlib"];

/// Components of a wheel file name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WheelFilename {
    pub name: String,
    pub version: String,
    pub build: Option<String>,
    pub python_tag: String,
    pub abi_tag: String,
    pub platform_tag: String,
}

impl WheelFilename {
    /// Parse a wheel file name, e.g. `black-19.10b0-py36-none-any.whl`.
    pub fn parse(basename: &str) -> Result<Self> {
        let captures = RE_WHEEL_INFO
            .captures(basename)
            .ok_or_else(|| EggError::WheelFilename(basename.to_string()))?;

        Ok(Self {
            name: captures["name"].to_string(),
            version: captures["ver"].to_string(),
            build: captures.name("build").map(|m| m.as_str().to_string()),
            python_tag: captures["pyver"].to_string(),
            abi_tag: captures["abi"].to_string(),
            platform_tag: captures["plat"].to_string(),
        })
    }

    fn name_version(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// Whether an archive member name could escape the extraction directory.
fn is_unsafe_member(name: &str) -> bool {
    name.starts_with('/')
        || name.contains('\\')
        || Path::new(name).is_absolute()
        || name.split('/').any(|part| part == "..")
}

/// Represents a Python wheel archive.
#[derive(Clone, Debug)]
pub struct WheelArchive {
    filename: WheelFilename,
    files: BTreeMap<String, WheelFile>,
}

impl WheelArchive {
    /// Construct an instance from a generic reader.
    ///
    /// `basename` is the filename of the wheel. It is used to locate the
    /// `.data` directory and to derive the egg name.
    pub fn from_reader<R>(reader: R, basename: &str) -> Result<Self>
    where
        R: std::io::Read + std::io::Seek,
    {
        let filename = WheelFilename::parse(basename)?;

        let mut archive = ZipArchive::new(reader)?;

        let mut files = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;

            if is_unsafe_member(file.name()) {
                return Err(EggError::ArchivePathIllegal(file.name().to_string()));
            }

            if file.is_dir() {
                continue;
            }

            let mut buffer = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buffer)?;

            files.insert(
                file.name().to_string(),
                WheelFile {
                    data: buffer,
                    executable: file.unix_mode().unwrap_or(0) & S_IXUSR != 0,
                },
            );
        }

        Ok(Self { filename, files })
    }

    /// Construct an instance from a filesystem path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let fh = std::fs::File::open(path).map_err(|e| EggError::io_path(path, e))?;

        let reader = std::io::BufReader::new(fh);
        let basename = path
            .file_name()
            .ok_or_else(|| EggError::WheelFilename(path.display().to_string()))?
            .to_string_lossy();

        Self::from_reader(reader, &basename)
    }

    pub fn filename(&self) -> &WheelFilename {
        &self.filename
    }

    /// Archive paths of all files in the wheel.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|k| k.as_str())
    }

    /// Locate the `.dist-info` directory.
    ///
    /// The directory name is matched against the project name in canonical
    /// form, since wheel producers disagree on its exact spelling.
    pub fn dist_info_path(&self) -> Result<String> {
        let wanted = format!("{}-", normalize(&self.filename.name));

        self.files
            .keys()
            .filter_map(|name| name.split_once('/').map(|(dir, _)| dir))
            .find(|dir| dir.ends_with(".dist-info") && normalize(dir).as_str().starts_with(&wanted))
            .map(|dir| dir.to_string())
            .ok_or_else(|| EggError::WheelDistInfoNotFound(self.filename.name_version()))
    }

    fn data_path(&self) -> String {
        format!("{}.data", self.filename.name_version())
    }

    fn dist_info_file(&self, name: &str) -> Result<PythonPackageMetadata> {
        let path = format!("{}/{}", self.dist_info_path()?, name);

        let file = self
            .files
            .get(&path)
            .ok_or(EggError::MetadataNotFound(path))?;

        PythonPackageMetadata::from_metadata(&file.data)
    }

    /// Obtain metadata about the wheel archive itself (the `WHEEL` file).
    pub fn archive_metadata(&self) -> Result<PythonPackageMetadata> {
        self.dist_info_file("WHEEL")
    }

    /// Obtain the `.dist-info/METADATA` content as a parsed object.
    pub fn metadata(&self) -> Result<PythonPackageMetadata> {
        self.dist_info_file("METADATA")
    }

    /// The `Wheel-Version` of the archive.
    pub fn wheel_version(&self) -> Result<Version> {
        let metadata = self.archive_metadata()?;

        let value = metadata
            .find_first_header("Wheel-Version")
            .ok_or_else(|| EggError::MetadataFieldMissing("WHEEL".into(), "Wheel-Version"))?;

        Version::parse(value).map_err(|_| EggError::WheelVersionUnsupported(value.to_string()))
    }

    /// Reject wheel format versions this converter does not understand.
    fn check_wheel_version(&self) -> Result<()> {
        let version = self.wheel_version()?;

        let minimum = Version::parse("1.0")?;
        let limit = Version::parse("2.0.dev0")?;

        if version >= minimum && version < limit {
            Ok(())
        } else {
            Err(EggError::WheelVersionUnsupported(version.to_string()))
        }
    }

    /// The version from the file name in PEP 440 normal form, if it has one.
    fn normalized_version(&self) -> String {
        Version::parse(&self.filename.version)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| safe_name(&self.filename.version))
    }

    /// The file name the converted egg should have.
    ///
    /// The platform component is only present for platform specific wheels.
    pub fn egg_name(&self, python_version: Option<&str>) -> String {
        let mut name = format!(
            "{}-{}",
            to_filename(&safe_name(&self.filename.name)),
            to_filename(&self.normalized_version())
        );

        if let Some(py) = python_version {
            name.push_str(&format!("-py{}", py));
        }

        if self.filename.platform_tag != "any" {
            name.push_str(&format!("-{}", self.filename.platform_tag));
        }

        format!("{}.egg", name)
    }

    /// Write all archive members below `destination`.
    fn extract(&self, destination: &Path) -> Result<()> {
        for (name, file) in &self.files {
            let path = destination.join(name);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| EggError::io_path(parent, e))?;
            }

            std::fs::write(&path, &file.data).map_err(|e| EggError::io_path(&path, e))?;
            set_executable(&path, file.executable)?;
        }

        Ok(())
    }

    /// Install this wheel as an unpacked egg in `destination`.
    ///
    /// `destination` is created if needed and should be empty. Markers in
    /// `Requires-Dist` are evaluated with `evaluator` and stripped from the
    /// generated `requires.txt`.
    pub fn install_as_egg(
        &self,
        destination: &Path,
        evaluator: &dyn MarkerEvaluator,
    ) -> Result<()> {
        let dist_info = self.dist_info_path()?;
        self.check_wheel_version()?;

        let data_path = self.data_path();
        let data_prefix = format!("{}/", data_path);
        if let Some(location) = self
            .files
            .keys()
            .filter_map(|name| name.strip_prefix(&data_prefix))
            .filter_map(|rest| rest.split('/').next())
            .find(|location| *location != "scripts" && !MERGED_DATA_LOCATIONS.contains(location))
        {
            return Err(EggError::WheelDataLocationUnsupported(location.to_string()));
        }

        std::fs::create_dir_all(destination).map_err(|e| EggError::io_path(destination, e))?;

        debug!("extracting {} to {}", self.filename.name_version(), destination.display());
        self.extract(destination)?;

        let requires = self.convert_requirements(destination, &dist_info, evaluator)?;

        let egg_info = destination.join("EGG-INFO");
        rename(&destination.join(&dist_info), &egg_info)?;
        rename(&egg_info.join("METADATA"), &egg_info.join("PKG-INFO"))?;

        if !requires.is_empty() {
            let path = egg_info.join("requires.txt");
            std::fs::write(&path, requires).map_err(|e| EggError::io_path(&path, e))?;
        }

        move_data_entries(destination, &destination.join(&data_path))?;
        fix_namespace_packages(destination, &egg_info)?;

        Ok(())
    }

    /// Derive `requires.txt` content from the extracted `.dist-info`.
    fn convert_requirements(
        &self,
        destination: &Path,
        dist_info: &str,
        evaluator: &dyn MarkerEvaluator,
    ) -> Result<String> {
        let dist = Distribution::from_metadata(
            destination,
            DistributionKind::DistInfo,
            Precedence::Develop,
            Arc::new(PathMetadata::new(destination.join(dist_info))),
        )?;

        let dm = dist.dependency_map(evaluator)?;

        let mut s = dm.get(&None).map(|reqs| requirement_lines(reqs)).unwrap_or_default();

        for (extra, reqs) in dm.iter() {
            if let Some(extra) = extra {
                s.push_str(&format!("\n[{}]\n", extra));
                s.push_str(&requirement_lines(reqs));
            }
        }

        Ok(s)
    }
}

/// One sorted line per requirement, markers removed.
fn requirement_lines(reqs: &[Requirement]) -> String {
    reqs.iter()
        .map(|r| format!("{}\n", r.without_marker()))
        .sorted()
        .collect()
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| EggError::io_path(from, e))
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if executable {
        let mut permissions = std::fs::metadata(path)
            .map_err(|e| EggError::io_path(path, e))?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        std::fs::set_permissions(path, permissions).map_err(|e| EggError::io_path(path, e))?;
    }

    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

/// Move files under `source` into `dest`, replacing existing files, then remove `source`.
fn merge_tree(source: &Path, dest: &Path) -> Result<()> {
    let entries = walkdir::WalkDir::new(source)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EggError::Io(e.into()))?;

    for entry in entries {
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| EggError::ArchivePathIllegal(entry.path().display().to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| EggError::io_path(&target, e))?;
        } else {
            if target.is_file() {
                std::fs::remove_file(&target).map_err(|e| EggError::io_path(&target, e))?;
            }
            rename(entry.path(), &target)?;
        }
    }

    std::fs::remove_dir_all(source).map_err(|e| EggError::io_path(source, e))
}

/// Relocate `.data/` content: scripts into `EGG-INFO/scripts`, everything else into the root.
fn move_data_entries(destination: &Path, data: &Path) -> Result<()> {
    if !data.is_dir() {
        return Ok(());
    }

    let scripts = data.join("scripts");
    if scripts.is_dir() {
        let egg_info_scripts = destination.join("EGG-INFO").join("scripts");
        std::fs::create_dir_all(&egg_info_scripts)
            .map_err(|e| EggError::io_path(&egg_info_scripts, e))?;

        let entries = std::fs::read_dir(&scripts)
            .map_err(|e| EggError::io_path(&scripts, e))?
            .collect::<std::io::Result<Vec<_>>>()?;

        for entry in entries {
            let name = entry.file_name();

            // Bytecode isn't usable as a script.
            if name.to_string_lossy().ends_with(".pyc") {
                let path = entry.path();
                std::fs::remove_file(&path).map_err(|e| EggError::io_path(&path, e))?;
            } else {
                rename(&entry.path(), &egg_info_scripts.join(name))?;
            }
        }

        std::fs::remove_dir(&scripts).map_err(|e| EggError::io_path(&scripts, e))?;
    }

    for location in MERGED_DATA_LOCATIONS {
        let path = data.join(location);

        if path.is_dir() {
            merge_tree(&path, destination)?;
        }
    }

    std::fs::remove_dir(data).map_err(|e| EggError::io_path(data, e))
}

/// Ensure every declared namespace package has an `__init__.py`.
fn fix_namespace_packages(destination: &Path, egg_info: &Path) -> Result<()> {
    let path = egg_info.join("namespace_packages.txt");

    if !path.is_file() {
        return Ok(());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| EggError::io_path(&path, e))?;

    for package in content.split_whitespace() {
        let package_dir = package
            .split('.')
            .fold(destination.to_path_buf(), |acc, part| acc.join(part));
        let init = package_dir.join("__init__.py");

        std::fs::create_dir_all(&package_dir).map_err(|e| EggError::io_path(&package_dir, e))?;

        if !init.exists() {
            std::fs::write(&init, NAMESPACE_PACKAGE_INIT).map_err(|e| EggError::io_path(&init, e))?;
        }
    }

    Ok(())
}

/// Resolve the path an egg converted from `wheel` would have within `eggs_dir`.
pub fn egg_path(eggs_dir: &Path, wheel: &WheelArchive, python_version: Option<&str>) -> PathBuf {
    eggs_dir.join(wheel.egg_name(python_version))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{requirement::ExtraMarkerEvaluator, testutil::tempdir, wheel_builder::WheelBuilder},
    };

    fn wheel_archive(builder: &WheelBuilder) -> Result<WheelArchive> {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        builder.write_wheel_data(&mut cursor)?;
        cursor.set_position(0);

        WheelArchive::from_reader(cursor, &builder.wheel_file_name())
    }

    #[test]
    fn wheel_filename() -> Result<()> {
        let f = WheelFilename::parse("black-19.10b0-py36-none-any.whl")?;
        assert_eq!(f.name, "black");
        assert_eq!(f.version, "19.10b0");
        assert_eq!(f.build, None);
        assert_eq!(f.python_tag, "py36");
        assert_eq!(f.platform_tag, "any");

        let f = WheelFilename::parse("foo-1.0-1-cp39-cp39-linux_x86_64.whl")?;
        assert_eq!(f.build.as_deref(), Some("1"));
        assert_eq!(f.platform_tag, "linux_x86_64");

        assert!(WheelFilename::parse("foo-1.0.tar.gz").is_err());

        Ok(())
    }

    #[test]
    fn egg_name() -> Result<()> {
        let wheel = wheel_archive(&WheelBuilder::new("my-package", "1.0"))?;
        assert_eq!(wheel.egg_name(None), "my_package-1.0.egg");
        assert_eq!(wheel.egg_name(Some("3.9")), "my_package-1.0-py3.9.egg");

        let mut builder = WheelBuilder::new("widget", "2.0");
        builder.set_tag("cp39-cp39-linux_x86_64")?;
        let wheel = wheel_archive(&builder)?;
        assert_eq!(
            wheel.egg_name(Some("3.9")),
            "widget-2.0-py3.9-linux_x86_64.egg"
        );

        Ok(())
    }

    #[test]
    fn install_as_egg() -> Result<()> {
        let td = tempdir()?;

        let mut builder = WheelBuilder::new("widget", "1.0");
        builder.add_file("widget/__init__.py", "VALUE = 42\n");
        builder.add_file("ns/sub/__init__.py", "");
        builder.add_file_dist_info("namespace_packages.txt", "ns\n");
        builder.add_file_data("scripts", "widget-run", WheelFile::executable("#!python\n"));
        builder.add_file_data("scripts", "junk.pyc", "bytecode");
        builder.add_file_data("purelib", "extra_module.py", "X = 1\n");
        builder.add_file_data("headers", "widget.h", "int x;\n");
        builder.add_provides_extra("tests");
        builder.add_requires_dist("six (>=1.0)");
        builder.add_requires_dist("attrs");
        builder.add_requires_dist("pytest ; extra == 'tests'");

        let wheel = wheel_archive(&builder)?;
        let dest = td.path().join(wheel.egg_name(None));
        wheel.install_as_egg(&dest, &ExtraMarkerEvaluator)?;

        assert!(dest.join("EGG-INFO").join("PKG-INFO").is_file());
        assert!(!dest.join("EGG-INFO").join("METADATA").exists());
        assert!(!dest.join("widget-1.0.dist-info").exists());
        assert!(!dest.join("widget-1.0.data").exists());

        assert_eq!(
            std::fs::read(dest.join("widget").join("__init__.py"))?,
            b"VALUE = 42\n"
        );
        assert_eq!(std::fs::read(dest.join("extra_module.py"))?, b"X = 1\n");
        assert!(dest.join("widget.h").is_file());
        assert!(dest.join("EGG-INFO").join("scripts").join("widget-run").is_file());
        assert!(!dest.join("EGG-INFO").join("scripts").join("junk.pyc").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dest.join("EGG-INFO").join("scripts").join("widget-run"))?
                .permissions()
                .mode();
            assert_ne!(mode & 0o100, 0);
        }

        assert_eq!(
            std::fs::read_to_string(dest.join("EGG-INFO").join("requires.txt"))?,
            "attrs\nsix>=1.0\n\n[tests]\npytest\n"
        );

        // Payload __init__.py files are kept; the bare ns/ package gets the stub.
        assert_eq!(std::fs::read(dest.join("ns").join("sub").join("__init__.py"))?, b"");
        assert_eq!(
            std::fs::read_to_string(dest.join("ns").join("__init__.py"))?,
            NAMESPACE_PACKAGE_INIT
        );

        Ok(())
    }

    #[test]
    fn no_requirements_no_requires_txt() -> Result<()> {
        let td = tempdir()?;

        let wheel = wheel_archive(&WheelBuilder::new("widget", "1.0"))?;
        let dest = td.path().join("widget-1.0.egg");
        wheel.install_as_egg(&dest, &ExtraMarkerEvaluator)?;

        assert!(!dest.join("EGG-INFO").join("requires.txt").exists());

        Ok(())
    }

    #[test]
    fn unsupported_wheel_version() -> Result<()> {
        let td = tempdir()?;

        let mut builder = WheelBuilder::new("widget", "1.0");
        builder.set_wheel_version("2.0");
        let wheel = wheel_archive(&builder)?;

        assert!(matches!(
            wheel.install_as_egg(&td.path().join("widget-1.0.egg"), &ExtraMarkerEvaluator),
            Err(EggError::WheelVersionUnsupported(_))
        ));

        Ok(())
    }

    #[test]
    fn missing_dist_info() -> Result<()> {
        let mut builder = WheelBuilder::new("widget", "1.0");
        builder.add_file("widget.py", "");
        let mut wheel = wheel_archive(&builder)?;
        wheel.files.retain(|name, _| !name.contains(".dist-info/"));

        assert!(matches!(
            wheel.dist_info_path(),
            Err(EggError::WheelDistInfoNotFound(_))
        ));

        Ok(())
    }

    #[test]
    fn unsafe_member_rejected() -> Result<()> {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        {
            let mut zf = zip::ZipWriter::new(&mut cursor);
            zf.start_file("../evil.py", zip::write::FileOptions::default())?;
            std::io::Write::write_all(&mut zf, b"evil")?;
            zf.finish()?;
        }
        cursor.set_position(0);

        assert!(matches!(
            WheelArchive::from_reader(cursor, "evil-1.0-py3-none-any.whl"),
            Err(EggError::ArchivePathIllegal(_))
        ));

        Ok(())
    }
}
