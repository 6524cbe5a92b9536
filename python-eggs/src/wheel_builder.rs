// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Assemble wheel archives from in-memory content.

[WheelBuilder] produces the kind of archive `pip wheel` leaves behind: payload
members, optional `.data/<location>/` members and a `.dist-info/` directory
whose `RECORD` is always regenerated. Output is byte-for-byte reproducible.
*/

use {
    crate::error::{EggError, Result},
    once_cell::sync::Lazy,
    sha2::Digest,
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        io::{Seek, Write},
        path::{Component, Path, PathBuf},
    },
};

/// Characters not allowed in a wheel file name component.
static RE_UNSAFE_COMPONENT: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[^\w\d.]+").unwrap());

/// A member of a wheel archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WheelFile {
    pub data: Vec<u8>,
    pub executable: bool,
}

impl WheelFile {
    /// A member carrying the executable bit.
    pub fn executable(data: impl AsRef<[u8]>) -> Self {
        Self {
            data: data.as_ref().to_vec(),
            executable: true,
        }
    }

    fn unix_mode(&self) -> u32 {
        if self.executable {
            0o755
        } else {
            0o644
        }
    }

    /// `RECORD` line for this member stored at `member`.
    fn record_line(&self, member: &str) -> String {
        let digest = sha2::Sha256::digest(&self.data);

        format!(
            "{},sha256={},{}",
            member,
            base64::encode_config(digest.as_slice(), base64::URL_SAFE_NO_PAD),
            self.data.len()
        )
    }
}

impl From<Vec<u8>> for WheelFile {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            executable: false,
        }
    }
}

impl From<&[u8]> for WheelFile {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl From<String> for WheelFile {
    fn from(data: String) -> Self {
        Self::from(data.into_bytes())
    }
}

impl From<&str> for WheelFile {
    fn from(data: &str) -> Self {
        Self::from(data.as_bytes())
    }
}

/// A `{python}-{abi}-{platform}` compatibility tag.
#[derive(Clone, Debug, Eq, PartialEq)]
struct CompatibilityTag {
    python: String,
    abi: String,
    platform: String,
}

impl Default for CompatibilityTag {
    fn default() -> Self {
        Self {
            python: "py3".into(),
            abi: "none".into(),
            platform: "any".into(),
        }
    }
}

impl CompatibilityTag {
    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '-');

        Some(Self {
            python: parts.next().filter(|p| !p.is_empty())?.to_string(),
            abi: parts.next().filter(|p| !p.is_empty())?.to_string(),
            platform: parts.next().filter(|p| !p.is_empty())?.to_string(),
        })
    }
}

impl Display for CompatibilityTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.python, self.abi, self.platform)
    }
}

/// Builds a wheel archive.
///
/// `WHEEL` and `METADATA` are generated from builder state unless a file of
/// that name is added with [Self::add_file_dist_info]. Members are written in
/// lexical order with the `.dist-info/` directory last, all with the same
/// timestamp.
#[derive(Clone, Debug)]
pub struct WheelBuilder {
    name: String,
    version: String,
    build: Option<String>,
    tag: CompatibilityTag,
    wheel_version: String,
    requires_dist: Vec<String>,
    provides_extra: Vec<String>,
    /// Payload and `.data/` members.
    payload: BTreeMap<String, WheelFile>,
    /// `.dist-info/` members, keyed by path relative to that directory.
    dist_info: BTreeMap<String, WheelFile>,
}

impl WheelBuilder {
    pub fn new(name: impl ToString, version: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            build: None,
            tag: CompatibilityTag::default(),
            wheel_version: "1.0".into(),
            requires_dist: vec![],
            provides_extra: vec![],
            payload: BTreeMap::new(),
            dist_info: BTreeMap::new(),
        }
    }

    /// Set the optional build number component of the file name.
    pub fn set_build_tag(&mut self, build: impl ToString) {
        self.build = Some(build.to_string());
    }

    /// The compatibility tag, e.g. `py3-none-any`.
    pub fn tag(&self) -> String {
        self.tag.to_string()
    }

    pub fn set_tag(&mut self, tag: impl ToString) -> Result<()> {
        let tag = tag.to_string();
        self.tag = CompatibilityTag::parse(&tag).ok_or(EggError::WheelFilename(tag))?;

        Ok(())
    }

    /// Set the `Wheel-Version` of the generated `WHEEL` file.
    pub fn set_wheel_version(&mut self, version: impl ToString) {
        self.wheel_version = version.to_string();
    }

    pub fn add_requires_dist(&mut self, requirement: impl ToString) {
        self.requires_dist.push(requirement.to_string());
    }

    pub fn add_provides_extra(&mut self, extra: impl ToString) {
        self.provides_extra.push(extra.to_string());
    }

    /// Project name as it appears in file and directory names.
    fn escaped_name(&self) -> String {
        self.name.to_lowercase().replace('-', "_")
    }

    fn dist_info_dir(&self) -> String {
        format!("{}-{}.dist-info", self.escaped_name(), self.version)
    }

    /// Add a payload member. The path is not validated.
    pub fn add_file(&mut self, path: impl AsRef<Path>, file: impl Into<WheelFile>) {
        self.payload.insert(member_name(path.as_ref()), file.into());
    }

    /// Add a member to the `.dist-info/` directory.
    ///
    /// `RECORD` is regenerated regardless of what is added here.
    pub fn add_file_dist_info(&mut self, path: impl AsRef<Path>, file: impl Into<WheelFile>) {
        self.dist_info
            .insert(member_name(path.as_ref()), file.into());
    }

    /// Add a member under `.data/<location>/`, e.g. `scripts` or `purelib`.
    pub fn add_file_data(
        &mut self,
        location: impl ToString,
        path: impl AsRef<Path>,
        file: impl Into<WheelFile>,
    ) {
        let path = PathBuf::from(format!("{}-{}.data", self.escaped_name(), self.version))
            .join(location.to_string())
            .join(path);

        self.add_file(path, file);
    }

    fn wheel_metadata(&self) -> String {
        format!(
            "Wheel-Version: {}\nGenerator: python-eggs\nRoot-Is-Purelib: {}\nTag: {}\n",
            self.wheel_version,
            self.tag.platform == "any",
            self.tag
        )
    }

    fn core_metadata(&self) -> String {
        let mut lines = vec![
            "Metadata-Version: 2.1".to_string(),
            format!("Name: {}", self.name),
            format!("Version: {}", self.version),
        ];
        lines.extend(
            self.provides_extra
                .iter()
                .map(|e| format!("Provides-Extra: {}", e)),
        );
        lines.extend(
            self.requires_dist
                .iter()
                .map(|r| format!("Requires-Dist: {}", r)),
        );

        lines.join("\n") + "\n"
    }

    /// Every archive member, in the order it is written.
    pub fn members(&self) -> Vec<(String, WheelFile)> {
        let dir = self.dist_info_dir();

        let mut dist_info = self.dist_info.clone();
        dist_info.remove("RECORD");
        dist_info
            .entry("WHEEL".into())
            .or_insert_with(|| self.wheel_metadata().into());
        dist_info
            .entry("METADATA".into())
            .or_insert_with(|| self.core_metadata().into());

        let mut members = self
            .payload
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .chain(
                dist_info
                    .into_iter()
                    .map(|(k, v)| (format!("{}/{}", dir, k), v)),
            )
            .collect::<Vec<_>>();

        let mut record = members
            .iter()
            .map(|(member, file)| file.record_line(member))
            .collect::<Vec<_>>();
        record.push(format!("{}/RECORD,,\n", dir));

        members.push((format!("{}/RECORD", dir), record.join("\n").into()));

        members
    }

    /// The PEP 427 file name of this wheel.
    pub fn wheel_file_name(&self) -> String {
        let components = [
            Some(self.escaped_name()),
            Some(self.version.clone()),
            self.build.clone(),
            Some(self.tag.python.clone()),
            Some(self.tag.abi.clone()),
            Some(self.tag.platform.clone()),
        ];

        let stem = components
            .iter()
            .flatten()
            .map(|c| RE_UNSAFE_COMPONENT.replace_all(c, "_").to_string())
            .collect::<Vec<_>>()
            .join("-");

        format!("{}.whl", stem)
    }

    /// Write the archive to `writer`.
    pub fn write_wheel_data(&self, writer: &mut (impl Write + Seek)) -> Result<()> {
        let mut zf = zip::ZipWriter::new(writer);

        for (member, file) in self.members() {
            zf.start_file(
                member,
                zip::write::FileOptions::default()
                    .unix_permissions(file.unix_mode())
                    .last_modified_time(zip::DateTime::default()),
            )?;
            zf.write_all(&file.data)?;
        }

        zf.finish()?;

        Ok(())
    }

    /// Write the archive into an existing directory, returning its path.
    pub fn write_wheel_into_directory(&self, directory: impl AsRef<Path>) -> Result<PathBuf> {
        let path = directory.as_ref().join(self.wheel_file_name());

        let mut buffer = std::io::Cursor::new(vec![]);
        self.write_wheel_data(&mut buffer)?;
        std::fs::write(&path, buffer.into_inner()).map_err(|e| EggError::io_path(&path, e))?;

        Ok(path)
    }
}

/// `/` joined archive member name for a relative path.
fn member_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
