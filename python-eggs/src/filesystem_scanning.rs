// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Scanning the filesystem for Python distributions.

A directory is scanned one entry at a time. Each entry is classified by
[classify_path] into one of three outcomes:

* [Candidate::NotAContainer]: the entry is not a distribution, even if its
  name looks like one (e.g. a `not.an.egg` directory without `EGG-INFO/PKG-INFO`).
* [Candidate::Malformed]: the entry is shaped like a distribution but its
  metadata could not be read.
* [Candidate::Valid]: a [Distribution] was recovered.

Malformed entries are reported individually and never abort a scan.
*/

use {
    crate::{
        distribution::{
            Distribution, DistributionKind, EggFilename, FileMetadata, MetadataProvider,
            PathMetadata, Precedence, ZipMetadata,
        },
        error::{EggError, Result},
    },
    log::{debug, warn},
    std::{
        collections::VecDeque,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Outcome of classifying a filesystem entry.
#[derive(Debug)]
pub enum Candidate {
    NotAContainer,
    Malformed(EggError),
    Valid(Distribution),
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().ends_with(suffix))
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Build a [Distribution], turning metadata failures into [Candidate::Malformed].
fn load(
    path: &Path,
    location: &Path,
    kind: DistributionKind,
    precedence: Precedence,
    metadata: Arc<dyn MetadataProvider>,
) -> Candidate {
    match Distribution::from_metadata(location, kind, precedence, metadata) {
        Ok(dist) => {
            let dist = if matches!(
                kind,
                DistributionKind::UnpackedEgg | DistributionKind::ZippedEgg
            ) {
                let filename = EggFilename::parse(&file_stem(path));

                dist.with_py_version(filename.as_ref().and_then(|f| f.py_version.clone()))
                    .with_platform(filename.and_then(|f| f.platform))
            } else {
                dist
            };

            Candidate::Valid(dist)
        }
        Err(e) => Candidate::Malformed(EggError::MalformedCandidate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn is_zip_egg(path: &Path) -> bool {
    let fh = match std::fs::File::open(path) {
        Ok(fh) => fh,
        Err(_) => return false,
    };

    let mut zf = match zip::ZipArchive::new(fh) {
        Ok(zf) => zf,
        Err(_) => return false,
    };

    let found = matches!(zf.by_name("EGG-INFO/PKG-INFO"), Ok(f) if f.is_file());

    found
}

/// Whether a directory is an unpacked egg.
pub fn is_unpacked_egg(path: &Path) -> bool {
    has_suffix(path, ".egg") && path.join("EGG-INFO").join("PKG-INFO").is_file()
}

/// Classify a single filesystem entry.
pub fn classify_path(path: &Path) -> Candidate {
    let parent = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

    if has_suffix(path, ".egg") {
        if path.is_dir() {
            if is_unpacked_egg(path) {
                return load(
                    path,
                    path,
                    DistributionKind::UnpackedEgg,
                    Precedence::Egg,
                    Arc::new(PathMetadata::new(path.join("EGG-INFO"))),
                );
            }
        } else if path.is_file() && is_zip_egg(path) {
            return load(
                path,
                path,
                DistributionKind::ZippedEgg,
                Precedence::Egg,
                Arc::new(ZipMetadata::new(path, "EGG-INFO")),
            );
        }
    } else if has_suffix(path, ".egg-info") {
        if path.is_dir() {
            if path.join("PKG-INFO").is_file() {
                return load(
                    path,
                    &parent,
                    DistributionKind::EggInfo,
                    Precedence::Develop,
                    Arc::new(PathMetadata::new(path)),
                );
            }
        } else if path.is_file() {
            return load(
                path,
                &parent,
                DistributionKind::EggInfo,
                Precedence::Develop,
                Arc::new(FileMetadata::new(path)),
            );
        }
    } else if has_suffix(path, ".dist-info") && path.join("METADATA").is_file() {
        return load(
            path,
            &parent,
            DistributionKind::DistInfo,
            Precedence::Develop,
            Arc::new(PathMetadata::new(path)),
        );
    }

    Candidate::NotAContainer
}

/// Resolve the distribution installed at exactly `path`, if any.
pub fn distribution_from_path(path: &Path) -> Result<Option<Distribution>> {
    match classify_path(path) {
        Candidate::Valid(dist) => Ok(Some(dist)),
        Candidate::Malformed(e) => Err(e),
        Candidate::NotAContainer => Ok(None),
    }
}

/// Read the target directory of an `.egg-link` file.
fn read_egg_link(path: &Path) -> Result<Option<PathBuf>> {
    let content = std::fs::read_to_string(path).map_err(|e| EggError::io_path(path, e))?;

    Ok(content
        .lines()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .map(|line| {
            path.parent()
                .unwrap_or_else(|| Path::new(""))
                .join(line)
        }))
}

fn sorted_children(path: &Path) -> Result<Vec<PathBuf>> {
    walkdir::WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .map(|entry| {
            entry
                .map(|entry| entry.into_path())
                .map_err(|e| EggError::io_path(path, e.into()))
        })
        .collect()
}

/// Lazily yields distributions found in a directory.
///
/// Entries are visited in file name order.
pub struct DistributionIterator {
    entries: Option<walkdir::IntoIter>,
    /// Entries to classify before resuming `entries` (root eggs, `.egg-link` targets).
    pending: VecDeque<PathBuf>,
    /// Pending entries may only be metadata directories.
    pending_metadata_only: bool,
}

impl DistributionIterator {
    pub fn new(root: &Path) -> Self {
        if !root.exists() {
            debug!("{} does not exist; nothing to scan", root.display());

            return Self {
                entries: None,
                pending: VecDeque::new(),
                pending_metadata_only: false,
            };
        }

        // A root that is itself an egg yields only that egg.
        if is_unpacked_egg(root) || (root.is_file() && has_suffix(root, ".egg")) {
            return Self {
                entries: None,
                pending: VecDeque::from(vec![root.to_path_buf()]),
                pending_metadata_only: false,
            };
        }

        let entries = walkdir::WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter();

        Self {
            entries: Some(entries),
            pending: VecDeque::new(),
            pending_metadata_only: false,
        }
    }

    fn next_path(&mut self) -> Option<Result<(PathBuf, bool)>> {
        if let Some(path) = self.pending.pop_front() {
            return Some(Ok((path, self.pending_metadata_only)));
        }

        let entry = self.entries.as_mut()?.next()?;

        Some(
            entry
                .map(|entry| (entry.into_path(), false))
                .map_err(|e| {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    EggError::io_path(path, e.into())
                }),
        )
    }
}

impl Iterator for DistributionIterator {
    type Item = Result<Distribution>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (path, metadata_only) = match self.next_path()? {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };

            if metadata_only && !(has_suffix(&path, ".egg-info") || has_suffix(&path, ".dist-info"))
            {
                continue;
            }

            if !metadata_only && has_suffix(&path, ".egg-link") && path.is_file() {
                let target = match read_egg_link(&path) {
                    Ok(Some(target)) => target,
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                };

                if !target.is_dir() {
                    debug!("{} points to missing {}", path.display(), target.display());
                    continue;
                }

                match sorted_children(&target) {
                    Ok(children) => {
                        self.pending.extend(children);
                        self.pending_metadata_only = true;
                    }
                    Err(e) => return Some(Err(e)),
                }

                continue;
            }

            match classify_path(&path) {
                Candidate::NotAContainer => continue,
                Candidate::Malformed(e) => return Some(Err(e)),
                Candidate::Valid(dist) => return Some(Ok(dist)),
            }
        }
    }
}

/// A restartable source of distributions for a directory.
///
/// Every call to [Self::iter] rescans the filesystem.
#[derive(Clone, Debug)]
pub struct DistributionFinder {
    root: PathBuf,
}

impl DistributionFinder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iter(&self) -> DistributionIterator {
        DistributionIterator::new(&self.root)
    }
}

impl<'a> IntoIterator for &'a DistributionFinder {
    type Item = Result<Distribution>;
    type IntoIter = DistributionIterator;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Find valid distributions in a directory.
///
/// Entries that fail to load are logged and skipped.
pub fn find_distributions(root: &Path) -> impl Iterator<Item = Distribution> {
    DistributionIterator::new(root).filter_map(|res| match res {
        Ok(dist) => Some(dist),
        Err(e) => {
            warn!("skipping distribution: {}", e);
            None
        }
    })
}
