// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Resolving a requirement to an installed egg.

[EggFetcher::fetch] first looks for a satisfying distribution in the eggs
directory. On a miss it downloads a wheel into a private temporary directory,
converts it to an unpacked egg in a staging directory next to its final
location and renames it into place. The returned [Distribution] is read back
from the installed egg.
*/

use {
    crate::{
        downloader::{
            Advisory, CancellationToken, DownloadRequest, PackageDownloader, PipDownloader,
        },
        error::{FetchError, Result},
        settings::FetchSettings,
    },
    log::{debug, info, warn},
    python_eggs::{
        distribution::Distribution,
        environment::Environment,
        error::EggError,
        filesystem_scanning::distribution_from_path,
        requirement::{ExtraMarkerEvaluator, MarkerEvaluator, Requirement},
        wheel::{egg_path, WheelArchive},
    },
    std::{
        fmt::{Debug, Formatter},
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Where a fetched distribution came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchSource {
    /// Already present in the eggs directory.
    Cache,
    /// Downloaded and installed by this fetch.
    Downloaded,
}

/// Outcome of a successful fetch.
#[derive(Clone, Debug)]
pub struct FetchReport {
    pub distribution: Distribution,
    pub source: FetchSource,
    pub advisories: Vec<Advisory>,
}

/// Fetches eggs needed for building.
pub struct EggFetcher<D = PipDownloader> {
    settings: FetchSettings,
    downloader: D,
    /// Decides which `Requires-Dist` markers of a fetched wheel apply.
    evaluator: Box<dyn MarkerEvaluator + Send + Sync>,
}

impl<D: Debug> Debug for EggFetcher<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EggFetcher")
            .field("settings", &self.settings)
            .field("downloader", &self.downloader)
            .finish_non_exhaustive()
    }
}

impl EggFetcher<PipDownloader> {
    /// Construct an instance downloading with pip from the configured interpreter.
    pub fn new(settings: FetchSettings) -> Self {
        let downloader = PipDownloader::new(settings.python_exe());

        Self::with_downloader(settings, downloader)
    }
}

impl<D: PackageDownloader> EggFetcher<D> {
    pub fn with_downloader(settings: FetchSettings, downloader: D) -> Self {
        Self {
            settings,
            downloader,
            evaluator: Box::new(ExtraMarkerEvaluator),
        }
    }

    /// Set how environment markers of fetched wheels' dependencies are evaluated.
    ///
    /// Defaults to [ExtraMarkerEvaluator], which treats every non-extra marker
    /// as applying.
    pub fn set_marker_evaluator(
        &mut self,
        evaluator: impl MarkerEvaluator + Send + Sync + 'static,
    ) {
        self.evaluator = Box::new(evaluator);
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Obtain a distribution satisfying `requirement`.
    pub fn fetch_build_egg(&self, requirement: &Requirement) -> Result<Distribution> {
        Ok(self
            .fetch(requirement, &CancellationToken::new())?
            .distribution)
    }

    /// Fetch `requirement` if its environment marker applies.
    pub fn fetch_if_applicable(
        &self,
        requirement: &Requirement,
        evaluator: &dyn MarkerEvaluator,
        cancel: &CancellationToken,
    ) -> Result<Option<FetchReport>> {
        if !requirement.applies(evaluator) {
            info!("skipping {}: marker does not apply", requirement);
            return Ok(None);
        }

        Ok(Some(self.fetch(requirement, cancel)?))
    }

    /// Obtain a distribution satisfying `requirement`, downloading it if needed.
    pub fn fetch(
        &self,
        requirement: &Requirement,
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        let eggs_dir = self.prepare_eggs_dir()?;

        if let Some(distribution) = self.find_local(&eggs_dir, requirement) {
            info!("{} satisfied by {}", requirement, distribution.location().display());

            return Ok(FetchReport {
                distribution,
                source: FetchSource::Cache,
                advisories: vec![],
            });
        }

        info!("{} not found in {}", requirement, eggs_dir.display());

        let advisories = self.downloader.preflight()?;

        // Removed on drop, whichever way we leave this function.
        let download_dir = tempfile::Builder::new()
            .prefix("egg-fetcher-download")
            .tempdir()?;

        let request = DownloadRequest::new(requirement, download_dir.path())
            .with_settings(&self.settings);
        self.downloader.download(&request, cancel)?;

        let wheel_path = find_wheel(download_dir.path())?;
        let distribution = self.install_wheel(&eggs_dir, &wheel_path)?;

        download_dir.close()?;

        info!("installed {}", distribution.location().display());

        Ok(FetchReport {
            distribution,
            source: FetchSource::Downloaded,
            advisories,
        })
    }

    /// Create the eggs directory if needed and resolve its canonical path.
    fn prepare_eggs_dir(&self) -> Result<PathBuf> {
        let eggs_dir = self.settings.eggs_dir();

        std::fs::create_dir_all(eggs_dir)
            .map_err(|e| FetchError::CacheDirectory(eggs_dir.to_path_buf(), e))?;

        eggs_dir
            .canonicalize()
            .map_err(|e| FetchError::CacheDirectory(eggs_dir.to_path_buf(), e))
    }

    fn find_local(&self, eggs_dir: &Path, requirement: &Requirement) -> Option<Distribution> {
        let env = Environment::from_path(
            eggs_dir,
            self.settings.python_version().map(String::from),
            self.settings.platform().map(String::from),
        );

        env.best_match(requirement).cloned()
    }

    /// Convert a downloaded wheel into an egg inside `eggs_dir`.
    fn install_wheel(&self, eggs_dir: &Path, wheel_path: &Path) -> Result<Distribution> {
        let wheel = WheelArchive::from_path(wheel_path)?;
        let python_version = self.settings.python_version();

        let destination = egg_path(eggs_dir, &wheel, python_version);

        // Same filesystem as the destination so publishing is a rename.
        let staging = tempfile::Builder::new()
            .prefix(".egg-fetcher-")
            .tempdir_in(eggs_dir)
            .map_err(|e| FetchError::CacheDirectory(eggs_dir.to_path_buf(), e))?;

        let staged = staging.path().join(wheel.egg_name(python_version));
        debug!("staging {} in {}", wheel_path.display(), staged.display());
        wheel.install_as_egg(&staged, self.evaluator.as_ref())?;

        publish(&staged, &destination, staging.path())?;
        staging.close()?;

        read_installed(&destination, PUBLISH_SETTLE_ATTEMPTS, PUBLISH_SETTLE_DELAY)
    }
}

/// Number of times a just-published egg is read before giving up.
const PUBLISH_SETTLE_ATTEMPTS: usize = 3;

const PUBLISH_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Read the distribution record of a published egg.
///
/// A concurrent fetch of the same egg briefly moves `destination` aside while
/// replacing it, so a miss is retried after `delay`.
fn read_installed(destination: &Path, attempts: usize, delay: Duration) -> Result<Distribution> {
    let mut attempt = 1;

    loop {
        let res = match distribution_from_path(destination) {
            Ok(Some(dist)) => Ok(dist),
            Ok(None) => Err(FetchError::Repackage(EggError::MalformedCandidate {
                path: destination.to_path_buf(),
                reason: "installed egg is not recognized".to_string(),
            })),
            Err(e) => Err(e.into()),
        };

        match res {
            Err(e) if attempt < attempts => {
                debug!("re-reading {} after: {}", destination.display(), e);
                attempt += 1;
                std::thread::sleep(delay);
            }
            res => return res,
        }
    }
}

/// Locate the single wheel in a download directory.
fn find_wheel(dir: &Path) -> Result<PathBuf> {
    let mut wheels = vec![];

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_file() && path.extension().map(|e| e == "whl").unwrap_or(false) {
            wheels.push(path);
        }
    }

    if wheels.len() == 1 {
        Ok(wheels.remove(0))
    } else {
        Err(FetchError::AmbiguousOrEmptyArtifact {
            count: wheels.len(),
        })
    }
}

/// Move a staged egg to its final location with a single rename.
///
/// An existing entry at `destination` is first moved into `scratch`. If
/// another process publishes the same egg between the two renames, its copy
/// is kept.
fn publish(staged: &Path, destination: &Path, scratch: &Path) -> Result<()> {
    if std::fs::rename(staged, destination).is_ok() {
        return Ok(());
    }

    if destination.exists() {
        debug!("replacing {}", destination.display());

        match std::fs::rename(destination, scratch.join("displaced")) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(FetchError::CacheDirectory(destination.to_path_buf(), e)),
        }
    }

    match std::fs::rename(staged, destination) {
        Ok(()) => Ok(()),
        Err(_) if destination.exists() => {
            warn!("{} was installed concurrently; keeping it", destination.display());
            Ok(())
        }
        Err(e) => Err(FetchError::CacheDirectory(destination.to_path_buf(), e)),
    }
}
