// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Acquiring wheels from a package index.

Downloads are performed by an external tool. [DownloadCommand] describes the
process to run as a program plus an ordered argument list, so requirement text
and URLs are never interpreted by a shell. [PipDownloader] is the
[PackageDownloader] invoking `python -m pip wheel`.
*/

use {
    crate::{
        error::{FetchError, Result},
        settings::FetchSettings,
    },
    duct::cmd,
    log::{debug, info, warn},
    python_eggs::requirement::Requirement,
    std::{
        ffi::OsString,
        fmt::{Display, Formatter},
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    },
    url::Url,
};

/// How often a running download is checked for completion and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A signal telling an in-progress fetch to stop.
///
/// Clones share state: cancelling one cancels all.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A non-fatal problem noticed while fetching.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Advisory {
    /// The `wheel` package is not installed alongside pip.
    PackerMissing,
}

impl Display for Advisory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PackerMissing => f.write_str("wheel is not installed"),
        }
    }
}

/// What to download and where to put it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DownloadRequest {
    target: String,
    destination: PathBuf,
    quiet: bool,
    index_url: Option<Url>,
    find_links: Vec<String>,
}

impl DownloadRequest {
    /// Construct a request for a single requirement.
    ///
    /// Direct URL requirements download the URL itself, since `name @ url`
    /// is not accepted on the pip command line.
    pub fn new(requirement: &Requirement, destination: impl Into<PathBuf>) -> Self {
        let target = match &requirement.url {
            Some(url) => url.to_string(),
            None => requirement.to_string(),
        };

        Self {
            target,
            destination: destination.into(),
            quiet: false,
            index_url: None,
            find_links: vec![],
        }
    }

    /// Apply index related settings.
    pub fn with_settings(mut self, settings: &FetchSettings) -> Self {
        self.quiet = settings.quiet();
        self.index_url = settings.index_url().cloned();
        self.find_links = settings.find_links().to_vec();

        self
    }

    /// The requirement string or URL handed to the downloader.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Directory downloaded artifacts are written to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn index_url(&self) -> Option<&Url> {
        self.index_url.as_ref()
    }

    pub fn find_links(&self) -> &[String] {
        &self.find_links
    }
}

/// Resolve the executable to hand to the process launcher.
///
/// A bare name such as `python3` is searched for on `PATH`. Anything else is
/// used as given.
fn resolve_program(program: &Path) -> OsString {
    let bare = !program.is_absolute() && program.components().count() == 1;

    if bare {
        match which::which(program) {
            Ok(path) => return path.into_os_string(),
            Err(e) => debug!("{} not found on PATH: {}", program.display(), e),
        }
    }

    program.as_os_str().to_os_string()
}

/// A process to execute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DownloadCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl DownloadCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    /// The `pip wheel` invocation satisfying a request.
    pub fn pip_wheel(python_exe: &Path, request: &DownloadRequest) -> Self {
        let mut command = Self::new(python_exe);
        command
            .arg("-m")
            .arg("pip")
            .arg("--disable-pip-version-check")
            .arg("wheel")
            .arg("--no-deps")
            .arg("-w")
            .arg(request.destination());

        if request.quiet() {
            command.arg("--quiet");
        }

        if let Some(url) = request.index_url() {
            command.arg("--index-url").arg(url.as_str());
        }

        for link in request.find_links() {
            command.arg("--find-links").arg(link);
        }

        command.arg(request.target());

        command
    }

    /// Append an argument.
    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(|a| a.as_os_str()))
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the process to completion, honoring cancellation.
    ///
    /// stderr is merged into stdout and captured. A non-zero exit is
    /// [FetchError::DownloadFailed] carrying that output. When `cancel` fires
    /// the process is killed and [FetchError::Cancelled] is returned.
    pub fn run(&self, cancel: &CancellationToken) -> Result<()> {
        info!("running {}", self.describe());

        let handle = cmd(resolve_program(&self.program), &self.args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .start()
            .map_err(|e| {
                FetchError::DownloaderUnavailable(format!(
                    "unable to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let output = loop {
            if cancel.is_cancelled() {
                warn!("cancelling {}", self.program.display());
                handle.kill()?;
                return Err(FetchError::Cancelled);
            }

            match handle.try_wait()? {
                Some(output) => break output,
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        let text = String::from_utf8_lossy(&output.stdout).to_string();

        if output.status.success() {
            for line in text.lines() {
                debug!("{}", line);
            }

            Ok(())
        } else {
            for line in text.lines() {
                warn!("{}", line);
            }

            Err(FetchError::DownloadFailed {
                status: output.status.to_string(),
                output: text,
            })
        }
    }
}

/// Something that can place a wheel for a requirement in a directory.
pub trait PackageDownloader {
    /// Verify the downloader can run.
    ///
    /// Returns advisories for non-fatal problems.
    fn preflight(&self) -> Result<Vec<Advisory>>;

    /// Download artifacts satisfying `request` into its destination.
    fn download(&self, request: &DownloadRequest, cancel: &CancellationToken) -> Result<()>;
}

/// Downloads wheels by running pip from a Python interpreter.
#[derive(Clone, Debug)]
pub struct PipDownloader {
    python_exe: PathBuf,
}

impl PipDownloader {
    pub fn new(python_exe: impl Into<PathBuf>) -> Self {
        Self {
            python_exe: python_exe.into(),
        }
    }

    pub fn python_exe(&self) -> &Path {
        &self.python_exe
    }
}

impl PackageDownloader for PipDownloader {
    fn preflight(&self) -> Result<Vec<Advisory>> {
        let python_exe = resolve_program(&self.python_exe);

        let output = cmd(python_exe.as_os_str(), ["-m", "pip", "--version"])
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()
            .map_err(|e| {
                FetchError::DownloaderUnavailable(format!(
                    "unable to run {}: {}",
                    self.python_exe.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(FetchError::DownloaderUnavailable(format!(
                "pip is not available to {}: {}",
                self.python_exe.display(),
                String::from_utf8_lossy(&output.stdout).trim()
            )));
        }

        debug!("{}", String::from_utf8_lossy(&output.stdout).trim());

        let have_wheel = cmd(python_exe.as_os_str(), ["-c", "import wheel"])
            .stdout_null()
            .stderr_null()
            .unchecked()
            .run()
            .map(|output| output.status.success())
            .unwrap_or(false);

        if have_wheel {
            Ok(vec![])
        } else {
            warn!("{}", Advisory::PackerMissing);
            Ok(vec![Advisory::PackerMissing])
        }
    }

    fn download(&self, request: &DownloadRequest, cancel: &CancellationToken) -> Result<()> {
        DownloadCommand::pip_wheel(&self.python_exe, request).run(cancel)
    }
}
