// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration for fetching eggs. */

use {
    std::path::{Path, PathBuf},
    url::Url,
};

/// Environment variable holding the Python interpreter used to run pip.
pub const PYTHON_EXE_ENV: &str = "EGG_FETCHER_PYTHON";

/// Resolve the default Python interpreter.
///
/// [PYTHON_EXE_ENV] wins, then `python3` on `PATH`, then plain `python`.
pub fn default_python_exe() -> PathBuf {
    if let Some(value) = std::env::var_os(PYTHON_EXE_ENV) {
        if !value.is_empty() {
            return PathBuf::from(value);
        }
    }

    which::which("python3").unwrap_or_else(|_| PathBuf::from("python"))
}

/// Settings controlling how eggs are located and fetched.
#[derive(Clone, Debug)]
pub struct FetchSettings {
    eggs_dir: PathBuf,
    python_exe: PathBuf,
    quiet: bool,
    index_url: Option<Url>,
    find_links: Vec<String>,
    python_version: Option<String>,
    platform: Option<String>,
}

impl FetchSettings {
    /// Construct an instance fetching into `eggs_dir`.
    pub fn new(eggs_dir: impl Into<PathBuf>) -> Self {
        Self {
            eggs_dir: eggs_dir.into(),
            python_exe: default_python_exe(),
            quiet: false,
            index_url: None,
            find_links: vec![],
            python_version: None,
            platform: None,
        }
    }

    /// Directory holding installed eggs.
    pub fn eggs_dir(&self) -> &Path {
        &self.eggs_dir
    }

    pub fn set_eggs_dir(&mut self, path: impl Into<PathBuf>) {
        self.eggs_dir = path.into();
    }

    /// Python interpreter used to invoke pip.
    pub fn python_exe(&self) -> &Path {
        &self.python_exe
    }

    pub fn set_python_exe(&mut self, path: impl Into<PathBuf>) {
        self.python_exe = path.into();
    }

    /// Whether pip should be told to be quiet.
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Package index to use instead of pip's default.
    pub fn index_url(&self) -> Option<&Url> {
        self.index_url.as_ref()
    }

    pub fn set_index_url(&mut self, url: Option<Url>) {
        self.index_url = url;
    }

    /// Additional locations pip searches for archives.
    pub fn find_links(&self) -> &[String] {
        &self.find_links
    }

    pub fn add_find_links(&mut self, location: impl ToString) {
        self.find_links.push(location.to_string());
    }

    /// Python version tag, e.g. `3.9`.
    ///
    /// When set, it is embedded in the name of fetched eggs and cached eggs
    /// tagged for other versions are ignored.
    pub fn python_version(&self) -> Option<&str> {
        self.python_version.as_deref()
    }

    pub fn set_python_version(&mut self, version: Option<String>) {
        self.python_version = version;
    }

    /// Platform tag cached eggs must carry, if they carry one.
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn set_platform(&mut self, platform: Option<String>) {
        self.platform = platform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters() -> Result<(), url::ParseError> {
        let mut settings = FetchSettings::new("/eggs");
        assert_eq!(settings.eggs_dir(), Path::new("/eggs"));
        assert!(!settings.quiet());
        assert!(settings.index_url().is_none());

        settings.set_python_exe("/usr/bin/python3.9");
        settings.set_quiet(true);
        settings.set_index_url(Some(Url::parse("https://pypi.example.com/simple/")?));
        settings.add_find_links("/wheels");
        settings.add_find_links("https://example.com/links/");
        settings.set_python_version(Some("3.9".into()));

        assert_eq!(settings.python_exe(), Path::new("/usr/bin/python3.9"));
        assert!(settings.quiet());
        assert_eq!(
            settings.index_url().map(|u| u.as_str()),
            Some("https://pypi.example.com/simple/")
        );
        assert_eq!(settings.find_links(), ["/wheels", "https://example.com/links/"]);
        assert_eq!(settings.python_version(), Some("3.9"));
        assert!(settings.platform().is_none());

        Ok(())
    }
}
