// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {python_eggs::error::EggError, std::path::PathBuf, thiserror::Error};

/// Failure resolving a single requirement.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    DownloaderUnavailable(String),

    #[error("package download failed ({status}):\n{output}")]
    DownloadFailed { status: String, output: String },

    #[error("expected exactly one wheel from download, found {count}")]
    AmbiguousOrEmptyArtifact { count: usize },

    #[error("failed to repackage wheel as egg: {0}")]
    Repackage(#[from] EggError),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("unable to use eggs directory {0}: {1:?}")]
    CacheDirectory(PathBuf, std::io::Error),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, FetchError>;
