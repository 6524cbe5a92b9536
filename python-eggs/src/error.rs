// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {std::path::PathBuf, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum EggError {
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid project name: {0}")]
    InvalidName(String),

    #[error("invalid version specifier: {0}")]
    InvalidSpecifier(String),

    #[error("failed to parse requirement: {0}")]
    RequirementParse(String),

    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("metadata parsing error: {0:?}")]
    MetadataParse(#[from] mailparse::MailParseError),

    #[error("metadata {0} lacks required field {1}")]
    MetadataFieldMissing(String, &'static str),

    #[error("metadata file {0} not available")]
    MetadataNotFound(String),

    #[error("refusing to read metadata outside of distribution: {0}")]
    MetadataPathIllegal(String),

    #[error("malformed distribution at {path}: {reason}")]
    MalformedCandidate { path: PathBuf, reason: String },

    #[error("{0} does not have extra {1}")]
    UnknownExtra(String, String),

    #[error("zip error: {0:?}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to parse wheel filename: {0}")]
    WheelFilename(String),

    #[error("unsupported wheel format: .dist-info not found in {0}")]
    WheelDistInfoNotFound(String),

    #[error("unsupported wheel format version: {0}")]
    WheelVersionUnsupported(String),

    #[error("unsupported wheel data location: {0}")]
    WheelDataLocationUnsupported(String),

    #[error("unsafe path in archive: {0}")]
    ArchivePathIllegal(String),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(PathBuf, std::io::Error),
}

impl EggError {
    /// Construct an [EggError::IoPath] from a path and an I/O error.
    pub fn io_path(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::IoPath(path.into(), err)
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, EggError>;
