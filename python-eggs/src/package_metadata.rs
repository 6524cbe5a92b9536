// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Core metadata files: `PKG-INFO` for eggs, `METADATA` for wheels. */

use {
    crate::{
        error::{EggError, Result},
        version::Version,
    },
    mailparse::parse_mail,
};

/// Parsed headers of a core metadata file, in file order.
#[derive(Clone, Debug, Default)]
pub struct PythonPackageMetadata {
    headers: Vec<(String, String)>,
}

impl PythonPackageMetadata {
    /// Parse a metadata file.
    ///
    /// RFC 822 `Key: value` headers are expected. If those yield no `Name`,
    /// the data is read again as `key = value` lines.
    pub fn from_metadata(data: &[u8]) -> Result<PythonPackageMetadata> {
        let parsed = parse_mail(data).map(|message| Self {
            headers: message
                .headers
                .iter()
                .map(|h| (h.get_key(), h.get_value()))
                .collect(),
        });

        match parsed {
            Ok(metadata) if metadata.name().is_some() => Ok(metadata),
            parsed => {
                let assignments = Self::from_assignments(data);

                if assignments.name().is_some() {
                    Ok(assignments)
                } else {
                    Ok(parsed?)
                }
            }
        }
    }

    fn from_assignments(data: &[u8]) -> Self {
        let headers = String::from_utf8_lossy(data)
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .filter(|(key, _)| !key.is_empty() && !key.contains(char::is_whitespace))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self { headers }
    }

    /// First value of a header. Names match case-insensitively.
    pub fn find_first_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a header, in file order.
    pub fn find_all_headers(&self, key: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.find_first_header(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.non_empty("Name")
    }

    pub fn version(&self) -> Option<&str> {
        self.non_empty("Version")
    }

    /// Project name and parsed version.
    ///
    /// `source` names the metadata file in errors.
    pub fn identity(&self, source: &str) -> Result<(String, Version)> {
        let missing = |field| EggError::MetadataFieldMissing(source.to_string(), field);

        let name = self.name().ok_or_else(|| missing("Name"))?;
        let version = self.version().ok_or_else(|| missing("Version"))?;

        Ok((name.to_string(), Version::parse(version)?))
    }
}
