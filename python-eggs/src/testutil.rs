// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixtures for tests.

use {
    crate::{
        error::{EggError, Result},
        name::{safe_name, to_filename},
        wheel_builder::WheelBuilder,
    },
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
};

fn pkg_info(name: &str, version: &str) -> String {
    format!("Metadata-Version: 1.1\nName: {}\nVersion: {}\n", name, version)
}

fn egg_basename(name: &str, version: &str) -> String {
    format!("{}-{}", to_filename(&safe_name(name)), to_filename(version))
}

fn write(path: &Path, data: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EggError::io_path(parent, e))?;
    }

    std::fs::write(path, data).map_err(|e| EggError::io_path(path, e))
}

/// Create a temporary directory for a test.
pub fn tempdir() -> Result<tempfile::TempDir> {
    Ok(tempfile::Builder::new()
        .prefix("python-eggs-test")
        .tempdir()?)
}

/// Write `{name}-{version}.egg/` with `EGG-INFO/PKG-INFO` plus extra `EGG-INFO` files.
pub fn write_unpacked_egg(
    dir: &Path,
    name: &str,
    version: &str,
    egg_info_files: &[(&str, &str)],
) -> Result<PathBuf> {
    let egg = dir.join(format!("{}.egg", egg_basename(name, version)));
    let egg_info = egg.join("EGG-INFO");

    write(&egg_info.join("PKG-INFO"), pkg_info(name, version))?;
    for (file, content) in egg_info_files {
        write(&egg_info.join(file), content)?;
    }

    Ok(egg)
}

/// Write a zipped `{name}-{version}.egg` file.
pub fn write_zipped_egg(
    dir: &Path,
    name: &str,
    version: &str,
    egg_info_files: &[(&str, &str)],
) -> Result<PathBuf> {
    let path = dir.join(format!("{}.egg", egg_basename(name, version)));

    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    {
        let mut zf = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default();

        zf.start_file("EGG-INFO/PKG-INFO", options)?;
        zf.write_all(pkg_info(name, version).as_bytes())?;

        for (file, content) in egg_info_files {
            zf.start_file(format!("EGG-INFO/{}", file), options)?;
            zf.write_all(content.as_bytes())?;
        }

        zf.start_file(format!("{}/__init__.py", to_filename(name)), options)?;
        zf.finish()?;
    }

    write(&path, cursor.into_inner())?;

    Ok(path)
}

/// Write a `{name}-{version}.egg-info/` directory as produced by a develop install.
pub fn write_egg_info(dir: &Path, name: &str, version: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{}.egg-info", egg_basename(name, version)));

    write(&path.join("PKG-INFO"), pkg_info(name, version))?;

    Ok(path)
}

/// Write a `{name}-{version}.dist-info/` directory with extra `METADATA` headers.
pub fn write_dist_info(dir: &Path, name: &str, version: &str, headers: &[&str]) -> Result<PathBuf> {
    let path = dir.join(format!("{}.dist-info", egg_basename(name, version)));

    let mut metadata = format!("Metadata-Version: 2.1\nName: {}\nVersion: {}\n", name, version);
    for header in headers {
        metadata.push_str(header);
        metadata.push('\n');
    }

    write(&path.join("METADATA"), metadata)?;

    Ok(path)
}

/// Write a pure Python wheel with a single module into `dir`.
pub fn write_wheel(dir: &Path, name: &str, version: &str) -> Result<PathBuf> {
    let mut builder = WheelBuilder::new(name, version);
    builder.add_file(
        format!("{}/__init__.py", to_filename(name)),
        format!("__version__ = {:?}\n", version),
    );

    builder.write_wheel_into_directory(dir)
}
