// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::Result,
    assert_cmd::Command,
    assert_fs::{prelude::*, TempDir},
    predicates::prelude::*,
    python_eggs::testutil::{write_unpacked_egg, write_wheel, write_zipped_egg},
};

fn get_command() -> Result<Command> {
    Ok(Command::cargo_bin("egg-fetcher")?)
}

#[test]
fn no_args_fails() -> Result<()> {
    get_command()?.assert().failure();

    get_command()?
        .arg("fetch")
        .arg("widget")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--eggs-dir"));

    Ok(())
}

#[test]
fn scan_lists_distributions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_unpacked_egg(temp_dir.path(), "widget", "1.0", &[])?;
    write_unpacked_egg(temp_dir.path(), "widget", "2.0", &[])?;
    write_zipped_egg(temp_dir.path(), "gadget", "0.5", &[])?;
    temp_dir.child("not.an.egg").create_dir_all()?;

    let assert = get_command()?
        .arg("scan")
        .arg(temp_dir.path())
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let lines = stdout
        .lines()
        .map(|l| l.split(' ').take(2).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>();

    assert_eq!(lines, vec!["gadget 0.5", "widget 2.0", "widget 1.0"]);
    assert!(!stdout.contains("not.an.egg"));

    Ok(())
}

#[test]
fn scan_missing_directory() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command()?
        .arg("scan")
        .arg(temp_dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));

    Ok(())
}

#[test]
fn fetch_installed_does_not_run_python() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_unpacked_egg(temp_dir.path(), "widget", "1.0", &[])?;

    get_command()?
        .arg("fetch")
        .arg("widget>=1.0")
        .arg("--eggs-dir")
        .arg(temp_dir.path())
        .arg("--python")
        .arg(temp_dir.path().join("no-such-python"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("widget 1.0 "))
        .stdout(predicate::str::contains("widget-1.0.egg"));

    Ok(())
}

#[test]
fn fetch_without_python_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command()?
        .arg("fetch")
        .arg("widget")
        .arg("--eggs-dir")
        .arg(temp_dir.path())
        .arg("--python")
        .arg(temp_dir.path().join("no-such-python"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to run"));

    Ok(())
}

#[test]
fn fetch_invalid_requirement() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command()?
        .arg("fetch")
        .arg("widget >= nonsense")
        .arg("--eggs-dir")
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsing requirement"));

    Ok(())
}

#[cfg(unix)]
mod fake_python {
    use {super::*, std::os::unix::fs::PermissionsExt, std::path::Path};

    /// Write a shell script answering the pip invocations the fetcher makes.
    ///
    /// Arguments of the download invocation are recorded to `args.log`. On
    /// download the script copies `wheel` into the `-w` directory, or fails
    /// when `wheel` is `None`.
    fn write_fake_python(dir: &Path, wheel: Option<&Path>) -> Result<std::path::PathBuf> {
        let download = match wheel {
            Some(wheel) => format!("cp '{}' \"$7/\"", wheel.display()),
            None => "echo 'ERROR: No matching distribution found' >&2\nexit 1".to_string(),
        };

        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"-c\" ]; then exit 0; fi\n\
             if [ \"$3\" = \"--version\" ]; then echo 'pip 23.0'; exit 0; fi\n\
             printf '%s\\n' \"$@\" > '{}'\n\
             {}\n",
            dir.join("args.log").display(),
            download
        );

        let path = dir.join("python");
        std::fs::write(&path, script)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;

        Ok(path)
    }

    #[test]
    fn fetch_downloads_and_installs() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let tools = temp_dir.child("tools");
        tools.create_dir_all()?;
        let wheels = temp_dir.child("wheels");
        wheels.create_dir_all()?;
        let eggs = temp_dir.child("eggs");

        let wheel = write_wheel(wheels.path(), "widget", "1.0")?;
        let python = write_fake_python(tools.path(), Some(&wheel))?;

        get_command()?
            .arg("fetch")
            .arg("widget<2")
            .arg("--eggs-dir")
            .arg(eggs.path())
            .arg("--python")
            .arg(&python)
            .arg("--quiet")
            .arg("--find-links")
            .arg(wheels.path())
            .assert()
            .success()
            .stdout(predicate::str::starts_with("widget 1.0 "))
            .stdout(predicate::str::contains("widget-1.0.egg"));

        eggs.child("widget-1.0.egg/EGG-INFO/PKG-INFO")
            .assert(predicate::path::is_file());
        eggs.child("widget-1.0.egg/widget/__init__.py")
            .assert(predicate::path::is_file());

        let args = std::fs::read_to_string(tools.path().join("args.log"))?;
        let args = args.lines().collect::<Vec<_>>();
        assert_eq!(
            &args[0..6],
            &[
                "-m",
                "pip",
                "--disable-pip-version-check",
                "wheel",
                "--no-deps",
                "-w"
            ]
        );
        assert_eq!(
            &args[7..],
            &[
                "--quiet",
                "--find-links",
                wheels.path().display().to_string().as_str(),
                "widget<2"
            ]
        );

        // The download directory is gone.
        assert!(!Path::new(args[6]).exists());

        Ok(())
    }

    #[test]
    fn fetch_failure_leaves_eggs_dir_unchanged() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let tools = temp_dir.child("tools");
        tools.create_dir_all()?;
        let eggs = temp_dir.child("eggs");
        eggs.create_dir_all()?;
        write_unpacked_egg(eggs.path(), "gadget", "1.0", &[])?;

        let python = write_fake_python(tools.path(), None)?;

        get_command()?
            .arg("fetch")
            .arg("widget")
            .arg("--eggs-dir")
            .arg(eggs.path())
            .arg("--python")
            .arg(&python)
            .assert()
            .failure()
            .stderr(predicate::str::contains("No matching distribution found"));

        let mut entries = vec![];
        for entry in std::fs::read_dir(eggs.path())? {
            entries.push(entry?.file_name().to_string_lossy().to_string());
        }
        assert_eq!(entries, vec!["gadget-1.0.egg"]);

        Ok(())
    }
}
