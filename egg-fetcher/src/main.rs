// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::{anyhow, Context, Result},
    clap::{Arg, ArgAction, ArgMatches, Command},
    egg_fetcher::{
        downloader::CancellationToken,
        fetch::{EggFetcher, FetchSource},
        settings::FetchSettings,
    },
    log::{info, warn, LevelFilter},
    python_eggs::{environment::Environment, requirement::Requirement},
    std::path::PathBuf,
    url::Url,
};

fn command_fetch(args: &ArgMatches) -> Result<()> {
    let requirement = args
        .get_one::<String>("requirement")
        .ok_or_else(|| anyhow!("requirement argument is required"))?;
    let requirement = Requirement::parse(requirement)
        .with_context(|| format!("parsing requirement {}", requirement))?;

    let eggs_dir = args
        .get_one::<PathBuf>("eggs_dir")
        .ok_or_else(|| anyhow!("--eggs-dir is required"))?;

    let mut settings = FetchSettings::new(eggs_dir);

    if let Some(python) = args.get_one::<PathBuf>("python") {
        settings.set_python_exe(python);
    }
    settings.set_quiet(args.get_flag("quiet"));
    if let Some(url) = args.get_one::<String>("index_url") {
        settings.set_index_url(Some(
            Url::parse(url).with_context(|| format!("parsing index URL {}", url))?,
        ));
    }
    if let Some(links) = args.get_many::<String>("find_links") {
        for link in links {
            settings.add_find_links(link);
        }
    }
    settings.set_python_version(args.get_one::<String>("python_version").cloned());
    settings.set_platform(args.get_one::<String>("platform").cloned());

    let fetcher = EggFetcher::new(settings);
    let report = fetcher
        .fetch(&requirement, &CancellationToken::new())
        .with_context(|| format!("fetching {}", requirement))?;

    for advisory in &report.advisories {
        warn!("{}", advisory);
    }

    if report.source == FetchSource::Downloaded {
        info!("downloaded {}", report.distribution);
    }

    println!(
        "{} {} {}",
        report.distribution.name(),
        report.distribution.version(),
        report.distribution.location().display()
    );

    Ok(())
}

fn command_scan(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow!("path argument is required"))?;

    if !path.is_dir() {
        return Err(anyhow!("{} is not a directory", path.display()));
    }

    let env = Environment::from_path(path, None, None);

    for dist in env.iter() {
        println!(
            "{} {} {}",
            dist.name(),
            dist.version(),
            dist.location().display()
        );
    }

    Ok(())
}

fn main_impl() -> Result<()> {
    let app = Command::new("egg-fetcher")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Fetch Python packages needed for building as eggs")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("fetch")
            .about("Obtain an egg satisfying a requirement, downloading it if needed")
            .arg(
                Arg::new("requirement")
                    .required(true)
                    .help("Requirement to satisfy, e.g. 'widget>=1.0'"),
            )
            .arg(
                Arg::new("eggs_dir")
                    .long("eggs-dir")
                    .required(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Directory holding installed eggs"),
            )
            .arg(
                Arg::new("python")
                    .long("python")
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Python interpreter used to run pip"),
            )
            .arg(
                Arg::new("index_url")
                    .long("index-url")
                    .help("Base URL of the package index"),
            )
            .arg(
                Arg::new("find_links")
                    .long("find-links")
                    .action(ArgAction::Append)
                    .help("Additional location to search for archives"),
            )
            .arg(
                Arg::new("quiet")
                    .long("quiet")
                    .action(ArgAction::SetTrue)
                    .help("Ask pip to produce less output"),
            )
            .arg(
                Arg::new("python_version")
                    .long("python-version")
                    .help("Python version tag for egg names, e.g. 3.9"),
            )
            .arg(
                Arg::new("platform")
                    .long("platform")
                    .help("Platform tag installed eggs must match"),
            ),
    );

    let app = app.subcommand(
        Command::new("scan")
            .about("List distributions found in a directory")
            .arg(
                Arg::new("path")
                    .required(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Directory to scan"),
            ),
    );

    let matches = app.get_matches();

    let log_level = match matches.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("fetch", args)) => command_fetch(args),
        Some(("scan", args)) => command_scan(args),
        _ => Err(anyhow!("invalid sub-command")),
    }
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            1
        }
    };

    std::process::exit(exit_code)
}
