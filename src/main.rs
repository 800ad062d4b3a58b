//! Command-line runner for architect build scripts.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use architect::{
    ConfigStore, DEFAULT_FILENAME, DEFAULT_TARGET, Environment, FsLoader, Registry, Scalar,
};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_CACHE: &str = ".architect-cache.json";

/// Run targets from an architect build script
#[derive(Parser)]
#[command(name = "architect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Targets to run
    #[arg(default_value = DEFAULT_TARGET)]
    targets: Vec<String>,

    /// Build script to load
    #[arg(short, long, default_value = DEFAULT_FILENAME)]
    file: PathBuf,

    /// Run independent targets on this many threads (0: one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Define a global variable
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_define)]
    define: Vec<(String, Scalar)>,

    /// Configuration cache (default: .architect-cache.json beside the script)
    #[arg(long)]
    config_cache: Option<PathBuf>,

    /// List the script's targets and exit
    #[arg(long)]
    list: bool,

    /// Print the script in canonical form and exit
    #[arg(long)]
    fmt: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_define(raw: &str) -> Result<(String, Scalar), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    let value = value
        .parse()
        .map_or_else(|_| Scalar::Text(value.to_string()), Scalar::Number);
    Ok((key.to_string(), value))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("architect=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let path = cli.file.display().to_string();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{path}: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), architect::Error> {
    if cli.fmt {
        let source = read_script(&cli.file)?;
        print!("{}", architect::format(&architect::parse(&source)?));
        return Ok(());
    }

    let base = cli
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = cli
        .file
        .file_name()
        .map_or_else(|| DEFAULT_FILENAME.to_string(), |n| n.to_string_lossy().into_owned());
    let cache = cli
        .config_cache
        .clone()
        .unwrap_or_else(|| base.join(CONFIG_CACHE));

    let mut env = Environment::new(Registry::default())
        .with_loader(FsLoader::new(base))
        .with_config(load_cache(&cache));
    for (key, value) in &cli.define {
        env.define(key, value.clone());
    }

    let script = env.load(&name)?;
    if cli.list {
        for target in script.targets() {
            println!("{target}");
        }
        return Ok(());
    }

    let targets: Vec<&str> = cli.targets.iter().map(String::as_str).collect();
    let result = match cli.jobs {
        Some(jobs) if jobs != 1 => env.run_parallel(&script, &targets, jobs),
        _ => env.run_all(&script, &targets),
    };
    save_cache(&cache, env.config());
    result?;
    Ok(())
}

fn read_script(path: &Path) -> Result<String, architect::Error> {
    fs::read_to_string(path).map_err(|source| {
        architect::LoadError::Read {
            file: path.display().to_string(),
            source,
        }
        .into()
    })
}

fn load_cache(path: &Path) -> ConfigStore {
    let Ok(json) = fs::read_to_string(path) else {
        return ConfigStore::new();
    };
    ConfigStore::from_json(&json).unwrap_or_else(|e| {
        warn!(cache = %path.display(), error = %e, "ignoring unreadable config cache");
        ConfigStore::new()
    })
}

fn save_cache(path: &Path, config: &ConfigStore) {
    let written = config
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => debug!(cache = %path.display(), "config cache saved"),
        Err(e) => warn!(cache = %path.display(), error = %e, "cannot save config cache"),
    }
}
