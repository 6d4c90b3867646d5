//! sfdl - processes pending SFDL descriptors from the command line.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;

use env_logger::Env;

fn print_usage() {
    eprintln!("Usage: sfdl [OPTIONS]");
    eprintln!();
    eprintln!("Downloads every pending descriptor once, then exits.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>     Config file (default: platform config dir)");
    eprintln!("  -f, --files <DIR>       Directory holding pending descriptors");
    eprintln!("  -d, --downloads <DIR>   Directory receiving downloads");
    eprintln!("  -l, --list              List known descriptors and exit");
    eprintln!("  -h, --help              Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  FILES_DIR, DOWNLOADS_DIR, STATUS_FILE, PASSWORD_FILE, MAX_THREADS,");
    eprintln!("  EXTRACT_ARCHIVES, REMOVE_ARCHIVES, TMDB_API_KEY (also read from .env)");
}

fn value_of(args: &[String], i: usize, flag: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() -> sfdl_engine::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut config_path: Option<PathBuf> = None;
    let mut files_dir: Option<PathBuf> = None;
    let mut downloads_dir: Option<PathBuf> = None;
    let mut list = false;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(value_of(&args, i, "--config")));
            }
            "-f" | "--files" => {
                i += 1;
                files_dir = Some(PathBuf::from(value_of(&args, i, "--files")));
            }
            "-d" | "--downloads" => {
                i += 1;
                downloads_dir = Some(PathBuf::from(value_of(&args, i, "--downloads")));
            }
            "-l" | "--list" => list = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Error: unknown argument {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = sfdl_engine::AppConfig::load(config_path.as_deref())?;
    if let Some(dir) = files_dir {
        config.paths.files_dir = dir;
    }
    if let Some(dir) = downloads_dir {
        config.paths.downloads_dir = dir;
    }

    #[cfg(feature = "cli")]
    {
        sfdl_engine::cli::run(config, list).await
    }
    #[cfg(not(feature = "cli"))]
    {
        let _ = (config, list);
        eprintln!("CLI support not compiled in");
        std::process::exit(1);
    }
}
