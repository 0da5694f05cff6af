use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use bxmlrs::apk::ApkFacade;
use bxmlrs::chunk::DecodeOptions;
use bxmlrs::logger::StderrLogger;
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the APK to inspect.
    apk: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let apk = ApkFacade::open_with(&args.apk, Box::new(StderrLogger), DecodeOptions::default())
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("failed to open {}", args.apk.display()))?;

    println!("package: {}", apk.package_name().unwrap_or_default());
    println!("version_name: {}", apk.version_name().unwrap_or_default());
    println!("version_code: {}", apk.version_code().unwrap_or_default());
    println!("app_name: {}", apk.app_name().unwrap_or_default());
    println!("main_activity: {}", apk.main_activity());
    println!("icon_path: {}", apk.icon_path().unwrap_or_default());
    println!("sha1: {}", apk.sha1());

    Ok(())
}
