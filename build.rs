//! Renders the `wsgate(1)` manual page from the CLI definition.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
#[allow(dead_code)]
mod cli;

fn man_dir() -> PathBuf {
    env::var_os("CARGO_TARGET_DIR")
        .map_or_else(|| PathBuf::from("target"), PathBuf::from)
        .join("generated-man")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=CARGO_TARGET_DIR");

    let dir = man_dir();
    fs::create_dir_all(&dir)?;

    let page = Man::new(cli::Cli::command().version(env!("CARGO_PKG_VERSION")))
        .section("1")
        .manual("wsgate manual");
    let mut rendered = Vec::new();
    page.render(&mut rendered)?;
    fs::write(dir.join("wsgate.1"), rendered)?;
    Ok(())
}
