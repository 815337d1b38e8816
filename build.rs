// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: list of package requests
fn packages_arg(required: bool) -> Arg {
    Arg::new("packages")
        .num_args(1..)
        .required(required)
        .value_name("PACKAGE")
        .help("Package as name, name.arch or name.arch.version")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).action(ArgAction::SetTrue).help(help)
}

fn build_cli() -> Command {
    Command::new("googet")
        .version(env!("CARGO_PKG_VERSION"))
        .author("GooGet Contributors")
        .about("Package manager with prioritized repositories and rollback repos")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .value_name("DIR")
                .help("Installation root (overrides GOOGETROOT)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level unless RUST_LOG is set"),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages and their dependencies")
                .arg(packages_arg(true))
                .arg(flag("reinstall", "Reinstall packages that are already installed")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove packages and everything that depends on them")
                .arg(packages_arg(true))
                .arg(flag(
                    "dbonly",
                    "Only drop the database records; skip scripts and file deletion",
                )),
        )
        .subcommand(
            Command::new("update").about("Move installed packages to the winning repository version"),
        )
        .subcommand(Command::new("check").about("Show available updates without applying them"))
        .subcommand(
            Command::new("clean")
                .about("Delete entries from the download cache")
                .arg(flag("all", "Delete everything in the cache"))
                .arg(
                    Arg::new("packages")
                        .long("packages")
                        .value_delimiter(',')
                        .value_name("NAMES")
                        .help("Comma-separated names whose cached archives are deleted"),
                ),
        )
        .subcommand(
            Command::new("addrepo")
                .about("Add a repository")
                .arg(Arg::new("name").required(true).help("Repository name"))
                .arg(Arg::new("url").required(true).help("Repository base URL"))
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_name("NAME.repo")
                        .help("Repo file to add the entry to"),
                )
                .arg(
                    Arg::new("priority")
                        .long("priority")
                        .default_value("default")
                        .help("Integer or one of Default, Canary, Pin, Rollback"),
                ),
        )
        .subcommand(
            Command::new("rmrepo")
                .about("Remove a repository by name")
                .arg(Arg::new("name").required(true).help("Repository name")),
        )
        .subcommand(Command::new("listrepos").about("List configured repositories"))
        .subcommand(
            Command::new("installed")
                .about("List installed packages")
                .arg(Arg::new("filter").help("Only show packages whose name contains this string"))
                .arg(flag("info", "Show full package details")),
        )
        .subcommand(
            Command::new("verify")
                .about("Check installed files and run verify scripts")
                .arg(packages_arg(false)),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("googet.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
