// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: Node.js version
fn version_arg(required: bool) -> Arg {
    let arg = Arg::new("version").help("Node.js version (\"lts\", \"20\", \"20.11.1\")");
    if required {
        arg.required(true)
    } else {
        arg.long("version")
    }
}

/// Common argument: portable-only planning
fn portable_only_arg() -> Arg {
    Arg::new("portable_only")
        .long("portable-only")
        .action(ArgAction::SetTrue)
        .help("Only consider the portable strategy")
}

fn build_cli() -> Command {
    Command::new("npmkit")
        .version(env!("CARGO_PKG_VERSION"))
        .author("npmkit Contributors")
        .about("Provision Node.js and drive npm")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("More output (-v debug, -vv trace)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Only warnings and errors"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Config file (default: $NPMKIT_HOME/config.toml)"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .global(true)
                .help("Root for portable installs"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("detect").about("Show the detected platform"))
        .subcommand(
            Command::new("plan")
                .about("Show the installation strategies for this host, in order")
                .arg(version_arg(false))
                .arg(portable_only_arg()),
        )
        .subcommand(
            Command::new("provision")
                .about("Install Node.js using the first strategy that succeeds")
                .arg(version_arg(false))
                .arg(portable_only_arg())
                .arg(
                    Arg::new("no_sudo")
                        .long("no-sudo")
                        .action(ArgAction::SetTrue)
                        .help("Never prefix installer commands with sudo"),
                ),
        )
        .subcommand(
            Command::new("install")
                .about("Download and register a portable Node.js version")
                .arg(version_arg(true)),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove a portable Node.js version")
                .arg(version_arg(true)),
        )
        .subcommand(Command::new("list").about("List portable Node.js versions"))
        .subcommand(
            Command::new("npm")
                .about("Run npm from a portable version (or \"system\")")
                .arg(Arg::new("version").required(true).help("Installed version or \"system\""))
                .arg(Arg::new("args").last(true).num_args(0..).help("Arguments passed to npm"))
                .arg(
                    Arg::new("dir")
                        .short('C')
                        .long("dir")
                        .value_name("DIR")
                        .help("Project directory to run in"),
                ),
        )
        .subcommand(
            Command::new("batch")
                .about("Run commands in parallel, reporting each result in order")
                .arg(Arg::new("jobs").short('j').long("jobs").help("Worker slots"))
                .arg(
                    Arg::new("stop_on_error")
                        .long("stop-on-error")
                        .action(ArgAction::SetTrue)
                        .help("Skip commands not yet started once one fails"),
                )
                .arg(
                    Arg::new("commands")
                        .required(true)
                        .num_args(1..)
                        .help("Commands, one per argument"),
                ),
        )
        .subcommand(
            Command::new("outdated")
                .about("List dependencies with newer published versions")
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .default_value("package.json")
                        .help("Path to package.json or its directory"),
                )
                .arg(
                    Arg::new("node")
                        .long("node")
                        .default_value("system")
                        .help("Installed version whose npm to use"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("npmkit.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
