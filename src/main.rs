use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::{Arg, ArgMatches, Command};
use lox::runner::{self, EXIT_NO_INPUT};

fn main() -> ExitCode {
    init_tracing();

    let launch = Launch::from_matches(&cli().get_matches());

    let status = match &launch.file {
        Some(file_path) => run_file(file_path),
        None => ExitCode::SUCCESS,
    };
    if launch.repl {
        lox::start_repl();
    }
    status
}

fn cli() -> Command {
    Command::new("lox")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A tree-walking interpreter for the Lox scripting language")
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start the REPL (after running FILE, if one is given)")
                .action(clap::ArgAction::SetTrue),
        )
}

/// What to do once arguments are parsed: run a file, start the REPL, or both.
#[derive(Debug, PartialEq)]
struct Launch {
    file: Option<String>,
    repl: bool,
}

impl Launch {
    fn from_matches(matches: &ArgMatches) -> Self {
        let file = matches.get_one::<String>("file").cloned();
        let repl = file.is_none() || matches.get_flag("interactive");
        Self { file, repl }
    }
}

fn run_file(path: &str) -> ExitCode {
    let path = Path::new(path);

    match fs::read_to_string(path) {
        Ok(source) => {
            let filename = path.to_string_lossy();
            runner::run(&source, Some(&*filename)).exit_code()
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            ExitCode::from(EXIT_NO_INPUT)
        }
    }
}

/// Diagnostics go to stderr, and only when `RUST_LOG` asks for them.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(EnvFilter::from_default_env())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(args: &[&str]) -> Launch {
        let matches = cli()
            .try_get_matches_from(std::iter::once("lox").chain(args.iter().copied()))
            .unwrap();
        Launch::from_matches(&matches)
    }

    #[test]
    fn interactive_flag_opens_repl_after_file() {
        assert_eq!(
            launch(&["script.lox", "-i"]),
            Launch {
                file: Some("script.lox".to_string()),
                repl: true,
            }
        );
        assert_eq!(
            launch(&["--interactive", "script.lox"]),
            Launch {
                file: Some("script.lox".to_string()),
                repl: true,
            }
        );
    }

    #[test]
    fn file_alone_runs_without_repl() {
        assert_eq!(
            launch(&["script.lox"]),
            Launch {
                file: Some("script.lox".to_string()),
                repl: false,
            }
        );
    }

    #[test]
    fn no_arguments_start_the_repl() {
        assert_eq!(launch(&[]), Launch { file: None, repl: true });
        assert_eq!(launch(&["-i"]), Launch { file: None, repl: true });
    }
}
