mod commands;
mod config;
mod help;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::{io, process};

use config::{load_config_from_file, Config};
use crossterm::tty::IsTty;
use yansi::Color::Red;
use yansi::Paint;

use crate::commands::cli;

const APP_HELP_TEMPLATE: &str = r#"lx {version}, a lexer generator built on a bytecode regexp engine.

{before-help}{usage-heading}
  {usage}

{all-args}{after-help}
"#;

const EXIT_ERROR: i32 = 1;
const CONFIG_FILE: &str = ".lexre.toml";

fn main() -> anyhow::Result<()> {
    // Enable support for ANSI escape codes in Windows. In other platforms
    // this is a no-op.
    if let Err(err) = enable_ansi_support::enable_ansi_support() {
        println!("could not enable ANSI support: {}", err)
    }

    #[cfg(feature = "logging")]
    env_logger::init();

    // If stdout is not a tty (for example, because it was redirected to a
    // file) turn off colors. This way you can redirect the output to a file
    // without ANSI escape codes messing up the file content.
    if !io::stdout().is_tty() {
        yansi::disable();
    }

    let args = cli().get_matches();

    // A config file passed explicitly must be valid, while the one in the
    // home directory is ignored if it can't be loaded.
    let config: Config = match args.get_one::<PathBuf>("config") {
        Some(config_file) => match load_config_from_file(config_file) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{} {}", "error:".paint(Red).bold(), err);
                process::exit(EXIT_ERROR);
            }
        },
        None => match home::home_dir() {
            Some(home_path) if !home_path.as_os_str().is_empty() => {
                load_config_from_file(&home_path.join(CONFIG_FILE))
                    .unwrap_or_default()
            }
            _ => Config::default(),
        },
    };

    let result = match args.subcommand() {
        Some(("ast", args)) => commands::exec_ast(args),
        Some(("compile", args)) => commands::exec_compile(args, config.dump),
        Some(("dump", args)) => commands::exec_dump(args, config.dump),
        Some(("scan", args)) => commands::exec_scan(args, config.scan),
        _ => unreachable!(),
    };

    if let Err(err) = result {
        if let Some(source) = err.source() {
            eprintln!("{} {}: {}", "error:".paint(Red).bold(), err, source);
        } else {
            eprintln!("{} {}", "error:".paint(Red).bold(), err);
        }
        process::exit(EXIT_ERROR);
    }

    Ok(())
}
