mod ast;
mod compile;
mod dump;
mod scan;

pub use ast::*;
pub use compile::*;
pub use dump::*;
pub use scan::*;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{arg, command, ArgMatches, Command};
use figment::providers::{Format, Toml};
use figment::Figment;
use lexre::{Lexer, LexerGenerator};
use serde::Deserialize;

use crate::config::DumpConfig;
use crate::{commands, help, APP_HELP_TEMPLATE};

pub fn command(name: &'static str) -> Command {
    Command::new(name).help_template(
        r#"{about-with-newline}
{usage-heading}
  {usage}

{all-args}
"#,
    )
}

pub fn cli() -> Command {
    command!()
        .arg_required_else_help(true)
        .arg(
            arg!(-C --config <CONFIG_FILE> "Config file")
                .value_parser(existing_path_parser)
                .long_help(help::CONFIG_FILE),
        )
        .help_template(APP_HELP_TEMPLATE)
        .subcommand_required(true)
        .subcommands(vec![
            commands::ast(),
            commands::compile(),
            commands::dump(),
            commands::scan(),
        ])
}

/// A token as it appears in a tokens file.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct TokenEntry {
    pub name: String,
    pub regex: String,
    #[serde(default)]
    pub subroutine_only: bool,
}

/// Contents of a tokens file, which is a TOML file with an array of
/// `[[token]]` tables.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct TokensFile {
    #[serde(default, rename = "token")]
    pub tokens: Vec<TokenEntry>,
}

/// Reads the tokens file at `path`.
pub fn load_tokens_file(path: &Path) -> anyhow::Result<TokensFile> {
    Figment::new()
        .merge(Toml::file_exact(path))
        .extract()
        .with_context(|| format!("can not read `{}`", path.display()))
}

/// Creates a [`LexerGenerator`] with all the tokens in the tokens file at
/// `path`, in the same order they appear in the file.
pub fn load_generator(
    path: &Path,
    little_endian: bool,
) -> anyhow::Result<LexerGenerator> {
    let mut generator = LexerGenerator::new().little_endian(little_endian);

    for token in load_tokens_file(path)?.tokens {
        generator.define_token(
            &token.name,
            &token.regex,
            token.subroutine_only,
        )?;
    }

    Ok(generator)
}

/// Generates a lexer for the tokens file at `path`.
pub fn generate_lexer(
    path: &Path,
    little_endian: bool,
) -> anyhow::Result<Lexer> {
    Ok(load_generator(path, little_endian)?.generate()?)
}

/// Decides the byte order from the `--big-endian` flag and the config.
fn little_endian(args: &ArgMatches, config: &DumpConfig) -> bool {
    config.little_endian && !args.get_flag("big-endian")
}

/// Parses a path and makes sure that it exists.
fn existing_path_parser(input: &str) -> Result<PathBuf, anyhow::Error> {
    let path = PathBuf::from(input);
    if path.try_exists()? {
        Ok(path)
    } else {
        Err(anyhow!("file not found"))
    }
}
