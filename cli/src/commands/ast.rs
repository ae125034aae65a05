use std::path::PathBuf;

use anyhow::anyhow;
use clap::{arg, value_parser, ArgMatches, Command};
use lexre::lexer::Error;
use lexre::LexerGenerator;

use crate::commands::{existing_path_parser, load_generator};
use crate::help;

/// Name given to the regexp passed in the command line.
const MAIN_TOKEN: &str = "main";

pub fn ast() -> Command {
    super::command("ast")
        .about("Show the syntax tree for a regexp")
        .long_about(help::AST_LONG_HELP)
        .arg(
            arg!(<PATTERN>)
                .help("Regular expression")
                .value_parser(value_parser!(String)),
        )
        // Keep options sorted alphabetically by their long name.
        // For instance, --bar goes before --foo.
        .arg(
            arg!(-t --"tokens" <TOKENS_FILE>)
                .help("Tokens that the regexp can refer to")
                .long_help(help::TOKENS_FILE_LONG_HELP)
                .value_parser(existing_path_parser),
        )
}

pub fn exec_ast(args: &ArgMatches) -> anyhow::Result<()> {
    let pattern = args.get_one::<String>("PATTERN").unwrap();

    let mut generator = match args.get_one::<PathBuf>("tokens") {
        Some(tokens_path) => load_generator(tokens_path, true)?,
        None => LexerGenerator::new(),
    };

    match generator.define_token(MAIN_TOKEN, pattern, false) {
        Ok(_) => {}
        Err(Error::InvalidToken { err, .. }) => {
            return Err(anyhow!(
                "{}\n\n  {}\n  {}^",
                err.kind(),
                pattern,
                " ".repeat(err.position())
            ));
        }
        Err(err) => return Err(err.into()),
    }

    let definition = generator
        .token_definition(MAIN_TOKEN)
        .ok_or_else(|| anyhow!("token `{}` is not defined", MAIN_TOKEN))?;
    let tree = definition.ast().ascii_tree(definition.root());

    let mut output = String::new();
    ascii_tree::write_tree(&mut output, &tree)?;
    print!("{}", output);

    Ok(())
}
