use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::{arg, value_parser, ArgMatches, Command};

use crate::commands::{existing_path_parser, generate_lexer, little_endian};
use crate::config::DumpConfig;
use crate::help;

pub fn compile() -> Command {
    super::command("compile")
        .about("Compile a tokens file to binary form")
        .arg(
            arg!(<TOKENS_FILE>)
                .help("Path to a TOML file with token definitions")
                .long_help(help::TOKENS_FILE_LONG_HELP)
                .value_parser(existing_path_parser),
        )
        // Keep options sorted alphabetically by their long name.
        // For instance, --bar goes before --foo.
        .arg(
            arg!(-b --"big-endian")
                .help("Encode instruction operands in big-endian order")
                .long_help(help::BIG_ENDIAN_LONG_HELP),
        )
        .arg(
            arg!(-o --"output" <OUTPUT_PATH>)
                .help("Output file with the compiled lexer")
                .default_value("output.lxc")
                .value_parser(value_parser!(PathBuf)),
        )
}

pub fn exec_compile(
    args: &ArgMatches,
    config: DumpConfig,
) -> anyhow::Result<()> {
    let tokens_path = args.get_one::<PathBuf>("TOKENS_FILE").unwrap();
    let output_path = args.get_one::<PathBuf>("output").unwrap();

    let lexer = generate_lexer(tokens_path, little_endian(args, &config))?;

    let output_file = File::create(output_path).with_context(|| {
        format!("can not write `{}`", output_path.display())
    })?;

    Ok(lexer.serialize_into(&output_file)?)
}
