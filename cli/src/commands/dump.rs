use std::path::PathBuf;

use clap::{arg, ArgMatches, Command};
use itertools::Itertools;
use lexre::re::instr::ByteOrder;
use yansi::Paint;

use crate::commands::{existing_path_parser, generate_lexer, little_endian};
use crate::config::DumpConfig;
use crate::help;

/// Creates the `dump` command.
/// The `dump` command shows the bytecode generated for a tokens file.
pub fn dump() -> Command {
    super::command("dump")
        .about("Show the bytecode generated for a tokens file")
        .long_about(help::DUMP_LONG_HELP)
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
}

/// Executes the `dump` command.
pub fn exec_dump(args: &ArgMatches, config: DumpConfig) -> anyhow::Result<()> {
    let tokens_path = args.get_one::<PathBuf>("TOKENS_FILE").unwrap();
    let lexer = generate_lexer(tokens_path, little_endian(args, &config))?;
    let bytecode = lexer.bytecode();

    let byte_order = match bytecode.byte_order() {
        ByteOrder::LittleEndian => "little-endian",
        ByteOrder::BigEndian => "big-endian",
    };

    println!("{} {}", "byte order:".bold(), byte_order);

    println!("\n{}", "tokens:".bold());
    for token in lexer.tokens() {
        println!("  {}", token);
    }

    println!("\n{}", "intervals:".bold());
    for (index, interval) in bytecode.intervals().iter().enumerate() {
        println!("  {}: {}", index, interval);
    }

    println!("\n{}", "interval sets:".bold());
    for (index, set) in bytecode.interval_sets().iter().enumerate() {
        println!("  {}: {}", index, set.iter().join(", "));
    }

    println!("\n{}{}", "code:".bold(), bytecode);

    Ok(())
}
