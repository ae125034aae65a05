use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{arg, ArgMatches, Command};
use lexre::Lexer;
use log::*;
use yansi::Color::{Cyan, Yellow};
use yansi::Paint;

use crate::commands::{existing_path_parser, generate_lexer};
use crate::config::ScanConfig;
use crate::help;

#[rustfmt::skip]
pub fn scan() -> Command {
    super::command("scan")
        .about("Split a file into tokens")
        .long_about(help::SCAN_LONG_HELP)
        .arg(
            arg!(<LEXER_PATH>)
                .help("Path to a tokens file, or to a compiled lexer")
                .long_help(help::TOKENS_FILE_LONG_HELP)
                .value_parser(existing_path_parser)
        )
        .arg(
            arg!(<INPUT_FILE>)
                .help("Path to the file that will be scanned")
                .value_parser(existing_path_parser)
        )
        // Keep options sorted alphabetically by their long name.
        // For instance, --bar goes before --foo.
        .arg(
            arg!(-C --"compiled-lexer")
                .help("Indicate that LEXER_PATH is a file with a compiled lexer")
                .long_help(help::COMPILED_LEXER_LONG_HELP)
        )
        .arg(
            arg!(-r --"print-range")
                .help("Print the byte range of each token")
        )
        .arg(
            arg!(-t --"print-text")
                .help("Print the text of each token")
        )
}

pub fn exec_scan(args: &ArgMatches, config: ScanConfig) -> anyhow::Result<()> {
    let lexer_path = args.get_one::<PathBuf>("LEXER_PATH").unwrap();
    let input_path = args.get_one::<PathBuf>("INPUT_FILE").unwrap();

    let print_text = config.print_text || args.get_flag("print-text");
    let print_range = config.print_range || args.get_flag("print-range");

    let lexer = if args.get_flag("compiled-lexer") {
        load_compiled_lexer(lexer_path)?
    } else {
        generate_lexer(lexer_path, true)?
    };

    let input = fs::read_to_string(input_path).with_context(|| {
        format!("can not read `{}`", input_path.display())
    })?;

    let mut count = 0;

    for item in lexer.scan(input.as_str()) {
        let (token, result) = item?;
        let mut line = token.name.as_str().paint(Cyan).bold().to_string();
        if print_text {
            let text = format!("{:?}", result.text);
            line.push_str(&format!(" {}", text.paint(Yellow)));
        }
        if print_range {
            line.push_str(&format!(
                " [{}, {})",
                result.range.start, result.range.end
            ));
        }
        println!("{}", line);
        count += 1;
    }

    info!("{} tokens found in `{}`", count, input_path.display());

    Ok(())
}

fn load_compiled_lexer(path: &Path) -> anyhow::Result<Lexer> {
    let file = File::open(path)
        .with_context(|| format!("can not open `{}`", path.display()))?;

    Lexer::deserialize_from(file).with_context(|| {
        format!("error deserializing `{}`", path.display())
    })
}
