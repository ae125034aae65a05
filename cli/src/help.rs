pub const AST_LONG_HELP: &str = r#"Show the syntax tree for a regexp

The regexp is parsed as the definition of a token named `main`. If a tokens file is
given with `--tokens`, the regexp can refer to the tokens in the file with `{name}`.

Example:

lx ast '(\+|\-)?(0|[1-9][0-9]*)'"#;

pub const BIG_ENDIAN_LONG_HELP: &str = r#"Encode instruction operands in big-endian order

By default operands are encoded in little-endian order. The default can be changed
with the `little_endian` option in the `[dump]` section of the config file."#;

pub const COMPILED_LEXER_LONG_HELP: &str = r#"Indicate that <LEXER_PATH> is a file containing a compiled lexer

Lexers can be compiled with the `lx compile` command. The file produced by this
command can be passed later to `lx scan` by using this flag."#;

pub const CONFIG_FILE: &str = r#"Config file for lx

Specifies a config file which controls the behavior of lx. If config file is not
specified, ${HOME}/.lexre.toml is used. If it does not exist the default options are
applied.

Example:

[scan]
print_text = true
print_range = false

[dump]
little_endian = true"#;

pub const DUMP_LONG_HELP: &str = r#"Show the bytecode generated for a tokens file

The output includes the tokens with their keys, the interval tables referenced by
TEST_RANGE and TEST_RANGES instructions, and the disassembled code."#;

pub const SCAN_LONG_HELP: &str = r#"Split a file into tokens

The input file is scanned from the beginning, and every token found is printed in its
own line. Characters that don't start any token are skipped."#;

pub const TOKENS_FILE_LONG_HELP: &str = r#"Path to a TOML file with token definitions

Tokens are defined in order, and when two tokens match the same text the one that
was defined first wins. A token can refer to itself or to the tokens above it with
`{name}`. Tokens marked as `subroutine_only` are never matched on their own.

Example:

[[token]]
name = "digit"
regex = "[0-9]"
subroutine_only = true

[[token]]
name = "int"
regex = "{digit}+""#;
