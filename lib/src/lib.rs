/*! A regular expression engine with a bytecode compiler and a priority-ranked
NFA virtual machine, plus a lexer generator built on top of it.

Regular expressions are parsed into an AST, compiled into a compact bytecode
program, and executed by a virtual machine that simulates an NFA with many
lightweight threads. When several threads accept at the same time, the VM
chooses one of them deterministically, according to the decisions that each
thread took at every fork.

Most users will want the [`lexer`] module: define some tokens with a
[`LexerGenerator`], generate a [`Lexer`], and use it for finding tokens in
some text.

# Example

```rust
# use lexre::LexerGenerator;
let mut generator = LexerGenerator::new();

generator.define_token("int", "0|[1-9][0-9]*", false).unwrap();
generator.define_token("id", "[A-Za-z_][A-Za-z0-9_]*", false).unwrap();

let lexer = generator.generate().unwrap();

let names: Vec<_> = lexer
    .scan("foo 42 bar")
    .map(|item| item.unwrap().0.name.as_str())
    .collect();

assert_eq!(names, ["id", "int", "id"]);
```
*/

pub use lexer::Lexer;
pub use lexer::LexerGenerator;
pub use lexer::SerializationError;
pub use lexer::Token;

pub use re::vm::MatchResult;
pub use re::TokenKey;

pub mod lexer;
pub mod re;
