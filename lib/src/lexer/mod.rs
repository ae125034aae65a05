/*! Lexer generator built on top of the regexp engine.

A [`LexerGenerator`] keeps a registry of token definitions. Each token has a
name, a regexp and a key that is assigned sequentially when the token is
defined for the first time. Regexps can refer to tokens defined before them
with the `{name}` syntax, which calls the code of the referenced token as a
subroutine. Tokens marked as subroutine-only can be used that way, but they
are never produced by the lexer on their own.

[`LexerGenerator::generate`] compiles every defined token into a single
program and returns a [`Lexer`]. When more than one token matches at the
same position, the lexer produces the one with the longest match, and among
those with the same length, the one that was defined first.

```rust
# use lexre::lexer::LexerGenerator;
let mut generator = LexerGenerator::new();

generator.define_token("kw_var", "var", false).unwrap();
generator.define_token("id", "[A-Za-z_$][A-Za-z0-9_$]*", false).unwrap();

let lexer = generator.generate().unwrap();
let m = lexer.find("variable", 0).unwrap().unwrap();

assert_eq!(lexer.token(m.token_key).unwrap().name, "id");
assert_eq!(m.text, "variable");
```
*/

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io::{BufWriter, Read, Write};
use std::{fmt, io};

use bincode::Options;
use log::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::re;
use crate::re::ast::{Ast, NodeId, Operator};
use crate::re::bytecode::Bytecode;
use crate::re::emitter::CodeEmitter;
use crate::re::instr::ByteOrder;
use crate::re::parser::{self, RegexParser};
use crate::re::vm::{MatchResult, Matches, RegexVm};
use crate::re::TokenKey;


const MAGIC: &[u8] = b"LEXRE";

/// Errors returned while defining tokens or generating a lexer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The regexp of a token could not be parsed.
    #[error("invalid regexp for token `{name}`: {err}")]
    InvalidToken { name: String, err: parser::Error },

    /// Code generation failed.
    #[error(transparent)]
    Re(#[from] re::Error),
}

/// Errors returned while serializing/deserializing a lexer.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("not a lexre compiled lexer file")]
    InvalidFormat,

    #[error("invalid lexre compiled lexer file")]
    InvalidEncoding(#[from] bincode::Error),

    #[error(transparent)]
    IoError(#[from] io::Error),
}

/// Describes a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub key: TokenKey,
    pub name: String,
    /// Source code of the regexp.
    pub regex: String,
    /// If true, the token can only be called from other tokens.
    pub subroutine_only: bool,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} /{}/", self.key, self.name, self.regex)?;
        if self.subroutine_only {
            write!(f, " (subroutine only)")?;
        }
        Ok(())
    }
}

/// A token together with the AST of its regexp.
#[derive(Debug)]
pub struct TokenDefinition {
    token: Token,
    ast: Ast,
    root: NodeId,
}

impl TokenDefinition {
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    #[inline]
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Root of the token's AST, an [`Operator::Accept`] node.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }
}

/// Registry of token definitions that produces a [`Lexer`].
#[derive(Debug, Default)]
pub struct LexerGenerator {
    key_seq: TokenKey,
    definitions: BTreeMap<TokenKey, TokenDefinition>,
    names: FxHashMap<String, TokenKey>,
    byte_order: ByteOrder,
    parser: RegexParser,
}

impl LexerGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specifies whether the code of generated lexers uses little-endian
    /// (the default) or big-endian operands.
    pub fn little_endian(mut self, yes: bool) -> Self {
        self.byte_order = ByteOrder::from_little_endian(yes);
        self
    }

    /// Number of defined tokens.
    #[inline]
    pub fn token_count(&self) -> usize {
        self.names.len()
    }

    /// Returns the definition of the token with the given name.
    pub fn token_definition(&self, name: &str) -> Option<&TokenDefinition> {
        self.names.get(name).and_then(|key| self.definitions.get(key))
    }

    /// Defines a token and returns its key.
    ///
    /// If a token with the same name already exists, its definition is
    /// replaced and it keeps the same key. The regexp may refer to the token
    /// itself, or to any token already defined, with `{name}`.
    ///
    /// If the regexp is invalid the registry is left as it was before the
    /// call.
    pub fn define_token(
        &mut self,
        name: &str,
        regex: &str,
        subroutine_only: bool,
    ) -> Result<TokenKey, Error> {
        let (key, is_new) = match self.names.get(name) {
            Some(key) => (*key, false),
            None => {
                let key = self.key_seq;
                self.key_seq += 1;
                self.names.insert(name.to_string(), key);
                (key, true)
            }
        };

        let (ast, root) = match self.parser.parse(regex, key, &self.names) {
            Ok(parsed) => parsed,
            Err(err) => {
                if is_new {
                    self.names.remove(name);
                    self.key_seq -= 1;
                }
                debug!("token `{}` rejected: {}", name, err);
                return Err(Error::InvalidToken { name: name.to_string(), err });
            }
        };

        debug!("token `{}` defined with key {}", name, key);

        self.definitions.insert(
            key,
            TokenDefinition {
                token: Token {
                    key,
                    name: name.to_string(),
                    regex: regex.to_string(),
                    subroutine_only,
                },
                ast,
                root,
            },
        );

        Ok(key)
    }

    /// Removes a token, returning its key. The key is not assigned again
    /// until [`LexerGenerator::undefine_all_tokens`] is called.
    pub fn undefine_token(&mut self, name: &str) -> Option<TokenKey> {
        let key = self.names.remove(name)?;
        self.definitions.remove(&key);
        debug!("token `{}` with key {} undefined", name, key);
        Some(key)
    }

    /// Removes all tokens. Keys are assigned from zero again.
    pub fn undefine_all_tokens(&mut self) {
        self.names.clear();
        self.definitions.clear();
        self.key_seq = 0;
    }

    /// Compiles the defined tokens into a [`Lexer`].
    ///
    /// Fails if some token calls another token that has been undefined
    /// since.
    pub fn generate(&self) -> Result<Lexer, Error> {
        let mut ast = Ast::new();
        let root = ast.add_operator(Operator::RegexAlternation);

        for definition in self.definitions.values() {
            let accept = ast.graft(&definition.ast, definition.root);
            ast.add_child(root, accept)?;
        }

        let tokens = |key: TokenKey| {
            self.definitions.get(&key).map(|d| d.token.subroutine_only)
        };

        let bytecode = CodeEmitter::new()
            .little_endian(self.byte_order == ByteOrder::LittleEndian)
            .emit_code(&ast, root, &tokens)?;

        debug!(
            "lexer generated for {} tokens ({} bytes of code)",
            self.definitions.len(),
            bytecode.code().len()
        );

        Ok(Lexer::new(
            self.definitions
                .iter()
                .map(|(key, definition)| (*key, definition.token.clone()))
                .collect(),
            bytecode,
        ))
    }
}

/// A compiled lexer.
///
/// This is the result from [`LexerGenerator::generate`].
#[derive(Debug, Serialize, Deserialize)]
pub struct Lexer {
    tokens: BTreeMap<TokenKey, Token>,
    #[serde(skip)]
    names: FxHashMap<String, TokenKey>,
    bytecode: Bytecode,
}

impl Lexer {
    fn new(tokens: BTreeMap<TokenKey, Token>, bytecode: Bytecode) -> Self {
        let mut lexer = Self { tokens, names: FxHashMap::default(), bytecode };
        lexer.build_name_index();
        lexer
    }

    fn build_name_index(&mut self) {
        self.names = self
            .tokens
            .values()
            .map(|token| (token.name.clone(), token.key))
            .collect();
    }

    /// Returns the token with the given key.
    pub fn token(&self, key: TokenKey) -> Option<&Token> {
        self.tokens.get(&key)
    }

    /// Returns the token with the given name.
    pub fn token_by_name(&self, name: &str) -> Option<&Token> {
        self.names.get(name).and_then(|key| self.tokens.get(key))
    }

    /// Iterator over all the tokens, in key order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    #[inline]
    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Finds the token that matches at `start`, a byte offset within
    /// `text`.
    pub fn find(
        &self,
        text: &str,
        start: usize,
    ) -> Result<Option<MatchResult>, re::Error> {
        RegexVm::new(&self.bytecode).find(text, start)
    }

    /// Finds all the tokens between `start` and `end`. See
    /// [`RegexVm::find_all`].
    pub fn find_all(
        &self,
        text: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<MatchResult>, re::Error> {
        RegexVm::new(&self.bytecode).find_all(text, start, end)
    }

    /// Returns an iterator over the tokens found in `text`, together with
    /// their descriptions. Text that doesn't match any token is skipped.
    pub fn scan<'a, 't>(&'a self, text: &'t str) -> Scan<'a, 't> {
        Scan {
            lexer: self,
            matches: RegexVm::new(&self.bytecode).matches(text, 0, text.len()),
        }
    }

    /// Serializes the lexer as a sequence of bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializationError> {
        let mut bytes = Vec::new();
        self.serialize_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Deserializes the lexer from a sequence of bytes produced by
    /// [`Lexer::serialize`].
    pub fn deserialize<B>(bytes: B) -> Result<Self, SerializationError>
    where
        B: AsRef<[u8]>,
    {
        let bytes = bytes.as_ref();

        if bytes.len() < MAGIC.len() || &bytes[0..MAGIC.len()] != MAGIC {
            return Err(SerializationError::InvalidFormat);
        }

        // Skip the magic and deserialize the remaining data.
        let mut lexer = bincode::DefaultOptions::new()
            .with_varint_encoding()
            .deserialize::<Self>(&bytes[MAGIC.len()..])?;

        lexer.build_name_index();

        Ok(lexer)
    }

    /// Serializes the lexer into a `writer`.
    pub fn serialize_into<W>(&self, writer: W) -> Result<(), SerializationError>
    where
        W: Write,
    {
        let mut writer = BufWriter::new(writer);

        // Write file header.
        writer.write_all(MAGIC)?;

        // Serialize the lexer.
        Ok(bincode::DefaultOptions::new()
            .with_varint_encoding()
            .serialize_into(writer, self)?)
    }

    /// Deserializes the lexer from a `reader`.
    pub fn deserialize_from<R>(mut reader: R) -> Result<Self, SerializationError>
    where
        R: Read,
    {
        let mut bytes = Vec::new();
        let _ = reader.read_to_end(&mut bytes)?;
        Self::deserialize(bytes)
    }
}

/// Iterator returned by [`Lexer::scan`].
pub struct Scan<'a, 't> {
    lexer: &'a Lexer,
    matches: Matches<'a, 't>,
}

impl<'a, 't> Iterator for Scan<'a, 't> {
    type Item = Result<(&'a Token, MatchResult), re::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.matches.next()? {
            Ok(result) => result,
            Err(err) => return Some(Err(err)),
        };
        match self.lexer.token(result.token_key) {
            Some(token) => Some(Ok((token, result))),
            None => Some(Err(re::Error::UnknownToken(result.token_key))),
        }
    }
}
