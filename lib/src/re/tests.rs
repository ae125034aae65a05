use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use crate::re::ast::{Ast, NodeId, NodeKind, Operator};
use crate::re::bytecode::Bytecode;
use crate::re::emitter::CodeEmitter;
use crate::re::instr::{ByteOrder, Instr, InstrParser};
use crate::re::parser::{ErrorKind, RegexParser};
use crate::re::vm::{MatchResult, RegexVm, Trace};
use crate::re::{Error, TokenKey};

macro_rules! assert_re_code {
    ($re:expr, $code:expr) => {{
        let bytecode = compile($re);
        assert_eq!(bytecode.to_string(), $code);
    }};
}

macro_rules! assert_parse_error {
    ($re:expr, $kind:expr, $position:expr) => {{
        let err = RegexParser::new()
            .parse($re, 0, &FxHashMap::default())
            .unwrap_err();
        assert_eq!((err.kind(), err.position()), (&$kind, $position));
    }};
}

/// Compiles a single regexp as token 0.
fn compile(re: &str) -> Bytecode {
    let (ast, root) =
        RegexParser::new().parse(re, 0, &FxHashMap::default()).unwrap();
    CodeEmitter::new()
        .emit_code(&ast, root, &|_: TokenKey| Some(false))
        .unwrap()
}

fn find(re: &str, text: &str) -> Option<MatchResult> {
    let bytecode = compile(re);
    RegexVm::new(&bytecode).find(text, 0).unwrap()
}

fn m(token_key: TokenKey, text: &str, start: usize, end: usize) -> MatchResult {
    MatchResult { token_key, text: text.to_string(), range: start..end }
}

/// Renders the tree as an s-expression.
fn sexpr(ast: &Ast, id: NodeId) -> String {
    let prefix = if ast.is_group_root(id) { "g:" } else { "" };
    match ast.kind(id) {
        NodeKind::Terminal(intervals) => {
            let printable = |c: u32| {
                char::from_u32(c).filter(|c| c.is_ascii_graphic())
            };
            match intervals.as_slice() {
                [i] if i.is_single() && printable(i.min()).is_some() => {
                    format!("{}{}", prefix, printable(i.min()).unwrap())
                }
                _ => {
                    let parts: Vec<String> = intervals
                        .iter()
                        .map(|i| match (printable(i.min()), printable(i.max()))
                        {
                            (Some(a), Some(_)) if i.is_single() => {
                                a.to_string()
                            }
                            (Some(a), Some(b)) => format!("{}-{}", a, b),
                            _ => i.to_string(),
                        })
                        .collect();
                    format!("{}[{}]", prefix, parts.join(" "))
                }
            }
        }
        NodeKind::Operator(op) => {
            let mut s = format!("{}({}", prefix, op);
            for child in ast.children(id) {
                s.push(' ');
                s.push_str(&sexpr(ast, *child));
            }
            s.push(')');
            s
        }
    }
}

fn parse(re: &str) -> String {
    let mut names = FxHashMap::default();
    names.insert("id".to_string(), 3);
    let (ast, root) = RegexParser::new().parse(re, 0, &names).unwrap();
    sexpr(&ast, root)
}

#[test]
fn parse_concatenation_and_alternation() {
    assert_eq!(parse("abc"), "(accept(0) (concatenation a b c))");
    assert_eq!(parse("a|b|c"), "(accept(0) (alternation a b c))");
    assert_eq!(
        parse("ab|cd"),
        "(accept(0) (alternation (concatenation a b) (concatenation c d)))"
    );
    assert_eq!(parse("a\nb\r\n"), "(accept(0) (concatenation a b))");
}

#[test]
fn parse_groups() {
    assert_eq!(
        parse("(ab)c"),
        "(accept(0) (concatenation g:(concatenation a b) c))"
    );
    assert_eq!(
        parse("(a|b)*?"),
        "(accept(0) (repetition{0,}? g:(alternation a b)))"
    );
    assert_eq!(parse("((a))"), "(accept(0) g:a)");
}

#[test]
fn parse_repetitions() {
    assert_eq!(parse("a*"), "(accept(0) (repetition{0,} a))");
    assert_eq!(parse("a+?"), "(accept(0) (repetition{1,}? a))");
    assert_eq!(parse("a?"), "(accept(0) (repetition{0,1} a))");
    assert_eq!(parse("x{2,5}"), "(accept(0) (repetition{2,5} x))");
    assert_eq!(parse("x{3}"), "(accept(0) (repetition{3,3} x))");
    assert_eq!(parse("x{3,}"), "(accept(0) (repetition{3,} x))");
    assert_eq!(
        parse("ab*"),
        "(accept(0) (concatenation a (repetition{0,} b)))"
    );
}

#[test]
fn parse_classes_and_escapes() {
    assert_eq!(parse("[a-cx]"), "(accept(0) [a-c x])");
    assert_eq!(parse("[x-]"), "(accept(0) [- x])");
    assert_eq!(parse("[[:digit:]_]"), "(accept(0) [0-9 _])");
    assert_eq!(parse("[a[b-c]]"), "(accept(0) [a-c])");
    assert_eq!(parse(r"\d65\x42"), "(accept(0) (concatenation A B))");
    assert_eq!(parse(r"\."), "(accept(0) .)");
    assert_eq!(parse(r"[\]]"), "(accept(0) ])");
    assert_eq!(parse(r"\w"), "(accept(0) [0-9 A-Z _ a-z])");
    assert_eq!(parse("."), "(accept(0) [[0x0-0x10ffff]])");
    assert_eq!(parse("[^]"), "(accept(0) [[0x0-0x10ffff]])");
    assert_eq!(
        parse("[^a]"),
        "(accept(0) [[0x0-0x60] [0x62-0x10ffff]])"
    );
}

#[test]
fn parse_token_calls() {
    assert_eq!(parse("a{id}"), "(accept(0) (concatenation a (call(3))))");
    assert_eq!(
        parse("{id}{id}"),
        "(accept(0) (concatenation (call(3)) (call(3))))"
    );
    assert_eq!(parse("{id}*"), "(accept(0) (repetition{0,} (call(3))))");
}

#[test]
fn parse_errors() {
    assert_parse_error!("", ErrorKind::EmptyExpression, 0);
    assert_parse_error!("^a", ErrorKind::StartAnchor, 0);
    assert_parse_error!("a$", ErrorKind::EndAnchor, 1);
    assert_parse_error!("a)", ErrorKind::UnmatchedCloseParen, 1);
    assert_parse_error!("(a", ErrorKind::UnclosedGroup, 2);
    assert_parse_error!("()", ErrorKind::EmptyExpression, 1);
    assert_parse_error!("a}", ErrorKind::UnexpectedCloseBrace, 1);
    assert_parse_error!("a]", ErrorKind::UnexpectedCloseBracket, 1);
    assert_parse_error!("*a", ErrorKind::NothingToRepeat, 0);
    assert_parse_error!("a|*", ErrorKind::NothingToRepeat, 2);
    assert_parse_error!("a|", ErrorKind::MissingOperand, 2);
    assert_parse_error!("a{2", ErrorKind::UnclosedRepetition, 3);
    assert_parse_error!("a{3,2}", ErrorKind::InvertedRepetition, 1);
    assert_parse_error!("a{1001}", ErrorKind::RepetitionTooLarge, 1);
    assert_parse_error!("a*+", ErrorKind::PossessiveQuantifier, 2);
    assert_parse_error!(r"a\", ErrorKind::IncompleteEscape, 1);
    assert_parse_error!(r"\x", ErrorKind::MissingDigits, 2);
    assert_parse_error!(r"\x110000", ErrorKind::CodePointOutOfRange, 0);
    assert_parse_error!(r"(a)\1", ErrorKind::BackReference, 3);
    assert_parse_error!(r"\u0041", ErrorKind::UnicodeEscape, 0);
    assert_parse_error!(r"\p{L}", ErrorKind::UnicodeCategory, 0);
    assert_parse_error!("[a", ErrorKind::UnclosedClass, 0);
    assert_parse_error!("[]", ErrorKind::EmptyClass, 0);
    assert_parse_error!("[-a]", ErrorKind::MissingRangeLhs, 1);
    assert_parse_error!("[z-a]", ErrorKind::InvertedRange, 2);
    assert_parse_error!("[[:digit:]-a]", ErrorKind::InvalidRangeLhs, 10);
    assert_parse_error!(
        "[[:foo:]]",
        ErrorKind::UnknownPosixClass("foo".to_string()),
        3
    );
    assert_parse_error!("[[:alpha]", ErrorKind::UnclosedPosixClass, 8);
    assert_parse_error!("[[=a=]]", ErrorKind::CharacterEquivalence, 1);
    assert_parse_error!("[[.a.]]", ErrorKind::CollatingSequence, 1);
    assert_parse_error!("[a&&b]", ErrorKind::ClassIntersection, 2);
    assert_parse_error!("[a-[b]]", ErrorKind::ClassDifference, 2);
    assert_parse_error!(r"[\1]", ErrorKind::BackReferenceInClass, 1);
    assert_parse_error!("{1a}", ErrorKind::UnclosedRepetition, 2);
    assert_parse_error!("{1}", ErrorKind::NothingToRepeat, 0);
    assert_parse_error!("{a-b}", ErrorKind::InvalidIdentifier, 2);
    assert_parse_error!("{abc", ErrorKind::UnclosedIdentifier, 4);
    assert_parse_error!(
        "{nope}",
        ErrorKind::UndefinedToken("nope".to_string()),
        0
    );
}

#[test]
fn error_codes() {
    let err = RegexParser::new()
        .parse("^", 0, &FxHashMap::default())
        .unwrap_err();
    assert_eq!(err.code(), 1);

    let err = RegexParser::new()
        .parse("{x}", 0, &FxHashMap::default())
        .unwrap_err();
    assert_eq!(err.code(), 37);
}

#[test]
fn code_concatenation() {
    assert_re_code!(
        "ab",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: TEST_CODE 0x61
00012: TEST_CODE 0x62
00017: END_GROUP 0
00019: CONSUME
0001a: RTS
"#
    );
}

#[test]
fn code_alternation() {
    assert_re_code!(
        "a|b",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: PFORK 00012 0001a
00012: TEST_CODE 0x61
00017: BRA 0001f
0001a: TEST_CODE 0x62
0001f: END_GROUP 0
00021: CONSUME
00022: RTS
"#
    );
}

#[test]
fn code_repetitions() {
    assert_re_code!(
        "a*",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: PFORK 00012 0001a
00012: TEST_CODE 0x61
00017: BRA 0000d
0001a: END_GROUP 0
0001c: CONSUME
0001d: RTS
"#
    );

    assert_re_code!(
        "a*?",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: PFORK 0001a 00012
00012: TEST_CODE 0x61
00017: BRA 0000d
0001a: END_GROUP 0
0001c: CONSUME
0001d: RTS
"#
    );

    assert_re_code!(
        "a{2,3}",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: TEST_CODE 0x61
00012: TEST_CODE 0x61
00017: PFORK 0001c 00021
0001c: TEST_CODE 0x61
00021: END_GROUP 0
00023: CONSUME
00024: RTS
"#
    );
}

#[test]
fn code_classes() {
    assert_re_code!(
        "[a-z]",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: TEST_RANGE 0 [0x61-0x7a]
00012: END_GROUP 0
00014: CONSUME
00015: RTS
"#
    );

    assert_re_code!(
        "[a-z_]",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: TEST_RANGES 0 [0x5f-0x5f] [0x61-0x7a]
00012: END_GROUP 0
00014: CONSUME
00015: RTS
"#
    );
}

#[test]
fn code_groups() {
    assert_re_code!(
        "(a)b",
        r#"
00000: JSR 0000b
00005: ACCEPT 0
0000a: RTS
0000b: BEGIN_GROUP 0
0000d: BEGIN_GROUP 1
0000f: TEST_CODE 0x61
00014: END_GROUP 1
00016: TEST_CODE 0x62
0001b: END_GROUP 0
0001d: CONSUME
0001e: RTS
"#
    );
}

#[test]
fn code_intervals_are_shared() {
    let bytecode = compile("[a-z][a-z_]([a-z]|[a-z_])");
    assert_eq!(bytecode.intervals().len(), 2);
    assert_eq!(bytecode.interval_sets(), &[vec![1, 0]]);
}

#[test]
fn code_big_endian() {
    let (ast, root) =
        RegexParser::new().parse("a", 0, &FxHashMap::default()).unwrap();

    let bytecode = CodeEmitter::new()
        .little_endian(false)
        .emit_code(&ast, root, &|_: TokenKey| Some(false))
        .unwrap();

    assert_eq!(bytecode.byte_order(), ByteOrder::BigEndian);
    assert_eq!(
        bytecode.code(),
        &[
            0x05, 0x00, 0x00, 0x00, 0x0b, // JSR 0000b
            0x07, 0x00, 0x00, 0x00, 0x00, // ACCEPT 0
            0x06, // RTS
            0x0e, 0x00, // BEGIN_GROUP 0
            0x10, 0x00, 0x00, 0x00, 0x61, // TEST_CODE 0x61
            0x0f, 0x00, // END_GROUP 0
            0x0b, // CONSUME
            0x06, // RTS
        ]
    );

    // The disassembly doesn't depend on the byte order.
    assert_eq!(bytecode.to_string(), compile("a").to_string());
}

#[test]
fn code_subroutine_only() {
    let (mut ast, accept) =
        RegexParser::new().parse("a", 0, &FxHashMap::default()).unwrap();

    let root = ast.add_operator(Operator::RegexAlternation);
    ast.add_child(root, accept).unwrap();

    let bytecode = CodeEmitter::new()
        .emit_code(&ast, root, &|_: TokenKey| Some(true))
        .unwrap();

    assert_eq!(
        bytecode.to_string(),
        r#"
00000: RTS
00001: BEGIN_GROUP 0
00003: TEST_CODE 0x61
00008: END_GROUP 0
0000a: CONSUME
0000b: RTS
"#
    );

    // The main code returns without accepting anything.
    assert_eq!(RegexVm::new(&bytecode).find("a", 0), Ok(None));

    assert_eq!(
        CodeEmitter::new().emit_code(&ast, root, &|_: TokenKey| None),
        Err(Error::UnknownToken(0))
    );
}

#[test]
fn code_too_large() {
    let emit = |re: &str| {
        let (mut ast, accept) =
            RegexParser::new().parse(re, 0, &FxHashMap::default()).unwrap();
        let root = ast.add_operator(Operator::RegexAlternation);
        ast.add_child(root, accept).unwrap();
        CodeEmitter::new().emit_code(&ast, root, &|_: TokenKey| Some(false))
    };

    assert!(emit("(a{1000}){1000}").is_ok());
    assert_eq!(emit("((a{1000}){1000}){1000}"), Err(Error::TooLarge));
    assert_eq!(emit("(a{1000,}){1000,2000}"), Err(Error::TooLarge));
}

#[test]
fn instructions_testing_input() {
    assert!(Instr::tests_input(Instr::TEST_CODE));
    assert!(Instr::tests_input(Instr::TEST_RANGE));
    assert!(Instr::tests_input(Instr::TEST_RANGES));
    assert!(!Instr::tests_input(Instr::FORK));
    assert!(!Instr::tests_input(Instr::CONSUME));
}

#[test]
fn jump_targets_are_instruction_boundaries() {
    let bytecode = compile("(ab|c)*d{1,3}[x-z]?(e|f|g)+?");

    let instrs: Vec<(Instr, usize)> =
        bytecode.instructions().collect::<Result<_, _>>().unwrap();

    let mut boundaries: Vec<usize> =
        instrs.iter().map(|(_, addr)| *addr).collect();
    boundaries.push(bytecode.code().len());

    let target = |addr: usize, instr: &Instr, offset: i16| {
        (addr + instr.size()) as isize + offset as isize
    };

    for (instr, addr) in instrs.iter() {
        let targets = match *instr {
            Instr::Bra(offset) => vec![target(*addr, instr, offset)],
            Instr::Fork { goto, new_thread }
            | Instr::PFork { goto, new_thread } => vec![
                target(*addr, instr, goto),
                target(*addr, instr, new_thread),
            ],
            Instr::Jsr(dest) => vec![dest as isize],
            _ => vec![],
        };
        for t in targets {
            assert!(
                boundaries.contains(&(t as usize)),
                "target {:05x} of instruction at {:05x}",
                t,
                addr
            );
        }
    }
}

#[test]
fn decode_errors() {
    assert_eq!(
        InstrParser::decode_instr(&[0x02], 0, ByteOrder::LittleEndian),
        Err(Error::InvalidOpcode { opcode: 0x02, addr: 0 })
    );
    assert_eq!(
        InstrParser::decode_instr(
            &[0x06, 0x10, 0x61],
            1,
            ByteOrder::LittleEndian
        ),
        Err(Error::TruncatedInstruction(1))
    );

    let mut parser =
        InstrParser::new(&[0x06, 0xff, 0x06], ByteOrder::LittleEndian);
    assert_eq!(parser.next(), Some(Ok((Instr::Rts, 0))));
    assert_eq!(
        parser.next(),
        Some(Err(Error::InvalidOpcode { opcode: 0xff, addr: 1 }))
    );
    assert_eq!(parser.next(), None);
}

#[test]
fn vm_literals() {
    assert_eq!(find("ab", "abc"), Some(m(0, "ab", 0, 2)));
    assert_eq!(find("ab", "ac"), None);
    assert_eq!(find("ab", "a"), None);
    assert_eq!(find("ab", ""), None);
}

#[test]
fn vm_repetitions() {
    assert_eq!(find("a*", "aaab"), Some(m(0, "aaa", 0, 3)));
    assert_eq!(find("a*", "b"), Some(m(0, "", 0, 0)));
    assert_eq!(find("a*?", "aaa"), Some(m(0, "", 0, 0)));
    assert_eq!(find("a+?b", "aaab"), Some(m(0, "aaab", 0, 4)));
    assert_eq!(find("a{2,3}", "aaaa"), Some(m(0, "aaa", 0, 3)));
    assert_eq!(find("a{2,3}?", "aaaa"), Some(m(0, "aa", 0, 2)));
    assert_eq!(find("a{2}", "a"), None);
    assert_eq!(find("(a|b)*c", "abbac"), Some(m(0, "abbac", 0, 5)));
}

#[test]
fn vm_alternation_priority() {
    // Alternatives are tried in order, the first one that matches wins.
    assert_eq!(find("a|ab", "ab"), Some(m(0, "a", 0, 1)));
    assert_eq!(find("ab|a", "ab"), Some(m(0, "ab", 0, 2)));
    assert_eq!(find("ab|a", "ac"), Some(m(0, "a", 0, 1)));
}

#[test]
fn vm_classes() {
    assert_eq!(
        find("[a-z_][a-z0-9_]*", "foo_1 bar"),
        Some(m(0, "foo_1", 0, 5))
    );
    assert_eq!(find(r"\s+", " \t\r\nx"), Some(m(0, " \t\r\n", 0, 4)));
    assert_eq!(find("[^0-9]+", "ab1"), Some(m(0, "ab", 0, 2)));
    assert_eq!(find("[[:upper:]]+", "ABc"), Some(m(0, "AB", 0, 2)));
}

#[test]
fn vm_unicode() {
    assert_eq!(find("é+", "ééx"), Some(m(0, "éé", 0, 4)));
    assert_eq!(find("..", "añb"), Some(m(0, "añ", 0, 3)));

    let bytecode = compile("b");
    let vm = RegexVm::new(&bytecode);
    assert_eq!(vm.find("ñb", 2), Ok(Some(m(0, "b", 2, 3))));
    assert_eq!(vm.find("ñb", 1), Err(Error::InvalidPosition(1)));
    assert_eq!(vm.find("ñb", 4), Err(Error::InvalidPosition(4)));
}

#[test]
fn vm_find_is_idempotent() {
    let bytecode = compile("(a|b)+c?");
    let vm = RegexVm::new(&bytecode);
    let first = vm.find("abbaxc", 0).unwrap();
    assert_eq!(first, Some(m(0, "abba", 0, 4)));
    assert_eq!(vm.find("abbaxc", 0).unwrap(), first);
}

#[test]
fn vm_find_all() {
    let bytecode = compile("ab");
    let vm = RegexVm::new(&bytecode);

    assert_eq!(
        vm.find_all("xxabyab", 0, 7),
        Ok(vec![m(0, "ab", 2, 4), m(0, "ab", 5, 7)])
    );

    // Matches must start before the end position, but may extend beyond it.
    assert_eq!(vm.find_all("xxabyab", 0, 4), Ok(vec![m(0, "ab", 2, 4)]));
    assert_eq!(vm.find_all("abab", 0, 2), Ok(vec![m(0, "ab", 0, 2)]));
    assert_eq!(
        vm.find_all("abab", 0, 3),
        Ok(vec![m(0, "ab", 0, 2), m(0, "ab", 2, 4)])
    );
    assert_eq!(vm.find_all("abab", 0, 0), Ok(vec![]));
    assert_eq!(vm.find_all("xxabyab", 3, 100), Ok(vec![m(0, "ab", 5, 7)]));
}

#[test]
fn vm_find_all_zero_width() {
    let bytecode = compile("a*");
    let vm = RegexVm::new(&bytecode);

    // The search stops when a match repeats itself.
    assert_eq!(
        vm.find_all("aab", 0, 3),
        Ok(vec![m(0, "aa", 0, 2), m(0, "", 2, 2)])
    );

    let matches = vm.find_all("aabaa", 0, 5).unwrap();
    assert!(matches
        .windows(2)
        .all(|w| w[0].range.start <= w[1].range.start));
}

#[test]
fn vm_recursion_without_progress() {
    let mut names = FxHashMap::default();
    names.insert("r".to_string(), 0);

    let (ast, root) = RegexParser::new().parse("{r}", 0, &names).unwrap();
    let bytecode = CodeEmitter::new()
        .emit_code(&ast, root, &|_: TokenKey| Some(false))
        .unwrap();

    assert_eq!(RegexVm::new(&bytecode).find("x", 0), Ok(None));
}

#[test]
fn vm_traced() {
    let bytecode = compile("ab");
    let traced = RegexVm::new(&bytecode).find_traced("ab", 0).unwrap().unwrap();

    assert_eq!(traced.result, m(0, "ab", 0, 2));
    assert_eq!(
        traced.trace,
        vec![
            Trace::BeginGroup(0),
            Trace::Consumed('a'),
            Trace::Consumed('b'),
            Trace::EndGroup(0),
        ]
    );

    let bytecode = compile("a|b");
    let traced = RegexVm::new(&bytecode).find_traced("b", 0).unwrap().unwrap();

    assert_eq!(
        traced.trace,
        vec![
            Trace::BeginGroup(0),
            Trace::Fork { addr: 0x0d, preferred: false },
            Trace::Consumed('b'),
            Trace::EndGroup(0),
        ]
    );
}
