/*! Closed intervals of code points.

Terminal nodes in the AST, and the `TEST_RANGE`/`TEST_RANGES` instructions in
the bytecode, describe the characters they accept as lists of [`Interval`].
This module provides the interval type itself, functions for merging and
negating lists of intervals, and the named character classes used by escape
sequences (`\s`, `\w`, ...) and POSIX bracket expressions (`[:alpha:]`, ...).
*/

use std::fmt::{Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Largest valid Unicode code point.
pub const MAX_CODE_POINT: u32 = 0x10FFFF;

/// A closed interval `[min, max]` of code points.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct Interval {
    min: u32,
    max: u32,
}

impl Interval {
    /// Creates an interval from its two ends, in any order.
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    /// Creates an interval that contains a single code point.
    pub fn single(c: u32) -> Self {
        Self { min: c, max: c }
    }

    /// Interval that contains every code point.
    pub fn any() -> Self {
        Self { min: 0, max: MAX_CODE_POINT }
    }

    #[inline]
    pub fn min(&self) -> u32 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Returns true if the interval contains a single code point.
    #[inline]
    pub fn is_single(&self) -> bool {
        self.min == self.max
    }

    /// Returns true if `c` is within the interval.
    #[inline]
    pub fn contains(&self, c: u32) -> bool {
        self.min <= c && c <= self.max
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:#x}-{:#x}]", self.min, self.max)
    }
}

/// Sorts the intervals and coalesces those that overlap or are adjacent.
///
/// The result is the shortest list of disjoint, non-adjacent intervals that
/// contains exactly the same code points as the input.
pub fn merge<I>(intervals: I) -> Vec<Interval>
where
    I: IntoIterator<Item = Interval>,
{
    intervals
        .into_iter()
        .sorted()
        .coalesce(|prev, next| {
            if next.min <= prev.max.saturating_add(1) {
                Ok(Interval::new(prev.min, prev.max.max(next.max)))
            } else {
                Err((prev, next))
            }
        })
        .collect()
}

/// Returns the intervals that contain every code point in
/// `0..=MAX_CODE_POINT` that is not contained in `intervals`.
pub fn negate<I>(intervals: I) -> Vec<Interval>
where
    I: IntoIterator<Item = Interval>,
{
    let mut result = Vec::new();
    let mut next_min = 0_u32;

    for interval in merge(intervals) {
        if interval.min > MAX_CODE_POINT {
            break;
        }
        if interval.min > next_min {
            result.push(Interval::new(next_min, interval.min - 1));
        }
        next_min = interval.max.saturating_add(1);
    }

    if next_min <= MAX_CODE_POINT {
        result.push(Interval::new(next_min, MAX_CODE_POINT));
    }

    result
}

/// Returns true if `c` is contained in any of the intervals.
pub fn contains(intervals: &[Interval], c: u32) -> bool {
    intervals.iter().any(|interval| interval.contains(c))
}

/// Named sets of code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Lower,
    Upper,
    Digit,
    Graph,
    Print,
    Alpha,
    Alnum,
    Blank,
    Space,
    XDigit,
    Cntrl,
    Word,
    /// Negation of [`CharClass::Space`], used by `\S`.
    NonSpace,
    /// Negation of [`CharClass::Word`], used by `\W`.
    NonWord,
}

impl CharClass {
    /// Returns the class that corresponds to a POSIX class name, like the
    /// `alpha` in `[:alpha:]`.
    pub fn from_posix_name(name: &str) -> Option<Self> {
        let class = match name {
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "digit" => Self::Digit,
            "graph" => Self::Graph,
            "print" => Self::Print,
            "alpha" => Self::Alpha,
            "alnum" => Self::Alnum,
            "blank" => Self::Blank,
            "space" => Self::Space,
            "xdigit" => Self::XDigit,
            "cntrl" => Self::Cntrl,
            "word" => Self::Word,
            _ => return None,
        };
        Some(class)
    }

    /// Returns the intervals that form the class. The intervals are not
    /// necessarily sorted nor merged.
    pub fn intervals(&self) -> Vec<Interval> {
        const SPACE: Interval = Interval { min: 0x20, max: 0x20 };
        const TAB: Interval = Interval { min: 0x09, max: 0x09 };
        const DOC_CTRL_CODES: Interval = Interval { min: 0x09, max: 0x0D };
        const LOWER: Interval = Interval { min: 0x61, max: 0x7A };
        const UPPER: Interval = Interval { min: 0x41, max: 0x5A };
        const DIGIT: Interval = Interval { min: 0x30, max: 0x39 };
        const GRAPH: Interval = Interval { min: 0x21, max: 0x7E };
        const UNDERSCORE: Interval = Interval { min: 0x5F, max: 0x5F };
        const DEL: Interval = Interval { min: 0x7F, max: 0x7F };

        match self {
            Self::Lower => vec![LOWER],
            Self::Upper => vec![UPPER],
            Self::Digit => vec![DIGIT],
            Self::Graph => vec![GRAPH],
            Self::Print => vec![SPACE, GRAPH],
            Self::Alpha => vec![LOWER, UPPER],
            Self::Alnum => vec![LOWER, UPPER, DIGIT],
            Self::Blank => vec![SPACE, TAB],
            Self::Space => vec![SPACE, DOC_CTRL_CODES],
            Self::XDigit => vec![
                DIGIT,
                Interval::new(0x41, 0x46),
                Interval::new(0x61, 0x66),
            ],
            Self::Cntrl => vec![DEL, Interval::new(0x00, 0x1F)],
            Self::Word => vec![LOWER, UPPER, DIGIT, UNDERSCORE],
            Self::NonSpace => negate(Self::Space.intervals()),
            Self::NonWord => negate(Self::Word.intervals()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{merge, negate, CharClass, Interval, MAX_CODE_POINT};

    #[test]
    fn merge_overlapping_and_adjacent() {
        assert_eq!(
            merge([
                Interval::new(0x61, 0x63),
                Interval::single(0x30),
                Interval::new(0x62, 0x66),
                Interval::new(0x67, 0x68),
                Interval::new(0x31, 0x31),
            ]),
            vec![Interval::new(0x30, 0x31), Interval::new(0x61, 0x68)]
        );
    }

    #[test]
    fn negate_intervals() {
        assert_eq!(
            negate([Interval::new(0x41, 0x5A), Interval::single(0)]),
            vec![Interval::new(1, 0x40), Interval::new(0x5B, MAX_CODE_POINT)]
        );

        assert_eq!(negate([Interval::any()]), Vec::<Interval>::new());
        assert_eq!(negate(Vec::<Interval>::new()), vec![Interval::any()]);
    }

    #[test]
    fn classes() {
        assert_eq!(
            CharClass::from_posix_name("xdigit"),
            Some(CharClass::XDigit)
        );
        assert_eq!(CharClass::from_posix_name("foo"), None);

        assert_eq!(
            merge(CharClass::Space.intervals()),
            vec![Interval::new(0x09, 0x0D), Interval::single(0x20)]
        );

        assert_eq!(
            CharClass::NonWord.intervals(),
            vec![
                Interval::new(0x00, 0x2F),
                Interval::new(0x3A, 0x40),
                Interval::new(0x5B, 0x5E),
                Interval::single(0x60),
                Interval::new(0x7B, MAX_CODE_POINT),
            ]
        );
    }
}
