//! Version values and constraints.
//!
//! A [`VersionValue`] is an ordered list of numeric or textual segments
//! (`1.7.0beta` is `[1, 7, 0, beta]`). Numeric segments compare numerically,
//! textual ones lexically, and a textual segment sorts below a numeric one so
//! pre-release tags come before the release. Missing trailing segments count
//! as zero, which makes `1.2` equal to `1.2.0`.

use crate::error::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static EMBEDDED_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.[0-9A-Za-z]+)+").expect("embedded version pattern is valid")
});

/// One component of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Number(u64),
    Text(String),
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

const PADDING: Segment = Segment::Number(0);

/// An immutable, comparable version.
#[derive(Debug, Clone)]
pub struct VersionValue {
    raw: String,
    segments: Vec<Segment>,
}

impl VersionValue {
    /// Parse a version string such as `1.2.3`, `v2.0-rc1` or `1.7.0beta`.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let body = raw
            .strip_prefix(['v', 'V'])
            .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
            .unwrap_or(raw);

        if body.is_empty() {
            return Err(Error::VersionStr(input.to_string()));
        }

        let mut segments = Vec::new();
        for piece in body.split(['.', '-', '_', '+']) {
            if piece.is_empty() || !piece.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(Error::VersionStr(input.to_string()));
            }
            split_piece(piece, &mut segments).ok_or_else(|| Error::VersionStr(input.to_string()))?;
        }

        if !matches!(segments.first(), Some(Segment::Number(_))) {
            return Err(Error::VersionStr(input.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Find the first version-looking token in free text, such as the
    /// output of `git --version`.
    pub fn extract(text: &str) -> Option<Self> {
        EMBEDDED_VERSION
            .find_iter(text)
            .find_map(|m| Self::parse(m.as_str()).ok())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn segment(&self, index: usize) -> &Segment {
        self.segments.get(index).unwrap_or(&PADDING)
    }
}

/// Split `0beta2` into `[0, beta, 2]`.
fn split_piece(piece: &str, out: &mut Vec<Segment>) -> Option<()> {
    let mut current = String::new();
    let mut numeric = None;

    for c in piece.chars() {
        let is_digit = c.is_ascii_digit();
        if numeric.is_some_and(|n| n != is_digit) {
            out.push(to_segment(&current, numeric == Some(true))?);
            current.clear();
        }
        numeric = Some(is_digit);
        current.push(c);
    }
    if !current.is_empty() {
        out.push(to_segment(&current, numeric == Some(true))?);
    }
    Some(())
}

fn to_segment(text: &str, numeric: bool) -> Option<Segment> {
    if numeric {
        text.parse().ok().map(Segment::Number)
    } else {
        Some(Segment::Text(text.to_ascii_lowercase()))
    }
}

impl FromStr for VersionValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Ord for VersionValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| self.segment(i).cmp(other.segment(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for VersionValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for VersionValue {}

impl fmt::Display for VersionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Comparison operator of a [`VersionConstraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
    /// `~>`: at least the bound, with every segment but the last pinned
    Pessimistic,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Pessimistic => "~>",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operator plus a bound, e.g. `>= 1.2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub operator: Operator,
    pub bound: VersionValue,
}

impl VersionConstraint {
    pub fn new(operator: Operator, bound: VersionValue) -> Self {
        Self { operator, bound }
    }

    /// Parse `~> 1.2.3`, `>=1.0` or a bare `1.2` (meaning `== 1.2`).
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim();
        let (operator, rest) = [
            ("~>", Operator::Pessimistic),
            (">=", Operator::Ge),
            ("<=", Operator::Le),
            ("==", Operator::Eq),
            (">", Operator::Gt),
            ("<", Operator::Lt),
            ("=", Operator::Eq),
        ]
        .iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((Operator::Eq, text));

        Ok(Self {
            operator,
            bound: VersionValue::parse(rest)?,
        })
    }

    pub fn matches(&self, candidate: &VersionValue) -> bool {
        match self.operator {
            Operator::Eq => candidate == &self.bound,
            Operator::Ge => candidate >= &self.bound,
            Operator::Le => candidate <= &self.bound,
            Operator::Gt => candidate > &self.bound,
            Operator::Lt => candidate < &self.bound,
            Operator::Pessimistic => {
                let last = self.bound.segments.len() - 1;
                (0..last).all(|i| candidate.segment(i) == self.bound.segment(i))
                    && candidate.segment(last) >= self.bound.segment(last)
            }
        }
    }

    /// Check a raw version string; anything unparsable does not match.
    pub fn matches_str(&self, candidate: &str) -> bool {
        VersionValue::parse(candidate).is_ok_and(|v| self.matches(&v))
    }
}

impl FromStr for VersionConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator, self.bound)
    }
}

/// A command name with an optional version constraint, as written in a
/// `provides` list: `rg`, `git >= 2.30`, `ruby ~> 3.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequirement {
    pub command: String,
    pub constraint: Option<VersionConstraint>,
}

impl CommandRequirement {
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim();
        let split = text
            .find(|c: char| c.is_whitespace() || "=<>~".contains(c))
            .unwrap_or(text.len());
        let (command, rest) = text.split_at(split);
        if command.is_empty() {
            return Err(Error::VersionStr(input.to_string()));
        }

        let rest = rest.trim();
        let constraint = if rest.is_empty() {
            None
        } else {
            Some(VersionConstraint::parse(rest)?)
        };

        Ok(Self {
            command: command.to_string(),
            constraint,
        })
    }

    /// Whether `version_output` (what the command prints about its own
    /// version) satisfies the constraint. Output without a recognisable
    /// version never satisfies a constraint.
    pub fn satisfied_by(&self, version_output: &str) -> bool {
        match &self.constraint {
            None => true,
            Some(constraint) => {
                VersionValue::extract(version_output).is_some_and(|v| constraint.matches(&v))
            }
        }
    }
}

impl fmt::Display for CommandRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(c) => write!(f, "{} {}", self.command, c),
            None => f.write_str(&self.command),
        }
    }
}
