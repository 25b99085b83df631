//! Prerequisite expressions.
//!
//! Both SCORM editions normalize to [`PrerequisiteExpr`]. SCORM 1.2 declares
//! prerequisites as an AICC script string (`item_1&item_2|~item_3`), parsed by
//! [`PrerequisiteExpr::parse_script`]. SCORM 2004 rule sets are translated by
//! [`crate::simple_sequencing`]. The tree is built once at ingestion and then
//! evaluated against a learner's attempts as often as needed.
//!
//! # Script grammar
//!
//! ```text
//! expr   := and ('|' and)*
//! and    := unary ('&' unary)*
//! unary  := '~' unary | atom
//! atom   := '(' expr ')'
//!         | COUNT '*' '{' expr (',' expr)* '}'
//!         | IDENT (('=' | '<>') STATUS)?
//! ```
//!
//! A bare identifier is true once that item is completed. `STATUS` is a
//! quoted lesson status (`"passed"`, `"failed"`, ...) or its one-letter code.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attempt::{CompletionStatus, SuccessStatus};

/// Deepest nesting of negations, groups and sets a script may use.
pub const MAX_EXPRESSION_DEPTH: usize = 32;

/// Read access to a learner's attempt state, keyed by SCO identifier.
///
/// Missing records must report `NotAttempted` / `Unknown` / not attempted.
pub trait AttemptLookup {
    /// Completion status recorded for the SCO.
    fn completion_status(&self, sco_id: &str) -> CompletionStatus;
    /// Success status recorded for the SCO.
    fn success_status(&self, sco_id: &str) -> SuccessStatus;
    /// Whether the learner has launched the SCO at least once.
    fn attempted(&self, sco_id: &str) -> bool;
}

/// Boolean expression over SCO completion predicates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrerequisiteExpr {
    /// No restriction.
    #[default]
    Always,
    /// The SCO's completion status is `completed`.
    Completed(String),
    /// The SCO's success status is `passed`.
    Passed(String),
    /// The SCO's success status is `failed`.
    Failed(String),
    /// The SCO has been launched at least once.
    Attempted(String),
    /// Negation.
    Not(Box<PrerequisiteExpr>),
    /// All terms hold.
    And(Vec<PrerequisiteExpr>),
    /// At least one term holds.
    Or(Vec<PrerequisiteExpr>),
    /// At least `count` of the terms hold.
    AtLeast {
        /// Required number of true terms.
        count: usize,
        /// Candidate terms.
        of: Vec<PrerequisiteExpr>,
    },
}

/// Why a prerequisite script was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// A character that belongs to no token.
    #[error("unexpected character '{ch}' at offset {position}")]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Byte offset in the script.
        position: usize,
    },

    /// A quoted status was never closed.
    #[error("unterminated string starting at offset {position}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },

    /// A token appeared where the grammar does not allow it.
    #[error("unexpected '{token}' at offset {position}")]
    UnexpectedToken {
        /// Rendering of the token.
        token: String,
        /// Byte offset in the script.
        position: usize,
    },

    /// The script ended in the middle of an expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// A comparison used a status outside the lesson status vocabulary.
    #[error("unknown lesson status '{0}'")]
    UnknownStatus(String),

    /// A set count is not a valid number.
    #[error("invalid set count '{0}'")]
    InvalidCount(String),

    /// Negations, groups or sets nest deeper than the parser accepts.
    #[error("expression nests deeper than {limit} levels at offset {position}")]
    TooDeep {
        /// The nesting limit.
        limit: usize,
        /// Byte offset where the limit was crossed.
        position: usize,
    },
}

impl PrerequisiteExpr {
    /// Shorthand for [`PrerequisiteExpr::Completed`].
    #[must_use]
    pub fn completed(id: impl Into<String>) -> Self {
        Self::Completed(id.into())
    }

    /// Shorthand for [`PrerequisiteExpr::Passed`].
    #[must_use]
    pub fn passed(id: impl Into<String>) -> Self {
        Self::Passed(id.into())
    }

    /// Wraps an expression in [`PrerequisiteExpr::Not`].
    #[must_use]
    pub fn negate(expr: Self) -> Self {
        Self::Not(Box::new(expr))
    }

    /// Returns `true` for the unrestricted expression.
    #[must_use]
    pub const fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }

    /// Evaluates the expression against a learner's attempts.
    ///
    /// `And`, `Or` and `AtLeast` stop as soon as the outcome is known.
    pub fn evaluate<A: AttemptLookup + ?Sized>(&self, attempts: &A) -> bool {
        match self {
            Self::Always => true,
            Self::Completed(id) => attempts.completion_status(id) == CompletionStatus::Completed,
            Self::Passed(id) => attempts.success_status(id) == SuccessStatus::Passed,
            Self::Failed(id) => attempts.success_status(id) == SuccessStatus::Failed,
            Self::Attempted(id) => attempts.attempted(id),
            Self::Not(inner) => !inner.evaluate(attempts),
            Self::And(terms) => terms.iter().all(|term| term.evaluate(attempts)),
            Self::Or(terms) => terms.iter().any(|term| term.evaluate(attempts)),
            Self::AtLeast { count, of } => {
                of.iter()
                    .filter(|term| term.evaluate(attempts))
                    .take(*count)
                    .count()
                    >= *count
            }
        }
    }

    /// Every identifier the expression refers to, sorted.
    #[must_use]
    pub fn referenced_ids(&self) -> BTreeSet<&str> {
        let mut ids = BTreeSet::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Always => {}
            Self::Completed(id) | Self::Passed(id) | Self::Failed(id) | Self::Attempted(id) => {
                out.insert(id.as_str());
            }
            Self::Not(inner) => inner.collect_ids(out),
            Self::And(terms) | Self::Or(terms) | Self::AtLeast { of: terms, .. } => {
                for term in terms {
                    term.collect_ids(out);
                }
            }
        }
    }

    /// Rewrites the expression into an equivalent, flatter form.
    ///
    /// Removes double negation, pushes a negation through an `Or`/`And`
    /// whose terms are all negated, flattens nested `And`/`Or`, and drops
    /// `Always` from conjunctions.
    #[must_use]
    pub fn simplify(self) -> Self {
        match self {
            Self::Not(inner) => match inner.simplify() {
                Self::Not(x) => *x,
                Self::Or(terms) if terms.iter().all(|t| matches!(t, Self::Not(_))) => {
                    Self::conjunction(terms.into_iter().map(Self::into_negation))
                }
                Self::And(terms) if terms.iter().all(|t| matches!(t, Self::Not(_))) => {
                    Self::disjunction(terms.into_iter().map(Self::into_negation))
                }
                other => Self::negate(other),
            },
            Self::And(terms) => Self::conjunction(terms.into_iter().map(Self::simplify)),
            Self::Or(terms) => Self::disjunction(terms.into_iter().map(Self::simplify)),
            Self::AtLeast { count, of } => Self::AtLeast {
                count,
                of: of.into_iter().map(Self::simplify).collect(),
            },
            leaf => leaf,
        }
    }

    fn into_negation(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::negate(other),
        }
    }

    /// Builds a flattened `And`, collapsing trivial cases.
    pub(crate) fn conjunction(terms: impl IntoIterator<Item = Self>) -> Self {
        let mut flat = Vec::new();
        for term in terms {
            match term {
                Self::Always => {}
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        collapse(flat, Self::And).unwrap_or(Self::Always)
    }

    /// Builds a flattened `Or`, collapsing trivial cases.
    pub(crate) fn disjunction(terms: impl IntoIterator<Item = Self>) -> Self {
        let mut flat = Vec::new();
        for term in terms {
            match term {
                Self::Always => return Self::Always,
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        collapse(flat, Self::Or).unwrap_or_else(|| Self::Or(Vec::new()))
    }

    /// Parses a SCORM 1.2 (AICC script) prerequisite string.
    ///
    /// An empty or whitespace-only script means no restriction.
    ///
    /// ```
    /// use scorm_engine::PrerequisiteExpr;
    ///
    /// let expr = PrerequisiteExpr::parse_script("item_1&item_2|~item_3").unwrap();
    /// assert_eq!(expr.to_string(), "item_1 & item_2 | ~item_3");
    /// ```
    pub fn parse_script(input: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Ok(Self::Always);
        }

        let mut parser = ScriptParser {
            tokens,
            cursor: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        match parser.tokens.get(parser.cursor) {
            None => Ok(expr),
            Some((position, token)) => Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
                position: *position,
            }),
        }
    }

    fn is_compound(&self) -> bool {
        match self {
            Self::And(terms) | Self::Or(terms) => terms.len() > 1,
            _ => false,
        }
    }
}

/// `None` for an empty list, the single term for a one-element list.
fn collapse(
    mut terms: Vec<PrerequisiteExpr>,
    wrap: fn(Vec<PrerequisiteExpr>) -> PrerequisiteExpr,
) -> Option<PrerequisiteExpr> {
    match terms.len() {
        0 => None,
        1 => terms.pop(),
        _ => Some(wrap(terms)),
    }
}

impl fmt::Display for PrerequisiteExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Completed(id) => f.write_str(id),
            Self::Passed(id) => write!(f, "{id}=\"passed\""),
            Self::Failed(id) => write!(f, "{id}=\"failed\""),
            Self::Attempted(id) => write!(f, "{id}<>\"not attempted\""),
            Self::Not(inner) if inner.is_compound() => write!(f, "~({inner})"),
            Self::Not(inner) => write!(f, "~{inner}"),
            Self::And(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    if matches!(term, Self::Or(_)) && term.is_compound() {
                        write!(f, "({term})")?;
                    } else {
                        write!(f, "{term}")?;
                    }
                }
                Ok(())
            }
            Self::Or(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
            Self::AtLeast { count, of } => {
                write!(f, "{count}*{{")?;
                for (i, term) in of.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{term}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// ============================================================================
// Script tokenizer and parser
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    And,
    Or,
    Not,
    Open,
    Close,
    SetOpen,
    SetClose,
    Times,
    Comma,
    Equals,
    NotEquals,
    Text(String),
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("&"),
            Self::Or => f.write_str("|"),
            Self::Not => f.write_str("~"),
            Self::Open => f.write_str("("),
            Self::Close => f.write_str(")"),
            Self::SetOpen => f.write_str("{"),
            Self::SetClose => f.write_str("}"),
            Self::Times => f.write_str("*"),
            Self::Comma => f.write_str(","),
            Self::Equals => f.write_str("="),
            Self::NotEquals => f.write_str("<>"),
            Self::Text(text) => write!(f, "\"{text}\""),
            Self::Ident(ident) => f.write_str(ident),
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':')
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '&' => Token::And,
            '|' => Token::Or,
            '~' => Token::Not,
            '(' => Token::Open,
            ')' => Token::Close,
            '{' => Token::SetOpen,
            '}' => Token::SetClose,
            '*' => Token::Times,
            ',' => Token::Comma,
            '=' => Token::Equals,
            '<' if chars.next_if(|&(_, c)| c == '>').is_some() => Token::NotEquals,
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, c)) => text.push(c),
                        None => return Err(ExpressionError::UnterminatedString { position }),
                    }
                }
                Token::Text(text)
            }
            c if is_ident_char(c) => {
                let mut ident = String::from(c);
                while let Some((_, c)) = chars.next_if(|&(_, c)| is_ident_char(c)) {
                    ident.push(c);
                }
                Token::Ident(ident)
            }
            other => {
                return Err(ExpressionError::UnexpectedChar {
                    ch: other,
                    position,
                })
            }
        };
        tokens.push((position, token));
    }

    Ok(tokens)
}

struct ScriptParser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    depth: usize,
}

impl ScriptParser {
    /// Runs `parse` one nesting level down, failing past the depth limit.
    fn nested<T>(
        &mut self,
        position: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(ExpressionError::TooDeep {
                limit: MAX_EXPRESSION_DEPTH,
                position,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, token)| token)
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let next = self.tokens.get(self.cursor).cloned();
        if next.is_some() {
            self.cursor += 1;
        }
        next
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        match self.advance() {
            Some((_, token)) if &token == expected => Ok(()),
            Some((position, token)) => Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> Result<PrerequisiteExpr, ExpressionError> {
        let mut terms = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.cursor += 1;
            terms.push(self.parse_and()?);
        }
        Ok(collapse(terms, PrerequisiteExpr::Or).unwrap_or_default())
    }

    fn parse_and(&mut self) -> Result<PrerequisiteExpr, ExpressionError> {
        let mut terms = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.cursor += 1;
            terms.push(self.parse_unary()?);
        }
        Ok(collapse(terms, PrerequisiteExpr::And).unwrap_or_default())
    }

    fn parse_unary(&mut self) -> Result<PrerequisiteExpr, ExpressionError> {
        if let Some((position, Token::Not)) = self.tokens.get(self.cursor) {
            let position = *position;
            self.cursor += 1;
            let inner = self.nested(position, Self::parse_unary)?;
            return Ok(PrerequisiteExpr::negate(inner));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<PrerequisiteExpr, ExpressionError> {
        match self.advance() {
            Some((position, Token::Open)) => self.nested(position, |parser| {
                let inner = parser.parse_or()?;
                parser.expect(&Token::Close)?;
                Ok(inner)
            }),
            Some((position, Token::Ident(ident))) => match self.peek() {
                Some(Token::Times) => {
                    self.cursor += 1;
                    self.nested(position, |parser| parser.parse_set(&ident))
                }
                Some(Token::Equals) => {
                    self.cursor += 1;
                    let status = self.parse_status()?;
                    status_predicate(ident, &status)
                }
                Some(Token::NotEquals) => {
                    self.cursor += 1;
                    let status = self.parse_status()?;
                    status_predicate(ident, &status).map(PrerequisiteExpr::negate)
                }
                _ => Ok(PrerequisiteExpr::Completed(ident)),
            },
            Some((position, token)) => Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn parse_set(&mut self, count: &str) -> Result<PrerequisiteExpr, ExpressionError> {
        let count: usize = count
            .parse()
            .map_err(|_| ExpressionError::InvalidCount(count.to_string()))?;

        self.expect(&Token::SetOpen)?;
        let mut of = vec![self.parse_or()?];
        while self.peek() == Some(&Token::Comma) {
            self.cursor += 1;
            of.push(self.parse_or()?);
        }
        self.expect(&Token::SetClose)?;

        Ok(PrerequisiteExpr::AtLeast { count, of })
    }

    fn parse_status(&mut self) -> Result<String, ExpressionError> {
        match self.advance() {
            Some((_, Token::Text(text) | Token::Ident(text))) => Ok(text),
            Some((position, token)) => Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

/// Translates `id = "status"` into predicates.
fn status_predicate(id: String, status: &str) -> Result<PrerequisiteExpr, ExpressionError> {
    let expr = match status.trim().to_ascii_lowercase().as_str() {
        "passed" | "p" => PrerequisiteExpr::Passed(id),
        "completed" | "c" => PrerequisiteExpr::Completed(id),
        "failed" | "f" => PrerequisiteExpr::Failed(id),
        "browsed" | "b" => PrerequisiteExpr::Attempted(id),
        "incomplete" | "i" => PrerequisiteExpr::And(vec![
            PrerequisiteExpr::Attempted(id.clone()),
            PrerequisiteExpr::negate(PrerequisiteExpr::Completed(id)),
        ]),
        "not attempted" | "n" => PrerequisiteExpr::negate(PrerequisiteExpr::Attempted(id)),
        _ => return Err(ExpressionError::UnknownStatus(status.to_string())),
    };
    Ok(expr)
}
