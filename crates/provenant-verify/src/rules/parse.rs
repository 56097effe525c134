//! Artifact rule grammar.
//!
//! ```text
//! REQUIRE  "<pattern>"
//! ALLOW    "<pattern>"
//! DISALLOW "<pattern>"
//! MATCH    "<pattern>" [IN "<prefix>"] WITH "<field>" [IN "<prefix>"]
//! MISMATCH "<pattern>" [IN "<prefix>"] WITH "<field>" [IN "<prefix>"]
//! ```
//!
//! Keywords are upper case. Operands are double-quoted strings (with
//! `\"`, `\\`, `\n`, and `\t` escapes) or back-quoted raw strings.

use std::str::FromStr;

use super::pattern::Pattern;
use crate::error::VerificationError;

/// One parsed artifact rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRule {
    /// The pattern must match; matches are consumed.
    Require(Pattern),
    /// Matches are consumed.
    Allow(Pattern),
    /// Nothing may match.
    Disallow(Pattern),
    /// Matches equal to their counterpart in a snapshot are consumed.
    Match(RelationalRule),
    /// Matches that differ from their counterpart in a snapshot are consumed.
    Mismatch(RelationalRule),
}

/// Operands of `MATCH` and `MISMATCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalRule {
    /// The pattern as written, without the source prefix.
    pub pattern: String,
    /// Prefix prepended to the pattern when selecting source artifacts.
    pub source_prefix: Option<String>,
    /// Snapshot key to compare against, e.g. `build.products`.
    pub field: String,
    /// Prefix prepended to destination names.
    pub destination_prefix: Option<String>,
    /// The source prefix and pattern, compiled.
    pub source: Pattern,
}

impl RelationalRule {
    /// The snapshot name a matched source artifact is compared against.
    pub fn destination_name(&self, source_name: &str) -> String {
        let base = if self.pattern.contains('*') {
            self.source_prefix
                .as_deref()
                .and_then(|prefix| source_name.strip_prefix(prefix))
                .unwrap_or(source_name)
        } else {
            self.pattern.as_str()
        };
        match &self.destination_prefix {
            Some(prefix) => format!("{prefix}{base}"),
            None => base.to_owned(),
        }
    }
}

impl FromStr for ArtifactRule {
    type Err = VerificationError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let tokens = lex(source)?;
        Parser {
            source,
            tokens,
            pos: 0,
        }
        .rule()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Keyword(String),
    Str(String),
}

fn parse_error(rule: &str, reason: impl Into<String>) -> VerificationError {
    VerificationError::Parse {
        rule: rule.to_owned(),
        reason: reason.into(),
    }
}

fn lex(source: &str) -> Result<Vec<Token>, VerificationError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => {
                                let reason = format!("unknown escape `\\{other}`");
                                return Err(parse_error(source, reason));
                            }
                            None => return Err(parse_error(source, "unterminated string")),
                        },
                        Some(ch) => text.push(ch),
                        None => return Err(parse_error(source, "unterminated string")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '`' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(ch) => text.push(ch),
                        None => return Err(parse_error(source, "unterminated raw string")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '"' || ch == '`' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Keyword(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn rule(mut self) -> Result<ArtifactRule, VerificationError> {
        let verb = match self.next() {
            Some(Token::Keyword(word)) => word,
            Some(Token::Str(text)) => {
                return Err(self.error(format!("expected a rule keyword, found string \"{text}\"")));
            }
            None => return Err(self.error("empty rule")),
        };

        let rule = match verb.as_str() {
            "REQUIRE" => ArtifactRule::Require(Pattern::new(&self.string("pattern")?)?),
            "ALLOW" => ArtifactRule::Allow(Pattern::new(&self.string("pattern")?)?),
            "DISALLOW" => ArtifactRule::Disallow(Pattern::new(&self.string("pattern")?)?),
            "MATCH" => ArtifactRule::Match(self.relational()?),
            "MISMATCH" => ArtifactRule::Mismatch(self.relational()?),
            other => return Err(self.error(format!("unknown rule keyword `{other}`"))),
        };

        if let Some(token) = self.next() {
            return Err(self.error(format!("unexpected trailing {}", describe(&token))));
        }
        Ok(rule)
    }

    fn relational(&mut self) -> Result<RelationalRule, VerificationError> {
        let pattern = self.string("pattern")?;
        let source_prefix = self.optional_prefix()?;
        self.keyword("WITH")?;
        let field = self.string("field")?;
        let destination_prefix = self.optional_prefix()?;

        let source = Pattern::new(&format!(
            "{}{pattern}",
            source_prefix.as_deref().unwrap_or("")
        ))?;
        Ok(RelationalRule {
            pattern,
            source_prefix,
            field,
            destination_prefix,
            source,
        })
    }

    fn optional_prefix(&mut self) -> Result<Option<String>, VerificationError> {
        if matches!(self.peek(), Some(Token::Keyword(word)) if word == "IN") {
            self.pos += 1;
            return self.string("prefix").map(Some);
        }
        Ok(None)
    }

    fn keyword(&mut self, expected: &str) -> Result<(), VerificationError> {
        match self.next() {
            Some(Token::Keyword(word)) if word == expected => Ok(()),
            Some(token) => Err(self.error(format!(
                "expected `{expected}`, found {}",
                describe(&token)
            ))),
            None => Err(self.error(format!("expected `{expected}`, found end of rule"))),
        }
    }

    fn string(&mut self, what: &str) -> Result<String, VerificationError> {
        match self.next() {
            Some(Token::Str(text)) => Ok(text),
            Some(token) => Err(self.error(format!(
                "expected quoted {what}, found {}",
                describe(&token)
            ))),
            None => Err(self.error(format!("expected quoted {what}, found end of rule"))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, reason: impl Into<String>) -> VerificationError {
        parse_error(self.source, reason)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Keyword(word) => format!("`{word}`"),
        Token::Str(text) => format!("string \"{text}\""),
    }
}
