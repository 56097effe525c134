//! Artifact name patterns.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::VerificationError;

/// A literal artifact name, or a glob where `*` matches any run of
/// characters.
///
/// A glob matches any name containing a run of characters it accepts;
/// it is not anchored, so `*.tmp` matches `scratch.tmp.bak`. Every
/// character other than `*` matches itself, so `lib.so*` does not match
/// `libxso`.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches exactly one name.
    Literal(String),
    /// Matches any name the compiled expression accepts.
    Glob {
        /// The glob as written.
        source: String,
        /// The regular expression it compiles to.
        regex: Regex,
    },
}

/// Upper bound on the compiled size of a glob, in bytes.
pub const GLOB_SIZE_LIMIT: usize = 1 << 20;

impl Pattern {
    /// Compile a pattern; it is a glob when it contains `*`.
    ///
    /// Literal pieces are escaped, so compilation only fails when the glob
    /// exceeds [`GLOB_SIZE_LIMIT`].
    pub fn new(source: &str) -> Result<Self, VerificationError> {
        if !source.contains('*') {
            return Ok(Self::Literal(source.to_owned()));
        }
        let body = source
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = RegexBuilder::new(&body)
            .size_limit(GLOB_SIZE_LIMIT)
            .build()
            .map_err(|e| VerificationError::InvalidGlob {
                pattern: source.to_owned(),
                source: e,
            })?;
        Ok(Self::Glob {
            source: source.to_owned(),
            regex,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(name) => name,
            Self::Glob { source, .. } => source,
        }
    }

    /// Whether the pattern contains a wildcard.
    pub const fn is_glob(&self) -> bool {
        matches!(self, Self::Glob { .. })
    }

    /// Whether `name` matches.
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == name,
            Self::Glob { regex, .. } => regex.is_match(name),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.is_glob() == other.is_glob() && self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
