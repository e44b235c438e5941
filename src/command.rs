//! Command paths: `/nil/db/data/create`.
//!
//! A command covers every command it is a prefix of, so longer paths are
//! narrower capabilities.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TokenError;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Command(Vec<String>);

impl Command {
    /// Parse slash-separated text. `/` alone is the empty (broadest) command.
    pub fn parse(text: &str) -> Result<Self, TokenError> {
        let rest = text
            .strip_prefix('/')
            .ok_or_else(|| TokenError::Malformed(format!("command must start with '/': {text:?}")))?;
        if rest.is_empty() {
            return Ok(Self(Vec::new()));
        }
        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(TokenError::Malformed(format!("empty command segment: {text:?}")));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// `true` if `self` is a prefix of `other`.
    pub fn covers(&self, other: &Command) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Append one segment, producing a narrower command.
    pub fn join(&self, segment: &str) -> Result<Self, TokenError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(TokenError::Malformed(format!("bad command segment: {segment:?}")));
        }
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Ok(Self(segments))
    }
}

impl FromStr for Command {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Command {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({self})")
    }
}
