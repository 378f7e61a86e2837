//! `.env` style key/value files
//!
//! Values are kept in an [`EnvFile`] and handed to child processes
//! explicitly. Nothing here touches the environment of the running process.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{TmdlError, TmdlResult};
use crate::storage::read_text;

/// Default file name looked up in the project root
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Key/value pairs loaded from an env file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    vars: BTreeMap<String, String>,
}

impl EnvFile {
    /// Parse `KEY=VALUE` lines
    ///
    /// Blank lines, `#` comments and lines without `=` are ignored. Keys and
    /// values are trimmed and one layer of surrounding quotes is removed from
    /// values. A repeated key keeps the last value.
    pub fn parse(text: &str) -> Self {
        let vars = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { vars }
    }

    /// Load `path`, or an empty set when the file does not exist
    pub fn load_optional(path: &Path) -> TmdlResult<Self> {
        match read_text(path) {
            Ok(text) => {
                let env = Self::parse(&text);
                debug!(path = %path.display(), vars = env.len(), "Loaded env file");
                Ok(env)
            }
            Err(TmdlError::FileNotFound(_)) => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Pairs in key order, ready for `Command::envs`
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keys only, for logging without leaking secrets
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse() {
        let env = EnvFile::parse(
            "# credentials\nAZURE_OPENAI_API_KEY = \"abc=123\"\n\nAZURE_OPENAI_ENDPOINT='https://x'\nnot a pair\n=orphan\n",
        );
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("AZURE_OPENAI_API_KEY"), Some("abc=123"));
        assert_eq!(env.get("AZURE_OPENAI_ENDPOINT"), Some("https://x"));
        assert_eq!(
            env.keys().collect::<Vec<_>>(),
            vec!["AZURE_OPENAI_API_KEY", "AZURE_OPENAI_ENDPOINT"]
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let env = EnvFile::load_optional(&temp.path().join(DEFAULT_ENV_FILE)).unwrap();
        assert!(env.is_empty());
    }
}
