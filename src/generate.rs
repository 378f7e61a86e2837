//! Fragment generation through an external command
//!
//! Calling a model provider is not done here. A [`Generator`] is anything
//! that writes `<Table>_columns_boss_style.txt` and `<Table>_partition.m` into
//! the fragments folder; [`CommandGenerator`] runs a configured program once
//! per table.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::env::EnvFile;
use crate::error::TmdlError;
use crate::storage::read_text;

/// Keyword asking for table discovery instead of an explicit list
pub const ALL_TABLES: &str = "ALL";

/// Used when discovery finds nothing in the data source description
pub const DEFAULT_TABLES: &[&str] = &["Orders", "People", "Returned"];

static QUALIFIED_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\.\[([^\]]+)\]").unwrap());

static TABLE_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)table\s*=\s*"([^"]+)""#).unwrap());

#[derive(Error, Debug)]
pub enum GenerateError {
    /// A required input file is missing
    #[error("Missing {label}: {}", path.display())]
    MissingInput { label: String, path: PathBuf },

    /// The generator program could not be started
    #[error("Failed to start generator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The generator exited unsuccessfully for a table
    #[error("Generator failed for table '{table}' ({status})")]
    GeneratorFailed { table: String, status: ExitStatus },

    #[error(transparent)]
    Storage(#[from] TmdlError),
}

pub type GenerateResult<T> = Result<T, GenerateError>;

/// Table names referenced by a data source description
///
/// Picks up `[schema].[Table]` references and `table="..."` attributes;
/// the result is sorted and de-duplicated.
pub fn discover_tables(xml: &str) -> Vec<String> {
    let mut tables: BTreeSet<String> = QUALIFIED_TABLE
        .captures_iter(xml)
        .map(|caps| caps[2].to_string())
        .collect();

    for caps in TABLE_ATTRIBUTE.captures_iter(xml) {
        let value = &caps[1];
        match QUALIFIED_TABLE.captures(value) {
            Some(qualified) => tables.insert(qualified[2].to_string()),
            None => tables.insert(value.trim_matches(['[', ']']).to_string()),
        };
    }

    tables.retain(|t| !t.trim().is_empty());
    tables.into_iter().collect()
}

/// Resolve a table selection: `ALL` (any case) discovers tables from `xml`,
/// anything else is a comma-separated list
pub fn resolve_tables(selection: &str, xml: &Path) -> GenerateResult<Vec<String>> {
    if !selection.trim().eq_ignore_ascii_case(ALL_TABLES) {
        return Ok(selection
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect());
    }

    let text = read_text(xml).map_err(|err| match err {
        TmdlError::FileNotFound(path) => GenerateError::MissingInput {
            label: "data source XML".to_string(),
            path,
        },
        other => other.into(),
    })?;
    let tables = discover_tables(&text);
    if tables.is_empty() {
        info!("No tables discovered, using defaults");
        return Ok(DEFAULT_TABLES.iter().map(|t| t.to_string()).collect());
    }
    Ok(tables)
}

/// Inputs for one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub input_xml: PathBuf,
    pub out_dir: PathBuf,
    pub prompt_file: PathBuf,
    pub table: String,
}

impl GenerateRequest {
    /// The input files must exist before anything is spawned
    pub fn check_inputs(&self) -> GenerateResult<()> {
        for (label, path) in [
            ("data source XML", &self.input_xml),
            ("prompt file", &self.prompt_file),
        ] {
            if !path.is_file() {
                return Err(GenerateError::MissingInput {
                    label: label.to_string(),
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Produces the fragment files for one table
pub trait Generator {
    fn generate(&self, request: &GenerateRequest) -> GenerateResult<()>;
}

/// Runs an external program per table
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    leading_args: Vec<String>,
    provider: String,
    model: String,
    env: EnvFile,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            provider: "azure".to_string(),
            model: "gpt-5-mini".to_string(),
            env: EnvFile::default(),
        }
    }

    /// Arguments placed before the generated ones, e.g. a script path
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Variables set on the child process only
    pub fn with_env(mut self, env: EnvFile) -> Self {
        self.env = env;
        self
    }

    /// The command line for a request, without spawning it
    pub fn command(&self, request: &GenerateRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("--input")
            .arg(&request.input_xml)
            .arg("--out-dir")
            .arg(&request.out_dir)
            .arg("--provider")
            .arg(&self.provider)
            .arg("--model")
            .arg(&self.model)
            .arg("--prompt-file")
            .arg(&request.prompt_file)
            .arg("--table")
            .arg(&request.table)
            .envs(self.env.iter());
        cmd
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, request: &GenerateRequest) -> GenerateResult<()> {
        request.check_inputs()?;
        debug!(
            program = %self.program,
            table = %request.table,
            env_keys = ?self.env.keys().collect::<Vec<_>>(),
            "Running generator"
        );

        let status = self
            .command(request)
            .status()
            .map_err(|source| GenerateError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(GenerateError::GeneratorFailed {
                table: request.table.clone(),
                status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const XML: &str = r#"<datasource>
  <relation name="Orders" table="[Sample].[Orders]" type="table" />
  <relation name="People" table="[Sample].[People]" type="table" />
  <column caption="Returned" value="[Returned].[Order ID]" />
  <relation table="Targets" />
</datasource>"#;

    #[test]
    fn test_discover_tables() {
        assert_eq!(
            discover_tables(XML),
            vec!["Order ID", "Orders", "People", "Targets"]
        );
        assert!(discover_tables("<datasource/>").is_empty());
    }

    #[test]
    fn test_resolve_tables() {
        let temp = TempDir::new().unwrap();
        let xml = temp.path().join("source.xml");
        std::fs::write(&xml, "<datasource/>").unwrap();

        assert_eq!(
            resolve_tables("Orders, People,", &xml).unwrap(),
            vec!["Orders", "People"]
        );
        assert_eq!(resolve_tables("all", &xml).unwrap(), DEFAULT_TABLES);

        let err = resolve_tables("ALL", &temp.path().join("missing.xml")).unwrap_err();
        assert!(matches!(err, GenerateError::MissingInput { .. }));
    }

    #[test]
    fn test_command_line() {
        let generator = CommandGenerator::new("python3")
            .with_leading_args(vec!["gen.py".to_string()])
            .with_model("m1")
            .with_env(EnvFile::parse("API_KEY=secret"));
        let request = GenerateRequest {
            input_xml: PathBuf::from("in.xml"),
            out_dir: PathBuf::from("out"),
            prompt_file: PathBuf::from("prompt.txt"),
            table: "Orders".to_string(),
        };
        let cmd = generator.command(&request);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "gen.py", "--input", "in.xml", "--out-dir", "out", "--provider", "azure",
                "--model", "m1", "--prompt-file", "prompt.txt", "--table", "Orders",
            ]
        );
        assert!(
            cmd.get_envs()
                .any(|(k, v)| k == "API_KEY" && v.is_some_and(|v| v == "secret"))
        );
    }

    #[test]
    fn test_missing_prompt_fails_before_spawn() {
        let temp = TempDir::new().unwrap();
        let xml = temp.path().join("in.xml");
        std::fs::write(&xml, XML).unwrap();
        let request = GenerateRequest {
            input_xml: xml,
            out_dir: temp.path().join("out"),
            prompt_file: temp.path().join("prompt.txt"),
            table: "Orders".to_string(),
        };
        let err = CommandGenerator::new("does-not-run")
            .generate(&request)
            .unwrap_err();
        assert!(matches!(err, GenerateError::MissingInput { ref label, .. } if label == "prompt file"));
    }
}
