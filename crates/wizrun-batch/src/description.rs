use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use wizrun_core::document::literal_for_type;
use wizrun_core::error::{Result, WizardError};
use wizrun_core::value::Value;

/// A named, ordered list of files iterated across repetitions of a run.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSetConfig {
    pub name: String,
    #[serde(default)]
    pub members: Vec<PathBuf>,
    /// Directory whose matching files are appended after `members`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Where a batch input takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Value(Value),
    FileSet(String),
}

/// A value bound onto a wizard's literal port before each repetition.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub name: String,
    pub type_name: String,
    pub source: InputSource,
}

/// One wizard to execute, possibly repeated over its file sets.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub wizard: String,
    pub repeat: bool,
    pub cleanup: bool,
    pub inputs: Vec<BatchInput>,
}

impl BatchRun {
    /// Names of the file sets this run's inputs draw from, in first-use order.
    pub fn file_sets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.inputs
            .iter()
            .filter_map(|i| match &i.source {
                InputSource::FileSet(name) => Some(name.as_str()),
                InputSource::Value(_) => None,
            })
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

/// A parsed and validated batch file.
#[derive(Debug, Clone)]
pub struct BatchDescription {
    pub file_sets: Vec<FileSetConfig>,
    pub runs: Vec<BatchRun>,
}

#[derive(Deserialize)]
struct RawDescription {
    #[serde(default)]
    file_sets: Vec<FileSetConfig>,
    #[serde(default)]
    runs: Vec<RawRun>,
}

#[derive(Deserialize)]
struct RawRun {
    wizard: String,
    #[serde(default)]
    repeat: bool,
    #[serde(default)]
    cleanup: bool,
    #[serde(default)]
    inputs: Vec<RawInput>,
}

#[derive(Deserialize)]
struct RawInput {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    file_set: Option<String>,
}

impl BatchDescription {
    /// Read and parse a batch file. Relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WizardError::BatchParse(format!("{}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base)
    }

    /// Parse batch TOML, resolving relative paths against `base`.
    pub fn parse(content: &str, base: &Path) -> Result<Self> {
        let raw: RawDescription =
            toml::from_str(content).map_err(|e| WizardError::BatchParse(e.to_string()))?;

        if raw.runs.is_empty() {
            return Err(WizardError::BatchParse("the batch file declares no runs".into()));
        }

        let mut names = HashSet::new();
        let mut file_sets = Vec::with_capacity(raw.file_sets.len());
        for mut set in raw.file_sets {
            if !names.insert(set.name.clone()) {
                return Err(WizardError::BatchParse(format!(
                    "file set '{}' is declared more than once",
                    set.name
                )));
            }
            set.members = set.members.iter().map(|m| resolve(base, m)).collect();
            set.directory = set.directory.as_deref().map(|d| resolve(base, d));
            file_sets.push(set);
        }

        let runs = raw
            .runs
            .into_iter()
            .enumerate()
            .map(|(index, run)| {
                let inputs = run
                    .inputs
                    .into_iter()
                    .map(|input| validate_input(index, input, &names, base))
                    .collect::<Result<Vec<_>>>()?;
                Ok(BatchRun {
                    wizard: resolve(base, Path::new(&run.wizard)).display().to_string(),
                    repeat: run.repeat,
                    cleanup: run.cleanup,
                    inputs,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { file_sets, runs })
    }

    pub fn file_set(&self, name: &str) -> Option<&FileSetConfig> {
        self.file_sets.iter().find(|s| s.name == name)
    }
}

fn validate_input(
    run: usize,
    input: RawInput,
    file_sets: &HashSet<String>,
    base: &Path,
) -> Result<BatchInput> {
    let source = match (input.value, input.file_set) {
        (Some(value), None) => {
            let value = match literal_for_type(&input.type_name, value) {
                Value::Path(p) => Value::Path(resolve(base, &p)),
                other => other,
            };
            InputSource::Value(value)
        }
        (None, Some(name)) => {
            if !file_sets.contains(&name) {
                return Err(WizardError::UnknownFileSet(name));
            }
            InputSource::FileSet(name)
        }
        (Some(_), Some(_)) => {
            return Err(WizardError::BatchParse(format!(
                "run #{}: input '{}' sets both value and file_set",
                run + 1,
                input.name
            )))
        }
        (None, None) => {
            return Err(WizardError::BatchParse(format!(
                "run #{}: input '{}' needs a value or a file_set",
                run + 1,
                input.name
            )))
        }
    };

    Ok(BatchInput {
        name: input.name,
        type_name: input.type_name,
        source,
    })
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[file_sets]]
name = "cubes"
members = ["a.sio", "/data/b.sio"]

[[runs]]
wizard = "add_bands.toml"
repeat = true
cleanup = true

[[runs.inputs]]
name = "Input File"
type = "Filename"
file_set = "cubes"

[[runs.inputs]]
name = "Factor"
type = "double"
value = 2.5

[[runs]]
wizard = "/abs/report.toml"
"#;

    #[test]
    fn parses_runs_and_file_sets() {
        let desc = BatchDescription::parse(SAMPLE, Path::new("/batches")).unwrap();

        assert_eq!(desc.runs.len(), 2);
        let run = &desc.runs[0];
        assert!(run.repeat && run.cleanup);
        assert_eq!(run.wizard, "/batches/add_bands.toml");
        assert_eq!(run.file_sets(), vec!["cubes"]);
        assert_eq!(run.inputs[1].source, InputSource::Value(Value::literal(2.5)));

        let second = &desc.runs[1];
        assert!(!second.repeat && !second.cleanup);
        assert_eq!(second.wizard, "/abs/report.toml");

        let cubes = desc.file_set("cubes").unwrap();
        assert_eq!(
            cubes.members,
            vec![PathBuf::from("/batches/a.sio"), PathBuf::from("/data/b.sio")]
        );
    }

    #[test]
    fn filename_values_resolve_against_base() {
        let toml = r#"
[[runs]]
wizard = "w.toml"
[[runs.inputs]]
name = "Output"
type = "Filename"
value = "out/result.txt"
"#;
        let desc = BatchDescription::parse(toml, Path::new("/jobs")).unwrap();
        assert_eq!(
            desc.runs[0].inputs[0].source,
            InputSource::Value(Value::path("/jobs/out/result.txt"))
        );
    }

    #[test]
    fn unknown_file_set_is_rejected() {
        let toml = r#"
[[runs]]
wizard = "w.toml"
[[runs.inputs]]
name = "Input File"
type = "Filename"
file_set = "missing"
"#;
        let err = BatchDescription::parse(toml, Path::new(".")).unwrap_err();
        assert!(matches!(err, WizardError::UnknownFileSet(name) if name == "missing"));
    }

    #[test]
    fn input_needs_exactly_one_source() {
        let both = r#"
[[file_sets]]
name = "s"
[[runs]]
wizard = "w.toml"
[[runs.inputs]]
name = "x"
type = "int"
value = 1
file_set = "s"
"#;
        let neither = r#"
[[runs]]
wizard = "w.toml"
[[runs.inputs]]
name = "x"
type = "int"
"#;
        for toml in [both, neither] {
            let err = BatchDescription::parse(toml, Path::new(".")).unwrap_err();
            assert!(matches!(err, WizardError::BatchParse(_)), "{}", err);
        }
    }

    #[test]
    fn malformed_or_empty_batch_is_a_parse_error() {
        for toml in ["[[runs]\nwizard =", "", "[[file_sets]]\nname = \"a\""] {
            let err = BatchDescription::parse(toml, Path::new(".")).unwrap_err();
            assert!(matches!(err, WizardError::BatchParse(_)));
        }
    }

    #[test]
    fn duplicate_file_set_is_rejected() {
        let toml = r#"
[[file_sets]]
name = "s"
[[file_sets]]
name = "s"
[[runs]]
wizard = "w.toml"
"#;
        let err = BatchDescription::parse(toml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BatchDescription::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, WizardError::BatchParse(_)));
    }
}
