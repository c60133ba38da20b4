use std::path::{Path, PathBuf};

use tracing::debug;

use wizrun_core::error::{Result, WizardError};

use crate::description::FileSetConfig;

/// An ordered list of files with a cursor.
///
/// The cursor starts on the first member and moves one member per
/// repetition; once it passes the last member the set is exhausted.
#[derive(Debug, Clone)]
pub struct FileSet {
    name: String,
    members: Vec<PathBuf>,
    cursor: usize,
}

impl FileSet {
    pub fn new(name: impl Into<String>, members: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            members,
            cursor: 0,
        }
    }

    /// Build a set from its configuration: explicit members first, then the
    /// files of `directory` matching any include pattern and no exclude
    /// pattern, sorted by path.
    pub fn from_config(config: &FileSetConfig) -> Result<Self> {
        let mut members = config.members.clone();
        if let Some(dir) = &config.directory {
            members.extend(expand_directory(config, dir)?);
        }
        debug!(file_set = %config.name, members = members.len(), "File set expanded");
        Ok(Self::new(config.name.clone(), members))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[PathBuf] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Move the cursor back to the first member.
    pub fn init(&mut self) {
        self.cursor = 0;
    }

    /// Member under the cursor, `None` once exhausted.
    pub fn current(&self) -> Option<&Path> {
        self.members.get(self.cursor).map(PathBuf::as_path)
    }

    pub fn advance(&mut self) {
        if self.cursor < self.members.len() {
            self.cursor += 1;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.members.len()
    }
}

fn expand_directory(config: &FileSetConfig, dir: &Path) -> Result<Vec<PathBuf>> {
    let error = |message: String| WizardError::FileSet {
        name: config.name.clone(),
        message,
    };

    if !dir.is_dir() {
        return Err(error(format!("{} is not a directory", dir.display())));
    }

    let excludes = config
        .exclude
        .iter()
        .map(|p| glob::Pattern::new(p).map_err(|e| error(format!("invalid pattern '{}': {}", p, e))))
        .collect::<Result<Vec<_>>>()?;

    let includes: Vec<&str> = if config.include.is_empty() {
        vec!["*"]
    } else {
        config.include.iter().map(String::as_str).collect()
    };

    let mut found = Vec::new();
    for include in includes {
        let pattern = dir.join(include).to_string_lossy().to_string();
        let entries = glob::glob(&pattern)
            .map_err(|e| error(format!("invalid pattern '{}': {}", include, e)))?;
        found.extend(entries.filter_map(|e| e.ok()).filter(|p| p.is_file()));
    }

    found.retain(|path| {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        !excludes.iter().any(|x| x.matches(&name))
    });
    found.sort();
    found.dedup();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> FileSetConfig {
        FileSetConfig {
            name: name.to_string(),
            members: Vec::new(),
            directory: None,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    #[test]
    fn cursor_walks_members_then_exhausts() {
        let mut set = FileSet::new("cubes", vec!["a".into(), "b".into()]);
        assert_eq!(set.current(), Some(Path::new("a")));
        set.advance();
        assert_eq!(set.current(), Some(Path::new("b")));
        assert!(!set.is_exhausted());
        set.advance();
        assert!(set.is_exhausted());
        assert_eq!(set.current(), None);
        set.advance();
        assert!(set.is_exhausted());

        set.init();
        assert_eq!(set.current(), Some(Path::new("a")));
    }

    #[test]
    fn empty_set_starts_exhausted() {
        let set = FileSet::new("none", Vec::new());
        assert!(set.is_exhausted());
        assert!(set.current().is_none());
    }

    #[test]
    fn directory_members_follow_explicit_ones() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.sio", "a.sio", "a_old.sio", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let mut cfg = config("cubes");
        cfg.members = vec![PathBuf::from("/explicit/first.sio")];
        cfg.directory = Some(dir.path().to_path_buf());
        cfg.include = vec!["*.sio".into()];
        cfg.exclude = vec!["*_old.sio".into()];

        let set = FileSet::from_config(&cfg).unwrap();
        assert_eq!(
            set.members(),
            &[
                PathBuf::from("/explicit/first.sio"),
                dir.path().join("a.sio"),
                dir.path().join("b.sio"),
            ]
        );
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("cubes");
        cfg.directory = Some(dir.path().join("absent"));

        let err = FileSet::from_config(&cfg).unwrap_err();
        assert!(matches!(err, WizardError::FileSet { name, .. } if name == "cubes"));
    }
}
