//! Run configuration and `trellis.toml` loading.

use crate::cli::Args;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "trellis.toml";

/// Settings read from `trellis.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub testpaths: Vec<String>,
    pub test_files: Option<Vec<String>>,
    pub norecursedirs: Option<Vec<String>>,
    pub markers: Vec<String>,
    pub strict_markers: bool,
}

/// Read `trellis.toml` from `dir`, if there is one.
pub fn read_config_file(dir: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let parsed = toml::from_str(&content).map_err(|source| ConfigError::Toml { path, source })?;
    Ok(Some(parsed))
}

/// The closest ancestor of `start` (inclusive) holding a `trellis.toml`.
pub fn find_rootdir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory node ids are relative to.
    pub rootdir: PathBuf,
    /// Directory the run was started from; arguments are relative to it.
    pub invocation_dir: PathBuf,
    /// Collection arguments (`path[::name...]`).
    pub args: Vec<String>,
    /// Paths collected when no arguments are given, relative to `rootdir`.
    pub testpaths: Vec<String>,
    /// File name patterns collected from directories.
    pub test_files: Vec<String>,
    /// Directory name patterns never descended into.
    pub norecursedirs: Vec<String>,
    /// Registered marker names, optionally with a `: description`.
    pub markers: Vec<String>,
    pub strict_markers: bool,
    /// Only keep items whose markers match this expression.
    pub markexpr: Option<String>,
}

impl Config {
    pub fn new(rootdir: impl Into<PathBuf>, invocation_dir: impl Into<PathBuf>) -> Self {
        Self {
            rootdir: rootdir.into(),
            invocation_dir: invocation_dir.into(),
            args: Vec::new(),
            testpaths: Vec::new(),
            test_files: vec!["test_*.rs".into(), "*_test.rs".into()],
            norecursedirs: vec![
                ".*".into(),
                "build".into(),
                "dist".into(),
                "node_modules".into(),
                "target".into(),
            ],
            markers: Vec::new(),
            strict_markers: false,
            markexpr: None,
        }
    }

    /// Configuration for a run started in `invocation_dir`.
    ///
    /// The rootdir is the closest ancestor with a `trellis.toml`, or the
    /// invocation directory itself.
    pub fn load(invocation_dir: &Path, args: Vec<String>) -> Result<Self, ConfigError> {
        Self::load_with_rootdir(invocation_dir, None, args)
    }

    pub fn load_with_rootdir(
        invocation_dir: &Path,
        rootdir: Option<&Path>,
        args: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let rootdir = match rootdir {
            Some(dir) => invocation_dir.join(dir),
            None => find_rootdir(invocation_dir).unwrap_or_else(|| invocation_dir.to_path_buf()),
        };

        let mut config = Self::new(&rootdir, invocation_dir);
        config.args = args;

        if let Some(file) = read_config_file(&rootdir)? {
            log::debug!("loaded {} from {}", CONFIG_FILE, rootdir.display());
            config.apply(file);
        }

        Ok(config)
    }

    /// Configuration from parsed command-line arguments.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let invocation_dir = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        let mut config =
            Self::load_with_rootdir(&invocation_dir, args.rootdir.as_deref(), args.files.clone())?;

        config.strict_markers |= args.strict_markers;
        config.markexpr = args.markexpr.clone();
        Ok(config)
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_markexpr(mut self, markexpr: impl Into<String>) -> Self {
        self.markexpr = Some(markexpr.into());
        self
    }

    fn apply(&mut self, file: FileConfig) {
        self.testpaths = file.testpaths;
        if let Some(test_files) = file.test_files {
            self.test_files = test_files;
        }
        if let Some(norecursedirs) = file.norecursedirs {
            self.norecursedirs = norecursedirs;
        }
        self.markers = file.markers;
        self.strict_markers = file.strict_markers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path(), vec![]).unwrap();

        assert_eq!(config.rootdir, temp_dir.path());
        assert_eq!(config.invocation_dir, temp_dir.path());
        assert_eq!(config.test_files, vec!["test_*.rs", "*_test.rs"]);
        assert!(config.testpaths.is_empty());
        assert!(!config.strict_markers);
    }

    #[test]
    fn test_rootdir_found_in_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("tests").join("unit");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE),
            indoc! {r#"
                testpaths = ["tests"]
                test_files = ["check_*.rs"]
                markers = ["slow: long running"]
                strict_markers = true
            "#},
        )
        .unwrap();

        let config = Config::load(&nested, vec!["a.rs".into()]).unwrap();

        assert_eq!(config.rootdir, temp_dir.path());
        assert_eq!(config.invocation_dir, nested);
        assert_eq!(config.args, vec!["a.rs"]);
        assert_eq!(config.testpaths, vec!["tests"]);
        assert_eq!(config.test_files, vec!["check_*.rs"]);
        assert_eq!(config.markers, vec!["slow: long running"]);
        assert!(config.strict_markers);
        assert!(config.norecursedirs.contains(&"target".to_string()));
    }

    #[test]
    fn test_explicit_rootdir_wins() {
        let temp_dir = TempDir::new().unwrap();
        let other = temp_dir.path().join("other");
        fs::create_dir_all(&other).unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "").unwrap();

        let config =
            Config::load_with_rootdir(temp_dir.path(), Some(Path::new("other")), vec![]).unwrap();
        assert_eq!(config.rootdir, other);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "testpaths = [").unwrap();

        let err = Config::load(temp_dir.path(), vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }
}
