use crate::error::Error;
use crate::paths::project_root;
use crate::pkg::npmrc::{apply_setting, load_npmrc_files, NpmrcConfig};
use crate::pkg::{DepClass, OmitSet, PruneOptions};
use std::path::PathBuf;

/// Environment variables read as settings, with their `.npmrc` key.
const ENV_SETTINGS: [(&str, &str); 5] = [
    ("npm_config_omit", "omit"),
    ("npm_config_include", "include"),
    ("npm_config_production", "production"),
    ("npm_config_workspaces", "workspaces"),
    ("npm_config_package_lock", "package-lock"),
];

/// Runtime configuration for the arbor CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Dependency classes kept off disk.
    pub omit: OmitSet,

    /// Whether workspace members count as walk roots.
    pub workspaces_enabled: bool,

    /// Whether `package-lock.json` is written.
    pub package_lock: bool,
}

/// Prune settings given on the command line. Empty/`None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct PruneOverrides {
    pub omit: Vec<String>,
    pub include: Vec<String>,
    pub production: Option<bool>,
    pub workspaces: Option<bool>,
    pub package_lock: Option<bool>,
}

impl PruneOverrides {
    fn as_layer(&self) -> NpmrcConfig {
        NpmrcConfig {
            omit: (!self.omit.is_empty()).then(|| self.omit.clone()),
            include: (!self.include.is_empty()).then(|| self.include.clone()),
            production: self.production,
            workspaces: self.workspaces,
            package_lock: self.package_lock,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            omit: OmitSet::none(),
            workspaces_enabled: true,
            package_lock: true,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Resolve the project root from `cwd` and layer prune settings over it:
    /// defaults, then `.npmrc` files, then the environment, then `cli`.
    ///
    /// # Errors
    /// Returns an error if no `package.json` is found above `cwd`, or a
    /// setting names an unknown dependency class.
    pub fn load(self, cli: &PruneOverrides) -> Result<Self, Error> {
        self.load_with_env(cli, |key| std::env::var(key).ok())
    }

    fn load_with_env(
        mut self,
        cli: &PruneOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        let cwd = dunce::canonicalize(&self.cwd).map_err(|source| Error::ConfigRead {
            path: self.cwd.clone(),
            source,
        })?;
        let root = project_root(&cwd).ok_or_else(|| Error::ProjectNotFound { start: cwd })?;

        let mut env_layer = NpmrcConfig::default();
        for (var, key) in ENV_SETTINGS {
            if let Some(value) = env(var) {
                apply_setting(&mut env_layer, key, &value);
            }
        }

        // NODE_ENV=production changes the default, not an explicit setting
        let mut omit = if env("NODE_ENV").as_deref() == Some("production") {
            vec![DepClass::Dev.as_str().to_string()]
        } else {
            Vec::new()
        };
        let mut include = Vec::new();
        let mut production = None;
        let mut workspaces = None;
        let mut package_lock = None;

        for layer in [load_npmrc_files(&root), env_layer, cli.as_layer()] {
            if let Some(values) = layer.omit {
                omit = values;
            }
            if let Some(values) = layer.include {
                include = values;
            }
            production = layer.production.or(production);
            workspaces = layer.workspaces.or(workspaces);
            package_lock = layer.package_lock.or(package_lock);
        }

        let mut set = parse_classes("omit", &omit)?;
        if production == Some(true) {
            set.insert(DepClass::Dev);
        }
        for class in parse_classes("include", &include)?.iter() {
            set.remove(class);
        }

        self.cwd = root;
        self.omit = set;
        self.workspaces_enabled = workspaces.unwrap_or(true);
        self.package_lock = package_lock.unwrap_or(true);
        Ok(self)
    }

    /// Options for a prune run under this configuration.
    #[must_use]
    pub fn prune_options(&self, dry_run: bool) -> PruneOptions {
        PruneOptions {
            omit: self.omit.clone(),
            workspaces_enabled: self.workspaces_enabled,
            save_lockfile: self.package_lock,
            dry_run,
        }
    }
}

fn parse_classes(key: &'static str, values: &[String]) -> Result<OmitSet, Error> {
    OmitSet::parse(values).map_err(|e| Error::InvalidSetting {
        key,
        message: e.message().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        dir
    }

    fn load(
        dir: &tempfile::TempDir,
        cli: &PruneOverrides,
        env: &[(&str, &str)],
    ) -> Result<Config, Error> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::new(dir.path().to_path_buf()).load_with_env(cli, |k| env.get(k).cloned())
    }

    fn classes(config: &Config) -> Vec<DepClass> {
        config.omit.iter().collect()
    }

    #[test]
    fn test_defaults() {
        let dir = project();
        let config = load(&dir, &PruneOverrides::default(), &[]).unwrap();
        assert!(config.omit.is_empty());
        assert!(config.workspaces_enabled);
        assert!(config.package_lock);
    }

    #[test]
    fn test_node_env_production_omits_dev() {
        let dir = project();
        let config = load(&dir, &PruneOverrides::default(), &[("NODE_ENV", "production")]).unwrap();
        assert_eq!(classes(&config), [DepClass::Dev]);
    }

    #[test]
    fn test_precedence_npmrc_env_cli() {
        let dir = project();
        fs::write(
            dir.path().join(".npmrc"),
            "omit=optional\nworkspaces=false\npackage-lock=false\n",
        )
        .unwrap();

        let config = load(&dir, &PruneOverrides::default(), &[]).unwrap();
        assert_eq!(classes(&config), [DepClass::Optional]);
        assert!(!config.workspaces_enabled);
        assert!(!config.package_lock);

        let config = load(&dir, &PruneOverrides::default(), &[("npm_config_omit", "peer")]).unwrap();
        assert_eq!(classes(&config), [DepClass::Peer]);

        let cli = PruneOverrides {
            omit: vec!["dev".into()],
            workspaces: Some(true),
            ..PruneOverrides::default()
        };
        let config = load(&dir, &cli, &[("npm_config_omit", "peer")]).unwrap();
        assert_eq!(classes(&config), [DepClass::Dev]);
        assert!(config.workspaces_enabled);
    }

    #[test]
    fn test_include_beats_omit() {
        let dir = project();
        let cli = PruneOverrides {
            omit: vec!["dev".into(), "optional".into()],
            include: vec!["dev".into()],
            ..PruneOverrides::default()
        };
        let config = load(&dir, &cli, &[]).unwrap();
        assert_eq!(classes(&config), [DepClass::Optional]);

        let cli = PruneOverrides {
            production: Some(true),
            include: vec!["dev".into()],
            ..PruneOverrides::default()
        };
        assert!(load(&dir, &cli, &[]).unwrap().omit.is_empty());
    }

    #[test]
    fn test_invalid_class_rejected() {
        let dir = project();
        let cli = PruneOverrides {
            omit: vec!["prod".into()],
            ..PruneOverrides::default()
        };
        let err = load(&dir, &cli, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { key: "omit", .. }));
    }

    #[test]
    fn test_root_found_from_subdirectory() {
        let dir = project();
        let sub = dir.path().join("src");
        fs::create_dir_all(&sub).unwrap();
        let config = Config::new(sub)
            .load_with_env(&PruneOverrides::default(), |_| None)
            .unwrap();
        assert_eq!(config.cwd, dunce::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_missing_project() {
        let dir = tempdir().unwrap();
        let err = Config::new(dir.path().to_path_buf())
            .load_with_env(&PruneOverrides::default(), |_| None)
            .unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[test]
    #[serial]
    fn test_load_reads_process_env() {
        let dir = project();
        std::env::set_var("npm_config_omit", "optional");
        let config = Config::new(dir.path().to_path_buf())
            .load(&PruneOverrides::default())
            .unwrap();
        std::env::remove_var("npm_config_omit");
        assert!(config.omit.contains(DepClass::Optional));
    }

    #[test]
    fn test_prune_options() {
        let config = Config {
            package_lock: false,
            ..Config::new(PathBuf::from("/p"))
        };
        let opts = config.prune_options(true);
        assert!(opts.dry_run);
        assert!(!opts.save_lockfile);
        assert!(opts.workspaces_enabled);
    }
}
