use std::{
  collections::BTreeMap,
  path::{
    Path,
    PathBuf,
  },
  time::Duration,
};

use anyhow::{
  Context,
  Result,
};
use serde::{
  Deserialize,
  Serialize,
};

use crate::selector::{
  DocumentSelector,
  SUPPORTED_LANGUAGES,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
  /// Enables format-and-apply for every supported language.
  pub format:      bool,
  /// Enables diagnostics for every supported language.
  pub diagnostics: bool,
  /// Quiet period in milliseconds before an edit triggers diagnostics.
  pub debounce:    u64,
  pub gradle:      GradleConfig,
  /// Per-language overrides, keyed by language id.
  pub language:    BTreeMap<String, LanguageConfig>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      format:      true,
      diagnostics: true,
      debounce:    250,
      gradle:      GradleConfig::default(),
      language:    BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct GradleConfig {
  /// Gradle executable. Unset means the project's wrapper, or `gradle` when
  /// the project has none.
  pub command: Option<String>,
  pub task:    String,
  pub args:    Vec<String>,
}

impl Default for GradleConfig {
  fn default() -> Self {
    Self {
      command: None,
      task:    "spotlessApply".to_string(),
      args:    Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LanguageConfig {
  pub format:      Option<bool>,
  pub diagnostics: Option<bool>,
}

impl Config {
  /// Loads the user config file merged with the workspace config file.
  pub fn load_default() -> Result<Self> {
    Self::load([crate::config_file(), crate::workspace_config_file()])
  }

  /// Loads and merges `files` in order, later files winning. Missing files are
  /// skipped.
  pub fn load(files: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
    let merged = files
      .into_iter()
      .map(|file| read_toml(&file))
      .collect::<Result<Vec<_>>>()?
      .into_iter()
      .flatten()
      .fold(toml::Value::Table(toml::Table::new()), |a, b| {
        crate::merge_toml_values(a, b, 3)
      });

    merged
      .try_into()
      .context("invalid spotless-gradle configuration")
  }

  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce)
  }

  /// Languages format-and-apply is enabled for.
  pub fn format_selector(&self) -> DocumentSelector {
    self.selector(|language| language.format, self.format)
  }

  /// Languages diagnostics are enabled for.
  pub fn diagnostics_selector(&self) -> DocumentSelector {
    self.selector(|language| language.diagnostics, self.diagnostics)
  }

  fn selector(
    &self,
    enabled: impl Fn(&LanguageConfig) -> Option<bool>,
    global: bool,
  ) -> DocumentSelector {
    DocumentSelector::new(SUPPORTED_LANGUAGES.iter().copied().filter(|id| {
      self
        .language
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(id))
        .and_then(|(_, language)| enabled(language))
        .unwrap_or(global)
    }))
  }
}

fn read_toml(path: &Path) -> Result<Option<toml::Value>> {
  let text = match std::fs::read_to_string(path) {
    Ok(text) => text,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(err) => {
      return Err(err).with_context(|| format!("failed to read {}", path.display()));
    },
  };
  let value = toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
  log::debug!("loaded configuration from {}", path.display());
  Ok(Some(value))
}
