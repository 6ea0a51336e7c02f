//! Locations of the configuration and log files.

pub mod config;
pub mod selector;

use std::{
  path::{
    Path,
    PathBuf,
  },
  sync::OnceLock,
};

use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};
use toml::Value;

pub use config::{
  Config,
  GradleConfig,
  LanguageConfig,
};
pub use selector::{
  DocumentSelector,
  SUPPORTED_LANGUAGES,
  language_id_for_path,
};

const APP_DIR: &str = "spotless-gradle";

/// Directory inside a workspace holding project specific configuration.
pub const WORKSPACE_DIR: &str = ".spotless-gradle";

const WORKSPACE_MARKERS: &[&str] = &[".git", ".jj", ".svn", WORKSPACE_DIR];

static CONFIG_FILE: OnceLock<PathBuf> = OnceLock::new();

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();

/// Fixes the path held by `cell` on first use. Its parent directory is
/// created so the file can be written right away.
fn resolve(cell: &OnceLock<PathBuf>, specified: Option<PathBuf>, default: fn() -> PathBuf) -> PathBuf {
  cell
    .get_or_init(|| {
      let path = specified.unwrap_or_else(default);
      create_parent_dir(&path);
      path
    })
    .clone()
}

/// Must run before the first [`config_file`] call to take effect.
pub fn initialize_config_file(specified: Option<PathBuf>) {
  resolve(&CONFIG_FILE, specified, default_config_file);
}

/// Must run before the first [`log_file`] call to take effect.
pub fn initialize_log_file(specified: Option<PathBuf>) {
  resolve(&LOG_FILE, specified, default_log_file);
}

pub fn config_file() -> PathBuf {
  resolve(&CONFIG_FILE, None, default_config_file)
}

pub fn log_file() -> PathBuf {
  resolve(&LOG_FILE, None, default_log_file)
}

fn expand_tilde(path: &Path) -> PathBuf {
  match path.strip_prefix("~") {
    Ok(rest) => {
      match etcetera::home_dir() {
        Ok(home) => home.join(rest),
        Err(_) => path.to_owned(),
      }
    },
    Err(_) => path.to_owned(),
  }
}

fn dir_override(env_var: &str) -> Option<PathBuf> {
  std::env::var(env_var)
    .ok()
    .map(|dir| expand_tilde(Path::new(&dir)))
}

fn fallback_dir(err: impl std::fmt::Display) -> PathBuf {
  let fallback = std::env::temp_dir().join(APP_DIR);
  log::warn!(
    "unable to find the home directory ({err}), using {}",
    fallback.display()
  );
  fallback
}

pub fn config_dir() -> PathBuf {
  if let Some(dir) = dir_override("SPOTLESS_GRADLE_CONFIG_DIR") {
    return dir;
  }
  match choose_base_strategy() {
    Ok(strategy) => strategy.config_dir().join(APP_DIR),
    Err(err) => fallback_dir(err),
  }
}

pub fn cache_dir() -> PathBuf {
  if let Some(dir) = dir_override("SPOTLESS_GRADLE_CACHE_DIR") {
    return dir;
  }
  match choose_base_strategy() {
    Ok(strategy) => strategy.cache_dir().join(APP_DIR),
    Err(err) => fallback_dir(err),
  }
}

/// `.spotless-gradle/config.toml` of the workspace, or of the current
/// directory outside of one.
pub fn workspace_config_file() -> PathBuf {
  find_workspace()
    .or_else(|| std::env::current_dir().ok())
    .unwrap_or_default()
    .join(WORKSPACE_DIR)
    .join("config.toml")
}

fn default_config_file() -> PathBuf {
  config_dir().join("config.toml")
}

pub fn default_log_file() -> PathBuf {
  cache_dir().join("spotless-gradle.log")
}

fn create_parent_dir(path: &Path) {
  if let Some(parent) = path.parent()
    && !parent.exists()
    && let Err(err) = std::fs::create_dir_all(parent)
  {
    log::warn!("unable to create {}: {err}", parent.display());
  }
}

/// Merges the TOML document `right` onto `left`.
///
/// Tables are merged key by key down to `depth` levels, below that `right`
/// replaces `left` wholesale. Arrays are replaced as well, except arrays of
/// tables that all carry a `name`: items are then matched by name and merged.
///
/// With a depth of 3, merging
/// ```toml
/// debounce = 250
/// [language.java]
/// format = false
/// ```
/// with
/// ```toml
/// [language.java]
/// diagnostics = false
/// ```
/// keeps all three settings.
pub fn merge_toml_values(left: Value, right: Value, depth: usize) -> Value {
  if depth == 0 {
    return right;
  }

  match (left, right) {
    (Value::Table(mut merged), Value::Table(overrides)) => {
      for (key, value) in overrides {
        let value = match merged.remove(&key) {
          Some(base) => merge_toml_values(base, value, depth - 1),
          None => value,
        };
        merged.insert(key, value);
      }
      Value::Table(merged)
    },
    (Value::Array(mut merged), Value::Array(overrides)) if is_named_list(&overrides) => {
      for item in overrides {
        let base = item_name(&item)
          .and_then(|name| merged.iter().position(|other| item_name(other) == Some(name)))
          .map(|index| merged.remove(index));
        merged.push(match base {
          Some(base) => merge_toml_values(base, item, depth - 1),
          None => item,
        });
      }
      Value::Array(merged)
    },
    (_, right) => right,
  }
}

fn item_name(item: &Value) -> Option<&str> {
  item.get("name")?.as_str()
}

fn is_named_list(items: &[Value]) -> bool {
  !items.is_empty() && items.iter().all(|item| item_name(item).is_some())
}

/// The nearest ancestor of the current directory that is a VCS root or holds
/// a `.spotless-gradle` directory.
pub fn find_workspace() -> Option<PathBuf> {
  find_workspace_in(&std::env::current_dir().ok()?)
}

pub fn find_workspace_in(dir: &Path) -> Option<PathBuf> {
  dir
    .ancestors()
    .find(|ancestor| {
      WORKSPACE_MARKERS
        .iter()
        .any(|marker| ancestor.join(marker).exists())
    })
    .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(text: &str) -> Value {
    toml::from_str(text).unwrap()
  }

  #[test]
  fn language_tables_merge() {
    let user = parse("debounce = 100\n[language.java]\nformat = false\n");
    let workspace = parse("[language.java]\ndiagnostics = false\n[gradle]\nargs = [\"--offline\"]\n");

    let merged = merge_toml_values(user, workspace, 3);
    assert_eq!(
      merged,
      parse(
        "debounce = 100\n[language.java]\nformat = false\ndiagnostics = false\n[gradle]\nargs = \
         [\"--offline\"]\n"
      )
    );
  }

  #[test]
  fn plain_arrays_are_replaced() {
    let merged = merge_toml_values(parse(r#"args = ["a", "b"]"#), parse(r#"args = ["c"]"#), 3);
    assert_eq!(merged, parse(r#"args = ["c"]"#));

    let merged = merge_toml_values(parse(r#"args = ["a"]"#), parse("args = []"), 3);
    assert_eq!(merged, parse("args = []"));
  }

  #[test]
  fn named_items_are_merged() {
    let left = parse("[[step]]\nname = \"java\"\norder = 1\n[[step]]\nname = \"kotlin\"\n");
    let right = parse("[[step]]\nname = \"java\"\nenabled = false\n");

    let merged = merge_toml_values(left, right, 3);
    let steps = merged.get("step").unwrap().as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(item_name(&steps[0]), Some("kotlin"));
    assert_eq!(steps[1].get("order").unwrap().as_integer(), Some(1));
    assert_eq!(steps[1].get("enabled").unwrap().as_bool(), Some(false));
  }

  #[test]
  fn values_below_the_depth_are_overridden() {
    let left = parse("[gradle]\ntask = \"a\"\ncommand = \"gradle\"");
    let right = parse("[gradle]\ntask = \"b\"");

    let merged = merge_toml_values(left, right, 1);
    assert_eq!(merged, parse("[gradle]\ntask = \"b\""));
  }

  #[test]
  fn workspace_is_the_marked_ancestor() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join(WORKSPACE_DIR)).unwrap();
    let nested = root.path().join("app").join("src");
    std::fs::create_dir_all(&nested).unwrap();

    assert_eq!(find_workspace_in(&nested), Some(root.path().to_owned()));
  }

  #[test]
  fn home_is_expanded() {
    assert!(expand_tilde(Path::new("~/spotless")).ends_with("spotless"));
    assert_eq!(
      expand_tilde(Path::new("/tmp/spotless")),
      PathBuf::from("/tmp/spotless")
    );
  }
}
