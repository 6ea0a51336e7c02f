use parking_lot::RwLock;
use spotless_loader::{
  Config,
  DocumentSelector,
};

use crate::document::TextDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
  Format,
  Diagnostics,
}

#[derive(Debug, Default)]
struct GateState {
  ready:       bool,
  format:      DocumentSelector,
  diagnostics: DocumentSelector,
}

/// Decides which documents each feature runs for.
///
/// Nothing is enabled until the formatter reports ready.
#[derive(Debug, Default)]
pub struct FeatureGate {
  state: RwLock<GateState>,
}

impl FeatureGate {
  pub fn new(config: &Config) -> Self {
    let gate = Self::default();
    gate.apply_config(config);
    gate
  }

  /// Recomputes the per-feature selectors.
  pub fn apply_config(&self, config: &Config) {
    let mut state = self.state.write();
    state.format = config.format_selector();
    state.diagnostics = config.diagnostics_selector();
    log::debug!(
      "enabled languages (format: {}) (diagnostics: {})",
      state.format.languages().len(),
      state.diagnostics.languages().len()
    );
  }

  pub fn set_ready(&self, ready: bool) {
    let mut state = self.state.write();
    if state.ready != ready {
      log::info!("Spotless is {}", if ready { "ready" } else { "unavailable" });
    }
    state.ready = ready;
  }

  pub fn is_ready(&self) -> bool {
    self.state.read().ready
  }

  /// Effective selector for `feature`, empty while the formatter is not ready.
  pub fn selector(&self, feature: Feature) -> DocumentSelector {
    let state = self.state.read();
    if !state.ready {
      return DocumentSelector::empty();
    }
    match feature {
      Feature::Format => state.format.clone(),
      Feature::Diagnostics => state.diagnostics.clone(),
    }
  }

  pub fn is_enabled(&self, feature: Feature, document: &TextDocument) -> bool {
    let state = self.state.read();
    if !state.ready || !document.is_file() {
      return false;
    }
    let selector = match feature {
      Feature::Format => &state.format,
      Feature::Diagnostics => &state.diagnostics,
    };
    selector.matches(&document.language_id)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use spotless_loader::LanguageConfig;

  use super::*;

  fn java(uri: &str) -> TextDocument {
    TextDocument::new(uri, "java", 1, "class A {}")
  }

  #[test]
  fn nothing_runs_before_ready() {
    let gate = FeatureGate::new(&Config::default());
    assert!(!gate.is_enabled(Feature::Diagnostics, &java("file:///A.java")));
    assert!(gate.selector(Feature::Format).is_empty());

    gate.set_ready(true);
    assert!(gate.is_enabled(Feature::Diagnostics, &java("file:///A.java")));
    assert!(gate.is_enabled(Feature::Format, &java("file:///A.java")));

    gate.set_ready(false);
    assert!(!gate.is_enabled(Feature::Format, &java("file:///A.java")));
  }

  #[test]
  fn only_saved_files_in_enabled_languages() {
    let gate = FeatureGate::new(&Config::default());
    gate.set_ready(true);
    assert!(!gate.is_enabled(Feature::Diagnostics, &java("untitled:Untitled-1")));
    assert!(!gate.is_enabled(
      Feature::Diagnostics,
      &TextDocument::new("file:///a.rs", "rust", 1, "")
    ));
  }

  #[test]
  fn config_changes_are_applied() {
    let gate = FeatureGate::new(&Config::default());
    gate.set_ready(true);

    let mut language = BTreeMap::new();
    language.insert(
      "java".to_string(),
      LanguageConfig {
        format:      None,
        diagnostics: Some(false),
      },
    );
    gate.apply_config(&Config {
      language,
      ..Config::default()
    });

    assert!(!gate.is_enabled(Feature::Diagnostics, &java("file:///A.java")));
    assert!(gate.is_enabled(Feature::Format, &java("file:///A.java")));
  }
}
