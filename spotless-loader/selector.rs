use std::path::Path;

/// Language ids Spotless can format.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
  "java",
  "kotlinscript",
  "kotlin",
  "scala",
  "sql",
  "groovy",
  "javascript",
  "javascriptreact",
  "typescript",
  "typescriptreact",
  "css",
  "scss",
  "less",
  "vue",
  "graphql",
  "json",
  "yaml",
  "markdown",
  "python",
  "c",
  "cpp",
  "csharp",
  "objective-c",
  "objective-cpp",
];

/// Set of language ids a feature is enabled for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSelector {
  languages: Vec<String>,
}

impl DocumentSelector {
  pub fn new<I, S>(languages: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut languages: Vec<String> = languages
      .into_iter()
      .map(|language| language.as_ref().to_ascii_lowercase())
      .collect();
    languages.sort();
    languages.dedup();
    Self { languages }
  }

  /// Matches nothing.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.languages.is_empty()
  }

  pub fn matches(&self, language_id: &str) -> bool {
    self
      .languages
      .iter()
      .any(|language| language.eq_ignore_ascii_case(language_id))
  }

  pub fn languages(&self) -> &[String] {
    &self.languages
  }
}

/// Guesses the language id of a file from its extension.
pub fn language_id_for_path(path: &Path) -> Option<&'static str> {
  let extension = path.extension()?.to_str()?.to_ascii_lowercase();
  let id = match extension.as_str() {
    "java" => "java",
    "kts" => "kotlinscript",
    "kt" => "kotlin",
    "scala" | "sc" => "scala",
    "sql" => "sql",
    "groovy" | "gradle" => "groovy",
    "js" | "mjs" | "cjs" => "javascript",
    "jsx" => "javascriptreact",
    "ts" | "mts" | "cts" => "typescript",
    "tsx" => "typescriptreact",
    "css" => "css",
    "scss" => "scss",
    "less" => "less",
    "vue" => "vue",
    "graphql" | "gql" => "graphql",
    "json" => "json",
    "yaml" | "yml" => "yaml",
    "md" | "markdown" => "markdown",
    "py" => "python",
    "c" | "h" => "c",
    "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
    "cs" => "csharp",
    "m" => "objective-c",
    "mm" => "objective-cpp",
    _ => return None,
  };
  Some(id)
}
