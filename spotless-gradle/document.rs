use std::path::{
  Path,
  PathBuf,
};

use ropey::Rope;

/// Language id of documents whose language is unknown.
pub const PLAIN_TEXT: &str = "plaintext";

/// An editor document at one version.
///
/// `text` is an immutable snapshot, cloning it is cheap.
#[derive(Debug, Clone)]
pub struct TextDocument {
  pub uri:         String,
  pub language_id: String,
  pub version:     i32,
  pub text:        Rope,
}

impl TextDocument {
  pub fn new(
    uri: impl Into<String>,
    language_id: impl Into<String>,
    version: i32,
    text: &str,
  ) -> Self {
    Self {
      uri: uri.into(),
      language_id: language_id.into(),
      version,
      text: Rope::from_str(text),
    }
  }

  /// Document for a file on disk, the language guessed from its extension.
  pub fn from_path(path: &Path, text: &str) -> Option<Self> {
    let uri = file_uri_for_path(path)?;
    let language_id = spotless_loader::language_id_for_path(path).unwrap_or(PLAIN_TEXT);
    Some(Self::new(uri, language_id, 0, text))
  }

  /// The next version of this document holding `text`.
  pub fn with_text(&self, text: &str) -> Self {
    Self {
      uri:         self.uri.clone(),
      language_id: self.language_id.clone(),
      version:     self.version + 1,
      text:        Rope::from_str(text),
    }
  }

  /// Path of a `file:` document.
  pub fn path(&self) -> Option<PathBuf> {
    path_for_file_uri(&self.uri)
  }

  pub fn is_file(&self) -> bool {
    url::Url::parse(&self.uri).is_ok_and(|uri| uri.scheme() == "file")
  }
}

pub fn file_uri_for_path(path: &Path) -> Option<String> {
  let absolute = if path.is_absolute() {
    path.to_path_buf()
  } else {
    std::env::current_dir().ok()?.join(path)
  };
  url::Url::from_file_path(absolute).ok().map(String::from)
}

pub fn path_for_file_uri(uri: &str) -> Option<PathBuf> {
  let parsed = url::Url::parse(uri).ok()?;
  if parsed.scheme() != "file" {
    return None;
  }
  parsed.to_file_path().ok()
}
