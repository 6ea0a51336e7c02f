//! Runs Spotless through its Gradle IDE hook.

use std::{
  collections::HashMap,
  path::{
    Path,
    PathBuf,
  },
  process::Stdio,
  sync::atomic::{
    AtomicU64,
    Ordering,
  },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use spotless_loader::GradleConfig;
use tokio::{
  io::AsyncWriteExt,
  process::Command,
};
use tokio_util::sync::CancellationToken;

use crate::{
  document::TextDocument,
  gateway::{
    FormatError,
    FormatOutcome,
    FormatterGateway,
    interpret_output,
  },
};

const PROJECT_MARKERS: &[&str] = &[
  "settings.gradle",
  "settings.gradle.kts",
  "build.gradle",
  "build.gradle.kts",
  "gradlew",
];

#[cfg(windows)]
const WRAPPER: &str = "gradlew.bat";
#[cfg(not(windows))]
const WRAPPER: &str = "gradlew";

/// Arguments telling the Spotless plugin to format only `path`, reading the
/// content from stdin and writing the result to stdout.
pub fn hook_args(path: &str) -> Vec<String> {
  vec![
    format!("-PspotlessIdeHook={path}"),
    "-PspotlessIdeHookUseStdIn".to_string(),
    "-PspotlessIdeHookUseStdOut".to_string(),
    "--quiet".to_string(),
  ]
}

/// The Gradle project `file` belongs to.
///
/// The nearest ancestor holding a settings script wins so subprojects are
/// formatted from their root build. Otherwise the nearest ancestor with a
/// build script or wrapper is used.
pub fn find_project_dir(file: &Path) -> Option<PathBuf> {
  let start = file.parent()?;
  start
    .ancestors()
    .find(|dir| {
      dir.join("settings.gradle").is_file() || dir.join("settings.gradle.kts").is_file()
    })
    .or_else(|| {
      start
        .ancestors()
        .find(|dir| PROJECT_MARKERS.iter().any(|marker| dir.join(marker).is_file()))
    })
    .map(Path::to_path_buf)
}

/// The path as handed to Gradle. Drive letters are upper-cased on Windows.
fn sanitize_path(path: &Path) -> String {
  let path = path.to_string_lossy();
  if cfg!(windows) {
    upper_first(&path)
  } else {
    path.into_owned()
  }
}

fn upper_first(text: &str) -> String {
  let mut chars = text.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

struct Running {
  id:   u64,
  kill: CancellationToken,
}

/// Formats documents by running `spotlessApply` with the IDE hook enabled.
///
/// One Gradle process runs per format request and is killed when the request
/// is dropped. [`FormatterGateway::cancel`] kills every run of a document.
pub struct GradleGateway {
  config:  GradleConfig,
  running: Mutex<HashMap<String, Vec<Running>>>,
  next_id: AtomicU64,
}

/// Unregisters a finished or abandoned run.
struct RunGuard<'a> {
  running: &'a Mutex<HashMap<String, Vec<Running>>>,
  uri:     &'a str,
  id:      u64,
}

impl Drop for RunGuard<'_> {
  fn drop(&mut self) {
    let mut running = self.running.lock();
    if let Some(runs) = running.get_mut(self.uri) {
      runs.retain(|run| run.id != self.id);
      if runs.is_empty() {
        running.remove(self.uri);
      }
    }
  }
}

impl GradleGateway {
  pub fn new(config: GradleConfig) -> Self {
    Self {
      config,
      running: Mutex::new(HashMap::new()),
      next_id: AtomicU64::new(0),
    }
  }

  fn program(&self, project: &Path) -> PathBuf {
    match &self.config.command {
      // relative paths such as `./gradlew` are relative to the project
      Some(command) if command.contains(['/', '\\']) => project.join(command),
      Some(command) => PathBuf::from(command),
      None => {
        let wrapper = project.join(WRAPPER);
        if wrapper.is_file() {
          wrapper
        } else {
          PathBuf::from("gradle")
        }
      },
    }
  }

  fn command(&self, project: &Path, file: &Path) -> Command {
    let mut command = Command::new(self.program(project));
    command
      .arg(&self.config.task)
      .args(hook_args(&sanitize_path(file)))
      .args(&self.config.args)
      .current_dir(project)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    command
  }

  fn register(&self, uri: &str) -> (u64, CancellationToken) {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let kill = CancellationToken::new();
    let mut running = self.running.lock();
    let runs = running.entry(uri.to_string()).or_default();
    if !runs.is_empty() {
      log::debug!("{} other Spotless run(s) active for {uri}", runs.len());
    }
    runs.push(Running {
      id,
      kill: kill.clone(),
    });
    (id, kill)
  }
}

async fn run_hook(
  mut command: Command,
  input: String,
  kill: CancellationToken,
) -> Result<(String, String), FormatError> {
  let mut child = command
    .spawn()
    .map_err(|err| FormatError::Spawn(err.to_string()))?;
  let mut stdin = child
    .stdin
    .take()
    .ok_or_else(|| FormatError::Io("failed to open Gradle stdin".to_string()))?;

  let write = async move {
    stdin.write_all(input.as_bytes()).await?;
    stdin.shutdown().await
  };
  // stdin is fed while the output is drained so neither pipe can fill up
  let run = async move {
    let (written, output) = tokio::join!(write, child.wait_with_output());
    if let Err(err) = written {
      log::debug!("Gradle closed stdin early: {err}");
    }
    output
  };

  let output = tokio::select! {
    biased;
    _ = kill.cancelled() => return Err(FormatError::Cancelled),
    output = run => output.map_err(|err| FormatError::Io(err.to_string()))?,
  };

  if !output.status.success() {
    log::debug!("Gradle exited with {}", output.status);
  }
  Ok((
    String::from_utf8_lossy(&output.stdout).into_owned(),
    String::from_utf8_lossy(&output.stderr).into_owned(),
  ))
}

#[async_trait]
impl FormatterGateway for GradleGateway {
  async fn format(&self, document: &TextDocument) -> Result<FormatOutcome, FormatError> {
    let path = document.path().ok_or(FormatError::Untitled)?;
    let project = find_project_dir(&path).ok_or_else(|| FormatError::NoProject(path.clone()))?;
    let command = self.command(&project, &path);

    let (id, kill) = self.register(&document.uri);
    let _guard = RunGuard {
      running: &self.running,
      uri: &document.uri,
      id,
    };
    log::debug!(
      "running {} for {} in {}",
      self.config.task,
      path.display(),
      project.display()
    );
    let (stdout, stderr) = run_hook(command, document.text.to_string(), kill).await?;

    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    interpret_output(&name, stdout, &stderr)
  }

  async fn cancel(&self, uri: &str) {
    let runs = self.running.lock().remove(uri).unwrap_or_default();
    for run in runs {
      log::debug!("killing Spotless run {} for {uri}", run.id);
      run.kill.cancel();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[test]
  fn hook_arguments() {
    assert_eq!(
      hook_args("/work/App.java"),
      [
        "-PspotlessIdeHook=/work/App.java",
        "-PspotlessIdeHookUseStdIn",
        "-PspotlessIdeHookUseStdOut",
        "--quiet",
      ]
    );
  }

  #[test]
  fn drive_letters_are_upper_cased() {
    assert_eq!(upper_first(r"c:\work\App.java"), r"C:\work\App.java");
    assert_eq!(upper_first(""), "");
  }

  #[test]
  fn settings_script_marks_the_root_project() {
    let root = tempfile::tempdir().unwrap();
    let app = root.path().join("app");
    let src = app.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(root.path().join("settings.gradle.kts"), "").unwrap();
    fs::write(app.join("build.gradle.kts"), "").unwrap();

    assert_eq!(
      find_project_dir(&src.join("App.java")),
      Some(root.path().to_path_buf())
    );
  }

  #[test]
  fn build_script_without_settings() {
    let root = tempfile::tempdir().unwrap();
    let src = root.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(root.path().join("build.gradle"), "").unwrap();

    assert_eq!(
      find_project_dir(&src.join("App.java")),
      Some(root.path().to_path_buf())
    );
  }

  #[test]
  fn program_resolution() {
    let project = tempfile::tempdir().unwrap();
    let gateway = GradleGateway::new(GradleConfig::default());
    assert_eq!(gateway.program(project.path()), PathBuf::from("gradle"));

    fs::write(project.path().join(WRAPPER), "").unwrap();
    assert_eq!(gateway.program(project.path()), project.path().join(WRAPPER));

    let gateway = GradleGateway::new(GradleConfig {
      command: Some("./gradlew".to_string()),
      ..GradleConfig::default()
    });
    assert_eq!(
      gateway.program(project.path()),
      project.path().join("./gradlew")
    );
  }

  #[tokio::test(flavor = "current_thread")]
  async fn untitled_documents_are_rejected() {
    let gateway = GradleGateway::new(GradleConfig::default());
    let document = TextDocument::new("untitled:Untitled-1", "java", 1, "class A {}");
    assert_eq!(
      gateway.format(&document).await,
      Err(FormatError::Untitled)
    );
  }

  #[cfg(unix)]
  mod hook {
    use std::{
      os::unix::fs::PermissionsExt,
      sync::Arc,
      time::Duration,
    };

    use super::*;
    use crate::gateway::format_with_cancellation;

    /// A project whose "gradle" is the shell script `body`.
    fn project(body: &str) -> (tempfile::TempDir, GradleGateway, TextDocument) {
      let root = tempfile::tempdir().unwrap();
      fs::write(root.path().join("settings.gradle"), "").unwrap();
      let script = root.path().join("fake-gradle");
      fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
      fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

      let gateway = GradleGateway::new(GradleConfig {
        command: Some(script.to_string_lossy().into_owned()),
        ..GradleConfig::default()
      });
      let file = root.path().join("App.java");
      let document = TextDocument::from_path(&file, "class a {}\n").unwrap();
      (root, gateway, document)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dirty_files_are_formatted_from_stdin() {
      let (_root, gateway, document) = project("tr a-z A-Z\necho 'IS DIRTY' >&2");
      assert_eq!(
        gateway.format(&document).await,
        Ok(FormatOutcome::Changed("CLASS A {}\n".to_string()))
      );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failures_report_stderr() {
      let (_root, gateway, document) =
        project("cat > /dev/null\necho 'Task spotlessApply not found' >&2\nexit 1");
      assert_eq!(
        gateway.format(&document).await,
        Err(FormatError::Failed("Task spotlessApply not found".to_string()))
      );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hook_arguments_are_passed() {
      let (_root, gateway, document) =
        project("cat > /dev/null\necho \"$@\"\necho 'IS DIRTY' >&2");
      let path = document.path().unwrap();
      let Ok(FormatOutcome::Changed(args)) = gateway.format(&document).await else {
        panic!("expected the arguments on stdout");
      };
      assert_eq!(
        args.trim(),
        format!(
          "spotlessApply -PspotlessIdeHook={} -PspotlessIdeHookUseStdIn -PspotlessIdeHookUseStdOut --quiet",
          path.display()
        )
      );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancel_kills_the_process() {
      let (_root, gateway, document) = project("sleep 5");
      let gateway = Arc::new(gateway);

      let run = tokio::spawn({
        let gateway = gateway.clone();
        let document = document.clone();
        async move { gateway.format(&document).await }
      });
      tokio::time::sleep(Duration::from_millis(100)).await;
      gateway.cancel(&document.uri).await;

      let outcome = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap();
      assert_eq!(outcome, Err(FormatError::Cancelled));
      assert!(gateway.running.lock().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancelling_one_request_keeps_the_other_running() {
      let (_root, gateway, document) = project("sleep 0.3\ntr a-z A-Z\necho 'IS DIRTY' >&2");
      let gateway = Arc::new(gateway);
      let cancel = CancellationToken::new();

      let explicit = tokio::spawn({
        let gateway = gateway.clone();
        let document = document.clone();
        async move { gateway.format(&document).await }
      });
      let diagnostics = tokio::spawn({
        let gateway = gateway.clone();
        let document = document.clone();
        let cancel = cancel.clone();
        async move { format_with_cancellation(&*gateway, &document, &cancel).await }
      });
      tokio::time::sleep(Duration::from_millis(50)).await;
      assert_eq!(
        gateway.running.lock().get(&document.uri).map(Vec::len),
        Some(2)
      );

      cancel.cancel();
      assert_eq!(diagnostics.await.unwrap(), Err(FormatError::Cancelled));
      assert_eq!(
        gateway.running.lock().get(&document.uri).map(Vec::len),
        Some(1)
      );

      let outcome = tokio::time::timeout(Duration::from_secs(2), explicit)
        .await
        .unwrap()
        .unwrap();
      assert_eq!(outcome, Ok(FormatOutcome::Changed("CLASS A {}\n".to_string())));
      assert!(gateway.running.lock().is_empty());
    }
  }
}
