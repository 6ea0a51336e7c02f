use std::{
  path::{
    Path,
    PathBuf,
  },
  sync::Arc,
};

use anyhow::{
  Context,
  Result,
  anyhow,
};
use serde::Serialize;
use spotless_gradle::{
  DiagnosticsReconciler,
  FeatureGate,
  Formatter,
  GradleGateway,
  PositionedProblem,
  ReconcileOutcome,
  TextDocument,
};
use spotless_loader::Config;
use tokio_util::sync::CancellationToken;

use crate::cli::{
  Action,
  CliOptions,
};

mod cli;

const EXIT_PROBLEMS: i32 = 1;
const EXIT_ERROR: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
  let exit_code = main_impl().await?;
  std::process::exit(exit_code);
}

async fn main_impl() -> Result<i32> {
  let args = CliOptions::parse()?;

  spotless_loader::initialize_config_file(args.config_file.clone());
  spotless_loader::initialize_log_file(args.log_file.clone());
  setup_logging(args.verbosity).context("failed to initialize logging")?;

  let config = Config::load_default().context("failed to load configuration")?;
  let features = Arc::new(FeatureGate::new(&config));
  features.set_ready(true);
  let gateway = Arc::new(GradleGateway::new(config.gradle.clone()));

  match args.action {
    Action::Check { json } => {
      let reconciler = DiagnosticsReconciler::new(gateway, features, config.debounce());
      check(&reconciler, &args.files, json).await
    },
    Action::Apply => {
      let formatter = Formatter::new(gateway, features, None);
      Ok(apply(&formatter, &args.files).await)
    },
  }
}

fn setup_logging(verbosity: u8) -> Result<()> {
  let level = match verbosity {
    0 => log::LevelFilter::Warn,
    1 => log::LevelFilter::Info,
    2 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  };

  fern::Dispatch::new()
    .format(|out, message, record| {
      out.finish(format_args!(
        "{} {} [{}] {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.target(),
        record.level(),
        message
      ))
    })
    .level(level)
    .chain(fern::log_file(spotless_loader::log_file())?)
    .apply()?;

  Ok(())
}

async fn open(path: &Path) -> Result<TextDocument> {
  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("unable to read {}", path.display()))?;
  TextDocument::from_path(path, &text)
    .ok_or_else(|| anyhow!("{} is not a valid file path", path.display()))
}

#[derive(Serialize)]
struct FileReport {
  path:     PathBuf,
  problems: Vec<PositionedProblem>,
}

async fn check(
  reconciler: &DiagnosticsReconciler<GradleGateway>,
  files: &[PathBuf],
  json: bool,
) -> Result<i32> {
  let mut reports = Vec::new();
  let mut failed = false;

  for path in files {
    let document = match open(path).await {
      Ok(document) => document,
      Err(err) => {
        eprintln!("{err:#}");
        failed = true;
        continue;
      },
    };

    match reconciler.reconcile(document.clone(), None).await {
      Ok(ReconcileOutcome::Published { uri, .. }) => {
        reports.push(FileReport {
          path:     path.clone(),
          problems: reconciler.problems(&uri),
        });
      },
      Ok(ReconcileOutcome::Skipped) => {
        log::info!("diagnostics are disabled for {}", path.display());
      },
      Ok(ReconcileOutcome::Discarded) => {},
      Err(err) => {
        eprintln!("{}: {err}", path.display());
        failed = true;
      },
    }
    reconciler.close_document(&document.uri).await;
  }

  if json {
    println!("{}", serde_json::to_string_pretty(&reports)?);
  } else {
    for report in &reports {
      for problem in &report.problems {
        println!(
          "{}:{}:{}: {}",
          report.path.display(),
          problem.range.start.line + 1,
          problem.range.start.character + 1,
          problem.message
        );
      }
    }
  }

  let problems = reports.iter().any(|report| !report.problems.is_empty());
  Ok(if failed {
    EXIT_ERROR
  } else if problems {
    EXIT_PROBLEMS
  } else {
    0
  })
}

async fn apply(formatter: &Formatter<GradleGateway>, files: &[PathBuf]) -> i32 {
  let mut exit_code = 0;
  for path in files {
    if let Err(err) = apply_file(formatter, path).await {
      eprintln!("{err:#}");
      exit_code = EXIT_ERROR;
    }
  }
  exit_code
}

async fn apply_file(formatter: &Formatter<GradleGateway>, path: &Path) -> Result<()> {
  let document = open(path).await?;
  let edit = formatter
    .format_document(&document, CancellationToken::new())
    .await
    .with_context(|| format!("unable to format {}", path.display()))?;
  let Some(edit) = edit else {
    log::info!("{} is already formatted", path.display());
    return Ok(());
  };

  let formatted = edit.apply(&document.text)?;
  tokio::fs::write(path, formatted.to_string())
    .await
    .with_context(|| format!("unable to write {}", path.display()))?;
  println!("formatted {}", path.display());
  Ok(())
}
