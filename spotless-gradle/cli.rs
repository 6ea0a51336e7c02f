use std::path::PathBuf;

use anyhow::{
  Result,
  bail,
};
use clap::{
  ArgAction,
  Parser,
  Subcommand,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
  /// Report formatting problems without touching the files.
  Check { json: bool },
  /// Format the files in place.
  Apply,
}

#[derive(Clone, Debug)]
pub struct CliOptions {
  pub action:      Action,
  pub verbosity:   u8,
  pub log_file:    Option<PathBuf>,
  pub config_file: Option<PathBuf>,
  pub files:       Vec<PathBuf>,
}

impl CliOptions {
  pub fn parse() -> Result<Self> {
    let raw = RawCli::parse();
    raw.try_into()
  }
}

#[derive(Parser, Debug)]
#[command(name = "spotless-gradle", about, long_about = None, version)]
struct RawCli {
  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count, global = true)]
  verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE", global = true, value_parser = parse_pathbuf)]
  log_file: Option<PathBuf>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE", global = true, value_parser = parse_pathbuf)]
  config_file: Option<PathBuf>,

  #[command(subcommand)]
  command: RawCommand,
}

#[derive(Subcommand, Debug)]
enum RawCommand {
  /// Print formatting problems, exit with 1 when there are any
  Check {
    /// Print problems as JSON
    #[arg(long)]
    json: bool,

    #[arg(value_name = "files", required = true)]
    files: Vec<String>,
  },
  /// Format files in place
  Apply {
    #[arg(value_name = "files", required = true)]
    files: Vec<String>,
  },
}

impl TryFrom<RawCli> for CliOptions {
  type Error = anyhow::Error;

  fn try_from(raw: RawCli) -> Result<Self> {
    let (action, inputs) = match raw.command {
      RawCommand::Check { json, files } => (Action::Check { json }, files),
      RawCommand::Apply { files } => (Action::Apply, files),
    };

    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
      let path = absolute(&input)?;
      if path.is_dir() {
        bail!("'{input}' is a directory, expected a file");
      }
      if !files.contains(&path) {
        files.push(path);
      }
    }

    Ok(Self {
      action,
      verbosity: raw.verbosity,
      log_file: raw.log_file,
      config_file: raw.config_file,
      files,
    })
  }
}

fn absolute(value: &str) -> Result<PathBuf> {
  let path = PathBuf::from(value);
  if path.is_absolute() {
    return Ok(path);
  }
  Ok(std::env::current_dir()?.join(path))
}

fn parse_pathbuf(value: &str) -> std::result::Result<PathBuf, String> {
  absolute(value).map_err(|err| err.to_string())
}
