pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod render;
pub mod state;
pub mod stats;
pub mod store;
pub mod task;
pub mod ui;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use crate::state::{
  Action,
  AppState
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskflow CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let cfg = config::Config::load(
    cli.taskflowrc.as_deref(),
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  )
  .context("failed to load configuration")?;

  let data_dir = cfg
    .data_dir(cli.data.as_deref())
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let mut renderer =
    render::Renderer::new(&cfg);
  let command = match cli.command {
    | Some(command) => command,
    | None => {
      cli::Command::from_default(&cfg)
    }
  };

  commands::dispatch(
    &store,
    &cfg,
    &mut renderer,
    command
  )?;

  info!("done");
  Ok(())
}
