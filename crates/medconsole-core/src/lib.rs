pub mod backend;
pub mod billing;
pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod export;
pub mod model;
pub mod notifications;
pub mod query;
pub mod render;
pub mod retry;
pub mod storage;
pub mod validation;
pub mod view_state;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting medconsole"
  );

  let mut cfg = config::Config::load(
    cli.rc.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  )?;

  let data_dir = cfg
    .data_dir(cli.data.as_deref())
    .context(
      "failed to resolve data \
       directory"
    )?;

  let timezone =
    datetime::resolve_timezone(Some(
      &cfg.timezone
    ));
  let today = cli
    .today
    .unwrap_or_else(|| {
      datetime::today_in(timezone)
    });
  debug!(%timezone, %today, "resolved reference date");

  let renderer =
    render::Renderer::new(&cfg);
  let mut console = commands::Console {
    today,
    timezone,
    data_dir: data_dir.clone(),
    renderer: &renderer,
    out: io::stdout()
  };

  let runtime =
    tokio::runtime::Builder::new_multi_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  if let Some(url) = cfg.api_url.as_deref()
  {
    let backend =
      backend::HttpBackend::new(url)?;
    runtime.block_on(
      commands::dispatch(
        &backend,
        &mut console,
        cli.command
      )
    )?;
  } else {
    let snapshot_dir =
      cfg.snapshot_dir(&data_dir);
    let backend =
      backend::SnapshotBackend::open(
        &snapshot_dir
      )
      .with_context(|| {
        format!(
          "failed to open snapshot at \
           {}",
          snapshot_dir.display()
        )
      })?;
    runtime.block_on(
      commands::dispatch(
        &backend,
        &mut console,
        cli.command
      )
    )?;
  }

  info!("done");
  Ok(())
}
