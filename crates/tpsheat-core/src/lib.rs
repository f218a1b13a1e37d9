pub mod aggregate;
pub mod cli;
pub mod config;
pub mod datetime;
pub mod error;
pub mod heatmap;
pub mod layout;
pub mod partition;
pub mod reduce;
pub mod render;
pub mod sample;
pub mod snapshot;

use std::ffi::OsString;
use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use crate::error::HeatmapError;
pub use crate::heatmap::{
  Heatmap,
  HeatmapOptions
};
pub use crate::sample::Sample;

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
    "starting tpsheat"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.heatmaprc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let mut renderer =
    render::Renderer::new(&cfg)?;

  if cli.show_config {
    renderer.print_config(&cfg)?;
    return Ok(());
  }

  let options =
    config::heatmap_options(&cfg)
      .context(
        "invalid heatmap configuration"
      )?;

  let input = cli.input.ok_or_else(|| {
    anyhow::anyhow!(
      "no input snapshot given"
    )
  })?;
  let samples =
    snapshot::load_samples(&input)
      .with_context(|| {
        format!(
          "failed to load samples from \
           {}",
          input.display()
        )
      })?;

  let heatmap =
    Heatmap::build(&samples, &options)
      .with_context(|| {
        format!(
          "failed to lay out {}",
          input.display()
        )
      })?;

  if cli.summary {
    renderer.print_summary(&heatmap)?;
  } else if let Some(path) = cli.output
  {
    snapshot::write_json_atomic(
      &path, &heatmap
    )
    .with_context(|| {
      format!(
        "failed to write {}",
        path.display()
      )
    })?;
    info!(output = %path.display(), "wrote layout");
  } else {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(
      &mut out, &heatmap
    )?;
    writeln!(out)?;
  }

  info!("done");
  Ok(())
}
