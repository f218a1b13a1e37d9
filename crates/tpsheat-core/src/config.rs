use std::collections::{
  HashMap,
  HashSet
};
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::WeekStart;
use crate::error::HeatmapError;
use crate::heatmap::HeatmapOptions;
use crate::layout::{
  LabelMetrics,
  LayoutOptions,
  WeekIndexing
};
use crate::reduce::ReducerKind;

const HEATMAPRC_ENV_VAR: &str =
  "HEATMAPRC";

const DEFAULTS: &[(&str, &str)] = &[
  ("day.width", "288"),
  ("day.height", "60"),
  ("padding", "10"),
  ("spacing", "4"),
  ("legend.height", "20"),
  ("label.month.width", "80"),
  ("label.month.height", "12"),
  ("label.numeral.height", "10"),
  ("week.start", "monday"),
  ("week.indexing", "sequential"),
  ("break.months", "on"),
  ("break.weekstart", "on"),
  ("reducer", "percentile:1"),
  ("caption", ""),
  ("color", "on")
];

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    heatmaprc_override
  ))]
  pub fn load(
    heatmaprc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let heatmaprc =
      resolve_heatmaprc_path(
        heatmaprc_override
      )?;
    if let Some(path) = heatmaprc {
      info!(heatmaprc = %path.display(), "loading heatmaprc");
      cfg.load_file(
        &path,
        &mut HashSet::new()
      )?;
    } else {
      debug!(
        "no heatmaprc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// Parses `key` with `FromStr`,
  /// naming the key on failure.
  pub fn get_parsed<T>(
    &self,
    key: &str
  ) -> Result<Option<T>, HeatmapError>
  where
    T: FromStr
  {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(
      |_| {
        HeatmapError::InvalidConfiguration(
          format!(
            "invalid value for {key}: {raw}"
          )
        )
      }
    )
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// `chain` holds the files currently
  /// being read, so an include cycle is
  /// an error instead of a stack
  /// overflow.
  #[tracing::instrument(skip(self, chain))]
  fn load_file(
    &mut self,
    path: &Path,
    chain: &mut HashSet<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let identity = fs::canonicalize(&path)
      .unwrap_or_else(|_| path.clone());
    if !chain.insert(identity.clone()) {
      bail!(
        "include cycle at {}",
        path.display()
      );
    }
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self.load_file(
            &include_path,
            chain
          )?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      if !DEFAULTS
        .iter()
        .any(|(known, _)| *known == key)
      {
        warn!(key = %key, file = %path.display(), "unknown config key");
      }
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    chain.remove(&identity);
    Ok(())
  }
}

/// Turns the flat key map into
/// validated heatmap options.
#[tracing::instrument(skip(cfg))]
pub fn heatmap_options(
  cfg: &Config
) -> anyhow::Result<HeatmapOptions> {
  let defaults =
    LayoutOptions::default();
  let label_defaults =
    LabelMetrics::default();

  let week_start = match cfg
    .get("week.start")
  {
    | Some(raw) => {
      raw.parse::<WeekStart>().map_err(
        HeatmapError::InvalidConfiguration
      )?
    }
    | None => defaults.week_start
  };

  let layout = LayoutOptions {
    day_width: cfg
      .get_parsed("day.width")?
      .unwrap_or(defaults.day_width),
    day_height: cfg
      .get_parsed("day.height")?
      .unwrap_or(defaults.day_height),
    padding: cfg
      .get_parsed("padding")?
      .unwrap_or(defaults.padding),
    spacing: cfg
      .get_parsed("spacing")?
      .unwrap_or(defaults.spacing),
    legend_height: cfg
      .get_parsed("legend.height")?
      .unwrap_or(defaults.legend_height),
    labels: LabelMetrics {
      month_width:    cfg
        .get_parsed("label.month.width")?
        .unwrap_or(
          label_defaults.month_width
        ),
      month_height:   cfg
        .get_parsed(
          "label.month.height"
        )?
        .unwrap_or(
          label_defaults.month_height
        ),
      numeral_height: cfg
        .get_parsed(
          "label.numeral.height"
        )?
        .unwrap_or(
          label_defaults.numeral_height
        )
    },
    week_start,
    week_indexing: cfg
      .get_parsed::<WeekIndexing>(
        "week.indexing"
      )?
      .unwrap_or(defaults.week_indexing),
    break_on_month_change: cfg
      .get_bool("break.months")
      .unwrap_or(
        defaults.break_on_month_change
      ),
    suppress_break_on_week_start: cfg
      .get_bool("break.weekstart")
      .unwrap_or(
        defaults
          .suppress_break_on_week_start
      )
  };
  layout.validate()?;

  let reducer = match cfg.get("reducer") {
    | Some(raw) => {
      raw.parse::<ReducerKind>()?
    }
    | None => ReducerKind::default()
  };

  let options = HeatmapOptions {
    layout,
    reducer,
    caption: cfg
      .get("caption")
      .unwrap_or_default()
  };
  debug!(?options, "resolved heatmap options");
  Ok(options)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_heatmaprc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(HEATMAPRC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping ~/.heatmaprc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".heatmaprc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::{
    Config,
    heatmap_options
  };
  use crate::datetime::WeekStart;
  use crate::layout::WeekIndexing;
  use crate::reduce::ReducerKind;

  #[test]
  fn defaults_resolve_to_options() {
    let options = heatmap_options(
      &Config::default()
    )
    .expect("default options");
    assert_eq!(
      options.layout.day_width,
      288
    );
    assert_eq!(
      options.reducer,
      ReducerKind::Percentile {
        percent: 1.0
      }
    );
    assert!(
      options
        .layout
        .break_on_month_change
    );
    assert_eq!(options.caption, "");
  }

  #[test]
  fn file_include_and_overrides_layer()
  {
    let dir =
      tempdir().expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "week.start = sunday\n"
    )
    .expect("write include");
    let rc = dir.path().join("heatmaprc");
    fs::write(
      &rc,
      "# heatmap settings\n\
       day.width = 96  # 15 minute slices\n\
       include extra.rc\n\
       reducer = average\n\
       break.months = off\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(rc.as_path()))
      .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);

    cfg.apply_overrides(vec![(
      "rc.week.indexing".to_string(),
      "approximate".to_string()
    )]);
    let options = heatmap_options(&cfg)
      .expect("options");

    assert_eq!(
      options.layout.day_width,
      96
    );
    assert_eq!(
      options.layout.week_start,
      WeekStart::Sunday
    );
    assert_eq!(
      options.layout.week_indexing,
      WeekIndexing::Approximate
    );
    assert_eq!(
      options.reducer,
      ReducerKind::Average
    );
    assert!(
      !options
        .layout
        .break_on_month_change
    );
  }

  #[test]
  fn rejects_invalid_values() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "day.width".to_string(),
      "0".to_string()
    )]);
    assert!(
      heatmap_options(&cfg).is_err()
    );

    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "day.height".to_string(),
      "tall".to_string()
    )]);
    let err = heatmap_options(&cfg)
      .expect_err("bad height");
    assert!(
      err
        .to_string()
        .contains("day.height")
    );
  }

  #[test]
  fn rejects_malformed_lines() {
    let dir =
      tempdir().expect("tempdir");
    let rc = dir.path().join("heatmaprc");
    fs::write(&rc, "day.width 12\n")
      .expect("write rc");
    assert!(
      Config::load(Some(rc.as_path())).is_err()
    );
  }

  #[test]
  fn include_cycle_is_an_error() {
    let dir =
      tempdir().expect("tempdir");
    let rc = dir.path().join("heatmaprc");
    fs::write(
      &rc,
      "padding = 2\ninclude other.rc\n"
    )
    .expect("write rc");
    fs::write(
      dir.path().join("other.rc"),
      "include heatmaprc\n"
    )
    .expect("write other");

    let err =
      Config::load(Some(rc.as_path()))
        .expect_err("cycle");
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );
  }

  #[test]
  fn repeated_include_is_not_a_cycle()
  {
    let dir =
      tempdir().expect("tempdir");
    fs::write(
      dir.path().join("shared.rc"),
      "spacing = 2\n"
    )
    .expect("write shared");
    let rc = dir.path().join("heatmaprc");
    fs::write(
      &rc,
      "include shared.rc\n\
       include shared.rc\n"
    )
    .expect("write rc");

    let cfg =
      Config::load(Some(rc.as_path()))
        .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 3);
    assert_eq!(
      cfg.get("spacing").as_deref(),
      Some("2")
    );
  }
}
