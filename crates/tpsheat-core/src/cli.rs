use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tpsheat",
    version,
    about = "Lays out a per-second metric as a calendar heatmap"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "heatmaprc")]
    pub heatmaprc: Option<PathBuf>,

    /// JSON Lines snapshot of `{"timestamp", "value"}` records.
    #[arg(required_unless_present = "show_config")]
    pub input: Option<PathBuf>,

    /// Write the layout JSON here instead of stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Print a per-day table instead of JSON.
    #[arg(long = "summary", conflicts_with = "output")]
    pub summary: bool,

    #[arg(long = "show-config")]
    pub show_config: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn splits_positional_overrides() {
        let pre = preprocess_args(&args(&[
            "tpsheat",
            "rc.day.width=96",
            "samples.jsonl",
            "rc.reducer:average",
            "--summary",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, args(&["tpsheat", "samples.jsonl", "--summary"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.day.width".to_string(), "96".to_string()),
                ("rc.reducer".to_string(), "average".to_string()),
            ]
        );
    }

    #[test]
    fn parses_flags_and_rc_pairs() {
        let cli = GlobalCli::parse_from(args(&[
            "tpsheat",
            "-vv",
            "--rc",
            "week.start=sunday",
            "-o",
            "layout.json",
            "samples.jsonl",
        ]));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "week.start");
        assert_eq!(cli.rc_overrides[0].value, "sunday");
        assert_eq!(cli.input, Some(PathBuf::from("samples.jsonl")));
        assert_eq!(cli.output, Some(PathBuf::from("layout.json")));
    }

    #[test]
    fn input_optional_only_for_show_config() {
        assert!(GlobalCli::try_parse_from(args(&["tpsheat"])).is_err());
        let cli = GlobalCli::try_parse_from(args(&["tpsheat", "--show-config"]))
            .expect("show config without input");
        assert!(cli.show_config);
    }

    #[test]
    fn rejects_pair_without_equals() {
        assert!("week.start".parse::<KeyVal>().is_err());
    }
}
