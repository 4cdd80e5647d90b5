//! Binary entrypoint: analyze one repository and print the result document as JSON.
//!
//! Logs go to stderr (`RUST_LOG`, default `mood_engine=info`); stdout carries only JSON.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mood_engine::types::AnalysisRequest;
use mood_engine::window::utc;
use mood_engine::{Config, Engine};

#[derive(Parser)]
#[command(
  name = "mood-engine",
  about = "Per-day mood proxy for a git repository",
  long_about = None,
)]
struct Cli {
  /// Repository to analyze.
  #[arg(default_value = ".")]
  path: PathBuf,

  /// First day to analyze: RFC 3339 or YYYY-MM-DD.
  #[arg(long)]
  since: Option<String>,

  /// End of the analyzed range (exclusive): RFC 3339 or YYYY-MM-DD.
  #[arg(long)]
  until: Option<String>,

  /// Days to analyze when --since is not given.
  #[arg(long)]
  days: Option<u32>,

  /// Only count commits whose author name or email contains this text.
  #[arg(long)]
  author: Option<String>,

  /// Branch or revspec to walk instead of HEAD.
  #[arg(long)]
  branch: Option<String>,

  /// Timezone for day boundaries: UTC or +HH:MM / -HH:MM.
  #[arg(long, value_parser = parse_offset)]
  tz: Option<FixedOffset>,

  /// Trailing days used to build the baseline.
  #[arg(long, default_value_t = 56)]
  baseline_days: u32,

  /// Days scanned after each window for follow-up fixes.
  #[arg(long)]
  follow_up_horizon: Option<u32>,

  /// Ask an AI engine to explain and adjust each day.
  #[arg(long)]
  ai: bool,

  /// AI engine id (openai, anthropic, deepseek, google). Defaults to the config value.
  #[arg(long)]
  ai_engine: Option<String>,

  /// API key for the AI engine.
  #[arg(long = "ai-key", env = "MOOD_ENGINE_AI_KEY", hide_env_values = true)]
  ai_key: Option<String>,

  /// TOML config file.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Rebuild the baseline instead of using the cache.
  #[arg(long)]
  no_cache: bool,

  /// Pretty-print the JSON output.
  #[arg(long)]
  pretty: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mood_engine=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
    .init();

  let cli = Cli::parse();

  let mut config = match &cli.config {
    Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
    None => Config::default(),
  };
  if let Some(key) = cli.ai_key.clone().filter(|k| !k.trim().is_empty()) {
    config.ai.api_key = Some(key);
  }

  let tz = cli.tz.unwrap_or_else(utc);
  let request = AnalysisRequest {
    since: cli.since.as_deref().map(|s| parse_date(s, tz)).transpose()?,
    until: cli.until.as_deref().map(|s| parse_date(s, tz)).transpose()?,
    days: cli.days,
    author: cli.author.clone(),
    branch: cli.branch.clone(),
    timezone: cli.tz,
    baseline_days: cli.baseline_days,
    follow_up_horizon_days: cli.follow_up_horizon,
    ai_enabled: cli.ai,
    ai_engine: cli.ai_engine.clone().unwrap_or_else(|| config.ai.engine.clone()),
    output_format: "json".into(),
  };

  let mut engine = Engine::new(config);
  if cli.no_cache {
    engine = engine.without_cache();
  }

  let result = engine
    .analyze(&cli.path, &request)
    .with_context(|| format!("analyzing {}", cli.path.display()))?;

  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());
  if cli.pretty {
    serde_json::to_writer_pretty(&mut out, &result)?;
  } else {
    serde_json::to_writer(&mut out, &result)?;
  }
  writeln!(out)?;
  out.flush()?;
  Ok(())
}

/// `UTC`, `Z` or `+HH:MM` / `-HH:MM`.
fn parse_offset(raw: &str) -> Result<FixedOffset, String> {
  let s = raw.trim();
  if s.eq_ignore_ascii_case("utc") || s == "Z" {
    return Ok(utc());
  }

  let (sign, rest) = match s.as_bytes().first() {
    Some(b'+') => (1, &s[1..]),
    Some(b'-') => (-1, &s[1..]),
    _ => return Err(format!("invalid timezone {:?}: expected UTC or +HH:MM", raw)),
  };
  let (h, m) = rest
    .split_once(':')
    .ok_or_else(|| format!("invalid timezone {:?}: expected +HH:MM", raw))?;
  let hours: i32 = h.parse().map_err(|_| format!("invalid timezone hours in {:?}", raw))?;
  let minutes: i32 = m.parse().map_err(|_| format!("invalid timezone minutes in {:?}", raw))?;
  if minutes >= 60 {
    return Err(format!("invalid timezone minutes in {:?}", raw));
  }

  FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
    .ok_or_else(|| format!("timezone out of range: {:?}", raw))
}

/// RFC 3339, or a bare date meaning local midnight in `tz`.
fn parse_date(raw: &str, tz: FixedOffset) -> Result<DateTime<FixedOffset>> {
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Ok(ts);
  }
  let date = match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    Ok(d) => d,
    Err(_) => bail!("invalid date {:?}: expected YYYY-MM-DD or RFC 3339", raw),
  };
  tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
    .single()
    .with_context(|| format!("ambiguous local date {:?}", raw))
}
