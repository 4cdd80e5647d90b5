//! Daily window planning: midnight-to-midnight intervals in a fixed-offset timezone.

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, TimeDelta, Utc};

use crate::error::EngineError;
use crate::types::{AnalysisRequest, AnalysisWindow};

pub const DEFAULT_DAYS: u32 = 7;

/// Upper bound for every day count a caller supplies (range, baseline, horizon).
pub const MAX_DAYS: u32 = 36_525;

/// UTC as a fixed offset (the default timezone).
pub fn utc() -> FixedOffset {
  Utc.fix()
}

/// Reject day counts above [`MAX_DAYS`].
pub fn check_days(field: &str, days: u32) -> Result<(), EngineError> {
  if days > MAX_DAYS {
    return Err(EngineError::validation(
      field,
      &format!("{} days exceeds the maximum of {}", days, MAX_DAYS),
    ));
  }
  Ok(())
}

/// `ts` shifted by `days` whole days, or `None` past chrono's representable range.
pub fn shift_days(ts: DateTime<FixedOffset>, days: i64) -> Option<DateTime<FixedOffset>> {
  TimeDelta::try_days(days).and_then(|d| ts.checked_add_signed(d))
}

/// Resolve a request into ordered, non-overlapping daily windows.
///
/// - since + until given: use both.
/// - otherwise until defaults to `now`, and since to `until - days` (days defaults to 7)
///   unless since is given.
///
/// A range that leaves chrono's representable dates yields no windows.
pub fn plan(request: &AnalysisRequest, now: DateTime<Utc>) -> Vec<AnalysisWindow> {
  let tz = request.timezone.unwrap_or_else(utc);

  if let (Some(since), Some(until)) = (request.since, request.until) {
    return daily_windows(since, until, tz);
  }

  let until = request.until.unwrap_or_else(|| now.with_timezone(&tz));
  let days = request.days.unwrap_or(DEFAULT_DAYS);
  let since = match request.since {
    Some(since) => since,
    None => match shift_days(until, -i64::from(days)) {
      Some(since) => since,
      None => return Vec::new(),
    },
  };

  daily_windows(since, until, tz)
}

/// Consecutive day windows covering `[midnight(since), midnight(until))` in `tz`.
pub fn daily_windows(
  since: DateTime<FixedOffset>,
  until: DateTime<FixedOffset>,
  tz: FixedOffset,
) -> Vec<AnalysisWindow> {
  let mut windows = Vec::new();
  let mut current = local_midnight(since, tz);
  let end = local_midnight(until, tz);

  while current < end {
    match day_window(current) {
      Some(w) => {
        current = w.end;
        windows.push(w);
      }
      None => break,
    }
  }

  windows
}

/// `days` daily windows ending at the midnight on or before `anchor`, oldest first.
///
/// At most [`MAX_DAYS`] windows; days before chrono's earliest date are dropped.
pub fn trailing_windows(anchor: DateTime<FixedOffset>, days: u32) -> Vec<AnalysisWindow> {
  let end = local_midnight(anchor, *anchor.offset());
  (1..=i64::from(days.min(MAX_DAYS)))
    .rev()
    .filter_map(|i| shift_days(end, -i).and_then(day_window))
    .collect()
}

/// The local midnight starting the day that contains `ts`.
pub fn local_midnight(ts: DateTime<FixedOffset>, tz: FixedOffset) -> DateTime<FixedOffset> {
  let local_date = ts.with_timezone(&tz).date_naive();
  let naive_local = local_date.and_time(NaiveTime::MIN);
  match naive_local.checked_sub_signed(TimeDelta::seconds(i64::from(tz.local_minus_utc()))) {
    Some(naive_utc) => DateTime::from_naive_utc_and_offset(naive_utc, tz),
    None => ts,
  }
}

fn day_window(start: DateTime<FixedOffset>) -> Option<AnalysisWindow> {
  Some(AnalysisWindow {
    start,
    end: shift_days(start, 1)?,
    label: start.format("%Y-%m-%d").to_string(),
  })
}
