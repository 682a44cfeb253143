use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Days,
  NaiveDate,
  Weekday
};
use regex::Regex;

fn relative_re() -> &'static Regex {
  static RELATIVE: OnceLock<Regex> =
    OnceLock::new();
  RELATIVE.get_or_init(|| {
    Regex::new(
      r"^\+?(\d{1,4})\s*(d|day|days|w|wk|week|weeks)$"
    )
    .unwrap_or_else(|_| {
      unreachable!(
        "static relative date pattern \
         is valid"
      )
    })
  })
}

/// Parses a due-date expression relative to `today`.
///
/// Accepts `YYYY-MM-DD`, `today`, `tomorrow`, `yesterday`, weekday names
/// (the next such day, never today), and offsets like `3d`, `+2w`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_date(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return add_days(today, 1);
    }
    | "yesterday" => {
      return today
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!(
            "date out of range: \
             yesterday"
          )
        });
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, weekday
    ));
  }

  if let Some(caps) =
    relative_re().captures(&lower)
  {
    let amount: u64 = caps[1]
      .parse()
      .context("invalid offset")?;
    let days = match &caps[2] {
      | "d" | "day" | "days" => amount,
      | _ => amount * 7
    };
    return add_days(today, days);
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "unrecognized due date: {token}"
    )
  })
}

fn add_days(
  date: NaiveDate,
  days: u64
) -> anyhow::Result<NaiveDate> {
  date
    .checked_add_days(Days::new(days))
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {date} + \
         {days} days"
      )
    })
}

fn parse_weekday_name(
  input: &str
) -> Option<Weekday> {
  match input {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  today: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let current = today
    .weekday()
    .num_days_from_monday()
    as i64;
  let wanted =
    target.num_days_from_monday()
      as i64;
  let mut delta =
    (wanted - current).rem_euclid(7);
  if delta == 0 {
    delta = 7;
  }
  today
    .checked_add_days(Days::new(
      delta as u64
    ))
    .unwrap_or(today)
}
