//! Date and time functions
//!
//! Calendar components are read in the evaluation's UTC offset. Format strings use
//! the familiar `YYYY-MM-DD HH:mm:ss` token style; text in `[brackets]` is literal.

use super::{
    arg, map_first, numeric_at, FunctionDef, FunctionImpl, FunctionName, FunctionType,
    MultipleArgs, ReturnRule, DATE_TYPES,
};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use crate::value::{FormulaValue, TypedValue};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeZone,
    Timelike, Utc, Weekday,
};
use gridbase_core::CellValueType;
use lazy_regex::regex;

/// Format used by DATETIME_FORMAT when none is given
pub const DEFAULT_DATETIME_FORMAT: &str = "YYYY-MM-DD HH:mm";

/// Upper bound on the business days WORKDAY and WORKDAY_DIFF will walk
const MAX_WORKDAY_SPAN: i64 = 1_000_000;

pub(super) fn definitions() -> Vec<FunctionDef> {
    vec![
        date_fn(FunctionName::Today, fn_today)
            .args(0, Some(0))
            .returns(ReturnRule::Scalar(CellValueType::DateTime)),
        date_fn(FunctionName::Now, fn_now)
            .args(0, Some(0))
            .returns(ReturnRule::Scalar(CellValueType::DateTime)),
        component(FunctionName::Year, fn_year),
        component(FunctionName::Month, fn_month),
        component(FunctionName::Day, fn_day),
        component(FunctionName::Hour, fn_hour),
        component(FunctionName::Minute, fn_minute),
        component(FunctionName::Second, fn_second),
        component(FunctionName::Weekday, fn_weekday),
        component(FunctionName::WeekNum, fn_weeknum),
        date_fn(FunctionName::DateAdd, fn_date_add)
            .args(3, Some(3))
            .multiple(MultipleArgs::FirstOnly)
            .returns(ReturnRule::Inherit(CellValueType::DateTime))
            .validate_with(|p| numeric_at(p, &[1])),
        date_fn(FunctionName::DatetimeDiff, fn_datetime_diff)
            .args(2, Some(3))
            .returns(ReturnRule::Scalar(CellValueType::Number)),
        date_fn(FunctionName::IsSame, fn_is_same)
            .args(2, Some(3))
            .returns(ReturnRule::Scalar(CellValueType::Boolean)),
        date_fn(FunctionName::IsAfter, fn_is_after)
            .args(2, Some(3))
            .returns(ReturnRule::Scalar(CellValueType::Boolean)),
        date_fn(FunctionName::IsBefore, fn_is_before)
            .args(2, Some(3))
            .returns(ReturnRule::Scalar(CellValueType::Boolean)),
        to_text(FunctionName::DateStr, fn_datestr),
        to_text(FunctionName::TimeStr, fn_timestr),
        to_text(FunctionName::DatetimeFormat, fn_datetime_format).args(1, Some(2)),
        date_fn(FunctionName::DatetimeParse, fn_datetime_parse)
            .args(1, Some(2))
            .multiple(MultipleArgs::FirstOnly)
            .returns(ReturnRule::Inherit(CellValueType::DateTime)),
        component(FunctionName::FromNow, fn_fromnow).args(1, Some(2)),
        component(FunctionName::ToNow, fn_tonow).args(1, Some(2)),
        date_fn(FunctionName::Workday, fn_workday)
            .args(2, Some(3))
            .returns(ReturnRule::Scalar(CellValueType::DateTime))
            .validate_with(|p| numeric_at(p, &[1])),
        date_fn(FunctionName::WorkdayDiff, fn_workday_diff)
            .args(2, Some(3))
            .returns(ReturnRule::Scalar(CellValueType::Number)),
    ]
}

fn date_fn(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::Date, implementation).accepts(DATE_TYPES)
}

/// Number read from a date, mapped over a multiple first argument
fn component(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    date_fn(name, implementation)
        .multiple(MultipleArgs::FirstOnly)
        .returns(ReturnRule::Inherit(CellValueType::Number))
}

/// Text rendered from a date, mapped over a multiple first argument
fn to_text(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    date_fn(name, implementation)
        .multiple(MultipleArgs::FirstOnly)
        .returns(ReturnRule::Inherit(CellValueType::String))
}

/// Time units accepted by the date arithmetic functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl DateUnit {
    /// Parse a unit name: singular or plural, any case
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        match singular {
            "millisecond" => Some(DateUnit::Millisecond),
            "second" => Some(DateUnit::Second),
            "minute" => Some(DateUnit::Minute),
            "hour" => Some(DateUnit::Hour),
            "day" => Some(DateUnit::Day),
            "week" => Some(DateUnit::Week),
            "month" => Some(DateUnit::Month),
            "quarter" => Some(DateUnit::Quarter),
            "year" => Some(DateUnit::Year),
            _ => None,
        }
    }

    /// Fixed length in milliseconds; `None` for calendar units
    fn millis(&self) -> Option<i64> {
        match self {
            DateUnit::Millisecond => Some(1),
            DateUnit::Second => Some(1_000),
            DateUnit::Minute => Some(60_000),
            DateUnit::Hour => Some(3_600_000),
            DateUnit::Day => Some(86_400_000),
            DateUnit::Week => Some(604_800_000),
            DateUnit::Month | DateUnit::Quarter | DateUnit::Year => None,
        }
    }

    fn months(&self) -> u32 {
        match self {
            DateUnit::Quarter => 3,
            DateUnit::Year => 12,
            _ => 1,
        }
    }
}

/// Unit parameter at `index`, `default` when omitted
fn unit_arg(
    params: &[TypedValue],
    index: usize,
    function: FunctionName,
    default: Option<DateUnit>,
) -> FormulaResult<Option<DateUnit>> {
    match arg(params, index) {
        FormulaValue::Null => Ok(default),
        value => {
            let name = value.to_text();
            DateUnit::parse(&name).map(Some).ok_or_else(|| {
                FormulaError::invalid_params(function.as_str(), format!("unknown unit '{}'", name))
            })
        }
    }
}

fn date_arg(ctx: &EvaluationContext, params: &[TypedValue], index: usize) -> Option<DateTime<Utc>> {
    ctx.as_datetime(arg(params, index))
}

fn from_local(offset: &FixedOffset, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Map the first argument, as a date, through `f`
fn map_date<F>(params: &[TypedValue], ctx: &EvaluationContext, f: F) -> FormulaResult<FormulaValue>
where
    F: Fn(DateTime<FixedOffset>) -> FormulaValue,
{
    map_first(params, |v| {
        Ok(match ctx.as_datetime(v) {
            Some(dt) => f(ctx.local(&dt)),
            None => FormulaValue::Null,
        })
    })
}

fn number(n: impl Into<f64>) -> FormulaValue {
    FormulaValue::Number(n.into())
}

/// Start of the `unit` containing `local`
fn start_of(local: DateTime<FixedOffset>, unit: DateUnit) -> Option<DateTime<Utc>> {
    let date = local.date_naive();
    let naive = match unit {
        DateUnit::Millisecond => {
            let nanos = local.nanosecond() / 1_000_000 * 1_000_000;
            local.naive_local().with_nanosecond(nanos)?
        }
        DateUnit::Second => local.naive_local().with_nanosecond(0)?,
        DateUnit::Minute => date.and_hms_opt(local.hour(), local.minute(), 0)?,
        DateUnit::Hour => date.and_hms_opt(local.hour(), 0, 0)?,
        DateUnit::Day => date.and_hms_opt(0, 0, 0)?,
        DateUnit::Week => {
            let back = i64::from(date.weekday().num_days_from_sunday());
            (date - Duration::days(back)).and_hms_opt(0, 0, 0)?
        }
        DateUnit::Month => date.with_day(1)?.and_hms_opt(0, 0, 0)?,
        DateUnit::Quarter => {
            let month = (date.month() - 1) / 3 * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), month, 1)?.and_hms_opt(0, 0, 0)?
        }
        DateUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
    };
    from_local(local.offset(), naive)
}

fn add_months(local: DateTime<FixedOffset>, months: i64) -> Option<DateTime<FixedOffset>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        local.checked_add_months(magnitude)
    } else {
        local.checked_sub_months(magnitude)
    }
}

/// `dt` moved by `count` units
fn add_units(
    ctx: &EvaluationContext,
    dt: DateTime<Utc>,
    count: f64,
    unit: DateUnit,
) -> Option<DateTime<Utc>> {
    match unit.millis() {
        Some(ms) => {
            let delta = Duration::try_milliseconds((count * ms as f64).round() as i64)?;
            dt.checked_add_signed(delta)
        }
        None => {
            let months = (count.trunc() as i64).checked_mul(i64::from(unit.months()))?;
            add_months(ctx.local(&dt), months).map(|local| local.with_timezone(&Utc))
        }
    }
}

/// Whole calendar months from `b` to `a`, truncated toward zero
fn month_diff(a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> Option<i64> {
    let mut months = i64::from(a.year() - b.year()) * 12 + i64::from(a.month()) - i64::from(b.month());
    let anchor = add_months(b, months)?;
    if months > 0 && anchor > a {
        months -= 1;
    } else if months < 0 && anchor < a {
        months += 1;
    }
    Some(months)
}

/// `a - b` in whole units, truncated toward zero
fn diff_units(ctx: &EvaluationContext, a: DateTime<Utc>, b: DateTime<Utc>, unit: DateUnit) -> Option<f64> {
    match unit.millis() {
        Some(ms) => Some(((a - b).num_milliseconds() / ms) as f64),
        None => {
            let months = month_diff(ctx.local(&a), ctx.local(&b))?;
            Some((months / i64::from(unit.months())) as f64)
        }
    }
}

/// TODAY(): start of the current day
pub fn fn_today(_params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(start_of(ctx.local(&ctx.now), DateUnit::Day).map_or(FormulaValue::Null, FormulaValue::DateTime))
}

/// NOW()
pub fn fn_now(_params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::DateTime(ctx.now))
}

/// YEAR(date)
pub fn fn_year(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| number(dt.year()))
}

/// MONTH(date): 1-12
pub fn fn_month(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| number(dt.month()))
}

/// DAY(date): day of month
pub fn fn_day(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| number(dt.day()))
}

/// HOUR(date): 0-23
pub fn fn_hour(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| number(dt.hour()))
}

/// MINUTE(date)
pub fn fn_minute(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| number(dt.minute()))
}

/// SECOND(date)
pub fn fn_second(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| number(dt.second()))
}

/// WEEKDAY(date): 0 = Sunday
pub fn fn_weekday(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| number(dt.weekday().num_days_from_sunday()))
}

/// WEEKNUM(date): weeks start on Sunday, the week containing January 1 is week 1
pub fn fn_weeknum(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| {
        let offset = NaiveDate::from_ymd_opt(dt.year(), 1, 1)
            .map_or(0, |jan1| jan1.weekday().num_days_from_sunday());
        number((dt.ordinal0() + offset) / 7 + 1)
    })
}

/// DATE_ADD(date, count, unit)
pub fn fn_date_add(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let unit = unit_arg(params, 2, FunctionName::DateAdd, None)?;
    let (count, unit) = match (arg(params, 1).as_number(), unit) {
        (Some(count), Some(unit)) => (count, unit),
        _ => return Ok(FormulaValue::Null),
    };
    map_first(params, |v| {
        Ok(ctx
            .as_datetime(v)
            .and_then(|dt| add_units(ctx, dt, count, unit))
            .map_or(FormulaValue::Null, FormulaValue::DateTime))
    })
}

/// DATETIME_DIFF(date1, date2, [unit]): date1 - date2
pub fn fn_datetime_diff(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let unit = unit_arg(params, 2, FunctionName::DatetimeDiff, Some(DateUnit::Day))?;
    let result = match (date_arg(ctx, params, 0), date_arg(ctx, params, 1), unit) {
        (Some(a), Some(b), Some(unit)) => diff_units(ctx, a, b, unit),
        _ => None,
    };
    Ok(result.map_or(FormulaValue::Null, FormulaValue::Number))
}

fn compare_dates(
    params: &[TypedValue],
    ctx: &EvaluationContext,
    function: FunctionName,
) -> FormulaResult<Option<std::cmp::Ordering>> {
    let unit = unit_arg(params, 2, function, None)?;
    let (a, b) = match (date_arg(ctx, params, 0), date_arg(ctx, params, 1)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(None),
    };
    Ok(match unit {
        None => Some(a.cmp(&b)),
        Some(unit) => start_of(ctx.local(&a), unit)
            .zip(start_of(ctx.local(&b), unit))
            .map(|(a, b)| a.cmp(&b)),
    })
}

/// IS_SAME(date1, date2, [unit])
pub fn fn_is_same(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let ordering = compare_dates(params, ctx, FunctionName::IsSame)?;
    Ok(FormulaValue::Boolean(ordering == Some(std::cmp::Ordering::Equal)))
}

/// IS_AFTER(date1, date2, [unit])
pub fn fn_is_after(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let ordering = compare_dates(params, ctx, FunctionName::IsAfter)?;
    Ok(FormulaValue::Boolean(ordering == Some(std::cmp::Ordering::Greater)))
}

/// IS_BEFORE(date1, date2, [unit])
pub fn fn_is_before(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let ordering = compare_dates(params, ctx, FunctionName::IsBefore)?;
    Ok(FormulaValue::Boolean(ordering == Some(std::cmp::Ordering::Less)))
}

/// DATESTR(date): `YYYY-MM-DD`
pub fn fn_datestr(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| FormulaValue::String(dt.format("%Y-%m-%d").to_string()))
}

/// TIMESTR(date): `HH:mm:ss`
pub fn fn_timestr(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_date(params, ctx, |dt| FormulaValue::String(dt.format("%H:%M:%S").to_string()))
}

/// Render `dt` with `YYYY-MM-DD`-style tokens
pub fn format_datetime_tokens(dt: &DateTime<FixedOffset>, format: &str) -> String {
    let tokens = regex!(
        r"\[([^\]]*)\]|YYYY|YY|MMMM|MMM|MM|M|DD|D|dddd|ddd|dd|d|HH|H|hh|h|mm|m|ss|s|SSS|A|a|ZZ|Z|X|x"
    );
    tokens
        .replace_all(format, |caps: &regex::Captures| {
            if let Some(literal) = caps.get(1) {
                return literal.as_str().to_string();
            }
            let hour12 = match dt.hour() % 12 {
                0 => 12,
                h => h,
            };
            match &caps[0] {
                "YYYY" => format!("{:04}", dt.year()),
                "YY" => format!("{:02}", dt.year().rem_euclid(100)),
                "MMMM" => dt.format("%B").to_string(),
                "MMM" => dt.format("%b").to_string(),
                "MM" => format!("{:02}", dt.month()),
                "M" => dt.month().to_string(),
                "DD" => format!("{:02}", dt.day()),
                "D" => dt.day().to_string(),
                "dddd" => dt.format("%A").to_string(),
                "ddd" => dt.format("%a").to_string(),
                "dd" => dt.format("%a").to_string().chars().take(2).collect(),
                "d" => dt.weekday().num_days_from_sunday().to_string(),
                "HH" => format!("{:02}", dt.hour()),
                "H" => dt.hour().to_string(),
                "hh" => format!("{:02}", hour12),
                "h" => hour12.to_string(),
                "mm" => format!("{:02}", dt.minute()),
                "m" => dt.minute().to_string(),
                "ss" => format!("{:02}", dt.second()),
                "s" => dt.second().to_string(),
                "SSS" => format!("{:03}", dt.timestamp_subsec_millis()),
                "A" => meridiem(dt).to_string(),
                "a" => meridiem(dt).to_lowercase(),
                "Z" => dt.format("%:z").to_string(),
                "ZZ" => dt.format("%z").to_string(),
                "X" => dt.timestamp().to_string(),
                "x" => dt.timestamp_millis().to_string(),
                other => other.to_string(),
            }
        })
        .into_owned()
}

fn meridiem(dt: &DateTime<FixedOffset>) -> &'static str {
    if dt.hour() < 12 {
        "AM"
    } else {
        "PM"
    }
}

/// Translate `YYYY-MM-DD`-style tokens into a chrono parse pattern
fn parse_pattern(format: &str) -> String {
    let tokens = regex!(
        r"\[([^\]]*)\]|YYYY|YY|MMMM|MMM|MM|M|DD|D|HH|H|hh|h|mm|m|ss|s|SSS|A|a|ZZ|Z"
    );
    let escape = |s: &str| s.replace('%', "%%");

    let mut pattern = String::new();
    let mut last = 0;
    for caps in tokens.captures_iter(format) {
        let Some(whole) = caps.get(0) else { continue };
        pattern.push_str(&escape(&format[last..whole.start()]));
        last = whole.end();
        if let Some(literal) = caps.get(1) {
            pattern.push_str(&escape(literal.as_str()));
            continue;
        }
        pattern.push_str(match whole.as_str() {
            "YYYY" => "%Y",
            "YY" => "%y",
            "MMMM" => "%B",
            "MMM" => "%b",
            "MM" | "M" => "%m",
            "DD" | "D" => "%d",
            "HH" | "H" => "%H",
            "hh" | "h" => "%I",
            "mm" | "m" => "%M",
            "ss" | "s" => "%S",
            "SSS" => "%3f",
            "A" | "a" => "%p",
            _ => "%z",
        });
    }
    pattern.push_str(&escape(&format[last..]));
    pattern
}

fn parse_with_format(text: &str, format: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let pattern = parse_pattern(format);
    if pattern.contains("%z") {
        return DateTime::parse_from_str(text, &pattern)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(text, &pattern).ok().or_else(|| {
        NaiveDate::parse_from_str(text, &pattern)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })?;
    from_local(offset, naive)
}

/// DATETIME_FORMAT(date, [format])
pub fn fn_datetime_format(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let format = match arg(params, 1) {
        FormulaValue::Null => DEFAULT_DATETIME_FORMAT.to_string(),
        value => value.to_text(),
    };
    map_date(params, ctx, |dt| {
        FormulaValue::String(format_datetime_tokens(&dt, &format))
    })
}

/// DATETIME_PARSE(text, [format])
pub fn fn_datetime_parse(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let format = match arg(params, 1) {
        FormulaValue::Null => None,
        value => Some(value.to_text()),
    };
    map_first(params, |v| {
        let parsed = match (&format, v) {
            (None, v) => ctx.as_datetime(v),
            (Some(_), FormulaValue::DateTime(dt)) => Some(*dt),
            (Some(format), v) => parse_with_format(&v.to_text(), format, ctx.utc_offset()),
        };
        Ok(parsed.map_or(FormulaValue::Null, FormulaValue::DateTime))
    })
}

fn relative_to_now(
    params: &[TypedValue],
    ctx: &EvaluationContext,
    function: FunctionName,
    since_now: bool,
) -> FormulaResult<FormulaValue> {
    let unit = unit_arg(params, 1, function, Some(DateUnit::Day))?.unwrap_or(DateUnit::Day);
    map_first(params, |v| {
        let diff = ctx.as_datetime(v).and_then(|dt| {
            if since_now {
                diff_units(ctx, dt, ctx.now, unit)
            } else {
                diff_units(ctx, ctx.now, dt, unit)
            }
        });
        Ok(diff.map_or(FormulaValue::Null, FormulaValue::Number))
    })
}

/// FROMNOW(date, [unit]): date - now
pub fn fn_fromnow(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    relative_to_now(params, ctx, FunctionName::FromNow, true)
}

/// TONOW(date, [unit]): now - date
pub fn fn_tonow(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    relative_to_now(params, ctx, FunctionName::ToNow, false)
}

/// Holiday dates from a date or a comma-separated list of dates
fn holidays(ctx: &EvaluationContext, value: &FormulaValue) -> Vec<NaiveDate> {
    value
        .flatten()
        .into_iter()
        .flat_map(|v| match v {
            FormulaValue::String(s) => s
                .split(',')
                .filter_map(|part| ctx.as_datetime(&FormulaValue::String(part.trim().to_string())))
                .collect::<Vec<_>>(),
            other => ctx.as_datetime(other).into_iter().collect(),
        })
        .map(|dt| ctx.local(&dt).date_naive())
        .collect()
}

fn is_workday(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&date)
}

/// WORKDAY(start, days, [holidays]): the date `days` business days after start
pub fn fn_workday(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let (start, days) = match (date_arg(ctx, params, 0), arg(params, 1).as_number()) {
        // Checked before the cast so huge counts cannot saturate
        (Some(start), Some(days)) if days.abs() <= MAX_WORKDAY_SPAN as f64 => {
            (start, days.trunc() as i64)
        }
        _ => return Ok(FormulaValue::Null),
    };
    let holidays = holidays(ctx, arg(params, 2));

    let local = ctx.local(&start);
    let step = Duration::days(if days >= 0 { 1 } else { -1 });
    let mut date = local.date_naive();
    let mut remaining = days.abs();
    while remaining > 0 {
        date = date
            .checked_add_signed(step)
            .ok_or_else(|| FormulaError::invalid_params("WORKDAY", "date out of range"))?;
        if is_workday(date, &holidays) {
            remaining -= 1;
        }
    }

    Ok(from_local(local.offset(), date.and_time(local.time()))
        .map_or(FormulaValue::Null, FormulaValue::DateTime))
}

/// WORKDAY_DIFF(start, end, [holidays]): business days from start to end, inclusive
pub fn fn_workday_diff(params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let (start, end) = match (date_arg(ctx, params, 0), date_arg(ctx, params, 1)) {
        (Some(start), Some(end)) => (ctx.local(&start).date_naive(), ctx.local(&end).date_naive()),
        _ => return Ok(FormulaValue::Null),
    };
    let (from, to, sign) = if start <= end {
        (start, end, 1.0)
    } else {
        (end, start, -1.0)
    };
    if (to - from).num_days() > MAX_WORKDAY_SPAN {
        return Ok(FormulaValue::Null);
    }
    let holidays = holidays(ctx, arg(params, 2));

    let count = from
        .iter_days()
        .take_while(|d| *d <= to)
        .filter(|d| is_workday(*d, &holidays))
        .count();
    Ok(FormulaValue::Number(sign * count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate_with_options, EvaluatorOptions};
    use crate::test_support::{eval, fields, infer, now, record, value};
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> FormulaValue {
        FormulaValue::Number(n)
    }

    fn utc(s: &str) -> FormulaValue {
        FormulaValue::DateTime(
            DateTime::parse_from_rfc3339(s)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn test_now_and_today() {
        assert_eq!(value("NOW()"), FormulaValue::DateTime(now()));
        assert_eq!(value("TODAY()"), utc("2024-06-01T00:00:00Z"));
        assert_eq!(
            infer("NOW()").unwrap(),
            TypedValue::null(CellValueType::DateTime, false)
        );
    }

    #[test]
    fn test_components() {
        assert_eq!(value("YEAR({fldDate})"), num(2024.0));
        assert_eq!(value("MONTH({fldDate})"), num(3.0));
        assert_eq!(value("DAY({fldDate})"), num(15.0));
        assert_eq!(value("HOUR({fldDate})"), num(10.0));
        assert_eq!(value("MINUTE({fldDate})"), num(30.0));
        assert_eq!(value("SECOND({fldDate})"), num(45.0));
        assert_eq!(value("WEEKDAY({fldDate})"), num(5.0));
        assert_eq!(value("WEEKNUM({fldDate})"), num(11.0));
        assert_eq!(value("YEAR('2020-02-29')"), num(2020.0));
        assert_eq!(value("YEAR({fldNoDate})"), FormulaValue::Null);
        assert_eq!(value("YEAR('nope')"), FormulaValue::Null);
    }

    #[test]
    fn test_components_use_utc_offset() {
        let options = EvaluatorOptions::default()
            .with_now(now())
            .with_utc_offset(FixedOffset::east_opt(8 * 3600).unwrap());
        let result =
            evaluate_with_options("HOUR({fldDate})", &fields(), Some(&record()), &options).unwrap();
        assert_eq!(result.value, num(18.0));
    }

    #[test]
    fn test_date_add() {
        assert_eq!(
            value("DATE_ADD({fldDate}, 1, 'month')"),
            utc("2024-04-15T10:30:45Z")
        );
        assert_eq!(
            value("DATE_ADD('2024-01-31', 1, 'months')"),
            utc("2024-02-29T00:00:00Z")
        );
        assert_eq!(
            value("DATE_ADD({fldDate}, -2, 'Days')"),
            utc("2024-03-13T10:30:45Z")
        );
        assert_eq!(
            value("DATE_ADD({fldDate}, 1, 'year')"),
            utc("2025-03-15T10:30:45Z")
        );
        assert!(matches!(
            eval("DATE_ADD({fldDate}, 1, 'fortnight')"),
            Err(FormulaError::InvalidParams { function, .. }) if function == "DATE_ADD"
        ));
    }

    #[test]
    fn test_datetime_diff() {
        assert_eq!(value("DATETIME_DIFF('2024-03-20', '2024-03-15')"), num(5.0));
        assert_eq!(
            value("DATETIME_DIFF({fldDate}, '2024-01-15', 'months')"),
            num(2.0)
        );
        assert_eq!(
            value("DATETIME_DIFF('2024-01-01', '2024-01-02', 'hours')"),
            num(-24.0)
        );
        assert_eq!(
            value("DATETIME_DIFF('2025-03-14', '2024-03-15', 'year')"),
            num(0.0)
        );
        assert_eq!(
            value("DATETIME_DIFF({fldNoDate}, '2024-01-01')"),
            FormulaValue::Null
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(value("IS_SAME({fldDate}, '2024-03-15', 'day')"), FormulaValue::Boolean(true));
        assert_eq!(value("IS_SAME({fldDate}, '2024-03-15')"), FormulaValue::Boolean(false));
        assert_eq!(value("IS_SAME({fldDate}, '2024-03-10', 'week')"), FormulaValue::Boolean(true));
        assert_eq!(value("IS_AFTER({fldDate}, '2024-03-01')"), FormulaValue::Boolean(true));
        assert_eq!(
            value("IS_BEFORE({fldDate}, '2024-03-15', 'day')"),
            FormulaValue::Boolean(false)
        );
        assert_eq!(value("IS_BEFORE({fldDate}, '2024-04-01', 'month')"), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_datestr_timestr() {
        assert_eq!(value("DATESTR({fldDate})"), FormulaValue::from("2024-03-15"));
        assert_eq!(value("TIMESTR({fldDate})"), FormulaValue::from("10:30:45"));
    }

    #[test]
    fn test_datetime_format() {
        assert_eq!(
            value("DATETIME_FORMAT({fldDate})"),
            FormulaValue::from("2024-03-15 10:30")
        );
        assert_eq!(
            value("DATETIME_FORMAT({fldDate}, 'dddd, MMMM D YYYY [at] h:mm A')"),
            FormulaValue::from("Friday, March 15 2024 at 10:30 AM")
        );
        assert_eq!(
            value("DATETIME_FORMAT({fldDate}, 'YY/M/D HH:mm:ss.SSS Z')"),
            FormulaValue::from("24/3/15 10:30:45.000 +00:00")
        );
    }

    #[test]
    fn test_datetime_parse() {
        assert_eq!(
            value("DATETIME_PARSE('15/03/2024', 'DD/MM/YYYY')"),
            utc("2024-03-15T00:00:00Z")
        );
        assert_eq!(
            value("DATETIME_PARSE('2024-03-15 10:30')"),
            utc("2024-03-15T10:30:00Z")
        );
        assert_eq!(
            value("DATETIME_PARSE('03.15.2024 07:05 PM', 'MM.DD.YYYY hh:mm A')"),
            utc("2024-03-15T19:05:00Z")
        );
        assert_eq!(value("DATETIME_PARSE('garbage')"), FormulaValue::Null);
    }

    #[test]
    fn test_fromnow_tonow() {
        assert_eq!(value("FROMNOW('2024-06-11')"), num(9.0));
        assert_eq!(value("TONOW('2024-05-30T12:00:00Z')"), num(2.0));
        assert_eq!(value("TONOW({fldDate}, 'months')"), num(2.0));
        assert_eq!(value("TONOW({fldDate}, 'hour')"), num(1873.0));
    }

    #[test]
    fn test_workday() {
        assert_eq!(value("WORKDAY('2024-03-15', 1)"), utc("2024-03-18T00:00:00Z"));
        assert_eq!(
            value("WORKDAY('2024-03-15', 1, '2024-03-18')"),
            utc("2024-03-19T00:00:00Z")
        );
        assert_eq!(value("WORKDAY('2024-03-18', -1)"), utc("2024-03-15T00:00:00Z"));
        assert_eq!(value("WORKDAY({fldDate}, 0)"), utc("2024-03-15T10:30:45Z"));
    }

    #[test]
    fn test_workday_out_of_range_count_is_null() {
        assert_eq!(value("WORKDAY('2024-01-01', -1e300)"), FormulaValue::Null);
        assert_eq!(value("WORKDAY('2024-01-01', 1e300)"), FormulaValue::Null);
        assert_eq!(value("WORKDAY('2024-01-01', -1000001)"), FormulaValue::Null);
    }

    #[test]
    fn test_workday_diff() {
        assert_eq!(value("WORKDAY_DIFF('2024-03-15', '2024-03-22')"), num(6.0));
        assert_eq!(
            value("WORKDAY_DIFF('2024-03-15', '2024-03-22', '2024-03-18, 2024-03-19')"),
            num(4.0)
        );
        assert_eq!(value("WORKDAY_DIFF('2024-03-22', '2024-03-15')"), num(-6.0));
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!(DateUnit::parse("Quarters"), Some(DateUnit::Quarter));
        assert_eq!(DateUnit::parse(" ms "), None);
        assert_eq!(DateUnit::parse("millisecond"), Some(DateUnit::Millisecond));
    }

    #[test]
    fn test_element_wise_over_epoch_millis() {
        let typed = eval("YEAR({fldNums})").unwrap();
        assert!(typed.is_multiple);
        assert_eq!(
            typed.value,
            FormulaValue::Array(vec![num(1970.0), num(1970.0), FormulaValue::Null, num(1970.0)])
        );
        assert_eq!(
            infer("DATESTR({fldTags})").unwrap(),
            TypedValue::null(CellValueType::String, true)
        );
    }
}
