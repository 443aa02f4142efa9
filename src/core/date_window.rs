use crate::error::RangeError;
use crate::models::predicate::CalendarPeriod;
use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// 半开时间窗口 [start, end)，均为 UTC 时刻
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 按仓库本地时区计算 "今天"、"N 天前" 的起止时刻。
///
/// 业务上的 "一天" 以本地午夜为界，数据列存的是 UTC 时间戳，
/// 因此先在本地时区里做日期运算，再换算成 UTC。
#[derive(Debug, Clone)]
pub struct DateWindowResolver {
    tz: Tz,
    max_offset_days: i64,
}

impl DateWindowResolver {
    pub fn new(tz: Tz, max_offset_days: i64) -> Self {
        Self { tz, max_offset_days }
    }

    /// `now` 由调用方在一次翻译中只读取一次，避免跨午夜的竞态
    pub fn resolve(&self, offset_days: i64, now: DateTime<Utc>) -> Result<DateWindow, RangeError> {
        self.resolve_span(offset_days, offset_days, now)
    }

    /// 从 start_offset 天前的本地午夜，到 end_offset 天前那天结束后的本地午夜
    pub fn resolve_span(
        &self,
        start_offset: i64,
        end_offset: i64,
        now: DateTime<Utc>,
    ) -> Result<DateWindow, RangeError> {
        let first = self.local_day(start_offset, now)?;
        let last = self.local_day(end_offset, now)?;
        let next = last.checked_add_days(Days::new(1)).ok_or(RangeError {
            offset: end_offset,
            max: self.max_offset_days,
        })?;
        Ok(DateWindow {
            start: self.local_midnight(first),
            end: self.local_midnight(next),
        })
    }

    /// 本地日历周 (ISO，周一开始) 或本月一号的午夜，到今天结束
    pub fn resolve_period_to_date(
        &self,
        period: CalendarPeriod,
        now: DateTime<Utc>,
    ) -> Result<DateWindow, RangeError> {
        let today = now.with_timezone(&self.tz).date_naive();
        let elapsed = match period {
            CalendarPeriod::Week => today.weekday().num_days_from_monday() as i64,
            CalendarPeriod::Month => today.day0() as i64,
        };
        self.resolve_span(elapsed, 0, now)
    }

    fn local_day(&self, offset: i64, now: DateTime<Utc>) -> Result<NaiveDate, RangeError> {
        let err = RangeError {
            offset,
            max: self.max_offset_days,
        };
        if offset < 0 || offset > self.max_offset_days {
            return Err(err);
        }
        let today = now.with_timezone(&self.tz).date_naive();
        today.checked_sub_days(Days::new(offset as u64)).ok_or(err)
    }

    /// 本地午夜对应的 UTC 时刻。夏令时回拨取较早者；
    /// 若午夜落在跳变空档里，则取当天第一个存在的整点。
    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        for hour in 0..24 {
            if let Some(naive) = date.and_hms_opt(hour, 0, 0) {
                if let Some(local) = self.tz.from_local_datetime(&naive).earliest() {
                    return local.with_timezone(&Utc);
                }
            }
        }
        // 任何 IANA 时区都不会整天不存在
        Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn today_is_a_24_hour_window_starting_at_local_midnight() {
        let resolver = DateWindowResolver::new(chrono_tz::Europe::London, 365);
        // 英国夏令时 (UTC+1)
        let window = resolver.resolve(0, at("2025-06-15T10:30:00Z")).unwrap();
        assert_eq!(window.start, at("2025-06-14T23:00:00Z"));
        assert_eq!(window.end, at("2025-06-15T23:00:00Z"));
        assert_eq!((window.end - window.start).num_hours(), 24);
        let local_start = window.start.with_timezone(&chrono_tz::Europe::London);
        assert_eq!((local_start.hour(), local_start.minute()), (0, 0));
    }

    #[test]
    fn local_day_differs_from_utc_day_late_in_the_evening() {
        let resolver = DateWindowResolver::new(chrono_tz::Europe::London, 365);
        // UTC 23:30 已经是伦敦次日 00:30
        let window = resolver.resolve(0, at("2025-06-15T23:30:00Z")).unwrap();
        assert_eq!(window.start, at("2025-06-15T23:00:00Z"));
    }

    #[test]
    fn yesterday_and_n_days_ago() {
        let resolver = DateWindowResolver::new(chrono_tz::UTC, 365);
        let now = at("2025-01-10T08:00:00Z");
        let yesterday = resolver.resolve(1, now).unwrap();
        assert_eq!(yesterday.start, at("2025-01-09T00:00:00Z"));
        assert_eq!(yesterday.end, at("2025-01-10T00:00:00Z"));

        let span = resolver.resolve_span(7, 0, now).unwrap();
        assert_eq!(span.start, at("2025-01-03T00:00:00Z"));
        assert_eq!(span.end, at("2025-01-11T00:00:00Z"));
    }

    #[test]
    fn dst_change_day_is_not_24_hours() {
        let resolver = DateWindowResolver::new(chrono_tz::Europe::London, 365);
        // 2025-03-30 伦敦进入夏令时
        let window = resolver.resolve(0, at("2025-03-30T12:00:00Z")).unwrap();
        assert_eq!(window.start, at("2025-03-30T00:00:00Z"));
        assert_eq!(window.end, at("2025-03-30T23:00:00Z"));
    }

    #[test]
    fn month_to_date_starts_on_the_local_first() {
        let resolver = DateWindowResolver::new(chrono_tz::Europe::London, 365);
        let window = resolver
            .resolve_period_to_date(CalendarPeriod::Month, at("2025-06-15T10:00:00Z"))
            .unwrap();
        assert_eq!(window.start, at("2025-05-31T23:00:00Z"));
        assert_eq!(window.end, at("2025-06-15T23:00:00Z"));

        // 一号当天只有一天
        let first = resolver
            .resolve_period_to_date(CalendarPeriod::Month, at("2025-06-01T08:00:00Z"))
            .unwrap();
        assert_eq!(first, resolver.resolve(0, at("2025-06-01T08:00:00Z")).unwrap());
    }

    #[test]
    fn week_to_date_starts_on_monday() {
        let resolver = DateWindowResolver::new(chrono_tz::UTC, 365);
        // 2025-06-15 是周日，本周从 06-09 周一开始
        let window = resolver
            .resolve_period_to_date(CalendarPeriod::Week, at("2025-06-15T10:00:00Z"))
            .unwrap();
        assert_eq!(window.start, at("2025-06-09T00:00:00Z"));
        assert_eq!(window.end, at("2025-06-16T00:00:00Z"));

        let monday = resolver
            .resolve_period_to_date(CalendarPeriod::Week, at("2025-06-09T10:00:00Z"))
            .unwrap();
        assert_eq!(monday.start, at("2025-06-09T00:00:00Z"));
    }

    #[test]
    fn offset_outside_bound_is_rejected() {
        let resolver = DateWindowResolver::new(chrono_tz::UTC, 365);
        let now = at("2025-01-10T08:00:00Z");
        assert_eq!(
            resolver.resolve(366, now),
            Err(RangeError { offset: 366, max: 365 })
        );
        assert!(resolver.resolve(-1, now).is_err());
        assert!(resolver.resolve(365, now).is_ok());
    }
}
