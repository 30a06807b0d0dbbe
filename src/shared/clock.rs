use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;

/// 「今日」の日付を提供するクロック
///
/// リマインダー判定は時刻を切り捨てたローカル日付で行う。
pub trait Clock: Send + Sync {
    /// ローカルタイムゾーンでの今日の日付
    fn today(&self) -> NaiveDate;

    /// 通知のタイムスタンプ用の現在時刻
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// システム時刻とタイムゾーンに基づくクロック
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Jerusalem)
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

/// 固定日付のクロック（テスト・シミュレーション用）
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    /// 日付を変更する
    pub fn set(&self, date: NaiveDate) {
        if let Ok(mut guard) = self.date.lock() {
            *guard = date;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.today()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_set() {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        clock.set(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(clock.now().date_naive(), clock.today());
    }

    #[test]
    fn test_system_clock_timezones_differ_by_at_most_one_day() {
        let tokyo = SystemClock::new(chrono_tz::Asia::Tokyo).today();
        let honolulu = SystemClock::new(chrono_tz::Pacific::Honolulu).today();
        let diff = (tokyo - honolulu).num_days();
        assert!((0..=1).contains(&diff));
    }
}
