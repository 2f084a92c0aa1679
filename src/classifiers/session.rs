//! `TradingSessionClassifier` — pure function of wall-clock time in a configured
//! time zone (§4.2 step 3, §4.4).

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::domain::TradingSession;

#[derive(Clone, Copy)]
pub struct TradingSessionClassifier {
    zone: Tz,
}

impl TradingSessionClassifier {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    /// Weekend → `OFF_HOURS`; otherwise minute-of-day buckets:
    /// `[9:15,10:00) OPENING_BURST, [10:00,15:00) MIDDAY_CONSOLIDATION,
    /// [15:00,15:30) POWER_HOUR, otherwise OFF_HOURS`.
    pub fn classify(&self, timestamp: DateTime<Utc>) -> TradingSession {
        let local = timestamp.with_timezone(&self.zone);

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return TradingSession::OffHours;
        }

        let minute_of_day = local.hour() * 60 + local.minute();
        const OPEN: u32 = 9 * 60 + 15;
        const MID_START: u32 = 10 * 60;
        const MID_END: u32 = 15 * 60;
        const POWER_END: u32 = 15 * 60 + 30;

        if (OPEN..MID_START).contains(&minute_of_day) {
            TradingSession::OpeningBurst
        } else if (MID_START..MID_END).contains(&minute_of_day) {
            TradingSession::MiddayConsolidation
        } else if (MID_END..POWER_END).contains(&minute_of_day) {
            TradingSession::PowerHour
        } else {
            TradingSession::OffHours
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kolkata() -> TradingSessionClassifier {
        TradingSessionClassifier::new(chrono_tz::Asia::Kolkata)
    }

    /// A Monday at 09:15 IST expressed in UTC (IST = UTC+5:30).
    fn monday_ist(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        let utc_hour = (hour + 24 - 5) % 24;
        let utc_minute = minute.checked_sub(30).unwrap_or_else(|| minute + 30);
        Utc.with_ymd_and_hms(2026, 3, 2, utc_hour, utc_minute, second).unwrap()
    }

    #[test]
    fn exactly_nine_fifteen_is_opening_burst() {
        let ts = monday_ist(9, 15, 0);
        assert_eq!(kolkata().classify(ts), TradingSession::OpeningBurst);
    }

    #[test]
    fn exactly_ten_is_midday_consolidation() {
        let ts = monday_ist(10, 0, 0);
        assert_eq!(kolkata().classify(ts), TradingSession::MiddayConsolidation);
    }

    #[test]
    fn weekend_is_off_hours_regardless_of_minute() {
        let saturday = Utc.with_ymd_and_hms(2026, 3, 7, 4, 0, 0).unwrap();
        assert_eq!(kolkata().classify(saturday), TradingSession::OffHours);
    }

    #[test]
    fn determinism_same_instant_same_session() {
        let ts = monday_ist(14, 59, 59);
        let a = kolkata().classify(ts);
        let b = kolkata().classify(ts);
        assert_eq!(a, b);
        assert_eq!(a, TradingSession::MiddayConsolidation);
    }
}
