use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current instant. "Today" for routines and streaks is the
/// UTC calendar date of [`Clock::now`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use fixed::FixedClock;

#[cfg(test)]
mod fixed {
    use std::sync::Mutex;

    use chrono::{DateTime, Duration, NaiveDate, Utc};

    use super::Clock;

    /// Clock frozen at a chosen instant; tests move it forward explicitly.
    pub struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            FixedClock(Mutex::new(now))
        }

        pub fn on(date: NaiveDate) -> Self {
            Self::at(date.and_hms_opt(12, 0, 0).unwrap().and_utc())
        }

        pub fn set_date(&self, date: NaiveDate) {
            *self.0.lock().unwrap() = date.and_hms_opt(12, 0, 0).unwrap().and_utc();
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
