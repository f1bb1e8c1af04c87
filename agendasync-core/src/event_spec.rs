//! Mapping from schedule entries to the events created on the remote calendar.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::entry::{ActivityCode, ScheduleEntry, SyncType, weekday_name};

/// Everything a backend needs to create one remote event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSpec {
    pub subject: String,
    pub timing: Timing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub show_as: ShowAs,
    pub reminder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Wall-clock start/end in a named IANA time zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_zone: String,
}

/// Weekly recurrence with no end date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(with = "weekday_name")]
    pub weekday: Weekday,
    pub interval: u32,
    pub start_date: NaiveDate,
}

/// A coloured category on the remote mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub color: String,
}

impl From<&ActivityCode> for Category {
    fn from(code: &ActivityCode) -> Self {
        Category {
            name: code.category_name(),
            color: code.color().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowAs {
    Busy,
    Free,
}

/// Per-agenda rules for turning entries into [`EventSpec`]s.
///
/// `subject` is the whole subject of recurring events and the subject prefix of
/// dated ones. Either way every event this agenda creates starts with it, which
/// is what the bootstrap clear matches on.
#[derive(Debug, Clone)]
pub struct EventTemplate {
    pub sync_type: SyncType,
    pub subject: String,
    pub timezone: Tz,
    today: NaiveDate,
}

impl EventTemplate {
    pub fn new(sync_type: SyncType, subject: &str, timezone: Tz) -> Self {
        EventTemplate {
            sync_type,
            subject: subject.to_string(),
            timezone,
            today: Utc::now().with_timezone(&timezone).date_naive(),
        }
    }

    /// Pin the reference date used for the first occurrence of recurring events.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn subject_prefix(&self) -> &str {
        &self.subject
    }

    pub fn subject_for(&self, entry: &ScheduleEntry) -> String {
        match entry {
            ScheduleEntry::Recurring(_) => self.subject.clone(),
            ScheduleEntry::Dated(e) => {
                let mut subject = match e.activity_code {
                    ActivityCode::Unspecified => {
                        format!("{} {}", self.subject, e.activity_code.label())
                    }
                    _ => format!(
                        "{} {} - {}",
                        self.subject,
                        e.activity_code.code(),
                        e.activity_code.label()
                    ),
                };
                if e.is_remote {
                    subject.push_str(" (Online)");
                }
                subject
            }
        }
    }

    pub fn category_for(&self, entry: &ScheduleEntry) -> Option<Category> {
        entry.activity_code().map(Category::from)
    }

    /// Categories that must exist before events of this agenda are created.
    pub fn categories(&self) -> Vec<Category> {
        match self.sync_type {
            SyncType::Recurring => Vec::new(),
            SyncType::Dated => ActivityCode::known().iter().map(Category::from).collect(),
        }
    }

    pub fn build(&self, entry: &ScheduleEntry) -> EventSpec {
        let time_zone = self.timezone.name().to_string();

        let (timing, recurrence, body) = match entry {
            ScheduleEntry::Recurring(e) => {
                let first = next_weekday(e.weekday, self.today);
                let timing = Timing {
                    start: first.and_time(e.start),
                    end: first.and_time(e.end),
                    time_zone,
                };
                let recurrence = Recurrence {
                    weekday: e.weekday,
                    interval: 1,
                    start_date: first,
                };
                (timing, Some(recurrence), None)
            }
            ScheduleEntry::Dated(e) => {
                let timing = Timing {
                    start: e.date.and_time(e.start),
                    end: e.date.and_time(e.end),
                    time_zone,
                };
                let body = (!e.label.is_empty()).then(|| e.label.clone());
                (timing, None, body)
            }
        };

        EventSpec {
            subject: self.subject_for(entry),
            timing,
            recurrence,
            category: self.category_for(entry),
            show_as: ShowAs::Busy,
            reminder: false,
            body,
        }
    }
}

/// Next date falling on `weekday`, counting `from` itself.
pub fn next_weekday(weekday: Weekday, from: NaiveDate) -> NaiveDate {
    let target = weekday.num_days_from_monday() as i64;
    let current = from.weekday().num_days_from_monday() as i64;
    from + Duration::days((target - current).rem_euclid(7))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DatedEntry, RecurringEntry, hhmm};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dated(code: ActivityCode, online: bool) -> ScheduleEntry {
        ScheduleEntry::Dated(DatedEntry {
            date: date(2026, 3, 4),
            start: hhmm::parse("10:00").unwrap(),
            end: hhmm::parse("11:30").unwrap(),
            activity_code: code,
            label: "Business English".to_string(),
            is_remote: online,
        })
    }

    #[test]
    fn test_next_weekday_includes_today() {
        // 2026-03-02 is a Monday
        assert_eq!(next_weekday(Weekday::Mon, date(2026, 3, 2)), date(2026, 3, 2));
        assert_eq!(next_weekday(Weekday::Wed, date(2026, 3, 2)), date(2026, 3, 4));
        assert_eq!(next_weekday(Weekday::Sun, date(2026, 3, 2)), date(2026, 3, 8));
        assert_eq!(next_weekday(Weekday::Mon, date(2026, 3, 3)), date(2026, 3, 9));
    }

    #[test]
    fn test_recurring_event_is_weekly_busy_with_fixed_subject() {
        let template = EventTemplate::new(SyncType::Recurring, "Teaching", chrono_tz::Europe::Zurich)
            .with_today(date(2026, 3, 2));
        let entry = ScheduleEntry::Recurring(RecurringEntry {
            weekday: Weekday::Thu,
            start: hhmm::parse("09:00").unwrap(),
            end: hhmm::parse("12:00").unwrap(),
        });

        let spec = template.build(&entry);

        assert_eq!(spec.subject, "Teaching");
        assert_eq!(spec.show_as, ShowAs::Busy);
        assert!(!spec.reminder);
        assert_eq!(spec.category, None);
        assert_eq!(spec.timing.time_zone, "Europe/Zurich");
        assert_eq!(spec.timing.start, date(2026, 3, 5).and_hms_opt(9, 0, 0).unwrap());
        assert_eq!(spec.timing.end, date(2026, 3, 5).and_hms_opt(12, 0, 0).unwrap());
        assert_eq!(
            spec.recurrence,
            Some(Recurrence {
                weekday: Weekday::Thu,
                interval: 1,
                start_date: date(2026, 3, 5),
            })
        );
    }

    #[test]
    fn test_dated_subject_and_category() {
        let template = EventTemplate::new(SyncType::Dated, "Private:", chrono_tz::Europe::Zurich);

        let spec = template.build(&dated(ActivityCode::Vad, false));
        assert_eq!(spec.subject, "Private: VAD - VIP Adults");
        assert_eq!(
            spec.category,
            Some(Category {
                name: "VAD - VIP Adults".to_string(),
                color: "preset8".to_string(),
            })
        );
        assert_eq!(spec.recurrence, None);
        assert_eq!(spec.body.as_deref(), Some("Business English"));

        let online = template.build(&dated(ActivityCode::Tpc, true));
        assert_eq!(online.subject, "Private: TPC - Test Prep (Online)");
    }

    #[test]
    fn test_dated_categories_cover_known_codes() {
        let template = EventTemplate::new(SyncType::Dated, "Private:", chrono_tz::Europe::Zurich);
        let names: Vec<_> = template.categories().into_iter().map(|c| c.name).collect();

        assert_eq!(names.len(), 6);
        assert!(names.contains(&"JGP - Junior Group".to_string()));
        assert!(
            EventTemplate::new(SyncType::Recurring, "Teaching", chrono_tz::UTC)
                .categories()
                .is_empty()
        );
    }
}
