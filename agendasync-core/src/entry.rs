//! Provider-neutral schedule entries.
//!
//! A schedule is made of two shapes of entry: recurring weekly slots (method
//! classes) and one-off dated slots (private lessons). Both carry an identity
//! key, the minimal set of fields that decides whether two entries describe the
//! same slot. Every other field is a mutable attribute of that slot.

use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// A pre-resolved teacher identifier (typically the mailbox address).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeacherId(String);

impl TeacherId {
    pub fn new(id: impl Into<String>) -> Self {
        TeacherId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The local part of a mailbox-style id, for compact output.
    pub fn short_name(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TeacherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TeacherId {
    fn from(s: &str) -> Self {
        TeacherId::new(s)
    }
}

/// Which shape of entry an agenda syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Recurring,
    Dated,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncType::Recurring => write!(f, "recurring"),
            SyncType::Dated => write!(f, "dated"),
        }
    }
}

/// A standing weekly commitment with no end date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringEntry {
    #[serde(alias = "day", with = "weekday_name")]
    pub weekday: Weekday,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

/// A single occurrence on a given date, classified by activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedEntry {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    #[serde(alias = "type", default)]
    pub activity_code: ActivityCode,
    #[serde(alias = "name", default)]
    pub label: String,
    #[serde(rename = "online", alias = "is_remote", default)]
    pub is_remote: bool,
}

/// One slot of a teacher's schedule.
///
/// Serialized untagged: the presence of `weekday` (or `day`) versus `date`
/// decides the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleEntry {
    Recurring(RecurringEntry),
    Dated(DatedEntry),
}

/// Identity of a slot within one teacher's schedule.
///
/// Combined with the owning teacher this is the full identity key: entries are
/// always grouped per teacher before keys are compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    Weekly {
        weekday: Weekday,
        start: NaiveTime,
    },
    Dated {
        date: NaiveDate,
        start: NaiveTime,
        activity_code: ActivityCode,
    },
}

impl ScheduleEntry {
    pub fn slot_key(&self) -> SlotKey {
        match self {
            ScheduleEntry::Recurring(e) => SlotKey::Weekly {
                weekday: e.weekday,
                start: e.start,
            },
            ScheduleEntry::Dated(e) => SlotKey::Dated {
                date: e.date,
                start: e.start,
                activity_code: e.activity_code.clone(),
            },
        }
    }

    pub fn sync_type(&self) -> SyncType {
        match self {
            ScheduleEntry::Recurring(_) => SyncType::Recurring,
            ScheduleEntry::Dated(_) => SyncType::Dated,
        }
    }

    pub fn start(&self) -> NaiveTime {
        match self {
            ScheduleEntry::Recurring(e) => e.start,
            ScheduleEntry::Dated(e) => e.start,
        }
    }

    pub fn end(&self) -> NaiveTime {
        match self {
            ScheduleEntry::Recurring(e) => e.end,
            ScheduleEntry::Dated(e) => e.end,
        }
    }

    pub fn activity_code(&self) -> Option<&ActivityCode> {
        match self {
            ScheduleEntry::Recurring(_) => None,
            ScheduleEntry::Dated(e) => Some(&e.activity_code),
        }
    }

    /// Whether the non-identity attributes of two same-key entries match.
    ///
    /// Identity fields are included in the comparison as well, so this is only
    /// meaningful for entries already known to share a [`SlotKey`].
    pub fn same_attributes(&self, other: &ScheduleEntry) -> bool {
        self == other
    }

    /// Reject entries that cannot be turned into a calendar event.
    pub fn validate(&self) -> Result<(), String> {
        if self.end() <= self.start() {
            return Err(format!("{self}: end time is not after start time"));
        }
        Ok(())
    }
}

/// Keep the first item for each slot key, preserving input order.
pub fn first_per_slot<T>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> SlotKey,
) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleEntry::Recurring(e) => write!(
                f,
                "{} {}-{}",
                e.weekday,
                e.start.format("%H:%M"),
                e.end.format("%H:%M")
            ),
            ScheduleEntry::Dated(e) => {
                write!(
                    f,
                    "{} {}-{} {}",
                    e.date,
                    e.start.format("%H:%M"),
                    e.end.format("%H:%M"),
                    e.activity_code
                )?;
                if e.is_remote {
                    write!(f, " (online)")?;
                }
                Ok(())
            }
        }
    }
}

/// Activity classification of a dated entry.
///
/// Six codes are known; anything else is kept verbatim and rendered with the
/// generic private lesson label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityCode {
    Vad,
    Tpc,
    Jpr,
    Jgp,
    Ico,
    Vip,
    #[default]
    Unspecified,
    Other(String),
}

const FALLBACK_LABEL: &str = "Private Lesson";
const FALLBACK_COLOR: &str = "preset10";

impl ActivityCode {
    pub fn known() -> [ActivityCode; 6] {
        [
            ActivityCode::Vad,
            ActivityCode::Tpc,
            ActivityCode::Jpr,
            ActivityCode::Jgp,
            ActivityCode::Ico,
            ActivityCode::Vip,
        ]
    }

    pub fn code(&self) -> &str {
        match self {
            ActivityCode::Vad => "VAD",
            ActivityCode::Tpc => "TPC",
            ActivityCode::Jpr => "JPR",
            ActivityCode::Jgp => "JGP",
            ActivityCode::Ico => "ICO",
            ActivityCode::Vip => "VIP",
            ActivityCode::Unspecified => "",
            ActivityCode::Other(code) => code,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityCode::Vad => "VIP Adults",
            ActivityCode::Tpc => "Test Prep",
            ActivityCode::Jpr => "Junior Private",
            ActivityCode::Jgp => "Junior Group",
            ActivityCode::Ico => "In Company",
            ActivityCode::Vip => "VIP Class",
            ActivityCode::Unspecified | ActivityCode::Other(_) => FALLBACK_LABEL,
        }
    }

    /// Outlook preset colour for the activity category.
    pub fn color(&self) -> &'static str {
        match self {
            ActivityCode::Vad => "preset8",
            ActivityCode::Tpc => "preset0",
            ActivityCode::Jpr => "preset7",
            ActivityCode::Jgp => "preset4",
            ActivityCode::Ico => "preset1",
            ActivityCode::Vip => "preset3",
            ActivityCode::Unspecified | ActivityCode::Other(_) => FALLBACK_COLOR,
        }
    }

    /// Category name on the remote calendar: `"{code} - {label}"`.
    pub fn category_name(&self) -> String {
        match self {
            ActivityCode::Unspecified => FALLBACK_LABEL.to_string(),
            _ => format!("{} - {}", self.code(), self.label()),
        }
    }
}

impl From<String> for ActivityCode {
    fn from(s: String) -> Self {
        let code = s.trim();
        match code.to_ascii_uppercase().as_str() {
            "" => ActivityCode::Unspecified,
            "VAD" => ActivityCode::Vad,
            "TPC" => ActivityCode::Tpc,
            "JPR" => ActivityCode::Jpr,
            "JGP" => ActivityCode::Jgp,
            "ICO" => ActivityCode::Ico,
            "VIP" => ActivityCode::Vip,
            _ => ActivityCode::Other(code.to_string()),
        }
    }
}

impl From<ActivityCode> for String {
    fn from(code: ActivityCode) -> Self {
        code.code().to_string()
    }
}

impl fmt::Display for ActivityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityCode::Unspecified => write!(f, "?"),
            _ => write!(f, "{}", self.code()),
        }
    }
}

/// `HH:MM` wall-clock times. Seconds are accepted on input and truncated, so
/// a parsed time always survives a write and read back unchanged.
pub(crate) mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        let raw = raw.trim();
        let time = NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|_| format!("invalid time '{raw}', expected HH:MM"))?;
        NaiveTime::from_hms_opt(time.hour(), time.minute(), 0)
            .ok_or_else(|| format!("invalid time '{raw}', expected HH:MM"))
    }
}

/// Weekdays as full English names on output; any name chrono accepts on input.
pub(crate) mod weekday_name {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn full_name(weekday: Weekday) -> &'static str {
        match weekday {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }

    pub fn serialize<S: Serializer>(weekday: &Weekday, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(full_name(*weekday))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Weekday, D::Error> {
        let raw = String::deserialize(d)?;
        raw.trim()
            .parse::<Weekday>()
            .map_err(|_| serde::de::Error::custom(format!("invalid weekday '{raw}'")))
    }
}
