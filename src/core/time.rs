//! Packed calendar types shared by the wire format and the repository.
//!
//! A [`ShortDate`] packs `year << 16 | month << 8 | day` into an `i32`, so
//! packed values order chronologically. A [`ShortDateTime`] packs the date
//! above the low 17 bits of an `i64`, which hold the second of the day.

use std::fmt;

use chrono::{Datelike, Days, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::serialization::{ReadObject, ValidationError, ValueReader, ValueWriter, WriteObject};

pub const SECONDS_IN_DAY: i32 = 86_400;
pub const SECONDS_IN_HOUR: i64 = 3_600;
pub const MAX_YEAR: i32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct ShortDate(i32);

impl ShortDate {
    /// Packed value that never denotes a real date.
    pub const NONE: i32 = 0;

    pub fn of(year: i32, month: u32, day: u32) -> Option<Self> {
        if !(0..=MAX_YEAR).contains(&year) || month > 12 || day > 31 {
            return None;
        }
        let packed = (year << 16) | ((month as i32) << 8) | day as i32;
        Self::from_packed(packed)
    }

    pub fn from_packed(packed: i32) -> Option<Self> {
        Self::is_valid(packed).then_some(Self(packed))
    }

    /// Year in `0..=9999`, month in `1..=12`, day within the month.
    pub fn is_valid(packed: i32) -> bool {
        let year = (packed >> 16) & 0xFFFF;
        let month = ((packed >> 8) & 0xFF) as u32;
        let day = (packed & 0xFF) as u32;

        if packed < 0 || year > MAX_YEAR || !(1..=12).contains(&month) {
            return false;
        }
        day >= 1 && day <= days_in_month(year, month)
    }

    pub fn packed(self) -> i32 {
        self.0
    }

    pub fn year(self) -> i32 {
        (self.0 >> 16) & 0xFFFF
    }

    pub fn month(self) -> u32 {
        ((self.0 >> 8) & 0xFF) as u32
    }

    pub fn day_of_month(self) -> u32 {
        (self.0 & 0xFF) as u32
    }

    pub fn to_naive(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year(), self.month(), self.day_of_month())
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn from_naive(date: NaiveDate) -> Option<Self> {
        if !(0..=MAX_YEAR).contains(&date.year()) {
            return None;
        }
        Self::of(date.year(), date.month(), date.day())
    }

    const EPOCH: i32 = (1970 << 16) | (1 << 8) | 1;

    pub fn to_epoch_day(self) -> i64 {
        (self.to_naive() - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)).num_days()
    }

    pub fn of_epoch_day(epoch_day: i64) -> Option<Self> {
        Self(Self::EPOCH).plus_days(epoch_day)
    }

    pub fn plus_days(self, days: i64) -> Option<Self> {
        let date = self.to_naive();
        let shifted = if days >= 0 {
            date.checked_add_days(Days::new(days as u64))
        } else {
            date.checked_sub_days(Days::new(days.unsigned_abs()))
        };
        shifted.and_then(Self::from_naive)
    }

    pub fn minus_days(self, days: i64) -> Option<Self> {
        self.plus_days(-days)
    }
}

impl TryFrom<i32> for ShortDate {
    type Error = ValidationError;

    fn try_from(packed: i32) -> Result<Self, Self::Error> {
        Self::from_packed(packed).ok_or_else(|| ValidationError::invalid_value("date", packed))
    }
}

impl From<ShortDate> for i32 {
    fn from(date: ShortDate) -> Self {
        date.0
    }
}

impl fmt::Display for ShortDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}.{:02}.{:02}",
            self.year(),
            self.month(),
            self.day_of_month()
        )
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ShortDateTime(i64);

impl ShortDateTime {
    pub fn of(date: ShortDate, seconds_of_day: i32) -> Option<Self> {
        if !(0..SECONDS_IN_DAY).contains(&seconds_of_day) {
            return None;
        }
        Some(Self(
            ((date.packed() as i64) << 17) | seconds_of_day as i64,
        ))
    }

    pub fn start_of_day(date: ShortDate) -> Self {
        Self((date.packed() as i64) << 17)
    }

    /// Last second of `date`.
    pub fn end_of_day(date: ShortDate) -> Self {
        Self(((date.packed() as i64) << 17) | (SECONDS_IN_DAY - 1) as i64)
    }

    pub fn from_packed(packed: i64) -> Option<Self> {
        Self::is_valid(packed).then_some(Self(packed))
    }

    pub fn is_valid(packed: i64) -> bool {
        // unused high bits must be clear
        if packed as u64 & 0xFFFF_0000_0000_0000 != 0 {
            return false;
        }
        let time = (packed & 0x1_FFFF) as i32;
        ShortDate::is_valid((packed >> 17) as i32) && (0..SECONDS_IN_DAY).contains(&time)
    }

    pub fn packed(self) -> i64 {
        self.0
    }

    pub fn date(self) -> ShortDate {
        ShortDate((self.0 >> 17) as i32)
    }

    /// Second of the day.
    pub fn time(self) -> i32 {
        (self.0 & 0x1_FFFF) as i32
    }

    pub fn to_epoch_second(self) -> i64 {
        self.date().to_epoch_day() * SECONDS_IN_DAY as i64 + self.time() as i64
    }

    pub fn of_epoch_second(epoch_second: i64) -> Option<Self> {
        let day = epoch_second.div_euclid(SECONDS_IN_DAY as i64);
        let time = epoch_second.rem_euclid(SECONDS_IN_DAY as i64) as i32;
        Self::of(ShortDate::of_epoch_day(day)?, time)
    }

    pub fn plus_seconds(self, seconds: i64) -> Option<Self> {
        Self::of_epoch_second(self.to_epoch_second() + seconds)
    }

    /// Current local date and time.
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        let date = ShortDate::from_naive(now.date()).unwrap_or(ShortDate(ShortDate::EPOCH));
        Self::of(date, now.num_seconds_from_midnight() as i32).unwrap_or(Self::start_of_day(date))
    }
}

impl TryFrom<i64> for ShortDateTime {
    type Error = ValidationError;

    fn try_from(packed: i64) -> Result<Self, Self::Error> {
        Self::from_packed(packed).ok_or_else(|| ValidationError::invalid_value("dateTime", packed))
    }
}

impl From<ShortDateTime> for i64 {
    fn from(date_time: ShortDateTime) -> Self {
        date_time.0
    }
}

impl fmt::Display for ShortDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.time();
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date(),
            time / 3600,
            time % 3600 / 60,
            time % 60
        )
    }
}

/// Inclusive range of dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDateRange")]
pub struct ShortDateRange {
    pub start: ShortDate,
    pub end_inclusive: ShortDate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDateRange {
    start: ShortDate,
    end_inclusive: ShortDate,
}

impl TryFrom<RawDateRange> for ShortDateRange {
    type Error = ValidationError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end_inclusive)
    }
}

impl ShortDateRange {
    pub const SERIALIZED_SIZE: usize = 8;

    pub fn new(start: ShortDate, end_inclusive: ShortDate) -> Result<Self, ValidationError> {
        if start > end_inclusive {
            return Err(ValidationError::InvalidContent(format!(
                "range start {start} is after end {end_inclusive}"
            )));
        }
        Ok(Self {
            start,
            end_inclusive,
        })
    }

    pub fn from_packed(start: i32, end_inclusive: i32) -> Result<Self, ValidationError> {
        Self::new(start.try_into()?, end_inclusive.try_into()?)
    }

    pub fn contains(&self, date: ShortDate) -> bool {
        self.start <= date && date <= self.end_inclusive
    }

    pub fn overlaps(&self, other: &ShortDateRange) -> bool {
        self.start <= other.end_inclusive && other.start <= self.end_inclusive
    }
}

impl fmt::Display for ShortDateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.start, self.end_inclusive)
    }
}

impl WriteObject for ShortDateRange {
    fn serialized_size(&self) -> usize {
        Self::SERIALIZED_SIZE
    }

    fn write_object(&self, writer: &mut ValueWriter<'_>) {
        writer.int32(self.start.packed());
        writer.int32(self.end_inclusive.packed());
    }
}

impl ReadObject for ShortDateRange {
    fn read_object(reader: &mut ValueReader<'_>) -> Result<Self, ValidationError> {
        let start = reader.int32()?;
        let end = reader.int32()?;
        Self::from_packed(start, end)
    }
}
