use serde::{Deserialize, Serialize};

use super::time::{SECONDS_IN_DAY, ShortDate, ShortDateTime};
use crate::serialization::{ReadObject, ValidationError, ValueReader, ValueWriter, WriteObject};

/// One reading taken by the sensors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherInfo {
    pub date_time: ShortDateTime,
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity, percent
    pub humidity: f32,
    /// Millimetres of mercury
    pub pressure: f32,
}

impl WeatherInfo {
    pub const SERIALIZED_SIZE: usize = 20;

    pub fn new(
        date_time: ShortDateTime,
        temperature: f32,
        humidity: f32,
        pressure: f32,
    ) -> Result<Self, ValidationError> {
        ensure_finite("temperature", temperature)?;
        ensure_humidity("humidity", humidity)?;
        ensure_finite("pressure", pressure)?;

        Ok(Self {
            date_time,
            temperature,
            humidity,
            pressure,
        })
    }

    /// Plausible reading derived only from `date_time`: a daily temperature
    /// wave with humidity moving against it and a slow pressure drift.
    pub fn synthetic(date_time: ShortDateTime) -> Self {
        use std::f32::consts::TAU;

        let day_phase = date_time.time() as f32 / SECONDS_IN_DAY as f32;
        let day = date_time.date().to_epoch_day() as f32;
        let wave = (TAU * (day_phase - 0.375)).sin();

        Self {
            date_time,
            temperature: 12.0 + 7.0 * wave + 3.0 * (day / 5.0).sin(),
            humidity: (65.0 - 20.0 * wave).clamp(0.0, 100.0),
            pressure: 750.0 + 6.0 * (day / 3.0 + day_phase).sin(),
        }
    }
}

impl WriteObject for WeatherInfo {
    fn serialized_size(&self) -> usize {
        Self::SERIALIZED_SIZE
    }

    fn write_object(&self, writer: &mut ValueWriter<'_>) {
        writer.int64(self.date_time.packed());
        writer.float32(self.temperature);
        writer.float32(self.humidity);
        writer.float32(self.pressure);
    }
}

impl ReadObject for WeatherInfo {
    fn read_object(reader: &mut ValueReader<'_>) -> Result<Self, ValidationError> {
        let date_time: ShortDateTime = reader.int64()?.try_into()?;
        let temperature = reader.float32()?;
        let humidity = reader.float32()?;
        let pressure = reader.float32()?;

        Self::new(date_time, temperature, humidity, pressure)
    }
}

fn ensure_finite(name: &'static str, value: f32) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::invalid_value(name, value))
    }
}

fn ensure_humidity(name: &'static str, value: f32) -> Result<(), ValidationError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::invalid_value(name, value))
    }
}

/// Summary of one measured parameter over a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterStats {
    pub min: f32,
    pub max: f32,
    pub avg: f32,
    pub median: f32,
}

impl ParameterStats {
    pub const SERIALIZED_SIZE: usize = 16;

    /// Stats over a non-empty slice of values.
    fn compute(values: &mut [f32]) -> Self {
        values.sort_by(f32::total_cmp);

        let len = values.len();
        let sum: f32 = values.iter().sum();
        let mid = len / 2;
        let median = if len % 2 == 0 {
            (values[mid - 1] + values[mid]) * 0.5
        } else {
            values[mid]
        };

        Self {
            min: values[0],
            max: values[len - 1],
            avg: sum / len as f32,
            median,
        }
    }
}

impl WriteObject for ParameterStats {
    fn serialized_size(&self) -> usize {
        Self::SERIALIZED_SIZE
    }

    fn write_object(&self, writer: &mut ValueWriter<'_>) {
        writer.float32(self.min);
        writer.float32(self.max);
        writer.float32(self.avg);
        writer.float32(self.median);
    }
}

impl ReadObject for ParameterStats {
    fn read_object(reader: &mut ValueReader<'_>) -> Result<Self, ValidationError> {
        Ok(Self {
            min: reader.float32()?,
            max: reader.float32()?,
            avg: reader.float32()?,
            median: reader.float32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub temperature: ParameterStats,
    pub humidity: ParameterStats,
    pub pressure: ParameterStats,
}

impl ReportStats {
    pub const SERIALIZED_SIZE: usize = 3 * ParameterStats::SERIALIZED_SIZE;

    fn compute(weather: &[WeatherInfo]) -> Self {
        let mut temperature: Vec<f32> = weather.iter().map(|w| w.temperature).collect();
        let mut humidity: Vec<f32> = weather.iter().map(|w| w.humidity).collect();
        let mut pressure: Vec<f32> = weather.iter().map(|w| w.pressure).collect();

        Self {
            temperature: ParameterStats::compute(&mut temperature),
            humidity: ParameterStats::compute(&mut humidity),
            pressure: ParameterStats::compute(&mut pressure),
        }
    }
}

impl WriteObject for ReportStats {
    fn serialized_size(&self) -> usize {
        Self::SERIALIZED_SIZE
    }

    fn write_object(&self, writer: &mut ValueWriter<'_>) {
        self.temperature.write_object(writer);
        self.humidity.write_object(writer);
        self.pressure.write_object(writer);
    }
}

impl ReadObject for ReportStats {
    fn read_object(reader: &mut ValueReader<'_>) -> Result<Self, ValidationError> {
        Ok(Self {
            temperature: ParameterStats::read_object(reader)?,
            humidity: ParameterStats::read_object(reader)?,
            pressure: ParameterStats::read_object(reader)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayReportEntry {
    /// Second of the day
    pub time: i32,
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
}

/// Readings of a single day plus stats over all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    pub entries: Vec<DayReportEntry>,
    pub stats: ReportStats,
}

impl DayReport {
    const ENTRY_SIZE: usize = 16;

    /// Most entries a report carries: one per minute. Keeps a full day
    /// well inside the `int16` payload size of the raw contract.
    pub const MAX_ENTRIES: usize = 1440;

    /// Build a report from readings of one day ordered by time. Returns
    /// `None` when there are none.
    ///
    /// Days with more than [`MAX_ENTRIES`](Self::MAX_ENTRIES) readings are
    /// thinned to every n-th reading, starting with the first. Stats always
    /// cover every reading.
    pub fn from_weather(weather: &[WeatherInfo]) -> Option<Self> {
        if weather.is_empty() {
            return None;
        }

        let step = weather.len().div_ceil(Self::MAX_ENTRIES);
        let entries = weather
            .iter()
            .step_by(step)
            .map(|w| DayReportEntry {
                time: w.date_time.time(),
                temperature: w.temperature,
                humidity: w.humidity,
                pressure: w.pressure,
            })
            .collect();

        Some(Self {
            entries,
            stats: ReportStats::compute(weather),
        })
    }
}

impl WriteObject for DayReport {
    fn serialized_size(&self) -> usize {
        ReportStats::SERIALIZED_SIZE + 2 + Self::ENTRY_SIZE * self.entries.len()
    }

    fn write_object(&self, writer: &mut ValueWriter<'_>) {
        self.stats.write_object(writer);
        writer.length16("report entries", self.entries.len());
        for entry in &self.entries {
            writer.int32(entry.time);
            writer.float32(entry.temperature);
            writer.float32(entry.humidity);
            writer.float32(entry.pressure);
        }
    }
}

impl ReadObject for DayReport {
    fn read_object(reader: &mut ValueReader<'_>) -> Result<Self, ValidationError> {
        let stats = ReportStats::read_object(reader)?;
        let len = read_entry_count(reader)?;

        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            let time = reader.int32()?;
            if !(0..SECONDS_IN_DAY).contains(&time) {
                return Err(ValidationError::invalid_value("entry time", time));
            }
            let temperature = reader.float32()?;
            let humidity = reader.float32()?;
            ensure_humidity("entry humidity", humidity)?;
            let pressure = reader.float32()?;

            entries.push(DayReportEntry {
                time,
                temperature,
                humidity,
                pressure,
            });
        }

        Ok(Self { entries, stats })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRangeReportEntry {
    pub date: ShortDate,
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub min_humidity: f32,
    pub max_humidity: f32,
    pub min_pressure: f32,
    pub max_pressure: f32,
}

impl DayRangeReportEntry {
    fn first(w: &WeatherInfo) -> Self {
        Self {
            date: w.date_time.date(),
            min_temperature: w.temperature,
            max_temperature: w.temperature,
            min_humidity: w.humidity,
            max_humidity: w.humidity,
            min_pressure: w.pressure,
            max_pressure: w.pressure,
        }
    }

    fn include(&mut self, w: &WeatherInfo) {
        self.min_temperature = self.min_temperature.min(w.temperature);
        self.max_temperature = self.max_temperature.max(w.temperature);
        self.min_humidity = self.min_humidity.min(w.humidity);
        self.max_humidity = self.max_humidity.max(w.humidity);
        self.min_pressure = self.min_pressure.min(w.pressure);
        self.max_pressure = self.max_pressure.max(w.pressure);
    }
}

/// Per-day extremes over a range of days plus overall stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRangeReport {
    pub entries: Vec<DayRangeReportEntry>,
    pub stats: ReportStats,
}

impl DayRangeReport {
    const ENTRY_SIZE: usize = 28;

    /// Build a report from readings ordered by time. One entry per
    /// calendar day present. Returns `None` when there are no readings.
    pub fn from_weather(weather: &[WeatherInfo]) -> Option<Self> {
        if weather.is_empty() {
            return None;
        }

        let mut entries: Vec<DayRangeReportEntry> = Vec::new();
        for w in weather {
            match entries.last_mut() {
                Some(entry) if entry.date == w.date_time.date() => entry.include(w),
                _ => entries.push(DayRangeReportEntry::first(w)),
            }
        }

        Some(Self {
            entries,
            stats: ReportStats::compute(weather),
        })
    }
}

impl WriteObject for DayRangeReport {
    fn serialized_size(&self) -> usize {
        ReportStats::SERIALIZED_SIZE + 2 + Self::ENTRY_SIZE * self.entries.len()
    }

    fn write_object(&self, writer: &mut ValueWriter<'_>) {
        self.stats.write_object(writer);
        writer.length16("report entries", self.entries.len());
        for entry in &self.entries {
            writer.int32(entry.date.packed());
            writer.float32(entry.min_temperature);
            writer.float32(entry.max_temperature);
            writer.float32(entry.min_humidity);
            writer.float32(entry.max_humidity);
            writer.float32(entry.min_pressure);
            writer.float32(entry.max_pressure);
        }
    }
}

impl ReadObject for DayRangeReport {
    fn read_object(reader: &mut ValueReader<'_>) -> Result<Self, ValidationError> {
        let stats = ReportStats::read_object(reader)?;
        let len = read_entry_count(reader)?;

        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            let date: ShortDate = reader.int32()?.try_into()?;
            let entry = DayRangeReportEntry {
                date,
                min_temperature: reader.float32()?,
                max_temperature: reader.float32()?,
                min_humidity: reader.float32()?,
                max_humidity: reader.float32()?,
                min_pressure: reader.float32()?,
                max_pressure: reader.float32()?,
            };
            ensure_humidity("min humidity", entry.min_humidity)?;
            ensure_humidity("max humidity", entry.max_humidity)?;
            entries.push(entry);
        }

        Ok(Self { entries, stats })
    }
}

fn read_entry_count(reader: &mut ValueReader<'_>) -> Result<usize, ValidationError> {
    let len = reader.int16()?;
    if len < 0 {
        return Err(ValidationError::invalid_value("entries length", len));
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{SerializationError, of_byte_array, to_byte_array};

    fn reading(date: ShortDate, hour: i32, temperature: f32, humidity: f32) -> WeatherInfo {
        WeatherInfo::new(
            ShortDateTime::of(date, hour * 3600).unwrap(),
            temperature,
            humidity,
            750.0 + hour as f32,
        )
        .unwrap()
    }

    fn day() -> ShortDate {
        ShortDate::of(2021, 5, 12).unwrap()
    }

    #[test]
    fn weather_rejects_out_of_range_humidity() {
        let dt = ShortDateTime::start_of_day(day());
        assert!(WeatherInfo::new(dt, 20.0, 101.0, 750.0).is_err());
        assert!(WeatherInfo::new(dt, f32::NAN, 50.0, 750.0).is_err());
        assert!(WeatherInfo::new(dt, -40.0, 0.0, 700.0).is_ok());
    }

    #[test]
    fn synthetic_readings_are_valid_and_repeatable() {
        for hour in 0..24 {
            let dt = ShortDateTime::of(day(), hour * 3600).unwrap();
            let w = WeatherInfo::synthetic(dt);
            assert_eq!(w, WeatherInfo::synthetic(dt));
            assert!(
                WeatherInfo::new(dt, w.temperature, w.humidity, w.pressure).is_ok(),
                "hour {hour}"
            );
        }
    }

    #[test]
    fn weather_serializer_size_and_round_trip() {
        let w = reading(day(), 13, -3.5, 61.0);
        let bytes = to_byte_array(&w).unwrap();
        assert_eq!(bytes.len(), WeatherInfo::SERIALIZED_SIZE);
        assert_eq!(of_byte_array::<WeatherInfo>(&bytes).unwrap(), w);
    }

    #[test]
    fn weather_read_validates_date_time() {
        let mut bytes = to_byte_array(&reading(day(), 1, 0.0, 50.0)).unwrap();
        bytes[..8].copy_from_slice(&0i64.to_le_bytes());
        assert!(of_byte_array::<WeatherInfo>(&bytes).is_err());
    }

    #[test]
    fn day_report_stats() {
        let weather = [
            reading(day(), 0, 10.0, 40.0),
            reading(day(), 1, 14.0, 60.0),
            reading(day(), 2, 12.0, 50.0),
            reading(day(), 3, 20.0, 70.0),
        ];
        let report = DayReport::from_weather(&weather).unwrap();

        assert_eq!(report.entries.len(), 4);
        assert_eq!(report.entries[1].time, 3600);
        assert_eq!(report.stats.temperature.min, 10.0);
        assert_eq!(report.stats.temperature.max, 20.0);
        assert_eq!(report.stats.temperature.avg, 14.0);
        assert_eq!(report.stats.temperature.median, 13.0);
        assert_eq!(report.stats.humidity.median, 55.0);
    }

    #[test]
    fn empty_input_builds_no_report() {
        assert!(DayReport::from_weather(&[]).is_none());
        assert!(DayRangeReport::from_weather(&[]).is_none());
    }

    #[test]
    fn day_report_serializer_matches_declared_size() {
        let weather: Vec<_> = (0..24).map(|h| reading(day(), h, h as f32, 50.0)).collect();
        let report = DayReport::from_weather(&weather).unwrap();

        let bytes = to_byte_array(&report).unwrap();
        assert_eq!(bytes.len(), report.serialized_size());
        assert_eq!(bytes.len(), 48 + 2 + 16 * 24);
        assert_eq!(of_byte_array::<DayReport>(&bytes).unwrap(), report);
    }

    #[test]
    fn range_report_groups_by_day() {
        let next = day().plus_days(1).unwrap();
        let weather = [
            reading(day(), 10, 5.0, 40.0),
            reading(day(), 11, 9.0, 45.0),
            reading(next, 10, -1.0, 80.0),
        ];
        let report = DayRangeReport::from_weather(&weather).unwrap();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].date, day());
        assert_eq!(report.entries[0].min_temperature, 5.0);
        assert_eq!(report.entries[0].max_temperature, 9.0);
        assert_eq!(report.entries[1].date, next);
        assert_eq!(report.entries[1].max_humidity, 80.0);
        assert_eq!(report.stats.temperature.min, -1.0);
        assert_eq!(report.stats.temperature.median, 5.0);

        let bytes = to_byte_array(&report).unwrap();
        assert_eq!(bytes.len(), 48 + 2 + 28 * 2);
        assert_eq!(of_byte_array::<DayRangeReport>(&bytes).unwrap(), report);
    }

    #[test]
    fn dense_day_is_thinned_but_stats_cover_everything() {
        let first = ShortDateTime::start_of_day(day());
        let weather: Vec<_> = (0..8640)
            .map(|i| {
                let dt = first.plus_seconds(i * 10).unwrap();
                WeatherInfo::new(dt, i as f32, 50.0, 750.0).unwrap()
            })
            .collect();

        let report = DayReport::from_weather(&weather).unwrap();
        assert_eq!(report.entries.len(), DayReport::MAX_ENTRIES);
        assert_eq!(report.entries[0].time, 0);
        assert_eq!(report.entries[1].time, 60);
        assert_eq!(report.stats.temperature.max, 8639.0);
        assert!(report.serialized_size() <= i16::MAX as usize);

        let bytes = to_byte_array(&report).unwrap();
        assert_eq!(of_byte_array::<DayReport>(&bytes).unwrap(), report);
    }

    #[test]
    fn day_at_the_limit_is_not_thinned() {
        let first = ShortDateTime::start_of_day(day());
        let weather: Vec<_> = (0..DayReport::MAX_ENTRIES as i64)
            .map(|i| WeatherInfo::synthetic(first.plus_seconds(i * 60).unwrap()))
            .collect();
        let report = DayReport::from_weather(&weather).unwrap();
        assert_eq!(report.entries.len(), weather.len());
    }

    #[test]
    fn oversized_report_does_not_serialize() {
        let entry = DayReportEntry {
            time: 0,
            temperature: 0.0,
            humidity: 50.0,
            pressure: 750.0,
        };
        let stats = DayReport::from_weather(&[reading(day(), 0, 0.0, 50.0)])
            .unwrap()
            .stats;
        let report = DayReport {
            entries: vec![entry; 40_000],
            stats,
        };

        assert!(matches!(
            to_byte_array(&report),
            Err(SerializationError::LengthOverflow { len: 40_000, .. })
        ));
    }

    #[test]
    fn negative_entry_count_is_rejected() {
        let report = DayReport::from_weather(&[reading(day(), 0, 1.0, 1.0)]).unwrap();
        let mut bytes = to_byte_array(&report).unwrap();
        bytes[48..50].copy_from_slice(&(-1i16).to_le_bytes());
        assert!(of_byte_array::<DayReport>(&bytes).is_err());
    }
}
