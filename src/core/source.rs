use async_trait::async_trait;
use thiserror::Error;

use super::models::{DayRangeReport, DayReport, WeatherInfo};
use super::time::{ShortDate, ShortDateRange};

#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The backing store failed to answer.
    #[error("storage failure: {0}")]
    Storage(String),
    /// Channel info was requested from a monitor that is not running.
    #[error("weather monitor is not running")]
    NoMonitor,
}

/// Read side of the weather store. Every query may answer "no data".
#[async_trait]
pub trait WeatherDataSource: Send + Sync {
    async fn get_day_report(&self, date: ShortDate) -> Result<Option<DayReport>, DataSourceError>;

    async fn get_day_range_report(
        &self,
        range: ShortDateRange,
    ) -> Result<Option<DayRangeReport>, DataSourceError>;

    /// Dates of the first and last stored reading.
    async fn get_available_date_range(&self) -> Result<Option<ShortDateRange>, DataSourceError>;

    async fn get_last_weather(&self) -> Result<Option<WeatherInfo>, DataSourceError>;
}

/// Writable weather store. Implementations serialize their own writes.
#[async_trait]
pub trait WeatherRepository: WeatherDataSource {
    async fn put(&self, weather: WeatherInfo) -> Result<(), DataSourceError>;

    async fn put_many(&self, weather: Vec<WeatherInfo>) -> Result<(), DataSourceError>;

    async fn clear(&self) -> Result<(), DataSourceError>;
}

/// Produces one fresh reading on demand.
#[async_trait]
pub trait WeatherInfoProvider: Send + Sync {
    async fn get_weather(&self) -> anyhow::Result<WeatherInfo>;
}

/// Scheduling info about the acquisition channel.
pub trait WeatherChannelInfoProvider: Send + Sync {
    /// Milliseconds until the next scheduled acquisition. May be negative
    /// when an acquisition is overdue.
    fn millis_until_next_weather(&self) -> Result<i64, DataSourceError>;
}
