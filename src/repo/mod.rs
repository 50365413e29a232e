mod memory;

use std::time::Duration;

use crate::core::time::SECONDS_IN_HOUR;
use crate::core::{DataSourceError, ShortDate, ShortDateTime, WeatherInfo, WeatherRepository};

pub use memory::MemoryWeatherRepository;

/// Clear `repo` and fill it with `hours` hourly synthetic readings starting
/// at midnight of `start`.
pub async fn seed_hourly<R>(repo: &R, start: ShortDate, hours: u32) -> Result<(), DataSourceError>
where
    R: WeatherRepository + ?Sized,
{
    seed_every(repo, start, Duration::from_secs(SECONDS_IN_HOUR as u64), hours).await
}

/// Clear `repo` and fill it with `count` synthetic readings `interval`
/// apart, starting at midnight of `start`. Sub-second intervals round up
/// to one second, the resolution of stored timestamps.
pub async fn seed_every<R>(
    repo: &R,
    start: ShortDate,
    interval: Duration,
    count: u32,
) -> Result<(), DataSourceError>
where
    R: WeatherRepository + ?Sized,
{
    repo.clear().await?;

    let step = interval.as_secs().max(1) as i64;
    let first = ShortDateTime::start_of_day(start);
    let weather = (0..count as i64)
        .map_while(|i| first.plus_seconds(i * step))
        .map(WeatherInfo::synthetic)
        .collect();

    repo.put_many(weather).await
}
