//! In-process weather store.
//!
//! Readings live in a `BTreeMap` keyed by packed date-time, which orders
//! chronologically, so day and range queries are plain range scans.
//! Readers share the lock; `put`, `put_many` and `clear` take it exclusively.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{
    DataSourceError, DayRangeReport, DayReport, ShortDate, ShortDateRange, ShortDateTime,
    WeatherDataSource, WeatherInfo, WeatherRepository,
};

/// Cloning shares the underlying store.
#[derive(Clone, Default)]
pub struct MemoryWeatherRepository {
    inner: Arc<RwLock<BTreeMap<ShortDateTime, WeatherInfo>>>,
}

impl MemoryWeatherRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    async fn collect_between(&self, start: ShortDate, end_inclusive: ShortDate) -> Vec<WeatherInfo> {
        let map = self.inner.read().await;
        map.range(ShortDateTime::start_of_day(start)..=ShortDateTime::end_of_day(end_inclusive))
            .map(|(_, weather)| *weather)
            .collect()
    }
}

#[async_trait]
impl WeatherDataSource for MemoryWeatherRepository {
    async fn get_day_report(&self, date: ShortDate) -> Result<Option<DayReport>, DataSourceError> {
        let weather = self.collect_between(date, date).await;
        Ok(DayReport::from_weather(&weather))
    }

    async fn get_day_range_report(
        &self,
        range: ShortDateRange,
    ) -> Result<Option<DayRangeReport>, DataSourceError> {
        let weather = self.collect_between(range.start, range.end_inclusive).await;
        Ok(DayRangeReport::from_weather(&weather))
    }

    async fn get_available_date_range(&self) -> Result<Option<ShortDateRange>, DataSourceError> {
        let map = self.inner.read().await;
        let (Some((first, _)), Some((last, _))) = (map.first_key_value(), map.last_key_value())
        else {
            return Ok(None);
        };

        ShortDateRange::new(first.date(), last.date())
            .map(Some)
            .map_err(|e| DataSourceError::Storage(e.to_string()))
    }

    async fn get_last_weather(&self) -> Result<Option<WeatherInfo>, DataSourceError> {
        let map = self.inner.read().await;
        Ok(map.last_key_value().map(|(_, weather)| *weather))
    }
}

#[async_trait]
impl WeatherRepository for MemoryWeatherRepository {
    async fn put(&self, weather: WeatherInfo) -> Result<(), DataSourceError> {
        let mut map = self.inner.write().await;
        map.insert(weather.date_time, weather);
        Ok(())
    }

    async fn put_many(&self, weather: Vec<WeatherInfo>) -> Result<(), DataSourceError> {
        let mut map = self.inner.write().await;
        map.extend(weather.into_iter().map(|w| (w.date_time, w)));
        Ok(())
    }

    async fn clear(&self) -> Result<(), DataSourceError> {
        self.inner.write().await.clear();
        Ok(())
    }
}
