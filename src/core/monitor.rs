//! Periodic weather acquisition.
//!
//! [`WeatherMonitor`] owns one background task that waits out the
//! acquisition interval, asks a [`WeatherInfoProvider`] for a reading and
//! stores it in a [`WeatherRepository`]. The instant of the next
//! acquisition is published for the channel-info server.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::models::WeatherInfo;
use super::source::{
    DataSourceError, WeatherChannelInfoProvider, WeatherInfoProvider, WeatherRepository,
};
use super::time::ShortDateTime;

/// Provider that synthesizes a reading for the current local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedWeatherProvider;

#[async_trait]
impl WeatherInfoProvider for SimulatedWeatherProvider {
    async fn get_weather(&self) -> anyhow::Result<WeatherInfo> {
        Ok(WeatherInfo::synthetic(ShortDateTime::now()))
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct WeatherMonitor {
    repo: Arc<dyn WeatherRepository>,
    provider: Arc<dyn WeatherInfoProvider>,
    interval: Duration,
    /// Epoch millis of the next acquisition.
    next_weather_at: Arc<AtomicI64>,
    running: Mutex<Option<Running>>,
}

impl WeatherMonitor {
    pub fn new(
        repo: Arc<dyn WeatherRepository>,
        provider: Arc<dyn WeatherInfoProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            provider,
            interval,
            next_weather_at: Arc::new(AtomicI64::new(0)),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    /// Spawn the acquisition task. Must be called from within a Tokio runtime.
    /// Starting a running monitor logs a warning and does nothing.
    pub fn start(&self) {
        let Ok(mut running) = self.running.lock() else {
            error!("Weather monitor state is poisoned");
            return;
        };
        if running.is_some() {
            warn!("Weather monitor is already running");
            return;
        }

        let cancel = CancellationToken::new();
        // Publish before spawning so channel info is meaningful right away.
        self.next_weather_at
            .store(now_millis() + self.interval.as_millis() as i64, Ordering::SeqCst);

        let handle = tokio::spawn(acquisition_loop(
            self.repo.clone(),
            self.provider.clone(),
            self.interval,
            self.next_weather_at.clone(),
            cancel.clone(),
        ));

        info!(interval_ms = self.interval.as_millis() as u64, "Weather monitor started");
        *running = Some(Running { cancel, handle });
    }

    /// Cancel the acquisition task and wait for it to finish. Idempotent.
    pub async fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => None,
        };
        let Some(Running { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "Weather monitor task failed");
        }
        info!("Weather monitor stopped");
    }
}

impl WeatherChannelInfoProvider for WeatherMonitor {
    fn millis_until_next_weather(&self) -> Result<i64, DataSourceError> {
        if !self.is_running() {
            return Err(DataSourceError::NoMonitor);
        }
        Ok(self.next_weather_at.load(Ordering::SeqCst) - now_millis())
    }
}

async fn acquisition_loop(
    repo: Arc<dyn WeatherRepository>,
    provider: Arc<dyn WeatherInfoProvider>,
    interval: Duration,
    next_weather_at: Arc<AtomicI64>,
    cancel: CancellationToken,
) {
    loop {
        next_weather_at.store(now_millis() + interval.as_millis() as i64, Ordering::SeqCst);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        match provider.get_weather().await {
            Ok(weather) => {
                debug!(date_time = %weather.date_time, temperature = weather.temperature, "Weather acquired");
                if let Err(e) = repo.put(weather).await {
                    error!(error = %e, "Failed to store weather");
                }
            }
            Err(e) => error!(error = %format!("{e:#}"), "Failed to acquire weather"),
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
