use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{SimulatedWeatherProvider, WeatherInfoProvider, WeatherMonitor};
use crate::repo::MemoryWeatherRepository;

/// Shared state handed to every server.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub repo: MemoryWeatherRepository,
    pub monitor: Arc<WeatherMonitor>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let provider: Arc<dyn WeatherInfoProvider> = if config.simulation {
            Arc::new(SimulatedWeatherProvider)
        } else {
            anyhow::bail!("No weather sensor is available; run with simulation enabled");
        };
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: AppConfig, provider: Arc<dyn WeatherInfoProvider>) -> Self {
        let repo = MemoryWeatherRepository::new();
        let monitor = WeatherMonitor::new(Arc::new(repo.clone()), provider, config.weather_interval());

        Self {
            config: Arc::new(config),
            repo,
            monitor: Arc::new(monitor),
        }
    }
}
