pub mod models;
pub mod monitor;
pub mod source;
pub mod time;

pub use models::{
    DayRangeReport, DayRangeReportEntry, DayReport, DayReportEntry, ParameterStats, ReportStats,
    WeatherInfo,
};
pub use monitor::{SimulatedWeatherProvider, WeatherMonitor};
pub use source::{
    DataSourceError, WeatherChannelInfoProvider, WeatherDataSource, WeatherInfoProvider,
    WeatherRepository,
};
pub use time::{ShortDate, ShortDateRange, ShortDateTime};
