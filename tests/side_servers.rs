//! Status and channel-info servers, alone and wired up by the daemon.

use std::sync::Arc;
use std::time::Duration;

use weatherd::config::AppConfig;
use weatherd::context::AppContext;
use weatherd::core::{ShortDateTime, WeatherInfo, WeatherInfoProvider, WeatherMonitor};
use weatherd::daemon::Daemon;
use weatherd::repo::MemoryWeatherRepository;
use weatherd::rpc::{
    ChannelInfoClient, ChannelInfoServer, Client, ClientError, Command, ServerAvailabilityProvider,
    ServerStatus, StatusServer,
};

const TIMEOUT: Duration = Duration::from_secs(2);

struct FixedProvider;

#[async_trait::async_trait]
impl WeatherInfoProvider for FixedProvider {
    async fn get_weather(&self) -> anyhow::Result<WeatherInfo> {
        Ok(WeatherInfo::synthetic(ShortDateTime::now()))
    }
}

#[tokio::test]
async fn status_is_available_only_while_running() {
    let server = StatusServer::status("127.0.0.1:0".parse().unwrap());
    let addr = server.start().unwrap();
    let provider = ServerAvailabilityProvider::new(addr, TIMEOUT);

    assert_eq!(provider.status().await, ServerStatus::Available);
    assert_eq!(provider.status().await, ServerStatus::Available);

    server.stop().await;
    assert_eq!(provider.status().await, ServerStatus::NotAvailable);
}

#[tokio::test]
async fn channel_info_follows_the_monitor() {
    let monitor = Arc::new(WeatherMonitor::new(
        Arc::new(MemoryWeatherRepository::new()),
        Arc::new(FixedProvider),
        Duration::from_secs(60),
    ));
    let server = ChannelInfoServer::channel_info("127.0.0.1:0".parse().unwrap(), monitor.clone());
    let addr = server.start().unwrap();
    let client = ChannelInfoClient::new(addr, TIMEOUT);

    // No monitor running: the server drops the connection without a value.
    assert!(client.millis_until_next_weather().await.is_err());

    monitor.start();
    let millis = client.millis_until_next_weather().await.unwrap();
    assert!((0..=60_000).contains(&millis), "got {millis}");

    monitor.stop().await;
    server.stop().await;
}

fn loopback_config() -> AppConfig {
    AppConfig {
        repo_port: 0,
        status_port: 0,
        channel_info_port: 0,
        weather_interval_ms: 50,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn daemon_serves_acquired_weather() {
    let ctx = AppContext::with_provider(loopback_config(), Arc::new(FixedProvider));
    let daemon = Daemon::new(ctx);
    let addrs = daemon.start().await.unwrap();

    let status = ServerAvailabilityProvider::new(addrs.status, TIMEOUT);
    assert_eq!(status.status().await, ServerStatus::Available);

    let repo = daemon.context().repo.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while repo.is_empty().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("monitor should store a reading");

    let client = Client::new(addrs.repo, daemon.context().config.contract(), TIMEOUT);
    let last = client
        .request::<WeatherInfo>(Command::GetLastWeather, weatherd::rpc::Argument::None)
        .await
        .unwrap();
    assert!(last.is_some());

    let next = ChannelInfoClient::new(addrs.channel_info, TIMEOUT)
        .millis_until_next_weather()
        .await
        .unwrap();
    assert!(next <= 50, "got {next}");

    daemon.stop().await;
    assert_eq!(status.status().await, ServerStatus::NotAvailable);
    let err = client
        .request::<WeatherInfo>(Command::GetLastWeather, weatherd::rpc::Argument::None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}

#[tokio::test]
async fn daemon_start_fails_when_a_port_is_taken() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = AppConfig {
        status_port: taken.local_addr().unwrap().port(),
        ..loopback_config()
    };
    let ctx = AppContext::with_provider(config, Arc::new(FixedProvider));
    let daemon = Daemon::new(ctx);

    assert!(daemon.start().await.is_err());
    assert!(!daemon.context().monitor.is_running());
}
