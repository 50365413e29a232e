//! End-to-end tests of the repo server over loopback TCP, for every contract.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use weatherd::config::AppConfig;
use weatherd::core::{
    DataSourceError, DayRangeReport, DayReport, ShortDate, ShortDateRange, ShortDateTime,
    WeatherDataSource, WeatherInfo, WeatherRepository,
};
use weatherd::repo::{MemoryWeatherRepository, seed_every, seed_hourly};
use weatherd::rpc::{
    Argument, ArgumentEncoding, Client, ClientError, Command, ContractKind, ErrorCode,
    RepoServer, Request, Response,
};

const TIMEOUT: Duration = Duration::from_secs(5);

const CONTRACTS: [ContractKind; 3] = [
    ContractKind::Raw(ArgumentEncoding::Tagged),
    ContractKind::Raw(ArgumentEncoding::Opaque),
    ContractKind::Json,
];

struct Harness {
    repo: MemoryWeatherRepository,
    server: RepoServer,
    client: Client,
    addr: SocketAddr,
}

impl Harness {
    fn start(contract: ContractKind) -> Self {
        let repo = MemoryWeatherRepository::new();
        let server = RepoServer::repo(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(repo.clone()),
            contract,
        );
        let addr = server.start().unwrap();
        let client = Client::new(addr, contract, TIMEOUT);

        Self {
            repo,
            server,
            client,
            addr,
        }
    }

    async fn raw_error(&self, request: Request) -> ErrorCode {
        match self
            .client
            .request_raw_response::<WeatherInfo>(request)
            .await
            .unwrap()
        {
            Response::Error(code) => code,
            other => panic!("expected an error response, got {other:?}"),
        }
    }
}

fn start_date() -> ShortDate {
    ShortDate::of(2021, 5, 10).unwrap()
}

#[tokio::test]
async fn end_to_end_with_hourly_history() {
    for contract in CONTRACTS {
        let h = Harness::start(contract);
        let d = start_date();
        seed_hourly(&h.repo, d, 48).await.unwrap();

        let range = h
            .client
            .request::<ShortDateRange>(Command::GetAvailableDateRange, Argument::None)
            .await
            .unwrap()
            .expect("range should be available");
        assert_eq!(range.start, d, "{contract}");
        assert_eq!(range.end_inclusive, d.plus_days(1).unwrap(), "{contract}");

        let report = h
            .client
            .request::<DayReport>(Command::GetDayReport, d)
            .await
            .unwrap()
            .expect("report for seeded day");
        assert_eq!(report.entries.len(), 24, "{contract}");

        let earlier = h
            .client
            .request::<DayReport>(Command::GetDayReport, d.minus_days(3).unwrap())
            .await
            .unwrap();
        assert!(earlier.is_none(), "{contract}");

        let last = h
            .client
            .request::<WeatherInfo>(Command::GetLastWeather, Argument::None)
            .await
            .unwrap()
            .expect("last weather");
        assert_eq!(last.date_time.date(), d.plus_days(1).unwrap());
        assert_eq!(last.date_time.time(), 23 * 3600);

        h.repo.clear().await.unwrap();
        let cleared = h
            .client
            .request::<WeatherInfo>(Command::GetLastWeather, Argument::None)
            .await
            .unwrap();
        assert!(cleared.is_none(), "{contract}");

        h.server.stop().await;
    }
}

#[tokio::test]
async fn range_report_over_stored_days() {
    for contract in CONTRACTS {
        let h = Harness::start(contract);
        let d = start_date();
        seed_hourly(&h.repo, d, 24 * 4).await.unwrap();

        let range = ShortDateRange::new(d.plus_days(1).unwrap(), d.plus_days(2).unwrap()).unwrap();
        let report = h
            .client
            .request::<DayRangeReport>(Command::GetDayRangeReport, range)
            .await
            .unwrap()
            .expect("range report");
        assert_eq!(report.entries.len(), 2, "{contract}");
        assert_eq!(report.entries[0].date, range.start);

        let outside =
            ShortDateRange::new(d.plus_days(10).unwrap(), d.plus_days(12).unwrap()).unwrap();
        let empty = h
            .client
            .request::<DayRangeReport>(Command::GetDayRangeReport, outside)
            .await
            .unwrap();
        assert!(empty.is_none(), "{contract}");

        h.server.stop().await;
    }
}

#[tokio::test]
async fn full_day_at_default_interval_is_reported() {
    let interval = AppConfig::default().weather_interval();
    let readings_per_day = (86_400 / interval.as_secs()) as u32;

    for contract in CONTRACTS {
        let h = Harness::start(contract);
        let d = start_date();
        seed_every(&h.repo, d, interval, readings_per_day)
            .await
            .unwrap();

        let report = h
            .client
            .request::<DayReport>(Command::GetDayReport, d)
            .await
            .unwrap()
            .expect("report for a fully recorded day");
        assert!(report.entries.len() <= DayReport::MAX_ENTRIES, "{contract}");
        assert_eq!(report.entries[0].time, 0, "{contract}");
        assert!(report.entries.last().unwrap().time >= 86_400 - 120, "{contract}");

        h.server.stop().await;
    }
}

/// Answers every range query with far more days than any contract carries.
struct Oversized;

#[async_trait]
impl WeatherDataSource for Oversized {
    async fn get_day_report(&self, _date: ShortDate) -> Result<Option<DayReport>, DataSourceError> {
        Ok(None)
    }

    async fn get_day_range_report(
        &self,
        range: ShortDateRange,
    ) -> Result<Option<DayRangeReport>, DataSourceError> {
        let reading = WeatherInfo::synthetic(ShortDateTime::start_of_day(range.start));
        let mut report = DayRangeReport::from_weather(&[reading]).unwrap();
        report.entries = vec![report.entries[0]; 40_000];
        Ok(Some(report))
    }

    async fn get_available_date_range(&self) -> Result<Option<ShortDateRange>, DataSourceError> {
        Ok(None)
    }

    async fn get_last_weather(&self) -> Result<Option<WeatherInfo>, DataSourceError> {
        Ok(None)
    }
}

#[tokio::test]
async fn unencodable_answer_becomes_error_response() {
    for contract in CONTRACTS {
        let server = RepoServer::repo("127.0.0.1:0".parse().unwrap(), Arc::new(Oversized), contract);
        let addr = server.start().unwrap();
        let client = Client::new(addr, contract, TIMEOUT);

        let range = ShortDateRange::new(start_date(), start_date()).unwrap();
        let err = client
            .request::<DayRangeReport>(Command::GetDayRangeReport, range)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ClientError::Server(ErrorCode::Unknown)),
            "{contract}: {err:?}"
        );

        // The server keeps serving afterwards.
        let last = client
            .request::<WeatherInfo>(Command::GetLastWeather, Argument::None)
            .await
            .unwrap();
        assert!(last.is_none(), "{contract}");

        server.stop().await;
    }
}

#[tokio::test]
async fn invalid_arguments_are_reported() {
    for contract in CONTRACTS {
        let h = Harness::start(contract);

        let missing = Request::without_argument(Command::GetDayReport);
        assert_eq!(h.raw_error(missing).await, ErrorCode::InvalidArguments, "{contract}");

        let month_13 = Request {
            command: Command::GetDayReport.id(),
            argument: Argument::Integer((2021 << 16) | (13 << 8) | 1),
        };
        assert_eq!(h.raw_error(month_13).await, ErrorCode::InvalidArguments, "{contract}");

        let none_date = Request {
            command: Command::GetDayReport.id(),
            argument: Argument::Integer(ShortDate::NONE),
        };
        assert_eq!(h.raw_error(none_date).await, ErrorCode::InvalidArguments, "{contract}");

        let range_without_range = Request::new(Command::GetDayRangeReport, start_date());
        assert_eq!(
            h.raw_error(range_without_range).await,
            ErrorCode::InvalidArguments,
            "{contract}"
        );

        h.server.stop().await;
    }
}

#[tokio::test]
async fn server_errors_surface_as_client_errors() {
    let h = Harness::start(ContractKind::default());
    let err = h
        .client
        .request::<DayReport>(Command::GetDayReport, Argument::None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Server(ErrorCode::InvalidArguments)));
    h.server.stop().await;
}

#[tokio::test]
async fn unknown_command_is_invalid_command() {
    for contract in [
        ContractKind::Raw(ArgumentEncoding::Tagged),
        ContractKind::Raw(ArgumentEncoding::Opaque),
    ] {
        let h = Harness::start(contract);
        for argument in [Argument::None, Argument::Integer(start_date().packed())] {
            let request = Request {
                command: 42,
                argument,
            };
            assert_eq!(h.raw_error(request).await, ErrorCode::InvalidCommand, "{contract}");
        }
        h.server.stop().await;
    }
}

async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    timeout(TIMEOUT, stream.read_to_end(&mut reply))
        .await
        .expect("server should close the connection")
        .unwrap();
    reply
}

#[tokio::test]
async fn json_unknown_command_name_is_invalid_command() {
    let h = Harness::start(ContractKind::Json);
    let reply = exchange(h.addr, br#"{"command":"GET_EVERYTHING"}"#).await;
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(reply, serde_json::json!({ "error": "INVALID_COMMAND" }));
    h.server.stop().await;
}

#[tokio::test]
async fn opaque_argument_of_odd_length_is_invalid() {
    let h = Harness::start(ContractKind::Raw(ArgumentEncoding::Opaque));
    // GET_DAY_REPORT with a 1-byte argument
    let reply = exchange(h.addr, &[1, 1, 0, 7]).await;
    assert_eq!(reply, [1, 2, 0, 0, 0]);
    h.server.stop().await;
}

#[tokio::test]
async fn undecodable_request_drops_connection() {
    let h = Harness::start(ContractKind::Raw(ArgumentEncoding::Tagged));
    // Unknown argument type: nothing is sent back.
    let reply = exchange(h.addr, &[1, 9]).await;
    assert!(reply.is_empty());

    // The server keeps answering afterwards.
    let request = Request::without_argument(Command::GetLastWeather);
    let response = h
        .client
        .request_raw_response::<WeatherInfo>(request)
        .await
        .unwrap();
    assert!(response.is_empty());
    h.server.stop().await;
}
