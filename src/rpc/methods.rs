//! Repo command dispatch.
//!
//! One request per connection: read it, validate the argument against the
//! command, run the matching [`WeatherDataSource`] query and answer with
//! `Empty`, `Error` or `Ok`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use crate::core::{
    DayRangeReport, DayReport, ShortDate, ShortDateRange, WeatherDataSource, WeatherInfo,
};
use crate::serialization::{ValueWriter, WriteObject};

use super::contract::{Contract, ContractKind};
use super::protocol::{Argument, Command, ErrorCode, Request, Response};
use super::transport::ClientHandler;

/// Any value the repo server can answer with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    DateRange(ShortDateRange),
    DayReport(DayReport),
    DayRangeReport(DayRangeReport),
    Weather(WeatherInfo),
}

impl WriteObject for Payload {
    fn serialized_size(&self) -> usize {
        match self {
            Payload::DateRange(v) => v.serialized_size(),
            Payload::DayReport(v) => v.serialized_size(),
            Payload::DayRangeReport(v) => v.serialized_size(),
            Payload::Weather(v) => v.serialized_size(),
        }
    }

    fn write_object(&self, writer: &mut ValueWriter<'_>) {
        match self {
            Payload::DateRange(v) => v.write_object(writer),
            Payload::DayReport(v) => v.write_object(writer),
            Payload::DayRangeReport(v) => v.write_object(writer),
            Payload::Weather(v) => v.write_object(writer),
        }
    }
}

impl From<ShortDateRange> for Payload {
    fn from(value: ShortDateRange) -> Self {
        Payload::DateRange(value)
    }
}

impl From<DayReport> for Payload {
    fn from(value: DayReport) -> Self {
        Payload::DayReport(value)
    }
}

impl From<DayRangeReport> for Payload {
    fn from(value: DayRangeReport) -> Self {
        Payload::DayRangeReport(value)
    }
}

impl From<WeatherInfo> for Payload {
    fn from(value: WeatherInfo) -> Self {
        Payload::Weather(value)
    }
}

/// A request whose argument passed validation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Query {
    DayReport(ShortDate),
    DayRangeReport(ShortDateRange),
    AvailableDateRange,
    LastWeather,
}

impl Query {
    fn parse(request: &Request) -> Result<Self, ErrorCode> {
        let command = match request.command() {
            Some(command) => command,
            None => return Err(ErrorCode::InvalidCommand),
        };

        match (command, request.argument) {
            (Command::GetDayReport, Argument::Integer(packed)) => ShortDate::try_from(packed)
                .map(Query::DayReport)
                .map_err(|_| ErrorCode::InvalidArguments),
            (Command::GetDayReport, _) => Err(ErrorCode::InvalidArguments),
            (
                Command::GetDayRangeReport,
                Argument::DateRange {
                    start,
                    end_inclusive,
                },
            ) => ShortDateRange::from_packed(start, end_inclusive)
                .map(Query::DayRangeReport)
                .map_err(|_| ErrorCode::InvalidArguments),
            (Command::GetDayRangeReport, _) => Err(ErrorCode::InvalidArguments),
            (Command::GetAvailableDateRange, _) => Ok(Query::AvailableDateRange),
            (Command::GetLastWeather, _) => Ok(Query::LastWeather),
            (Command::GetNextWeatherTime, _) => Err(ErrorCode::InvalidCommand),
        }
    }
}

/// Serves repo queries over the configured contract.
pub struct RepoHandler {
    source: Arc<dyn WeatherDataSource>,
    contract: ContractKind,
}

impl RepoHandler {
    pub fn new(source: Arc<dyn WeatherDataSource>, contract: ContractKind) -> Self {
        Self { source, contract }
    }

    /// Answer one decoded request. Never fails: every problem becomes an
    /// error response.
    pub async fn handle(&self, request: &Request) -> Response<Payload> {
        let query = match Query::parse(request) {
            Ok(query) => query,
            Err(code) => {
                warn!(server = "repo", %request, error = %code, "Rejected request");
                return Response::Error(code);
            }
        };

        match self.run(query).await {
            Ok(payload) => payload.into(),
            Err(e) => {
                let code = ErrorCode::classify(&e);
                error!(server = "repo", %request, error = %format!("{e:#}"), code = %code, "Request failed");
                Response::Error(code)
            }
        }
    }

    async fn run(&self, query: Query) -> anyhow::Result<Option<Payload>> {
        let payload = match query {
            Query::DayReport(date) => self
                .source
                .get_day_report(date)
                .await
                .with_context(|| format!("Failed to build day report for {date}"))?
                .map(Payload::from),
            Query::DayRangeReport(range) => self
                .source
                .get_day_range_report(range)
                .await
                .with_context(|| format!("Failed to build range report for {range}"))?
                .map(Payload::from),
            Query::AvailableDateRange => self
                .source
                .get_available_date_range()
                .await
                .context("Failed to get available date range")?
                .map(Payload::from),
            Query::LastWeather => self
                .source
                .get_last_weather()
                .await
                .context("Failed to get last weather")?
                .map(Payload::from),
        };
        Ok(payload)
    }
}

#[async_trait]
impl ClientHandler for RepoHandler {
    fn name(&self) -> &'static str {
        "repo"
    }

    async fn process_client(&self, mut stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let response = match self.contract.read_request(&mut stream).await {
            Ok(request) => {
                info!(server = "repo", peer = %peer, %request, "Request received");
                self.handle(&request).await
            }
            Err(e) if e.is_recoverable() => {
                warn!(server = "repo", peer = %peer, error = %e, "Rejected undecodable request");
                Response::Error(e.error_code())
            }
            Err(e) => return Err(e).context("Failed to read request"),
        };

        info!(server = "repo", peer = %peer, response = response.kind(), "Sending response");
        match self.contract.write_response(&response, &mut stream).await {
            Err(e) if e.is_unsent() => {
                let code = e.error_code();
                error!(server = "repo", peer = %peer, error = %e, code = %code, "Response cannot be encoded");
                self.contract
                    .write_response(&Response::<Payload>::Error(code), &mut stream)
                    .await
                    .context("Failed to write error response")?;
            }
            written => written.context("Failed to write response")?,
        }
        stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataSourceError;
    use crate::repo::{MemoryWeatherRepository, seed_hourly};

    fn date(y: i32, m: u32, d: u32) -> ShortDate {
        ShortDate::of(y, m, d).unwrap()
    }

    async fn seeded() -> RepoHandler {
        let repo = MemoryWeatherRepository::new();
        seed_hourly(&repo, date(2021, 5, 1), 48).await.unwrap();
        RepoHandler::new(Arc::new(repo), ContractKind::default())
    }

    struct Broken;

    #[async_trait]
    impl WeatherDataSource for Broken {
        async fn get_day_report(&self, _: ShortDate) -> Result<Option<DayReport>, DataSourceError> {
            Err(DataSourceError::Storage("table missing".into()))
        }

        async fn get_day_range_report(
            &self,
            _: ShortDateRange,
        ) -> Result<Option<DayRangeReport>, DataSourceError> {
            Err(DataSourceError::Storage("table missing".into()))
        }

        async fn get_available_date_range(
            &self,
        ) -> Result<Option<ShortDateRange>, DataSourceError> {
            Ok(None)
        }

        async fn get_last_weather(&self) -> Result<Option<WeatherInfo>, DataSourceError> {
            Err(DataSourceError::NoMonitor)
        }
    }

    #[tokio::test]
    async fn day_report_argument_validation() {
        let handler = seeded().await;

        let missing = Request::without_argument(Command::GetDayReport);
        assert_eq!(
            handler.handle(&missing).await,
            Response::Error(ErrorCode::InvalidArguments)
        );

        let month_13 = Request {
            command: Command::GetDayReport.id(),
            argument: Argument::Integer((2021 << 16) | (13 << 8) | 1),
        };
        assert_eq!(
            handler.handle(&month_13).await,
            Response::Error(ErrorCode::InvalidArguments)
        );

        let wrong_shape = Request {
            command: Command::GetDayReport.id(),
            argument: Argument::DateRange {
                start: date(2021, 5, 1).packed(),
                end_inclusive: date(2021, 5, 1).packed(),
            },
        };
        assert_eq!(
            handler.handle(&wrong_shape).await,
            Response::Error(ErrorCode::InvalidArguments)
        );
    }

    #[tokio::test]
    async fn inverted_range_is_invalid() {
        let handler = seeded().await;
        let request = Request {
            command: Command::GetDayRangeReport.id(),
            argument: Argument::DateRange {
                start: date(2021, 5, 2).packed(),
                end_inclusive: date(2021, 5, 1).packed(),
            },
        };
        assert_eq!(
            handler.handle(&request).await,
            Response::Error(ErrorCode::InvalidArguments)
        );
    }

    #[tokio::test]
    async fn unknown_command_regardless_of_argument() {
        let handler = seeded().await;
        for argument in [Argument::None, Argument::Integer(date(2021, 5, 1).packed())] {
            let request = Request {
                command: 99,
                argument,
            };
            assert_eq!(
                handler.handle(&request).await,
                Response::Error(ErrorCode::InvalidCommand)
            );
        }

        let channel = Request::without_argument(Command::GetNextWeatherTime);
        assert_eq!(
            handler.handle(&channel).await,
            Response::Error(ErrorCode::InvalidCommand)
        );
    }

    #[tokio::test]
    async fn queries_answer_ok_or_empty() {
        let handler = seeded().await;

        let report = handler
            .handle(&Request::new(Command::GetDayReport, date(2021, 5, 1)))
            .await;
        assert!(matches!(report, Response::Ok(Payload::DayReport(r)) if r.entries.len() == 24));

        let before = handler
            .handle(&Request::new(Command::GetDayReport, date(2021, 4, 28)))
            .await;
        assert!(before.is_empty());

        let range = handler
            .handle(&Request::without_argument(Command::GetAvailableDateRange))
            .await;
        assert_eq!(
            range,
            Response::Ok(Payload::DateRange(
                ShortDateRange::new(date(2021, 5, 1), date(2021, 5, 2)).unwrap()
            ))
        );
    }

    #[tokio::test]
    async fn source_failures_are_classified() {
        let handler = RepoHandler::new(Arc::new(Broken), ContractKind::Json);

        assert_eq!(
            handler
                .handle(&Request::new(Command::GetDayReport, date(2021, 5, 1)))
                .await,
            Response::Error(ErrorCode::InternalDbError)
        );
        assert_eq!(
            handler
                .handle(&Request::without_argument(Command::GetLastWeather))
                .await,
            Response::Error(ErrorCode::Unknown)
        );
        assert!(
            handler
                .handle(&Request::without_argument(Command::GetAvailableDateRange))
                .await
                .is_empty()
        );
    }

    #[test]
    fn payload_serializes_as_inner_value() {
        let range = ShortDateRange::new(date(2021, 5, 1), date(2021, 5, 2)).unwrap();
        assert_eq!(
            serde_json::to_value(Payload::from(range)).unwrap(),
            serde_json::to_value(range).unwrap()
        );
        assert_eq!(Payload::from(range).serialized_size(), 8);
    }
}
