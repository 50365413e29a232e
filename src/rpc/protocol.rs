//! Request and response model shared by every contract.
//!
//! A [`Request`] is a command id plus an [`Argument`]; a [`Response`] is
//! `Empty`, `Error` or `Ok`. Both are plain values with structural
//! equality, created for one round trip.

use std::fmt;

use crate::core::{DataSourceError, ShortDate, ShortDateRange};
use crate::serialization::ValidationError;

use super::contract::ProtocolError;

/// Commands understood by the servers. Ids are stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    GetDayReport,
    GetDayRangeReport,
    GetAvailableDateRange,
    GetLastWeather,
    /// Served by the channel-info server, never by the repo server.
    GetNextWeatherTime,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::GetDayReport,
        Command::GetDayRangeReport,
        Command::GetAvailableDateRange,
        Command::GetLastWeather,
        Command::GetNextWeatherTime,
    ];

    pub fn id(self) -> u8 {
        match self {
            Command::GetDayReport => 1,
            Command::GetDayRangeReport => 2,
            Command::GetAvailableDateRange => 3,
            Command::GetLastWeather => 4,
            Command::GetNextWeatherTime => 5,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::GetDayReport => "GET_DAY_REPORT",
            Command::GetDayRangeReport => "GET_DAY_RANGE_REPORT",
            Command::GetAvailableDateRange => "GET_AVAILABLE_DATE_RANGE",
            Command::GetLastWeather => "GET_LAST_WEATHER",
            Command::GetNextWeatherTime => "GET_NEXT_WEATHER_TIME",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ProtocolError::UnknownCommandName(name.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome codes carried by `Response::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None,
    Unknown,
    InvalidArguments,
    InvalidCommand,
    InternalDbError,
    Io,
    InvalidResponse,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 7] = [
        ErrorCode::None,
        ErrorCode::Unknown,
        ErrorCode::InvalidArguments,
        ErrorCode::InvalidCommand,
        ErrorCode::InternalDbError,
        ErrorCode::Io,
        ErrorCode::InvalidResponse,
    ];

    pub fn id(self) -> i32 {
        match self {
            ErrorCode::None => 0,
            ErrorCode::Unknown => 1,
            ErrorCode::InvalidArguments => 2,
            ErrorCode::InvalidCommand => 3,
            ErrorCode::InternalDbError => 4,
            ErrorCode::Io => 5,
            ErrorCode::InvalidResponse => 6,
        }
    }

    /// Ids outside the known set decode as `Unknown`.
    pub fn from_id(id: i32) -> Self {
        Self::ALL
            .into_iter()
            .find(|e| e.id() == id)
            .unwrap_or(ErrorCode::Unknown)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::None => "NONE",
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::InvalidArguments => "INVALID_ARGUMENTS",
            ErrorCode::InvalidCommand => "INVALID_COMMAND",
            ErrorCode::InternalDbError => "INTERNAL_DB_ERROR",
            ErrorCode::Io => "IO",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
        }
    }

    /// Names outside the known set decode as `Unknown`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(name))
            .unwrap_or(ErrorCode::Unknown)
    }

    /// Map a failure to the code reported to the client. The first error in
    /// the chain with a known meaning wins; anything else is `Unknown`.
    pub fn classify(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if cause.is::<std::io::Error>() {
                return ErrorCode::Io;
            }
            if cause.is::<ValidationError>() {
                return ErrorCode::InvalidArguments;
            }
            if let Some(e) = cause.downcast_ref::<DataSourceError>() {
                return match e {
                    DataSourceError::Storage(_) => ErrorCode::InternalDbError,
                    DataSourceError::NoMonitor => ErrorCode::Unknown,
                };
            }
            if let Some(e) = cause.downcast_ref::<ProtocolError>() {
                return e.error_code();
            }
        }
        ErrorCode::Unknown
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request argument. Dates travel packed and are validated by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Argument {
    #[default]
    None,
    Integer(i32),
    DateRange { start: i32, end_inclusive: i32 },
}

impl From<ShortDate> for Argument {
    fn from(date: ShortDate) -> Self {
        Argument::Integer(date.packed())
    }
}

impl From<ShortDateRange> for Argument {
    fn from(range: ShortDateRange) -> Self {
        Argument::DateRange {
            start: range.start.packed(),
            end_inclusive: range.end_inclusive.packed(),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::None => f.write_str("none"),
            Argument::Integer(value) => write!(f, "{value}"),
            Argument::DateRange {
                start,
                end_inclusive,
            } => write!(f, "[{start},{end_inclusive}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Request {
    /// Raw command id. Ids without a [`Command`] are answered with
    /// `INVALID_COMMAND`.
    pub command: u8,
    pub argument: Argument,
}

impl Request {
    pub fn new(command: Command, argument: impl Into<Argument>) -> Self {
        Self {
            command: command.id(),
            argument: argument.into(),
        }
    }

    pub fn without_argument(command: Command) -> Self {
        Self::new(command, Argument::None)
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_id(self.command)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command() {
            Some(command) => write!(f, "{command}({})", self.argument),
            None => write!(f, "#{}({})", self.command, self.argument),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response<T> {
    /// No data available.
    Empty,
    Error(ErrorCode),
    Ok(T),
}

impl<T> Response<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Response::Empty)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        match self {
            Response::Empty => Response::Empty,
            Response::Error(code) => Response::Error(code),
            Response::Ok(value) => Response::Ok(f(value)),
        }
    }

    /// Short form for log lines, without the payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Empty => "empty",
            Response::Error(_) => "error",
            Response::Ok(_) => "ok",
        }
    }
}

impl<T> From<Option<T>> for Response<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Response::Empty, Response::Ok)
    }
}
