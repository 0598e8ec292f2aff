//! Sink implementations
//!
//! Contains CsvSink, InfluxSink, TelegramSink and LogSink.

mod csv;
mod influx;
mod log;
mod telegram;

pub use self::csv::{csv_row, CsvSink, CSV_COLUMNS, WIP_PREFIX};
pub use self::influx::{encode_reading, InfluxSink};
pub use self::log::LogSink;
pub use self::telegram::{format_message, TelegramSink, TELEGRAM_API_BASE};
