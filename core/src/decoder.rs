//! JSON response decoding with a configurable date strategy.
//!
//! Response types opt date fields into the strategy with
//! `#[serde(with = "api_core::decoder::api_date")]`. The active strategy is
//! installed on the current thread for the duration of `JsonDecoder::decode`
//! and `JsonDecoder::encode`, which are synchronous, so concurrent calls on
//! other threads never see it. Serializing through plain `serde_json`
//! outside those calls writes RFC 3339.

use std::cell::RefCell;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::params::Parameters;

/// How `api_date` fields are parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DateDecodingStrategy {
    #[default]
    Rfc3339,
    /// A chrono format string, e.g. `"%Y-%m-%d %H:%M:%S"`. Formats without an
    /// offset are read as UTC.
    Formatted(String),
}

impl DateDecodingStrategy {
    pub fn parse(&self, input: &str) -> Result<DateTime<Utc>, String> {
        match self {
            DateDecodingStrategy::Rfc3339 => DateTime::parse_from_rfc3339(input)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("invalid RFC 3339 date {input:?}: {e}")),
            DateDecodingStrategy::Formatted(format) => {
                if let Ok(dt) = DateTime::parse_from_str(input, format) {
                    return Ok(dt.with_timezone(&Utc));
                }
                if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                    return Ok(naive.and_utc());
                }
                NaiveDate::parse_from_str(input, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
                    .ok_or_else(|| format!("date {input:?} does not match format {format:?}"))
            }
        }
    }

    pub fn format(&self, date: &DateTime<Utc>) -> String {
        match self {
            DateDecodingStrategy::Rfc3339 => date.to_rfc3339(),
            DateDecodingStrategy::Formatted(format) => date.format(format).to_string(),
        }
    }
}

thread_local! {
    static ACTIVE_STRATEGY: RefCell<DateDecodingStrategy> = RefCell::new(DateDecodingStrategy::default());
}

/// Restores the previously active strategy on drop.
struct StrategyGuard {
    previous: Option<DateDecodingStrategy>,
}

impl StrategyGuard {
    fn install(strategy: DateDecodingStrategy) -> Self {
        let previous = ACTIVE_STRATEGY.with(|active| active.replace(strategy));
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for StrategyGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            ACTIVE_STRATEGY.with(|active| *active.borrow_mut() = previous);
        }
    }
}

fn active_strategy() -> DateDecodingStrategy {
    ACTIVE_STRATEGY.with(|active| active.borrow().clone())
}

/// Decodes response bodies from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonDecoder {
    pub date_strategy: DateDecodingStrategy,
}

impl JsonDecoder {
    pub fn new(date_strategy: DateDecodingStrategy) -> Self {
        Self { date_strategy }
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, ApiError> {
        if body.is_empty() {
            return Err(ApiError::EmptyResponse);
        }
        let _guard = StrategyGuard::install(self.date_strategy.clone());
        serde_json::from_slice(body).map_err(|e| ApiError::Decoding(e.to_string()))
    }

    /// Serialize `value` with `api_date` fields written in this decoder's
    /// date format, so the result decodes again with the same decoder.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value, ApiError> {
        let _guard = StrategyGuard::install(self.date_strategy.clone());
        serde_json::to_value(value).map_err(|e| ApiError::Encoding(e.to_string()))
    }

    /// [`Parameters::from_serializable`] with dates in this decoder's format.
    pub fn parameters_from<T: Serialize + ?Sized>(&self, value: &T) -> Parameters {
        let _guard = StrategyGuard::install(self.date_strategy.clone());
        Parameters::from_serializable(value)
    }
}

/// Serde helpers for `DateTime<Utc>` fields decoded with the active strategy.
pub mod api_date {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::active_strategy;

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&active_strategy().format(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        active_strategy().parse(&raw).map_err(de::Error::custom)
    }

    /// Same as the parent module for `Option<DateTime<Utc>>`; `null` maps to
    /// `None`.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        use super::super::active_strategy;

        pub fn serialize<S: Serializer>(
            date: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => serializer.serialize_some(&active_strategy().format(date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| active_strategy().parse(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}
