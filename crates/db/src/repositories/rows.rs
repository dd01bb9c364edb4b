use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use super::RepositoryError;

pub(crate) fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

/// Fixed-width UTC timestamps so TEXT ordering matches chronological ordering.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_timestamp, parse_decimal, parse_timestamp};

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().expect("valid");
        let late = early + chrono::Duration::milliseconds(150);

        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(
            parse_timestamp("created_at", &format_timestamp(late)).expect("parse"),
            late
        );
    }

    #[test]
    fn malformed_money_is_a_decode_error() {
        assert!(parse_decimal("price", "12.5x").is_err());
        assert_eq!(parse_decimal("price", "245.50").expect("parse").to_string(), "245.50");
    }
}
