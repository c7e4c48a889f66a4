pub mod context;
pub mod extract;
pub mod preferences;
pub mod store;
pub mod types;

/// Current time as a fixed-width RFC 3339 UTC string, so lexical order is time order.
pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Map a text column through `FromStr`, surfacing bad values as a conversion failure.
pub(crate) fn parse_column<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}
