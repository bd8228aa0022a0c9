//! Timestamps are stored as unix seconds so range predicates compare exactly.

use time::OffsetDateTime;

pub fn to_unix(at: OffsetDateTime) -> i64 {
    at.unix_timestamp()
}

/// Out-of-range values clamp to the unix epoch rather than failing a read.
pub fn from_unix(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_round_trip_drops_subseconds() {
        let at = datetime!(2024-01-01 12:30:45.750 UTC);
        assert_eq!(from_unix(to_unix(at)), datetime!(2024-01-01 12:30:45 UTC));
    }
}
