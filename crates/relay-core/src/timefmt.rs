use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

/// Current wall-clock time in the local offset, falling back to UTC when the offset is unknown.
pub fn now_local() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match UtcOffset::current_local_offset() {
        Ok(offset) => now.to_offset(offset),
        Err(_) => now,
    }
}

pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[inline]
pub fn now_rfc3339() -> String {
    rfc3339(now_local())
}

pub fn unix_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Unique `<unix-millis>-<uuid-v4>` identifier, used for log batches and agent uuids.
pub fn stamped_id() -> String {
    format!("{}-{}", unix_millis(), uuid::Uuid::new_v4())
}

/// Prefix of a working-area directory name, `YYYY.MM.DD-H.m-`.
pub fn area_prefix(at: OffsetDateTime) -> String {
    format!(
        "{:04}.{:02}.{:02}-{}.{}-",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn area_prefix_has_unpadded_time() {
        let at = datetime!(2026-03-07 09:05 UTC);
        assert_eq!(area_prefix(at), "2026.03.07-9.5-");
    }

    #[test]
    fn stamped_ids_are_unique() {
        let a = stamped_id();
        let b = stamped_id();
        assert_ne!(a, b);
        assert!(a.split_once('-').unwrap().0.parse::<i128>().is_ok());
    }
}
