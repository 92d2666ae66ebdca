use anyhow::{Result, bail};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const EPOCH_SECONDS_CUTOFF: i128 = 100_000_000_000;
const EPOCH_MILLIS_CUTOFF: i128 = 100_000_000_000_000;
const EPOCH_MICROS_CUTOFF: i128 = 100_000_000_000_000_000;
const NANOS_PER_MILLI: i128 = 1_000_000;

/// Earliest and latest parseable instants seen across a set of raw timestamps.
///
/// Unparseable or missing values are ignored; ordering is by instant, never
/// by the raw string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampRange {
    pub earliest_unix_ms: Option<u64>,
    pub latest_unix_ms: Option<u64>,
}

impl TimestampRange {
    pub fn observe(&mut self, raw: Option<&str>) {
        let Some(unix_ms) = raw.and_then(|value| parse_timestamp_to_unix_ms(value).ok()) else {
            return;
        };
        self.earliest_unix_ms = Some(
            self.earliest_unix_ms
                .map_or(unix_ms, |current| current.min(unix_ms)),
        );
        self.latest_unix_ms = Some(
            self.latest_unix_ms
                .map_or(unix_ms, |current| current.max(unix_ms)),
        );
    }

    pub fn merge(&mut self, other: TimestampRange) {
        if let Some(earliest) = other.earliest_unix_ms {
            self.earliest_unix_ms = Some(self.earliest_unix_ms.map_or(earliest, |v| v.min(earliest)));
        }
        if let Some(latest) = other.latest_unix_ms {
            self.latest_unix_ms = Some(self.latest_unix_ms.map_or(latest, |v| v.max(latest)));
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.earliest_unix_ms.is_none() && self.latest_unix_ms.is_none()
    }

    #[must_use]
    pub fn earliest_utc(&self) -> Option<String> {
        self.earliest_unix_ms.map(format_unix_ms)
    }

    #[must_use]
    pub fn latest_utc(&self) -> Option<String> {
        self.latest_unix_ms.map(format_unix_ms)
    }
}

pub fn parse_timestamp_to_unix_ms(raw: &str) -> Result<u64> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        bail!("timestamp input is empty");
    }

    if let Ok(epoch_raw) = candidate.parse::<i128>() {
        return epoch_to_unix_ms(epoch_raw);
    }

    if let Ok(parsed) = OffsetDateTime::parse(candidate, &Rfc3339) {
        return to_unix_ms(parsed);
    }

    bail!("unsupported timestamp format: {candidate}");
}

#[must_use]
pub fn format_unix_ms(timestamp_unix_ms: u64) -> String {
    let nanos = i128::from(timestamp_unix_ms)
        .checked_mul(NANOS_PER_MILLI)
        .unwrap_or(i128::MAX);
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.millisecond()
    )
}

/// Whether two raw timestamps name the same instant.
///
/// Falls back to exact string comparison when either side does not parse.
#[must_use]
pub fn same_instant(left: Option<&str>, right: Option<&str>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(left), Some(right)) => {
            match (
                parse_timestamp_to_unix_ms(left),
                parse_timestamp_to_unix_ms(right),
            ) {
                (Ok(left_ms), Ok(right_ms)) => left_ms == right_ms,
                _ => left.trim() == right.trim(),
            }
        }
        _ => false,
    }
}

/// `YYYY-MM-DD` prefix used in session labels.
///
/// ISO strings contribute their first 10 characters; bare epoch values are
/// converted first so they do not leak digit runs into labels.
#[must_use]
pub fn date_prefix(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return parse_timestamp_to_unix_ms(trimmed)
            .ok()
            .map(|unix_ms| format_unix_ms(unix_ms).chars().take(10).collect());
    }

    Some(trimmed.chars().take(10).collect())
}

fn epoch_to_unix_ms(epoch_raw: i128) -> Result<u64> {
    if epoch_raw < 0 {
        bail!("negative epoch values are not supported");
    }

    let epoch_ms = if epoch_raw < EPOCH_SECONDS_CUTOFF {
        epoch_raw.checked_mul(1_000)
    } else if epoch_raw < EPOCH_MILLIS_CUTOFF {
        Some(epoch_raw)
    } else if epoch_raw < EPOCH_MICROS_CUTOFF {
        Some(epoch_raw / 1_000)
    } else {
        Some(epoch_raw / 1_000_000)
    }
    .ok_or_else(|| anyhow::anyhow!("epoch conversion overflow"))?;

    u64::try_from(epoch_ms)
        .map_err(|_| anyhow::anyhow!("timestamp exceeds supported unix millisecond range"))
}

fn to_unix_ms(parsed: OffsetDateTime) -> Result<u64> {
    if parsed.unix_timestamp() < 0 {
        bail!("timestamps before 1970-01-01T00:00:00Z are not supported");
    }

    let unix_ms = parsed.unix_timestamp_nanos() / NANOS_PER_MILLI;
    u64::try_from(unix_ms)
        .map_err(|_| anyhow::anyhow!("timestamp exceeds supported unix millisecond range"))
}

#[cfg(test)]
mod tests {
    use super::{
        TimestampRange, date_prefix, format_unix_ms, parse_timestamp_to_unix_ms, same_instant,
    };

    #[test]
    fn parses_rfc3339_with_offset() {
        let as_utc = parse_timestamp_to_unix_ms("2026-02-05T09:00:03+02:00")
            .expect("timestamp should parse");
        assert_eq!(as_utc, 1_770_274_803_000);
        assert_eq!(format_unix_ms(as_utc), "2026-02-05T07:00:03.000Z");
    }

    #[test]
    fn infers_epoch_millis() {
        let as_ms = parse_timestamp_to_unix_ms("1770274803000").expect("milliseconds should parse");
        assert_eq!(as_ms, 1_770_274_803_000);
    }

    #[test]
    fn rejects_unsupported_string() {
        let err =
            parse_timestamp_to_unix_ms("next friday").expect_err("unsupported string should fail");
        assert!(err.to_string().contains("unsupported timestamp format"));
    }

    #[test]
    fn range_orders_by_instant_not_by_string() {
        let mut range = TimestampRange::default();
        range.observe(Some("2026-02-05T09:00:00+02:00"));
        range.observe(Some("2026-02-05T08:00:00Z"));
        range.observe(Some("not a time"));
        range.observe(None);

        assert_eq!(
            range.earliest_utc().as_deref(),
            Some("2026-02-05T07:00:00.000Z")
        );
        assert_eq!(
            range.latest_utc().as_deref(),
            Some("2026-02-05T08:00:00.000Z")
        );
    }

    #[test]
    fn merge_widens_both_bounds() {
        let mut left = TimestampRange::default();
        left.observe(Some("2026-01-02T00:00:00Z"));
        let mut right = TimestampRange::default();
        right.observe(Some("2026-01-01T00:00:00Z"));
        right.observe(Some("2026-01-03T00:00:00Z"));

        left.merge(right);
        assert_eq!(left.earliest_unix_ms, right.earliest_unix_ms);
        assert_eq!(left.latest_unix_ms, right.latest_unix_ms);
        assert!(TimestampRange::default().is_empty());
    }

    #[test]
    fn same_instant_compares_across_offsets() {
        assert!(same_instant(
            Some("2026-02-05T07:00:03.000Z"),
            Some("2026-02-05T07:00:03.000+00:00")
        ));
        assert!(!same_instant(
            Some("2026-02-05T07:00:03.000Z"),
            Some("2026-02-05T07:00:04.000Z")
        ));
        assert!(same_instant(None, None));
        assert!(!same_instant(Some("2026-02-05T07:00:03Z"), None));
    }

    #[test]
    fn date_prefix_handles_iso_and_epoch_values() {
        assert_eq!(
            date_prefix("2024-03-01T10:00:00Z").as_deref(),
            Some("2024-03-01")
        );
        assert_eq!(date_prefix("1770274803000").as_deref(), Some("2026-02-05"));
        assert_eq!(date_prefix("  "), None);
    }
}
