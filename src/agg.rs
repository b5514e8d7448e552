use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::db::{Database, NewPost};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;

/// RFC-1123 with a numeric zone, the one layout feeds are expected to use.
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// One ingestion cycle: fetch the single most stale feed and store its new
/// items as posts, deduplicated by link.
pub async fn scrape_once(db: &Database, fetcher: &Fetcher) -> Result<()> {
    let feed = db.next_feed_to_fetch().await?;

    // Mark the feed fetched before touching the network so a failing feed
    // still rotates to the back of the queue instead of starving the rest.
    db.mark_feed_fetched(feed.id, Utc::now()).await?;

    info!("fetching feed '{}' ({})", feed.name, feed.url);
    let rss = fetcher.fetch(&feed.url).await?;

    let mut stored = 0;
    for item in rss.items {
        if db.get_post_by_link(&item.link).await?.is_some() {
            continue;
        }

        let published_at = parse_pub_date(&item.pub_date)?;
        let new_post = NewPost {
            title: item.title,
            url: item.link,
            description: item.description,
            published_at,
            feed_id: feed.id,
        };
        match db.create_post(new_post).await {
            Ok(_) => stored += 1,
            // Lost an insert race against another process; same outcome as
            // the dedup probe finding the post.
            Err(Error::Conflict(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    info!("stored {} new posts from '{}'", stored, feed.name);
    Ok(())
}

/// Run ingestion cycles forever at a fixed rate. The first cycle fires
/// immediately; a cycle that overruns the interval delays the next tick
/// rather than double-firing. Cycle errors are logged and never escape.
pub async fn run(db: &Database, fetcher: &Fetcher, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = scrape_once(db, fetcher).await {
            error!("ingestion cycle failed: {}", e);
        }
    }
}

pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(raw, PUB_DATE_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("bad pubDate '{}': {}", raw, e)))
}

/// Parse a Go-style duration string ("500ms", "30s", "1m", "2h"). Zero or
/// unit-less input is rejected; the aggregation loop never sees an invalid
/// interval.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::Validation(format!("invalid duration '{}': missing unit", raw)))?;
    let (value, unit) = raw.split_at(split);

    let value: u64 = value
        .parse()
        .map_err(|_| Error::Validation(format!("invalid duration '{}'", raw)))?;
    if value == 0 {
        return Err(Error::Validation("duration must be positive".to_string()));
    }

    let seconds_for = |per_unit: u64| {
        value
            .checked_mul(per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| Error::Validation(format!("duration '{}' is too large", raw)))
    };
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => seconds_for(60),
        "h" => seconds_for(3600),
        _ => Err(Error::Validation(format!(
            "invalid duration '{}': unknown unit '{}'",
            raw, unit
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    mod pub_date_tests {
        use super::*;

        #[test]
        fn test_parse_utc_pub_date() {
            let parsed = parse_pub_date("Mon, 06 Sep 2021 12:00:00 +0000").unwrap();
            assert_eq!(parsed, Utc.with_ymd_and_hms(2021, 9, 6, 12, 0, 0).unwrap());
        }

        #[test]
        fn test_parse_offset_pub_date_converts_to_utc() {
            let parsed = parse_pub_date("Tue, 07 Sep 2021 09:30:00 -0700").unwrap();
            assert_eq!(parsed, Utc.with_ymd_and_hms(2021, 9, 7, 16, 30, 0).unwrap());
        }

        #[test]
        fn test_parse_malformed_pub_date() {
            let result = parse_pub_date("2021-09-06T12:00:00Z");
            assert!(matches!(result, Err(Error::Parse(_))));
        }

        #[test]
        fn test_parse_empty_pub_date() {
            let result = parse_pub_date("");
            assert!(matches!(result, Err(Error::Parse(_))));
        }
    }

    mod duration_tests {
        use super::*;

        #[test]
        fn test_parse_seconds_and_minutes() {
            assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
            assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
            assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
            assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        }

        #[test]
        fn test_zero_duration_rejected() {
            assert!(matches!(
                parse_duration("0s"),
                Err(Error::Validation(_))
            ));
        }

        #[test]
        fn test_missing_unit_rejected() {
            assert!(matches!(parse_duration("30"), Err(Error::Validation(_))));
        }

        #[test]
        fn test_unknown_unit_rejected() {
            assert!(matches!(parse_duration("30d"), Err(Error::Validation(_))));
        }

        #[test]
        fn test_overflowing_duration_rejected() {
            assert!(matches!(
                parse_duration("9000000000000000000h"),
                Err(Error::Validation(_))
            ));
            assert!(matches!(
                parse_duration("9000000000000000000m"),
                Err(Error::Validation(_))
            ));
        }

        #[test]
        fn test_garbage_rejected() {
            assert!(matches!(parse_duration("soon"), Err(Error::Validation(_))));
            assert!(matches!(parse_duration(""), Err(Error::Validation(_))));
        }
    }
}
