//! Bucket Planner
//!
//! Maps a time range to the ordered set of `(table, bucketID)` shards that
//! index rows for that range live in. The planner is a pure function of its
//! config and inputs: the shards chosen when a chunk is written are exactly
//! the shards consulted when it is read, including for data written under
//! an earlier bucketing scheme.
//!
//! Two scheme transitions are handled:
//!
//! - **Hourly → daily buckets.** Ranges before the configured cutover day
//!   use one bucket per hour (`"<hourNumber>"`); ranges on or after it use
//!   one per day (`"d<dayNumber>"`). Hourly buckets always precede daily
//!   buckets in the output.
//! - **Single table → periodic tables.** Buckets starting before the
//!   periodic-table start live in the static base table; later buckets live
//!   in `"<prefix><periodIndex>"` where the index is the bucket start
//!   divided by the table period.

use serde::{Deserialize, Serialize};

pub const SECONDS_IN_HOUR: i64 = 3600;
pub const SECONDS_IN_DAY: i64 = 24 * 3600;

/// Bucketing and table-sharding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Base index table.
    pub table_name: String,

    /// After midnight UTC of this timestamp's day (milliseconds since
    /// epoch), indexes bucket by day instead of by hour. Only the day
    /// matters, not the time within the day.
    #[serde(default)]
    pub daily_buckets_from: i64,

    /// Whether to shard index tables by time period.
    #[serde(default)]
    pub use_periodic_tables: bool,

    /// Prefix for periodic table names.
    #[serde(default)]
    pub table_prefix: String,

    /// Period of each table shard in seconds.
    #[serde(default = "default_table_period_secs")]
    pub table_period_secs: i64,

    /// Buckets starting at or after this timestamp (milliseconds since
    /// epoch) go to periodic tables.
    #[serde(default)]
    pub periodic_table_start_at: i64,
}

fn default_table_period_secs() -> i64 {
    7 * SECONDS_IN_DAY
}

/// One index shard to read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub table: String,
    pub bucket_id: String,
    pub bucket_start_secs: i64,
}

impl BucketConfig {
    /// The ordered shards covering `[from, through]` (both in milliseconds).
    pub fn plan_buckets(&self, from: i64, through: i64) -> Vec<BucketSpec> {
        let from_hour = from / 1000 / SECONDS_IN_HOUR;
        let through_hour = through / 1000 / SECONDS_IN_HOUR;
        let from_day = from / 1000 / SECONDS_IN_DAY;
        let through_day = through / 1000 / SECONDS_IN_DAY;

        let first_daily_bucket = self.daily_buckets_from / 1000 / SECONDS_IN_DAY;
        let last_hourly_bucket = first_daily_bucket * 24;

        let mut result = Vec::new();

        for hour in from_hour..=through_hour {
            if hour >= last_hourly_bucket {
                break;
            }
            let start = hour * SECONDS_IN_HOUR;
            result.push(BucketSpec {
                table: self.table_for_bucket(start),
                bucket_id: hour.to_string(),
                bucket_start_secs: start,
            });
        }

        for day in from_day..=through_day {
            if day < first_daily_bucket {
                continue;
            }
            let start = day * SECONDS_IN_DAY;
            result.push(BucketSpec {
                table: self.table_for_bucket(start),
                bucket_id: format!("d{day}"),
                bucket_start_secs: start,
            });
        }

        result
    }

    fn table_for_bucket(&self, bucket_start_secs: i64) -> String {
        if !self.use_periodic_tables || bucket_start_secs < self.periodic_table_start_at / 1000 {
            return self.table_name.clone();
        }
        format!(
            "{}{}",
            self.table_prefix,
            bucket_start_secs / self.table_period_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS_IN_HOUR: i64 = SECONDS_IN_HOUR * 1000;
    const MS_IN_DAY: i64 = SECONDS_IN_DAY * 1000;

    fn hourly_config() -> BucketConfig {
        BucketConfig {
            table_name: "index".to_string(),
            // 2017-01-01T00:00:00Z, well after any test range
            daily_buckets_from: 1_483_228_800_000,
            use_periodic_tables: false,
            table_prefix: String::new(),
            table_period_secs: default_table_period_secs(),
            periodic_table_start_at: 0,
        }
    }

    fn bucket_ids(specs: &[BucketSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.bucket_id.as_str()).collect()
    }

    #[test]
    fn test_single_hour_range() {
        let cfg = hourly_config();
        let specs = cfg.plan_buckets(0, 64);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].bucket_id, "0");
        assert_eq!(specs[0].table, "index");
    }

    #[test]
    fn test_multi_hour_range() {
        let cfg = hourly_config();
        let specs = cfg.plan_buckets(30 * 60 * 1000, 3 * MS_IN_HOUR + 1);
        assert_eq!(bucket_ids(&specs), vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn test_planner_is_deterministic() {
        let cfg = hourly_config();
        let a = cfg.plan_buckets(0, 7 * MS_IN_DAY);
        let b = cfg.plan_buckets(0, 7 * MS_IN_DAY);
        assert_eq!(a, b);
    }

    #[test]
    fn test_daily_cutover_no_overlap_no_gap() {
        // Daily buckets start on day 1: hours 0-23 stay hourly, day >= 1 daily.
        let cfg = BucketConfig {
            daily_buckets_from: MS_IN_DAY,
            ..hourly_config()
        };
        let specs = cfg.plan_buckets(0, 50 * MS_IN_HOUR);

        let hourly: Vec<&str> = specs
            .iter()
            .filter(|s| !s.bucket_id.starts_with('d'))
            .map(|s| s.bucket_id.as_str())
            .collect();
        let daily: Vec<&str> = specs
            .iter()
            .filter(|s| s.bucket_id.starts_with('d'))
            .map(|s| s.bucket_id.as_str())
            .collect();

        let expected_hourly: Vec<String> = (0..24).map(|h| h.to_string()).collect();
        assert_eq!(hourly, expected_hourly);
        assert_eq!(daily, vec!["d1", "d2"]);

        // Hourly buckets come first in the output order.
        let first_daily = specs
            .iter()
            .position(|s| s.bucket_id.starts_with('d'))
            .unwrap();
        assert!(specs[..first_daily]
            .iter()
            .all(|s| !s.bucket_id.starts_with('d')));
    }

    #[test]
    fn test_pre_cutover_range_stays_hourly_after_cutover() {
        // A historical range written hourly must still plan hourly buckets
        // once the config has a daily cutover in the past of "now".
        let cfg = BucketConfig {
            daily_buckets_from: 2 * MS_IN_DAY,
            ..hourly_config()
        };
        let specs = cfg.plan_buckets(3 * MS_IN_HOUR, 5 * MS_IN_HOUR);
        assert_eq!(bucket_ids(&specs), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_range_fully_after_cutover_is_daily_only() {
        let cfg = BucketConfig {
            daily_buckets_from: MS_IN_DAY,
            ..hourly_config()
        };
        let specs = cfg.plan_buckets(3 * MS_IN_DAY, 4 * MS_IN_DAY);
        assert_eq!(bucket_ids(&specs), vec!["d3", "d4"]);
    }

    #[test]
    fn test_periodic_table_boundary() {
        // Weekly tables starting at day 7: a range spanning the boundary
        // reads both the base table and the first periodic table.
        let cfg = BucketConfig {
            daily_buckets_from: 0,
            use_periodic_tables: true,
            table_prefix: "index_".to_string(),
            table_period_secs: 7 * SECONDS_IN_DAY,
            periodic_table_start_at: 7 * MS_IN_DAY,
            ..hourly_config()
        };
        let specs = cfg.plan_buckets(5 * MS_IN_DAY, 8 * MS_IN_DAY);
        let tables: Vec<&str> = specs.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(bucket_ids(&specs), vec!["d5", "d6", "d7", "d8"]);
        assert_eq!(tables, vec!["index", "index", "index_1", "index_1"]);
    }

    #[test]
    fn test_periodic_tables_disabled_uses_base_table() {
        let cfg = BucketConfig {
            daily_buckets_from: 0,
            periodic_table_start_at: 0,
            ..hourly_config()
        };
        let specs = cfg.plan_buckets(0, 20 * MS_IN_DAY);
        assert!(specs.iter().all(|s| s.table == "index"));
    }

    #[test]
    fn test_empty_when_range_precedes_all_buckets() {
        let cfg = hourly_config();
        // through < from yields nothing
        assert!(cfg.plan_buckets(MS_IN_HOUR, 0).is_empty());
    }
}
