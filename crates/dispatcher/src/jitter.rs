use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use scrape_core::{SchedulerError, SchedulerResult};

/// 抖动后的下次运行时间不会早于这个间隔
const MIN_NEXT_RUN_OFFSET_MS: i64 = 1_000;

/// 计算带抖动的下次运行时间
///
/// `next = now + interval * (1 + u)`，其中 `u` 在 `[-jitter_ratio, jitter_ratio]` 上均匀分布。
/// 间隔相近的大量源因此不会在同一时刻集中触发。结果超出可表示的时间范围时返回错误。
pub fn compute_next_run_at<R: Rng>(
    now: DateTime<Utc>,
    interval: Duration,
    jitter_ratio: f64,
    rng: &mut R,
) -> SchedulerResult<DateTime<Utc>> {
    let interval_ms = interval.num_milliseconds();
    let ratio = jitter_ratio.clamp(0.0, 1.0);

    let factor = if ratio > 0.0 {
        1.0 + rng.random_range(-ratio..=ratio)
    } else {
        1.0
    };

    let offset_ms = ((interval_ms as f64) * factor).round() as i64;
    Duration::try_milliseconds(offset_ms.max(MIN_NEXT_RUN_OFFSET_MS))
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!(
                "下次运行时间超出范围: now={now}, interval={}s",
                interval.num_seconds()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_offsets_stay_within_jitter_bound() {
        let now = Utc::now();
        let interval = Duration::minutes(60);
        let mut rng = StdRng::seed_from_u64(42);

        let lower = now + Duration::minutes(54);
        let upper = now + Duration::minutes(66);
        let mut distinct = std::collections::HashSet::new();

        for _ in 0..1000 {
            let next = compute_next_run_at(now, interval, 0.10, &mut rng).unwrap();
            assert!(next >= lower && next <= upper, "offset out of range: {next}");
            distinct.insert(next);
        }
        // 抖动确实生效，而不是固定值
        assert!(distinct.len() > 100);
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);
        let next = compute_next_run_at(now, Duration::minutes(15), 0.0, &mut rng).unwrap();
        assert_eq!(next - now, Duration::minutes(15));
    }

    #[test]
    fn test_tiny_interval_is_clamped() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(1);
        let next = compute_next_run_at(now, Duration::milliseconds(10), 0.5, &mut rng).unwrap();
        assert_eq!(next - now, Duration::milliseconds(MIN_NEXT_RUN_OFFSET_MS));
    }

    #[test]
    fn test_out_of_range_next_run_is_an_error() {
        let mut rng = StdRng::seed_from_u64(3);
        let result = compute_next_run_at(
            Utc::now(),
            Duration::seconds(1_000_000_000_000_000),
            0.1,
            &mut rng,
        );
        assert!(matches!(result, Err(SchedulerError::InvalidSchedule(_))));

        let result = compute_next_run_at(
            DateTime::<Utc>::MAX_UTC - Duration::days(1),
            Duration::days(30),
            0.0,
            &mut rng,
        );
        assert!(result.is_err());
    }
}
