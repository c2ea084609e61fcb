use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::{OrderSource, QueryGateway};
use crate::cache::OrderCache;
use crate::store::OrderStore;

/// One timed read against a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSample {
    pub source: OrderSource,
    pub duration: Duration,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub samples: BTreeMap<String, ReadSample>,
    pub cache_requests: usize,
    pub db_requests: usize,
    /// Mean over successful reads only. Zero when none succeeded.
    pub avg_cache_time: Duration,
    pub avg_db_time: Duration,
    /// `avg_db_time / avg_cache_time`, absent when the cache average is zero.
    pub speed_ratio: Option<f64>,
}

#[derive(Default)]
struct Tally {
    total: Duration,
    hits: u32,
}

impl Tally {
    fn add(&mut self, sample: &ReadSample) {
        if sample.success {
            self.total += sample.duration;
            self.hits += 1;
        }
    }

    fn average(&self) -> Duration {
        if self.hits == 0 {
            Duration::ZERO
        } else {
            self.total / self.hits
        }
    }
}

impl QueryGateway {
    /// Compare cache reads for `cached_ids` against direct store reads for
    /// `db_ids`.
    ///
    /// `cached_ids` are copied from the store into the cache first, so the
    /// cache side measures hits. Neither side goes through the cache-aside
    /// path and nothing is counted in the read metrics.
    pub async fn benchmark(&self, cached_ids: &[String], db_ids: &[String]) -> BenchmarkReport {
        for order_uid in cached_ids {
            match self.store.get(order_uid).await {
                Ok(order) => {
                    if let Err(e) = self.cache.set(&order).await {
                        tracing::warn!(order_uid = %order_uid, error = %e, "Benchmark preload failed");
                    }
                }
                Err(e) => {
                    tracing::debug!(order_uid = %order_uid, error = %e, "Benchmark order not in database");
                }
            }
        }

        let mut samples = BTreeMap::new();
        let mut cache = Tally::default();
        let mut db = Tally::default();

        for order_uid in cached_ids {
            let started = Instant::now();
            let success = matches!(self.cache.get(order_uid).await, Ok(Some(_)));
            let sample = ReadSample {
                source: OrderSource::Cache,
                duration: started.elapsed(),
                success,
            };
            cache.add(&sample);
            samples.insert(order_uid.clone(), sample);
        }

        for order_uid in db_ids {
            let started = Instant::now();
            let success = self.store.get(order_uid).await.is_ok();
            let sample = ReadSample {
                source: OrderSource::Database,
                duration: started.elapsed(),
                success,
            };
            db.add(&sample);
            samples.insert(order_uid.clone(), sample);
        }

        let avg_cache_time = cache.average();
        let avg_db_time = db.average();
        let speed_ratio = (!avg_cache_time.is_zero())
            .then(|| avg_db_time.as_secs_f64() / avg_cache_time.as_secs_f64());

        tracing::info!(
            avg_cache = ?avg_cache_time,
            avg_db = ?avg_db_time,
            ratio = ?speed_ratio,
            "Benchmark completed"
        );

        BenchmarkReport {
            samples,
            cache_requests: cached_ids.len(),
            db_requests: db_ids.len(),
            avg_cache_time,
            avg_db_time,
            speed_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::harness;
    use super::*;
    use crate::models::fixtures::sample_order;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_benchmark_reads_each_side_from_its_own_source() {
        let h = harness();
        h.store.upsert(&sample_order("test-order-1")).await.unwrap();
        h.store.upsert(&sample_order("test-order-6")).await.unwrap();

        let report = h
            .gateway
            .benchmark(&ids(&["test-order-1", "test-order-2"]), &ids(&["test-order-6"]))
            .await;

        assert_eq!(report.cache_requests, 2);
        assert_eq!(report.db_requests, 1);
        assert!(h.cache.contains("test-order-1"));

        let cached = report.samples["test-order-1"];
        assert_eq!(cached.source, OrderSource::Cache);
        assert!(cached.success);
        assert!(!report.samples["test-order-2"].success);

        let from_db = report.samples["test-order-6"];
        assert_eq!(from_db.source, OrderSource::Database);
        assert!(from_db.success);
        assert!(!h.cache.contains("test-order-6"));
        assert_eq!(h.metrics.order_reads.with_label_values(&["cache"]).get(), 0);
    }

    #[tokio::test]
    async fn test_benchmark_with_no_hits_has_no_ratio() {
        let h = harness();

        let report = h
            .gateway
            .benchmark(&ids(&["missing-1"]), &ids(&["missing-2"]))
            .await;

        assert_eq!(report.avg_cache_time, Duration::ZERO);
        assert_eq!(report.avg_db_time, Duration::ZERO);
        assert_eq!(report.speed_ratio, None);
    }

    #[test]
    fn test_average_ignores_failed_reads() {
        let mut tally = Tally::default();
        for (millis, success) in [(10, true), (1000, false), (30, true)] {
            tally.add(&ReadSample {
                source: OrderSource::Database,
                duration: Duration::from_millis(millis),
                success,
            });
        }
        assert_eq!(tally.average(), Duration::from_millis(20));
    }
}
