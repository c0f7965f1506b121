//! Store reads → typed records → JSON documents.

use futures_util::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::{KeyLayout, MonitorConfig};
use crate::decoder::{self, DecodePolicy, Decoded, MeasurementSchema};
use crate::error::PipelineError;
use crate::models::check::ChecksResponse;
use crate::models::measurement::ResultsResponse;
use crate::models::monitor::MonitorsResponse;
use crate::retry::RetryPolicy;
use crate::store::KvStore;

/// A serialized collection and how many field anomalies went into it.
#[derive(Debug)]
pub struct Rendered {
    pub body: Vec<u8>,
    pub warnings: usize,
}

pub struct Pipeline {
    store: Arc<dyn KvStore>,
    retry: RetryPolicy,
    keys: KeyLayout,
    schema: MeasurementSchema,
    policy: DecodePolicy,
}

/// `limit` query parameter: anything missing, unparsable or negative means 0.
pub fn parse_limit(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

fn render<T: Serialize>(value: &T, warnings: usize) -> Result<Rendered, PipelineError> {
    Ok(Rendered {
        body: serde_json::to_vec_pretty(value)?,
        warnings,
    })
}

impl Pipeline {
    pub fn new(store: Arc<dyn KvStore>, config: &MonitorConfig) -> Self {
        Self {
            store,
            retry: RetryPolicy::from(&config.retry),
            keys: config.keys.clone(),
            schema: config.decode.schema,
            policy: config.decode.policy,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn schema(&self) -> MeasurementSchema {
        self.schema
    }

    async fn get(&self, key: String, deadline: Instant) -> Result<Option<String>, PipelineError> {
        let op = format!("GET {key}");
        Ok(self.retry.run(&op, deadline, || self.store.get(&key)).await?)
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        deadline: Instant,
    ) -> Result<Vec<String>, PipelineError> {
        let op = format!("LRANGE {key} {start} {stop}");
        Ok(self
            .retry
            .run(&op, deadline, || self.store.lrange(key, start, stop))
            .await?)
    }

    /// Log every anomaly and apply the decode policy.
    fn settle<T>(&self, what: &str, decoded: Vec<Decoded<T>>) -> (Vec<T>, usize) {
        let mut warnings = 0;
        let mut kept = Vec::with_capacity(decoded.len());
        for (i, d) in decoded.into_iter().enumerate() {
            warnings += d.anomalies.len();
            for anomaly in &d.anomalies {
                tracing::warn!("{what} #{i}: {anomaly}");
            }
            if d.is_clean() || self.policy == DecodePolicy::ZeroFill {
                kept.push(d.value);
            }
        }
        (kept, warnings)
    }

    /// `GET /monitors`: every key under the monitor prefix, with its name,
    /// label and unit.
    pub async fn monitors(&self, deadline: Instant) -> Result<Rendered, PipelineError> {
        let pattern = self.keys.monitor_pattern();
        let op = format!("KEYS {pattern}");
        let keys = self
            .retry
            .run(&op, deadline, || self.store.keys(&pattern))
            .await?;

        let decoded = try_join_all(keys.iter().map(|key| {
            decoder::decode_monitor(key, &self.keys, |k| self.get(k, deadline))
        }))
        .await?;

        let (monitors, warnings) = self.settle("monitor", decoded);
        tracing::debug!("listed {} monitors", monitors.len());
        render(&MonitorsResponse { monitors }, warnings)
    }

    /// `GET /checks`: every id in the checks list, with its name.
    pub async fn checks(&self, deadline: Instant) -> Result<Rendered, PipelineError> {
        let entries = self.lrange(&self.keys.checks_list, 0, -1, deadline).await?;

        let decoded = try_join_all(entries.iter().map(|entry| {
            decoder::decode_check(entry, &self.keys, |k| self.get(k, deadline))
        }))
        .await?;

        let (checks, warnings) = self.settle("check", decoded);
        tracing::debug!("listed {} checks", checks.len());
        render(&ChecksResponse { checks }, warnings)
    }

    /// `GET /results/{id}`: the most recent `limit` measurements, oldest
    /// first. A zero limit never reaches the store, since `LRANGE k 0 -1`
    /// would return the whole list.
    pub async fn results(
        &self,
        id: &str,
        limit: u64,
        deadline: Instant,
    ) -> Result<Rendered, PipelineError> {
        if limit == 0 {
            return render(&ResultsResponse { results: Vec::new() }, 0);
        }

        let start = -(limit.min(isize::MAX as u64) as isize);
        let key = self.keys.results_key(id);
        let lines = self.lrange(&key, start, -1, deadline).await?;

        let decoded: Vec<_> = lines
            .iter()
            .map(|line| decoder::decode_measurement(line, self.schema))
            .collect();
        let (results, warnings) = self.settle(&key, decoded);
        render(&ResultsResponse { results }, warnings)
    }

    /// Startup check: the store answers and the monitor keys it holds fit the
    /// configured layout. Returns the number of monitor keys seen.
    pub async fn probe(&self, deadline: Instant) -> anyhow::Result<usize> {
        self.retry
            .run("PING", deadline, || self.store.ping())
            .await?;

        let pattern = self.keys.monitor_pattern();
        let op = format!("KEYS {pattern}");
        let keys = self
            .retry
            .run(&op, deadline, || self.store.keys(&pattern))
            .await?;
        self.keys.validate_observed(keys.iter().map(String::as_str))?;
        Ok(keys.len())
    }
}
