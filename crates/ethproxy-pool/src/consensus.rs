//! Height consensus — demote healthy endpoints that fall behind.
//!
//! One round asks every healthy endpoint for its block height, finds the
//! lowest and highest answers, and demotes the endpoints sitting at the
//! low-water mark when the spread exceeds the configured lag. Endpoints
//! that fail to answer are demoted too.

use std::fmt;
use std::sync::atomic::Ordering;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{PoolError, PoolResult, UpstreamError};
use crate::pool::EndpointPool;
use crate::upstream::guarded;

/// Maximum tolerated height spread, in blocks, among healthy endpoints.
pub const DEFAULT_MAX_BLOCK_LAG: u64 = 3;

/// One endpoint's answer in a consensus round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightSample {
    pub id: String,
    pub result: Result<u64, UpstreamError>,
}

/// Outcome of a consensus round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Highest height reported by any healthy endpoint, 0 if none answered.
    pub height: u64,
    /// One human-readable reason per degraded endpoint.
    pub errors: Vec<String>,
}

impl HealthReport {
    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }

    /// `Ok(height)` for a clean round, `ConsensusDegraded` otherwise.
    pub fn into_result(self) -> PoolResult<u64> {
        if self.is_degraded() {
            Err(PoolError::ConsensusDegraded(self))
        } else {
            Ok(self.height)
        }
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "height {} [{}]", self.height, self.errors.join("; "))
    }
}

/// Lowest and highest successful height, seeded from the first sample.
fn height_range(samples: &[HeightSample]) -> Option<(u64, u64)> {
    samples
        .iter()
        .filter_map(|s| s.result.as_ref().ok().copied())
        .fold(None, |range, h| match range {
            None => Some((h, h)),
            Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
        })
}

impl EndpointPool {
    /// Run one consensus round over the current healthy endpoints.
    ///
    /// Demotes failing and lagging endpoints as a side effect. Queries that
    /// end because `cancel` fired are skipped, not counted as faults.
    pub async fn check_heights(&self, cancel: &CancellationToken) -> HealthReport {
        let endpoints = self.healthy_endpoints().await;
        let timeout = Some(self.config().query_timeout);

        let samples: Vec<HeightSample> = join_all(endpoints.iter().map(|ep| async move {
            HeightSample {
                id: ep.id.clone(),
                result: guarded(ep.upstream.current_height(), cancel, timeout).await,
            }
        }))
        .await;

        let mut errors = Vec::new();
        let mut demote: Vec<(String, String)> = Vec::new();

        for sample in &samples {
            match &sample.result {
                Ok(height) => debug!(endpoint = %sample.id, height, "endpoint height"),
                Err(e) if e.is_cancelled() => {
                    debug!(endpoint = %sample.id, "height query cancelled");
                }
                Err(e) => {
                    let fault = PoolError::EndpointFault {
                        id: sample.id.clone(),
                        source: e.clone(),
                    };
                    errors.push(fault.to_string());
                    demote.push((sample.id.clone(), fault.to_string()));
                }
            }
        }

        let range = height_range(&samples);
        let max_lag = self.config().max_block_lag;
        if let Some((lowest, highest)) = range {
            if highest - lowest > max_lag {
                for sample in &samples {
                    if sample.result.as_ref().ok() == Some(&lowest) {
                        let reason = format!(
                            "endpoint {} is lagging: height {} is more than {} blocks behind {}",
                            sample.id, lowest, max_lag, highest
                        );
                        errors.push(reason.clone());
                        demote.push((sample.id.clone(), reason));
                    }
                }
            }
        }

        let demoted = demote.len();
        for (id, reason) in &demote {
            self.demote(id, reason).await;
        }

        for id in self.snapshot().await.unhealthy {
            errors.push(format!("endpoint {id} is unhealthy"));
        }

        let (lowest, height) = range.unwrap_or((0, 0));
        if range.is_none() && errors.is_empty() {
            errors.push("no healthy endpoint responded".to_string());
        }

        self.consensus_rounds.fetch_add(1, Ordering::Relaxed);
        info!(
            queried = samples.len(),
            lowest,
            highest = height,
            demoted,
            errors = errors.len(),
            "consensus round complete"
        );

        HealthReport { height, errors }
    }
}
