use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::client::session::Phase;
use crate::common::messages::Operation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionMetric {
    pub operation: Operation,
    pub start_time: i64, // milliseconds since epoch
    pub latency_ms: u64,
    pub outcome: Phase,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total_submissions: usize,
    pub completed: usize,
    pub rejected: usize,
    pub failed: usize,
    pub failure_rate: f64,

    // Latency of completed submissions (milliseconds)
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub latency_avg_ms: f64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,

    pub bytes_sent: usize,
    pub bytes_received: usize,

    pub per_operation: HashMap<Operation, usize>,
    pub failure_reasons: HashMap<String, usize>,
}

/// Records one entry per submission that reached a terminal phase.
#[derive(Debug)]
pub struct ClientMetrics {
    client_name: String,
    start_time: Instant,
    submissions: Vec<SubmissionMetric>,
}

impl ClientMetrics {
    pub fn new(client_name: String) -> Self {
        Self {
            client_name,
            start_time: Instant::now(),
            submissions: Vec::new(),
        }
    }

    pub fn record_submission(
        &mut self,
        operation: Operation,
        latency: Duration,
        phase: Phase,
        bytes_sent: usize,
        bytes_received: usize,
        failure_reason: Option<String>,
    ) {
        let start_time = chrono::Utc::now().timestamp_millis() - latency.as_millis() as i64;

        self.submissions.push(SubmissionMetric {
            operation,
            start_time,
            latency_ms: latency.as_millis() as u64,
            outcome: phase,
            bytes_sent,
            bytes_received,
            failure_reason,
        });
    }

    pub fn submissions(&self) -> &[SubmissionMetric] {
        &self.submissions
    }

    pub fn aggregate(&self) -> AggregatedStats {
        let mut stats = AggregatedStats::default();

        if self.submissions.is_empty() {
            return stats;
        }

        stats.total_submissions = self.submissions.len();
        stats.completed = self.submissions.iter().filter(|s| s.outcome == Phase::Done).count();
        stats.rejected = self.submissions.iter().filter(|s| s.outcome == Phase::Error).count();
        stats.failed = self.submissions.iter().filter(|s| s.outcome == Phase::Failed).count();
        stats.failure_rate = ((stats.rejected + stats.failed) as f64
            / stats.total_submissions as f64)
            * 100.0;

        let mut latencies: Vec<u64> = self
            .submissions
            .iter()
            .filter(|s| s.outcome == Phase::Done)
            .map(|s| s.latency_ms)
            .collect();

        if !latencies.is_empty() {
            latencies.sort_unstable();

            stats.latency_min_ms = latencies[0];
            stats.latency_max_ms = latencies[latencies.len() - 1];
            stats.latency_avg_ms =
                latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;

            stats.latency_p50_ms = percentile(&latencies, 50.0);
            stats.latency_p95_ms = percentile(&latencies, 95.0);
            stats.latency_p99_ms = percentile(&latencies, 99.0);
        }

        for submission in &self.submissions {
            stats.bytes_sent += submission.bytes_sent;
            stats.bytes_received += submission.bytes_received;
            *stats.per_operation.entry(submission.operation).or_insert(0) += 1;

            if let Some(reason) = &submission.failure_reason {
                *stats.failure_reasons.entry(reason.clone()).or_insert(0) += 1;
            }
        }

        stats
    }

    pub fn export_to_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let stats = self.aggregate();

        let output = serde_json::json!({
            "client_name": self.client_name,
            "session_duration_secs": self.start_time.elapsed().as_secs(),
            "aggregated_stats": stats,
            "submissions": self.submissions,
        });

        let json_string = serde_json::to_string_pretty(&output)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;

        Ok(())
    }
}

fn percentile(sorted_data: &[u64], percentile: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }

    let index = (percentile / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[index.min(sorted_data.len() - 1)]
}
