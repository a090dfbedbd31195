//! Uptime maths over a target's recent history.

use guardian_proto::TickStatus;
use serde::Serialize;

use crate::store::Tick;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusDistribution {
    pub good: usize,
    pub degraded: usize,
    pub bad: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UptimeSummary {
    pub samples: usize,
    /// Share of `Good` ticks, rounded to a whole percent
    pub uptime_percent: u8,
    pub average_latency_ms: Option<u64>,
    pub distribution: StatusDistribution,
    pub latest: Option<TickStatus>,
}

impl UptimeSummary {
    /// Summarise ticks given newest first.
    pub fn from_ticks(ticks: &[Tick]) -> Self {
        let mut distribution = StatusDistribution::default();
        for tick in ticks {
            match tick.status {
                TickStatus::Good => distribution.good += 1,
                TickStatus::Degraded => distribution.degraded += 1,
                TickStatus::Bad => distribution.bad += 1,
            }
        }

        let samples = ticks.len();
        let (uptime_percent, average_latency_ms) = if samples == 0 {
            (0, None)
        } else {
            let total = samples as f64;
            let uptime = (distribution.good as f64 / total * 100.0).round() as u8;
            let latency_sum: u64 = ticks.iter().map(|t| t.latency_ms).sum();
            (uptime, Some((latency_sum as f64 / total).round() as u64))
        };

        Self {
            samples,
            uptime_percent,
            average_latency_ms,
            distribution,
            latest: ticks.first().map(|t| t.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use uuid::Uuid;

    fn tick(status: TickStatus, latency_ms: u64) -> Tick {
        Tick {
            id: Uuid::new_v4(),
            validator_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
            status,
            latency_ms,
            status_code: 200,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn test_empty_history() {
        let summary = UptimeSummary::from_ticks(&[]);
        assert_eq!(summary.uptime_percent, 0);
        assert_eq!(summary.average_latency_ms, None);
        assert_eq!(summary.latest, None);
    }

    #[test]
    fn test_mixed_history() {
        let ticks = vec![
            tick(TickStatus::Bad, 0),
            tick(TickStatus::Good, 100),
            tick(TickStatus::Degraded, 1500),
        ];

        let summary = UptimeSummary::from_ticks(&ticks);
        assert_eq!(summary.samples, 3);
        // 1 of 3 rounds to 33
        assert_eq!(summary.uptime_percent, 33);
        assert_eq!(summary.average_latency_ms, Some(533));
        assert_eq!(summary.distribution, StatusDistribution { good: 1, degraded: 1, bad: 1 });
        assert_eq!(summary.latest, Some(TickStatus::Bad));
    }

    #[test]
    fn test_rounding_up() {
        let ticks = vec![
            tick(TickStatus::Good, 10),
            tick(TickStatus::Good, 11),
            tick(TickStatus::Bad, 10),
        ];
        assert_eq!(UptimeSummary::from_ticks(&ticks).uptime_percent, 67);
        assert_eq!(UptimeSummary::from_ticks(&ticks).average_latency_ms, Some(10));
    }
}
