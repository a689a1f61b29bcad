//! Death-spiral detection: resource trend fitting and intervention policy.
//!
//! Each tracked resource is sampled once per tick into a 5-minute window. An
//! ordinary-least-squares slope over the window flags unsustainable depletion;
//! severity depends on the projected time to zero. Interventions are chosen
//! from a pure policy table and injected as high-priority reactive goals,
//! never executed directly, so the single execution path through the action
//! engine is preserved.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::goal::{Goal, GoalCategory, GoalId, GoalTier};
use crate::snapshot::ResourceKind;

/// Goal-id range reserved for injected interventions. Offsetting from a fixed
/// base means a repeating alert merges with its previous injection instead of
/// flooding the stack.
const INTERVENTION_ID_BASE: u64 = 0xD000;

/// How bad a spiral is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpiralSeverity {
    High,
    Critical,
}

impl std::fmt::Display for SpiralSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => f.write_str("high"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// A detected unsustainable trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpiralAlert {
    pub resource: ResourceKind,
    /// Fitted OLS slope, units per sample.
    pub slope: f64,
    /// Most recent sampled value.
    pub current: f64,
    pub severity: SpiralSeverity,
    /// Projected seconds until the resource reaches zero at this rate
    /// (one sample per second assumed for projection purposes).
    pub projected_depletion_secs: f64,
}

/// Trend thresholds. A resource is spiraling when its slope drops below the
/// negated per-sample loss threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiralConfig {
    pub window_secs: f64,
    /// Samples needed before a slope is trusted.
    pub min_samples: usize,
    /// Projected time-to-zero below this is Critical.
    pub critical_depletion_secs: f64,
    pub money_loss_per_sample: f64,
    pub consumables_loss_per_sample: f64,
    pub move_uses_loss_per_sample: f64,
    /// Mean health in points (fraction × 100).
    pub health_points_loss_per_sample: f64,
}

impl Default for SpiralConfig {
    fn default() -> Self {
        Self {
            window_secs: 300.0,
            min_samples: 4,
            critical_depletion_secs: 300.0,
            money_loss_per_sample: 50.0,
            consumables_loss_per_sample: 2.0,
            move_uses_loss_per_sample: 3.0,
            health_points_loss_per_sample: 5.0,
        }
    }
}

impl SpiralConfig {
    fn loss_threshold(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Money => self.money_loss_per_sample,
            ResourceKind::Consumables => self.consumables_loss_per_sample,
            ResourceKind::MoveUses => self.move_uses_loss_per_sample,
            ResourceKind::MeanHealth => self.health_points_loss_per_sample,
        }
    }
}

/// One resource's time series, pruned to the window.
#[derive(Debug, Clone, Default)]
struct ResourceSeries {
    samples: VecDeque<(f64, f64)>,
}

impl ResourceSeries {
    fn push(&mut self, now: f64, value: f64, window_secs: f64) {
        self.samples.push_back((now, value));
        while let Some((at, _)) = self.samples.front() {
            if now - at > window_secs {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// OLS slope in units per sample, or `None` with fewer than two samples.
    fn slope(&self) -> Option<f64> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let n_f = n as f64;
        let mean_x = (n_f - 1.0) / 2.0;
        let mean_y: f64 = self.samples.iter().map(|(_, y)| y).sum::<f64>() / n_f;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, (_, y)) in self.samples.iter().enumerate() {
            let dx = i as f64 - mean_x;
            numerator += dx * (y - mean_y);
            denominator += dx * dx;
        }
        (denominator > 0.0).then(|| numerator / denominator)
    }

    fn latest(&self) -> Option<f64> {
        self.samples.back().map(|(_, v)| *v)
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Trend watcher over the four tracked resource series.
#[derive(Debug, Clone)]
pub struct DeathSpiralDetector {
    config: SpiralConfig,
    series: BTreeMap<ResourceKind, ResourceSeries>,
}

impl DeathSpiralDetector {
    pub fn new(config: SpiralConfig) -> Self {
        Self {
            config,
            series: ResourceKind::ALL
                .iter()
                .map(|kind| (*kind, ResourceSeries::default()))
                .collect(),
        }
    }

    /// Record one sample for a resource.
    pub fn sample(&mut self, now: f64, kind: ResourceKind, value: f64) {
        if let Some(series) = self.series.get_mut(&kind) {
            series.push(now, value, self.config.window_secs);
        }
    }

    /// Scan all series for unsustainable depletion.
    pub fn detect(&self) -> Vec<SpiralAlert> {
        let mut alerts = Vec::new();
        for (kind, series) in &self.series {
            if series.len() < self.config.min_samples {
                continue;
            }
            let Some(slope) = series.slope() else {
                continue;
            };
            if slope >= -self.config.loss_threshold(*kind) {
                continue;
            }
            let current = series.latest().unwrap_or(0.0);
            let projected = if current <= 0.0 {
                0.0
            } else {
                current / slope.abs()
            };
            let severity = if projected < self.config.critical_depletion_secs {
                SpiralSeverity::Critical
            } else {
                SpiralSeverity::High
            };
            tracing::warn!(
                resource = %kind,
                slope,
                current,
                %severity,
                "resource spiral detected"
            );
            alerts.push(SpiralAlert {
                resource: *kind,
                slope,
                current,
                severity,
                projected_depletion_secs: projected,
            });
        }
        alerts
    }
}

// ---------------------------------------------------------------------------
// Intervention policy
// ---------------------------------------------------------------------------

/// Pure policy table: which goal to inject for a given alert.
///
/// Critical spirals get decisive interventions; High-severity variants get
/// softer conserve/switch behavior. The returned goal is Immediate-tier so
/// the reactive layer picks it up next tick.
pub fn intervention(alert: &SpiralAlert) -> Goal {
    let (description, category, priority): (&str, GoalCategory, f64) =
        match (alert.resource, alert.severity) {
            (ResourceKind::Money, SpiralSeverity::Critical) => (
                "liquidate non-essential inventory",
                GoalCategory::Liquidate { keep_essentials: true },
                95.0,
            ),
            (ResourceKind::Money, SpiralSeverity::High) => (
                "cut discretionary spending",
                GoalCategory::Conserve { resource: ResourceKind::Money },
                75.0,
            ),
            (ResourceKind::Consumables, SpiralSeverity::Critical) => (
                "reroute to nearest free heal and suspend battling",
                GoalCategory::Heal { location: None },
                92.0,
            ),
            (ResourceKind::Consumables, SpiralSeverity::High) => (
                "conserve consumables",
                GoalCategory::Conserve { resource: ResourceKind::Consumables },
                72.0,
            ),
            (ResourceKind::MoveUses, SpiralSeverity::Critical) => (
                "free heal to restore move uses",
                GoalCategory::Heal { location: None },
                90.0,
            ),
            (ResourceKind::MoveUses, SpiralSeverity::High) => (
                "conserve move uses",
                GoalCategory::Conserve { resource: ResourceKind::MoveUses },
                70.0,
            ),
            (ResourceKind::MeanHealth, SpiralSeverity::Critical) => (
                "accept losses and rebuild the roster",
                GoalCategory::Regroup,
                97.0,
            ),
            (ResourceKind::MeanHealth, SpiralSeverity::High) => (
                "switch to cautious travel",
                GoalCategory::Conserve { resource: ResourceKind::MeanHealth },
                78.0,
            ),
        };

    Goal::new(intervention_id(alert), GoalTier::Immediate, description, category)
        .with_priority(priority)
        .with_cost_value(1.0, 5.0)
}

/// Stable id per (resource, severity) cell so repeated alerts merge.
fn intervention_id(alert: &SpiralAlert) -> GoalId {
    let resource_index = ResourceKind::ALL
        .iter()
        .position(|k| *k == alert.resource)
        .unwrap_or(0) as u64;
    let severity_index = match alert.severity {
        SpiralSeverity::High => 0u64,
        SpiralSeverity::Critical => 1,
    };
    let raw = INTERVENTION_ID_BASE + resource_index * 2 + severity_index;
    match GoalId::new(raw) {
        Some(id) => id,
        None => unreachable!("intervention ids are offset from a nonzero base"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> DeathSpiralDetector {
        DeathSpiralDetector::new(SpiralConfig::default())
    }

    #[test]
    fn monotone_decreasing_series_has_negative_slope() {
        let mut det = detector();
        for (i, value) in [1000.0, 900.0, 790.0, 700.0, 585.0].iter().enumerate() {
            det.sample(i as f64, ResourceKind::Money, *value);
        }
        let alerts = det.detect();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].slope < 0.0);
    }

    #[test]
    fn constant_series_reports_zero_slope_no_spiral() {
        let mut det = detector();
        for i in 0..6 {
            det.sample(f64::from(i), ResourceKind::Money, 500.0);
        }
        assert!(det.detect().is_empty());
    }

    #[test]
    fn scenario_money_drain_slope_and_severity() {
        let mut det = detector();
        for (i, value) in [3000.0, 2800.0, 2600.0, 2400.0].iter().enumerate() {
            det.sample(i as f64, ResourceKind::Money, *value);
        }
        let alerts = det.detect();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert!((alert.slope - -200.0).abs() < 1e-9);
        // 2400 / 200 = 12 s to zero, well under the 300 s criticality bound.
        assert_eq!(alert.severity, SpiralSeverity::Critical);
        assert!((alert.projected_depletion_secs - 12.0).abs() < 1e-9);
    }

    #[test]
    fn slow_leak_above_threshold_is_ignored() {
        let mut det = detector();
        // Losing 10/sample: below the 50/sample money threshold.
        for i in 0..6 {
            det.sample(f64::from(i), ResourceKind::Money, 5000.0 - f64::from(i) * 10.0);
        }
        assert!(det.detect().is_empty());
    }

    #[test]
    fn distant_depletion_is_high_not_critical() {
        let mut det = detector();
        // Losing 60/sample from a deep reserve: 100_000/60 ≈ 1667 s to zero.
        for i in 0..6 {
            det.sample(f64::from(i), ResourceKind::Money, 100_000.0 - f64::from(i) * 60.0);
        }
        let alerts = det.detect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, SpiralSeverity::High);
    }

    #[test]
    fn too_few_samples_never_alarm() {
        let mut det = detector();
        det.sample(0.0, ResourceKind::Money, 1000.0);
        det.sample(1.0, ResourceKind::Money, 0.0);
        assert!(det.detect().is_empty());
    }

    #[test]
    fn old_samples_age_out_of_the_window() {
        let mut det = detector();
        for i in 0..4 {
            det.sample(f64::from(i), ResourceKind::Money, 1000.0 - f64::from(i) * 100.0);
        }
        // Ten minutes later only a fresh, flat pair remains.
        det.sample(700.0, ResourceKind::Money, 600.0);
        det.sample(701.0, ResourceKind::Money, 600.0);
        assert!(det.detect().is_empty());
    }

    #[test]
    fn intervention_table_is_pure_and_stable() {
        let alert = SpiralAlert {
            resource: ResourceKind::Money,
            slope: -200.0,
            current: 2400.0,
            severity: SpiralSeverity::Critical,
            projected_depletion_secs: 12.0,
        };
        let a = intervention(&alert);
        let b = intervention(&alert);
        assert_eq!(a.id, b.id);
        assert_eq!(a.category, GoalCategory::Liquidate { keep_essentials: true });
        assert_eq!(a.tier, GoalTier::Immediate);

        let softer = SpiralAlert {
            severity: SpiralSeverity::High,
            projected_depletion_secs: 900.0,
            ..alert.clone()
        };
        let c = intervention(&softer);
        assert_ne!(a.id, c.id);
        assert!(matches!(c.category, GoalCategory::Conserve { .. }));
    }
}
