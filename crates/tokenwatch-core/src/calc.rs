//! Cost and energy per million tokens

use crate::sku::SkuProfile;
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: f64 = 3600.0;
const TOKENS_PER_MILLION: f64 = 1e6;

/// USD to produce one million tokens at `throughput` tokens/s.
///
/// `None` for a non-positive throughput.
pub fn cost_per_million_tokens(hourly_cost: f64, throughput: f64) -> Option<f64> {
    if throughput <= 0.0 {
        return None;
    }
    Some((hourly_cost / (throughput * SECONDS_PER_HOUR)) * TOKENS_PER_MILLION)
}

/// Wh to produce one million tokens at `throughput` tokens/s.
///
/// `None` for a non-positive throughput.
pub fn energy_per_million_tokens_wh(power_draw_watts: f64, throughput: f64) -> Option<f64> {
    if throughput <= 0.0 {
        return None;
    }
    Some((power_draw_watts / throughput) * (TOKENS_PER_MILLION / SECONDS_PER_HOUR / 1000.0))
}

/// Last valid cost and energy readings for a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedCosts {
    pub cost_per_mtoken_usd: Option<f64>,
    pub energy_per_mtoken_wh: Option<f64>,
}

impl DerivedCosts {
    /// Recompute both readings from the current throughput.
    ///
    /// Returns false and keeps the previous readings when `throughput` is not positive.
    pub fn update(&mut self, throughput: f64, profile: &SkuProfile) -> bool {
        let (Some(cost), Some(energy)) = (
            cost_per_million_tokens(profile.hourly_cost, throughput),
            energy_per_million_tokens_wh(profile.power_draw_watts, throughput),
        ) else {
            return false;
        };
        self.cost_per_mtoken_usd = Some(cost);
        self.energy_per_mtoken_wh = Some(energy);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sku::SkuTable;

    #[test]
    fn test_a100_at_one_thousand_tps() {
        let table = SkuTable::builtin();
        let a100 = table.get("A100").unwrap();

        let cost = cost_per_million_tokens(a100.hourly_cost, 1000.0).unwrap();
        assert!((cost - 0.694_444).abs() < 1e-5);

        let energy = energy_per_million_tokens_wh(a100.power_draw_watts, 1000.0).unwrap();
        assert!((energy - 0.111_111).abs() < 1e-5);
    }

    #[test]
    fn test_non_positive_throughput_yields_nothing() {
        assert!(cost_per_million_tokens(2.5, 0.0).is_none());
        assert!(cost_per_million_tokens(2.5, -10.0).is_none());
        assert!(energy_per_million_tokens_wh(400.0, 0.0).is_none());
    }

    #[test]
    fn test_update_preserves_last_valid_reading() {
        let profile = SkuProfile::new("H100", 4.0, 700.0, 85.0, 81920.0);
        let mut costs = DerivedCosts::default();

        assert!(costs.update(2000.0, &profile));
        let before = costs;
        assert!(before.cost_per_mtoken_usd.is_some());

        assert!(!costs.update(0.0, &profile));
        assert!(!costs.update(-1.0, &profile));
        assert_eq!(costs, before);
    }

    #[test]
    fn test_cost_scales_inversely_with_throughput() {
        let slow = cost_per_million_tokens(4.0, 500.0).unwrap();
        let fast = cost_per_million_tokens(4.0, 1000.0).unwrap();
        assert!((slow - 2.0 * fast).abs() < 1e-9);
    }
}
