//! Energy Rental Analysis
//!
//! Compares burning TRX against renting energy from known platforms and
//! produces a recommendation. Pure computation; resource estimation in
//! the transfer pipeline calls into this.

use serde::Serialize;

/// Burn cost per energy unit, in TRX.
pub const BURN_RATE_PER_ENERGY: f64 = 0.00042;

/// Savings ratio below which renting is not worth the friction.
pub const MIN_RENT_SAVINGS_PERCENT: f64 = 20.0;

/// A rental platform's published rate.
#[derive(Debug, Clone)]
pub struct RentalPlatform {
    pub name: &'static str,
    /// TRX per 1,000 energy per day.
    pub rate_per_1k_per_day: f64,
    pub min_rental: u64,
}

/// Known rental platforms, cheapest-first order not guaranteed.
pub const RENTAL_PLATFORMS: &[RentalPlatform] = &[
    RentalPlatform {
        name: "JustLend DAO",
        rate_per_1k_per_day: 0.12,
        min_rental: 10_000,
    },
    RentalPlatform {
        name: "Justmoney Club",
        rate_per_1k_per_day: 0.10,
        min_rental: 5_000,
    },
    RentalPlatform {
        name: "Stake.Energy",
        rate_per_1k_per_day: 0.15,
        min_rental: 32_000,
    },
];

/// One priced rental option.
#[derive(Debug, Clone, Serialize)]
pub struct RentalOption {
    pub platform: String,
    pub cost_trx: f64,
    pub savings_percent: f64,
    pub is_best: bool,
}

/// Recommended action for covering an energy need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyAction {
    Burn,
    Rent,
}

/// Burn-vs-rent comparison for one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct RentalProposal {
    pub energy_needed: u64,
    pub duration_days: u32,
    pub burn_cost_trx: f64,
    pub rental_options: Vec<RentalOption>,
    pub action: EnergyAction,
    pub reason: String,
}

/// Build a rental proposal for the given energy requirement.
pub fn rental_proposal(energy_needed: u64, duration_days: u32) -> RentalProposal {
    let burn_cost_trx = energy_needed as f64 * BURN_RATE_PER_ENERGY;

    let mut options: Vec<RentalOption> = RENTAL_PLATFORMS
        .iter()
        .filter(|p| energy_needed >= p.min_rental)
        .map(|p| {
            let cost_trx =
                (energy_needed as f64 / 1000.0) * p.rate_per_1k_per_day * duration_days as f64;
            let savings_percent = if burn_cost_trx > 0.0 {
                (burn_cost_trx - cost_trx) / burn_cost_trx * 100.0
            } else {
                0.0
            };
            RentalOption {
                platform: p.name.to_string(),
                cost_trx,
                savings_percent,
                is_best: false,
            }
        })
        .collect();

    options.sort_by(|a, b| a.cost_trx.partial_cmp(&b.cost_trx).unwrap_or(std::cmp::Ordering::Equal));
    if let Some(best) = options.first_mut() {
        best.is_best = true;
    }

    let (action, reason) = match options.first() {
        Some(best) if best.savings_percent >= MIN_RENT_SAVINGS_PERCENT => (
            EnergyAction::Rent,
            format!(
                "Renting from {} saves {:.0}% vs burning TRX",
                best.platform, best.savings_percent
            ),
        ),
        Some(_) => (
            EnergyAction::Burn,
            "Rental savings too small to be worth the extra step".to_string(),
        ),
        None => (
            EnergyAction::Burn,
            "Energy need below platform minimums; burn TRX directly".to_string(),
        ),
    };

    RentalProposal {
        energy_needed,
        duration_days,
        burn_cost_trx,
        rental_options: options,
        action,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TRC20_TRANSFER_ENERGY;

    #[test]
    fn test_typical_trc20_transfer_recommends_rent() {
        let proposal = rental_proposal(TRC20_TRANSFER_ENERGY, 1);

        assert!(proposal.burn_cost_trx > 10.0);
        assert_eq!(proposal.action, EnergyAction::Rent);
        let best = &proposal.rental_options[0];
        assert!(best.is_best);
        assert!(best.savings_percent > MIN_RENT_SAVINGS_PERCENT);
        // Cheapest platform wins.
        assert_eq!(best.platform, "Justmoney Club");
    }

    #[test]
    fn test_small_need_below_minimums() {
        let proposal = rental_proposal(1_000, 1);
        assert!(proposal.rental_options.is_empty());
        assert_eq!(proposal.action, EnergyAction::Burn);
    }

    #[test]
    fn test_long_duration_flips_to_burn() {
        // 30 days of rental for one transfer's worth of energy costs more
        // than burning.
        let proposal = rental_proposal(TRC20_TRANSFER_ENERGY, 30);
        assert_eq!(proposal.action, EnergyAction::Burn);
    }

    #[test]
    fn test_min_rental_filter() {
        // 6,000 energy qualifies only for Justmoney Club (min 5,000).
        let proposal = rental_proposal(6_000, 1);
        assert_eq!(proposal.rental_options.len(), 1);
        assert_eq!(proposal.rental_options[0].platform, "Justmoney Club");
    }
}
