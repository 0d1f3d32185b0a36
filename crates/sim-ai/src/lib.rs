#![deny(warnings)]

//! AI competitor: a net-worth baseline that grows independently of the player.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{CompetitorConfig, Outcome};
use sim_econ::RandomSource;
use tracing::trace;

/// Net-worth trajectory of the AI opponent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Competitor {
    net_worth: Decimal,
    annual_growth: f64,
    jitter: f64,
    months: u32,
}

impl Competitor {
    pub fn new(starting_net_worth: Decimal, cfg: &CompetitorConfig) -> Self {
        Self {
            net_worth: starting_net_worth,
            annual_growth: cfg.annual_growth,
            jitter: cfg.jitter,
            months: 0,
        }
    }

    pub fn net_worth(&self) -> Decimal {
        self.net_worth
    }

    /// Months of growth applied so far.
    pub fn months(&self) -> u32 {
        self.months
    }

    /// Compound one simulated month: `annual_growth / 12 * (1 + j)` with
    /// `j` uniform in `[-jitter, jitter]`.
    pub fn step_month(&mut self, rng: &mut dyn RandomSource) {
        let j = rng.uniform(-self.jitter, self.jitter);
        let monthly = monthly_rate(self.annual_growth, j);
        let factor = Decimal::from_f64(1.0 + monthly).unwrap_or(Decimal::ONE);
        self.net_worth = (self.net_worth * factor).round_dp(2);
        self.months += 1;
        trace!(month = self.months, net_worth = %self.net_worth, "competitor step");
    }

    /// Compare the player's final net worth against the baseline.
    pub fn judge(&self, player_net_worth: Decimal) -> Outcome {
        Outcome::decide(player_net_worth, self.net_worth)
    }
}

/// Monthly growth rate for an annual rate and a relative jitter draw.
pub fn monthly_rate(annual_growth: f64, j: f64) -> f64 {
    annual_growth / 12.0 * (1.0 + j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_econ::{ScriptedRandom, SeededRandom};

    fn cfg(growth: f64) -> CompetitorConfig {
        CompetitorConfig {
            annual_growth: growth,
            jitter: 0.5,
        }
    }

    #[test]
    fn neutral_year_compounds_monthly() {
        let mut c = Competitor::new(Decimal::new(100_000, 0), &cfg(0.12));
        let mut rng = ScriptedRandom::neutral();
        for _ in 0..12 {
            c.step_month(&mut rng);
        }
        assert_eq!(c.months(), 12);
        // 1.01^12 ≈ 1.1268
        let nw = c.net_worth();
        assert!(nw > Decimal::new(112_600, 0) && nw < Decimal::new(112_700, 0), "{nw}");
    }

    #[test]
    fn judge_needs_strict_lead() {
        let c = Competitor::new(Decimal::new(100, 0), &cfg(0.1));
        assert_eq!(c.judge(Decimal::new(101, 0)), Outcome::Win);
        assert_eq!(c.judge(Decimal::new(100, 0)), Outcome::Loss);
    }

    #[test]
    fn higher_growth_wins_over_horizon() {
        let mut slow = Competitor::new(Decimal::new(100_000, 0), &cfg(0.08));
        let mut fast = Competitor::new(Decimal::new(100_000, 0), &cfg(0.14));
        let mut ra = SeededRandom::new(5);
        let mut rb = SeededRandom::new(5);
        for _ in 0..120 {
            slow.step_month(&mut ra);
            fast.step_month(&mut rb);
        }
        assert!(fast.net_worth() > slow.net_worth());
    }

    proptest! {
        #[test]
        fn positive_growth_never_shrinks(seed in 0u64..1_000, growth in 0.0f64..0.3) {
            let mut c = Competitor::new(Decimal::new(50_000, 0), &cfg(growth));
            let mut rng = SeededRandom::new(seed);
            let mut prev = c.net_worth();
            for _ in 0..24 {
                c.step_month(&mut rng);
                prop_assert!(c.net_worth() >= prev);
                prev = c.net_worth();
            }
        }
    }
}
