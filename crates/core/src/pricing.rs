//! Black-Scholes pricing for European options without dividends.
//!
//! Only delta drives strike selection; the theoretical price is reported
//! alongside candidates for operator context.

use crate::traits::PricingModel;
use crate::types::OptionRight;

const DAYS_PER_YEAR: f64 = 365.0;

/// Standard normal CDF via the error function.
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

/// Closed-form Black-Scholes model.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackScholes;

impl BlackScholes {
    fn d1_d2(spot: f64, strike: f64, rate: f64, iv: f64, years: f64) -> (f64, f64) {
        let sqrt_t = years.sqrt();
        let d1 = ((spot / strike).ln() + (rate + 0.5 * iv * iv) * years) / (iv * sqrt_t);
        (d1, d1 - iv * sqrt_t)
    }

    /// True when the closed form is undefined and intrinsic values apply.
    fn degenerate(spot: f64, strike: f64, iv: f64, days_to_expiry: i64) -> bool {
        days_to_expiry <= 0 || iv <= 0.0 || spot <= 0.0 || strike <= 0.0
    }
}

impl PricingModel for BlackScholes {
    fn delta(
        &self,
        spot: f64,
        strike: f64,
        rate: f64,
        iv: f64,
        days_to_expiry: i64,
        right: OptionRight,
    ) -> f64 {
        if Self::degenerate(spot, strike, iv, days_to_expiry) {
            return match right {
                OptionRight::Call => {
                    if spot > strike {
                        1.0
                    } else {
                        0.0
                    }
                }
                OptionRight::Put => {
                    if spot < strike {
                        -1.0
                    } else {
                        0.0
                    }
                }
            };
        }

        let years = days_to_expiry as f64 / DAYS_PER_YEAR;
        let (d1, _) = Self::d1_d2(spot, strike, rate, iv, years);
        match right {
            OptionRight::Call => normal_cdf(d1),
            OptionRight::Put => normal_cdf(d1) - 1.0,
        }
    }

    fn price(
        &self,
        spot: f64,
        strike: f64,
        rate: f64,
        iv: f64,
        days_to_expiry: i64,
        right: OptionRight,
    ) -> f64 {
        if Self::degenerate(spot, strike, iv, days_to_expiry) {
            return match right {
                OptionRight::Call => (spot - strike).max(0.0),
                OptionRight::Put => (strike - spot).max(0.0),
            };
        }

        let years = days_to_expiry as f64 / DAYS_PER_YEAR;
        let (d1, d2) = Self::d1_d2(spot, strike, rate, iv, years);
        let discount = (-rate * years).exp();
        match right {
            OptionRight::Call => spot * normal_cdf(d1) - strike * discount * normal_cdf(d2),
            OptionRight::Put => strike * discount * normal_cdf(-d2) - spot * normal_cdf(-d1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-3;

    #[test]
    fn at_the_money_call_delta_is_a_bit_above_half() {
        let delta = BlackScholes.delta(100.0, 100.0, 0.05, 0.30, 30, OptionRight::Call);
        assert!(delta > 0.5 && delta < 0.6, "delta = {delta}");
    }

    #[test]
    fn put_call_delta_parity() {
        let call = BlackScholes.delta(50.0, 45.0, 0.05, 0.40, 35, OptionRight::Call);
        let put = BlackScholes.delta(50.0, 45.0, 0.05, 0.40, 35, OptionRight::Put);
        assert!((call - put - 1.0).abs() < EPS);
        assert!(put < 0.0);
    }

    #[test]
    fn out_of_the_money_put_has_small_negative_delta() {
        let delta = BlackScholes.delta(100.0, 85.0, 0.05, 0.25, 30, OptionRight::Put);
        assert!(delta > -0.15 && delta < 0.0, "delta = {delta}");
    }

    #[test]
    fn expired_options_use_intrinsic_delta() {
        assert_eq!(BlackScholes.delta(110.0, 100.0, 0.05, 0.3, 0, OptionRight::Call), 1.0);
        assert_eq!(BlackScholes.delta(90.0, 100.0, 0.05, 0.3, 0, OptionRight::Call), 0.0);
        assert_eq!(BlackScholes.delta(90.0, 100.0, 0.05, 0.3, 0, OptionRight::Put), -1.0);
        assert_eq!(BlackScholes.delta(110.0, 100.0, 0.05, 0.3, -3, OptionRight::Put), 0.0);
    }

    #[test]
    fn put_call_price_parity() {
        let (s, k, r, iv, days) = (100.0, 95.0, 0.05, 0.35, 60);
        let call = BlackScholes.price(s, k, r, iv, days, OptionRight::Call);
        let put = BlackScholes.price(s, k, r, iv, days, OptionRight::Put);
        let t = days as f64 / DAYS_PER_YEAR;
        let parity = s - k * (-r * t).exp();
        assert!((call - put - parity).abs() < EPS);
    }
}
