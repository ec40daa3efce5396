//! Stateless price and indicator synthesis.
//!
//! These are deliberately randomized approximations: the short average is the price
//! plus jitter and the oscillator is a linear map of the last price change. Neither
//! looks at history. Volatility is assumed positive; the instrument registry enforces it.

use rand::Rng;

/// Round to two decimal places.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Random-walk step: `previous + uniform(-0.5, 0.5) * volatility`, rounded to cents.
pub fn next_price<R: Rng>(rng: &mut R, previous_price: f64, volatility: f64) -> f64 {
    let change = rng.random_range(-0.5_f64..0.5) * volatility;
    round_cents(previous_price + change)
}

/// Price plus `uniform(-0.5, 0.5)` jitter, rounded to cents.
pub fn derived_short_average<R: Rng>(rng: &mut R, price: f64) -> f64 {
    round_cents(price + rng.random_range(-0.5_f64..0.5))
}

/// `clamp(50 + delta * 10, 0, 100)`.
pub fn derived_oscillator(price_delta: f64) -> f64 {
    (50.0 + price_delta * 10.0).clamp(0.0, 100.0)
}

/// Short average used for seeded history: slightly below the price.
pub fn seed_short_average<R: Rng>(rng: &mut R, price: f64) -> f64 {
    round_cents(price - rng.random_range(0.0_f64..1.0))
}

/// Oscillator used for seeded history: neutral band `[40, 60)`.
pub fn seed_oscillator<R: Rng>(rng: &mut R) -> f64 {
    40.0 + rng.random_range(0.0_f64..20.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn next_price_stays_within_half_volatility() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let price = next_price(&mut rng, 150.0, 1.2);
            assert!((price - 150.0).abs() <= 0.6 + 1e-9, "step too large: {price}");
            assert_eq!(price, round_cents(price));
        }
    }

    #[test]
    fn short_average_is_jittered_price() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let average = derived_short_average(&mut rng, 420.0);
            assert!((average - 420.0).abs() <= 0.5 + 1e-9);
            let seeded = seed_short_average(&mut rng, 420.0);
            assert!(seeded <= 420.0 && seeded >= 419.0 - 1e-9);
        }
    }

    #[test]
    fn oscillator_is_clamped() {
        assert_eq!(derived_oscillator(0.0), 50.0);
        assert_eq!(derived_oscillator(1.5), 65.0);
        assert_eq!(derived_oscillator(-2.0), 30.0);
        assert_eq!(derived_oscillator(12.0), 100.0);
        assert_eq!(derived_oscillator(-80.0), 0.0);
    }

    #[test]
    fn seed_oscillator_is_neutral() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let value = seed_oscillator(&mut rng);
            assert!((40.0..60.0).contains(&value));
        }
    }
}
