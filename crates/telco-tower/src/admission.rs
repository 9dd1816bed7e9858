//! Call admission policy.
//!
//! Every `Hello` costs the tower exactly one uniform draw `u` in `[0, 1)`,
//! mapped onto half-open bands checked in order:
//!
//! | Band            | Outcome   | Share |
//! |-----------------|-----------|-------|
//! | `[0.00, 0.80)`  | `Connect` | 80%   |
//! | `[0.80, 0.95)`  | `Fail`    | 15%   |
//! | `[0.95, 1.00)`  | `Ignore`  | 5%    |
//!
//! The split shapes the statistics of the generated CDR traffic and is
//! never retried or tuned at runtime.

/// Upper bound (exclusive) of the `Connect` band.
pub const CONNECT_BELOW: f64 = 0.80;

/// Upper bound (exclusive) of the `Fail` band.
pub const FAIL_BELOW: f64 = 0.95;

/// Outcome of one admission draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Admission {
    /// Admit the call and reply `Connect`.
    Connect,
    /// Reject the call and reply `Fail`.
    Fail,
    /// Drop the request without replying or publishing.
    Ignore,
}

impl Admission {
    /// Map a draw in `[0, 1)` onto its band.
    ///
    /// Anything that is not below [`FAIL_BELOW`], including NaN, lands in
    /// `Ignore`.
    pub fn from_draw(u: f64) -> Self {
        if u < CONNECT_BELOW {
            Self::Connect
        } else if u < FAIL_BELOW {
            Self::Fail
        } else {
            Self::Ignore
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn band_edges_are_half_open() {
        assert_eq!(Admission::from_draw(0.0), Admission::Connect);
        assert_eq!(Admission::from_draw(0.799_999), Admission::Connect);
        assert_eq!(Admission::from_draw(0.80), Admission::Fail);
        assert_eq!(Admission::from_draw(0.949_999), Admission::Fail);
        assert_eq!(Admission::from_draw(0.95), Admission::Ignore);
        assert_eq!(Admission::from_draw(0.999_999), Admission::Ignore);
    }

    #[test]
    fn scenario_draws() {
        assert_eq!(Admission::from_draw(0.5), Admission::Connect);
        assert_eq!(Admission::from_draw(0.85), Admission::Fail);
        assert_eq!(Admission::from_draw(0.97), Admission::Ignore);
    }

    #[test]
    fn nan_is_ignored() {
        assert_eq!(Admission::from_draw(f64::NAN), Admission::Ignore);
    }

    #[test]
    fn split_is_close_to_80_15_5() {
        let mut rng = SmallRng::seed_from_u64(42);
        let (mut connect, mut fail, mut ignore) = (0_u32, 0_u32, 0_u32);
        for _ in 0..100_000 {
            match Admission::from_draw(rng.random::<f64>()) {
                Admission::Connect => connect = connect.saturating_add(1),
                Admission::Fail => fail = fail.saturating_add(1),
                Admission::Ignore => ignore = ignore.saturating_add(1),
            }
        }
        assert!((79_000..81_000).contains(&connect), "connect {connect}");
        assert!((14_200..15_800).contains(&fail), "fail {fail}");
        assert!((4_500..5_500).contains(&ignore), "ignore {ignore}");
    }
}
