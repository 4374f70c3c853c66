use thiserror::Error;

/// Why a starting interval cannot be bisected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BracketError {
    #[error("an endpoint is not finite")]
    NonFinite,
    #[error("endpoints coincide")]
    ZeroWidth,
    #[error("residual has the same sign at both endpoints")]
    NoSignChange,
}

/// Sign of a residual. Zero counts as positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    #[must_use]
    pub fn of(value: f64) -> Self {
        if value < 0.0 {
            Sign::Negative
        } else {
            Sign::Positive
        }
    }
}

/// Finite, ordered endpoints that have not been evaluated yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Interval {
    lower: f64,
    upper: f64,
}

impl Interval {
    /// Orders `endpoints`, which may be given either way round.
    pub(super) fn ordered(endpoints: [f64; 2]) -> Result<Self, BracketError> {
        let [a, b] = endpoints;
        if !(a.is_finite() && b.is_finite()) {
            return Err(BracketError::NonFinite);
        }
        match a.total_cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { lower: a, upper: b }),
            std::cmp::Ordering::Greater => Ok(Self { lower: b, upper: a }),
            std::cmp::Ordering::Equal => Err(BracketError::ZeroWidth),
        }
    }

    pub(super) fn endpoints(&self) -> [f64; 2] {
        [self.lower, self.upper]
    }
}

/// An interval known to contain a sign change of the residual.
///
/// Only the lower sign is stored; the upper endpoint always has the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    lower: f64,
    upper: f64,
    lower_sign: Sign,
}

impl Bracket {
    /// Pairs an interval with the residual signs at its endpoints.
    pub(super) fn new(interval: Interval, signs: [Sign; 2]) -> Result<Self, BracketError> {
        if signs[0] == signs[1] {
            return Err(BracketError::NoSignChange);
        }
        Ok(Self {
            lower: interval.lower,
            upper: interval.upper,
            lower_sign: signs[0],
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> [f64; 2] {
        [self.lower, self.upper]
    }

    #[must_use]
    pub fn midpoint(&self) -> f64 {
        self.lower + 0.5 * (self.upper - self.lower)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether the width is within `abs_tol + rel_tol·|midpoint|`.
    #[must_use]
    pub fn is_x_converged(&self, abs_tol: f64, rel_tol: f64) -> bool {
        self.width() <= abs_tol + rel_tol * self.midpoint().abs()
    }

    /// Replaces the endpoint whose residual has the same sign as `x`'s.
    pub(super) fn shrink(&mut self, x: f64, sign: Sign) {
        if sign == self.lower_sign {
            self.lower = x;
        } else {
            self.upper = x;
        }
    }
}
