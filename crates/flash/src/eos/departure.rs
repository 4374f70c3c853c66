use crate::units::GAS_CONSTANT as R;

/// Residual properties of one phase relative to the ideal gas at the same
/// temperature, pressure and composition, per mole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Departure {
    /// `H − H_ig`, J/mol.
    pub enthalpy: f64,
    /// `S − S_ig`, J/(mol·K).
    pub entropy: f64,
    /// `Cv − Cv_ig`, J/(mol·K).
    pub cv: f64,
    /// `Cp − Cp_ig`, J/(mol·K).
    pub cp: f64,
    /// `(∂P/∂T)_v`, Pa/K.
    pub dp_dt: f64,
    /// `(∂P/∂v)_T`, Pa·mol/m³.
    pub dp_dv: f64,
}

/// Mixture attraction parameter and its temperature derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Attraction {
    pub a: f64,
    pub a_t: f64,
    pub a_tt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Cubic {
    pub delta1: f64,
    pub delta2: f64,
}

impl Cubic {
    /// Departure functions at molar volume `v` for a fluid with covolume `b`.
    pub fn departure(&self, t: f64, v: f64, b: f64, attraction: Attraction) -> Departure {
        let Attraction { a, a_t, a_tt } = attraction;
        let (d1, d2) = (self.delta1, self.delta2);

        let rep = (v + d1 * b) * (v + d2 * b);
        let j = ((v + d1 * b) / (v + d2 * b)).ln() / (b * (d1 - d2));
        let z = 1.0 / (1.0 - b / v) - a / (R * t * rep) * v;

        let enthalpy = R * t * (z - 1.0) + (t * a_t - a) * j;
        let entropy = R * ((v - b) / v * z).ln() + a_t * j;
        let cv = t * a_tt * j;

        let dp_dt = R / (v - b) - a_t / rep;
        let dp_dv = -R * t / (v - b).powi(2) + a * (2.0 * v + (d1 + d2) * b) / rep.powi(2);
        let cp = cv - t * dp_dt.powi(2) / dp_dv - R;

        Departure {
            enthalpy,
            entropy,
            cv,
            cp,
            dp_dt,
            dp_dv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    const SRK: Cubic = Cubic {
        delta1: 1.0,
        delta2: 0.0,
    };

    #[test]
    fn vanishes_for_dilute_gas() {
        let t = 300.0;
        let v = 1e3;
        let attraction = Attraction {
            a: 0.2,
            a_t: -4e-4,
            a_tt: 1e-6,
        };
        let dep = SRK.departure(t, v, 3e-5, attraction);

        assert_relative_eq!(dep.enthalpy, 0.0, epsilon = 1e-3);
        assert_relative_eq!(dep.entropy, 0.0, epsilon = 1e-5);
        assert_relative_eq!(dep.cv, 0.0, epsilon = 1e-6);
        assert_relative_eq!(dep.cp, 0.0, epsilon = 1e-4);
        assert_relative_eq!(dep.dp_dv, -R * t / (v * v), max_relative = 1e-6);
    }

    #[test]
    fn pressure_derivatives_match_finite_differences() {
        let (t, b) = (250.0, 3e-5);
        let a_of = |t: f64| 0.25 * (1.0 + 0.5 * (1.0 - (t / 190.0).sqrt())).powi(2);
        let pressure = |t: f64, v: f64| R * t / (v - b) - a_of(t) / (v * (v + b));

        let v = 2e-4;
        let h = 1e-3;
        let a_t = (a_of(t + h) - a_of(t - h)) / (2.0 * h);
        let attraction = Attraction {
            a: a_of(t),
            a_t,
            a_tt: (a_of(t + h) - 2.0 * a_of(t) + a_of(t - h)) / (h * h),
        };
        let dep = SRK.departure(t, v, b, attraction);

        let dp_dt = (pressure(t + h, v) - pressure(t - h, v)) / (2.0 * h);
        let dv = v * 1e-6;
        let dp_dv = (pressure(t, v + dv) - pressure(t, v - dv)) / (2.0 * dv);

        assert_relative_eq!(dep.dp_dt, dp_dt, max_relative = 1e-6);
        assert_relative_eq!(dep.dp_dv, dp_dv, max_relative = 1e-5);
    }
}
