use std::f64::consts::PI;

const POLISH_STEPS: usize = 3;

/// Real roots of `Z³ + c2·Z² + c1·Z + c0 = 0`, in ascending order.
///
/// Roots come from the trigonometric or Cardano form and are then polished
/// with a few Newton steps on the original polynomial.
pub(super) fn real_roots(c2: f64, c1: f64, c0: f64) -> Vec<f64> {
    let shift = c2 / 3.0;
    let p = c1 - c2 * c2 / 3.0;
    let q = 2.0 * c2.powi(3) / 27.0 - c2 * c1 / 3.0 + c0;
    let discriminant = (q / 2.0).powi(2) + (p / 3.0).powi(3);

    let mut roots = if discriminant > 0.0 {
        let sqrt_d = discriminant.sqrt();
        let y = (-q / 2.0 + sqrt_d).cbrt() + (-q / 2.0 - sqrt_d).cbrt();
        vec![y - shift]
    } else if p == 0.0 {
        vec![-shift]
    } else {
        let r = 2.0 * (-p / 3.0).sqrt();
        let cos_arg = (3.0 * q / (2.0 * p) * (-3.0 / p).sqrt()).clamp(-1.0, 1.0);
        let theta = cos_arg.acos() / 3.0;
        (0..3)
            .map(|k| r * (theta - 2.0 * PI * f64::from(k) / 3.0).cos() - shift)
            .collect()
    };

    for z in &mut roots {
        *z = polish(*z, c2, c1, c0);
    }
    roots.sort_by(f64::total_cmp);
    roots.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
    roots
}

fn polish(mut z: f64, c2: f64, c1: f64, c0: f64) -> f64 {
    for _ in 0..POLISH_STEPS {
        let f = ((z + c2) * z + c1) * z + c0;
        let df = (3.0 * z + 2.0 * c2) * z + c1;
        if df == 0.0 {
            break;
        }
        let step = f / df;
        if !step.is_finite() {
            break;
        }
        z -= step;
    }
    z
}
