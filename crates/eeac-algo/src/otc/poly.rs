//! Real polynomial root finding for the Taylor trajectory calculator.
//!
//! Low degrees are solved in closed form. Higher degrees use the
//! Durand–Kerner (Weierstrass) iteration on the monic polynomial, then polish
//! the real roots with Newton steps.

use std::f64::consts::TAU;

use num_complex::Complex64;

const MAX_ITERATIONS: usize = 500;
const CONVERGENCE_TOLERANCE: f64 = 1e-14;
const IMAGINARY_TOLERANCE: f64 = 1e-9;

fn horner(coefficients: &[f64], x: Complex64) -> Complex64 {
    coefficients
        .iter()
        .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * x + c)
}

fn horner_real(coefficients: &[f64], x: f64) -> (f64, f64) {
    let mut value = 0.0;
    let mut derivative = 0.0;
    for &c in coefficients {
        derivative = derivative * x + value;
        value = value * x + c;
    }
    (value, derivative)
}

/// All complex roots of a polynomial given from its highest degree.
///
/// Leading zero coefficients are ignored; trailing zero coefficients yield
/// roots at the origin.
pub fn roots(coefficients: &[f64]) -> Vec<Complex64> {
    let start = coefficients.iter().position(|c| *c != 0.0);
    let Some(start) = start else {
        return Vec::new();
    };
    let mut coefficients = &coefficients[start..];

    let mut roots = Vec::new();
    while coefficients.len() > 1 && coefficients[coefficients.len() - 1] == 0.0 {
        roots.push(Complex64::new(0.0, 0.0));
        coefficients = &coefficients[..coefficients.len() - 1];
    }

    match coefficients.len() {
        0 | 1 => {}
        2 => roots.push(Complex64::new(-coefficients[1] / coefficients[0], 0.0)),
        3 => roots.extend(quadratic(coefficients[0], coefficients[1], coefficients[2])),
        _ => roots.extend(durand_kerner(coefficients)),
    }
    roots
}

fn quadratic(a: f64, b: f64, c: f64) -> [Complex64; 2] {
    let discriminant = b * b - 4.0 * a * c;
    if discriminant >= 0.0 {
        let sqrt = discriminant.sqrt();
        // Avoid cancellation between b and the square root
        let q = -0.5 * (b + b.signum() * sqrt);
        if q == 0.0 {
            return [Complex64::new(0.0, 0.0); 2];
        }
        [Complex64::new(q / a, 0.0), Complex64::new(c / q, 0.0)]
    } else {
        let re = -b / (2.0 * a);
        let im = (-discriminant).sqrt() / (2.0 * a);
        [Complex64::new(re, im), Complex64::new(re, -im)]
    }
}

fn durand_kerner(coefficients: &[f64]) -> Vec<Complex64> {
    let lead = coefficients[0];
    let monic: Vec<f64> = coefficients.iter().map(|c| c / lead).collect();
    let degree = monic.len() - 1;
    let radius = 1.0 + monic[1..].iter().fold(0.0_f64, |acc, c| acc.max(c.abs()));

    let mut estimates: Vec<Complex64> = (0..degree)
        .map(|k| Complex64::from_polar(radius, TAU * k as f64 / degree as f64 + 0.4))
        .collect();

    for _ in 0..MAX_ITERATIONS {
        let mut largest_change = 0.0_f64;
        for i in 0..degree {
            let current = estimates[i];
            let denominator = estimates
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(Complex64::new(1.0, 0.0), |acc, (_, other)| acc * (current - other));
            if denominator.norm() == 0.0 {
                estimates[i] = current + Complex64::new(1e-10, 1e-10);
                largest_change = f64::INFINITY;
                continue;
            }
            let delta = horner(&monic, current) / denominator;
            estimates[i] = current - delta;
            largest_change = largest_change.max(delta.norm() / current.norm().max(1.0));
        }
        if largest_change < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    estimates
        .into_iter()
        .map(|root| {
            if root.im.abs() > IMAGINARY_TOLERANCE * root.norm().max(1.0) {
                return root;
            }
            let mut x = root.re;
            for _ in 0..3 {
                let (value, derivative) = horner_real(&monic, x);
                if derivative == 0.0 {
                    break;
                }
                x -= value / derivative;
            }
            Complex64::new(x, 0.0)
        })
        .collect()
}

/// Non-negative real roots of a polynomial given from its highest degree.
///
/// Roots whose imaginary part is within rounding of zero count as real, so a
/// double root split into a conjugate pair is kept (twice).
pub fn positive_real_roots(coefficients: &[f64]) -> Vec<f64> {
    roots(coefficients)
        .into_iter()
        .filter(|root| root.im.abs() <= IMAGINARY_TOLERANCE * root.re.abs().max(1.0) && root.re >= 0.0)
        .map(|root| root.re)
        .collect()
}
