//! Conversion between uncalibrated (raw numeric) and calibrated (engineering) values.
use tracing::trace;

use crate::{
    model::{CalibratorDef, MathOperand, MathOperator},
    ContainerEntryValue, ValueLookup,
};

/// Failure to apply or reverse a calibrator. These are reported as item warnings.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Polynomial Calibrator for {item} has no real roots for EU value {value}")]
    NoRealRoots { item: String, value: f64 },

    #[error(
        "Polynomial Calibrator for {item} has no real roots in the raw range [{min}, {max}] for EU value {value}"
    )]
    NoRootsInRange {
        item: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Spline Calibrator for {item} does not bound uncalibrated value {value} and extrapolate is false")]
    SplineRawUnbounded { item: String, value: f64 },

    #[error("Spline Calibrator for {item} does not bound calibrated value {value} and extrapolate is false")]
    SplineCalibratedUnbounded { item: String, value: f64 },

    #[error("Math Operation Calibrator for {item} is invalid: {reason}")]
    InvalidMathOperation { item: String, reason: String },

    #[error(
        "Math Operation Calibrator for {item} has no raw value in the range [{min}, {max}] for EU value {value}"
    )]
    MathOperationNoInverse {
        item: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

type CalResult = std::result::Result<f64, CalibrationError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Calibrator {
    Polynomial(Polynomial),
    Spline(Spline),
    MathOperation(MathOperation),
}

impl Calibrator {
    pub(crate) fn from_def(def: &CalibratorDef) -> Self {
        match def {
            CalibratorDef::Polynomial { terms } => {
                let degree = terms.iter().map(|t| t.exponent as usize).max().unwrap_or(0);
                let mut coefficients = vec![0.0; degree + 1];
                for term in terms {
                    coefficients[term.exponent as usize] += term.coefficient;
                }
                Calibrator::Polynomial(Polynomial { coefficients })
            }
            CalibratorDef::Spline {
                points,
                order,
                extrapolate,
            } => {
                let mut points: Vec<(f64, f64)> =
                    points.iter().map(|p| (p.raw, p.calibrated)).collect();
                points.sort_by(|a, b| a.0.total_cmp(&b.0));
                Calibrator::Spline(Spline {
                    points,
                    order: *order,
                    extrapolate: *extrapolate,
                })
            }
            CalibratorDef::MathOperation { operations } => {
                Calibrator::MathOperation(MathOperation {
                    operations: operations.clone(),
                })
            }
        }
    }

    /// Uncalibrated to calibrated.
    ///
    /// # Errors
    /// If the calibrator cannot produce a value for `raw`.
    pub fn calibrate(&self, item: &str, raw: f64) -> CalResult {
        match self {
            Calibrator::Polynomial(p) => Ok(p.evaluate(raw)),
            Calibrator::Spline(s) => s.calibrate(item, raw),
            Calibrator::MathOperation(m) => m.evaluate(item, raw),
        }
    }

    /// Calibrated to uncalibrated, where the result must lie within `domain`, the range of
    /// values the raw encoding can hold.
    ///
    /// # Errors
    /// If there is no uncalibrated value in `domain` for `value`.
    pub fn uncalibrate(&self, item: &str, value: f64, domain: (f64, f64)) -> CalResult {
        match self {
            Calibrator::Polynomial(p) => p.invert(item, value, domain),
            Calibrator::Spline(s) => s.uncalibrate(item, value),
            Calibrator::MathOperation(m) => m.invert(item, value, domain),
        }
    }
}

/// `Σ coefficients[i] * x^i`
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    #[must_use]
    pub fn new(coefficients: Vec<f64>) -> Self {
        Polynomial { coefficients }
    }

    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    /// Solve `p(x) = value` for the smallest real root in `domain`.
    fn invert(&self, item: &str, value: f64, domain: (f64, f64)) -> CalResult {
        let mut coefs = self.coefficients.clone();
        if coefs.is_empty() {
            coefs.push(0.0);
        }
        coefs[0] -= value;
        while coefs.len() > 1 && coefs[coefs.len() - 1] == 0.0 {
            coefs.pop();
        }

        let roots = real_roots(&coefs);
        trace!(item, value, ?roots, "polynomial roots");
        if roots.is_empty() {
            return Err(CalibrationError::NoRealRoots {
                item: item.to_string(),
                value,
            });
        }
        roots
            .into_iter()
            .find(|r| in_domain(*r, domain))
            .ok_or_else(|| CalibrationError::NoRootsInRange {
                item: item.to_string(),
                value,
                min: domain.0,
                max: domain.1,
            })
    }
}

fn in_domain(x: f64, (min, max): (f64, f64)) -> bool {
    let tolerance = 1e-9 * x.abs().max(1.0);
    x >= min - tolerance && x <= max + tolerance
}

/// Real roots of `Σ coefs[i] * x^i`, sorted ascending.
fn real_roots(coefs: &[f64]) -> Vec<f64> {
    let mut roots = match coefs.len() {
        0 | 1 => {
            // Constant; either everything or nothing is a root
            if coefs.first().copied().unwrap_or(0.0) == 0.0 {
                vec![0.0]
            } else {
                vec![]
            }
        }
        2 => vec![-coefs[0] / coefs[1]],
        3 => {
            let (c, b, a) = (coefs[0], coefs[1], coefs[2]);
            let disc = b * b - 4.0 * a * c;
            if disc < 0.0 {
                vec![]
            } else {
                let q = -0.5 * (b + b.signum() * disc.sqrt());
                if q == 0.0 {
                    vec![0.0]
                } else {
                    vec![q / a, c / q]
                }
            }
        }
        _ => durand_kerner(coefs),
    };
    roots.sort_by(f64::total_cmp);
    roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * a.abs().max(1.0));
    roots
}

#[derive(Debug, Clone, Copy)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn add(self, o: Complex) -> Complex {
        Complex {
            re: self.re + o.re,
            im: self.im + o.im,
        }
    }

    fn sub(self, o: Complex) -> Complex {
        Complex {
            re: self.re - o.re,
            im: self.im - o.im,
        }
    }

    fn mul(self, o: Complex) -> Complex {
        Complex {
            re: self.re * o.re - self.im * o.im,
            im: self.re * o.im + self.im * o.re,
        }
    }

    fn div(self, o: Complex) -> Complex {
        let d = o.re * o.re + o.im * o.im;
        Complex {
            re: (self.re * o.re + self.im * o.im) / d,
            im: (self.im * o.re - self.re * o.im) / d,
        }
    }

    fn abs(self) -> f64 {
        self.re.hypot(self.im)
    }
}

/// All roots by Durand-Kerner iteration, keeping the ones that are real.
fn durand_kerner(coefs: &[f64]) -> Vec<f64> {
    let n = coefs.len() - 1;
    let lead = coefs[n];
    let monic: Vec<f64> = coefs.iter().map(|c| c / lead).collect();
    let eval = |z: Complex| {
        monic.iter().rev().fold(Complex { re: 0.0, im: 0.0 }, |acc, c| {
            acc.mul(z).add(Complex { re: *c, im: 0.0 })
        })
    };

    let seed = Complex { re: 0.4, im: 0.9 };
    let mut roots = Vec::with_capacity(n);
    let mut z = Complex { re: 1.0, im: 0.0 };
    for _ in 0..n {
        roots.push(z);
        z = z.mul(seed);
    }

    for _ in 0..1000 {
        let mut delta = 0.0f64;
        for i in 0..n {
            let mut denom = Complex { re: 1.0, im: 0.0 };
            for (j, other) in roots.iter().enumerate() {
                if i != j {
                    denom = denom.mul(roots[i].sub(*other));
                }
            }
            let step = eval(roots[i]).div(denom);
            roots[i] = roots[i].sub(step);
            delta = delta.max(step.abs());
        }
        if delta < 1e-14 {
            break;
        }
    }

    let real = |x: f64| monic.iter().rev().fold(0.0, |acc, c| acc * x + c);
    let deriv = |x: f64| {
        monic
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + c * i as f64)
    };
    roots
        .into_iter()
        .filter(|z| z.im.abs() <= 1e-7 * z.re.abs().max(1.0))
        .map(|z| {
            // polish with a few newton steps on the real polynomial
            let mut x = z.re;
            for _ in 0..5 {
                let d = deriv(x);
                if d == 0.0 {
                    break;
                }
                x -= real(x) / d;
            }
            x
        })
        .collect()
}

/// Piecewise interpolation between ordered `(raw, calibrated)` points.
#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    points: Vec<(f64, f64)>,
    order: u32,
    extrapolate: bool,
}

impl Spline {
    fn calibrate(&self, item: &str, raw: f64) -> CalResult {
        let unbounded = || CalibrationError::SplineRawUnbounded {
            item: item.to_string(),
            value: raw,
        };
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(unbounded()),
        };
        if self.points.len() == 1 {
            return if raw == first.0 || self.extrapolate {
                Ok(first.1)
            } else {
                Err(unbounded())
            };
        }
        let segment = if raw < first.0 || raw > last.0 {
            if !self.extrapolate {
                return Err(unbounded());
            }
            if raw < first.0 {
                0
            } else {
                self.points.len() - 2
            }
        } else {
            self.points
                .windows(2)
                .position(|w| raw >= w[0].0 && raw <= w[1].0)
                .unwrap_or(0)
        };
        let (x0, y0) = self.points[segment];
        let (x1, y1) = self.points[segment + 1];
        if self.order == 0 {
            return Ok(if raw >= x1 { y1 } else { y0 });
        }
        Ok(interpolate(raw, (x0, y0), (x1, y1)))
    }

    fn uncalibrate(&self, item: &str, value: f64) -> CalResult {
        let unbounded = || CalibrationError::SplineCalibratedUnbounded {
            item: item.to_string(),
            value,
        };
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(unbounded()),
        };
        if self.points.len() == 1 {
            return if value == first.1 || self.extrapolate {
                Ok(first.0)
            } else {
                Err(unbounded())
            };
        }
        let found = self.points.windows(2).position(|w| {
            let (lo, hi) = if w[0].1 <= w[1].1 {
                (w[0].1, w[1].1)
            } else {
                (w[1].1, w[0].1)
            };
            value >= lo && value <= hi
        });
        let segment = match found {
            Some(idx) => idx,
            None if self.extrapolate => {
                if (value - first.1).abs() <= (value - last.1).abs() {
                    0
                } else {
                    self.points.len() - 2
                }
            }
            None => return Err(unbounded()),
        };
        let (x0, y0) = self.points[segment];
        let (x1, y1) = self.points[segment + 1];
        if self.order == 0 || y0 == y1 {
            return Ok(if value == y1 && y0 != y1 { x1 } else { x0 });
        }
        Ok(interpolate(value, (y0, x0), (y1, x1)))
    }
}

fn interpolate(x: f64, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> f64 {
    if x1 == x0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Postfix expression over the uncalibrated value.
#[derive(Debug, Clone, PartialEq)]
pub struct MathOperation {
    operations: Vec<MathOperand>,
}

impl MathOperation {
    const INVERT_STEPS: usize = 512;

    fn evaluate(&self, item: &str, x: f64) -> CalResult {
        let invalid = |reason: &str| CalibrationError::InvalidMathOperation {
            item: item.to_string(),
            reason: reason.to_string(),
        };
        let mut stack: Vec<f64> = Vec::with_capacity(self.operations.len());
        for operand in &self.operations {
            match operand {
                MathOperand::ThisParameter => stack.push(x),
                MathOperand::Value(v) => stack.push(*v),
                MathOperand::Operator(op) => {
                    let unary = matches!(
                        op,
                        MathOperator::Negate
                            | MathOperator::Abs
                            | MathOperator::Inverse
                            | MathOperator::Ln
                            | MathOperator::Log
                            | MathOperator::Exp
                            | MathOperator::Sqrt
                    );
                    let result = if unary {
                        let a = stack.pop().ok_or_else(|| invalid("stack underflow"))?;
                        match op {
                            MathOperator::Negate => -a,
                            MathOperator::Abs => a.abs(),
                            MathOperator::Inverse => 1.0 / a,
                            MathOperator::Ln => a.ln(),
                            MathOperator::Log => a.log10(),
                            MathOperator::Exp => a.exp(),
                            _ => a.sqrt(),
                        }
                    } else {
                        let b = stack.pop().ok_or_else(|| invalid("stack underflow"))?;
                        let a = stack.pop().ok_or_else(|| invalid("stack underflow"))?;
                        match op {
                            MathOperator::Add => a + b,
                            MathOperator::Subtract => a - b,
                            MathOperator::Multiply => a * b,
                            MathOperator::Divide => a / b,
                            _ => a.powf(b),
                        }
                    };
                    stack.push(result);
                }
            }
        }
        match stack.as_slice() {
            [result] => Ok(*result),
            _ => Err(invalid("expression does not reduce to a single value")),
        }
    }

    /// Numerically invert by locating a sign change over `domain` and bisecting.
    fn invert(&self, item: &str, value: f64, (min, max): (f64, f64)) -> CalResult {
        let no_inverse = || CalibrationError::MathOperationNoInverse {
            item: item.to_string(),
            value,
            min,
            max,
        };
        let f = |x: f64| self.evaluate(item, x).map(|y| y - value);
        let step = (max - min) / Self::INVERT_STEPS as f64;
        let mut lo = min;
        let mut f_lo = f(lo)?;
        for i in 1..=Self::INVERT_STEPS {
            if f_lo == 0.0 {
                return Ok(lo);
            }
            let hi = if i == Self::INVERT_STEPS {
                max
            } else {
                min + step * i as f64
            };
            let f_hi = f(hi)?;
            if f_hi == 0.0 {
                return Ok(hi);
            }
            if f_lo.is_finite() && f_hi.is_finite() && f_lo.signum() != f_hi.signum() {
                let (mut a, mut b, mut fa) = (lo, hi, f_lo);
                for _ in 0..200 {
                    let mid = (a + b) / 2.0;
                    let fm = f(mid)?;
                    if fm == 0.0 || (b - a).abs() <= f64::EPSILON * mid.abs().max(1.0) {
                        return Ok(mid);
                    }
                    if fm.signum() == fa.signum() {
                        a = mid;
                        fa = fm;
                    } else {
                        b = mid;
                    }
                }
                return Ok((a + b) / 2.0);
            }
            lo = hi;
            f_lo = f_hi;
        }
        Err(no_inverse())
    }
}

/// A calibrator that applies when all of its context comparisons hold.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextCalibrator {
    pub context: Vec<ContainerEntryValue>,
    pub calibrator: Calibrator,
}

/// All calibrators configured for an encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibration {
    pub default: Option<Calibrator>,
    pub context: Vec<ContextCalibrator>,
}

impl Calibration {
    /// The first context calibrator whose context matches `values`, otherwise the default
    /// calibrator. `None` means values are not calibrated.
    pub fn select(&self, values: &dyn ValueLookup) -> Option<&Calibrator> {
        self.context
            .iter()
            .find(|cc| {
                cc.context.iter().all(|cond| {
                    cond.item()
                        .and_then(|item| values.lookup(item))
                        .is_some_and(|v| cond.is_satisfied_by(v))
                })
            })
            .map(|cc| &cc.calibrator)
            .or(self.default.as_ref())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.context.is_empty()
    }
}
