use super::basic_parameter::BasicParameter;
use super::model_parameter::NUM_MODEL_PARAMETERS;

/// Probability floor: no symbol is ever coded at a probability below this,
/// which keeps `as_histogram`'s integer frequencies bounded and the range
/// coder's `total_freq` from ever reaching absurd magnitudes.
const EPSILON: f64 = 1.0 / 1_048_576.0; // 2^-20

/// Numerically stable logistic sigmoid.
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// One mixture component: the estimator candidate it came from (`peak`,
/// `cost`, `flag`) plus the quantities derived from the shared model
/// parameters (`precision`, `pi` — the softmax mixture weight).
struct Component {
    peak: f64,
    cost: f64,
    flag: f64,
    precision: f64,
    pi: f64,
    /// `Z_m`: the component's logistic CDF evaluated over the finite
    /// support `[-0.5, 255.5]`, used to renormalize `component_pmf` so it
    /// sums to 1 over the 256 integer symbols rather than over all of
    /// `(-inf, inf)`.
    z: f64,
}

/// Bounds of the discretized support, shared by `Z_m` and every
/// `component_pmf` evaluation: `(-0.5, 255.5)` rather than the tighter
/// `[0, 255]` integer range.
const SUPPORT_LO: f64 = -0.5;
const SUPPORT_HI: f64 = 255.5;

/// A per-pixel logistic mixture distribution over 8-bit symbols, built
/// from the shared `ModelParameterUnit` coefficients and this pixel's
/// estimator candidates.
pub struct MixtureDistribution {
    components: Vec<Component>,
}

impl MixtureDistribution {
    /// `a` is the shared `[a0, a1, a2, a3, a4]` vector for this pixel's
    /// context unit; `candidates` is the merged list of example-search
    /// and adaptive-prediction `BasicParameter`s for this pixel. With no
    /// candidates (`M = 0`), the mixture has no components at all and
    /// every query (`probability`, `as_histogram`) falls back to the
    /// flat `1/256` distribution directly, rather than synthesizing one.
    pub fn new(a: &[f64; NUM_MODEL_PARAMETERS], candidates: &[BasicParameter]) -> Self {
        let source = candidates;

        let raw: Vec<f64> = source
            .iter()
            .map(|c| -c.cost * a[2] - (c.flag as f64) * a[4])
            .collect();
        let max_raw = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp_raw: Vec<f64> = raw.iter().map(|&r| (r - max_raw).exp()).collect();
        let sum_exp: f64 = exp_raw.iter().sum();

        let components = source
            .iter()
            .zip(exp_raw.iter())
            .map(|(c, &e)| {
                let precision = (a[0] - c.cost * a[1] - (c.flag as f64) * a[3]).exp();
                let z = sigmoid((SUPPORT_HI - c.peak) * precision)
                    - sigmoid((SUPPORT_LO - c.peak) * precision);
                Component {
                    peak: c.peak,
                    cost: c.cost,
                    flag: c.flag as f64,
                    precision,
                    pi: e / sum_exp,
                    z,
                }
            })
            .collect();

        MixtureDistribution { components }
    }

    /// Raw (un-normalized) logistic CDF difference over the unit bin
    /// `[f-0.5, f+0.5]`; must be divided by `component.z` to become a
    /// proper PMF over the finite `[0, 255]` support.
    fn component_pmf_raw(component: &Component, f: u8) -> f64 {
        let lo = (f as f64) - 0.5;
        let hi = (f as f64) + 0.5;
        let z_hi = (hi - component.peak) * component.precision;
        let z_lo = (lo - component.peak) * component.precision;
        sigmoid(z_hi) - sigmoid(z_lo)
    }

    fn component_pmf(component: &Component, f: u8) -> f64 {
        Self::component_pmf_raw(component, f) / component.z
    }

    /// `d pmf / d precision` for the given component at symbol `f`,
    /// via the quotient rule on `pmf_raw(f) / z`.
    fn component_pmf_dprecision(component: &Component, f: u8) -> f64 {
        let lo = (f as f64) - 0.5;
        let hi = (f as f64) + 0.5;
        let z_hi = (hi - component.peak) * component.precision;
        let z_lo = (lo - component.peak) * component.precision;
        let s_hi = sigmoid(z_hi);
        let s_lo = sigmoid(z_lo);
        let pmf_raw = s_hi - s_lo;
        let d_pmf_raw = (hi - component.peak) * s_hi * (1.0 - s_hi)
            - (lo - component.peak) * s_lo * (1.0 - s_lo);

        let s_bound_hi = sigmoid((SUPPORT_HI - component.peak) * component.precision);
        let s_bound_lo = sigmoid((SUPPORT_LO - component.peak) * component.precision);
        let d_z = (SUPPORT_HI - component.peak) * s_bound_hi * (1.0 - s_bound_hi)
            - (SUPPORT_LO - component.peak) * s_bound_lo * (1.0 - s_bound_lo);

        (d_pmf_raw * component.z - pmf_raw * d_z) / (component.z * component.z)
    }

    /// Mixture probability of symbol `f`, floored at `EPSILON`. With no
    /// components (`M = 0`), this is exactly `1/256`.
    pub fn probability(&self, f: u8) -> f64 {
        if self.components.is_empty() {
            return 1.0 / 256.0;
        }
        let raw: f64 = self
            .components
            .iter()
            .map(|c| c.pi * Self::component_pmf(c, f))
            .sum();
        raw.max(EPSILON)
    }

    /// Probability of symbol `f` together with the gradient of that
    /// probability with respect to each of the 5 shared parameters.
    ///
    /// The asymmetry here is intentional, not an oversight: `a0`/`a1`/`a3`
    /// only affect each component's *precision*, so their gradient terms
    /// are built from each component's mixture weight (`pi`, i.e.
    /// `height`) times that component's own `d(pmf)/d(precision)`. `a2`/
    /// `a4` instead affect the *mixture weights themselves*, so their
    /// gradient terms are built directly from each component's `pmf`
    /// value (the `probability` contributed by that component), scaled
    /// by the softmax-weight derivative.
    pub fn probability_and_gradient(&self, f: u8) -> (f64, [f64; NUM_MODEL_PARAMETERS]) {
        if self.components.is_empty() {
            return (1.0 / 256.0, [0.0; NUM_MODEL_PARAMETERS]);
        }
        let mean_cost: f64 = self.components.iter().map(|c| c.pi * c.cost).sum();
        let mean_flag: f64 = self.components.iter().map(|c| c.pi * c.flag).sum();

        let mut grad = [0.0; NUM_MODEL_PARAMETERS];
        let mut prob = 0.0;

        for c in &self.components {
            let pmf = Self::component_pmf(c, f);
            let pmf_grad_precision = Self::component_pmf_dprecision(c, f);
            prob += c.pi * pmf;

            // a0, a1, a3: through precision, scaled by this component's
            // raw mixture weight (height).
            grad[0] += c.pi * c.precision * pmf_grad_precision;
            grad[1] += c.pi * (-c.cost) * c.precision * pmf_grad_precision;
            grad[3] += c.pi * (-c.flag) * c.precision * pmf_grad_precision;

            // a2, a4: through the softmax mixture weight, scaled by this
            // component's own probability contribution.
            grad[2] += c.pi * (-c.cost - (-mean_cost)) * pmf;
            grad[4] += c.pi * (-c.flag - (-mean_flag)) * pmf;
        }

        (prob.max(EPSILON), grad)
    }

    /// Converts the mixture distribution into an integer frequency table
    /// suitable for `FreqTable`: every entry is at least 1, and the table
    /// sums to approximately `1 / EPSILON`. Matches `as_histogram`.
    pub fn as_histogram(&self) -> Vec<u32> {
        let probs: Vec<f64> = (0u16..256).map(|f| self.probability(f as u8)).collect();
        let sum: f64 = probs.iter().sum();
        let scale = 1.0 / EPSILON;

        probs
            .iter()
            .map(|&p| ((scale * p / sum).round() as i64).max(1) as u32)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const NEUTRAL_A: [f64; NUM_MODEL_PARAMETERS] = [-0.5, 0.1, 0.5, 0.0, 0.0];

    #[test]
    fn test_histogram_sums_positive_and_all_at_least_one() {
        let candidates = [
            BasicParameter::new(2.0, 100.0, 0),
            BasicParameter::new(1.0, 120.0, 1),
        ];
        let dist = MixtureDistribution::new(&NEUTRAL_A, &candidates);
        let hist = dist.as_histogram();
        assert_eq!(hist.len(), 256);
        assert!(hist.iter().all(|&h| h >= 1));
    }

    #[test]
    fn test_peak_symbol_has_highest_probability() {
        let candidates = [BasicParameter::new(0.5, 128.0, 0)];
        let dist = MixtureDistribution::new(&NEUTRAL_A, &candidates);
        let p_peak = dist.probability(128);
        let p_far = dist.probability(10);
        assert!(p_peak > p_far);
    }

    #[test]
    fn test_empty_candidates_are_exactly_uniform() {
        let dist = MixtureDistribution::new(&NEUTRAL_A, &[]);
        for f in [0u8, 1, 128, 254, 255] {
            assert_eq!(dist.probability(f), 1.0 / 256.0);
        }
        let hist = dist.as_histogram();
        assert_eq!(hist.len(), 256);
        assert!(hist.iter().all(|&h| h == hist[0]));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let candidates = [
            BasicParameter::new(1.5, 90.0, 0),
            BasicParameter::new(0.8, 140.0, 1),
        ];
        let f = 100u8;
        let h = 1e-6;

        let (_, analytic) = MixtureDistribution::new(&NEUTRAL_A, &candidates).probability_and_gradient(f);

        for i in 0..NUM_MODEL_PARAMETERS {
            let mut a_plus = NEUTRAL_A;
            a_plus[i] += h;
            let mut a_minus = NEUTRAL_A;
            a_minus[i] -= h;

            let p_plus = MixtureDistribution::new(&a_plus, &candidates).probability(f);
            let p_minus = MixtureDistribution::new(&a_minus, &candidates).probability(f);
            let numeric = (p_plus - p_minus) / (2.0 * h);

            assert!(
                (numeric - analytic[i]).abs() < 1e-4,
                "param {} mismatch: numeric={} analytic={}",
                i,
                numeric,
                analytic[i]
            );
        }
    }
}
