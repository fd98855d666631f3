use crate::traits::{constant, FixedStepper, OdeSystem, Scalar};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> FixedStepper<T> for RK4<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half: T = constant(0.5);
        let sixth: T = constant(1.0 / 6.0);
        let two: T = constant(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.rhs(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.rhs(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.rhs(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.rhs(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Error-control knobs for the adaptive stepper.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance<T: Scalar> {
    pub rtol: T,
    pub atol: T,
    pub min_step: T,
    pub max_steps: usize,
}

/// Why the adaptive stepper could not reach its target time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveFailure {
    NonFinite,
    StepSizeUnderflow,
    StepBudgetExceeded,
}

/// Dormand-Prince 5(4) embedded pair with classic step-size control.
///
/// The stepper carries its proposed step size between calls to `advance_to`,
/// so sampling a trajectory at many output times does not restart the
/// controller at every sample.
pub struct DormandPrince45<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    y_new: Vec<T>,
    h: T,
    steps: usize,
}

impl<T: Scalar> DormandPrince45<T> {
    pub fn new(dim: usize, initial_step: T) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            y_new: vec![z; dim],
            h: initial_step,
            steps: 0,
        }
    }

    /// Total number of attempted steps (accepted and rejected).
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Advances `state` from `*t` to exactly `target`, adapting the step size.
    /// On failure `*t` holds the last accepted time.
    pub fn advance_to(
        &mut self,
        system: &impl OdeSystem<T>,
        t: &mut T,
        state: &mut [T],
        target: T,
        tol: &Tolerance<T>,
    ) -> Result<(), AdaptiveFailure> {
        let safety: T = constant(0.9);
        let min_factor: T = constant(0.2);
        let max_factor: T = constant(5.0);
        let exponent: T = constant(-0.2);

        while *t < target {
            if self.steps >= tol.max_steps {
                return Err(AdaptiveFailure::StepBudgetExceeded);
            }
            self.steps += 1;

            let remaining = target - *t;
            let clipped = self.h >= remaining;
            let h = if clipped { remaining } else { self.h };

            let err = self.attempt(system, *t, state, h, tol)?;

            let factor = if err == T::zero() {
                max_factor
            } else {
                (safety * err.powf(exponent)).max(min_factor).min(max_factor)
            };

            if err <= T::one() {
                state.copy_from_slice(&self.y_new);
                *t = if clipped { target } else { *t + h };
                let proposed = h * factor;
                self.h = if clipped { self.h.max(proposed) } else { proposed };
            } else {
                self.h = h * factor.min(T::one());
                if self.h < tol.min_step {
                    return Err(AdaptiveFailure::StepSizeUnderflow);
                }
            }
        }
        Ok(())
    }

    /// Computes a candidate step into `y_new` and returns its scaled error norm.
    /// Non-finite candidates count as an infinite error so the step is retried smaller.
    fn attempt(
        &mut self,
        system: &impl OdeSystem<T>,
        t0: T,
        state: &[T],
        h: T,
        tol: &Tolerance<T>,
    ) -> Result<T, AdaptiveFailure> {
        let c2: T = constant(1.0 / 5.0);
        let c3: T = constant(3.0 / 10.0);
        let c4: T = constant(4.0 / 5.0);
        let c5: T = constant(8.0 / 9.0);

        let a21: T = constant(1.0 / 5.0);

        let a31: T = constant(3.0 / 40.0);
        let a32: T = constant(9.0 / 40.0);

        let a41: T = constant(44.0 / 45.0);
        let a42: T = constant(-56.0 / 15.0);
        let a43: T = constant(32.0 / 9.0);

        let a51: T = constant(19372.0 / 6561.0);
        let a52: T = constant(-25360.0 / 2187.0);
        let a53: T = constant(64448.0 / 6561.0);
        let a54: T = constant(-212.0 / 729.0);

        let a61: T = constant(9017.0 / 3168.0);
        let a62: T = constant(-355.0 / 33.0);
        let a63: T = constant(46732.0 / 5247.0);
        let a64: T = constant(49.0 / 176.0);
        let a65: T = constant(-5103.0 / 18656.0);

        // 5th order weights (b2 = 0)
        let b1: T = constant(35.0 / 384.0);
        let b3: T = constant(500.0 / 1113.0);
        let b4: T = constant(125.0 / 192.0);
        let b5: T = constant(-2187.0 / 6784.0);
        let b6: T = constant(11.0 / 84.0);

        // b - b_hat against the embedded 4th order solution
        let e1: T = constant(71.0 / 57600.0);
        let e3: T = constant(-71.0 / 16695.0);
        let e4: T = constant(71.0 / 1920.0);
        let e5: T = constant(-17253.0 / 339200.0);
        let e6: T = constant(22.0 / 525.0);
        let e7: T = constant(-1.0 / 40.0);

        let n = state.len();

        system.rhs(t0, state, &mut self.k1);
        if self.k1.iter().any(|v| !v.is_finite()) {
            return Err(AdaptiveFailure::NonFinite);
        }

        for i in 0..n {
            self.tmp[i] = state[i] + h * (a21 * self.k1[i]);
        }
        system.rhs(t0 + c2 * h, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = state[i] + h * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.rhs(t0 + c3 * h, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = state[i] + h * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.rhs(t0 + c4 * h, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = state[i]
                + h * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.rhs(t0 + c5 * h, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = state[i]
                + h * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.rhs(t0 + h, &self.tmp, &mut self.k6);

        for i in 0..n {
            self.y_new[i] = state[i]
                + h * (b1 * self.k1[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        system.rhs(t0 + h, &self.y_new, &mut self.k7);

        let mut sum = T::zero();
        for i in 0..n {
            let local = h
                * (e1 * self.k1[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i]);
            let scale = tol.atol + tol.rtol * state[i].abs().max(self.y_new[i].abs());
            let ratio = local / scale;
            sum = sum + ratio * ratio;
        }
        let count: T = constant(n.max(1) as f64);
        let err = (sum / count).sqrt();

        if err.is_finite() && self.y_new.iter().all(|v| v.is_finite()) {
            Ok(err)
        } else {
            Ok(T::infinity())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay {
        rate: f64,
    }

    impl OdeSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn rhs(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    fn tolerance() -> Tolerance<f64> {
        Tolerance {
            rtol: 1e-8,
            atol: 1e-10,
            min_step: 1e-12,
            max_steps: 10_000,
        }
    }

    #[test]
    fn rk4_step_advances_time_and_tracks_exponential_decay() {
        let system = Decay { rate: 0.5 };
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = vec![1.0];
        for _ in 0..100 {
            solver.step(&system, &mut t, &mut state, 0.01);
        }
        assert!((t - 1.0).abs() < 1e-12);
        let exact = (-0.5f64).exp();
        assert!(
            (state[0] - exact).abs() < 1e-9,
            "expected {exact}, got {}",
            state[0]
        );
    }

    #[test]
    fn dormand_prince_lands_exactly_on_target_time() {
        let system = Decay { rate: 1.3 };
        let mut solver = DormandPrince45::new(1, 1e-3);
        let mut t = 0.0;
        let mut state = vec![2.0];
        solver
            .advance_to(&system, &mut t, &mut state, 3.7, &tolerance())
            .expect("decay should integrate");
        assert_eq!(t, 3.7);
        let exact = 2.0 * (-1.3f64 * 3.7).exp();
        assert!(
            (state[0] - exact).abs() < 1e-7,
            "expected {exact}, got {}",
            state[0]
        );
        assert!(solver.steps() > 0);
    }

    #[test]
    fn dormand_prince_reports_exhausted_step_budget() {
        let system = Decay { rate: 1.0 };
        let mut solver = DormandPrince45::new(1, 1e-6);
        let mut t = 0.0;
        let mut state = vec![1.0];
        let tol = Tolerance {
            max_steps: 3,
            ..tolerance()
        };
        let result = solver.advance_to(&system, &mut t, &mut state, 100.0, &tol);
        assert_eq!(result, Err(AdaptiveFailure::StepBudgetExceeded));
        assert!(t < 100.0);
    }

    #[test]
    fn dormand_prince_rejects_non_finite_derivatives() {
        struct Blowup;
        impl OdeSystem<f64> for Blowup {
            fn dimension(&self) -> usize {
                1
            }
            fn rhs(&self, _t: f64, _x: &[f64], out: &mut [f64]) {
                out[0] = f64::NAN;
            }
        }

        let mut solver = DormandPrince45::new(1, 0.1);
        let mut t = 0.0;
        let mut state = vec![1.0];
        let result = solver.advance_to(&Blowup, &mut t, &mut state, 1.0, &tolerance());
        assert_eq!(result, Err(AdaptiveFailure::NonFinite));
        assert_eq!(t, 0.0);
    }
}
