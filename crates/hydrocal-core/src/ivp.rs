//! Initial value problems solved with `ode_solvers`
//!
//! A component describes its right-hand side by implementing [`IVP`]; the
//! [`IVPBuilder`] binds the component to the inputs of the current step and
//! hands the resulting system to one of the `ode_solvers` steppers.

use crate::config::{IntegratorConfig, SolverMethod};
use crate::errors::{HydroError, HydroResult};
use crate::timeseries::{FloatValue, Time};
use is_close::is_close;
use nalgebra::DVector;
use ode_solvers::dop_shared::{OutputType, SolverResult};
use ode_solvers::{Dopri5, Rk4, System};

/// State vector of every model integrated by this crate
pub type ModelState = DVector<FloatValue>;

/// A system of ordinary differential equations `dy/dt = f(t, inputs, y)`
pub trait IVP<T, S> {
    /// Values that are constant for the duration of one solve
    type Inputs;

    fn calculate_dy_dt(&self, t: T, inputs: &Self::Inputs, y: &S, dy_dt: &mut S);
}

pub struct IVPBuilder<'a, C>
where
    C: IVP<Time, ModelState>,
{
    component: &'a C,
    pub inputs: &'a C::Inputs,
    y0: ModelState,
}

impl<C> System<Time, ModelState> for IVPBuilder<'_, C>
where
    C: IVP<Time, ModelState>,
{
    fn system(&self, t: Time, y: &ModelState, dy: &mut ModelState) {
        self.component.calculate_dy_dt(t, self.inputs, y, dy)
    }
}

impl<'a, C> IVPBuilder<'a, C>
where
    C: IVP<Time, ModelState>,
{
    pub fn new(component: &'a C, inputs: &'a C::Inputs, y0: ModelState) -> Self {
        Self {
            component,
            inputs,
            y0,
        }
    }

    /// Fixed step RK4 from `t0` to `t1`
    ///
    /// The step is shrunk so that a whole number of steps lands on `t1`.
    pub fn to_rk4(self, t0: Time, t1: Time, step: Time) -> Rk4<Time, ModelState, Self> {
        let n_steps = ((t1 - t0) / step).ceil().max(1.0);
        let y0 = self.y0.clone();
        Rk4::new(self, t0, y0, t1, (t1 - t0) / n_steps)
    }

    /// Adaptive Dormand-Prince 5(4) from `t0` to `t1`, recording every accepted step
    pub fn to_dopri5(
        self,
        t0: Time,
        t1: Time,
        options: &IntegratorConfig,
    ) -> Dopri5<Time, ModelState, Self> {
        let y0 = self.y0.clone();
        Dopri5::from_param(
            self,
            t0,
            t1,
            t1 - t0,
            y0,
            options.rel_tolerance,
            options.abs_tolerance,
            0.9,
            0.04,
            0.2,
            10.0,
            t1 - t0,
            0.0,
            options.max_steps,
            1000,
            OutputType::Sparse,
        )
    }

    /// Integrates from `t0` to `t1` and returns the state at `t1`
    ///
    /// Solver errors (step limit, step size underflow, stiffness) and
    /// non-finite final states are reported as `IntegrationFailure`.
    pub fn solve(self, t0: Time, t1: Time, options: &IntegratorConfig) -> HydroResult<ModelState> {
        let state = match options.method {
            SolverMethod::Dopri5 => {
                let mut solver = self.to_dopri5(t0, t1, options);
                solver
                    .integrate()
                    .map_err(|e| HydroError::IntegrationFailure {
                        t: t0,
                        message: format!("{:?}", e),
                    })?;
                get_last_step(solver.results(), t1)?.clone()
            }
            SolverMethod::Rk4 => {
                let mut solver = self.to_rk4(t0, t1, options.step_size);
                solver
                    .integrate()
                    .map_err(|e| HydroError::IntegrationFailure {
                        t: t0,
                        message: format!("{:?}", e),
                    })?;
                get_last_step(solver.results(), t1)?.clone()
            }
        };

        if state.iter().any(|v| !v.is_finite()) {
            return Err(HydroError::IntegrationFailure {
                t: t1,
                message: "state is no longer finite".to_string(),
            });
        }
        Ok(state)
    }
}

/// The last state of a solver run, which must have reached `t_expected`
pub fn get_last_step<V>(results: &SolverResult<Time, V>, t_expected: Time) -> HydroResult<&V> {
    let (t, y) = results.get();
    match (t.last(), y.last()) {
        (Some(t_last), Some(y_last)) if is_close!(*t_last, t_expected) => Ok(y_last),
        (t_last, _) => Err(HydroError::IntegrationFailure {
            t: t_last.copied().unwrap_or(Time::NAN),
            message: format!("solver stopped before reaching t={}", t_expected),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// dy/dt = -k y, with the decay rate passed as input
    struct Decay;

    impl IVP<Time, ModelState> for Decay {
        type Inputs = FloatValue;

        fn calculate_dy_dt(&self, _t: Time, k: &FloatValue, y: &ModelState, dy_dt: &mut ModelState) {
            dy_dt[0] = -k * y[0];
            dy_dt[1] = k * y[0];
        }
    }

    fn y0() -> ModelState {
        ModelState::from_vec(vec![10.0, 0.0])
    }

    #[test]
    fn dopri5_matches_analytic_solution() {
        let k = 0.5;
        let state = IVPBuilder::new(&Decay, &k, y0())
            .solve(3.0, 4.0, &IntegratorConfig::default())
            .unwrap();

        assert_relative_eq!(state[0], 10.0 * (-0.5_f64).exp(), max_relative = 1e-6);
        // the second component accumulates what left the first
        assert_relative_eq!(state[0] + state[1], 10.0, max_relative = 1e-9);
    }

    #[test]
    fn rk4_matches_analytic_solution() {
        let k = 2.0;
        let options = IntegratorConfig {
            method: SolverMethod::Rk4,
            step_size: 0.03,
            ..IntegratorConfig::default()
        };
        let state = IVPBuilder::new(&Decay, &k, y0())
            .solve(0.0, 1.0, &options)
            .unwrap();

        assert_relative_eq!(state[0], 10.0 * (-2.0_f64).exp(), max_relative = 1e-5);
    }

    #[test]
    fn step_limit_is_an_integration_failure() {
        // a very fast decay cannot be resolved in a handful of steps
        let k = 1.0e6;
        let options = IntegratorConfig {
            max_steps: 5,
            ..IntegratorConfig::default()
        };
        let err = IVPBuilder::new(&Decay, &k, y0())
            .solve(0.0, 1.0, &options)
            .unwrap_err();

        assert!(matches!(err, HydroError::IntegrationFailure { .. }), "{}", err);
    }
}
