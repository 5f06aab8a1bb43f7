//! Common traits defining interfaces for the tracking controller

use nalgebra::DMatrix;

/// Trait for vehicle motion models
pub trait MotionModel {
    /// State type
    type State;
    /// Control type
    type Control;

    /// Propagate state forward in time
    fn propagate(&self, state: &Self::State, control: &Self::Control, dt: f64) -> Self::State;

    /// Compute Jacobian of the propagated state with respect to state
    fn jacobian_state(&self, state: &Self::State, control: &Self::Control, dt: f64)
        -> DMatrix<f64>;

    /// Compute Jacobian of the propagated state with respect to control
    fn jacobian_control(&self, state: &Self::State, control: &Self::Control, dt: f64)
        -> DMatrix<f64>;

    /// Roll the model forward through a control sequence, returning every
    /// visited state (the initial one included).
    fn rollout(&self, initial: &Self::State, controls: &[Self::Control], dt: f64) -> Vec<Self::State>
    where
        Self::State: Clone,
    {
        let mut states = Vec::with_capacity(controls.len() + 1);
        states.push(initial.clone());
        for control in controls {
            let next = self.propagate(&states[states.len() - 1], control, dt);
            states.push(next);
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single integrator x' = x + u dt
    struct Integrator;

    impl MotionModel for Integrator {
        type State = f64;
        type Control = f64;

        fn propagate(&self, state: &f64, control: &f64, dt: f64) -> f64 {
            state + control * dt
        }

        fn jacobian_state(&self, _state: &f64, _control: &f64, _dt: f64) -> DMatrix<f64> {
            DMatrix::identity(1, 1)
        }

        fn jacobian_control(&self, _state: &f64, _control: &f64, dt: f64) -> DMatrix<f64> {
            DMatrix::from_element(1, 1, dt)
        }
    }

    #[test]
    fn test_default_rollout() {
        let states = Integrator.rollout(&1.0, &[1.0, 2.0, -1.0], 0.5);
        assert_eq!(states, vec![1.0, 1.5, 2.5, 2.0]);
    }
}
