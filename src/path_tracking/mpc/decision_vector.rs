//! Typed view over the optimizer's flat decision vector
//!
//! The solver manipulates one flat buffer holding the predicted states of N
//! steps followed by the actuations of the N - 1 transitions. The buffer is
//! field-major:
//!
//! ```text
//! [x_0..x_{N-1}, y_.., psi_.., v_.., cte_.., epsi_.., steer_0..steer_{N-2}, accel_..]
//! ```
//!
//! All offsets are computed by [`Layout`]; cost and constraint code only goes
//! through its accessors.

use std::ops::Range;
use nalgebra::DVector;
use crate::common::{Actuation, TrackingError, TrackingResult, VehicleState, NU, NX};

/// State fields in decision-vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    X = 0,
    Y = 1,
    Psi = 2,
    V = 3,
    Cte = 4,
    Epsi = 5,
}

impl StateField {
    pub const ALL: [StateField; NX] = [
        StateField::X,
        StateField::Y,
        StateField::Psi,
        StateField::V,
        StateField::Cte,
        StateField::Epsi,
    ];
}

/// Actuation fields in decision-vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationField {
    Steer = 0,
    Accel = 1,
}

impl ActuationField {
    pub const ALL: [ActuationField; NU] = [ActuationField::Steer, ActuationField::Accel];
}

/// Index arithmetic for a horizon of N states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    horizon: usize,
}

impl Layout {
    pub fn new(horizon: usize) -> Self {
        debug_assert!(horizon >= 2);
        Layout { horizon }
    }

    /// Number of predicted states N
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Number of actuations N - 1
    pub fn transitions(&self) -> usize {
        self.horizon - 1
    }

    /// Total number of unknowns, 6 N + 2 (N - 1)
    pub fn len(&self) -> usize {
        NX * self.horizon + NU * self.transitions()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of equality constraints: initial state + dynamics
    pub fn n_constraints(&self) -> usize {
        NX * self.horizon
    }

    pub fn state_index(&self, k: usize, field: StateField) -> usize {
        debug_assert!(k < self.horizon);
        field as usize * self.horizon + k
    }

    pub fn actuation_index(&self, k: usize, field: ActuationField) -> usize {
        debug_assert!(k < self.transitions());
        NX * self.horizon + field as usize * self.transitions() + k
    }

    /// Range of all actuation entries in the flat buffer
    pub fn actuation_range(&self) -> Range<usize> {
        NX * self.horizon..self.len()
    }

    /// Row of the first equality constraint attached to state `k`
    pub fn constraint_row(&self, k: usize, field: StateField) -> usize {
        NX * k + field as usize
    }
}

/// Flat decision vector plus its layout
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionVector {
    layout: Layout,
    data: DVector<f64>,
}

impl DecisionVector {
    pub fn zeros(layout: Layout) -> Self {
        DecisionVector { layout, data: DVector::zeros(layout.len()) }
    }

    pub fn from_data(layout: Layout, data: DVector<f64>) -> TrackingResult<Self> {
        if data.len() != layout.len() {
            return Err(TrackingError::InvalidInput(format!(
                "decision vector of length {} does not match layout length {}",
                data.len(),
                layout.len()
            )));
        }
        Ok(DecisionVector { layout, data })
    }

    /// Pack a state trajectory and its actuations
    pub fn from_plan(layout: Layout, states: &[VehicleState], actuations: &[Actuation]) -> TrackingResult<Self> {
        if states.len() != layout.horizon() || actuations.len() != layout.transitions() {
            return Err(TrackingError::InvalidInput(format!(
                "plan with {} states and {} actuations does not fit a horizon of {}",
                states.len(),
                actuations.len(),
                layout.horizon()
            )));
        }
        let mut z = Self::zeros(layout);
        for (k, s) in states.iter().enumerate() {
            z.set_state(k, s);
        }
        for (k, u) in actuations.iter().enumerate() {
            z.set_actuation(k, u);
        }
        Ok(z)
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn as_vector(&self) -> &DVector<f64> {
        &self.data
    }

    pub fn into_vector(self) -> DVector<f64> {
        self.data
    }

    pub fn state_field(&self, k: usize, field: StateField) -> f64 {
        self.data[self.layout.state_index(k, field)]
    }

    pub fn actuation_field(&self, k: usize, field: ActuationField) -> f64 {
        self.data[self.layout.actuation_index(k, field)]
    }

    pub fn state(&self, k: usize) -> VehicleState {
        let f = |field| self.state_field(k, field);
        VehicleState::new(
            f(StateField::X),
            f(StateField::Y),
            f(StateField::Psi),
            f(StateField::V),
            f(StateField::Cte),
            f(StateField::Epsi),
        )
    }

    pub fn set_state(&mut self, k: usize, s: &VehicleState) {
        let values = s.to_vector();
        for (field, value) in StateField::ALL.iter().zip(values.iter()) {
            let i = self.layout.state_index(k, *field);
            self.data[i] = *value;
        }
    }

    pub fn actuation(&self, k: usize) -> Actuation {
        Actuation::new(
            self.actuation_field(k, ActuationField::Steer),
            self.actuation_field(k, ActuationField::Accel),
        )
    }

    pub fn set_actuation(&mut self, k: usize, u: &Actuation) {
        let i = self.layout.actuation_index(k, ActuationField::Steer);
        self.data[i] = u.steer;
        let i = self.layout.actuation_index(k, ActuationField::Accel);
        self.data[i] = u.accel;
    }

    pub fn states(&self) -> Vec<VehicleState> {
        (0..self.layout.horizon()).map(|k| self.state(k)).collect()
    }

    pub fn actuations(&self) -> Vec<Actuation> {
        (0..self.layout.transitions()).map(|k| self.actuation(k)).collect()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_layout_length() {
        for n in 2..15 {
            let layout = Layout::new(n);
            assert_eq!(layout.len(), 6 * n + 2 * (n - 1));
            assert_eq!(layout.actuation_range().len(), 2 * (n - 1));
        }
    }

    #[test]
    fn test_layout_indices_are_a_bijection() {
        let layout = Layout::new(7);
        let mut seen = HashSet::new();
        for k in 0..layout.horizon() {
            for field in StateField::ALL.iter() {
                assert!(seen.insert(layout.state_index(k, *field)));
            }
        }
        for k in 0..layout.transitions() {
            for field in ActuationField::ALL.iter() {
                let i = layout.actuation_index(k, *field);
                assert!(layout.actuation_range().contains(&i));
                assert!(seen.insert(i));
            }
        }
        assert_eq!(seen.len(), layout.len());
        assert!(seen.iter().all(|&i| i < layout.len()));
    }

    #[test]
    fn test_field_major_ordering() {
        let layout = Layout::new(10);
        assert_eq!(layout.state_index(0, StateField::Y), 10);
        assert_eq!(layout.state_index(3, StateField::Epsi), 53);
        assert_eq!(layout.actuation_index(0, ActuationField::Steer), 60);
        assert_eq!(layout.actuation_index(0, ActuationField::Accel), 69);
    }

    #[test]
    fn test_state_and_actuation_accessors() {
        let layout = Layout::new(4);
        let mut z = DecisionVector::zeros(layout);
        let s = VehicleState::new(1.0, 2.0, 0.1, 9.0, -0.5, 0.02);
        let u = Actuation::new(-0.2, 0.7);
        z.set_state(2, &s);
        z.set_actuation(1, &u);

        assert_eq!(z.state(2), s);
        assert_eq!(z.actuation(1), u);
        assert_eq!(z.state(1), VehicleState::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert_eq!(z.states().len(), 4);
        assert_eq!(z.actuations().len(), 3);
    }

    #[test]
    fn test_from_data_checks_length() {
        let layout = Layout::new(3);
        assert!(DecisionVector::from_data(layout, DVector::zeros(layout.len())).is_ok());
        assert!(DecisionVector::from_data(layout, DVector::zeros(5)).is_err());
        assert!(DecisionVector::from_plan(layout, &[], &[]).is_err());
    }
}
