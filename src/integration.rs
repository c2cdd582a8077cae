//! Coefficient tables for the transient integration rules that reactive
//! device stamps consult. The outer time-stepping loop that
//! would pick a method, a step size, and drive history forward across
//! steps is out of scope — these are just the immutable coefficient
//! records and the companion-model math they feed.

/// A single integration rule's companion-model coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationMethod {
    /// Display name.
    pub name: &'static str,
    /// Order of the rule.
    pub order: u8,
    /// Capacitor/inductor self-term coefficients.
    pub alpha0: f64,
    pub alpha1: f64,
    pub alpha2: f64,
    /// Alternate naming for the same coefficients, used by inductor
    /// stamps to keep the formulas readable (`beta` vs `alpha`);
    /// numerically identical per method.
    pub beta0: f64,
    pub beta1: f64,
    pub beta2: f64,
    /// How many steps of history the rule needs (1 for BE/Trap, 2 for
    /// Gear/BDF2).
    pub required_history: u8,
    /// Trapezoidal additionally folds the previous step's current
    /// (capacitor) or voltage (inductor) into the history term.
    pub trapezoidal_extra: bool,
}

impl IntegrationMethod {
    pub const BACKWARD_EULER: IntegrationMethod = IntegrationMethod {
        name: "backward_euler",
        order: 1,
        alpha0: 1.0,
        alpha1: 1.0,
        alpha2: 0.0,
        beta0: 1.0,
        beta1: 1.0,
        beta2: 0.0,
        required_history: 1,
        trapezoidal_extra: false,
    };

    pub const TRAPEZOIDAL: IntegrationMethod = IntegrationMethod {
        name: "trapezoidal",
        order: 2,
        alpha0: 2.0,
        alpha1: 2.0,
        alpha2: 0.0,
        beta0: 2.0,
        beta1: 2.0,
        beta2: 0.0,
        required_history: 1,
        trapezoidal_extra: true,
    };

    pub const GEAR_BDF2: IntegrationMethod = IntegrationMethod {
        name: "gear_bdf2",
        order: 2,
        alpha0: 1.5,
        alpha1: 2.0,
        alpha2: -0.5,
        beta0: 1.5,
        beta1: 2.0,
        beta2: -0.5,
        required_history: 2,
        trapezoidal_extra: false,
    };

    /// Number of history samples this method requires.
    pub fn required_history(&self) -> u8 {
        self.required_history
    }
}

impl Default for IntegrationMethod {
    fn default() -> Self {
        Self::BACKWARD_EULER
    }
}
