pub mod gradient_check;
pub mod numerical_check;

pub use gradient_check::gradient_check;
pub use numerical_check::{ensure_finite_gradients, ensure_finite_loss, ensure_finite_parameters, scan, NumericalIssue};
