pub mod gradient_clipper;

use ndarray::{ArrayD, Zip};
use serde::{Serialize, Deserialize};

use crate::layers::ParamMut;

pub use gradient_clipper::GradientClipper;

/// Applies one update to a module's parameters from their accumulated gradients.
///
/// `params` must arrive in the same order on every call; stateful optimizers
/// key their moment buffers by position.
pub trait Optimizer {
    fn step(&mut self, params: Vec<ParamMut<'_>>, learning_rate: f32);
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl Optimizer for OptimizerWrapper {
    fn step(&mut self, params: Vec<ParamMut<'_>>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.step(params, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.step(params, learning_rate),
        }
    }
}

/// Optimizer selection as it appears in configuration files.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum OptimizerKind {
    Sgd,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam { beta1: 0.9, beta2: 0.999, epsilon: 1e-8 }
    }
}

impl OptimizerKind {
    pub fn build(&self) -> OptimizerWrapper {
        match *self {
            OptimizerKind::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerKind::Adam { beta1, beta2, epsilon } => OptimizerWrapper::Adam(Adam::new(beta1, beta2, epsilon)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Default for SGD {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: Vec<ParamMut<'_>>, learning_rate: f32) {
        for mut p in params {
            p.value.zip_mut_with(&p.grad, |w, &g| *w -= learning_rate * g);
        }
    }
}

/// Adam with bias-corrected first and second moments, one pair per parameter tensor.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
    pub t: usize,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    fn ensure_state(&mut self, params: &[ParamMut<'_>]) {
        let matches = self.m.len() == params.len()
            && self.m.iter().zip(params).all(|(m, p)| m.shape() == p.value.shape());
        if !matches {
            self.m = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
            self.v = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
            self.t = 0;
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, mut params: Vec<ParamMut<'_>>, learning_rate: f32) {
        self.ensure_state(&params);
        self.t += 1;

        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.t as i32);

        for ((p, m), v) in params.iter_mut().zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            Zip::from(&mut p.value)
                .and(&p.grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Param;
    use ndarray::{array, Ix1};

    #[test]
    fn test_sgd_step() {
        let mut param: Param<Ix1> = Param::new(array![1.0f32, -1.0]);
        param.grad.assign(&array![0.5f32, -0.5]);
        SGD::new().step(vec![param.view_mut()], 0.1);
        assert!((param.value[0] - 0.95).abs() < 1e-6);
        assert!((param.value[1] + 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut param: Param<Ix1> = Param::new(array![0.0f32, 0.0]);
        param.grad.assign(&array![3.0f32, -0.01]);
        let mut adam = Adam::default();
        adam.step(vec![param.view_mut()], 0.01);
        // bias-corrected first step is lr * sign(g)
        assert!((param.value[0] + 0.01).abs() < 1e-5);
        assert!((param.value[1] - 0.01).abs() < 1e-4);
        assert_eq!(adam.t, 1);
    }

    #[test]
    fn test_adam_resets_state_on_shape_change() {
        let mut a: Param<Ix1> = Param::new(array![0.0f32]);
        let mut b: Param<Ix1> = Param::new(array![0.0f32, 0.0, 0.0]);
        let mut adam = Adam::default();
        adam.step(vec![a.view_mut()], 0.01);
        adam.step(vec![b.view_mut()], 0.01);
        assert_eq!(adam.t, 1);
    }
}
