use ndarray::{Array, ArrayD, ArrayViewD, ArrayViewMutD, Dimension};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A trainable tensor together with its accumulated gradient.
///
/// Only the value is persisted; the gradient is rebuilt as zeros on load.
#[derive(Clone, Debug)]
pub struct Param<D: Dimension> {
    pub value: Array<f32, D>,
    pub grad: Array<f32, D>,
}

impl<D: Dimension> Param<D> {
    pub fn new(value: Array<f32, D>) -> Self {
        let grad = Array::zeros(value.raw_dim());
        Param { value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.value.view().into_dyn()
    }

    pub fn view_mut(&mut self) -> ParamMut<'_> {
        ParamMut {
            value: self.value.view_mut().into_dyn(),
            grad: self.grad.view_mut().into_dyn(),
        }
    }
}

impl<D: Dimension + Serialize> Serialize for Param<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, D: Dimension + Deserialize<'de>> Deserialize<'de> for Param<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> std::result::Result<Self, De::Error> {
        let value = Array::<f32, D>::deserialize(deserializer)?;
        Ok(Param::new(value))
    }
}

/// Mutable access to one parameter and its gradient, as handed to optimizers.
pub struct ParamMut<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewMutD<'a, f32>,
}

/// Anything that owns trainable parameters.
///
/// `params` and `params_mut` must enumerate the same tensors in the same
/// order; optimizers and the soft update rely on the position of each entry.
pub trait Module {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>>;

    fn params_mut(&mut self) -> Vec<ParamMut<'_>>;

    fn zero_grad(&mut self) {
        for mut p in self.params_mut() {
            p.grad.fill(0.0);
        }
    }

    fn num_params(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    /// Owned copies of the accumulated gradients, in parameter order.
    fn gradients(&mut self) -> Vec<ArrayD<f32>> {
        self.params_mut().into_iter().map(|p| p.grad.to_owned()).collect()
    }
}
