use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activations::Activation;
use crate::layers::{DenseLayer, Module};
use crate::optimizer::{GradientClipper, Optimizer, OptimizerKind, OptimizerWrapper, SGD};

fn regression_loss(layer: &mut DenseLayer, inputs: &Array2<f32>, targets: &Array2<f32>, backward: bool) -> f32 {
    let outputs = layer.forward_batch(inputs.view()).unwrap();
    let diff = &outputs - targets;
    if backward {
        layer.backward_batch((&diff * (2.0 / diff.len() as f32)).view()).unwrap();
    }
    diff.mapv(|d| d * d).mean().unwrap()
}

fn fit(kind: OptimizerKind, learning_rate: f32) -> (f32, f32) {
    let mut rng = StdRng::seed_from_u64(0);
    let mut layer = DenseLayer::new(2, 1, Activation::Linear, &mut rng);
    let inputs = Array2::from_shape_fn((8, 2), |(i, j)| ((i * (j + 2)) % 7) as f32 / 7.0 - 0.5);
    let targets = inputs.map_axis(ndarray::Axis(1), |row| 2.0 * row[0] - row[1] + 0.5).insert_axis(ndarray::Axis(1));

    let mut optimizer = kind.build();
    let initial = regression_loss(&mut layer, &inputs, &targets, false);
    for _ in 0..300 {
        layer.zero_grad();
        regression_loss(&mut layer, &inputs, &targets, true);
        optimizer.step(layer.params_mut(), learning_rate);
    }
    (initial, regression_loss(&mut layer, &inputs, &targets, false))
}

#[test]
fn test_sgd_reduces_loss() {
    let (initial, trained) = fit(OptimizerKind::Sgd, 0.1);
    assert!(trained < initial * 0.1, "{} -> {}", initial, trained);
}

#[test]
fn test_adam_reduces_loss() {
    let (initial, trained) = fit(OptimizerKind::default(), 0.05);
    assert!(trained < initial * 0.1, "{} -> {}", initial, trained);
}

#[test]
fn test_optimizer_kind_builds_matching_wrapper() {
    assert!(matches!(OptimizerKind::Sgd.build(), OptimizerWrapper::SGD(_)));
    assert!(matches!(OptimizerKind::default().build(), OptimizerWrapper::Adam(_)));
}

#[test]
fn test_zero_gradient_leaves_sgd_params() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut layer = DenseLayer::new(3, 2, Activation::Relu, &mut rng);
    let before = layer.weights.value.clone();
    layer.zero_grad();
    SGD::new().step(layer.params_mut(), 1.0);
    assert_eq!(layer.weights.value, before);
}

#[test]
fn test_clip_by_norm_is_per_tensor() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut layer = DenseLayer::new(2, 2, Activation::Linear, &mut rng);
    layer.weights.grad.fill(3.0);
    layer.biases.grad.fill(0.1);
    let mut params = layer.params_mut();
    GradientClipper::ClipByNorm { max_norm: 1.0 }.clip(&mut params);
    let weight_norm = params[0].grad.iter().map(|g| g * g).sum::<f32>().sqrt();
    assert!((weight_norm - 1.0).abs() < 1e-5);
    assert!(params[1].grad.iter().all(|&g| (g - 0.1).abs() < 1e-7));
}
