use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activations::Activation;
use crate::algorithms::{soft_update, Td3Builder};
use crate::debug::{ensure_finite_gradients, ensure_finite_loss, ensure_finite_parameters, scan, NumericalIssue};
use crate::error::TalariaError;
use crate::layers::{DenseLayer, LayerNorm, Module};
use crate::networks::{Critic, EncoderConfig, NetworkConfig};
use super::tiny_network;

#[test]
fn test_nan_loss_aborts_with_network_name() {
    match ensure_finite_loss("critic_2", f32::NAN) {
        Err(TalariaError::NumericalInstability { network, .. }) => assert_eq!(network, "critic_2"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(ensure_finite_loss("actor", f32::INFINITY).is_err());
    assert!(ensure_finite_loss("actor", 0.0).is_ok());
}

#[test]
fn test_nan_gradient_is_detected() {
    let mut rng = StdRng::seed_from_u64(0);
    let mut layer = DenseLayer::new(2, 2, Activation::Relu, &mut rng);
    assert!(ensure_finite_gradients("layer", &mut layer).is_ok());
    layer.biases.grad[1] = f32::NAN;
    assert!(ensure_finite_gradients("layer", &mut layer).is_err());
}

#[test]
fn test_infinite_parameter_is_detected() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut layer = DenseLayer::new(2, 2, Activation::Relu, &mut rng);
    layer.weights.value[[0, 1]] = f32::INFINITY;
    assert!(ensure_finite_parameters("layer", &layer).is_err());
    assert_eq!(scan(layer.weights.view()), Some(NumericalIssue::Infinity { count: 1 }));
}

#[test]
fn test_constant_rows_through_layer_norm() {
    let mut norm = LayerNorm::new(4);
    let out = norm.forward_batch(Array2::from_elem((3, 4), 7.5).view()).unwrap();
    assert!(out.iter().all(|v| v.is_finite() && v.abs() < 1e-3));
    let grad = norm.backward_batch(Array2::<f32>::ones((3, 4)).view()).unwrap();
    assert!(grad.iter().all(|v| v.is_finite()));
}

#[test]
fn test_backward_without_forward_is_an_error() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut layer = DenseLayer::new(2, 2, Activation::Tanh, &mut rng);
    assert!(layer.backward_batch(Array2::<f32>::ones((1, 2)).view()).is_err());
}

#[test]
fn test_soft_update_between_architectures_fails() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut flat = Critic::new(3, 1, &tiny_network("mlp"), &mut rng).unwrap();
    let lstm = Critic::new(3, 1, &tiny_network("lstm"), &mut rng).unwrap();
    assert!(soft_update(&mut flat, &lstm, 0.5).is_err());
    assert!(soft_update(&mut flat.clone(), &flat, 1.5).is_err());
}

#[test]
fn test_invalid_network_configs_are_rejected() {
    let mut config = NetworkConfig::transformer();
    config.actor_encoder = EncoderConfig::Attention {
        d_model: 10,
        n_heads: 3,
        dim_feedforward: 16,
        seq_len: 16,
        positional: Default::default(),
    };
    assert!(Td3Builder::new(4, 2).network(config).build().is_err());

    let mut config = NetworkConfig::mlp();
    config.log_std_min = 3.0;
    assert!(Td3Builder::new(4, 2).network(config).build().is_err());

    assert!(Td3Builder::new(0, 2).build().is_err());
}

#[test]
fn test_training_error_keeps_context() {
    let err = TalariaError::InsufficientData { requested: 100, available: 3 }.during(4, 17);
    match &err {
        TalariaError::Training { episode, step, source } => {
            assert_eq!((*episode, *step), (4, 17));
            assert!(matches!(**source, TalariaError::InsufficientData { .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.to_string().contains("step 17"));
}

#[test]
fn test_dense_params_count() {
    let mut rng = StdRng::seed_from_u64(4);
    let layer = DenseLayer::new(5, 3, Activation::Linear, &mut rng);
    assert_eq!(layer.num_params(), 18);
}
