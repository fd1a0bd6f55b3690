use ndarray::array;
use crate::activations::{sigmoid, Activation};

#[test]
fn test_relu_activation() {
    let mut input = array![[-1.0f32, 0.0, 1.0, 2.0]];
    Activation::Relu.apply_batch(&mut input);
    assert_eq!(input, array![[0.0f32, 0.0, 1.0, 2.0]]);
}

#[test]
fn test_sigmoid_gate() {
    assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    assert!(sigmoid(20.0) <= 1.0);
    assert!(sigmoid(-20.0) >= 0.0);
    assert!((sigmoid(-2.0) - 0.119_202_92).abs() < 1e-6);
}

#[test]
fn test_tanh_is_bounded() {
    let mut input = array![[-8.0f32, 0.0, 8.0]];
    Activation::Tanh.apply_batch(&mut input);
    assert_eq!(input[[0, 1]], 0.0);
    assert!(input.iter().all(|&v| v >= -1.0 && v <= 1.0));
}

#[test]
fn test_derivatives_match_finite_differences() {
    let points = array![[-1.3f32, -0.2, 0.4, 2.1]];
    let h = 1e-3f32;
    for activation in [Activation::Relu, Activation::Tanh, Activation::Linear] {
        let analytic = activation.derivative_batch(points.view());
        let mut plus = &points + h;
        let mut minus = &points - h;
        activation.apply_batch(&mut plus);
        activation.apply_batch(&mut minus);
        let numeric = (plus - minus) / (2.0 * h);
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!((a - n).abs() < 1e-2, "{:?}: {} vs {}", activation, a, n);
        }
    }
}

#[test]
fn test_relu_gain() {
    assert!((Activation::Relu.gain() - 2.0f32.sqrt()).abs() < 1e-6);
    assert_eq!(Activation::Linear.gain(), 1.0);
}
