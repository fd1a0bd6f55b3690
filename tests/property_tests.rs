#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use talaria::activations::Activation;
    use talaria::algorithms::soft_update;
    use talaria::layers::{DenseLayer, Module};
    use talaria::networks::{Actor, EncoderConfig, NetworkConfig};
    use talaria::replay_buffer::{ReplayBuffer, Transition};
    use ndarray::{Array1, Array3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn flat_network(stochastic: bool) -> NetworkConfig {
        let encoder = EncoderConfig::Flat { hidden_sizes: vec![16], d_model: 8 };
        let mut network = NetworkConfig::mlp().stochastic(stochastic);
        network.actor_encoder = encoder.clone();
        network.critic_encoder = encoder;
        network
    }

    // Strategy for batches of observations with moderate magnitudes
    fn states_strategy(batch: usize, state_dim: usize) -> impl Strategy<Value = Array3<f32>> {
        prop::collection::vec(-3.0f32..3.0, batch * state_dim)
            .prop_map(move |v| Array3::from_shape_vec((batch, 1, state_dim), v).unwrap())
    }

    fn transition(reward: f32) -> Transition {
        Transition::flat(Array1::zeros(2), Array1::zeros(1), reward, Array1::zeros(2), false)
    }

    proptest! {
        #[test]
        fn test_deterministic_actions_are_bounded(
            states in states_strategy(16, 4),
            seed in 0u64..1000
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut actor = Actor::new(4, 3, &flat_network(false), &mut rng).unwrap();
            let output = actor.forward(states.view(), false, &mut rng).unwrap();
            prop_assert!(output.actions.iter().all(|&a| a > -1.0 && a < 1.0));
        }

        #[test]
        fn test_stochastic_actions_are_bounded(
            states in states_strategy(16, 4),
            seed in 0u64..1000
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut actor = Actor::new(4, 3, &flat_network(true), &mut rng).unwrap();
            let output = actor.forward(states.view(), true, &mut rng).unwrap();
            prop_assert!(output.actions.iter().all(|&a| a > -1.0 && a < 1.0));
            let entropy = output.entropy.unwrap();
            prop_assert!(entropy.iter().all(|e| e.is_finite()));
        }

        #[test]
        fn test_soft_update_is_elementwise_blend(
            tau in 0.0f32..=1.0,
            seed in 0u64..1000
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let online = DenseLayer::new(6, 4, Activation::Tanh, &mut rng);
            let mut target = DenseLayer::new(6, 4, Activation::Tanh, &mut rng);
            let before: Vec<Vec<f32>> = target.params().iter().map(|p| p.iter().cloned().collect()).collect();

            soft_update(&mut target, &online, tau).unwrap();

            for ((after, online), before) in target.params().iter().zip(online.params().iter()).zip(&before) {
                for ((a, o), b) in after.iter().zip(online.iter()).zip(before) {
                    prop_assert!((a - (tau * o + (1.0 - tau) * b)).abs() < 1e-6);
                }
            }
        }

        #[test]
        fn test_buffer_keeps_last_insertions(
            capacity in 1usize..20,
            inserts in 0usize..60
        ) {
            let mut buffer = ReplayBuffer::new(capacity);
            for i in 0..inserts {
                buffer.store(transition(i as f32));
            }
            prop_assert_eq!(buffer.len(), inserts.min(capacity));
            let kept: Vec<f32> = buffer.iter().map(|t| t.reward).collect();
            let expected: Vec<f32> = (inserts.saturating_sub(capacity)..inserts).map(|i| i as f32).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn test_sampling_respects_fill_level(
            stored in 0usize..30,
            requested in 0usize..30,
            seed in 0u64..1000
        ) {
            let mut buffer = ReplayBuffer::new(64);
            for i in 0..stored {
                buffer.store(transition(i as f32));
            }
            let mut rng = StdRng::seed_from_u64(seed);
            match buffer.sample(requested, &mut rng) {
                Ok(samples) => {
                    prop_assert!(requested <= stored);
                    let mut rewards: Vec<u32> = samples.iter().map(|t| t.reward as u32).collect();
                    rewards.sort_unstable();
                    rewards.dedup();
                    prop_assert_eq!(rewards.len(), requested);
                }
                Err(_) => prop_assert!(requested > stored),
            }
        }
    }
}
