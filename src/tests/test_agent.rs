use ndarray::{array, Array1, Array2, ArrayD};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::algorithms::{td_target, Td3Agent, Td3Builder};
use crate::error::TalariaError;
use crate::layers::Module;
use crate::replay_buffer::Transition;
use super::tiny_network;

fn snapshot<M: Module>(module: &M) -> Vec<ArrayD<f32>> {
    module.params().iter().map(|p| p.to_owned()).collect()
}

fn filled_agent(kind: &str, stochastic: bool, policy_delay: usize) -> Td3Agent {
    let network = tiny_network(kind).stochastic(stochastic);
    let window = network.window();
    let mut agent = Td3Builder::new(3, 2)
        .network(network)
        .batch_size(8)
        .buffer_capacity(64)
        .learning_starts(0)
        .policy_delay(policy_delay)
        .seed(11)
        .build()
        .unwrap();

    let mut rng = StdRng::seed_from_u64(5);
    for i in 0..32 {
        agent
            .store(Transition {
                state: Array2::random_using((window, 3), Uniform::new(-1.0f32, 1.0), &mut rng),
                action: Array1::random_using(2, Uniform::new(-1.0f32, 1.0), &mut rng),
                reward: (i % 5) as f32 - 2.0,
                next_state: Array2::random_using((window, 3), Uniform::new(-1.0f32, 1.0), &mut rng),
                done: i % 9 == 8,
            })
            .unwrap();
    }
    agent
}

#[test]
fn test_actor_updates_on_every_second_call() {
    let mut agent = filled_agent("mlp", false, 2);
    let mut actor = snapshot(&agent.train_actor);
    let mut target_actor = snapshot(&agent.target_actor);

    for call in 1..=6 {
        let report = agent.update().unwrap();
        let actor_now = snapshot(&agent.train_actor);
        let target_now = snapshot(&agent.target_actor);
        if call % 2 == 0 {
            assert!(report.actor_loss.is_some(), "call {}", call);
            assert_ne!(actor_now, actor, "actor should move on call {}", call);
            assert_ne!(target_now, target_actor, "target actor should move on call {}", call);
        } else {
            assert!(report.actor_loss.is_none(), "call {}", call);
            assert_eq!(actor_now, actor, "actor moved on call {}", call);
            assert_eq!(target_now, target_actor, "target actor moved on call {}", call);
        }
        actor = actor_now;
        target_actor = target_now;
    }
    assert_eq!(agent.update_count(), 6);
}

#[test]
fn test_critics_update_every_call() {
    let mut agent = filled_agent("mlp", false, 3);
    for _ in 0..3 {
        let critic_1 = snapshot(&agent.train_critic_1);
        let critic_2 = snapshot(&agent.train_critic_2);
        let report = agent.update().unwrap();
        assert!(report.critic_1_loss.is_finite() && report.critic_2_loss.is_finite());
        assert_ne!(snapshot(&agent.train_critic_1), critic_1);
        assert_ne!(snapshot(&agent.train_critic_2), critic_2);
    }
}

#[test]
fn test_target_critics_follow_soft_update() {
    let mut agent = filled_agent("lstm", false, 2);
    let tau = agent.config.tau;
    let target_before = snapshot(&agent.target_critic_1);
    agent.update().unwrap();
    let online_after = snapshot(&agent.train_critic_1);
    let target_after = snapshot(&agent.target_critic_1);

    for ((before, online), after) in target_before.iter().zip(&online_after).zip(&target_after) {
        let expected = online * tau + before * (1.0 - tau);
        for (e, a) in expected.iter().zip(after.iter()) {
            assert!((e - a).abs() < 1e-6);
        }
    }
}

#[test]
fn test_twin_target_takes_minimum() {
    let mut agent = filled_agent("mlp", false, 2);
    // make the two target critics disagree
    agent.target_critic_2.head.biases.value.fill(0.05);

    let mut rng = StdRng::seed_from_u64(9);
    let batch = agent.memory().sample_batch(8, &mut rng).unwrap();
    let min_q = agent.twin_target_q(batch.next_states.view(), batch.actions.view()).unwrap();
    let q1 = agent.target_critic_1.forward(batch.next_states.view(), batch.actions.view()).unwrap();
    let q2 = agent.target_critic_2.forward(batch.next_states.view(), batch.actions.view()).unwrap();

    let mut differed = false;
    for ((m, a), b) in min_q.iter().zip(q1.iter()).zip(q2.iter()) {
        assert_eq!(*m, a.min(*b));
        differed |= a != b;
    }
    assert!(differed);
}

#[test]
fn test_td_target_masks_terminal_states() {
    let rewards = array![[1.0f32], [0.5], [-1.0]];
    let dones = array![[0.0f32], [1.0], [0.0]];
    let min_q = array![[2.0f32], [100.0], [-3.0]];
    let targets = td_target(rewards.view(), dones.view(), min_q.view(), 0.9);
    let expected = array![[2.8f32], [0.5], [-3.7]];
    for (t, e) in targets.iter().zip(expected.iter()) {
        assert!((t - e).abs() < 1e-6);
    }
}

#[test]
fn test_act_stays_in_bounds() {
    let mut agent = filled_agent("mlp", false, 2);
    let mut rng = StdRng::seed_from_u64(21);
    for _ in 0..50 {
        let state = Array2::random_using((1, 3), Uniform::new(-5.0f32, 5.0), &mut rng);
        let action = agent.act(state.view(), true).unwrap();
        assert_eq!(action.len(), 2);
        assert!(action.iter().all(|&a| (-1.0..=1.0).contains(&a)));
    }
    assert!(agent.act(Array2::<f32>::zeros((1, 4)).view(), false).is_err());
}

#[test]
fn test_step_waits_for_learning_starts() {
    let mut agent = Td3Builder::new(3, 2)
        .network(tiny_network("mlp"))
        .batch_size(4)
        .buffer_capacity(32)
        .learning_starts(6)
        .build()
        .unwrap();
    for i in 1..=8 {
        let transition = Transition::flat(Array1::zeros(3), Array1::zeros(2), 1.0, Array1::zeros(3), false);
        let report = agent.step(transition).unwrap();
        assert_eq!(report.is_some(), i >= 6, "step {}", i);
    }
    assert_eq!(agent.total_steps(), 8);
    assert_eq!(agent.update_count(), 3);
}

#[test]
fn test_update_requires_a_full_batch() {
    let mut agent = Td3Builder::new(3, 2)
        .network(tiny_network("mlp"))
        .batch_size(4)
        .buffer_capacity(32)
        .build()
        .unwrap();
    let actor_before = snapshot(&agent.actor_snapshot());

    let result = agent.update();
    assert!(matches!(result, Err(TalariaError::InsufficientData { requested: 4, available: 0 })));

    for _ in 0..3 {
        agent
            .store(Transition::flat(Array1::zeros(3), Array1::zeros(2), 1.0, Array1::zeros(3), false))
            .unwrap();
    }
    let result = agent.update();
    assert!(matches!(result, Err(TalariaError::InsufficientData { requested: 4, available: 3 })));
    assert_eq!(agent.update_count(), 0);
    assert_eq!(snapshot(&agent.actor_snapshot()), actor_before);
}

#[test]
fn test_store_rejects_wrong_window() {
    let mut agent = filled_agent("lstm", false, 2);
    let bad = Transition::flat(Array1::zeros(3), Array1::zeros(2), 0.0, Array1::zeros(3), false);
    assert!(agent.store(bad).is_err());
}

#[test]
fn test_stochastic_agent_updates() {
    let mut agent = filled_agent("trsf", true, 1);
    for _ in 0..3 {
        let report = agent.update().unwrap();
        let actor_loss = report.actor_loss.unwrap();
        assert!(actor_loss.is_finite());
        assert!(report.mean_q.is_finite());
    }
}

#[test]
fn test_reset_targets_copies_online_networks() {
    let mut agent = filled_agent("mlp", false, 1);
    agent.update().unwrap();
    assert_ne!(snapshot(&agent.target_actor), snapshot(&agent.train_actor));
    agent.reset_targets();
    assert_eq!(snapshot(&agent.target_actor), snapshot(&agent.train_actor));
    assert_eq!(snapshot(&agent.target_critic_2), snapshot(&agent.train_critic_2));
}
