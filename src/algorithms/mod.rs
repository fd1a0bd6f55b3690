//! # TD3 Module
//!
//! Twin Delayed Deep Deterministic Policy Gradient for continuous control.
//!
//! - **Twin critics**: the bootstrap target uses the smaller of two target
//!   critics, which counters Q overestimation.
//! - **Target policy smoothing**: clipped Gaussian noise on the target action
//!   keeps the critic from exploiting sharp peaks.
//! - **Delayed policy updates**: the actor and its target move once every
//!   `policy_delay` critic updates.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use talaria::algorithms::Td3Builder;
//! use talaria::networks::NetworkConfig;
//!
//! let agent = Td3Builder::new(24, 4)
//!     .network(NetworkConfig::transformer())
//!     .batch_size(100)
//!     .policy_delay(2)
//!     .build()
//!     .unwrap();
//! ```

pub mod config;
pub mod target;
pub mod td3;

pub use config::{Td3Builder, Td3Config};
pub use target::soft_update;
pub use td3::{td_target, Td3Agent, UpdateReport};
