//! Scenario and adversarial test suite for Phoenix checkpoints.
//!
//! The integration tests in this crate drive the checkpoint manager, the
//! P2P peers and the node together, from both an operator's and an
//! attacker's point of view. Shared fixtures live in [`helpers`].

pub mod helpers;
