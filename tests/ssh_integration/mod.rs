//! SSH integration tests
//!
//! These tests need a reachable SSH server and are skipped otherwise.
//!
//! ## Running the tests
//!
//! ```bash
//! export SHELLPOOL_TEST_SSH_HOST=127.0.0.1
//! export SHELLPOOL_TEST_SSH_PORT=2222
//! export SHELLPOOL_TEST_SSH_USER=testuser
//! export SHELLPOOL_TEST_SSH_PASSWORD=testpass123
//! # optional
//! export SHELLPOOL_TEST_SSH_KEY=~/.ssh/id_ed25519_test
//!
//! cargo test --test ssh_integration
//! ```

#[macro_use]
pub mod fixtures;

mod auth_tests;
mod session_tests;
