pub mod cache;
pub mod controller;
pub mod domain;
pub mod gateway;
pub mod workflow;

// Make test_helpers available for integration tests
pub mod test_helpers;
