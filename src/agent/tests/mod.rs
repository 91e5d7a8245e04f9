//! Unit tests for agent registration and health.

mod service_tests;
