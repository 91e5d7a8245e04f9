//! Unit tests for contracts, validation and registries.

mod registry_tests;
