//! Integration tests for Vaya

mod integration;
