//! Integration tests for the family graph, sync queue, service and CLI

mod cli_contracts;
mod family_service;
mod graph_scenarios;
mod sync_queue;
