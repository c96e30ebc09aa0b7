// Library root module for mesh-metrics
// This file defines the public API and module structure for the mesh-metrics library
// It exports the registry, the aggregators and the HTTP surface used by the binary
//
// Numan Thabit 2025 Nov

pub mod aggregator;
pub mod collectors;
pub mod config;
pub mod errors;
pub mod events;
pub mod gate;
pub mod registry;
pub mod server;
pub mod service;
pub mod transport;
