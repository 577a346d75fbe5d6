pub mod aggregate;
pub mod buckets;
pub mod columns;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod fetch;
pub mod geometry;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod reconcile;
pub mod render;
pub mod selection;
pub mod views;
pub mod viz_export;
