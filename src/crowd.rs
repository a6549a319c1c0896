//! Spatial grouping of people and the risk level derived from the count.

mod cluster;
mod heatmap;
mod risk;

pub use cluster::{Cluster, ClusterConfig, ClusterPoint, Clustering, SpatialClusterer};
pub use heatmap::DensityGrid;
pub use risk::{AlertTrigger, DensityLevel, DensityThresholds, classify};
