//! DBSCAN over person centroids.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracker::Rect;

/// Smallest extent area used for density, so a tight pair does not divide by zero.
const MIN_EXTENT_AREA: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighbourhood radius in normalized frame units.
    pub radius: f32,
    /// Points needed inside the radius (self included) to seed a group.
    pub min_members: usize,
    /// Multiply `radius` by the median box height of the frame.
    pub scale_by_box_height: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius: 0.08,
            min_members: 2,
            scale_by_box_height: false,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(ConfigError::invalid("cluster.radius", "must be positive"));
        }
        if self.min_members < 2 {
            return Err(ConfigError::invalid("cluster.min_members", "a group needs at least 2 members"));
        }
        Ok(())
    }
}

/// One person to cluster: a track id (or detection index) and its box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterPoint {
    pub member: u64,
    pub bbox: Rect,
}

impl ClusterPoint {
    pub fn new(member: u64, bbox: Rect) -> Self {
        Self { member, bbox }
    }
}

/// A group of people standing close together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<u64>,
    pub centroid: (f32, f32),
    pub extent: Rect,
    /// Members per unit of normalized extent area.
    pub density: f32,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Groups plus the people that belong to none of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clustering {
    pub clusters: Vec<Cluster>,
    pub individuals: Vec<u64>,
}

impl Clustering {
    pub fn largest_group(&self) -> usize {
        self.clusters.iter().map(Cluster::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

#[derive(Debug, Clone, Default)]
pub struct SpatialClusterer {
    config: ClusterConfig,
}

impl SpatialClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Cluster `points` in the order given.
    ///
    /// The same input always yields the same groups with the same ids:
    /// neighbours are scanned by index and groups are numbered as found.
    pub fn cluster(&self, points: &[ClusterPoint]) -> Clustering {
        if points.is_empty() {
            return Clustering::default();
        }

        let radius = self.effective_radius(points);
        let centroids: Vec<(f32, f32)> = points.iter().map(|p| p.bbox.center()).collect();
        let neighbours = |i: usize| -> Vec<usize> {
            let (x, y) = centroids[i];
            centroids
                .iter()
                .enumerate()
                .filter(|(_, (px, py))| ((px - x).powi(2) + (py - y).powi(2)).sqrt() <= radius)
                .map(|(j, _)| j)
                .collect()
        };

        let mut labels = vec![Label::Unvisited; points.len()];
        let mut next_cluster = 0;

        for i in 0..points.len() {
            if labels[i] != Label::Unvisited {
                continue;
            }
            let seeds = neighbours(i);
            if seeds.len() < self.config.min_members {
                labels[i] = Label::Noise;
                continue;
            }

            let id = next_cluster;
            next_cluster += 1;
            labels[i] = Label::Cluster(id);

            let mut queue: VecDeque<usize> = seeds.into_iter().filter(|&j| j != i).collect();
            while let Some(j) = queue.pop_front() {
                match labels[j] {
                    Label::Cluster(_) => continue,
                    // Border point: joins but does not expand.
                    Label::Noise => {
                        labels[j] = Label::Cluster(id);
                        continue;
                    }
                    Label::Unvisited => labels[j] = Label::Cluster(id),
                }
                let reach = neighbours(j);
                if reach.len() >= self.config.min_members {
                    queue.extend(reach.into_iter().filter(|&k| labels[k] != Label::Cluster(id)));
                }
            }
        }

        let mut grouped: Vec<Vec<usize>> = vec![Vec::new(); next_cluster];
        let mut individuals = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            match label {
                Label::Cluster(id) => grouped[*id].push(i),
                _ => individuals.push(points[i].member),
            }
        }

        let clusters = grouped
            .into_iter()
            .enumerate()
            .filter_map(|(id, indices)| build_cluster(id, &indices, points, &centroids))
            .collect();

        Clustering { clusters, individuals }
    }

    fn effective_radius(&self, points: &[ClusterPoint]) -> f32 {
        if !self.config.scale_by_box_height {
            return self.config.radius;
        }
        let mut heights: Vec<f32> = points.iter().map(|p| p.bbox.height).collect();
        heights.sort_by(f32::total_cmp);
        let median = heights[heights.len() / 2];
        if median > 0.0 {
            self.config.radius * median
        } else {
            self.config.radius
        }
    }
}

fn build_cluster(id: usize, indices: &[usize], points: &[ClusterPoint], centroids: &[(f32, f32)]) -> Option<Cluster> {
    let first = points[*indices.first()?].bbox;
    let extent = indices
        .iter()
        .skip(1)
        .fold(first, |acc, &i| acc.union(&points[i].bbox));

    let n = indices.len() as f32;
    let (sx, sy) = indices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &i| (sx + centroids[i].0, sy + centroids[i].1));

    Some(Cluster {
        id,
        members: indices.iter().map(|&i| points[i].member).collect(),
        centroid: (sx / n, sy / n),
        extent,
        density: n / extent.area().max(MIN_EXTENT_AREA),
    })
}
