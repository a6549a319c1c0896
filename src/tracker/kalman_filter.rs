//! Constant-velocity Kalman filter over XYAH boxes.
//!
//! State is 8-dimensional `(cx, cy, a, h, vx, vy, va, vh)`; the measurement is
//! the observed XYAH box. Noise scales with box height so the filter behaves
//! the same on normalized and pixel coordinates.

use ndarray::{Array1, Array2};

pub type StateMean = Array1<f64>;
pub type StateCovariance = Array2<f64>;

const NDIM: usize = 4;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(1.0 / 20.0, 1.0 / 160.0)
    }
}

impl KalmanFilter {
    pub fn new(std_weight_position: f64, std_weight_velocity: f64) -> Self {
        let mut motion_mat = Array2::eye(2 * NDIM);
        for i in 0..NDIM {
            motion_mat[[i, NDIM + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((NDIM, 2 * NDIM));
        for i in 0..NDIM {
            update_mat[[i, i]] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position,
            std_weight_velocity,
        }
    }

    /// Create a track state from an unassociated measurement. Velocities start at zero.
    pub fn initiate(&self, measurement: [f64; 4]) -> (StateMean, StateCovariance) {
        let mut mean = Array1::zeros(2 * NDIM);
        for (i, value) in measurement.iter().enumerate() {
            mean[i] = *value;
        }

        let h = measurement[3];
        let pos = 2.0 * self.std_weight_position * h;
        let vel = 10.0 * self.std_weight_velocity * h;
        let std = [pos, pos, 1e-2, pos, vel, vel, 1e-5, vel];

        (mean, diagonal(&std))
    }

    /// Run the prediction step one frame ahead.
    pub fn predict(&self, mean: &StateMean, covariance: &StateCovariance) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let vel = self.std_weight_velocity * h;
        let motion_cov = diagonal(&[pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        let new_mean = self.motion_mat.dot(mean);
        let new_covariance = self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + motion_cov;

        (new_mean, new_covariance)
    }

    /// Project the state distribution into measurement space.
    pub fn project(&self, mean: &StateMean, covariance: &StateCovariance) -> (Array1<f64>, Array2<f64>) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let innovation_cov = diagonal(&[pos, pos, 1e-1, pos]);

        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj =
            self.update_mat.dot(covariance).dot(&self.update_mat.t()) + innovation_cov;

        (mean_proj, covariance_proj)
    }

    /// Correct the state with a new measurement.
    ///
    /// Returns `None` when the innovation covariance is singular, which only
    /// happens for degenerate zero-height boxes; callers keep the prediction.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: [f64; 4],
    ) -> Option<(StateMean, StateCovariance)> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let innovation = Array1::from_vec(measurement.to_vec()) - projected_mean;

        // K = P * H^T * S^-1, with H = [I 0] so P * H^T is the first 4 columns of P.
        let s_inv = invert_4x4(&projected_cov)?;
        let kalman_gain = covariance.dot(&self.update_mat.t()).dot(&s_inv);

        let new_mean = mean + &kalman_gain.dot(&innovation);
        let new_covariance = covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        Some((new_mean, new_covariance))
    }
}

fn diagonal(std: &[f64]) -> Array2<f64> {
    let mut cov = Array2::zeros((std.len(), std.len()));
    for (i, s) in std.iter().enumerate() {
        cov[[i, i]] = s * s;
    }
    cov
}

/// Invert a 4x4 matrix through nalgebra to avoid a BLAS/LAPACK dependency.
fn invert_4x4(m: &Array2<f64>) -> Option<Array2<f64>> {
    let nm = nalgebra::Matrix4::from_fn(|i, j| m[[i, j]]);
    let inv = nm.try_inverse()?;
    Some(Array2::from_shape_fn((4, 4), |(i, j)| inv[(i, j)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_copies_measurement() {
        let kf = KalmanFilter::default();
        let (mean, cov) = kf.initiate([0.5, 0.4, 0.5, 0.2]);
        assert_eq!(mean[0], 0.5);
        assert_eq!(mean[4], 0.0);
        assert!(cov[[0, 0]] > 0.0);
    }

    #[test]
    fn test_constant_velocity_prediction() {
        let kf = KalmanFilter::default();
        let (mut mean, mut cov) = kf.initiate([0.10, 0.50, 0.5, 0.2]);
        // Feed a target moving +0.02 in x per frame.
        for step in 1..=10 {
            let (m, c) = kf.predict(&mean, &cov);
            let x = 0.10 + 0.02 * step as f64;
            let (m, c) = kf.update(&m, &c, [x, 0.50, 0.5, 0.2]).unwrap();
            mean = m;
            cov = c;
        }
        let (predicted, _) = kf.predict(&mean, &cov);
        // The estimate leads the last measurement (0.30) in the direction of motion.
        assert!(predicted[0] > 0.30 && predicted[0] < 0.34, "got {}", predicted[0]);
        assert!(predicted[4] > 0.01, "velocity {}", predicted[4]);
    }

    #[test]
    fn test_singular_covariance_is_rejected() {
        let kf = KalmanFilter::new(0.0, 0.0);
        let mean = Array1::zeros(8);
        let cov = Array2::zeros((8, 8));
        // With zero height and zero weights only the aspect term is non-zero.
        assert!(kf.update(&mean, &cov, [0.0; 4]).is_none());
    }
}
