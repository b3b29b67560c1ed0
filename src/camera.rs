//! # Camera
//!
//! Polar/azimuth angles of the multi-view orbit, derived once from degree
//! inputs and reused to condition every diffusion call.

use std::f64::consts::TAU;

use crate::error::{Sv4dError, Sv4dResult};

/// Per source view camera angles in radians.
///
/// Azimuths are stored relative to the last source view (the input camera
/// of the multi-view model), wrapped into `[0, 2π)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraTrajectory {
    polars_rad: Vec<f64>,
    azimuths_rad: Vec<f64>,
}

/// Angle vectors for one diffusion call, flattened frame-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditioningAngles {
    pub polars_rad: Vec<f64>,
    pub azimuths_rad: Vec<f64>,
}

/// `linspace(0, 360, n + 1)[1..] mod 360`: an even orbit ending at the input camera.
pub fn default_azimuths_deg(n_views: usize) -> Vec<f64> {
    (1..=n_views)
        .map(|k| (360.0 * k as f64 / n_views as f64).rem_euclid(360.0))
        .collect()
}

fn wrap_tau(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid may round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

impl CameraTrajectory {
    /// Builds the trajectory of `n_views` source views.
    ///
    /// `elevations_deg` is either one value broadcast to every view or one
    /// value per view. `azimuths_deg` defaults to [`default_azimuths_deg`]
    /// and must otherwise hold exactly `n_views` values.
    pub fn from_degrees(
        elevations_deg: &[f64],
        azimuths_deg: Option<&[f64]>,
        n_views: usize,
    ) -> Sv4dResult<Self> {
        if n_views == 0 {
            return Err(Sv4dError::validation("camera trajectory needs at least one view"));
        }
        let elevations: Vec<f64> = match elevations_deg {
            [single] => vec![*single; n_views],
            values if values.len() == n_views => values.to_vec(),
            values => {
                return Err(Sv4dError::validation(format!(
                    "please provide 1 value, or a list of {n_views} values for elevations_deg, given {}",
                    values.len()
                )))
            }
        };
        let azimuths = match azimuths_deg {
            None => default_azimuths_deg(n_views),
            Some(values) if values.len() == n_views => values.to_vec(),
            Some(values) => {
                return Err(Sv4dError::validation(format!(
                    "please provide a list of {n_views} values for azimuths_deg, given {}",
                    values.len()
                )))
            }
        };
        if let Some(bad) = elevations.iter().chain(&azimuths).find(|a| !a.is_finite()) {
            return Err(Sv4dError::validation(format!(
                "camera angles must be finite, got {bad}"
            )));
        }

        let polars_rad = elevations.iter().map(|e| (90.0 - e).to_radians()).collect();
        let last = azimuths[n_views - 1];
        let azimuths_rad = azimuths
            .iter()
            .map(|a| (a - last).rem_euclid(360.0).to_radians())
            .map(wrap_tau)
            .collect();

        Ok(Self {
            polars_rad,
            azimuths_rad,
        })
    }

    pub fn n_views(&self) -> usize {
        self.polars_rad.len()
    }

    pub fn polars_rad(&self) -> &[f64] {
        &self.polars_rad
    }

    pub fn azimuths_rad(&self) -> &[f64] {
        &self.azimuths_rad
    }

    /// Angles of `views` replicated across `frames`, with azimuths made
    /// relative to `reference_view`.
    pub fn conditioning_angles(
        &self,
        views: &[usize],
        frames: usize,
        reference_view: usize,
    ) -> ConditioningAngles {
        let reference = self.azimuths_rad[reference_view];
        let mut polars_rad = Vec::with_capacity(views.len() * frames);
        let mut azimuths_rad = Vec::with_capacity(views.len() * frames);
        for _ in 0..frames {
            for &view in views {
                polars_rad.push(self.polars_rad[view]);
                azimuths_rad.push(wrap_tau(self.azimuths_rad[view] - reference));
            }
        }
        ConditioningAngles {
            polars_rad,
            azimuths_rad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBSAMPLED: [usize; 8] = [2, 5, 7, 9, 12, 14, 16, 19];

    #[test]
    fn default_orbit_ends_at_input_camera() {
        let azimuths = default_azimuths_deg(21);
        assert_eq!(azimuths.len(), 21);
        assert!((azimuths[0] - 360.0 / 21.0).abs() < 1e-12);
        assert_eq!(azimuths[20], 0.0);
    }

    #[test]
    fn scalar_elevation_broadcasts() {
        let camera = CameraTrajectory::from_degrees(&[10.0], None, 21).unwrap();
        assert_eq!(camera.n_views(), 21);
        for polar in camera.polars_rad() {
            assert!((polar - 80f64.to_radians()).abs() < 1e-12);
        }
    }

    #[test]
    fn azimuths_relative_to_last_view() {
        let camera = CameraTrajectory::from_degrees(&[0.0], Some(&[90.0, 180.0, 45.0][..]), 3).unwrap();
        let expected = [45f64, 135.0, 0.0];
        for (got, want) in camera.azimuths_rad().iter().zip(expected) {
            assert!((got - want.to_radians()).abs() < 1e-12);
        }
    }

    #[test]
    fn normalized_azimuths_stay_in_range() {
        let azimuths: Vec<f64> = (0..21).map(|k| -400.0 + 37.5 * k as f64).collect();
        let camera = CameraTrajectory::from_degrees(&[5.0], Some(azimuths.as_slice()), 21).unwrap();
        for azimuth in camera.azimuths_rad() {
            assert!((0.0..TAU).contains(azimuth), "{azimuth} outside [0, 2pi)");
        }
        for reference in 0..21 {
            let angles = camera.conditioning_angles(&SUBSAMPLED, 5, reference);
            assert!(angles.azimuths_rad.iter().all(|a| (0.0..TAU).contains(a)));
        }
    }

    #[test]
    fn conditioning_angles_repeat_per_frame() {
        let camera = CameraTrajectory::from_degrees(&[10.0], None, 21).unwrap();
        let angles = camera.conditioning_angles(&SUBSAMPLED, 5, 0);
        assert_eq!(angles.polars_rad.len(), 40);
        assert_eq!(&angles.azimuths_rad[..8], &angles.azimuths_rad[32..]);
        // source view 0 is one orbit step away from the input camera
        let expected = camera.azimuths_rad()[2] - camera.azimuths_rad()[0];
        assert!((angles.azimuths_rad[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn malformed_lists_fail_validation() {
        let err = CameraTrajectory::from_degrees(&[10.0, 20.0], None, 21).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("given 2"));

        let err = CameraTrajectory::from_degrees(&[10.0], Some(&[0.0; 20][..]), 21).unwrap_err();
        assert!(err.is_validation());

        let err = CameraTrajectory::from_degrees(&[f64::NAN], None, 21).unwrap_err();
        assert!(err.is_validation());
    }
}
