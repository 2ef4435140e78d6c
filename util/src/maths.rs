//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Convert an angle in radians into degrees.
pub fn rad_to_deg<T>(rad: T) -> T
where
    T: Float
{
    rad.to_degrees()
}

/// Convert an angle in degrees into radians.
pub fn deg_to_rad<T>(deg: T) -> T
where
    T: Float
{
    deg.to_radians()
}

/// Returns true if `value` is within `tolerance` of `target`, comparing the absolute difference.
pub fn within_tol<T>(value: T, target: T, tolerance: T) -> bool
where
    T: Float
{
    (value - target).abs() <= tolerance
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_angle_round_trip() {
        let mut rad = -std::f64::consts::PI;
        while rad <= std::f64::consts::PI {
            let back = deg_to_rad(rad_to_deg(rad));

            assert!(within_tol(back, rad, 1e-12), "{} -> {}", rad, back);

            rad += 0.0137;
        }

        assert!(within_tol(rad_to_deg(std::f64::consts::FRAC_PI_2), 90.0, 1e-9));
    }

    #[test]
    fn test_within_tol() {
        assert!(within_tol(101.0, 100.0, 1.0));
        assert!(within_tol(99.0, 100.0, 1.0));
        assert!(!within_tol(98.9, 100.0, 1.0));
    }
}
