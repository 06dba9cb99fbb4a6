//! Frame-relative delta transform.
//!
//! Operator input is expressed in a tool frame (the gripper); the control
//! loop consumes commands in the robot's root frame. The rotation between
//! the two is applied to the translation delta directly and to the rotation
//! delta through its axis-angle form.

use crate::DeltaAction;
use nalgebra::{Unit, UnitQuaternion, Vector3};

/// Below this rotation-vector magnitude the axis is ill-defined and the
/// Euler delta is zero rotation.
pub const ROTVEC_EPS: f32 = 1e-8;

/// Convert a rotation vector (axis-angle) into Euler XYZ angles.
///
/// Never divides by a near-zero norm: below [`ROTVEC_EPS`] the axis is
/// ill-defined and the delta is zero rotation.
pub fn rotvec_to_euler(rotvec: Vector3<f32>) -> Vector3<f32> {
    let norm = rotvec.norm();
    if norm <= ROTVEC_EPS {
        return Vector3::zeros();
    }
    let axis = Unit::new_unchecked(rotvec / norm);
    let quat = UnitQuaternion::from_axis_angle(&axis, norm);
    let (roll, pitch, yaw) = quat.euler_angles();
    Vector3::new(roll, pitch, yaw)
}

/// Rotate a delta action from the target frame into the root frame.
///
/// `frame_orientation` and `root_orientation` are the absolute orientations
/// of the two frames in a common world frame. Extra channels pass through
/// untouched. A delta with zero translation and zero rotation is returned
/// unchanged without touching the quaternions.
pub fn delta_to_root_frame(
    action: &DeltaAction,
    frame_orientation: &UnitQuaternion<f32>,
    root_orientation: &UnitQuaternion<f32>,
) -> DeltaAction {
    let translation = action.translation();
    let rotation = action.rotation();
    if translation == Vector3::zeros() && rotation == Vector3::zeros() {
        return *action;
    }
    let has_rotation = rotation != Vector3::zeros();

    let frame_to_root = root_orientation.inverse() * frame_orientation;
    let translation_root = frame_to_root * translation;
    let rotation_root = if has_rotation {
        let delta_quat = UnitQuaternion::from_euler_angles(rotation.x, rotation.y, rotation.z);
        let rotvec_root = frame_to_root * delta_quat.scaled_axis();
        rotvec_to_euler(rotvec_root)
    } else {
        Vector3::zeros()
    };

    DeltaAction::from_parts(translation_root, rotation_root, action.extras())
}
