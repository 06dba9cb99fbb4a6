//! Physical joint ranges surfaced to the control loop next to the action.

use serde::{Deserialize, Serialize};

/// Canonical joint names of a single SO-101 arm, in motor order.
pub const SINGLE_ARM_JOINT_NAMES: [&str; 6] = [
    "shoulder_pan",
    "shoulder_lift",
    "elbow_flex",
    "wrist_flex",
    "wrist_roll",
    "gripper",
];

/// Joint names of a bimanual pair: left arm first, then right.
pub fn bi_arm_joint_names() -> Vec<String> {
    let mut names = Vec::with_capacity(12);
    for side in ["left", "right"] {
        for joint in SINGLE_ARM_JOINT_NAMES {
            names.push(format!("{side}_{joint}"));
        }
    }
    names
}

/// Joint name to `(min, max)` range, constant for a robot model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorLimits(pub Vec<(String, (f32, f32))>);

impl MotorLimits {
    pub fn get(&self, joint: &str) -> Option<(f32, f32)> {
        self.0
            .iter()
            .find(|(name, _)| name == joint)
            .map(|(_, range)| *range)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, (f32, f32))> + '_ {
        self.0.iter()
    }
}

/// Limit tables attached to a command payload, mirroring the command shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitReport {
    Single(MotorLimits),
    Bimanual {
        left: MotorLimits,
        right: MotorLimits,
    },
}

/// Normalized ranges of the SO-101 follower the leader commands map onto:
/// arm joints span −100..100, the gripper 0..100.
pub fn so101_follower_limits() -> MotorLimits {
    MotorLimits(
        SINGLE_ARM_JOINT_NAMES
            .iter()
            .map(|name| {
                let range = if *name == "gripper" {
                    (0.0, 100.0)
                } else {
                    (-100.0, 100.0)
                };
                ((*name).to_string(), range)
            })
            .collect(),
    )
}
