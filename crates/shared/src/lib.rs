//! Vocabulary shared by every crate in the workspace: identifiers, the
//! command model reported by the robot, and robot-server error bodies.

pub mod domain;
pub mod error;
pub mod protocol;
