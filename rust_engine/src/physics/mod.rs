//! MMD 物理系统
//!
//! 使用 Rapier3D 实现，刚体、关节与风力都在同一个世界中模拟。
//!
//! | Bullet | Rapier |
//! |--------|--------|
//! | btRigidBody | RigidBody + Collider |
//! | btGeneric6DofSpringConstraint | GenericJoint with limits/motors |
//! | btSphereShape / btBoxShape / btCapsuleShape | ball / cuboid / capsule_y |

pub mod config;
mod mmd_joint;
mod mmd_physics;
mod mmd_rigid_body;
pub mod wind;

pub use config::{get_config, reset_config, set_config, PhysicsConfig, WindConfig};
pub use mmd_joint::MMDJoint;
pub use mmd_physics::{MMDPhysics, PhysicsModel};
pub use mmd_rigid_body::{isometry_to_mat4, mat4_to_isometry, MMDRigidBody};
