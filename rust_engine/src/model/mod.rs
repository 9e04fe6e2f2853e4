//! MMD 模型数据
//!
//! 骨骼、Morph、材质、刚体与关节的静态定义，加载后只读。

mod material;
#[allow(clippy::module_inception)]
mod model;
mod rigid_body;

pub use material::{MaterialValues, MmdMaterial};
pub use model::{Model, ModelParts, ModelWarning, ModelWarnings};
pub use rigid_body::{JointDef, PhysicsMode, RigidBodyDef, RigidBodyShape};
