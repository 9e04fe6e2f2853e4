//! MMD 物理世界
//!
//! 一个 Rapier 世界承载多个模型的刚体与关节。地面是 Y = 0 的无限静态平面。
//!
//! ## Bullet → Rapier 映射
//! | Bullet | Rapier |
//! |--------|--------|
//! | btDiscreteDynamicsWorld | PhysicsPipeline + RigidBodySet + ColliderSet + ImpulseJointSet |
//! | btGeneric6DofSpringConstraint | GenericJoint + limits / motors |
//! | btStaticPlaneShape | ColliderBuilder::halfspace |
//! | stepSimulation(dt, maxSub, fixed) | 时间累积器 + 固定子步 |

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;

use glam::{Mat4, Vec3};
use rapier3d::prelude::*;

use crate::model::Model;

use super::config::{get_config, PhysicsConfig};
use super::mmd_joint::MMDJoint;
use super::mmd_rigid_body::{isometry_to_mat4, rapier_to_vec3, vec3_to_rapier, MMDRigidBody};
use super::wind;

/// 地面所在的碰撞组
const GROUND_GROUP: u32 = 1 << 15;

/// 一个模型在物理世界中的刚体与关节
#[derive(Default)]
pub struct PhysicsModel {
    pub rigid_bodies: Vec<MMDRigidBody>,
    pub joints: Vec<MMDJoint>,
}

/// MMD 物理世界
pub struct MMDPhysics {
    pub physics_pipeline: PhysicsPipeline,
    pub integration_parameters: IntegrationParameters,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub ground_handle: RigidBodyHandle,
    /// 模型 INDEX → 刚体与关节
    pub models: BTreeMap<usize, PhysicsModel>,
    /// 求解器重力（已放大）
    pub gravity: Vector<Real>,
    config: PhysicsConfig,
    /// 尚未消化的时间
    time_accumulator: f32,
    /// 风的累计时间
    wind_time: f32,
}

impl MMDPhysics {
    /// 使用全局配置创建
    pub fn new() -> Self {
        Self::with_config(get_config())
    }

    pub fn with_config(config: PhysicsConfig) -> Self {
        let mut rigid_body_set = RigidBodySet::new();
        let mut collider_set = ColliderSet::new();
        let ground_handle = insert_ground(&mut rigid_body_set, &mut collider_set);

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.fixed_time_step;
        integration_parameters.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN);

        let gravity = vec3_to_rapier(config.solver_gravity());
        if config.debug_log {
            log::info!(
                "[物理配置] 固定步长={}, 重力={:?}, 求解器迭代={}",
                config.fixed_time_step,
                config.solver_gravity(),
                config.solver_iterations
            );
        }

        Self {
            physics_pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set,
            collider_set,
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            ground_handle,
            models: BTreeMap::new(),
            gravity,
            config,
            time_accumulator: 0.0,
            wind_time: 0.0,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PhysicsConfig {
        &mut self.config
    }

    /// 添加模型的刚体与关节
    ///
    /// `bone_globals` 为各骨骼当前的全局变换，刚体初始位置为 `bone_global · offset`。
    /// 同一 INDEX 已存在时先移除旧的。
    pub fn add_model(&mut self, model_index: usize, model: &Model, bone_globals: &[Mat4]) {
        self.remove_model(model_index);

        let skeleton = model.skeleton();
        let mut physics_model = PhysicsModel::default();

        for def in model.rigid_bodies() {
            let bone_rest = def.bone_index.map(|b| skeleton.rest_global(b));
            let bone_global = def.bone_index.and_then(|b| bone_globals.get(b).copied()).or(bone_rest);
            let mut rb = MMDRigidBody::from_def(def, bone_rest, bone_global);

            let handle = self.rigid_body_set.insert(rb.build_rigid_body(&self.config));
            rb.rigid_body_handle = Some(handle);
            let collider = rb.build_collider(&self.config);
            rb.collider_handle =
                Some(self.collider_set.insert_with_parent(collider, handle, &mut self.rigid_body_set));
            physics_model.rigid_bodies.push(rb);
        }

        if self.config.joints_enabled {
            for def in model.joints() {
                let (Some(a), Some(b)) = (
                    physics_model.rigid_bodies.get(def.rigid_body_a),
                    physics_model.rigid_bodies.get(def.rigid_body_b),
                ) else {
                    continue;
                };
                let (Some(handle_a), Some(handle_b)) = (a.rigid_body_handle, b.rigid_body_handle) else {
                    continue;
                };
                let mut joint = MMDJoint::from_def(def, a.rest_matrix, b.rest_matrix);
                let handle =
                    self.impulse_joint_set
                        .insert(handle_a, handle_b, joint.build_joint(&self.config), true);
                joint.joint_handle = Some(handle);
                physics_model.joints.push(joint);
            }
        }

        let dynamic = physics_model.rigid_bodies.iter().filter(|rb| rb.is_dynamic()).count();
        log::info!(
            "[物理] 模型 {} 「{}」: 刚体 {} (动态 {}), 关节 {}",
            model_index,
            model.name,
            physics_model.rigid_bodies.len(),
            dynamic,
            physics_model.joints.len()
        );
        self.models.insert(model_index, physics_model);
    }

    /// 移除模型
    pub fn remove_model(&mut self, model_index: usize) {
        let Some(physics_model) = self.models.remove(&model_index) else {
            return;
        };
        for rb in physics_model.rigid_bodies {
            if let Some(handle) = rb.rigid_body_handle {
                self.rigid_body_set.remove(
                    handle,
                    &mut self.island_manager,
                    &mut self.collider_set,
                    &mut self.impulse_joint_set,
                    &mut self.multibody_joint_set,
                    true,
                );
            }
        }
    }

    pub fn has_model(&self, model_index: usize) -> bool {
        self.models.contains_key(&model_index)
    }

    /// 把运动学刚体移动到骨骼给出的位置
    ///
    /// 位置跟随骨骼的动态刚体只记录骨骼位置。
    pub fn push_kinematic(&mut self, model_index: usize, bone_globals: &[Mat4]) {
        self.sync_kinematic(model_index, bone_globals, false);
    }

    /// 与 [`push_kinematic`](Self::push_kinematic) 相同，但直接瞬移，不产生速度
    pub fn teleport_kinematic(&mut self, model_index: usize, bone_globals: &[Mat4]) {
        self.sync_kinematic(model_index, bone_globals, true);
    }

    fn sync_kinematic(&mut self, model_index: usize, bone_globals: &[Mat4], teleport: bool) {
        let Some(physics_model) = self.models.get_mut(&model_index) else {
            return;
        };
        for rb in &mut physics_model.rigid_bodies {
            let Some(bone_global) = rb.bone_index.and_then(|b| bone_globals.get(b)) else {
                continue;
            };
            rb.bone_position = bone_global.w_axis.truncate();
            if rb.is_dynamic() {
                continue;
            }
            let Some(body) = rb.rigid_body_handle.and_then(|h| self.rigid_body_set.get_mut(h)) else {
                continue;
            };
            let pose = rb.compute_world_transform(*bone_global);
            if teleport {
                body.set_position(pose, true);
            } else {
                body.set_next_kinematic_position(pose);
            }
        }
    }

    /// 推进模拟
    ///
    /// 时间先累积，按 `fixed_step` 切成子步，子步数不超过 `max_substeps`，
    /// 超出部分丢弃。`max_substeps` 为 0 时按 `dt` 单步推进。
    /// 返回实际执行的子步数。
    pub fn step(&mut self, dt: f32, max_substeps: u32, fixed_step: f32) -> u32 {
        if !(dt > 0.0) {
            return 0;
        }
        self.apply_wind_forces(dt);

        let steps = if max_substeps == 0 || !(fixed_step > 0.0) {
            self.step_once(dt);
            1
        } else {
            self.time_accumulator += dt;
            let needed = (self.time_accumulator / fixed_step).floor();
            self.time_accumulator -= needed * fixed_step;
            let steps = (needed as u32).min(max_substeps);
            for _ in 0..steps {
                self.step_once(fixed_step);
            }
            steps
        };

        self.clear_forces();
        if self.config.debug_log {
            log::debug!("[物理] dt={:.4} 子步 {}", dt, steps);
        }
        steps
    }

    fn step_once(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// 对动态刚体施加风力，力保持到本次 step 结束
    fn apply_wind_forces(&mut self, dt: f32) {
        let wind_config = &self.config.wind;
        if !wind_config.enabled || wind_config.speed == 0.0 {
            return;
        }
        self.wind_time += dt;
        let wind_velocity = wind::wind_velocity(wind_config, self.wind_time);

        for physics_model in self.models.values() {
            for rb in physics_model.rigid_bodies.iter().filter(|rb| rb.is_dynamic()) {
                let Some(body) = rb.rigid_body_handle.and_then(|h| self.rigid_body_set.get_mut(h)) else {
                    continue;
                };
                let velocity = rapier_to_vec3(body.linvel());
                if let Some(force) = wind::wind_force(wind_config, wind_velocity, velocity, body.mass(), &rb.shape) {
                    body.add_force(vec3_to_rapier(force), true);
                }
            }
        }
    }

    fn clear_forces(&mut self) {
        for physics_model in self.models.values() {
            for rb in &physics_model.rigid_bodies {
                if let Some(body) = rb.rigid_body_handle.and_then(|h| self.rigid_body_set.get_mut(h)) {
                    body.reset_forces(false);
                }
            }
        }
    }

    /// 动态刚体求解后的骨骼全局变换
    pub fn pull_dynamic(&self, model_index: usize) -> HashMap<usize, Mat4> {
        let mut result = HashMap::new();
        let Some(physics_model) = self.models.get(&model_index) else {
            return result;
        };
        for rb in physics_model.rigid_bodies.iter().filter(|rb| rb.is_dynamic()) {
            let (Some(bone), Some(body)) = (
                rb.bone_index,
                rb.rigid_body_handle.and_then(|h| self.rigid_body_set.get(h)),
            ) else {
                continue;
            };
            let matrix = rb.compute_bone_transform(body.position());
            if matrix.is_finite() {
                result.insert(bone, matrix);
            }
        }
        result
    }

    /// 刚体当前的世界变换，按模型内的刚体顺序
    pub fn body_transforms(&self, model_index: usize) -> Vec<Mat4> {
        self.models.get(&model_index).map_or_else(Vec::new, |m| {
            m.rigid_bodies
                .iter()
                .filter_map(|rb| rb.rigid_body_handle.and_then(|h| self.rigid_body_set.get(h)))
                .map(|body| isometry_to_mat4(body.position()))
                .collect()
        })
    }

    /// 拆除整个世界并以新的重力重建，所有模型需要重新添加
    pub fn reset(&mut self, gravity: Vec3) {
        let mut config = self.config.clone();
        config.gravity = gravity;
        let model_count = self.models.len();
        *self = Self::with_config(config);
        log::info!("[物理] 世界已重建，移除 {} 个模型", model_count);
    }

    pub fn rigid_body_count(&self) -> usize {
        self.models.values().map(|m| m.rigid_bodies.len()).sum()
    }

    pub fn joint_count(&self) -> usize {
        self.models.values().map(|m| m.joints.len()).sum()
    }
}

impl Default for MMDPhysics {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_ground(bodies: &mut RigidBodySet, colliders: &mut ColliderSet) -> RigidBodyHandle {
    let ground = bodies.insert(RigidBodyBuilder::fixed().build());
    let collider = ColliderBuilder::halfspace(Vector::y_axis())
        .collision_groups(InteractionGroups::new(
            Group::from_bits_truncate(GROUND_GROUP),
            Group::from_bits_truncate(0xFFFF),
        ))
        .build();
    colliders.insert_with_parent(collider, ground, bodies);
    ground
}
