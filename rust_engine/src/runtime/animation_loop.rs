//! 动画循环
//!
//! 模型与动作以 `Arc` 共享，求值期间只读。物理世界只在两次并行汇合之间由调用线程修改。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Mat4;
use rayon::prelude::*;

use crate::animation::Motion;
use crate::deform::{BoneDeltas, Deformer};
use crate::model::Model;
use crate::morph::MorphDeltas;
use crate::physics::{MMDPhysics, PhysicsConfig};

/// 循环参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopOptions {
    pub physics_enabled: bool,
    /// [`AnimationLoop::run`] 每帧推进的秒数
    pub time_step: f32,
    /// 每次步进的最大子步数，0 表示按 dt 单步
    pub max_substeps: u32,
    pub fixed_step: f32,
}

impl LoopOptions {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            physics_enabled: true,
            time_step: 1.0 / config.fps.max(1.0),
            max_substeps: config.max_substeps,
            fixed_step: config.fixed_time_step,
        }
    }
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::from_config(&PhysicsConfig::default())
    }
}

/// 渲染端
pub trait FrameSink {
    fn submit(&mut self, model_index: usize, bones: &BoneDeltas, morphs: &MorphDeltas);
}

impl<F> FrameSink for F
where
    F: FnMut(usize, &BoneDeltas, &MorphDeltas),
{
    fn submit(&mut self, model_index: usize, bones: &BoneDeltas, morphs: &MorphDeltas) {
        self(model_index, bones, morphs)
    }
}

/// 单个模型一帧的最终结果
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub model_index: usize,
    pub bones: BoneDeltas,
    pub morphs: MorphDeltas,
}

struct Slot {
    model: Arc<Model>,
    motion: Arc<Motion>,
}

/// 多模型动画循环
pub struct AnimationLoop {
    slots: BTreeMap<usize, Slot>,
    next_index: usize,
    physics: MMDPhysics,
    options: LoopOptions,
    shutdown: Arc<AtomicBool>,
    reset_requested: AtomicBool,
}

impl AnimationLoop {
    /// 使用全局物理配置创建
    pub fn new(options: LoopOptions) -> Self {
        Self::with_physics(options, MMDPhysics::new())
    }

    pub fn with_physics(options: LoopOptions, physics: MMDPhysics) -> Self {
        Self {
            slots: BTreeMap::new(),
            next_index: 0,
            physics,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
            reset_requested: AtomicBool::new(false),
        }
    }

    /// 添加模型，返回模型 INDEX。刚体在下一次带物理的 tick 中按物理前姿势创建。
    pub fn add_model(&mut self, model: Arc<Model>) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        log::info!(
            "[循环] 添加模型 {}: {} ({} 骨骼, {} 刚体)",
            index,
            model.name,
            model.skeleton().bone_count(),
            model.rigid_bodies().len()
        );
        self.slots.insert(
            index,
            Slot {
                model,
                motion: Arc::new(Motion::new()),
            },
        );
        index
    }

    pub fn remove_model(&mut self, index: usize) -> Option<Arc<Model>> {
        let slot = self.slots.remove(&index)?;
        self.physics.remove_model(index);
        Some(slot.model)
    }

    /// 设置模型的动作，`None` 回到初始姿势
    pub fn set_motion(&mut self, index: usize, motion: Option<Arc<Motion>>) -> bool {
        let Some(slot) = self.slots.get_mut(&index) else {
            return false;
        };
        let motion = motion.unwrap_or_default();
        let unknown = Deformer::new(&slot.model).unknown_bone_names(&motion);
        if !unknown.is_empty() {
            log::debug!("[循环] 模型 {} 中不存在的骨骼将被忽略: {:?}", index, unknown);
        }
        slot.motion = motion;
        true
    }

    pub fn model(&self, index: usize) -> Option<&Arc<Model>> {
        self.slots.get(&index).map(|s| &s.model)
    }

    pub fn motion(&self, index: usize) -> Option<&Arc<Motion>> {
        self.slots.get(&index).map(|s| &s.motion)
    }

    pub fn model_count(&self) -> usize {
        self.slots.len()
    }

    pub fn physics(&self) -> &MMDPhysics {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut MMDPhysics {
        &mut self.physics
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: LoopOptions) {
        self.options = options;
    }

    /// 下一次带物理的 tick 先重建物理世界
    pub fn request_physics_reset(&self) {
        self.reset_requested.store(true, Ordering::SeqCst);
    }

    /// 其它线程可通过该句柄请求停止
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// 求值一帧，结果按模型 INDEX 排序
    ///
    /// 停止标志在每个汇合点检查，已设置时返回 None。
    pub fn tick(&mut self, frame: f32, dt: f32) -> Option<Vec<FrameOutput>> {
        if self.is_shutdown() {
            return None;
        }
        let slots: Vec<(usize, &Slot)> = self.slots.iter().map(|(i, s)| (*i, s)).collect();

        if !self.options.physics_enabled {
            let outputs: Vec<FrameOutput> = slots
                .par_iter()
                .map(|(index, slot)| {
                    let (bones, morphs) = Deformer::new(&slot.model).deform(&slot.motion, frame);
                    FrameOutput {
                        model_index: *index,
                        bones,
                        morphs,
                    }
                })
                .collect();
            return (!self.shutdown.load(Ordering::SeqCst)).then_some(outputs);
        }

        // 物理前
        let pre: Vec<(usize, &Slot, BoneDeltas, MorphDeltas)> = slots
            .par_iter()
            .map(|(index, slot)| {
                let (bones, morphs) =
                    Deformer::new(&slot.model).deform_before_physics(&slot.motion, frame);
                (*index, *slot, bones, morphs)
            })
            .collect();
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }

        if self.reset_requested.swap(false, Ordering::SeqCst) {
            let gravity = self.physics.config().gravity;
            self.physics.reset(gravity);
        }

        for (index, slot, bones, _) in &pre {
            let globals = bones.global_matrices();
            if self.physics.has_model(*index) {
                self.physics.push_kinematic(*index, &globals);
            } else {
                self.physics.add_model(*index, &slot.model, &globals);
            }
        }

        let (max_substeps, fixed_step) = (self.options.max_substeps, self.options.fixed_step);
        self.physics.step(dt, max_substeps, fixed_step);

        let pulled: Vec<HashMap<usize, Mat4>> = pre
            .iter()
            .map(|(index, ..)| self.physics.pull_dynamic(*index))
            .collect();

        // 物理后
        let outputs: Vec<FrameOutput> = pre
            .into_par_iter()
            .zip(pulled.into_par_iter())
            .map(|((index, slot, mut bones, morphs), physics)| {
                Deformer::new(&slot.model).deform_after_physics(&slot.motion, frame, &mut bones, &physics);
                FrameOutput {
                    model_index: index,
                    bones,
                    morphs,
                }
            })
            .collect();
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }
        Some(outputs)
    }

    /// 依次求值各帧并交给渲染端，返回完成的帧数
    pub fn run<I>(&mut self, frames: I, sink: &mut dyn FrameSink) -> usize
    where
        I: IntoIterator<Item = f32>,
    {
        let dt = self.options.time_step;
        let mut completed = 0;
        for frame in frames {
            let Some(outputs) = self.tick(frame, dt) else {
                log::info!("[循环] 已停止，完成 {} 帧", completed);
                break;
            };
            for output in &outputs {
                sink.submit(output.model_index, &output.bones, &output.morphs);
            }
            completed += 1;
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::BoneKeyframe;
    use crate::model::{JointDef, ModelParts, PhysicsMode, RigidBodyDef, RigidBodyShape};
    use crate::skeleton::Bone;
    use glam::{Quat, Vec3};

    fn arm_motion() -> Arc<Motion> {
        let mut motion = Motion::new();
        let mut first = BoneKeyframe::new(0);
        first.rotation = Quat::IDENTITY;
        let mut last = BoneKeyframe::new(30);
        last.rotation = Quat::from_rotation_z(0.8);
        motion.insert_bone_keyframe("腕", first);
        motion.insert_bone_keyframe("腕", last);
        motion.insert_bone_keyframe("存在しない", BoneKeyframe::new(0));
        Arc::new(motion)
    }

    fn arm_model() -> Arc<Model> {
        Arc::new(
            Model::from_parts(ModelParts {
                name: "arm".to_string(),
                bones: vec![
                    Bone::new(0, "腕", Vec3::new(0.0, 10.0, 0.0)),
                    Bone::new(0, "手", Vec3::new(2.0, 10.0, 0.0)).with_parent(0),
                ],
                ..ModelParts::default()
            })
            .unwrap()
            .0,
        )
    }

    fn hair_model() -> Arc<Model> {
        let mut head = RigidBodyDef::new("頭", RigidBodyShape::Sphere { radius: 0.5 }, PhysicsMode::Static);
        head.bone_index = Some(0);
        head.position = Vec3::new(0.0, 10.0, 0.0);
        let mut hair = RigidBodyDef::new("髪", RigidBodyShape::Sphere { radius: 0.3 }, PhysicsMode::Dynamic);
        hair.bone_index = Some(1);
        hair.position = Vec3::new(0.0, 9.0, 0.0);
        hair.collision_mask = 0;
        let mut joint = JointDef::new("髪J", 0, 1);
        joint.position = Vec3::new(0.0, 9.5, 0.0);
        Arc::new(
            Model::from_parts(ModelParts {
                name: "hair".to_string(),
                bones: vec![
                    Bone::new(0, "頭", Vec3::new(0.0, 10.0, 0.0)),
                    Bone::new(0, "髪", Vec3::new(0.0, 9.0, 0.0)).with_parent(0),
                ],
                rigid_bodies: vec![head, hair],
                joints: vec![joint],
                ..ModelParts::default()
            })
            .unwrap()
            .0,
        )
    }

    fn physics_loop() -> AnimationLoop {
        let _ = env_logger::builder().is_test(true).try_init();
        AnimationLoop::with_physics(
            LoopOptions::default(),
            MMDPhysics::with_config(PhysicsConfig::default()),
        )
    }

    #[test]
    fn test_without_physics_matches_deformer() {
        let model = arm_model();
        let motion = arm_motion();
        let mut animation = AnimationLoop::with_physics(
            LoopOptions {
                physics_enabled: false,
                ..LoopOptions::default()
            },
            MMDPhysics::with_config(PhysicsConfig::default()),
        );
        let index = animation.add_model(Arc::clone(&model));
        assert!(animation.set_motion(index, Some(Arc::clone(&motion))));

        let outputs = animation.tick(15.0, 1.0 / 30.0).unwrap();
        let (expected, _) = Deformer::new(&model).deform(&motion, 15.0);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].bones.global_matrices(), expected.global_matrices());
        assert_eq!(animation.physics().rigid_body_count(), 0);
    }

    #[test]
    fn test_physics_tick_creates_bodies_and_stays_finite() {
        let mut animation = physics_loop();
        let index = animation.add_model(hair_model());
        for frame in 0..30 {
            let outputs = animation.tick(frame as f32, 1.0 / 30.0).unwrap();
            assert!(outputs[0]
                .bones
                .global_matrices()
                .iter()
                .all(|m| m.is_finite()));
        }
        assert!(animation.physics().has_model(index));
        assert_eq!(animation.physics().rigid_body_count(), 2);
        assert_eq!(animation.physics().joint_count(), 1);
    }

    #[test]
    fn test_reset_rebuilds_from_current_pose() {
        let mut animation = physics_loop();
        let index = animation.add_model(hair_model());
        animation.tick(0.0, 1.0 / 30.0).unwrap();

        animation.request_physics_reset();
        animation.tick(1.0, 1.0 / 30.0).unwrap();
        assert!(animation.physics().has_model(index));
        assert_eq!(animation.physics().rigid_body_count(), 2);
    }

    #[test]
    fn test_outputs_sorted_by_model_index() {
        let mut animation = physics_loop();
        let a = animation.add_model(arm_model());
        let b = animation.add_model(hair_model());
        let c = animation.add_model(arm_model());
        animation.set_motion(c, Some(arm_motion()));
        let outputs = animation.tick(10.0, 1.0 / 30.0).unwrap();
        let indices: Vec<usize> = outputs.iter().map(|o| o.model_index).collect();
        assert_eq!(indices, vec![a, b, c]);
    }

    #[test]
    fn test_same_input_same_output() {
        let run = || {
            let mut animation = physics_loop();
            animation.add_model(hair_model());
            let mut last = Vec::new();
            for frame in 0..20 {
                last = animation.tick(frame as f32, 1.0 / 60.0).unwrap();
            }
            last[0].bones.global_matrices()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_run_feeds_sink_until_shutdown() {
        let mut animation = physics_loop();
        animation.add_model(arm_model());
        animation.add_model(hair_model());

        let mut submitted = 0;
        let mut sink = |_: usize, bones: &BoneDeltas, _: &MorphDeltas| {
            assert!(!bones.is_empty());
            submitted += 1;
        };
        let completed = animation.run((0..5).map(|f| f as f32), &mut sink);
        assert_eq!(completed, 5);
        assert_eq!(submitted, 10);

        animation.shutdown_handle().store(true, Ordering::SeqCst);
        assert!(animation.tick(6.0, 1.0 / 30.0).is_none());
        let mut ignored = |_: usize, _: &BoneDeltas, _: &MorphDeltas| {};
        assert_eq!(animation.run([7.0, 8.0], &mut ignored), 0);
    }

    #[test]
    fn test_remove_model_drops_physics() {
        let mut animation = physics_loop();
        let index = animation.add_model(hair_model());
        animation.tick(0.0, 1.0 / 30.0).unwrap();
        assert!(animation.remove_model(index).is_some());
        assert!(!animation.physics().has_model(index));
        assert_eq!(animation.model_count(), 0);
        assert!(!animation.set_motion(index, None));
    }
}
