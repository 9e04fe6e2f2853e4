//! 动画轨道
//!
//! 存储单个骨骼、Morph 或相机的所有关键帧，并提供查找和插值功能。
//! 曲线取自到达帧（`next`）的插值块。

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use super::keyframe::{BoneKeyframe, CameraKeyframe, IkKeyframe, Keyframe, MorphKeyframe};
use crate::math::{lerp, quat_from_radians, quat_to_radians, slerp_shortest};

/// 骨骼帧变换结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneFrameTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for BoneFrameTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// 相机帧变换结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrameTransform {
    pub look_at: Vec3,
    pub rotation: Quat,
    pub distance: f32,
    pub fov: f32,
    pub perspective_off: bool,
}

impl Default for CameraFrameTransform {
    fn default() -> Self {
        Self {
            look_at: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            distance: 0.0,
            fov: 30.0,
            perspective_off: false,
        }
    }
}

/// 动画轨道 trait
pub trait MotionTrack {
    type Sample;

    /// 求值指定帧（允许小数帧）
    fn seek(&self, frame: f32) -> Self::Sample;
}

/// 按帧号排序的稀疏关键帧容器
#[derive(Debug, Clone)]
pub struct Track<K> {
    keyframes: BTreeMap<u32, K>,
}

impl<K> Default for Track<K> {
    fn default() -> Self {
        Self {
            keyframes: BTreeMap::new(),
        }
    }
}

impl<K: Keyframe> Track<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入关键帧，同一帧号后写入者覆盖
    pub fn insert(&mut self, keyframe: K) -> Option<K> {
        self.keyframes.insert(keyframe.frame(), keyframe)
    }

    pub fn remove(&mut self, frame: u32) -> Option<K> {
        self.keyframes.remove(&frame)
    }

    pub fn get(&self, frame: u32) -> Option<&K> {
        self.keyframes.get(&frame)
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// 按帧号升序遍历
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keyframes.values()
    }

    pub fn max_frame(&self) -> u32 {
        self.keyframes.keys().next_back().copied().unwrap_or(0)
    }

    /// 查找夹住 `frame` 的前后关键帧
    ///
    /// 早于首帧时两者都是首帧，达到或超过末帧时两者都是末帧，
    /// 恰好落在关键帧上时两者相同。
    pub fn lookup_at(&self, frame: f32) -> Option<(&K, &K)> {
        let first = self.keyframes.values().next()?;
        let last = self.keyframes.values().next_back()?;
        if !(frame >= first.frame() as f32) {
            return Some((first, first));
        }
        if frame >= last.frame() as f32 {
            return Some((last, last));
        }
        let floor = frame.floor() as u32;
        let ceil = frame.ceil() as u32;
        let prev = self.keyframes.range(..=floor).next_back().map(|(_, k)| k);
        let next = self.keyframes.range(ceil..).next().map(|(_, k)| k);
        match (prev, next) {
            (Some(p), Some(n)) => Some((p, n)),
            (Some(p), None) => Some((p, p)),
            (None, Some(n)) => Some((n, n)),
            (None, None) => None,
        }
    }

    /// 取 `frame` 之前（含）最近的关键帧，早于首帧时取首帧
    pub fn at_or_before(&self, frame: f32) -> Option<&K> {
        self.lookup_at(frame).map(|(prev, _)| prev)
    }
}

/// 两帧之间的线性比例，区间为空时为 0
pub fn frame_ratio(prev: u32, next: u32, frame: f32) -> f32 {
    if next > prev {
        ((frame - prev as f32) / (next - prev) as f32).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl MotionTrack for Track<BoneKeyframe> {
    type Sample = BoneFrameTransform;

    fn seek(&self, frame: f32) -> BoneFrameTransform {
        let Some((prev, next)) = self.lookup_at(frame) else {
            return BoneFrameTransform::default();
        };
        if prev.frame == next.frame {
            return BoneFrameTransform {
                position: prev.position,
                rotation: prev.rotation,
            };
        }
        interpolate_bone(prev, next, frame)
    }
}

/// 骨骼帧插值：移动按 X/Y/Z 三条曲线分量插值，旋转按旋转曲线重映射后走最短弧 slerp
pub fn interpolate_bone(prev: &BoneKeyframe, next: &BoneKeyframe, frame: f32) -> BoneFrameTransform {
    let start = prev.frame as f32;
    let end = next.frame as f32;
    let tx = next.curve_x().evaluate_between(start, frame, end);
    let ty = next.curve_y().evaluate_between(start, frame, end);
    let tz = next.curve_z().evaluate_between(start, frame, end);
    let tr = next.curve_rotation().evaluate_between(start, frame, end);

    BoneFrameTransform {
        position: Vec3::new(
            lerp(prev.position.x, next.position.x, tx),
            lerp(prev.position.y, next.position.y, ty),
            lerp(prev.position.z, next.position.z, tz),
        ),
        rotation: slerp_shortest(prev.rotation, next.rotation, tr),
    }
}

impl MotionTrack for Track<MorphKeyframe> {
    type Sample = f32;

    fn seek(&self, frame: f32) -> f32 {
        match self.lookup_at(frame) {
            Some((prev, next)) if prev.frame == next.frame => prev.ratio,
            Some((prev, next)) => {
                lerp(prev.ratio, next.ratio, frame_ratio(prev.frame, next.frame, frame))
            }
            None => 0.0,
        }
    }
}

impl MotionTrack for Track<CameraKeyframe> {
    type Sample = CameraFrameTransform;

    fn seek(&self, frame: f32) -> CameraFrameTransform {
        let Some((prev, next)) = self.lookup_at(frame) else {
            return CameraFrameTransform::default();
        };
        let prev_rot = quat_from_radians(prev.rotation.x, prev.rotation.y, prev.rotation.z);
        if prev.frame == next.frame {
            return CameraFrameTransform {
                look_at: prev.look_at,
                rotation: prev_rot,
                distance: prev.distance,
                fov: prev.fov as f32,
                perspective_off: prev.perspective_off,
            };
        }

        let start = prev.frame as f32;
        let end = next.frame as f32;
        let t: Vec<f32> = (0..6)
            .map(|c| next.curve(c).evaluate_between(start, frame, end))
            .collect();
        let next_rot = quat_from_radians(next.rotation.x, next.rotation.y, next.rotation.z);

        CameraFrameTransform {
            look_at: Vec3::new(
                lerp(prev.look_at.x, next.look_at.x, t[0]),
                lerp(prev.look_at.y, next.look_at.y, t[1]),
                lerp(prev.look_at.z, next.look_at.z, t[2]),
            ),
            rotation: slerp_shortest(prev_rot, next_rot, t[3]),
            distance: lerp(prev.distance, next.distance, t[4]),
            fov: lerp(prev.fov as f32, next.fov as f32, t[5]),
            perspective_off: next.perspective_off,
        }
    }
}

impl CameraFrameTransform {
    /// 旋转的弧度欧拉角
    pub fn euler_radians(&self) -> Vec3 {
        quat_to_radians(self.rotation)
    }
}

impl MotionTrack for Track<IkKeyframe> {
    type Sample = Option<IkKeyframe>;

    /// IK 开关不插值，取之前最近的一帧
    fn seek(&self, frame: f32) -> Option<IkKeyframe> {
        self.at_or_before(frame).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::keyframe::INITIAL_BONE_CURVES;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn bone(frame: u32, x: f32) -> BoneKeyframe {
        let mut kf = BoneKeyframe::new(frame);
        kf.position = Vec3::new(x, 0.0, 0.0);
        kf
    }

    #[test]
    fn test_insert_last_write_wins() {
        let mut track = Track::new();
        track.insert(MorphKeyframe::new(5, 0.1));
        track.insert(MorphKeyframe::new(5, 0.7));
        assert_eq!(track.len(), 1);
        assert_eq!(track.get(5).map(|k| k.ratio), Some(0.7));
    }

    #[test]
    fn test_lookup_clamps_and_exact() {
        let mut track = Track::new();
        track.insert(bone(10, 1.0));
        track.insert(bone(20, 2.0));

        let (p, n) = track.lookup_at(3.0).unwrap();
        assert_eq!((p.frame, n.frame), (10, 10));
        let (p, n) = track.lookup_at(25.0).unwrap();
        assert_eq!((p.frame, n.frame), (20, 20));
        let (p, n) = track.lookup_at(20.0).unwrap();
        assert_eq!((p.frame, n.frame), (20, 20));
        let (p, n) = track.lookup_at(10.0).unwrap();
        assert_eq!((p.frame, n.frame), (10, 10));
        let (p, n) = track.lookup_at(15.5).unwrap();
        assert_eq!((p.frame, n.frame), (10, 20));
        assert!(Track::<BoneKeyframe>::new().lookup_at(0.0).is_none());
    }

    #[test]
    fn test_initial_curves_midpoint_is_half() {
        let mut track = Track::new();
        let mut a = bone(0, 0.0);
        let mut b = bone(10, 10.0);
        a.curves = INITIAL_BONE_CURVES;
        b.curves = INITIAL_BONE_CURVES;
        b.rotation = Quat::from_rotation_y(1.0);
        track.insert(a);
        track.insert(b);

        let s = track.seek(5.0);
        assert_eq!(s.position.x, 5.0);
        let expected = Quat::from_rotation_y(0.5);
        assert!(s.rotation.dot(expected).abs() > 1.0 - 1e-6);
        assert_eq!(next_ratio(&track, 5.0), 0.5);
    }

    fn next_ratio(track: &Track<BoneKeyframe>, frame: f32) -> f32 {
        let (p, n) = track.lookup_at(frame).unwrap();
        n.curve_rotation()
            .evaluate_between(p.frame as f32, frame, n.frame as f32)
    }

    #[test]
    fn test_morph_linear() {
        let mut track = Track::new();
        track.insert(MorphKeyframe::new(0, 0.0));
        track.insert(MorphKeyframe::new(4, 1.0));
        assert_abs_diff_eq!(track.seek(1.0), 0.25);
        assert_abs_diff_eq!(track.seek(10.0), 1.0);
    }

    #[test]
    fn test_camera_interpolation() {
        let mut track = Track::new();
        let mut a = CameraKeyframe::new(0);
        a.distance = -45.0;
        let mut b = CameraKeyframe::new(10);
        b.distance = -25.0;
        b.fov = 40;
        b.look_at = Vec3::new(0.0, 10.0, 0.0);
        track.insert(a);
        track.insert(b);
        let s = track.seek(5.0);
        assert_abs_diff_eq!(s.distance, -35.0, epsilon = 1e-4);
        assert_abs_diff_eq!(s.fov, 35.0, epsilon = 1e-4);
        assert_abs_diff_eq!(s.look_at.y, 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_ik_track_steps() {
        let mut track = Track::new();
        let mut off = IkKeyframe::new(10);
        off.ik_states.push(("右足ＩＫ".to_string(), false));
        track.insert(IkKeyframe::new(0));
        track.insert(off);
        assert!(track.seek(5.0).unwrap().is_enabled("右足ＩＫ"));
        assert!(!track.seek(15.0).unwrap().is_enabled("右足ＩＫ"));
    }

    proptest! {
        #[test]
        fn prop_bracket_search(
            keys in proptest::collection::btree_set(0u32..500, 1..20),
            f in 0.0f32..500.0,
        ) {
            let mut track = Track::new();
            for k in &keys {
                track.insert(MorphKeyframe::new(*k, 0.0));
            }
            let first = *keys.iter().next().unwrap() as f32;
            let last = *keys.iter().next_back().unwrap() as f32;
            prop_assume!(f >= first && f <= last);

            let (prev, next) = track.lookup_at(f).unwrap();
            prop_assert!(prev.frame as f32 <= f);
            prop_assert!(f <= next.frame as f32);
            let between = keys
                .iter()
                .filter(|&&k| k > prev.frame && k < next.frame)
                .count();
            prop_assert_eq!(between, 0);
        }
    }
}
