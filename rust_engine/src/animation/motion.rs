//! Motion 容器
//!
//! 按名称持有骨骼与 Morph 轨道，另有单条的相机、照明、阴影与 IK 开关轨道。
//! 名称映射使用 BTreeMap，保证导出时顺序稳定。

use std::collections::{BTreeMap, BTreeSet};

use super::keyframe::{
    BoneKeyframe, CameraKeyframe, IkKeyframe, LightKeyframe, MorphKeyframe, ShadowKeyframe,
};
use super::motion_track::{BoneFrameTransform, CameraFrameTransform, MotionTrack, Track};

/// 动作数据
#[derive(Debug, Clone, Default)]
pub struct Motion {
    pub model_name: String,
    pub bone_tracks: BTreeMap<String, Track<BoneKeyframe>>,
    pub morph_tracks: BTreeMap<String, Track<MorphKeyframe>>,
    pub camera_track: Track<CameraKeyframe>,
    pub light_track: Track<LightKeyframe>,
    pub shadow_track: Track<ShadowKeyframe>,
    pub ik_track: Track<IkKeyframe>,
}

impl Motion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_name(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// 插入骨骼关键帧
    pub fn insert_bone_keyframe(&mut self, name: &str, keyframe: BoneKeyframe) {
        self.bone_tracks
            .entry(name.to_string())
            .or_default()
            .insert(keyframe);
    }

    /// 插入 Morph 关键帧
    pub fn insert_morph_keyframe(&mut self, name: &str, keyframe: MorphKeyframe) {
        self.morph_tracks
            .entry(name.to_string())
            .or_default()
            .insert(keyframe);
    }

    pub fn insert_camera_keyframe(&mut self, keyframe: CameraKeyframe) {
        self.camera_track.insert(keyframe);
    }

    pub fn insert_ik_keyframe(&mut self, keyframe: IkKeyframe) {
        self.ik_track.insert(keyframe);
    }

    pub fn bone_track(&self, name: &str) -> Option<&Track<BoneKeyframe>> {
        self.bone_tracks.get(name)
    }

    pub fn morph_track(&self, name: &str) -> Option<&Track<MorphKeyframe>> {
        self.morph_tracks.get(name)
    }

    /// 骨骼轨道名
    pub fn bone_names(&self) -> impl Iterator<Item = &str> {
        self.bone_tracks.keys().map(String::as_str)
    }

    /// Morph 轨道名
    pub fn morph_names(&self) -> impl Iterator<Item = &str> {
        self.morph_tracks.keys().map(String::as_str)
    }

    /// 全部具名轨道（骨骼与 Morph）的名称集合
    pub fn names(&self) -> BTreeSet<&str> {
        self.bone_names().chain(self.morph_names()).collect()
    }

    /// 查找骨骼轨道中夹住 `frame` 的前后关键帧
    pub fn lookup_bone(&self, name: &str, frame: f32) -> Option<(&BoneKeyframe, &BoneKeyframe)> {
        self.bone_tracks.get(name)?.lookup_at(frame)
    }

    /// 骨骼在 `frame` 的插值结果，没有轨道时为 None
    pub fn bone_transform(&self, name: &str, frame: f32) -> Option<BoneFrameTransform> {
        self.bone_tracks.get(name).map(|t| t.seek(frame))
    }

    /// Morph 在 `frame` 的比例，没有轨道时为 None
    pub fn morph_ratio(&self, name: &str, frame: f32) -> Option<f32> {
        self.morph_tracks.get(name).map(|t| t.seek(frame))
    }

    pub fn camera_transform(&self, frame: f32) -> Option<CameraFrameTransform> {
        if self.camera_track.is_empty() {
            return None;
        }
        Some(self.camera_track.seek(frame))
    }

    /// IK 在 `frame` 是否启用，无数据时启用
    pub fn is_ik_enabled(&self, bone_name: &str, frame: f32) -> bool {
        self.ik_track
            .seek(frame)
            .map_or(true, |kf| kf.is_enabled(bone_name))
    }

    pub fn bone_keyframe_count(&self) -> usize {
        self.bone_tracks.values().map(Track::len).sum()
    }

    pub fn morph_keyframe_count(&self) -> usize {
        self.morph_tracks.values().map(Track::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bone_keyframe_count() == 0
            && self.morph_keyframe_count() == 0
            && self.camera_track.is_empty()
    }

    /// 所有轨道中最大的帧号
    pub fn max_frame(&self) -> u32 {
        let bone = self.bone_tracks.values().map(Track::max_frame).max().unwrap_or(0);
        let morph = self.morph_tracks.values().map(Track::max_frame).max().unwrap_or(0);
        bone.max(morph)
            .max(self.camera_track.max_frame())
            .max(self.light_track.max_frame())
            .max(self.shadow_track.max_frame())
            .max(self.ik_track.max_frame())
    }
}
