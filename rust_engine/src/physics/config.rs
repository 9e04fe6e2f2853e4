//! MMD 物理配置
//!
//! 进程级的一份配置，物理世界创建时取一次快照。

use glam::Vec3;
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 求解器中重力 Y 分量的放大倍数（MMD 单位约为 10cm）
pub const GRAVITY_Y_SCALE: f32 = 10.0;

/// 风的参数
#[derive(Debug, Clone, PartialEq)]
pub struct WindConfig {
    pub enabled: bool,
    /// 风向，使用前归一化
    pub direction: Vec3,
    pub speed: f32,
    /// 阵风强度 0..=1
    pub randomness: f32,
    /// 阵风频率 (Hz)
    pub turbulence_freq_hz: f32,
    /// 阻力系数
    pub drag_coeff: f32,
    /// 升力系数
    pub lift_coeff: f32,
    /// 风力产生的最大加速度，0 表示不限制
    pub max_acceleration: f32,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            direction: Vec3::X,
            speed: 0.0,
            randomness: 0.0,
            turbulence_freq_hz: 0.5,
            drag_coeff: 0.8,
            lift_coeff: 0.2,
            max_acceleration: 80.0,
        }
    }
}

/// 物理配置
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    // ========== 重力 ==========
    /// MMD 单位的重力，Y 分量在配置求解器时乘以 [`GRAVITY_Y_SCALE`]
    pub gravity: Vec3,

    // ========== 模拟参数 ==========
    /// 动画帧率
    pub fps: f32,
    /// 每次 step 的最大子步数，循环未指定时使用
    pub max_substeps: u32,
    /// 固定子步长（秒）
    pub fixed_time_step: f32,
    /// 约束求解器迭代次数
    pub solver_iterations: usize,

    // ========== 刚体 ==========
    /// 线性阻尼缩放（乘以模型原值）
    pub linear_damping_scale: f32,
    /// 角速度阻尼缩放（乘以模型原值）
    pub angular_damping_scale: f32,
    /// 质量缩放（乘以模型原值）
    pub mass_scale: f32,

    // ========== 关节弹簧 ==========
    pub linear_spring_stiffness_scale: f32,
    pub angular_spring_stiffness_scale: f32,
    /// 阻尼 = sqrt(刚度 * 此值)
    pub linear_spring_damping_factor: f32,
    /// 阻尼 = sqrt(刚度 * 此值)
    pub angular_spring_damping_factor: f32,

    // ========== 调试 ==========
    /// 关闭后不创建关节
    pub joints_enabled: bool,
    /// 输出子步数等调试日志
    pub debug_log: bool,

    pub wind: WindConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            fps: 60.0,
            max_substeps: 4,
            fixed_time_step: 1.0 / 60.0,
            solver_iterations: 4,
            linear_damping_scale: 1.0,
            angular_damping_scale: 1.0,
            mass_scale: 1.0,
            linear_spring_stiffness_scale: 1.0,
            angular_spring_stiffness_scale: 1.0,
            linear_spring_damping_factor: 0.1,
            angular_spring_damping_factor: 0.1,
            joints_enabled: true,
            debug_log: false,
            wind: WindConfig::default(),
        }
    }
}

impl PhysicsConfig {
    /// 求解器使用的重力
    pub fn solver_gravity(&self) -> Vec3 {
        scale_gravity(self.gravity)
    }
}

/// MMD 重力转求解器重力
pub fn scale_gravity(gravity: Vec3) -> Vec3 {
    Vec3::new(gravity.x, gravity.y * GRAVITY_Y_SCALE, gravity.z)
}

/// 全局配置实例
static PHYSICS_CONFIG: Lazy<RwLock<PhysicsConfig>> = Lazy::new(|| RwLock::new(PhysicsConfig::default()));

/// 获取当前配置（只读）
pub fn get_config() -> PhysicsConfig {
    PHYSICS_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置
pub fn set_config(config: PhysicsConfig) {
    *PHYSICS_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(PhysicsConfig::default());
}
