//! 骨骼绑定配置
//!
//! 参数扁平化。`Rig` 在创建时复制一份配置，运行时修改全局默认值
//! 不影响已经存在的 `Rig`。

use glam::DVec3;
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 骨骼绑定配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct RigConfig {
    // ========== 坐标系 ==========
    /// 世界"上"方向，静止朝向以它为基准轴，默认 +Y
    pub world_up: DVec3,

    // ========== 数值容差 ==========
    /// 头尾距离小于此值视为退化骨骼，默认 1e-6
    pub degenerate_length: f64,
    /// 寻找垂直向量时的最小模长，默认 1e-7
    pub perpendicular_epsilon: f64,
    /// 新旧端点差小于此值时 set 操作不做任何事，默认 1e-13
    pub position_epsilon: f64,

    // ========== 显示辅助 ==========
    /// 新骨骼是否显示父子连线，默认 false
    pub show_parentage: bool,
    /// 调试坐标轴长度（乘以骨骼长度），默认 0.2
    pub axes_size: f64,

    // ========== 调试 ==========
    /// 是否输出传播调试日志，默认 false
    pub debug_log: bool,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            // ====== 坐标系 ======
            // 头→尾方向等于 world_up 时静止朝向为单位四元数
            world_up: DVec3::Y,

            // ====== 数值容差 ======
            // 退化判断在归一化之前做
            degenerate_length: 1e-6,
            // 三次尝试（world_up、Y、Z）都用同一个阈值
            perpendicular_epsilon: 1e-7,
            position_epsilon: 1e-13,

            // ====== 显示辅助 ======
            show_parentage: false,
            axes_size: 0.2,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局默认配置
static RIG_CONFIG: Lazy<RwLock<RigConfig>> = Lazy::new(|| RwLock::new(RigConfig::default()));

/// 获取当前默认配置（只读副本）
pub fn get_config() -> RigConfig {
    match RIG_CONFIG.read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// 设置默认配置，之后创建的 `Rig` 生效
pub fn set_config(config: RigConfig) {
    log::info!("[骨骼配置] world_up={:?}, show_parentage={}", config.world_up, config.show_parentage);
    match RIG_CONFIG.write() {
        Ok(mut guard) => *guard = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(RigConfig::default());
}
