//! Bone Rig - 交互式骨骼绑定核心
//!
//! 提供骨骼编辑器所需的变换逻辑：
//! - 四元数运算（乘法、归一化、轴角互转）
//! - 骨骼端点存储与 Start/Define/Rest/Pose 状态机
//! - 父子层级、局部静止点缓存、姿态变换传播
//! - 指针拖拽到平移/缩放/相机平面旋转的映射
//!
//! 渲染、拾取几何、颜色等由宿主负责，本库只通过 [`interaction::Viewport`]
//! 获取投影与相机方向。

pub mod config;
pub mod interaction;
pub mod math;
pub mod skeleton;
pub mod visual;

pub use config::RigConfig;
pub use interaction::{BoneInteractor, PickTarget, Viewport};
pub use skeleton::{AxesVisibility, Bone, BoneEvent, BoneId, BoneState, BoneTransform, Rig, RigListener};
pub use visual::{BoneVisual, LineVisual, ParentageLink};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("Unknown bone: {0:?}")]
    UnknownBone(BoneId),

    #[error("Cannot {action} in {state:?} state")]
    InvalidState {
        action: &'static str,
        state: BoneState,
    },

    #[error("State {0:?} is entered automatically and cannot be set")]
    StateNotSettable(BoneState),

    #[error("Bone {0:?} has no parent")]
    NoParent(BoneId),

    #[error("Bone {0:?} is not linked to its parent")]
    NotHeadLinked(BoneId),

    #[error("Head of bone {0:?} is linked to its parent and cannot be moved directly")]
    HeadLinked(BoneId),

    #[error("Invalid scale factor: {0}")]
    InvalidScale(f64),

    #[error("Setting {parent:?} as parent of {child:?} would create a cycle")]
    CyclicHierarchy { child: BoneId, parent: BoneId },

    #[error("Head and tail are not far enough apart ({length})")]
    DegenerateBone { length: f64 },

    #[error("Could not find a vector perpendicular to the bone")]
    NoPerpendicularAxis,

    #[error("No camera available for view plane rotation")]
    MissingCamera,
}

pub type Result<T> = std::result::Result<T, RigError>;
