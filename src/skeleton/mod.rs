//! 骨骼系统：端点存储、状态机、层级传播

mod bone;
mod event;
mod manager;
mod state;

pub use bone::{AxesVisibility, Bone, BoneId};
pub use event::{BoneEvent, RigListener};
pub use manager::Rig;
pub use state::BoneState;

use glam::{DMat4, DQuat, DVec3};

/// 刚体变换：先旋转，再平移
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: DVec3,
    pub rotation: DQuat,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            translation: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }
}

impl BoneTransform {
    pub fn new(translation: DVec3, rotation: DQuat) -> Self {
        Self { translation, rotation }
    }

    /// 局部点 → 世界点
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.translation + self.rotation * point
    }

    /// 世界点 → 局部点（旋转为单位四元数，用共轭求逆）
    pub fn inverse_transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation.conjugate() * (point - self.translation)
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.conjugate();
        Self {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation, self.translation)
    }
}
