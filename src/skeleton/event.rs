//! 骨骼事件
//!
//! 父骨骼修改完成后按深度优先顺序同步通知子骨骼，
//! 同时把每个事件转发给宿主注册的监听器。

use super::BoneId;

/// 骨骼事件
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoneEvent {
    /// 静止模式下端点或朝向发生变化
    RestChanged,
    /// 姿态模式下端点被旋转
    PoseChanged,
    /// 姿态交互结束（拖拽释放）
    PoseInteractionStopped,
}

/// 宿主侧监听器
pub trait RigListener {
    fn on_bone_event(&mut self, bone: BoneId, event: BoneEvent);
}

impl<F> RigListener for F
where
    F: FnMut(BoneId, BoneEvent),
{
    fn on_bone_event(&mut self, bone: BoneId, event: BoneEvent) {
        self(bone, event)
    }
}
