//! 骨骼状态机
//!
//! Start → Define → Rest ⇄ Pose。Start/Define 只能由放置端点自动进入。

/// 骨骼状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoneState {
    /// 刚创建，尚未放置端点
    #[default]
    Start,
    /// 已放置头部，等待尾部
    Define,
    /// 静止模式：可直接移动、缩放
    Rest,
    /// 姿态模式：只能旋转
    Pose,
}

impl BoneState {
    /// 是否允许直接设置头部
    pub fn head_settable(self) -> bool {
        matches!(self, BoneState::Define | BoneState::Rest)
    }

    /// 是否允许直接设置尾部（Define 下为第二次放置）
    pub fn tail_settable(self) -> bool {
        matches!(self, BoneState::Define | BoneState::Rest)
    }

    /// 两个端点都已放置
    pub fn is_placed(self) -> bool {
        matches!(self, BoneState::Rest | BoneState::Pose)
    }

    /// 能否通过公开接口切换到 `target`
    pub fn can_switch_to(self, target: BoneState) -> bool {
        match target {
            BoneState::Start | BoneState::Define => false,
            BoneState::Rest | BoneState::Pose => self.is_placed(),
        }
    }
}
