//! 指针交互映射
//!
//! 把宿主的按下/拖拽/释放事件翻译成 `Rig` 的操作：
//! - Start/Define：按下即放置端点
//! - Rest：拖拽端点、平移（根骨骼拖线段或按住修饰键拖端点）、缩放（按住修饰键拖线段）
//! - Pose：在相机平面内绕头部旋转尾部
//!
//! 拾取几何由宿主完成，这里只接收拾取结果 [`PickTarget`]。

use glam::{DVec2, DVec3};

use crate::skeleton::{BoneId, BoneState, Rig};
use crate::{Result, RigError};

/// 宿主提供的投影能力（显示坐标 y 轴向上）
pub trait Viewport {
    /// 世界坐标 → 显示坐标
    fn world_to_display(&self, world: DVec3) -> DVec2;

    /// 显示坐标 → 世界坐标，深度取 `reference` 所在的深度
    fn display_to_world(&self, display: DVec2, reference: DVec3) -> DVec3;

    /// 相机焦点，放置新端点时作为深度参考
    fn focal_point(&self) -> DVec3;

    /// 相机投影方向，没有相机时为 None
    fn direction_of_projection(&self) -> Option<DVec3>;
}

/// 按下时指针下的部件
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PickTarget {
    #[default]
    Outside,
    Head,
    Tail,
    Line,
}

/// 当前手势
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Gesture {
    #[default]
    Idle,
    /// 拖拽头部
    MovingHead,
    /// 拖拽尾部
    MovingTail,
    /// 整体平移
    Translating,
    /// 绕中点缩放
    Scaling,
    /// 相机平面旋转
    Rotating,
}

/// 单根骨骼的交互映射器
#[derive(Clone, Debug)]
pub struct BoneInteractor {
    bone: BoneId,
    gesture: Gesture,
    start_event: DVec2,
    last_event: DVec2,
    start_head: DVec3,
    start_tail: DVec3,
    /// 按下时骨骼在屏幕上的长度
    start_length: f64,
}

impl BoneInteractor {
    pub fn new(bone: BoneId) -> Self {
        Self {
            bone,
            gesture: Gesture::Idle,
            start_event: DVec2::ZERO,
            last_event: DVec2::ZERO,
            start_head: DVec3::ZERO,
            start_tail: DVec3::ZERO,
            start_length: 0.0,
        }
    }

    pub fn bone(&self) -> BoneId {
        self.bone
    }

    /// 是否有进行中的拖拽
    pub fn is_active(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    /// 指针按下
    pub fn press(
        &mut self,
        rig: &mut Rig,
        viewport: &dyn Viewport,
        pick: PickTarget,
        position: DVec2,
        modifier: bool,
    ) -> Result<()> {
        rig.set_view_direction(viewport.direction_of_projection());
        self.gesture = Gesture::Idle;

        let state = rig.state(self.bone)?;
        if matches!(state, BoneState::Start | BoneState::Define) {
            let point = viewport.display_to_world(position, viewport.focal_point());
            return rig.place_point(self.bone, point);
        }

        let is_root = rig.parent(self.bone)?.is_none();
        self.gesture = match (state, pick) {
            (_, PickTarget::Outside) => Gesture::Idle,
            (BoneState::Rest, PickTarget::Head | PickTarget::Tail) if modifier => Gesture::Translating,
            (BoneState::Rest, PickTarget::Head) => Gesture::MovingHead,
            (BoneState::Rest, PickTarget::Tail) => Gesture::MovingTail,
            (BoneState::Rest, PickTarget::Line) if !is_root => Gesture::Idle,
            (BoneState::Rest, PickTarget::Line) if modifier => Gesture::Scaling,
            (BoneState::Rest, PickTarget::Line) => Gesture::Translating,
            (BoneState::Pose, PickTarget::Tail) => Gesture::Rotating,
            (BoneState::Pose, PickTarget::Line) if is_root => Gesture::Rotating,
            _ => Gesture::Idle,
        };

        self.start_event = position;
        self.last_event = position;
        self.start_head = rig.head_world_position(self.bone)?;
        self.start_tail = rig.tail_world_position(self.bone)?;
        self.start_length = (viewport.world_to_display(self.start_tail)
            - viewport.world_to_display(self.start_head))
        .length();
        log::debug!("[骨骼 {}] 开始手势 {:?}", self.bone.index(), self.gesture);
        Ok(())
    }

    /// 指针拖拽
    pub fn drag(&mut self, rig: &mut Rig, viewport: &dyn Viewport, position: DVec2) -> Result<()> {
        rig.set_view_direction(viewport.direction_of_projection());
        let result = match self.gesture {
            Gesture::Idle => Ok(()),
            Gesture::MovingHead => {
                let head = viewport.display_to_world(position, self.start_head);
                rig.set_head_world_position(self.bone, head)
            }
            Gesture::MovingTail => {
                let tail = viewport.display_to_world(position, self.start_tail);
                rig.set_tail_world_position(self.bone, tail)
            }
            Gesture::Translating => self.translate(rig, viewport, position),
            Gesture::Scaling => self.scale(rig, position),
            Gesture::Rotating => self.rotate(rig, viewport, position),
        };
        self.last_event = position;
        result
    }

    /// 指针释放；姿态旋转结束时冻结姿态
    pub fn release(&mut self, rig: &mut Rig) -> Result<()> {
        let gesture = std::mem::take(&mut self.gesture);
        if gesture == Gesture::Rotating {
            return rig.end_pose_interaction(self.bone);
        }
        Ok(())
    }

    /// 相对按下位置的位移作用在按下时的端点上
    fn translate(&self, rig: &mut Rig, viewport: &dyn Viewport, position: DVec2) -> Result<()> {
        let reference = (self.start_head + self.start_tail) * 0.5;
        let delta = viewport.display_to_world(position, reference)
            - viewport.display_to_world(self.start_event, reference);
        let current = rig.head_world_position(self.bone)?;
        rig.translate(self.bone, self.start_head + delta - current)
    }

    /// 缩放因子 = 1 + 拖拽距离 / 屏幕长度；向下拖时取倒数
    fn scale(&self, rig: &mut Rig, position: DVec2) -> Result<()> {
        if self.start_length <= 0.0 {
            return Ok(());
        }
        let distance = (position - self.start_event).length();
        let mut factor = 1.0 + distance / self.start_length;
        if position.y - self.last_event.y < 0.0 {
            factor = 1.0 / factor;
        }
        rig.scale_about_center(self.bone, factor)
    }

    /// 以头部的屏幕位置为圆心，取上一事件与当前事件的夹角
    fn rotate(&self, rig: &mut Rig, viewport: &dyn Viewport, position: DVec2) -> Result<()> {
        if rig.view_direction().is_none() {
            log::error!("[骨骼 {}] 没有相机，无法旋转", self.bone.index());
            return Err(RigError::MissingCamera);
        }

        let center = viewport.world_to_display(rig.head_world_position(self.bone)?);
        let previous = (self.last_event - center).normalize_or_zero();
        let current = (position - center).normalize_or_zero();
        if previous == DVec2::ZERO || current == DVec2::ZERO {
            return Ok(());
        }

        let angle = previous.dot(current).clamp(-1.0, 1.0).acos();
        // 屏幕上逆时针 → 绕投影方向反向旋转
        let handedness = if previous.perp_dot(current) > 0.0 { -1.0 } else { 1.0 };
        rig.rotate_tail_in_view_plane(self.bone, handedness * angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::quaternion_to_axis_angle;
    use crate::RigConfig;
    use std::f64::consts::PI;

    /// 正交相机，沿 -Z 观察，显示坐标即世界 XY
    struct OrthoViewport {
        direction: Option<DVec3>,
    }

    impl OrthoViewport {
        fn new() -> Self {
            Self {
                direction: Some(DVec3::NEG_Z),
            }
        }
    }

    impl Viewport for OrthoViewport {
        fn world_to_display(&self, world: DVec3) -> DVec2 {
            world.truncate()
        }

        fn display_to_world(&self, display: DVec2, reference: DVec3) -> DVec3 {
            display.extend(reference.z)
        }

        fn focal_point(&self) -> DVec3 {
            DVec3::ZERO
        }

        fn direction_of_projection(&self) -> Option<DVec3> {
            self.direction
        }
    }

    fn approx(a: DVec3, b: DVec3) -> bool {
        (a - b).length() < 1e-9
    }

    fn placed(rig: &mut Rig, viewport: &OrthoViewport, head: DVec2, tail: DVec2) -> (BoneId, BoneInteractor) {
        let id = rig.add_bone("bone");
        let mut interactor = BoneInteractor::new(id);
        interactor.press(rig, viewport, PickTarget::Outside, head, false).unwrap();
        interactor.press(rig, viewport, PickTarget::Outside, tail, false).unwrap();
        (id, interactor)
    }

    #[test]
    fn test_clicks_place_bone() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let id = rig.add_bone("bone");
        let mut interactor = BoneInteractor::new(id);

        interactor.press(&mut rig, &viewport, PickTarget::Outside, DVec2::new(1.0, 1.0), false).unwrap();
        assert_eq!(rig.state(id).unwrap(), BoneState::Define);
        interactor.press(&mut rig, &viewport, PickTarget::Outside, DVec2::new(1.0, 4.0), false).unwrap();
        assert_eq!(rig.state(id).unwrap(), BoneState::Rest);
        assert_eq!(rig.head_world_position(id).unwrap(), DVec3::new(1.0, 1.0, 0.0));
        assert_eq!(rig.tail_world_position(id).unwrap(), DVec3::new(1.0, 4.0, 0.0));
        assert!(!interactor.is_active());
    }

    #[test]
    fn test_drag_tail_handle() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let (id, mut interactor) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::Y);

        interactor.press(&mut rig, &viewport, PickTarget::Tail, DVec2::Y, false).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(2.0, 0.0)).unwrap();
        interactor.release(&mut rig).unwrap();
        assert_eq!(rig.tail_world_position(id).unwrap(), DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(rig.head_world_position(id).unwrap(), DVec3::ZERO);
    }

    #[test]
    fn test_drag_line_translates_root() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let (id, mut interactor) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::new(0.0, 2.0));

        interactor.press(&mut rig, &viewport, PickTarget::Line, DVec2::new(0.0, 1.0), false).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(1.0, 1.0)).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(3.0, 2.0)).unwrap();
        assert!(approx(rig.head_world_position(id).unwrap(), DVec3::new(3.0, 1.0, 0.0)));
        assert!(approx(rig.tail_world_position(id).unwrap(), DVec3::new(3.0, 3.0, 0.0)));
    }

    #[test]
    fn test_drag_line_ignored_for_child() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let (parent, _) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::Y);
        let (child, mut interactor) = placed(&mut rig, &viewport, DVec2::new(0.0, 2.0), DVec2::new(0.0, 3.0));
        rig.set_parent(child, Some(parent)).unwrap();

        interactor.press(&mut rig, &viewport, PickTarget::Line, DVec2::new(0.0, 2.5), false).unwrap();
        assert!(!interactor.is_active());
        interactor.drag(&mut rig, &viewport, DVec2::new(5.0, 2.5)).unwrap();
        assert_eq!(rig.head_world_position(child).unwrap(), DVec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_modifier_on_handle_moves_whole_bone() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let (parent, _) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::Y);
        let (child, mut interactor) = placed(&mut rig, &viewport, DVec2::new(0.0, 2.0), DVec2::new(0.0, 3.0));
        rig.set_parent(child, Some(parent)).unwrap();

        interactor.press(&mut rig, &viewport, PickTarget::Tail, DVec2::new(0.0, 3.0), true).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(1.0, 3.0)).unwrap();
        assert!(approx(rig.head_world_position(child).unwrap(), DVec3::new(1.0, 2.0, 0.0)));
        assert!(approx(rig.tail_world_position(child).unwrap(), DVec3::new(1.0, 3.0, 0.0)));
    }

    #[test]
    fn test_modifier_on_line_scales() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let (id, mut interactor) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::new(0.0, 2.0));

        interactor.press(&mut rig, &viewport, PickTarget::Line, DVec2::new(1.0, 1.0), true).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(1.0, 3.0)).unwrap();
        // 1 + 2 / 2
        assert!(approx(rig.head_world_position(id).unwrap(), DVec3::new(0.0, -1.0, 0.0)));
        assert!(approx(rig.tail_world_position(id).unwrap(), DVec3::new(0.0, 3.0, 0.0)));

        // 向下拖：缩小
        interactor.drag(&mut rig, &viewport, DVec2::new(1.0, 0.5)).unwrap();
        let length = rig.bone(id).unwrap().distance();
        assert!(length < 4.0);
        assert!(approx(
            (rig.head_world_position(id).unwrap() + rig.tail_world_position(id).unwrap()) * 0.5,
            DVec3::new(0.0, 1.0, 0.0)
        ));
    }

    #[test]
    fn test_pose_tail_drag_rotates_in_view_plane() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let (id, mut interactor) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::Y);
        rig.set_state_to_pose(id).unwrap();

        interactor.press(&mut rig, &viewport, PickTarget::Tail, DVec2::Y, false).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(-1.0, 1.0)).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(-1.0, 0.0)).unwrap();
        // 屏幕逆时针 90°
        assert!(approx(rig.tail_world_position(id).unwrap(), DVec3::NEG_X));
        assert_eq!(rig.head_world_position(id).unwrap(), DVec3::ZERO);

        interactor.release(&mut rig).unwrap();
        let bone = rig.bone(id).unwrap();
        assert_eq!(bone.start_pose_transform(), bone.pose_transform());
        assert!((bone.pose_transform() * DVec3::Y - DVec3::NEG_X).length() < 1e-9);

        // 顺时针拖回
        interactor.press(&mut rig, &viewport, PickTarget::Line, DVec2::new(-1.0, 0.0), false).unwrap();
        interactor.drag(&mut rig, &viewport, DVec2::new(0.0, 1.0)).unwrap();
        assert!(approx(rig.tail_world_position(id).unwrap(), DVec3::Y));
        let (_, angle) = quaternion_to_axis_angle(rig.pose_transform(id).unwrap());
        assert!(angle.abs() < 1e-6 || (angle - 2.0 * PI).abs() < 1e-6);
    }

    #[test]
    fn test_pose_drag_without_camera() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport { direction: None };
        let (id, mut interactor) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::Y);
        rig.set_state_to_pose(id).unwrap();

        interactor.press(&mut rig, &viewport, PickTarget::Tail, DVec2::Y, false).unwrap();
        let result = interactor.drag(&mut rig, &viewport, DVec2::new(-1.0, 0.0));
        assert_eq!(result, Err(RigError::MissingCamera));
        assert_eq!(rig.tail_world_position(id).unwrap(), DVec3::Y);
    }

    #[test]
    fn test_pose_head_drag_is_ignored() {
        let mut rig = Rig::with_config(RigConfig::default());
        let viewport = OrthoViewport::new();
        let (id, mut interactor) = placed(&mut rig, &viewport, DVec2::ZERO, DVec2::Y);
        rig.set_state_to_pose(id).unwrap();

        interactor.press(&mut rig, &viewport, PickTarget::Head, DVec2::ZERO, false).unwrap();
        assert!(!interactor.is_active());
        interactor.drag(&mut rig, &viewport, DVec2::new(3.0, 3.0)).unwrap();
        assert_eq!(rig.head_world_position(id).unwrap(), DVec3::ZERO);
        assert_eq!(rig.tail_world_position(id).unwrap(), DVec3::Y);
    }
}
