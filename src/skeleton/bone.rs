//! 骨骼节点

use glam::{DQuat, DVec3};

use super::{BoneState, BoneTransform};
use crate::config::RigConfig;
use crate::math::{self, axis_angle_to_quaternion, multiply, normalize};
use crate::{Result, RigError};

/// 骨骼句柄（`Rig` 内的槽位索引）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(pub(crate) usize);

impl BoneId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 调试坐标轴显示内容
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AxesVisibility {
    #[default]
    Nothing,
    /// 只显示静止朝向
    ShowRestTransform,
    /// 只显示姿态变换
    ShowPoseTransform,
    /// 姿态变换 * 静止朝向
    ShowPoseTransformAndRestTransform,
}

/// 骨骼节点
///
/// 不拥有父子骨骼，只保存 `BoneId`；层级由 `Rig` 维护。
/// 所有访问器返回值拷贝。
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub(crate) state: BoneState,

    // 世界坐标端点
    pub(crate) head: DVec3,
    pub(crate) tail: DVec3,

    // 父骨骼静止坐标系下的端点（Rest 下有效）
    pub(crate) local_rest_head: DVec3,
    pub(crate) local_rest_tail: DVec3,
    // 父骨骼姿态坐标系下的端点（Pose 下有效）
    pub(crate) local_pose_head: DVec3,
    pub(crate) local_pose_tail: DVec3,
    // 本次交互开始时的世界端点
    pub(crate) interaction_head: DVec3,
    pub(crate) interaction_tail: DVec3,

    pub(crate) rest_orientation: DQuat,
    pub(crate) pose_transform: DQuat,
    pub(crate) start_pose_transform: DQuat,
    /// 绕骨骼自身轴的滚转（弧度）
    pub(crate) roll: f64,

    // 层级
    pub(crate) parent: Option<BoneId>,
    pub(crate) children: Vec<BoneId>,
    pub(crate) head_linked_to_parent: bool,

    // 显示辅助
    pub(crate) show_parentage: bool,
    pub(crate) axes_visibility: AxesVisibility,

    pub(crate) distance: f64,
}

impl Bone {
    pub fn new(name: String) -> Self {
        Self {
            name,
            state: BoneState::Start,
            head: DVec3::ZERO,
            tail: DVec3::ZERO,
            local_rest_head: DVec3::ZERO,
            local_rest_tail: DVec3::ZERO,
            local_pose_head: DVec3::ZERO,
            local_pose_tail: DVec3::ZERO,
            interaction_head: DVec3::ZERO,
            interaction_tail: DVec3::ZERO,
            rest_orientation: DQuat::IDENTITY,
            pose_transform: DQuat::IDENTITY,
            start_pose_transform: DQuat::IDENTITY,
            roll: 0.0,
            parent: None,
            children: Vec::new(),
            head_linked_to_parent: false,
            show_parentage: false,
            axes_visibility: AxesVisibility::Nothing,
            distance: 0.0,
        }
    }

    pub fn state(&self) -> BoneState {
        self.state
    }

    pub fn head(&self) -> DVec3 {
        self.head
    }

    pub fn tail(&self) -> DVec3 {
        self.tail
    }

    pub fn local_rest_head(&self) -> DVec3 {
        self.local_rest_head
    }

    pub fn local_rest_tail(&self) -> DVec3 {
        self.local_rest_tail
    }

    pub fn local_pose_head(&self) -> DVec3 {
        self.local_pose_head
    }

    pub fn local_pose_tail(&self) -> DVec3 {
        self.local_pose_tail
    }

    pub fn rest_orientation(&self) -> DQuat {
        self.rest_orientation
    }

    pub fn pose_transform(&self) -> DQuat {
        self.pose_transform
    }

    pub fn start_pose_transform(&self) -> DQuat {
        self.start_pose_transform
    }

    pub fn roll(&self) -> f64 {
        self.roll
    }

    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    pub fn children(&self) -> &[BoneId] {
        &self.children
    }

    pub fn head_linked_to_parent(&self) -> bool {
        self.head_linked_to_parent
    }

    pub fn show_parentage(&self) -> bool {
        self.show_parentage
    }

    pub fn axes_visibility(&self) -> AxesVisibility {
        self.axes_visibility
    }

    /// 头尾距离（最近一次重建时的值）
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub(crate) fn update_distance(&mut self) -> f64 {
        self.distance = (self.tail - self.head).length();
        self.distance
    }

    /// 由头尾重建静止朝向：把 world_up 转到头→尾方向，再叠加滚转
    ///
    /// 骨骼退化时朝向重置为单位四元数并返回错误；找不到垂直向量时
    /// 朝向保持不变。
    pub(crate) fn rebuild_rest_orientation(&mut self, config: &RigConfig) -> Result<()> {
        let world_up = config.world_up;

        // 新 Z：头→尾单位向量
        let delta = self.tail - self.head;
        let length = delta.length();
        if length < config.degenerate_length {
            self.rest_orientation = DQuat::IDENTITY;
            return Err(RigError::DegenerateBone { length });
        }
        let view_out = delta / length;

        // view_out 在 world_up 上的投影
        let up_projection = view_out.dot(world_up);

        // 依次尝试 world_up、Y、Z，取与 view_out 垂直的分量
        let candidates = [
            world_up - view_out * up_projection,
            DVec3::Y - view_out * view_out.y,
            DVec3::Z - view_out * view_out.z,
        ];
        let Some(view_up) = candidates
            .into_iter()
            .find(|up| up.length() >= config.perpendicular_epsilon)
        else {
            return Err(RigError::NoPerpendicularAxis);
        };
        let view_up = view_up.normalize();

        let view_right = view_up.cross(view_out).normalize_or_zero();

        let angle = up_projection.clamp(-1.0, 1.0).acos();
        self.rest_orientation = normalize(axis_angle_to_quaternion(view_right, angle));

        if self.roll != 0.0 {
            let roll = normalize(axis_angle_to_quaternion(view_out, self.roll));
            self.rest_orientation = normalize(multiply(roll, self.rest_orientation));
        }

        Ok(())
    }

    /// 重建姿态变换
    ///
    /// 每次都从交互开始时的方向重新计算总旋转，再左乘到
    /// `start_pose_transform` 上，不做逐帧累乘。
    /// 有相机方向时在垂直于视线的平面内用 atan2 差求角度；
    /// 否则退化为叉乘 + acos（手性不可靠）。
    pub(crate) fn rebuild_pose_transform(&mut self, view_direction: Option<DVec3>) {
        if self.state != BoneState::Pose {
            self.pose_transform = DQuat::IDENTITY;
            return;
        }

        let previous = (self.interaction_tail - self.interaction_head).normalize_or_zero();
        let current = (self.tail - self.head).normalize_or_zero();

        let (axis, angle) = match view_direction {
            Some(direction) => {
                let axis = direction.normalize_or_zero();
                let (plane_x, plane_y) = math::perpendiculars(axis);
                let plane_x = plane_x.normalize_or_zero();
                let plane_y = plane_y.normalize_or_zero();

                // 角度差与相机滚转无关
                let current_angle = current.dot(plane_y).atan2(current.dot(plane_x));
                let previous_angle = previous.dot(plane_y).atan2(previous.dot(plane_x));
                (axis, current_angle - previous_angle)
            }
            None => {
                let axis = previous.cross(current).normalize_or_zero();
                (axis, current.dot(previous).clamp(-1.0, 1.0).acos())
            }
        };

        let delta = normalize(axis_angle_to_quaternion(axis, angle));
        self.pose_transform = normalize(multiply(delta, self.start_pose_transform));
    }

    /// 当前有效朝向：Pose 下为 pose * rest，其余为 rest
    pub fn effective_orientation(&self) -> DQuat {
        match self.state {
            BoneState::Pose => normalize(multiply(self.pose_transform, self.rest_orientation)),
            _ => self.rest_orientation,
        }
    }

    /// 世界 → 骨骼变换（以头部为原点）。Start/Define 下为 None。
    pub fn world_to_bone_transform(&self) -> Option<BoneTransform> {
        if !self.state.is_placed() {
            return None;
        }
        Some(BoneTransform::new(self.head, self.effective_orientation()))
    }

    /// 调试坐标轴的放置变换与轴长
    pub fn axes_transform(&self, axes_size: f64) -> Option<(BoneTransform, f64)> {
        if !self.state.is_placed() {
            return None;
        }
        let rotation = match self.axes_visibility {
            AxesVisibility::Nothing => return None,
            AxesVisibility::ShowRestTransform => self.rest_orientation,
            AxesVisibility::ShowPoseTransform => self.pose_transform,
            AxesVisibility::ShowPoseTransformAndRestTransform => {
                normalize(multiply(self.pose_transform, self.rest_orientation))
            }
        };
        Some((BoneTransform::new(self.tail, rotation), self.distance * axes_size))
    }

    /// 进入 Pose：局部姿态点取自局部静止点，记录交互起点
    pub(crate) fn prepare_pose(&mut self) {
        self.local_pose_head = self.local_rest_head;
        self.local_pose_tail = self.local_rest_tail;
        self.start_pose_transform = DQuat::IDENTITY;
        self.interaction_head = self.head;
        self.interaction_tail = self.tail;
    }

    /// 离开 Pose：清空所有姿态数据
    pub(crate) fn clear_pose(&mut self) {
        self.pose_transform = DQuat::IDENTITY;
        self.start_pose_transform = DQuat::IDENTITY;
        self.interaction_head = DVec3::ZERO;
        self.interaction_tail = DVec3::ZERO;
        self.local_pose_head = DVec3::ZERO;
        self.local_pose_tail = DVec3::ZERO;
    }

    /// 交互结束：冻结当前姿态作为下次计算的基准
    pub(crate) fn snapshot_interaction(&mut self) {
        self.start_pose_transform = self.pose_transform;
        self.interaction_head = self.head;
        self.interaction_tail = self.tail;
    }
}

impl Default for Bone {
    fn default() -> Self {
        Self::new(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::quaternion_to_axis_angle;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn rest_bone(head: DVec3, tail: DVec3) -> Bone {
        let mut bone = Bone::new("test".to_string());
        bone.state = BoneState::Rest;
        bone.head = head;
        bone.tail = tail;
        bone
    }

    #[test]
    fn test_orientation_along_up_is_identity() {
        let mut bone = rest_bone(DVec3::new(1.0, 1.0, 1.0), DVec3::new(1.0, 2.0, 1.0));
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        let (_, angle) = quaternion_to_axis_angle(bone.rest_orientation());
        assert!(angle.abs() < 1e-9);
    }

    #[test]
    fn test_orientation_along_z() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::Z);
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        let (axis, angle) = quaternion_to_axis_angle(bone.rest_orientation());
        assert!((angle - FRAC_PI_2).abs() < 1e-4);
        assert!((axis - DVec3::X).abs().max_element() < 1e-4);
    }

    #[test]
    fn test_orientation_along_x() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::X);
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        let (axis, angle) = quaternion_to_axis_angle(bone.rest_orientation());
        assert!((angle - FRAC_PI_2).abs() < 1e-4);
        assert!((axis - DVec3::NEG_Z).abs().max_element() < 1e-4);
    }

    #[test]
    fn test_orientation_maps_up_onto_bone() {
        let direction = DVec3::new(0.3, -0.5, 0.8).normalize();
        let mut bone = rest_bone(DVec3::new(2.0, 0.0, -1.0), DVec3::new(2.0, 0.0, -1.0) + direction * 3.0);
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        let mapped = bone.rest_orientation() * DVec3::Y;
        assert!((mapped - direction).length() < 1e-9);
    }

    #[test]
    fn test_orientation_pointing_down() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::NEG_Y);
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        let (_, angle) = quaternion_to_axis_angle(bone.rest_orientation());
        assert!((angle - PI).abs() < 1e-9);
        assert!((bone.rest_orientation() * DVec3::Y - DVec3::NEG_Y).length() < 1e-9);
    }

    #[test]
    fn test_orientation_custom_world_up() {
        let config = RigConfig {
            world_up: DVec3::Z,
            ..RigConfig::default()
        };
        let mut bone = rest_bone(DVec3::ZERO, DVec3::new(0.0, 0.0, 4.0));
        bone.rebuild_rest_orientation(&config).unwrap();
        let (_, angle) = quaternion_to_axis_angle(bone.rest_orientation());
        assert!(angle.abs() < 1e-9);
    }

    #[test]
    fn test_roll_keeps_bone_direction() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.0));
        bone.roll = 0.7;
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        let q = bone.rest_orientation();
        assert!((math::magnitude(q) - 1.0).abs() < 1e-12);
        // 滚转绕骨骼轴，不改变 Y 映射后的方向
        let mapped = q * DVec3::Y;
        assert!((mapped - DVec3::new(1.0, 1.0, 0.0).normalize()).length() < 1e-9);

        let mut plain = bone.clone();
        plain.roll = 0.0;
        plain.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        assert!((plain.rest_orientation().dot(q)).abs() < 1.0 - 1e-6);
    }

    #[test]
    fn test_degenerate_bone_resets_orientation() {
        let mut bone = rest_bone(DVec3::ONE, DVec3::ONE);
        bone.rest_orientation = axis_angle_to_quaternion(DVec3::X, 1.0);
        let result = bone.rebuild_rest_orientation(&RigConfig::default());
        assert!(matches!(result, Err(RigError::DegenerateBone { .. })));
        assert_eq!(bone.rest_orientation(), DQuat::IDENTITY);
        assert_eq!(bone.head(), DVec3::ONE);
    }

    #[test]
    fn test_pose_transform_identity_outside_pose() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::Y);
        bone.pose_transform = axis_angle_to_quaternion(DVec3::X, 0.3);
        bone.rebuild_pose_transform(Some(DVec3::NEG_Z));
        assert_eq!(bone.pose_transform(), DQuat::IDENTITY);
    }

    #[test]
    fn test_pose_transform_with_camera() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::X);
        bone.state = BoneState::Pose;
        bone.prepare_pose();
        // 尾部绕 +Z 转 90°
        bone.tail = DVec3::Y;
        bone.rebuild_pose_transform(Some(DVec3::NEG_Z));
        let rotated = bone.pose_transform() * DVec3::X;
        assert!((rotated - DVec3::Y).length() < 1e-9);
    }

    #[test]
    fn test_pose_transform_composes_with_start() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::X);
        bone.state = BoneState::Pose;
        bone.prepare_pose();
        bone.tail = DVec3::Y;
        bone.rebuild_pose_transform(Some(DVec3::NEG_Z));
        bone.snapshot_interaction();

        bone.tail = DVec3::NEG_X;
        bone.rebuild_pose_transform(Some(DVec3::NEG_Z));
        let rotated = bone.pose_transform() * DVec3::X;
        assert!((rotated - DVec3::NEG_X).length() < 1e-9);
        assert!((math::magnitude(bone.pose_transform()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pose_transform_without_camera() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::X);
        bone.state = BoneState::Pose;
        bone.prepare_pose();
        bone.tail = DVec3::Z;
        bone.rebuild_pose_transform(None);
        let rotated = bone.pose_transform() * DVec3::X;
        assert!((rotated - DVec3::Z).length() < 1e-9);
    }

    #[test]
    fn test_pose_transform_unchanged_direction_is_identity() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::new(0.0, 2.0, 0.0));
        bone.state = BoneState::Pose;
        bone.prepare_pose();
        bone.rebuild_pose_transform(None);
        let (_, angle) = quaternion_to_axis_angle(bone.pose_transform());
        assert!(angle.abs() < 1e-9);
    }

    #[test]
    fn test_world_to_bone_transform() {
        let mut bone = Bone::new("b".to_string());
        assert!(bone.world_to_bone_transform().is_none());

        bone.state = BoneState::Rest;
        bone.head = DVec3::new(1.0, 0.0, 0.0);
        bone.tail = DVec3::new(1.0, 0.0, 2.0);
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        let transform = bone.world_to_bone_transform().unwrap();
        assert_eq!(transform.translation, bone.head());
        let tip = transform.transform_point(DVec3::new(0.0, 2.0, 0.0));
        assert!((tip - bone.tail()).length() < 1e-9);
    }

    #[test]
    fn test_axes_transform() {
        let mut bone = rest_bone(DVec3::ZERO, DVec3::new(0.0, 0.0, 5.0));
        bone.rebuild_rest_orientation(&RigConfig::default()).unwrap();
        bone.update_distance();
        assert!(bone.axes_transform(0.2).is_none());

        bone.axes_visibility = AxesVisibility::ShowRestTransform;
        let (transform, length) = bone.axes_transform(0.2).unwrap();
        assert_eq!(transform.translation, bone.tail());
        assert_eq!(transform.rotation, bone.rest_orientation());
        assert!((length - 1.0).abs() < 1e-12);
    }
}
