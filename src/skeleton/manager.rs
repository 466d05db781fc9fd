//! 骨骼层级管理器
//!
//! `Rig` 拥有全部骨骼。骨骼之间只通过 `BoneId` 互相引用：子骨骼记录父骨骼，
//! 父骨骼记录子骨骼列表（即监听者列表），不存在所有权环。
//! 所有修改在调用线程上同步完成，父骨骼先完成自身重建再深度优先通知子骨骼。

use glam::DVec3;
use std::collections::{HashMap, VecDeque};

use super::{AxesVisibility, Bone, BoneEvent, BoneId, BoneState, BoneTransform, RigListener};
use crate::config::{self, RigConfig};
use crate::math::axis_angle_to_quaternion;
use crate::visual::{BoneVisual, ParentageLink};
use crate::{Result, RigError};

/// 骨骼层级管理器
pub struct Rig {
    bones: Vec<Option<Bone>>,
    name_to_index: HashMap<String, usize>,
    visuals: HashMap<BoneId, Box<dyn BoneVisual>>,
    listeners: Vec<Box<dyn RigListener>>,
    config: RigConfig,
    /// 当前相机投影方向；姿态旋转依赖它
    view_direction: Option<DVec3>,
}

/// 在公开边界记录错误
fn report<T>(id: BoneId, action: &str, result: Result<T>) -> Result<T> {
    if let Err(ref e) = result {
        log::error!("[骨骼 {}] {} 失败: {}", id.index(), action, e);
    }
    result
}

impl Rig {
    /// 使用全局默认配置创建
    pub fn new() -> Self {
        Self::with_config(config::get_config())
    }

    pub fn with_config(config: RigConfig) -> Self {
        Self {
            bones: Vec::new(),
            name_to_index: HashMap::new(),
            visuals: HashMap::new(),
            listeners: Vec::new(),
            config,
            view_direction: None,
        }
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    // ========== 骨骼集合 ==========

    /// 添加骨骼（Start 状态）
    ///
    /// 名称不要求唯一；重名时 `find_bone_by_name` 返回最后添加的骨骼，
    /// 先添加的骨骼仍可通过 `BoneId` 访问。
    pub fn add_bone(&mut self, name: &str) -> BoneId {
        let index = self.bones.len();
        let mut bone = Bone::new(name.to_string());
        bone.show_parentage = self.config.show_parentage;
        if let Some(previous) = self.find_bone_by_name(name) {
            log::warn!("[骨骼 {}] 名称 {} 与骨骼 {} 重复", index, name, previous.index());
        }
        self.name_to_index.insert(bone.name.clone(), index);
        self.bones.push(Some(bone));
        BoneId(index)
    }

    /// 删除骨骼：从父骨骼的监听列表移除，子骨骼变为根骨骼
    ///
    /// 处于 Pose 的子骨骼保留原静止位置（沿静止链换算成世界坐标），
    /// 回到 Rest 时与其静止朝向一致。
    pub fn remove_bone(&mut self, id: BoneId) -> Result<Bone> {
        let bone = self.get(id)?;
        let parent = bone.parent;
        let children = bone.children.clone();

        // 先在层级完整时算出每个子骨骼的世界静止端点
        let mut orphans = Vec::with_capacity(children.len());
        for child_id in children {
            let child = self.get(child_id)?;
            let rest_points = if child.state == BoneState::Pose {
                match self.rest_chain_transform(child_id)? {
                    Some(t) => (
                        t.transform_point(child.local_rest_head),
                        t.transform_point(child.local_rest_tail),
                    ),
                    None => (child.local_rest_head, child.local_rest_tail),
                }
            } else {
                (child.head, child.tail)
            };
            orphans.push((child_id, rest_points));
        }

        if let Some(parent_id) = parent {
            if let Ok(parent) = self.get_mut(parent_id) {
                parent.children.retain(|&child| child != id);
            }
        }

        for (child_id, (rest_head, rest_tail)) in orphans {
            let child = self.get_mut(child_id)?;
            if child.head_linked_to_parent {
                log::warn!("[骨骼 {}] 父骨骼被删除，解除头部链接", child_id.index());
            }
            child.parent = None;
            child.head_linked_to_parent = false;
            child.local_rest_head = rest_head;
            child.local_rest_tail = rest_tail;
            if child.state == BoneState::Pose {
                child.local_pose_head = child.head;
                child.local_pose_tail = child.tail;
            }
            self.refresh_visual(child_id);
        }

        self.visuals.remove(&id);
        let removed = self.bones[id.0].take().ok_or(RigError::UnknownBone(id))?;
        if self.name_to_index.get(&removed.name) == Some(&id.0) {
            self.name_to_index.remove(&removed.name);
            // 重名骨骼中最后添加的一个接管名称
            let survivor = self
                .bones
                .iter()
                .rposition(|slot| slot.as_ref().is_some_and(|b| b.name == removed.name));
            if let Some(index) = survivor {
                self.name_to_index.insert(removed.name.clone(), index);
            }
        }
        Ok(removed)
    }

    /// 通过名称查找骨骼
    pub fn find_bone_by_name(&self, name: &str) -> Option<BoneId> {
        self.name_to_index.get(name).map(|&index| BoneId(index))
    }

    /// 获取骨骼数量
    pub fn bone_count(&self) -> usize {
        self.bones.iter().filter(|slot| slot.is_some()).count()
    }

    /// 获取骨骼
    pub fn bone(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.0).and_then(Option::as_ref)
    }

    /// 所有存活骨骼
    pub fn bone_ids(&self) -> impl Iterator<Item = BoneId> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| BoneId(index)))
    }

    fn get(&self, id: BoneId) -> Result<&Bone> {
        self.bone(id).ok_or(RigError::UnknownBone(id))
    }

    fn get_mut(&mut self, id: BoneId) -> Result<&mut Bone> {
        self.bones
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(RigError::UnknownBone(id))
    }

    // ========== 宿主协作 ==========

    /// 注册事件监听器
    pub fn add_listener<L: RigListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    /// 挂接外观，立即按当前端点重建一次
    pub fn set_visual<V: BoneVisual + 'static>(&mut self, id: BoneId, visual: V) -> Result<()> {
        self.get(id)?;
        self.visuals.insert(id, Box::new(visual));
        self.refresh_visual(id);
        Ok(())
    }

    /// 设置相机投影方向，`None` 表示没有相机
    pub fn set_view_direction(&mut self, direction: Option<DVec3>) {
        self.view_direction = direction;
    }

    pub fn view_direction(&self) -> Option<DVec3> {
        self.view_direction
    }

    // ========== 读取 ==========

    pub fn state(&self, id: BoneId) -> Result<BoneState> {
        Ok(self.get(id)?.state)
    }

    pub fn head_world_position(&self, id: BoneId) -> Result<DVec3> {
        Ok(self.get(id)?.head)
    }

    pub fn tail_world_position(&self, id: BoneId) -> Result<DVec3> {
        Ok(self.get(id)?.tail)
    }

    pub fn rest_orientation(&self, id: BoneId) -> Result<glam::DQuat> {
        Ok(self.get(id)?.rest_orientation)
    }

    pub fn pose_transform(&self, id: BoneId) -> Result<glam::DQuat> {
        Ok(self.get(id)?.pose_transform)
    }

    /// 世界 → 骨骼变换，Start/Define 下为 None
    pub fn world_to_bone_transform(&self, id: BoneId) -> Result<Option<BoneTransform>> {
        Ok(self.get(id)?.world_to_bone_transform())
    }

    pub fn parent(&self, id: BoneId) -> Result<Option<BoneId>> {
        Ok(self.get(id)?.parent)
    }

    pub fn children(&self, id: BoneId) -> Result<&[BoneId]> {
        Ok(self.get(id)?.children())
    }

    pub fn head_linked_to_parent(&self, id: BoneId) -> Result<bool> {
        Ok(self.get(id)?.head_linked_to_parent)
    }

    pub fn roll(&self, id: BoneId) -> Result<f64> {
        Ok(self.get(id)?.roll)
    }

    /// 父子连线：显示开启、有父骨骼、未链接、已放置时存在
    pub fn parentage_link(&self, id: BoneId) -> Result<Option<ParentageLink>> {
        let bone = self.get(id)?;
        let Some(parent_id) = bone.parent else {
            return Ok(None);
        };
        if !bone.show_parentage || bone.head_linked_to_parent || !bone.state.is_placed() {
            return Ok(None);
        }
        let parent = self.get(parent_id)?;
        Ok(Some(ParentageLink {
            start: parent.tail,
            end: bone.head,
        }))
    }

    /// 调试坐标轴的放置变换与轴长
    pub fn axes_transform(&self, id: BoneId) -> Result<Option<(BoneTransform, f64)>> {
        Ok(self.get(id)?.axes_transform(self.config.axes_size))
    }

    // ========== 放置 ==========

    /// 放置端点：Start 下放置头部进入 Define，Define 下放置尾部进入 Rest
    pub fn place_point(&mut self, id: BoneId, point: DVec3) -> Result<()> {
        let result = self.place_point_inner(id, point);
        report(id, "place point", result)
    }

    fn place_point_inner(&mut self, id: BoneId, point: DVec3) -> Result<()> {
        let bone = self.get(id)?;
        let (state, linked, parent) = (bone.state, bone.head_linked_to_parent, bone.parent);
        match state {
            BoneState::Start => {
                let head = match (linked, parent) {
                    (true, Some(parent_id)) => self.get(parent_id)?.tail,
                    _ => point,
                };
                let bone = self.get_mut(id)?;
                bone.head = head;
                bone.tail = head;
                bone.state = BoneState::Define;
                log::debug!("[骨骼 {}] Start -> Define", id.index());
                self.refresh_visual(id);
                Ok(())
            }
            BoneState::Define => self.finish_placement(id, point),
            state => Err(RigError::InvalidState {
                action: "place a point",
                state,
            }),
        }
    }

    /// 第二次放置：设置尾部并进入 Rest
    fn finish_placement(&mut self, id: BoneId, tail: DVec3) -> Result<()> {
        let bone = self.get_mut(id)?;
        bone.tail = tail;
        bone.state = BoneState::Rest;
        log::debug!("[骨骼 {}] Define -> Rest", id.index());
        self.after_rest_edit(id)
    }

    // ========== 端点 ==========

    /// 设置头部世界坐标（Define/Rest）
    pub fn set_head_world_position(&mut self, id: BoneId, head: DVec3) -> Result<()> {
        let result = self.set_head_checked(id, head);
        report(id, "set head", result)
    }

    fn set_head_checked(&mut self, id: BoneId, head: DVec3) -> Result<()> {
        let bone = self.get(id)?;
        if (head - bone.head).length() < self.config.position_epsilon {
            return Ok(());
        }
        if bone.head_linked_to_parent && bone.parent.is_some() && bone.state.head_settable() {
            return Err(RigError::HeadLinked(id));
        }
        self.move_head(id, head)
    }

    /// 设置尾部世界坐标（Rest；Define 下为第二次放置）
    pub fn set_tail_world_position(&mut self, id: BoneId, tail: DVec3) -> Result<()> {
        let result = self.move_tail(id, tail);
        report(id, "set tail", result)
    }

    /// 移动头部，不检查链接约束
    fn move_head(&mut self, id: BoneId, head: DVec3) -> Result<()> {
        let bone = self.get(id)?;
        if (head - bone.head).length() < self.config.position_epsilon {
            return Ok(());
        }
        if !bone.state.head_settable() {
            return Err(RigError::InvalidState {
                action: "set the head position",
                state: bone.state,
            });
        }

        let bone = self.get_mut(id)?;
        bone.head = head;
        if bone.state == BoneState::Rest {
            return self.after_rest_edit(id);
        }
        self.refresh_visual(id);
        Ok(())
    }

    fn move_tail(&mut self, id: BoneId, tail: DVec3) -> Result<()> {
        let bone = self.get(id)?;
        if (tail - bone.tail).length() < self.config.position_epsilon {
            return Ok(());
        }
        if !bone.state.tail_settable() {
            return Err(RigError::InvalidState {
                action: "set the tail position",
                state: bone.state,
            });
        }
        if bone.state == BoneState::Define {
            return self.finish_placement(id, tail);
        }

        self.get_mut(id)?.tail = tail;
        self.after_rest_edit(id)
    }

    /// Rest 下端点变化后的统一处理：重建朝向、局部静止点，通知子骨骼
    ///
    /// 朝向错误（退化骨骼）在其余步骤完成后返回。
    fn after_rest_edit(&mut self, id: BoneId) -> Result<()> {
        let orientation = self.rebuild_rest_orientation(id);
        self.rebuild_local_rest_points(id)?;
        self.refresh_visual(id);
        self.notify(id, BoneEvent::RestChanged);
        orientation
    }

    /// 平移整根骨骼（Rest）。头部链接到父骨骼时，父骨骼尾部随之移动。
    pub fn translate(&mut self, id: BoneId, delta: DVec3) -> Result<()> {
        let result = self.translate_inner(id, delta);
        report(id, "translate", result)
    }

    fn translate_inner(&mut self, id: BoneId, delta: DVec3) -> Result<()> {
        let bone = self.get(id)?;
        if bone.state != BoneState::Rest {
            return Err(RigError::InvalidState {
                action: "translate",
                state: bone.state,
            });
        }
        if delta.length() < self.config.position_epsilon {
            return Ok(());
        }

        let bone = self.get_mut(id)?;
        bone.head += delta;
        bone.tail += delta;
        let orientation = self.after_rest_edit(id);
        self.follow_linked_head(id)?;
        orientation
    }

    /// 绕中点缩放（Rest）
    pub fn scale_about_center(&mut self, id: BoneId, factor: f64) -> Result<()> {
        let result = self.scale_inner(id, factor);
        report(id, "scale", result)
    }

    fn scale_inner(&mut self, id: BoneId, factor: f64) -> Result<()> {
        let bone = self.get(id)?;
        if bone.state != BoneState::Rest {
            return Err(RigError::InvalidState {
                action: "scale",
                state: bone.state,
            });
        }
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RigError::InvalidScale(factor));
        }
        if (factor - 1.0).abs() < self.config.position_epsilon {
            return Ok(());
        }

        let bone = self.get_mut(id)?;
        let center = (bone.head + bone.tail) * 0.5;
        bone.head = center + (bone.head - center) * factor;
        bone.tail = center + (bone.tail - center) * factor;
        let orientation = self.after_rest_edit(id);
        self.follow_linked_head(id)?;
        orientation
    }

    /// 链接骨骼整体移动后，父骨骼尾部吸附到新的头部
    fn follow_linked_head(&mut self, id: BoneId) -> Result<()> {
        let bone = self.get(id)?;
        match (bone.head_linked_to_parent, bone.parent) {
            (true, Some(parent_id)) => self.link_tail_to_child_inner(parent_id, id),
            _ => Ok(()),
        }
    }

    // ========== 朝向与局部点 ==========

    fn rebuild_rest_orientation(&mut self, id: BoneId) -> Result<()> {
        let config = &self.config;
        let bone = self
            .bones
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(RigError::UnknownBone(id))?;
        bone.rebuild_rest_orientation(config)
    }

    fn rebuild_pose_transform(&mut self, id: BoneId) -> Result<()> {
        let view_direction = self.view_direction;
        self.get_mut(id)?.rebuild_pose_transform(view_direction);
        Ok(())
    }

    /// 世界 → 父骨骼变换：平移到父骨骼尾部，按父骨骼当前有效朝向旋转。
    /// 根骨骼返回 None（恒等）。
    fn world_to_parent_transform(&self, id: BoneId) -> Result<Option<BoneTransform>> {
        let Some(parent_id) = self.get(id)?.parent else {
            return Ok(None);
        };
        let parent = self.get(parent_id)?;
        Ok(Some(BoneTransform::new(parent.tail, parent.effective_orientation())))
    }

    /// 父骨骼静止链变换：父骨骼静止尾部 + 父骨骼静止朝向
    fn rest_chain_transform(&self, id: BoneId) -> Result<Option<BoneTransform>> {
        let Some(parent_id) = self.get(id)?.parent else {
            return Ok(None);
        };
        let parent = self.get(parent_id)?;
        let parent_tail = self.rest_world_tail(parent_id)?;
        Ok(Some(BoneTransform::new(parent_tail, parent.rest_orientation)))
    }

    /// 骨骼在静止姿态下的世界尾部
    fn rest_world_tail(&self, id: BoneId) -> Result<DVec3> {
        let bone = self.get(id)?;
        if bone.state != BoneState::Pose {
            return Ok(bone.tail);
        }
        Ok(match self.rest_chain_transform(id)? {
            Some(transform) => transform.transform_point(bone.local_rest_tail),
            None => bone.local_rest_tail,
        })
    }

    /// 当前世界端点 → 父骨骼静止坐标系。与 `enter_rest` 使用同一条静止链，
    /// 父骨骼处于 Pose 时也不会混入姿态旋转。
    fn rebuild_local_rest_points(&mut self, id: BoneId) -> Result<()> {
        let transform = self.rest_chain_transform(id)?;
        let bone = self.get_mut(id)?;
        (bone.local_rest_head, bone.local_rest_tail) = match transform {
            Some(t) => (t.inverse_transform_point(bone.head), t.inverse_transform_point(bone.tail)),
            None => (bone.head, bone.tail),
        };
        Ok(())
    }

    fn rebuild_local_pose_points(&mut self, id: BoneId) -> Result<()> {
        let transform = self.world_to_parent_transform(id)?;
        let bone = self.get_mut(id)?;
        (bone.local_pose_head, bone.local_pose_tail) = match transform {
            Some(t) => (t.inverse_transform_point(bone.head), t.inverse_transform_point(bone.tail)),
            None => (bone.head, bone.tail),
        };
        Ok(())
    }

    // ========== 状态 ==========

    pub fn set_state_to_rest(&mut self, id: BoneId) -> Result<()> {
        self.set_state(id, BoneState::Rest)
    }

    pub fn set_state_to_pose(&mut self, id: BoneId) -> Result<()> {
        self.set_state(id, BoneState::Pose)
    }

    /// 切换状态。Start/Define 只能由放置自动进入。
    pub fn set_state(&mut self, id: BoneId, target: BoneState) -> Result<()> {
        let result = self.set_state_inner(id, target);
        report(id, "switch state", result)
    }

    fn set_state_inner(&mut self, id: BoneId, target: BoneState) -> Result<()> {
        let current = self.get(id)?.state;
        if current == target {
            return Ok(());
        }
        if matches!(target, BoneState::Start | BoneState::Define) {
            return Err(RigError::StateNotSettable(target));
        }
        if !current.can_switch_to(target) {
            return Err(RigError::InvalidState {
                action: "switch state before both points are placed",
                state: current,
            });
        }

        match target {
            BoneState::Rest => self.enter_rest(id)?,
            BoneState::Pose => self.enter_pose(id)?,
            BoneState::Start | BoneState::Define => {}
        }
        log::debug!("[骨骼 {}] {:?} -> {:?}", id.index(), current, target);
        self.refresh_visual(id);
        Ok(())
    }

    /// 从 Pose 回到 Rest：通过父骨骼静止链从局部静止点还原世界端点
    fn enter_rest(&mut self, id: BoneId) -> Result<()> {
        let transform = self.rest_chain_transform(id)?;
        let bone = self.get_mut(id)?;
        match transform {
            Some(t) => {
                bone.head = t.transform_point(bone.local_rest_head);
                bone.tail = t.transform_point(bone.local_rest_tail);
            }
            None => {
                bone.head = bone.local_rest_head;
                bone.tail = bone.local_rest_tail;
            }
        }
        bone.clear_pose();
        bone.state = BoneState::Rest;
        Ok(())
    }

    fn enter_pose(&mut self, id: BoneId) -> Result<()> {
        let parent_posed = match self.get(id)?.parent {
            Some(parent_id) => self.get(parent_id)?.state == BoneState::Pose,
            None => false,
        };
        let bone = self.get_mut(id)?;
        bone.state = BoneState::Pose;
        bone.prepare_pose();
        // 父骨骼已在 Pose：姿态坐标系与静止坐标系不同，按当前世界端点重算
        if parent_posed {
            self.rebuild_local_pose_points(id)?;
        }
        self.rebuild_pose_transform(id)
    }

    /// 整个层级切换到 Rest，父骨骼优先；未放置的骨骼跳过
    pub fn set_all_to_rest(&mut self) -> Result<()> {
        self.set_all(BoneState::Rest)
    }

    /// 整个层级切换到 Pose，父骨骼优先；未放置的骨骼跳过
    pub fn set_all_to_pose(&mut self) -> Result<()> {
        self.set_all(BoneState::Pose)
    }

    fn set_all(&mut self, target: BoneState) -> Result<()> {
        let mut first_error = None;
        for id in self.hierarchy_order() {
            if !self.get(id)?.state.is_placed() {
                continue;
            }
            if let Err(e) = self.set_state(id, target) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// 父骨骼在前的遍历顺序
    pub fn hierarchy_order(&self) -> Vec<BoneId> {
        let mut order = Vec::with_capacity(self.bones.len());
        let mut queue: VecDeque<BoneId> = self
            .bone_ids()
            .filter(|&id| self.bone(id).is_some_and(|b| b.parent.is_none()))
            .collect();
        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(bone) = self.bone(id) {
                queue.extend(bone.children.iter().copied());
            }
        }
        order
    }

    // ========== 层级 ==========

    /// 设置父骨骼（Pose 下不可用）。清除父骨骼时同时解除头部链接。
    pub fn set_parent(&mut self, id: BoneId, parent: Option<BoneId>) -> Result<()> {
        let result = self.set_parent_inner(id, parent);
        report(id, "set parent", result)
    }

    fn set_parent_inner(&mut self, id: BoneId, parent: Option<BoneId>) -> Result<()> {
        let bone = self.get(id)?;
        if bone.state == BoneState::Pose {
            return Err(RigError::InvalidState {
                action: "define the parent bone",
                state: bone.state,
            });
        }
        if bone.parent == parent {
            return Ok(());
        }
        if let Some(parent_id) = parent {
            self.get(parent_id)?;
            if self.is_ancestor_or_self(id, parent_id) {
                return Err(RigError::CyclicHierarchy { child: id, parent: parent_id });
            }
        }

        let old_parent = bone.parent;
        if let Some(old_id) = old_parent {
            if let Ok(old) = self.get_mut(old_id) {
                old.children.retain(|&child| child != id);
            }
        }

        self.get_mut(id)?.parent = parent;

        match parent {
            Some(parent_id) => {
                self.get_mut(parent_id)?.children.push(id);
                if self.get(id)?.head_linked_to_parent {
                    self.link_head_to_parent_inner(id)?;
                }
                self.rebuild_local_rest_points(id)?;
            }
            None => {
                let bone = self.get_mut(id)?;
                if bone.head_linked_to_parent {
                    log::warn!("[骨骼 {}] 清除父骨骼，解除头部链接", id.index());
                    bone.head_linked_to_parent = false;
                }
                bone.local_rest_head = bone.head;
                bone.local_rest_tail = bone.tail;
            }
        }
        self.refresh_visual(id);
        Ok(())
    }

    fn is_ancestor_or_self(&self, candidate: BoneId, of: BoneId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.bone(id).and_then(|b| b.parent);
        }
        false
    }

    /// 设置头部是否链接到父骨骼尾部。链接时立即吸附。
    pub fn set_head_linked_to_parent(&mut self, id: BoneId, link: bool) -> Result<()> {
        let result = self.set_head_linked_inner(id, link);
        report(id, "link head", result)
    }

    fn set_head_linked_inner(&mut self, id: BoneId, link: bool) -> Result<()> {
        let bone = self.get(id)?;
        if bone.head_linked_to_parent == link {
            return Ok(());
        }
        if link {
            if bone.parent.is_none() {
                return Err(RigError::NoParent(id));
            }
            if bone.state == BoneState::Pose {
                return Err(RigError::InvalidState {
                    action: "link the head to the parent",
                    state: bone.state,
                });
            }
            self.link_head_to_parent_inner(id)?;
        }
        self.get_mut(id)?.head_linked_to_parent = link;
        self.refresh_visual(id);
        Ok(())
    }

    /// 把头部移到父骨骼尾部
    pub fn link_head_to_parent(&mut self, id: BoneId) -> Result<()> {
        let result = self.link_head_to_parent_inner(id);
        report(id, "link head to parent", result)
    }

    fn link_head_to_parent_inner(&mut self, id: BoneId) -> Result<()> {
        let bone = self.get(id)?;
        let Some(parent_id) = bone.parent else {
            return Err(RigError::NoParent(id));
        };
        // 尚未放置：第一次放置时吸附
        if bone.state == BoneState::Start {
            return Ok(());
        }
        let parent_tail = self.get(parent_id)?.tail;
        self.move_head(id, parent_tail)
    }

    /// 把尾部移到子骨骼头部；子骨骼必须链接到本骨骼
    pub fn link_tail_to_child(&mut self, id: BoneId, child: BoneId) -> Result<()> {
        let result = self.link_tail_to_child_inner(id, child);
        report(id, "link tail to child", result)
    }

    fn link_tail_to_child_inner(&mut self, id: BoneId, child: BoneId) -> Result<()> {
        let child_bone = self.get(child)?;
        if !child_bone.head_linked_to_parent || child_bone.parent != Some(id) {
            return Err(RigError::NotHeadLinked(child));
        }
        let child_head = child_bone.head;
        self.move_tail(id, child_head)
    }

    // ========== 滚转与显示辅助 ==========

    /// 设置滚转（弧度）。Rest 下立即重建朝向并通知子骨骼。
    pub fn set_roll(&mut self, id: BoneId, roll: f64) -> Result<()> {
        let result = self.set_roll_inner(id, roll);
        report(id, "set roll", result)
    }

    fn set_roll_inner(&mut self, id: BoneId, roll: f64) -> Result<()> {
        let bone = self.get_mut(id)?;
        if bone.roll == roll {
            return Ok(());
        }
        bone.roll = roll;
        if bone.state == BoneState::Rest {
            return self.after_rest_edit(id);
        }
        Ok(())
    }

    pub fn set_show_parentage(&mut self, id: BoneId, show: bool) -> Result<()> {
        self.get_mut(id)?.show_parentage = show;
        self.refresh_visual(id);
        Ok(())
    }

    pub fn set_axes_visibility(&mut self, id: BoneId, visibility: AxesVisibility) -> Result<()> {
        self.get_mut(id)?.axes_visibility = visibility;
        Ok(())
    }

    // ========== 姿态 ==========

    /// 绕头部旋转尾部（Pose）。头部不动。
    pub fn rotate_tail(&mut self, id: BoneId, axis: DVec3, angle: f64) -> Result<()> {
        let result = self.rotate_tail_inner(id, axis, angle);
        report(id, "rotate tail", result)
    }

    fn rotate_tail_inner(&mut self, id: BoneId, axis: DVec3, angle: f64) -> Result<()> {
        let bone = self.get(id)?;
        if bone.state != BoneState::Pose {
            return Err(RigError::InvalidState {
                action: "rotate the tail",
                state: bone.state,
            });
        }
        if axis.length() < self.config.position_epsilon || angle == 0.0 {
            return Ok(());
        }

        let rotation = axis_angle_to_quaternion(axis, angle);
        let bone = self.get_mut(id)?;
        bone.tail = bone.head + rotation * (bone.tail - bone.head);

        self.rebuild_pose_transform(id)?;
        self.rebuild_local_pose_points(id)?;
        self.refresh_visual(id);
        self.notify(id, BoneEvent::PoseChanged);
        Ok(())
    }

    /// 在相机平面内旋转尾部，轴为相机投影方向
    pub fn rotate_tail_in_view_plane(&mut self, id: BoneId, angle: f64) -> Result<()> {
        let result = match self.view_direction {
            Some(direction) => self.rotate_tail_inner(id, direction, angle),
            None => Err(RigError::MissingCamera),
        };
        report(id, "rotate tail in view plane", result)
    }

    /// 姿态交互结束：冻结姿态变换并通知子骨骼
    pub fn end_pose_interaction(&mut self, id: BoneId) -> Result<()> {
        let result = self.end_pose_interaction_inner(id);
        report(id, "end pose interaction", result)
    }

    fn end_pose_interaction_inner(&mut self, id: BoneId) -> Result<()> {
        let bone = self.get_mut(id)?;
        if bone.state != BoneState::Pose {
            return Err(RigError::InvalidState {
                action: "end a pose interaction",
                state: bone.state,
            });
        }
        bone.snapshot_interaction();
        self.notify(id, BoneEvent::PoseInteractionStopped);
        Ok(())
    }

    // ========== 传播 ==========

    /// 通知监听器，再深度优先交给每个子骨骼处理
    fn notify(&mut self, id: BoneId, event: BoneEvent) {
        if self.config.debug_log {
            log::debug!("[骨骼 {}] 发出 {:?}", id.index(), event);
        }
        for listener in &mut self.listeners {
            listener.on_bone_event(id, event);
        }

        let children = match self.get(id) {
            Ok(bone) => bone.children.clone(),
            Err(_) => return,
        };
        for child in children {
            let result = match event {
                BoneEvent::RestChanged => self.on_parent_rest_changed(child),
                BoneEvent::PoseChanged => self.on_parent_pose_changed(child),
                BoneEvent::PoseInteractionStopped => self.on_parent_pose_interaction_stopped(child),
            };
            if let Err(e) = result {
                log::error!("[骨骼 {}] 处理父骨骼 {:?} 失败: {}", child.index(), event, e);
            }
        }
    }

    /// 父骨骼静止数据变化：更新局部静止点，链接时吸附头部
    fn on_parent_rest_changed(&mut self, id: BoneId) -> Result<()> {
        let bone = self.get(id)?;
        let state = bone.state;
        let linked = bone.head_linked_to_parent;

        if state == BoneState::Rest {
            self.rebuild_local_rest_points(id)?;
        }
        if linked && matches!(state, BoneState::Define | BoneState::Rest) {
            self.link_head_to_parent_inner(id)?;
        }
        self.refresh_visual(id);
        Ok(())
    }

    /// 父骨骼姿态变化：由局部姿态点重新计算世界端点，再向下传播
    fn on_parent_pose_changed(&mut self, id: BoneId) -> Result<()> {
        if self.get(id)?.state != BoneState::Pose {
            self.refresh_visual(id);
            return Ok(());
        }

        let transform = self.world_to_parent_transform(id)?;
        let bone = self.get_mut(id)?;
        if let Some(t) = transform {
            bone.head = t.transform_point(bone.local_pose_head);
            bone.tail = t.transform_point(bone.local_pose_tail);
        }

        self.rebuild_pose_transform(id)?;
        self.refresh_visual(id);
        self.notify(id, BoneEvent::PoseChanged);
        Ok(())
    }

    fn on_parent_pose_interaction_stopped(&mut self, id: BoneId) -> Result<()> {
        let bone = self.get_mut(id)?;
        if bone.state != BoneState::Pose {
            return Ok(());
        }
        bone.snapshot_interaction();
        self.notify(id, BoneEvent::PoseInteractionStopped);
        Ok(())
    }

    /// 更新长度并重建外观与父子连线
    fn refresh_visual(&mut self, id: BoneId) {
        let link = self.parentage_link(id).ok().flatten();
        let Ok(bone) = self.get_mut(id) else {
            return;
        };
        let distance = bone.update_distance();
        let (head, tail) = (bone.head, bone.tail);
        if let Some(visual) = self.visuals.get_mut(&id) {
            visual.rebuild_visual(head, tail, distance);
            visual.rebuild_parentage_link(link);
        }
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}
