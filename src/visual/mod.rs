//! 骨骼外观钩子
//!
//! 具体几何（线、圆柱、双锥）由宿主实现，核心只在端点变化后
//! 调用 [`BoneVisual`]。

use glam::DVec3;
use std::cell::RefCell;
use std::rc::Rc;

/// 父骨骼尾部 → 子骨骼头部的连线
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParentageLink {
    pub start: DVec3,
    pub end: DVec3,
}

/// 骨骼外观能力接口
pub trait BoneVisual {
    /// 端点或长度变化后重建外观
    fn rebuild_visual(&mut self, head: DVec3, tail: DVec3, distance: f64);

    /// 父子连线变化；`None` 表示隐藏
    fn rebuild_parentage_link(&mut self, _link: Option<ParentageLink>) {}
}

/// 线段外观：只记录端点契约
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineVisual {
    pub head: DVec3,
    pub tail: DVec3,
    pub distance: f64,
    pub parentage_link: Option<ParentageLink>,
    /// 重建次数
    pub rebuild_count: usize,
}

impl LineVisual {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn midpoint(&self) -> DVec3 {
        (self.head + self.tail) * 0.5
    }
}

impl BoneVisual for LineVisual {
    fn rebuild_visual(&mut self, head: DVec3, tail: DVec3, distance: f64) {
        self.head = head;
        self.tail = tail;
        self.distance = distance;
        self.rebuild_count += 1;
    }

    fn rebuild_parentage_link(&mut self, link: Option<ParentageLink>) {
        self.parentage_link = link;
    }
}

/// 共享句柄：宿主保留一份引用以读取外观状态
impl<T: BoneVisual> BoneVisual for Rc<RefCell<T>> {
    fn rebuild_visual(&mut self, head: DVec3, tail: DVec3, distance: f64) {
        self.borrow_mut().rebuild_visual(head, tail, distance);
    }

    fn rebuild_parentage_link(&mut self, link: Option<ParentageLink>) {
        self.borrow_mut().rebuild_parentage_link(link);
    }
}
