//! 四元数与向量运算
//!
//! 四元数分量顺序按 (w, x, y, z) 理解，存储使用 glam 的 `DQuat`。
//! 乘法、归一化、轴角转换都显式展开，保证容差和退化分支可复现。

use glam::{DQuat, DVec3};

/// 轴角转换里 sin(angle/2) 与 angle 的可忽略阈值
pub const AXIS_ANGLE_EPSILON: f64 = 1e-13;

/// Hamilton 乘积 `q1 * q2`（先应用 q2，再应用 q1）
pub fn multiply(q1: DQuat, q2: DQuat) -> DQuat {
    // (Q1 * Q2).w = w1w2 - x1x2 - y1y2 - z1z2
    // (Q1 * Q2).x = w1x2 + x1w2 + y1z2 - z1y2
    // (Q1 * Q2).y = w1y2 - x1z2 + y1w2 + z1x2
    // (Q1 * Q2).z = w1z2 + x1y2 - y1x2 + z1w2
    let w = q1.w * q2.w - q1.x * q2.x - q1.y * q2.y - q1.z * q2.z;
    let x = q1.w * q2.x + q1.x * q2.w + q1.y * q2.z - q1.z * q2.y;
    let y = q1.w * q2.y + q1.y * q2.w + q1.z * q2.x - q1.x * q2.z;
    let z = q1.w * q2.z + q1.z * q2.w + q1.x * q2.y - q1.y * q2.x;
    DQuat::from_xyzw(x, y, z, w)
}

/// 除以模长。零四元数会得到 NaN，调用方需在上游排除退化输入。
pub fn normalize(q: DQuat) -> DQuat {
    let mag = (q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z).sqrt();
    DQuat::from_xyzw(q.x / mag, q.y / mag, q.z / mag, q.w / mag)
}

/// 轴角 → 四元数。轴会先归一化，零向量轴保持为零。
pub fn axis_angle_to_quaternion(axis: DVec3, angle: f64) -> DQuat {
    let axis = axis.normalize_or_zero();
    let half = angle / 2.0;
    let f = half.sin();
    DQuat::from_xyzw(axis.x * f, axis.y * f, axis.z * f, half.cos())
}

/// 四元数 → (轴, 角度)
///
/// - `sin(angle/2)` 足够大：轴 = xyz / sin(angle/2)
/// - 正弦可忽略但角度不可忽略：轴固定为 X
/// - 角度可忽略：轴为零向量，调用方应把它当作"无旋转"
pub fn quaternion_to_axis_angle(q: DQuat) -> (DVec3, f64) {
    let angle = q.w.clamp(-1.0, 1.0).acos() * 2.0;
    let f = (angle * 0.5).sin();
    let axis = if f > AXIS_ANGLE_EPSILON {
        DVec3::new(q.x / f, q.y / f, q.z / f)
    } else if angle.abs() > AXIS_ANGLE_EPSILON {
        DVec3::X
    } else {
        DVec3::ZERO
    };
    (axis, angle)
}

/// 计算与 `x` 垂直、且两两垂直的两个向量 `(y, z)`，`(x, y, z)` 构成右手系
///
/// 先按 `x` 最大分量轮换坐标，避免除零。
pub fn perpendiculars(x: DVec3) -> (DVec3, DVec3) {
    let v = x.to_array();
    let x2 = v[0] * v[0];
    let y2 = v[1] * v[1];
    let z2 = v[2] * v[2];
    let r = (x2 + y2 + z2).sqrt();

    let (dx, dy, dz) = if x2 > y2 && x2 > z2 {
        (0, 1, 2)
    } else if y2 > z2 {
        (1, 2, 0)
    } else {
        (2, 0, 1)
    };

    let a = v[dx] / r;
    let b = v[dy] / r;
    let c = v[dz] / r;
    let tmp = (a * a + c * c).sqrt();

    let mut y = [0.0; 3];
    y[dx] = c / tmp;
    y[dy] = 0.0;
    y[dz] = -a / tmp;

    let mut z = [0.0; 3];
    z[dx] = -b * a / tmp;
    z[dy] = tmp;
    z[dz] = -b * c / tmp;

    (DVec3::from_array(y), DVec3::from_array(z))
}

/// 四元数模长
pub fn magnitude(q: DQuat) -> f64 {
    (q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z).sqrt()
}
