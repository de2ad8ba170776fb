pub mod avatar_puppet;
pub mod godot_rig;

use godot::prelude::{Quaternion, Vector3};
use glam::{Quat, Vec3};

pub(crate) fn to_vec3(v: Vector3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub(crate) fn from_vec3(v: Vec3) -> Vector3 {
    Vector3::new(v.x, v.y, v.z)
}

pub(crate) fn to_quat(q: Quaternion) -> Quat {
    Quat::from_xyzw(q.x, q.y, q.z, q.w)
}

pub(crate) fn from_quat(q: Quat) -> Quaternion {
    Quaternion::new(q.x, q.y, q.z, q.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_components() {
        let v = Vec3::new(1.0, -2.0, 3.5);
        assert_eq!(to_vec3(from_vec3(v)), v);

        let q = Quat::from_rotation_y(0.4);
        assert_eq!(to_quat(from_quat(q)), q);
    }
}
