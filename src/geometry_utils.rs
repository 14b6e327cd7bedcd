use nalgebra::{Matrix4, Vector3};

pub type Vec3 = Vector3<f32>;

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1. - t) + (b * t)
}

/// The translation part of a 4x4 world transform
pub fn position(transform: &Matrix4<f32>) -> Vec3 {
    Vec3::new(transform[(0, 3)], transform[(1, 3)], transform[(2, 3)])
}

/// Intersect a ray with an (infinite) plane, returning the distance along
/// the ray if the plane is in front of the origin
pub fn ray_plane_distance(
    ray_origin: &Vec3,
    ray_direction: &Vec3,
    plane_point: &Vec3,
    plane_normal: &Vec3,
) -> Option<f32> {
    let denom = plane_normal.dot(ray_direction);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = plane_normal.dot(&(plane_point - ray_origin)) / denom;
    if t > 0. { Some(t) } else { None }
}
