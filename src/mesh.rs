//! Mesh primitives owned by scene nodes.
//!
//! This module provides the CPU-side building blocks a panorama is made of:
//!
//! - [`Vertex3d`]: position, normal and UV for one vertex
//! - [`Geometry`]: vertex and index data with an explicit release step
//! - [`Material`]: opacity, face side, texture map and custom shader uniforms
//! - [`MeshResources`]: the geometry + material pair attached to a node
//! - [`Transform`]: position, rotation and scale of a node relative to its parent
//!
//! Rendering is not done here. A renderer reads these values and uploads
//! [`Geometry::vertex_bytes`] / [`Geometry::index_bytes`] as-is.

use crate::texture::ImageAsset;
use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;
use std::sync::Arc;

/// A vertex with position, normal, and texture coordinates.
///
/// Uses `#[repr(C)]` and derives [`bytemuck::Pod`] so vertex slices can be
/// handed to a GPU buffer without copying.
///
/// # Memory Layout
///
/// Each vertex occupies 32 bytes:
/// - `position`: 12 bytes (3 × f32) at offset 0
/// - `normal`: 12 bytes (3 × f32) at offset 12
/// - `uv`: 8 bytes (2 × f32) at offset 24
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    /// The 3D position of this vertex in model space.
    pub position: [f32; 3],
    /// The surface normal vector.
    pub normal: [f32; 3],
    /// Texture coordinates, typically in the range [0, 1].
    pub uv: [f32; 2],
}

impl Vertex3d {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Vertex and index data for one mesh.
///
/// Once [`dispose`](Geometry::dispose)d the buffers are dropped and the
/// geometry reports itself as released.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    vertices: Vec<Vertex3d>,
    indices: Vec<u32>,
    released: bool,
}

impl Geometry {
    /// Creates geometry from vertices and indices.
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            released: false,
        }
    }

    /// Creates a UV sphere of the given radius.
    ///
    /// Normals point outward; a panorama renders the inside by using
    /// [`Side::Back`] on its material.
    ///
    /// # Arguments
    ///
    /// * `radius` - Sphere radius
    /// * `segments` - Horizontal subdivisions (longitude)
    /// * `rings` - Vertical subdivisions (latitude)
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                let position = [x * radius, y * radius, z * radius];
                let normal = [x, y, z];
                let uv = [seg as f32 / segments as f32, ring as f32 / rings as f32];

                vertices.push(Vertex3d::new(position, normal, uv));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.push(current);
                indices.push(next);
                indices.push(current + 1);

                indices.push(current + 1);
                indices.push(next);
                indices.push(next + 1);
            }
        }

        Self::new(vertices, indices)
    }

    pub fn vertices(&self) -> &[Vertex3d] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Raw vertex bytes for buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes for buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Computes the axis-aligned bounding box as `(min, max)`.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        (min, max)
    }

    /// Release the vertex and index buffers.
    pub fn dispose(&mut self) {
        self.vertices = Vec::new();
        self.indices = Vec::new();
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Which faces of a mesh are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Side {
    #[default]
    Front,
    /// Inside faces only. Panoramas are viewed from the center of their sphere.
    Back,
    Double,
}

/// Named scalar uniforms of a custom-shader material.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Uniforms(HashMap<String, f32>);

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f32) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.get(name).copied()
    }

    /// Overwrite an existing uniform. Returns `false` if it is not declared.
    pub fn set(&mut self, name: &str, value: f32) -> bool {
        match self.0.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Surface appearance of a mesh.
#[derive(Clone, Debug)]
pub struct Material {
    pub opacity: f32,
    pub transparent: bool,
    pub side: Side,
    /// Texture shown on the surface.
    pub map: Option<Arc<ImageAsset>>,
    /// Present for custom-shader materials.
    pub uniforms: Option<Uniforms>,
    pub(crate) needs_update: bool,
    pub(crate) released: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            transparent: false,
            side: Side::Front,
            map: None,
            uniforms: None,
            needs_update: false,
            released: false,
        }
    }
}

impl Material {
    /// Plain opaque material.
    pub fn basic() -> Self {
        Self::default()
    }

    /// Material rendered by a custom shader with the given uniforms.
    pub fn shader(uniforms: Uniforms) -> Self {
        Self {
            uniforms: Some(uniforms),
            ..Default::default()
        }
    }

    /// Replace the texture map and flag the material for re-upload.
    pub fn set_map(&mut self, map: Arc<ImageAsset>) {
        self.map = Some(map);
        self.needs_update = true;
    }

    /// Set opacity, mirroring it into an `opacity` shader uniform if declared.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
        if let Some(uniforms) = &mut self.uniforms {
            uniforms.set("opacity", opacity);
        }
    }

    /// Whether the renderer must re-upload this material.
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Called by a renderer after uploading.
    pub fn mark_uploaded(&mut self) {
        self.needs_update = false;
    }

    /// Drop the texture reference and mark the material released.
    pub fn dispose(&mut self) {
        self.map = None;
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Geometry and material of a renderable node.
#[derive(Clone, Debug, Default)]
pub struct MeshResources {
    pub geometry: Geometry,
    pub material: Material,
}

impl MeshResources {
    pub fn new(geometry: Geometry, material: Material) -> Self {
        Self { geometry, material }
    }

    /// Release both halves.
    pub fn dispose(&mut self) {
        self.geometry.dispose();
        self.material.dispose();
    }

    pub fn is_released(&self) -> bool {
        self.geometry.is_released() && self.material.is_released()
    }
}

/// Local position, rotation, and scale of a node.
///
/// # Example
///
/// ```
/// use panowalk::{Transform, Vec3};
///
/// let transform = Transform::new().position(Vec3::new(0.0, 2.0, -5.0)).uniform_scale(2.0);
/// assert_eq!(transform.scale, Vec3::splat(2.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation relative to the parent.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Scale factors for each axis.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Creates a new identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transform positioned at the given location.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Converts this transform to a 4×4 matrix (scale, then rotate, then translate).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let sphere = Geometry::sphere(5000.0, 8, 4);
        assert_eq!(sphere.vertices().len(), 9 * 5);
        assert_eq!(sphere.indices().len(), (8 * 4 * 6) as usize);

        for v in sphere.vertices() {
            let r = Vec3::from(v.position).length();
            assert!((r - 5000.0).abs() < 0.5, "radius {}", r);
        }
    }

    #[test]
    fn vertex_bytes_match_layout() {
        let sphere = Geometry::sphere(1.0, 4, 2);
        assert_eq!(sphere.vertex_bytes().len(), sphere.vertices().len() * 32);
        assert_eq!(sphere.index_bytes().len(), sphere.indices().len() * 4);
    }

    #[test]
    fn geometry_bounds() {
        let vertices = vec![
            Vertex3d::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([-1.0, -1.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        let geom = Geometry::new(vertices, vec![0, 1, 2]);

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn dispose_releases_both_halves() {
        let mut mesh = MeshResources::new(Geometry::sphere(1.0, 4, 2), Material::basic());
        assert!(!mesh.is_released());

        mesh.dispose();
        assert!(mesh.is_released());
        assert!(mesh.geometry.vertices().is_empty());
    }

    #[test]
    fn opacity_reaches_shader_uniform() {
        let mut material = Material::shader(Uniforms::new().with("opacity", 0.0));
        material.set_opacity(0.4);
        assert_eq!(material.uniforms.as_ref().unwrap().get("opacity"), Some(0.4));

        let mut plain = Material::shader(Uniforms::new().with("tint", 1.0));
        plain.set_opacity(0.4);
        assert_eq!(plain.uniforms.as_ref().unwrap().get("opacity"), None);
        assert_eq!(plain.opacity, 0.4);
    }

    #[test]
    fn set_map_flags_update() {
        let mut material = Material::basic();
        material.set_map(Arc::new(ImageAsset::from_rgba(vec![0; 4], 1, 1)));
        assert!(material.needs_update());
        material.mark_uploaded();
        assert!(!material.needs_update());
    }

    #[test]
    fn transform_matrix_applies_scale_then_translation() {
        let t = Transform::new()
            .position(Vec3::new(1.0, 0.0, 0.0))
            .uniform_scale(2.0);
        let p = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Vec3::new(3.0, 0.0, 0.0));
    }
}
