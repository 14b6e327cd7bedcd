//! The render surface seen by the interaction systems.
//!
//! [`SceneSurface`] is everything the core needs from a 3D scene: named
//! entities, screen-space hit-testing, raycasts against detected planes, text
//! meshes and press/unpress notifications. [`HeadlessScene`] implements it in
//! memory, for replays and tests.

use indexmap::IndexMap;
use log::debug;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::{
    error::SceneError,
    geometry_utils::{ray_plane_distance, Vec3},
    tracking::{ScreenPoint, ScreenRect, Size},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Press,
    Unpress,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlaneAlignment {
    Horizontal,
    Vertical,
}

/// Which real-world planes the session detects (and raycasts may hit)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlaneDetection {
    None,
    Horizontal,
    Vertical,
    Both,
}

impl PlaneDetection {
    pub fn accepts(&self, alignment: PlaneAlignment) -> bool {
        matches!(
            (self, alignment),
            (PlaneDetection::Both, _)
                | (PlaneDetection::Horizontal, PlaneAlignment::Horizontal)
                | (PlaneDetection::Vertical, PlaneAlignment::Vertical)
        )
    }
}

pub const TEXT_EXTRUSION_DEPTH: f32 = 0.01;
pub const TEXT_FONT_SIZE: f32 = 0.08;

#[derive(Debug, Clone, PartialEq)]
pub struct TextMesh {
    pub text: String,
    pub extrusion_depth: f32,
    pub font_size: f32,
}

impl TextMesh {
    pub fn generate(text: &str) -> Self {
        TextMesh {
            text: String::from(text),
            extrusion_depth: TEXT_EXTRUSION_DEPTH,
            font_size: TEXT_FONT_SIZE,
        }
    }
}

pub trait SceneSurface {
    fn find_entity(&self, name: &str) -> Option<EntityId>;

    /// All entities whose on-screen footprint contains the point
    fn entities_at(&self, point: ScreenPoint) -> Vec<EntityId>;

    /// Nearest intersection of a ray through the screen point with the
    /// detected planes, as a world transform
    fn raycast(&self, point: ScreenPoint, planes: PlaneDetection) -> Option<Matrix4<f32>>;

    fn set_position(&mut self, entity: EntityId, position: Vec3) -> Result<(), SceneError>;

    /// Stop simulating the entity physically; it still reports collisions
    fn set_kinematic(&mut self, entity: EntityId) -> Result<(), SceneError>;

    /// Replace the mesh of the entity's text component
    fn set_text(&mut self, entity: EntityId, text: &str) -> Result<(), SceneError>;

    fn post(&mut self, notification: Notification);

    /// Move the 2D pointer overlay drawn above the scene
    fn move_pointer_overlay(&mut self, point: ScreenPoint);

    fn update_viewport(&mut self, _viewport: Size) {}
}

#[derive(Debug, Clone)]
pub struct SceneEntity {
    pub name: String,
    pub transform: Matrix4<f32>,
    pub screen_bounds: Option<ScreenRect>,
    pub text_mesh: Option<TextMesh>,
    pub kinematic: bool,
}

impl SceneEntity {
    pub fn new(name: &str) -> Self {
        SceneEntity {
            name: String::from(name),
            transform: Matrix4::identity(),
            screen_bounds: None,
            text_mesh: None,
            kinematic: false,
        }
    }

    pub fn with_screen_bounds(mut self, bounds: ScreenRect) -> Self {
        self.screen_bounds = Some(bounds);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text_mesh = Some(TextMesh::generate(text));
        self
    }

    pub fn position(&self) -> Vec3 {
        crate::geometry_utils::position(&self.transform)
    }
}

#[derive(Debug, Clone)]
pub struct DetectedPlane {
    pub alignment: PlaneAlignment,
    pub point: Vec3,
    pub normal: Vec3,
}

impl DetectedPlane {
    pub fn floor(height: f32) -> Self {
        DetectedPlane {
            alignment: PlaneAlignment::Horizontal,
            point: Vec3::new(0., height, 0.),
            normal: Vec3::y(),
        }
    }
}

/// Pinhole camera looking down -Z, with +Y up
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    pub position: Vec3,
    pub vertical_fov_degrees: f32,
}

impl PinholeCamera {
    pub fn ray_direction(&self, point: ScreenPoint, viewport: Size) -> Option<Vec3> {
        if viewport.is_empty() {
            return None;
        }
        let ndc_x = 2. * point.x / viewport.width - 1.;
        let ndc_y = 1. - 2. * point.y / viewport.height;
        let tan_half = (self.vertical_fov_degrees.to_radians() / 2.).tan();
        let aspect = viewport.width / viewport.height;
        Some(Vec3::new(ndc_x * tan_half * aspect, ndc_y * tan_half, -1.).normalize())
    }
}

impl Default for PinholeCamera {
    fn default() -> Self {
        PinholeCamera {
            position: Vec3::new(0., 1.5, 0.),
            vertical_fov_degrees: 60.,
        }
    }
}

pub struct HeadlessScene {
    entities: IndexMap<String, SceneEntity>,
    planes: Vec<DetectedPlane>,
    camera: PinholeCamera,
    viewport: Size,
    pointer_overlay: Option<ScreenPoint>,
    notifications: Vec<Notification>,
}

impl HeadlessScene {
    pub fn new(viewport: Size) -> Self {
        HeadlessScene {
            entities: IndexMap::new(),
            planes: Vec::new(),
            camera: PinholeCamera::default(),
            viewport,
            pointer_overlay: None,
            notifications: Vec::new(),
        }
    }

    /// The counter scene: a label showing the count, a pressable button and
    /// a pointer entity, sitting above a detected floor
    pub fn counter_scene(viewport: Size, button_bounds: ScreenRect) -> Self {
        let mut scene = HeadlessScene::new(viewport);
        scene.add_entity(SceneEntity::new("label").with_text("0"));
        scene.add_entity(SceneEntity::new("button").with_screen_bounds(button_bounds));
        scene.add_entity(SceneEntity::new("pointer"));
        scene.add_plane(DetectedPlane::floor(0.));
        scene
    }

    pub fn add_entity(&mut self, entity: SceneEntity) -> EntityId {
        let (index, _) = self.entities.insert_full(entity.name.clone(), entity);
        EntityId(index)
    }

    pub fn add_plane(&mut self, plane: DetectedPlane) {
        self.planes.push(plane);
    }

    pub fn set_camera(&mut self, camera: PinholeCamera) {
        self.camera = camera;
    }

    pub fn entity(&self, id: EntityId) -> Option<&SceneEntity> {
        self.entities.get_index(id.0).map(|(_name, e)| e)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&SceneEntity> {
        self.entities.get(name)
    }

    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.entity_by_name(name)
            .and_then(|e| e.text_mesh.as_ref())
            .map(|mesh| mesh.text.as_str())
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn pointer_overlay(&self) -> Option<ScreenPoint> {
        self.pointer_overlay
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut SceneEntity, SceneError> {
        self.entities
            .get_index_mut(id.0)
            .map(|(_name, e)| e)
            .ok_or(SceneError::UnknownEntity(id))
    }
}

impl SceneSurface for HeadlessScene {
    fn find_entity(&self, name: &str) -> Option<EntityId> {
        self.entities.get_index_of(name).map(EntityId)
    }

    fn entities_at(&self, point: ScreenPoint) -> Vec<EntityId> {
        self.entities
            .values()
            .enumerate()
            .filter(|(_i, e)| e.screen_bounds.is_some_and(|b| b.contains(&point)))
            .map(|(i, _e)| EntityId(i))
            .collect()
    }

    fn raycast(&self, point: ScreenPoint, planes: PlaneDetection) -> Option<Matrix4<f32>> {
        let direction = self.camera.ray_direction(point, self.viewport)?;
        let origin = self.camera.position;
        self.planes
            .iter()
            .filter(|p| planes.accepts(p.alignment))
            .filter_map(|p| ray_plane_distance(&origin, &direction, &p.point, &p.normal))
            .min_by(|a, b| a.total_cmp(b))
            .map(|t| Matrix4::new_translation(&(origin + direction * t)))
    }

    fn set_position(&mut self, entity: EntityId, position: Vec3) -> Result<(), SceneError> {
        let e = self.entity_mut(entity)?;
        e.transform[(0, 3)] = position.x;
        e.transform[(1, 3)] = position.y;
        e.transform[(2, 3)] = position.z;
        Ok(())
    }

    fn set_kinematic(&mut self, entity: EntityId) -> Result<(), SceneError> {
        self.entity_mut(entity)?.kinematic = true;
        Ok(())
    }

    fn set_text(&mut self, entity: EntityId, text: &str) -> Result<(), SceneError> {
        let e = self.entity_mut(entity)?;
        match e.text_mesh.as_mut() {
            Some(mesh) => {
                *mesh = TextMesh::generate(text);
                Ok(())
            }
            None => Err(SceneError::MissingComponent {
                entity: e.name.clone(),
                component: "text mesh",
            }),
        }
    }

    fn post(&mut self, notification: Notification) {
        debug!("Notification posted: {:?}", notification);
        self.notifications.push(notification);
    }

    fn move_pointer_overlay(&mut self, point: ScreenPoint) {
        self.pointer_overlay = Some(point);
    }

    fn update_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }
}
