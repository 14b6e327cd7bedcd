use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::SceneError,
    geometry_utils::{position, Vec3},
    scene::{EntityId, Notification, PlaneDetection, SceneSurface},
    session_config::SessionConfig,
    tracking::ScreenPoint,
};

use super::smoothing::LowPassFilter;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InteractionMode {
    /// Press the button by holding the pointer over it
    OverlapPress,
    /// Place the pointer entity on detected planes; taps count
    RaycastDrag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Press,
    Unpress,
}

#[derive(Debug, Default)]
pub struct Counter {
    count: u64,
}

impl Counter {
    pub fn increment(&mut self) -> u64 {
        self.count += 1;
        self.count
    }

    pub fn value(&self) -> u64 {
        self.count
    }

    pub fn text(&self) -> String {
        self.count.to_string()
    }
}

/// Edge-triggered press detection: a transition is only reported when the
/// hit-test result differs from the previous one.
#[derive(Debug)]
pub struct OverlapPress {
    state: InteractionState,
}

impl OverlapPress {
    pub fn new() -> Self {
        OverlapPress {
            state: InteractionState::Idle,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn update(&mut self, hit: bool) -> Option<Transition> {
        match (self.state, hit) {
            (InteractionState::Idle, true) => {
                self.state = InteractionState::Pressed;
                Some(Transition::Press)
            }
            (InteractionState::Pressed, false) => {
                self.state = InteractionState::Idle;
                Some(Transition::Unpress)
            }
            _ => None,
        }
    }
}

impl Default for OverlapPress {
    fn default() -> Self {
        OverlapPress::new()
    }
}

/// Continuous placement of the pointer entity on whatever plane is under
/// the pointer. Misses leave the last placement untouched.
#[derive(Debug)]
pub struct RaycastDrag {
    filter: LowPassFilter,
    last_position: Option<Vec3>,
}

impl RaycastDrag {
    pub fn new(smoothing_rate: f32) -> Self {
        RaycastDrag {
            filter: LowPassFilter::new(smoothing_rate),
            last_position: None,
        }
    }

    pub fn update(&mut self, hit: Option<nalgebra::Matrix4<f32>>) -> Option<Vec3> {
        let world_transform = hit?;
        let smoothed = self.filter.filter(position(&world_transform));
        self.last_position = Some(smoothed);
        Some(smoothed)
    }

    pub fn last_position(&self) -> Option<Vec3> {
        self.last_position
    }
}

#[derive(Debug)]
enum Strategy {
    OverlapPress(OverlapPress),
    RaycastDrag(RaycastDrag),
}

#[derive(Debug, Clone, Copy)]
pub struct InteractionEntities {
    pub label: EntityId,
    pub button: EntityId,
    pub pointer: EntityId,
}

/// The interaction state machine for one session, shared by both modes.
/// Owns the counter and applies every side effect to the scene.
pub struct InteractionSystem {
    strategy: Strategy,
    counter: Counter,
    entities: InteractionEntities,
    plane_detection: PlaneDetection,
    screen_filter: Option<LowPassFilter>,
}

impl InteractionSystem {
    pub fn new(
        config: &SessionConfig,
        surface: &mut impl SceneSurface,
    ) -> Result<Self, SceneError> {
        let find = |name: &str| {
            surface
                .find_entity(name)
                .ok_or_else(|| SceneError::MissingEntity(String::from(name)))
        };
        let entities = InteractionEntities {
            label: find(&config.entities.label)?,
            button: find(&config.entities.button)?,
            pointer: find(&config.entities.pointer)?,
        };

        let strategy = match config.interaction_mode {
            InteractionMode::OverlapPress => Strategy::OverlapPress(OverlapPress::new()),
            InteractionMode::RaycastDrag => {
                surface.set_kinematic(entities.pointer)?;
                Strategy::RaycastDrag(RaycastDrag::new(config.smoothing_rate))
            }
        };

        let counter = Counter::default();
        surface.set_text(entities.label, &counter.text())?;

        info!("Interaction system ready in {:?} mode", config.interaction_mode);

        Ok(InteractionSystem {
            strategy,
            counter,
            entities,
            plane_detection: config.plane_detection,
            screen_filter: if config.smooth_screen_pointer {
                Some(LowPassFilter::new(config.smoothing_rate))
            } else {
                None
            },
        })
    }

    /// New pointer location, from the fingertip or a drag gesture
    pub fn handle_pointer(
        &mut self,
        point: ScreenPoint,
        surface: &mut impl SceneSurface,
    ) -> Result<(), SceneError> {
        match &mut self.strategy {
            Strategy::OverlapPress(press) => {
                let point = match self.screen_filter.as_mut() {
                    Some(filter) => {
                        let smoothed = filter.filter(Vec3::new(point.x, point.y, 0.));
                        ScreenPoint::new(smoothed.x, smoothed.y)
                    }
                    None => point,
                };
                surface.move_pointer_overlay(point);

                let hit = surface.entities_at(point).contains(&self.entities.button);
                match press.update(hit) {
                    Some(Transition::Press) => {
                        surface.post(Notification::Press);
                        let count = self.counter.increment();
                        info!("Button pressed; count is now {}", count);
                        surface.set_text(self.entities.label, &self.counter.text())
                    }
                    Some(Transition::Unpress) => {
                        debug!("Button released");
                        surface.post(Notification::Unpress);
                        Ok(())
                    }
                    None => Ok(()),
                }
            }
            Strategy::RaycastDrag(drag) => {
                match drag.update(surface.raycast(point, self.plane_detection)) {
                    Some(world_position) => {
                        surface.set_position(self.entities.pointer, world_position)
                    }
                    None => {
                        debug!("No plane under pointer at {:?}; skipping", point);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Drag gesture on the view. Only pointer placement follows drags; the
    /// press state is driven by fingertip frames alone.
    pub fn handle_drag(
        &mut self,
        point: ScreenPoint,
        surface: &mut impl SceneSurface,
    ) -> Result<(), SceneError> {
        match self.strategy {
            Strategy::RaycastDrag(_) => self.handle_pointer(point, surface),
            Strategy::OverlapPress(_) => {
                debug!("Drag ignored in overlap-press mode");
                Ok(())
            }
        }
    }

    pub fn handle_tap(&mut self, surface: &mut impl SceneSurface) -> Result<(), SceneError> {
        match self.strategy {
            Strategy::RaycastDrag(_) => {
                let count = self.counter.increment();
                info!("Tap; count is now {}", count);
                surface.set_text(self.entities.label, &self.counter.text())
            }
            Strategy::OverlapPress(_) => {
                debug!("Tap ignored in overlap-press mode");
                Ok(())
            }
        }
    }

    pub fn mode(&self) -> InteractionMode {
        match self.strategy {
            Strategy::OverlapPress(_) => InteractionMode::OverlapPress,
            Strategy::RaycastDrag(_) => InteractionMode::RaycastDrag,
        }
    }

    /// Current press state; None in raycast-drag mode, which has no states
    pub fn state(&self) -> Option<InteractionState> {
        match &self.strategy {
            Strategy::OverlapPress(press) => Some(press.state()),
            Strategy::RaycastDrag(_) => None,
        }
    }

    pub fn count(&self) -> u64 {
        self.counter.value()
    }

    pub fn entities(&self) -> InteractionEntities {
        self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scene::HeadlessScene,
        tracking::{ScreenRect, Size},
    };

    const INSIDE: ScreenPoint = ScreenPoint { x: 400., y: 600. };
    const OUTSIDE: ScreenPoint = ScreenPoint { x: 50., y: 50. };
    const FLOOR_A: ScreenPoint = ScreenPoint { x: 400., y: 1100. };
    const FLOOR_B: ScreenPoint = ScreenPoint { x: 200., y: 1000. };
    const SKY: ScreenPoint = ScreenPoint { x: 400., y: 100. };

    fn scene() -> HeadlessScene {
        HeadlessScene::counter_scene(
            Size::new(800., 1200.),
            ScreenRect::new(300., 500., 200., 200.),
        )
    }

    fn config(mode: InteractionMode) -> SessionConfig {
        SessionConfig {
            interaction_mode: mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_edge_triggered_transitions() {
        let mut press = OverlapPress::new();
        let transitions: Vec<Option<Transition>> =
            [false, true, true, false].iter().map(|hit| press.update(*hit)).collect();
        assert_eq!(
            transitions,
            vec![None, Some(Transition::Press), None, Some(Transition::Unpress)]
        );
        assert_eq!(press.state(), InteractionState::Idle);
    }

    #[test]
    fn test_hold_counts_once() {
        let mut scene = scene();
        let mut system =
            InteractionSystem::new(&config(InteractionMode::OverlapPress), &mut scene).unwrap();
        assert_eq!(scene.text_of("label"), Some("0"));

        for point in [OUTSIDE, INSIDE, INSIDE, OUTSIDE] {
            system.handle_pointer(point, &mut scene).unwrap();
        }

        assert_eq!(system.count(), 1);
        assert_eq!(system.state(), Some(InteractionState::Idle));
        assert_eq!(
            scene.notifications(),
            &[Notification::Press, Notification::Unpress]
        );
        assert_eq!(scene.text_of("label"), Some("1"));
        assert_eq!(scene.pointer_overlay(), Some(OUTSIDE));
    }

    #[test]
    fn test_second_press_counts_again() {
        let mut scene = scene();
        let mut system =
            InteractionSystem::new(&config(InteractionMode::OverlapPress), &mut scene).unwrap();
        for point in [INSIDE, OUTSIDE, INSIDE] {
            system.handle_pointer(point, &mut scene).unwrap();
        }
        assert_eq!(system.count(), 2);
        assert_eq!(system.state(), Some(InteractionState::Pressed));
        assert_eq!(scene.text_of("label"), Some("2"));
    }

    #[test]
    fn test_tap_ignored_when_pressing() {
        let mut scene = scene();
        let mut system =
            InteractionSystem::new(&config(InteractionMode::OverlapPress), &mut scene).unwrap();
        system.handle_tap(&mut scene).unwrap();
        assert_eq!(system.count(), 0);
    }

    #[test]
    fn test_drag_leaves_press_state_alone() {
        let mut scene = scene();
        let mut system =
            InteractionSystem::new(&config(InteractionMode::OverlapPress), &mut scene).unwrap();
        system.handle_pointer(INSIDE, &mut scene).unwrap();
        system.handle_drag(OUTSIDE, &mut scene).unwrap();
        system.handle_pointer(INSIDE, &mut scene).unwrap();

        assert_eq!(system.count(), 1);
        assert_eq!(system.state(), Some(InteractionState::Pressed));
        assert_eq!(scene.notifications(), &[Notification::Press]);
        assert_eq!(scene.pointer_overlay(), Some(INSIDE));
    }

    #[test]
    fn test_drag_places_pointer_in_raycast_mode() {
        let mut scene = scene();
        let mut system =
            InteractionSystem::new(&config(InteractionMode::RaycastDrag), &mut scene).unwrap();
        system.handle_drag(FLOOR_A, &mut scene).unwrap();
        let expected = position(&scene.raycast(FLOOR_A, PlaneDetection::Horizontal).unwrap());
        assert_eq!(
            scene.entity(system.entities().pointer).unwrap().position(),
            expected
        );
    }

    #[test]
    fn test_raycast_miss_keeps_last_placement() {
        let mut scene = scene();
        let mut system =
            InteractionSystem::new(&config(InteractionMode::RaycastDrag), &mut scene).unwrap();
        let pointer = system.entities().pointer;
        assert!(scene.entity(pointer).unwrap().kinematic);

        system.handle_pointer(FLOOR_A, &mut scene).unwrap();
        let first = scene.entity(pointer).unwrap().position();
        let expected_first = position(
            &scene
                .raycast(FLOOR_A, PlaneDetection::Horizontal)
                .unwrap(),
        );
        assert_eq!(first, expected_first);

        system.handle_pointer(SKY, &mut scene).unwrap();
        assert_eq!(scene.entity(pointer).unwrap().position(), first);

        system.handle_pointer(FLOOR_B, &mut scene).unwrap();
        let second_hit = position(
            &scene
                .raycast(FLOOR_B, PlaneDetection::Horizontal)
                .unwrap(),
        );
        let smoothed = scene.entity(pointer).unwrap().position();
        assert!((smoothed - (second_hit * 0.5 + first * 0.5)).norm() < 1e-5);
        assert_eq!(system.state(), None);
    }

    #[test]
    fn test_tap_increments_and_updates_label() {
        let mut scene = scene();
        let mut system =
            InteractionSystem::new(&config(InteractionMode::RaycastDrag), &mut scene).unwrap();
        system.handle_pointer(FLOOR_A, &mut scene).unwrap();
        system.handle_tap(&mut scene).unwrap();
        assert_eq!(system.count(), 1);
        assert_eq!(scene.text_of("label"), Some("1"));
        system.handle_tap(&mut scene).unwrap();
        assert_eq!(scene.text_of("label"), Some("2"));
        assert!(scene.notifications().is_empty());
    }

    #[test]
    fn test_missing_entity_fails_construction() {
        let mut scene = scene();
        let mut config = config(InteractionMode::OverlapPress);
        config.entities.button = String::from("bigRedButton");
        assert_eq!(
            InteractionSystem::new(&config, &mut scene).err(),
            Some(SceneError::MissingEntity(String::from("bigRedButton")))
        );
    }

    #[test]
    fn test_smoothed_screen_pointer() {
        let mut scene = scene();
        let config = SessionConfig {
            smooth_screen_pointer: true,
            ..Default::default()
        };
        let mut system = InteractionSystem::new(&config, &mut scene).unwrap();
        system
            .handle_pointer(ScreenPoint::new(0., 0.), &mut scene)
            .unwrap();
        system
            .handle_pointer(ScreenPoint::new(800., 1200.), &mut scene)
            .unwrap();
        // Halfway between both samples, which is inside the button
        assert_eq!(scene.pointer_overlay(), Some(ScreenPoint::new(400., 600.)));
        assert_eq!(system.count(), 1);
    }
}
