//! Scene flow.
//!
//! Transitions are requested through [`SceneTransitionRequested`] and resolved
//! at the next drain. A request for the scene that is already current is a
//! no-op, except Stage to Stage, which always re-enters (e.g. a retry).

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::health::EntityDied;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scene {
    MainMenu,
    Hub,
    /// Combat stage by index.
    Stage(u32),
    GameOver,
}

impl Scene {
    pub fn is_stage(self) -> bool {
        matches!(self, Scene::Stage(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneState {
    pub current: Scene,
    /// Completed transitions this session.
    pub transitions: u32,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            current: Scene::MainMenu,
            transitions: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTransitionRequested {
    pub to: Scene,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneEntered {
    pub from: Scene,
    pub to: Scene,
}

pub fn request_scene(world: &mut World, to: Scene) {
    world.publish(SceneTransitionRequested { to });
}

pub fn current_scene(world: &World) -> Option<Scene> {
    world.resource::<SceneState>().map(|s| s.current)
}

/// Whether a request for `to` while in `from` changes anything.
pub fn should_transition(from: Scene, to: Scene) -> bool {
    from != to || (from.is_stage() && to.is_stage())
}

pub fn install(world: &mut World) {
    world.subscribe::<SceneTransitionRequested, _>(|world, req| {
        let Some(state) = world.resource_mut::<SceneState>() else {
            tracing::warn!(to = ?req.to, "scene request without SceneState");
            return;
        };
        let from = state.current;
        if !should_transition(from, req.to) {
            tracing::debug!(scene = ?from, "already in requested scene");
            return;
        }
        state.current = req.to;
        state.transitions += 1;
        tracing::info!(?from, to = ?req.to, "scene entered");
        world.publish(SceneEntered { from, to: req.to });
    });

    world.subscribe::<EntityDied, _>(|world, ev| {
        if ev.was_player {
            request_scene(world, Scene::GameOver);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup_world() -> (World, Rc<RefCell<Vec<SceneEntered>>>) {
        let mut world = World::new();
        world.insert_resource(SceneState {
            current: Scene::Hub,
            transitions: 0,
        });
        install(&mut world);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        world.subscribe::<SceneEntered, _>(move |_, ev| sink.borrow_mut().push(*ev));
        (world, log)
    }

    fn drain(world: &mut World) {
        while world.pending_events() > 0 {
            world.process_events().unwrap();
        }
    }

    #[test]
    fn same_scene_request_is_ignored() {
        let (mut world, log) = setup_world();
        request_scene(&mut world, Scene::Hub);
        drain(&mut world);
        assert!(log.borrow().is_empty());
        assert_eq!(world.resource::<SceneState>().unwrap().transitions, 0);
    }

    #[test]
    fn stage_to_stage_always_reenters() {
        let (mut world, log) = setup_world();
        request_scene(&mut world, Scene::Stage(1));
        drain(&mut world);
        request_scene(&mut world, Scene::Stage(1));
        drain(&mut world);
        request_scene(&mut world, Scene::Stage(2));
        drain(&mut world);
        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1], SceneEntered { from: Scene::Stage(1), to: Scene::Stage(1) });
        assert_eq!(current_scene(&world), Some(Scene::Stage(2)));
    }

    #[test]
    fn entered_event_arrives_one_drain_later() {
        let (mut world, log) = setup_world();
        request_scene(&mut world, Scene::Stage(1));
        world.process_events().unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(current_scene(&world), Some(Scene::Stage(1)));
        world.process_events().unwrap();
        assert_eq!(log.borrow().len(), 1);
    }
}
