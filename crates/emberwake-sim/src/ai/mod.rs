//! Enemy AI.
//!
//! Every enemy carries an [`AiBehaviorStateMachine`] plus exactly one role
//! config ([`ChargerConfig`], [`RangedConfig`], [`BufferConfig`] or
//! [`ProtectorConfig`]). Each role has its own system; all of them read the
//! machine, decide, and write back `MoveIntent` and the machine. Stunned or
//! dying enemies are skipped entirely for the frame.

pub mod buffer;
pub mod charger;
pub mod protector;
pub mod ranged;

pub use buffer::{buffer_ai_system, BufferConfig};
pub use charger::{charger_ai_system, ChargerConfig};
pub use protector::{protector_ai_system, ProtectorConfig};
pub use ranged::{ranged_ai_system, RangedConfig};

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::components::{is_targetable, Dead, MoveIntent};
use crate::status::is_stunned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiState {
    /// Looking for something to do.
    Seeking,
    /// Locked in and winding up; cannot be cancelled.
    Committing,
    /// Aiming or executing an attack.
    Attacking,
    /// Recovering after an attack.
    Cooldown,
    /// Escorting an ally.
    Guarding,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiBehaviorStateMachine {
    pub state: AiState,
    /// Counts down inside timed states (windup, aim).
    pub state_timer: f32,
    pub cooldown_timer: f32,
    /// Current target or ward. `None` means no target.
    pub target: Option<Entity>,
    /// Direction locked in at commit time.
    pub aim: Vec2,
}

impl Default for AiBehaviorStateMachine {
    fn default() -> Self {
        Self {
            state: AiState::Seeking,
            state_timer: 0.0,
            cooldown_timer: 0.0,
            target: None,
            aim: Vec2::X,
        }
    }
}

impl AiBehaviorStateMachine {
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn transition(&mut self, entity: Entity, to: AiState) {
        if self.state != to {
            tracing::trace!(?entity, from = ?self.state, ?to, "ai transition");
        }
        self.state = to;
    }
}

/// Enemies with role `C` that may act this frame.
pub(crate) fn active_agents<C: Component>(world: &World) -> Vec<Entity> {
    world
        .entities_with::<(&C, &AiBehaviorStateMachine)>()
        .into_iter()
        .filter(|&e| !world.has::<Dead>(e) && !is_stunned(world, e))
        .collect()
}

pub(crate) fn set_intent(world: &mut World, entity: Entity, direction: Vec2) {
    if let Some(intent) = world.get_mut::<MoveIntent>(entity) {
        intent.0 = direction;
    }
}

/// Drop a target that died or vanished.
pub(crate) fn validate_target(world: &World, machine: &mut AiBehaviorStateMachine) {
    if machine.target.is_some_and(|t| !is_targetable(world, t)) {
        machine.target = None;
    }
}
