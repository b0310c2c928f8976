//! Deferred structural changes.
//!
//! Systems that walk a component table cannot spawn or despawn entities in
//! the middle of the walk. They queue the change on the world's
//! [`CommandBuffer`] instead, and the update pipeline applies the buffer once
//! at the end of the frame, in strict FIFO order.
//!
//! A command aimed at an entity that died before the buffer was applied is
//! skipped with a warning and counted in the [`ApplyReport`]; it is not an
//! error, because targets dying mid-frame is normal gameplay.
//!
//! ```
//! use emberwake_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Health(u32);
//!
//! let mut world = World::new();
//! world.register_component::<Health>("health");
//! let entity = world.spawn_with(Health(100)).unwrap();
//!
//! world.commands().insert(entity, Health(50), "damage_applied");
//! world.commands().despawn(entity, "died");
//! let report = world.apply_commands();
//!
//! assert_eq!(report.success_count, 2);
//! assert!(!world.is_alive(entity));
//! ```

use std::fmt;

use crate::bundle::Bundle;
use crate::component::Component;
use crate::entity::Entity;
use crate::world::World;
use crate::EcsError;

type Op = Box<dyn FnOnce(&mut World) -> Result<Option<Entity>, EcsError>>;

/// What a queued command does, for logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Spawn,
    Insert { component: &'static str },
    Remove { component: &'static str },
    Despawn,
}

/// One queued mutation.
pub struct Command {
    pub target: Option<Entity>,
    pub kind: CommandKind,
    /// Why the mutation was issued, e.g. `"hitbox_expired"`.
    pub reason: &'static str,
    pub index: u32,
    op: Op,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("reason", &self.reason)
            .field("index", &self.index)
            .finish()
    }
}

/// Outcome of one [`World::apply_commands`] call.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub success_count: usize,
    pub failed_count: usize,
    /// Entities created by spawn commands, in queue order.
    pub spawned: Vec<Entity>,
}

/// FIFO queue of deferred mutations.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_index: u32,
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("len", &self.commands.len())
            .finish()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, target: Option<Entity>, kind: CommandKind, reason: &'static str, op: Op) {
        let index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            target,
            kind,
            reason,
            index,
            op,
        });
    }

    /// Queue a spawn of a new entity carrying `bundle`.
    pub fn spawn<B: Bundle + 'static>(&mut self, bundle: B, reason: &'static str) {
        self.push(
            None,
            CommandKind::Spawn,
            reason,
            Box::new(move |world: &mut World| world.spawn_bundle(bundle).map(Some)),
        );
    }

    /// Queue an insert-or-overwrite of `value` on `target`.
    pub fn insert<T: Component>(&mut self, target: Entity, value: T, reason: &'static str) {
        self.push(
            Some(target),
            CommandKind::Insert {
                component: std::any::type_name::<T>(),
            },
            reason,
            Box::new(move |world: &mut World| world.insert(target, value).map(|_| None)),
        );
    }

    /// Queue removal of `T` from `target`.
    pub fn remove<T: Component>(&mut self, target: Entity, reason: &'static str) {
        self.push(
            Some(target),
            CommandKind::Remove {
                component: std::any::type_name::<T>(),
            },
            reason,
            Box::new(move |world: &mut World| world.remove::<T>(target).map(|_| None)),
        );
    }

    /// Queue destruction of `target` and all of its components.
    pub fn despawn(&mut self, target: Entity, reason: &'static str) {
        self.push(
            Some(target),
            CommandKind::Despawn,
            reason,
            Box::new(move |world: &mut World| world.despawn(target).map(|_| None)),
        );
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Whether a despawn of `entity` is already queued.
    pub fn despawn_queued(&self, entity: Entity) -> bool {
        self.commands
            .iter()
            .any(|c| c.kind == CommandKind::Despawn && c.target == Some(entity))
    }

    pub(crate) fn take(&mut self) -> Vec<Command> {
        self.next_index = 0;
        std::mem::take(&mut self.commands)
    }

    /// Apply `commands` to `world` in queue order.
    pub(crate) fn run(commands: Vec<Command>, world: &mut World) -> ApplyReport {
        let mut report = ApplyReport::default();
        for command in commands {
            let Command {
                target,
                kind,
                reason,
                index,
                op,
            } = command;
            match op(world) {
                Ok(spawned) => {
                    report.success_count += 1;
                    report.spawned.extend(spawned);
                }
                Err(err) => {
                    report.failed_count += 1;
                    tracing::warn!(
                        command_index = index,
                        ?target,
                        ?kind,
                        reason,
                        error = %err,
                        "deferred command skipped"
                    );
                }
            }
        }
        report
    }
}
