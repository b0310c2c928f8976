//! Fixed-order update pipeline.
//!
//! Each [`Pipeline::tick`]:
//!
//! 1. Runs every registered system once, each with `&mut World` and the
//!    frame's [`FrameContext`]. Systems run in registration order unless an
//!    `after` dependency moves one behind a later-registered system.
//! 2. Drains the event bus once. Events published by handlers during this
//!    drain wait for the next frame.
//! 3. Applies the deferred command buffer (FIFO).
//!
//! An unknown dependency or a dependency cycle fails the tick with
//! [`SimError::Schedule`] before any system runs.
//!
//! A system returning `Err` aborts the frame: later systems, the drain and the
//! command apply are skipped and the error is returned wrapped in
//! [`SimError::System`].
//!
//! # Example
//!
//! ```
//! use emberwake_sim::prelude::*;
//!
//! let mut pipeline = Pipeline::new(World::new());
//! pipeline.add_system("noop", |_world: &mut World, _ctx: &FrameContext| -> Result<(), SimError> { Ok(()) });
//! pipeline.tick(&FrameContext::idle(1.0 / 60.0)).unwrap();
//! assert_eq!(pipeline.tick_count(), 1);
//! ```

use std::time::{Duration, Instant};

use emberwake_ecs::prelude::*;

use crate::context::FrameContext;
use crate::SimError;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// A unit of per-frame work. Systems own only their own small state (an
/// autosave timer, say); everything shared lives in the world.
pub trait System {
    fn run(&mut self, world: &mut World, ctx: &FrameContext) -> Result<(), SimError>;
}

impl<F> System for F
where
    F: FnMut(&mut World, &FrameContext) -> Result<(), SimError>,
{
    fn run(&mut self, world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
        self(world, ctx)
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing and bookkeeping for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    pub total_time: Duration,
    /// Events published during the tick, including those held for the next.
    pub events_published: u64,
    pub events_dispatched: usize,
    pub commands_applied: usize,
    pub commands_failed: usize,
}

struct RegisteredSystem {
    name: String,
    system: Box<dyn System>,
    after: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    world: World,
    systems: Vec<RegisteredSystem>,
    /// Resolved run order (indices into `systems`); cleared on registration.
    order: Option<Vec<usize>>,
    tick_counter: u64,
    last_diagnostics: TickDiagnostics,
}

impl Pipeline {
    pub fn new(world: World) -> Self {
        Self {
            world,
            systems: Vec::new(),
            order: None,
            tick_counter: 0,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Register a system. Without ordering constraints it runs after every
    /// system registered before it.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system(&mut self, name: &str, system: impl System + 'static) {
        self.add_system_after(name, &[], system);
    }

    /// Register a system that must run after each system named in `after`.
    ///
    /// Dependencies may be registered later. The run order is resolved at the
    /// next tick: registration order, except that a system is moved behind
    /// everything it depends on.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system_after(&mut self, name: &str, after: &[&str], system: impl System + 'static) {
        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            system: Box::new(system),
            after: after.iter().map(|s| s.to_string()).collect(),
        });
        self.order = None;
    }

    /// Stable topological order over the `after` edges.
    ///
    /// Each step takes the earliest-registered system whose dependencies have
    /// all been placed. Fails on an unknown dependency or a cycle.
    fn resolve_order(&self) -> Result<Vec<usize>, SimError> {
        let mut deps = Vec::with_capacity(self.systems.len());
        for system in &self.systems {
            let mut indices = Vec::with_capacity(system.after.len());
            for dep in &system.after {
                let idx = self
                    .systems
                    .iter()
                    .position(|s| s.name == *dep)
                    .ok_or_else(|| {
                        SimError::Schedule(format!(
                            "system '{}' runs after '{dep}', which is not registered",
                            system.name
                        ))
                    })?;
                indices.push(idx);
            }
            deps.push(indices);
        }

        let mut placed = vec![false; self.systems.len()];
        let mut order = Vec::with_capacity(self.systems.len());
        while order.len() < self.systems.len() {
            let ready = (0..self.systems.len())
                .find(|&i| !placed[i] && deps[i].iter().all(|&d| placed[d]));
            let Some(next) = ready else {
                let stuck: Vec<&str> = (0..self.systems.len())
                    .filter(|&i| !placed[i])
                    .map(|i| self.systems[i].name.as_str())
                    .collect();
                return Err(SimError::Schedule(format!(
                    "dependency cycle among systems: {}",
                    stuck.join(", ")
                )));
            };
            placed[next] = true;
            order.push(next);
        }
        Ok(order)
    }

    /// Resolve (if needed) and return the run order as system names.
    pub fn schedule(&mut self) -> Result<Vec<&str>, SimError> {
        if self.order.is_none() {
            self.order = Some(self.resolve_order()?);
        }
        let order = self.order.as_deref().unwrap_or_default();
        Ok(order.iter().map(|&i| self.systems[i].name.as_str()).collect())
    }

    /// Run one frame.
    pub fn tick(&mut self, ctx: &FrameContext) -> Result<&TickDiagnostics, SimError> {
        if self.order.is_none() {
            self.order = Some(self.resolve_order()?);
        }
        let tick_start = Instant::now();
        let (published_before, _) = self.world.events().totals();
        let mut system_times = Vec::with_capacity(self.systems.len());

        let order = self.order.as_deref().unwrap_or_default();
        for &idx in order {
            let entry = &mut self.systems[idx];
            let start = Instant::now();
            entry
                .system
                .run(&mut self.world, ctx)
                .map_err(|source| SimError::System {
                    name: entry.name.clone(),
                    source: Box::new(source),
                })?;
            system_times.push((entry.name.clone(), start.elapsed()));
        }

        let events_dispatched = self.world.process_events()?;
        let report = self.world.apply_commands();
        let (published_after, _) = self.world.events().totals();
        let events_published = published_after - published_before;
        self.tick_counter += 1;

        tracing::trace!(
            tick = self.tick_counter,
            events_published,
            events_dispatched,
            commands = report.success_count,
            "tick complete"
        );
        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            events_published,
            events_dispatched,
            commands_applied: report.success_count,
            commands_failed: report.failed_count,
        };
        Ok(&self.last_diagnostics)
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Names of all registered systems, in registration order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(u32);

    #[derive(Debug, Clone, Copy)]
    struct Ping;

    fn setup_pipeline() -> Pipeline {
        let mut world = World::new();
        world.register_component::<Counter>("counter");
        Pipeline::new(world)
    }

    fn noop(_world: &mut World, _ctx: &FrameContext) -> Result<(), SimError> {
        Ok(())
    }

    fn ctx() -> FrameContext {
        FrameContext::idle(1.0 / 60.0)
    }

    #[test]
    fn systems_run_in_registration_order() {
        let mut pipeline = setup_pipeline();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["alpha", "beta", "gamma"] {
            let sink = Rc::clone(&log);
            pipeline.add_system(name, move |_: &mut World, _: &FrameContext| -> Result<(), SimError> {
                sink.borrow_mut().push(name);
                Ok(())
            });
        }
        pipeline.tick(&ctx()).unwrap();
        assert_eq!(*log.borrow(), vec!["alpha", "beta", "gamma"]);
        assert_eq!(pipeline.system_names(), vec!["alpha", "beta", "gamma"]);
        assert_eq!(pipeline.last_diagnostics().system_times.len(), 3);
    }

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_system_name_panics() {
        let mut pipeline = setup_pipeline();
        pipeline.add_system("movement", noop);
        pipeline.add_system("movement", noop);
    }

    #[test]
    fn unknown_dependency_fails_the_tick() {
        let mut pipeline = setup_pipeline();
        pipeline.add_system_after("combat", &["movement"], noop);
        let err = pipeline.tick(&ctx()).unwrap_err();
        assert!(matches!(err, SimError::Schedule(ref msg) if msg.contains("'movement'")));
        assert_eq!(pipeline.tick_count(), 0);
    }

    #[test]
    fn dependency_cycle_fails_the_tick() {
        let mut pipeline = setup_pipeline();
        pipeline.add_system("input", noop);
        pipeline.add_system_after("ai", &["movement"], noop);
        pipeline.add_system_after("movement", &["ai"], noop);
        let err = pipeline.schedule().unwrap_err();
        assert!(matches!(err, SimError::Schedule(ref msg) if msg.contains("cycle") && msg.contains("ai")));
        assert!(pipeline.tick(&ctx()).is_err());
    }

    #[test]
    fn later_registered_dependency_moves_the_dependent() {
        let mut pipeline = setup_pipeline();
        let log = Rc::new(RefCell::new(Vec::new()));
        let logging = |name: &'static str| {
            let sink = Rc::clone(&log);
            move |_: &mut World, _: &FrameContext| -> Result<(), SimError> {
                sink.borrow_mut().push(name);
                Ok(())
            }
        };
        pipeline.add_system("input", logging("input"));
        pipeline.add_system_after("hitboxes", &["movement"], logging("hitboxes"));
        pipeline.add_system("ai", logging("ai"));
        pipeline.add_system_after("movement", &["input"], logging("movement"));

        assert_eq!(pipeline.schedule().unwrap(), vec!["input", "ai", "movement", "hitboxes"]);
        pipeline.tick(&ctx()).unwrap();
        assert_eq!(*log.borrow(), vec!["input", "ai", "movement", "hitboxes"]);
        assert_eq!(pipeline.system_names(), vec!["input", "hitboxes", "ai", "movement"]);
    }

    #[test]
    fn events_drain_once_and_commands_apply_after_systems() {
        let mut pipeline = setup_pipeline();
        let seen = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&seen);
        pipeline.world_mut().subscribe::<Ping, _>(move |world, _| {
            *sink.borrow_mut() += 1;
            // Re-published pings land in the next frame.
            world.publish(Ping);
        });
        pipeline.add_system("spawner", |world: &mut World, _: &FrameContext| -> Result<(), SimError> {
            world.commands().spawn((Counter(0),), "test spawn");
            assert_eq!(world.count::<Counter>(), 0);
            Ok(())
        });
        pipeline.world_mut().publish(Ping);

        let diag = pipeline.tick(&ctx()).unwrap();
        assert_eq!(diag.events_dispatched, 1);
        assert_eq!(diag.events_published, 1, "the re-published ping");
        assert_eq!(diag.commands_applied, 1);
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(pipeline.world().count::<Counter>(), 1);

        pipeline.tick(&ctx()).unwrap();
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn failing_system_aborts_the_frame() {
        let mut pipeline = setup_pipeline();
        let reached = Rc::new(RefCell::new(false));
        pipeline.add_system("broken", |_: &mut World, _: &FrameContext| -> Result<(), SimError> {
            Err(SimError::MissingResource("Nothing"))
        });
        let sink = Rc::clone(&reached);
        pipeline.add_system("after", move |_: &mut World, _: &FrameContext| -> Result<(), SimError> {
            *sink.borrow_mut() = true;
            Ok(())
        });

        let err = pipeline.tick(&ctx()).unwrap_err();
        assert!(matches!(err, SimError::System { ref name, .. } if name == "broken"));
        assert!(!*reached.borrow());
        assert_eq!(pipeline.tick_count(), 0);
    }

    struct CountingSystem {
        runs: Rc<RefCell<u32>>,
    }

    impl System for CountingSystem {
        fn run(&mut self, world: &mut World, _ctx: &FrameContext) -> Result<(), SimError> {
            *self.runs.borrow_mut() += 1;
            world.for_each_mut::<Counter>(|_, c| c.0 += 1);
            Ok(())
        }
    }

    #[test]
    fn struct_systems_keep_their_state() {
        let mut pipeline = setup_pipeline();
        let e = pipeline.world_mut().spawn_with(Counter(0)).unwrap();
        let runs = Rc::new(RefCell::new(0));
        pipeline.add_system("count", CountingSystem { runs: Rc::clone(&runs) });
        for _ in 0..3 {
            pipeline.tick(&ctx()).unwrap();
        }
        assert_eq!(*runs.borrow(), 3);
        assert_eq!(pipeline.world().get::<Counter>(e), Some(&Counter(3)));
    }
}
