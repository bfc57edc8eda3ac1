use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gust_core::prelude::{AgentBailError, ShutdownHandle, ShutdownSignalError};

use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};
use crate::definition::AgentHookMut;

/// Counters shared between the pool, its virtual users and anything displaying progress.
#[derive(Debug, Clone, Default)]
pub(crate) struct VuCounters {
    desired: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    iterations: Arc<AtomicU64>,
    bailed: Arc<AtomicUsize>,
}

impl VuCounters {
    pub(crate) fn desired(&self) -> usize {
        self.desired.load(Ordering::Acquire)
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub(crate) fn bailed(&self) -> usize {
        self.bailed.load(Ordering::Acquire)
    }
}

pub(crate) struct AgentHooks<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub setup: Option<AgentHookMut<RV, V>>,
    pub behaviour: AgentHookMut<RV, V>,
    pub teardown: Option<AgentHookMut<RV, V>>,
}

// Derived impls would require `RV: Copy` and `V: Copy`.
impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for AgentHooks<RV, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Copy for AgentHooks<RV, V> {}

#[derive(Default)]
struct Slot {
    occupied: Arc<AtomicBool>,
    bailed: Arc<AtomicBool>,
}

/// The set of virtual users.
///
/// Each virtual user owns a numbered slot. The ramp publishes how many virtual users it wants
/// through [VirtualUserPool::scale_to] and the pool spawns a thread for every free slot below that
/// number. Virtual users in slots at or above the number retire themselves once their current
/// iteration is complete, so a ramp down never interrupts a request.
pub(crate) struct VirtualUserPool<RV: UserValuesConstraint, V: UserValuesConstraint> {
    runner_context: Arc<RunnerContext<RV>>,
    hooks: AgentHooks<RV, V>,
    stop_handle: ShutdownHandle,
    counters: VuCounters,
    slots: Vec<Slot>,
    handles: Vec<JoinHandle<()>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VirtualUserPool<RV, V> {
    pub(crate) fn new(
        runner_context: Arc<RunnerContext<RV>>,
        hooks: AgentHooks<RV, V>,
        stop_handle: ShutdownHandle,
    ) -> Self {
        Self {
            runner_context,
            hooks,
            stop_handle,
            counters: VuCounters::default(),
            slots: Vec::new(),
            handles: Vec::new(),
        }
    }

    pub(crate) fn counters(&self) -> &VuCounters {
        &self.counters
    }

    /// Spawn or retire virtual users so that `target` are active.
    ///
    /// Slots whose virtual user bailed are never refilled.
    pub(crate) fn scale_to(&mut self, target: usize) -> anyhow::Result<()> {
        let previous = self.counters.desired.swap(target, Ordering::AcqRel);
        if previous != target {
            log::trace!("Scaling virtual users from {} to {}", previous, target);
        }

        if self.stop_handle.is_shutdown() {
            return Ok(());
        }

        while self.slots.len() < target {
            self.slots.push(Slot::default());
        }

        for index in 0..target {
            let slot = &self.slots[index];
            if slot.bailed.load(Ordering::Acquire) || slot.occupied.load(Ordering::Acquire) {
                continue;
            }

            slot.occupied.store(true, Ordering::Release);
            let active = self.counters.active.fetch_add(1, Ordering::AcqRel) + 1;
            self.counters.peak.fetch_max(active, Ordering::AcqRel);

            match self.spawn_virtual_user(index) {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    let slot = &self.slots[index];
                    slot.occupied.store(false, Ordering::Release);
                    self.counters.active.fetch_sub(1, Ordering::AcqRel);
                    return Err(e);
                }
            }
        }

        self.handles.retain(|handle| !handle.is_finished());

        Ok(())
    }

    fn spawn_virtual_user(&self, index: usize) -> anyhow::Result<JoinHandle<()>> {
        let slot = &self.slots[index];
        let virtual_user = VirtualUser {
            index,
            runner_context: self.runner_context.clone(),
            hooks: self.hooks,
            stop_handle: self.stop_handle.clone(),
            counters: self.counters.clone(),
            occupied: slot.occupied.clone(),
            bailed: slot.bailed.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(format!("vu-{}", index))
            .spawn(move || virtual_user.run())?;

        Ok(handle)
    }

    /// Wait for every virtual user to exit, giving up after `timeout`.
    ///
    /// Returns `true` if all virtual users exited in time.
    pub(crate) fn wait_for_idle(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while self.counters.active() > 0 {
            if started.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        true
    }

    /// Join every virtual user thread. Only call this once the scenario has been stopped.
    pub(crate) fn join_all(&mut self) -> anyhow::Result<()> {
        for handle in self.handles.drain(..) {
            handle
                .join()
                .map_err(|e| anyhow::anyhow!("Error joining thread for virtual user: {:?}", e))?;
        }

        Ok(())
    }
}

struct VirtualUser<RV: UserValuesConstraint, V: UserValuesConstraint> {
    index: usize,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: AgentHooks<RV, V>,
    stop_handle: ShutdownHandle,
    counters: VuCounters,
    occupied: Arc<AtomicBool>,
    bailed: Arc<AtomicBool>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VirtualUser<RV, V> {
    fn run(self) {
        let mut context = AgentContext::<RV, V>::new(
            self.index,
            self.runner_context.clone(),
            self.stop_handle.new_listener(),
        );
        // For us to check if the virtual user should stop between iterations
        let mut cycle_stop_listener = self.stop_handle.new_listener();

        log::debug!("Starting virtual user {}", context.agent_id());

        let setup_ok = match self.hooks.setup {
            Some(setup) => match setup(&mut context) {
                Ok(()) => true,
                Err(e) => {
                    // A failed setup retires the slot, the same as a bail.
                    log::error!("Agent setup failed for {}: {:?}", context.agent_id(), e);
                    self.bailed.store(true, Ordering::Release);
                    self.counters.bailed.fetch_add(1, Ordering::AcqRel);
                    false
                }
            },
            None => true,
        };

        if setup_ok {
            loop {
                if cycle_stop_listener.should_shutdown() {
                    log::debug!("Stopping virtual user {}", context.agent_id());
                    break;
                }

                if self.index >= self.counters.desired() {
                    log::debug!("Retiring virtual user {}", context.agent_id());
                    break;
                }

                match (self.hooks.behaviour)(&mut context) {
                    Ok(()) => {}
                    Err(e) if e.is::<ShutdownSignalError>() => {
                        // Expected if the runner is shutting down, the stop check will catch this.
                    }
                    Err(e) if e.is::<AgentBailError>() => {
                        log::warn!("Virtual user {} is bailing: {}", context.agent_id(), e);
                        self.bailed.store(true, Ordering::Release);
                        self.counters.bailed.fetch_add(1, Ordering::AcqRel);
                        break;
                    }
                    Err(e) => {
                        log::error!("Agent behaviour failed for {}: {:?}", context.agent_id(), e);
                    }
                }

                context.complete_iteration();
                self.counters.iterations.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(teardown) = self.hooks.teardown {
            if let Err(e) = teardown(&mut context) {
                log::error!("Agent teardown failed for {}: {:?}", context.agent_id(), e);
            }
        }

        log::trace!(
            "Virtual user {} exiting after {} iterations",
            context.agent_id(),
            context.iteration()
        );

        // Release the slot last so the ramp can't start a replacement while this one is still
        // tearing down.
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
        self.occupied.store(false, Ordering::Release);
    }
}
