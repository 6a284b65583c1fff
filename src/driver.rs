//! Drives a VM into a requested state.
//!
//! A transition runs in three phases:
//!
//! 1. **Settle** - while the VM is in a transient state (pending, pausing,
//!    rebooting, stopping, suspending) poll until it is stable.
//! 2. **Act** - compute a [`Plan`] from the stable state and issue its
//!    actions. Paused, stopped and suspended are only reachable from running,
//!    so a plan has at most two steps: back to running, then the real action.
//!    A plan with a step the provider does not support is not started.
//! 3. **Confirm** - after each action, poll until the expected state shows up.
//!
//! Each polling phase has its own budget ([`HarnessConfig::state_budget`]).
//! Failures are reported through [`Transition`], never as errors, so callers
//! can decide between pass, skip and fail. Termination is never reached this
//! way; it is a destructive action outside this state machine.

use std::fmt;

use tokio::time::{sleep, Instant};

use crate::config::HarnessConfig;
use crate::types::{Action, Capabilities, ResourceKind, VmState};
use crate::{best_effort, ProviderError, ResourceAction};

/// Outcome of [`StateDriver::drive_to`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The VM is in the requested state.
    Reached,
    /// No plan leads from the observed state to the target.
    Unreachable { from: VmState, to: VmState },
    /// The VM no longer exists.
    Vanished,
    /// The provider rejected an action.
    ActionFailed(Action),
    /// A polling phase ran out of budget; `last` is the last state seen.
    TimedOut { last: Option<VmState> },
}

impl Transition {
    /// Returns `true` if the VM reached the requested state.
    pub fn is_reached(&self) -> bool {
        matches!(self, Transition::Reached)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reached => write!(f, "reached"),
            Self::Unreachable { from, to } => write!(f, "no transition from {from} to {to}"),
            Self::Vanished => write!(f, "VM disappeared"),
            Self::ActionFailed(action) => write!(f, "{action} failed"),
            Self::TimedOut { last: Some(state) } => write!(f, "timed out in state {state}"),
            Self::TimedOut { last: None } => write!(f, "timed out without observing the VM"),
        }
    }
}

/// One action and the state it should lead to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub expect: VmState,
}

/// The actions that take a stable VM to a target state.
///
/// Empty if the VM is already there; never longer than two steps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Computes the plan from `current` to `target`.
    ///
    /// Returns `None` when `target` cannot be reached by this driver: a
    /// terminated VM, a transient or terminated target, or a transient
    /// starting point.
    pub fn between(current: VmState, target: VmState) -> Option<Self> {
        if current == target {
            return Some(Self::default());
        }
        if current == VmState::Terminated || current.is_transient() {
            return None;
        }

        let to_running = match current {
            VmState::Running => None,
            VmState::Paused => Some(Action::Unpause),
            VmState::Stopped => Some(Action::Start),
            VmState::Suspended => Some(Action::Resume),
            _ => return None,
        };
        let last = match target {
            VmState::Running => None,
            VmState::Paused => Some(Action::Pause),
            VmState::Stopped => Some(Action::Stop),
            VmState::Suspended => Some(Action::Suspend),
            _ => return None,
        };

        let mut steps = Vec::with_capacity(2);
        if let Some(action) = to_running {
            steps.push(Step {
                action,
                expect: VmState::Running,
            });
        }
        if let Some(action) = last {
            steps.push(Step {
                action,
                expect: target,
            });
        }
        Some(Self { steps })
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns `true` if nothing needs to be done.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Drives single VMs through provider-reported states.
///
/// Polling is sequential; callers that need several VMs driven at once run
/// several drivers concurrently.
#[derive(Debug)]
pub struct StateDriver<'a, P> {
    provider: &'a P,
    config: &'a HarnessConfig,
    capabilities: Option<Capabilities>,
}

impl<'a, P: ResourceAction> StateDriver<'a, P> {
    /// Creates a driver over a provider.
    ///
    /// The provider's capabilities are queried the first time a plan needs
    /// an action.
    pub fn new(provider: &'a P, config: &'a HarnessConfig) -> Self {
        Self {
            provider,
            config,
            capabilities: None,
        }
    }

    /// Uses already known capabilities instead of querying the provider.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Drives the VM `vm_id` to `target`.
    ///
    /// Issues no action at all if the VM is already in `target`.
    pub async fn drive_to(&self, vm_id: &str, target: VmState) -> Transition {
        let current = match self.first_observation(vm_id).await {
            Ok(state) => state,
            Err(outcome) => return outcome,
        };

        if current == target {
            return Transition::Reached;
        }
        if target == VmState::Terminated {
            return Transition::Unreachable {
                from: current,
                to: target,
            };
        }

        let stable = match self.settle(vm_id, current).await {
            Ok(state) => state,
            Err(outcome) => return outcome,
        };

        let Some(plan) = Plan::between(stable, target) else {
            log::warn!("VM {vm_id}: no transition from {stable} to {target}");
            return Transition::Unreachable {
                from: stable,
                to: target,
            };
        };

        if !plan.is_empty() {
            if let Some(step) = self.first_unsupported(&plan).await {
                log::warn!(
                    "VM {vm_id}: provider cannot {}, {target} is out of reach",
                    step.action
                );
                return Transition::Unreachable {
                    from: stable,
                    to: target,
                };
            }
        }

        for step in plan.steps() {
            debug_assert!(!step.action.is_destructive());
            log::debug!("VM {vm_id}: {} to reach {}", step.action, step.expect);
            if let Err(err) = self
                .provider
                .perform(ResourceKind::Vm, vm_id, step.action)
                .await
            {
                log::warn!("VM {vm_id}: {} failed: {err}", step.action);
                return Transition::ActionFailed(step.action);
            }
            if let Err(outcome) = self.confirm(vm_id, step.expect).await {
                return outcome;
            }
        }

        log::info!("VM {vm_id} is {target}");
        Transition::Reached
    }

    /// Observes the VM, retrying failed lookups until the budget is spent.
    async fn first_observation(&self, vm_id: &str) -> Result<VmState, Transition> {
        let started = Instant::now();

        loop {
            match self.observe(vm_id).await {
                Ok(Some(state)) => return Ok(state),
                Ok(None) => return Err(Transition::Vanished),
                Err(err) => log::debug!("VM {vm_id}: lookup failed: {err}"),
            }

            if started.elapsed() >= self.config.state_budget {
                log::warn!("VM {vm_id} could not be observed");
                return Err(Transition::TimedOut { last: None });
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Polls while the VM is in a transient state.
    async fn settle(&self, vm_id: &str, mut state: VmState) -> Result<VmState, Transition> {
        let started = Instant::now();

        while state.is_transient() {
            if started.elapsed() >= self.config.state_budget {
                log::warn!("VM {vm_id} did not settle, still {state}");
                return Err(Transition::TimedOut { last: Some(state) });
            }
            sleep(self.config.poll_interval).await;

            match self.observe(vm_id).await {
                Ok(Some(observed)) => {
                    if observed != state {
                        log::debug!("VM {vm_id}: {state} -> {observed}");
                    }
                    state = observed;
                }
                Ok(None) => return Err(Transition::Vanished),
                Err(err) => log::debug!("VM {vm_id}: poll failed: {err}"),
            }
        }

        Ok(state)
    }

    /// Polls until the VM reports `expect`.
    async fn confirm(&self, vm_id: &str, expect: VmState) -> Result<(), Transition> {
        let started = Instant::now();
        let mut last = None;

        loop {
            sleep(self.config.poll_interval).await;

            match self.observe(vm_id).await {
                Ok(Some(state)) if state == expect => return Ok(()),
                Ok(Some(state)) => last = Some(state),
                Ok(None) => return Err(Transition::Vanished),
                Err(err) => log::debug!("VM {vm_id}: poll failed: {err}"),
            }

            if started.elapsed() >= self.config.state_budget {
                log::warn!("VM {vm_id} never reached {expect}, last seen {last:?}");
                return Err(Transition::TimedOut { last });
            }
        }
    }

    /// Returns the first step of `plan` the provider does not support.
    ///
    /// If the capabilities cannot be queried every action is attempted.
    async fn first_unsupported(&self, plan: &Plan) -> Option<Step> {
        let capabilities = match self.capabilities {
            Some(capabilities) => capabilities,
            None => {
                let queried = self.provider.capabilities().await;
                best_effort(format_args!("query capabilities"), queried)?
            }
        };

        plan.steps()
            .iter()
            .find(|step| !capabilities.compute.supports(step.action))
            .copied()
    }

    async fn observe(
        &self,
        vm_id: &str,
    ) -> Result<Option<VmState>, ProviderError<P::CustomError>> {
        let resource = self.provider.get(ResourceKind::Vm, vm_id).await?;
        Ok(resource.and_then(|resource| resource.state.vm_state()))
    }
}
