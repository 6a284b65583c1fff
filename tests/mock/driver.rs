//! State driver tests against the fake provider.

use std::time::Duration;

use crate::common::FakeCloud;

use cloudfixtures::types::{Action, ResourceKind, ResourceState, VmState};
use cloudfixtures::{HarnessConfig, StateDriver, Transition};
use tokio::time::Instant;

fn short_budget() -> HarnessConfig {
    HarnessConfig::new()
        .poll_interval(Duration::from_secs(10))
        .state_budget(Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn test_already_in_target_issues_no_action() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Running);
    let config = HarnessConfig::default();
    let started = Instant::now();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Running)
        .await;

    assert_eq!(outcome, Transition::Reached);
    assert!(cloud.actions().is_empty());
    // No polling either.
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_terminated_target_is_unreachable() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Running);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Terminated)
        .await;

    assert_eq!(
        outcome,
        Transition::Unreachable {
            from: VmState::Running,
            to: VmState::Terminated,
        }
    );
    assert!(cloud.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_already_terminated_vm_is_at_terminated_target() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Terminated);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Terminated)
        .await;
    assert!(outcome.is_reached());
}

#[tokio::test(start_paused = true)]
async fn test_terminated_vm_cannot_be_started() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Terminated);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Running)
        .await;

    assert!(matches!(outcome, Transition::Unreachable { .. }));
    assert!(cloud.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_settles_before_acting() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Pending);
    cloud.script("i-1", [VmState::Pending, VmState::Pending, VmState::Stopped]);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Running)
        .await;

    assert_eq!(outcome, Transition::Reached);
    assert_eq!(cloud.actions_on("i-1"), [Action::Start]);
    assert_eq!(
        cloud.state_of(ResourceKind::Vm, "i-1"),
        Some(ResourceState::Machine(VmState::Running))
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_state_settling_into_target() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Stopping);
    cloud.script("i-1", [VmState::Stopping, VmState::Stopped]);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Stopped)
        .await;

    assert_eq!(outcome, Transition::Reached);
    assert!(cloud.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_paused_from_stopped_starts_first() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Stopped);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Paused)
        .await;

    assert_eq!(outcome, Transition::Reached);
    assert_eq!(cloud.actions_on("i-1"), [Action::Start, Action::Pause]);
}

#[tokio::test(start_paused = true)]
async fn test_suspended_to_stopped_resumes_first() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Suspended);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Stopped)
        .await;

    assert_eq!(outcome, Transition::Reached);
    assert_eq!(cloud.actions_on("i-1"), [Action::Resume, Action::Stop]);
}

#[tokio::test(start_paused = true)]
async fn test_no_destructive_action_is_ever_issued() {
    let config = HarnessConfig::default();
    let states = [
        VmState::Running,
        VmState::Paused,
        VmState::Stopped,
        VmState::Suspended,
    ];

    for from in states {
        for to in states.into_iter().chain([VmState::Terminated]) {
            let cloud = FakeCloud::new();
            cloud.insert_vm("i-1", from);
            let _ = StateDriver::new(&cloud, &config).drive_to("i-1", to).await;

            assert!(
                cloud.actions().iter().all(|(_, _, action)| !action.is_destructive()),
                "{from} -> {to}"
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_pause_is_unreachable() {
    let mut cloud = FakeCloud::new();
    cloud.capabilities.compute.pause = false;
    cloud.insert_vm("i-1", VmState::Running);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Paused)
        .await;

    assert_eq!(
        outcome,
        Transition::Unreachable {
            from: VmState::Running,
            to: VmState::Paused,
        }
    );
    assert!(cloud.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_last_step_skips_whole_plan() {
    let mut cloud = FakeCloud::new();
    cloud.capabilities.compute.suspend = false;
    cloud.insert_vm("i-1", VmState::Stopped);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Suspended)
        .await;

    assert!(matches!(outcome, Transition::Unreachable { .. }));
    // Not even started.
    assert!(cloud.actions().is_empty());
    assert_eq!(
        cloud.state_of(ResourceKind::Vm, "i-1"),
        Some(ResourceState::Machine(VmState::Stopped))
    );
}

#[tokio::test(start_paused = true)]
async fn test_given_capabilities_take_precedence() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Running);
    let config = HarnessConfig::default();
    let mut capabilities = cloud.capabilities;
    capabilities.compute.start_stop = false;

    let outcome = StateDriver::new(&cloud, &config)
        .with_capabilities(capabilities)
        .drive_to("i-1", VmState::Stopped)
        .await;

    assert!(matches!(outcome, Transition::Unreachable { .. }));
    assert!(cloud.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_vm_vanishes() {
    let cloud = FakeCloud::new();
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-unknown", VmState::Running)
        .await;
    assert_eq!(outcome, Transition::Vanished);
}

#[tokio::test(start_paused = true)]
async fn test_failed_lookups_are_retried() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Stopped);
    cloud.fail_lookups(2);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Running)
        .await;

    assert_eq!(outcome, Transition::Reached);
    assert_eq!(cloud.actions_on("i-1"), [Action::Start]);
}

#[tokio::test(start_paused = true)]
async fn test_unobservable_vm_times_out() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Stopped);
    cloud.fail_lookups(usize::MAX);
    let config = short_budget();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Running)
        .await;

    assert_eq!(outcome, Transition::TimedOut { last: None });
    assert!(cloud.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_action_is_reported() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Stopped);
    cloud.fail_action(Action::Start);
    let config = HarnessConfig::default();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Paused)
        .await;

    assert_eq!(outcome, Transition::ActionFailed(Action::Start));
    // The second step is never attempted.
    assert_eq!(cloud.actions_on("i-1"), [Action::Start]);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_transient_state_times_out() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Rebooting);
    let config = short_budget();
    let started = Instant::now();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Running)
        .await;

    assert_eq!(
        outcome,
        Transition::TimedOut {
            last: Some(VmState::Rebooting)
        }
    );
    assert!(cloud.actions().is_empty());
    assert!(started.elapsed() >= config.state_budget);
}

#[tokio::test(start_paused = true)]
async fn test_ignored_action_times_out() {
    let cloud = FakeCloud::new();
    cloud.insert_vm("i-1", VmState::Stopped);
    cloud.stall_action(Action::Start);
    let config = short_budget();

    let outcome = StateDriver::new(&cloud, &config)
        .drive_to("i-1", VmState::Running)
        .await;

    assert_eq!(
        outcome,
        Transition::TimedOut {
            last: Some(VmState::Stopped)
        }
    );
    assert_eq!(cloud.actions_on("i-1"), [Action::Start]);
}
