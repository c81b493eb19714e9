//! Slashing and forgiveness, applied lazily per holder

mod common;

use common::Network;
use zeratul_delegation::{DelegationError, DelegationState};

/// alice 400 and bob 600 delegated from epoch 1
fn delegated_network() -> (Network, u64, u64) {
    let mut net = Network::new();
    let alice = net
        .controller
        .delegate(net.alice, net.validator, 400, 3, "")
        .unwrap();
    let bob = net
        .controller
        .delegate(net.bob, net.validator, 600, 3, "")
        .unwrap();
    net.controller.accept_pending_delegation(net.node, alice).unwrap();
    net.controller.accept_pending_delegation(net.node, bob).unwrap();
    net.next_epoch();
    (net, alice, bob)
}

#[test]
fn test_slash_scales_every_delegation() {
    let (mut net, alice, bob) = delegated_network();
    assert_eq!(net.validator_total(), 1_000);

    net.next_epoch();
    assert_eq!(net.controller.slash(net.validator, 100).unwrap(), 100);
    assert_eq!(net.validator_total(), 900);

    assert_eq!(net.delegated(net.alice), 360);
    assert_eq!(net.delegated(net.bob), 540);
    assert_eq!(net.controller.get_and_update_slashed_amount(net.alice).unwrap(), 40);
    assert_eq!(net.controller.get_and_update_slashed_amount(net.bob).unwrap(), 60);

    // slashed tokens stay locked
    assert_eq!(net.locked(net.alice), 400);
    assert_eq!(net.controller.get_delegation(alice).unwrap().effective_amount(), 360);
    assert_eq!(net.controller.get_delegation(bob).unwrap().slashed, 60);
}

#[test]
fn test_slash_before_scheduled_release() {
    let (mut net, alice, _) = delegated_network();
    net.controller.request_undelegation(net.alice, alice).unwrap();
    assert_eq!(net.locked(net.alice), 400);

    net.next_epoch();
    net.controller.slash(net.validator, 100).unwrap();

    // alice is only caught up three epochs later
    net.skip_epochs(3);
    assert_eq!(
        net.controller.get_state(alice).unwrap(),
        DelegationState::Completed
    );
    assert_eq!(net.delegated(net.alice), 0);
    assert_eq!(net.locked(net.alice), 40);
    assert_eq!(net.controller.get_and_update_slashed_amount(net.alice).unwrap(), 40);

    // only bob's slashed stake is left with the validator
    assert_eq!(net.validator_total(), 540);
}

#[test]
fn test_slash_in_an_epoch_already_read() {
    let (mut net, _, _) = delegated_network();
    net.next_epoch();
    assert_eq!(net.delegated(net.alice), 400);
    assert_eq!(net.locked(net.alice), 400);

    net.controller.slash(net.validator, 500).unwrap();
    assert_eq!(net.delegated(net.alice), 200);
    assert_eq!(net.locked(net.alice), 400);
}

#[test]
fn test_undelegation_after_slash_releases_effective_amount() {
    let (mut net, _, bob) = delegated_network();
    net.next_epoch();
    net.controller.slash(net.validator, 100).unwrap();

    net.controller.request_undelegation(net.bob, bob).unwrap();
    assert_eq!(net.controller.get_delegation(bob).unwrap().finished, Some(4));

    net.skip_epochs(2);
    assert_eq!(net.delegated(net.bob), 0);
    assert_eq!(net.locked(net.bob), 60);
}

#[test]
fn test_delegation_not_yet_started_is_not_slashed() {
    let mut net = Network::new();
    let alice = net
        .controller
        .delegate(net.alice, net.validator, 400, 3, "")
        .unwrap();
    net.controller.accept_pending_delegation(net.node, alice).unwrap();

    net.next_epoch();
    let bob = net
        .controller
        .delegate(net.bob, net.validator, 600, 3, "")
        .unwrap();
    net.controller.accept_pending_delegation(net.node, bob).unwrap();
    net.controller.slash(net.validator, 100).unwrap();

    net.next_epoch();
    assert_eq!(net.delegated(net.alice), 300);
    assert_eq!(net.delegated(net.bob), 600);
    assert_eq!(net.validator_total(), 900);
    assert_eq!(net.controller.get_delegation(bob).unwrap().slashed, 0);
}

#[test]
fn test_slash_is_capped() {
    let (mut net, _, _) = delegated_network();
    assert_eq!(net.controller.slash(net.validator, 5_000).unwrap(), 1_000);
    assert_eq!(net.validator_total(), 0);
    assert_eq!(net.delegated(net.alice), 0);
    assert_eq!(net.controller.slash(net.validator, 1).unwrap(), 0);

    assert!(matches!(
        net.controller.slash(42, 1),
        Err(DelegationError::UnknownValidator(42))
    ));
}

#[test]
fn test_forgive() {
    let (mut net, _, _) = delegated_network();
    net.controller.slash(net.validator, 100).unwrap();

    assert!(matches!(
        net.controller.forgive(net.alice, 41),
        Err(DelegationError::NotEnoughSlashed {
            requested: 41,
            available: 40
        })
    ));

    net.controller.forgive(net.alice, 40).unwrap();
    assert_eq!(net.controller.get_and_update_slashed_amount(net.alice).unwrap(), 0);
    assert_eq!(net.locked(net.alice), 360);
    assert_eq!(net.delegated(net.alice), 360);
}
