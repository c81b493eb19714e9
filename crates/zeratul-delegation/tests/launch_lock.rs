//! Token-launch lock through the controller

mod common;

use common::Network;
use zeratul_delegation::{Address, DelegationError};

fn accepted(net: &mut Network, holder: Address, amount: u128) -> u64 {
    let id = net
        .controller
        .delegate(holder, net.validator, amount, 3, "proof of use")
        .unwrap();
    net.controller.accept_pending_delegation(net.node, id).unwrap();
    id
}

#[test]
fn test_half_delegated_unlocks_after_lock_up() {
    let mut net = Network::new();
    net.controller.lock_purchased(net.alice, 1_000);
    assert_eq!(net.locked(net.alice), 1_000);
    assert_eq!(
        net.controller
            .get_and_update_forbidden_for_delegation(net.alice)
            .unwrap(),
        0
    );

    let alice = net.alice;
    let id = accepted(&mut net, alice, 500);
    assert_eq!(net.locked(net.alice), 1_000);

    net.next_epoch();
    assert_eq!(net.locked(net.alice), 1_000);
    assert!(matches!(
        net.controller.ensure_transferable(net.alice, 1),
        Err(DelegationError::TokensLocked { transferable: 0, .. })
    ));

    // 90 days after the first delegation started
    net.skip_epochs(3);
    assert_eq!(net.locked(net.alice), 500);
    net.controller.ensure_transferable(net.alice, 500).unwrap();
    assert_eq!(net.controller.get_delegation(id).unwrap().launch_locked, 500);
}

#[test]
fn test_just_under_half_stays_locked() {
    let mut net = Network::new();
    net.controller.lock_purchased(net.bob, 1_000);
    let bob = net.bob;
    accepted(&mut net, bob, 499);

    net.skip_epochs(12);
    assert_eq!(net.locked(net.bob), 1_000);
    assert_eq!(net.delegated(net.bob), 499);
}

#[test]
fn test_unlock_survives_undelegation() {
    let mut net = Network::new();
    net.controller.lock_purchased(net.alice, 1_000);
    let alice = net.alice;
    let id = accepted(&mut net, alice, 500);

    net.next_epoch();
    net.controller.request_undelegation(net.alice, id).unwrap();

    // released at epoch 4, the same epoch the lock-up ends
    net.skip_epochs(3);
    assert_eq!(net.locked(net.alice), 0);
    net.controller.ensure_transferable(net.alice, 1_000).unwrap();
}

#[test]
fn test_released_purchase_is_locked_again_before_proof_of_use() {
    let mut net = Network::new();
    net.controller.lock_purchased(net.bob, 1_000);
    let bob = net.bob;
    let id = accepted(&mut net, bob, 300);

    net.next_epoch();
    assert_eq!(net.locked(net.bob), 1_000);
    net.controller.request_undelegation(net.bob, id).unwrap();

    net.skip_epochs(3);
    assert_eq!(net.delegated(net.bob), 0);
    assert_eq!(net.locked(net.bob), 1_000);
}
