//! Adversarial tests for the checkpoint pipeline.
//!
//! Attack vectors tested:
//! - Tampered payloads and signatures (randomized byte flips)
//! - Checkpoints signed by a key other than the network authority
//! - Garbage on the wire, at the checkpoint codec and the frame layer
//! - Replay of adopted and older checkpoints from peers
//! - Racing conflicting checkpoints from several threads
//! - Storage failure in the middle of adoption

use std::sync::Arc;

use proptest::prelude::*;

use phx_checkpoint::error::{ProcessError, VerifyError};
use phx_checkpoint::relay::CheckpointPeer;
use phx_checkpoint::{
    CheckpointPolicy, CheckpointRegistry, ProcessOutcome, SignedCheckpoint, UnsignedCheckpoint,
};
use phx_core::constants::NetworkType;
use phx_core::crypto::MasterKey;
use phx_core::types::Hash256;
use phx_network::NetworkMessage;
use phx_tests::helpers::*;

fn harness(len: u32) -> Harness {
    Harness::new(
        TestChain::main(len),
        CheckpointRegistry::new(Vec::new()).unwrap(),
        CheckpointPolicy::Strict,
    )
}

// ---------------------------------------------------------------------------
// Tampering
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn flipped_payload_byte_never_verifies(pos in 0usize..UnsignedCheckpoint::ENCODED_LEN, bit in 0u8..8) {
        let h = harness(4);
        let signed = h.sign(h.chain.at(3));
        let mut raw = signed.raw_message().to_vec();
        raw[pos] ^= 1 << bit;
        let forged = SignedCheckpoint::from_parts(raw, signed.signature().to_vec());

        let err = h.manager.process(&forged, None).unwrap_err();
        prop_assert!(matches!(err, ProcessError::BadSignature(_)));
        prop_assert_eq!(h.manager.accepted_hash(), h.chain.genesis());
        prop_assert_eq!(h.store.write_count(), 1);
    }

    #[test]
    fn flipped_signature_byte_never_verifies(seed in any::<usize>(), bit in 0u8..8) {
        let h = harness(4);
        let signed = h.sign(h.chain.at(3));
        let mut signature = signed.signature().to_vec();
        let pos = seed % signature.len();
        signature[pos] ^= 1 << bit;
        let forged = SignedCheckpoint::from_parts(signed.raw_message().to_vec(), signature);

        prop_assert!(h.manager.process(&forged, None).is_err());
        prop_assert_eq!(h.manager.accepted_hash(), h.chain.genesis());
        prop_assert_eq!(h.manager.pending_hash(), None);
    }

    #[test]
    fn arbitrary_checkpoint_bytes_are_rejected(bytes in proptest::collection::vec(any::<u8>(), 0..200)) {
        let h = harness(2);
        if let Ok(signed) = SignedCheckpoint::decode(&bytes) {
            prop_assert!(h.manager.process(&signed, None).is_err());
        }
        prop_assert_eq!(h.manager.accepted_hash(), h.chain.genesis());
    }

    #[test]
    fn arbitrary_frames_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = NetworkMessage::decode(NetworkType::Testnet, &bytes);
    }
}

// ---------------------------------------------------------------------------
// Forgery
// ---------------------------------------------------------------------------

#[test]
fn checkpoint_signed_by_foreign_key_is_dropped() {
    let h = harness(10);
    let (peer, mut rx) = h.connect_peer("10.0.0.9:9555");

    let attacker = MasterKey::generate();
    let forged = SignedCheckpoint::sign(&UnsignedCheckpoint::new(h.chain.at(9)), &attacker).unwrap();
    let err = h.manager.process(&forged, Some(&*peer as &dyn CheckpointPeer)).unwrap_err();

    assert_eq!(err, ProcessError::BadSignature(VerifyError::SignatureInvalid));
    assert_eq!(h.manager.accepted_hash(), h.chain.genesis());
    // A forger does not get its hash recorded or relayed.
    assert_eq!(peer.known_checkpoint(), None);
    assert!(drain_checkpoints(&mut rx).is_empty());
}

#[test]
fn forged_checkpoint_for_unknown_block_does_not_go_pending() {
    let h = harness(3);
    let attacker = MasterKey::generate();
    let forged = SignedCheckpoint::sign(&UnsignedCheckpoint::new(block_hash(8, 50)), &attacker).unwrap();
    assert!(h.manager.process(&forged, None).is_err());
    assert_eq!(h.manager.pending_hash(), None);
}

#[test]
fn null_checkpoint_is_rejected_even_when_signed() {
    let h = harness(3);
    let signed = h.sign(Hash256::ZERO);
    assert_eq!(
        h.manager.process(&signed, None),
        Err(ProcessError::BadSignature(VerifyError::NullCheckpoint))
    );
}

#[test]
fn compiled_in_authority_rejects_local_signatures() {
    let (local, _) = local_authority();
    let h = Harness::with_authority(
        TestChain::main(3),
        CheckpointRegistry::new(Vec::new()).unwrap(),
        CheckpointPolicy::Strict,
        phx_checkpoint::SignatureAuthority::for_network(NetworkType::Testnet).unwrap(),
    );
    let signed = local.sign(h.chain.at(2)).unwrap();
    assert!(matches!(
        h.manager.process(&signed, None),
        Err(ProcessError::BadSignature(_))
    ));
    assert_eq!(h.manager.send_checkpoint(h.chain.at(2)), Err(ProcessError::NoAuthorityKey));
}

// ---------------------------------------------------------------------------
// Replay through peers
// ---------------------------------------------------------------------------

#[test]
fn peer_replay_is_not_echoed_or_rewritten() {
    let h = harness(30);
    let (alice, mut alice_rx) = h.connect_peer("10.0.0.1:9555");
    let (bob, mut bob_rx) = h.connect_peer("10.0.0.2:9555");

    let signed = h.sign(h.chain.at(20));
    assert_eq!(
        h.manager.process(&signed, Some(&*alice as &dyn CheckpointPeer)),
        Ok(ProcessOutcome::Adopted)
    );
    // Bob hears about it once, Alice (the sender) not at all.
    assert!(drain_checkpoints(&mut alice_rx).is_empty());
    assert_eq!(drain_checkpoints(&mut bob_rx), vec![signed.clone()]);
    let writes = h.store.write_count();

    // Bob replays it, and Alice replays an older one.
    assert_eq!(
        h.manager.process(&signed, Some(&*bob as &dyn CheckpointPeer)),
        Ok(ProcessOutcome::AlreadyCovered)
    );
    let older = h.sign(h.chain.at(10));
    assert_eq!(
        h.manager.process(&older, Some(&*alice as &dyn CheckpointPeer)),
        Ok(ProcessOutcome::AlreadyCovered)
    );

    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.manager.accepted_hash(), h.chain.at(20));
    assert!(drain_checkpoints(&mut alice_rx).is_empty());
    assert!(drain_checkpoints(&mut bob_rx).is_empty());
}

#[test]
fn disconnected_peer_does_not_block_relay() {
    let h = harness(10);
    let (gone, gone_rx) = h.connect_peer("10.0.0.1:9555");
    let (_live, mut live_rx) = h.connect_peer("10.0.0.2:9555");
    drop(gone_rx);
    assert!(!gone.is_connected());

    let signed = h.sign(h.chain.at(5));
    assert_eq!(h.manager.process(&signed, None), Ok(ProcessOutcome::Adopted));
    assert_eq!(drain_checkpoints(&mut live_rx), vec![signed]);
}

// ---------------------------------------------------------------------------
// Races and failures
// ---------------------------------------------------------------------------

#[test]
fn racing_conflicting_checkpoints_adopt_exactly_one() {
    let h = harness(10);
    let left = *h.chain.extend(h.chain.at(5), 2, 3).last().unwrap();
    let right = *h.chain.extend(h.chain.at(5), 3, 3).last().unwrap();
    let messages = [h.sign(left), h.sign(right)];

    let manager = &h.manager;
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = messages
            .iter()
            .map(|signed| scope.spawn(move || manager.process(signed, None)))
            .collect();
        handles.into_iter().map(|t| t.join().unwrap()).collect()
    });

    let adopted = results.iter().filter(|r| **r == Ok(ProcessOutcome::Adopted)).count();
    let conflicts = results
        .iter()
        .filter(|r| r.as_ref().is_err_and(ProcessError::is_conflict))
        .count();
    assert_eq!((adopted, conflicts), (1, 1), "results: {results:?}");

    let accepted = h.manager.accepted_hash();
    assert!(accepted == left || accepted == right);
    assert!(h.chain.is_on_main_chain(&accepted));
}

#[test]
fn concurrent_replays_write_once() {
    let h = Arc::new(harness(20));
    let signed = h.sign(h.chain.at(15));
    let before = h.store.write_count();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let h = Arc::clone(&h);
            let signed = signed.clone();
            scope.spawn(move || {
                let _ = h.manager.process(&signed, None);
            });
        }
    });

    assert_eq!(h.manager.accepted_hash(), h.chain.at(15));
    assert_eq!(h.store.write_count(), before + 1);
}

#[test]
fn storage_failure_leaves_checkpoint_unchanged() {
    let h = harness(10);
    let (_peer, mut rx) = h.connect_peer("10.0.0.1:9555");
    h.store.set_fail_writes(true);

    let signed = h.sign(h.chain.at(8));
    assert!(matches!(
        h.manager.process(&signed, None),
        Err(ProcessError::PersistFailed(_))
    ));
    assert_eq!(h.manager.accepted_hash(), h.chain.genesis());
    assert!(h.manager.last_message().is_none());
    assert!(drain_checkpoints(&mut rx).is_empty());

    // Once storage recovers the same message goes through.
    h.store.set_fail_writes(false);
    assert_eq!(h.manager.process(&signed, None), Ok(ProcessOutcome::Adopted));
}

#[test]
fn random_chain_positions_respect_ancestry() {
    use rand::Rng;

    let h = harness(200);
    let mut rng = rand::thread_rng();
    let mut accepted_height = 0u32;
    for _ in 0..50 {
        let height = rng.gen_range(1..=200);
        let result = h.manager.process(&h.sign(h.chain.at(height)), None);
        if height > accepted_height {
            assert_eq!(result, Ok(ProcessOutcome::Adopted));
            accepted_height = height;
        } else {
            assert_eq!(result, Ok(ProcessOutcome::AlreadyCovered));
        }
        assert_eq!(h.manager.accepted_hash(), h.chain.at(accepted_height));
    }
}
