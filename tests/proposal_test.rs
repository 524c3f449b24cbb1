//! Tests of how a replica decides whether to vote for a proposal, and how its window of certificates
//! slides when it does.

use chained_bft::{
    external::AdapterError,
    messages::{MessageType, Proposal, SmrMessage},
    smr::{SafetyViolation, SmrError},
    types::{
        certificates::{QcWindow, QuorumCert},
        data_types::ViewNumber,
    },
};
use log::LevelFilter;

mod common;

use crate::common::{
    adapter::MockExternalConsensus,
    logging::setup_logger,
    network::mock_network,
    validators::{
        body, certified_qc, envelope, new_smr, proposal_id, test_validators, validator_set,
        TestValidator,
    },
};

fn proposal(proposer: &TestValidator, view: i64, name: &str) -> Proposal {
    Proposal::new(
        &proposer.keypair,
        ViewNumber::new(view),
        QuorumCert::new(ViewNumber::new(view), proposal_id(name), body(name)),
    )
}

#[test]
fn first_proposal_is_voted_for_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let adapter = MockExternalConsensus::new();
    adapter.add_first(&proposal_id("P1"), &body("P1"));
    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        adapter,
        validator_set(&validators),
        QcWindow::empty(),
    );

    let proposal = proposal(&validators[0], 1, "P1");
    replica.handle_received_msg(&envelope(proposal.clone())).unwrap();

    assert_eq!(
        replica.qc_window(),
        QcWindow::new(Some(proposal.proposal_qc.clone()), None, None)
    );

    let sent = networks[1].wait_for_sent(1);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, validators[0].peer_addr);
    assert_eq!(sent[0].envelope.header.msg_type, MessageType::Vote);
    match sent[0].msg() {
        SmrMessage::Vote(vote) => {
            assert_eq!(vote.proposal_id, proposal_id("P1"));
            assert_eq!(&vote.signature.address, validators[1].address());
            assert!(vote.signature.verify(proposal_id("P1").bytes()));
        }
        _ => panic!("expected a vote"),
    }
}

#[test]
fn three_chain_ancestry_fills_window_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));

    // The ledger holds P5 <- P6 <- P7, each justified by a certificate of its parent.
    let qc5 = certified_qc(5, "P5", &validators[1..]);
    let qc6 = certified_qc(6, "P6", &validators[1..]);
    let adapter = MockExternalConsensus::new();
    adapter.add_first(&proposal_id("P5"), &body("P5"));
    adapter.add(&proposal_id("P6"), &body("P6"), qc5.clone());
    adapter.add(&proposal_id("P7"), &body("P7"), qc6.clone());

    let replica = new_smr(
        &validators[2],
        networks[2].clone(),
        adapter,
        validator_set(&validators),
        QcWindow::empty(),
    );

    let proposal = proposal(&validators[0], 7, "P7");
    replica.handle_received_msg(&envelope(proposal.clone())).unwrap();

    let window = replica.qc_window();
    assert_eq!(
        window,
        QcWindow::new(Some(proposal.proposal_qc), Some(qc6), Some(qc5))
    );
    assert!(window.is_ordered());
    assert_eq!(replica.voted_view(), ViewNumber::new(6));
}

#[test]
fn proposal_justified_by_generate_qc_keeps_lock_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));

    let qc6 = certified_qc(6, "P6", &validators[1..]);
    let qc7 = certified_qc(7, "P7", &validators[1..]);
    let adapter = MockExternalConsensus::new();
    adapter.add(&proposal_id("P8"), &body("P8"), qc7.clone());
    adapter.add(&proposal_id("P7"), &body("P7"), qc6.clone());

    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        adapter.clone(),
        validator_set(&validators),
        QcWindow::new(None, Some(qc7.clone()), Some(qc6.clone())),
    );

    let p8 = proposal(&validators[3], 8, "P8");
    replica.handle_received_msg(&envelope(p8.clone())).unwrap();
    assert_eq!(
        replica.qc_window(),
        QcWindow::new(Some(p8.proposal_qc.clone()), Some(qc7.clone()), Some(qc6))
    );

    // A different proposal for the same view is an equivocation.
    adapter.add(&proposal_id("P8'"), &body("P8'"), qc7.clone());
    let conflicting = proposal(&validators[3], 8, "P8'");
    let result = replica.handle_received_msg(&envelope(conflicting));
    assert!(matches!(
        result,
        Err(SmrError::SafeProposal(SafetyViolation::Equivocation))
    ));
    assert_eq!(
        replica.qc_window().proposal_qc.unwrap().proposal_id,
        proposal_id("P8")
    );
}

#[test]
fn unresolvable_ancestor_aborts_without_mutation_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        MockExternalConsensus::new(),
        validator_set(&validators),
        QcWindow::empty(),
    );

    let result = replica.handle_received_msg(&envelope(proposal(&validators[0], 3, "unknown")));
    assert!(matches!(
        result,
        Err(SmrError::Adapter(AdapterError::UnknownProposal(_)))
    ));
    assert_eq!(replica.qc_window(), QcWindow::empty());
    assert_eq!(replica.voted_view(), ViewNumber::init());
    assert!(networks[1].sent().is_empty());
}

#[test]
fn uncertified_ancestor_is_rejected_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));

    // Two signatures out of four validators are not a quorum.
    let weak_qc6 = certified_qc(6, "P6", &validators[2..]);
    let adapter = MockExternalConsensus::new();
    adapter.add_first(&proposal_id("P6"), &body("P6"));
    adapter.add(&proposal_id("P7"), &body("P7"), weak_qc6);

    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        adapter,
        validator_set(&validators),
        QcWindow::empty(),
    );

    let result = replica.handle_received_msg(&envelope(proposal(&validators[0], 7, "P7")));
    assert!(matches!(
        result,
        Err(SmrError::SafeProposal(SafetyViolation::UncertifiedAncestor))
    ));
    assert_eq!(replica.qc_window(), QcWindow::empty());
}

#[test]
fn proposal_not_extending_lock_is_rejected_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));

    // The replica is locked on P6, but P9 forks off from P5.
    let qc5 = certified_qc(5, "P5", &validators[1..]);
    let qc6 = certified_qc(6, "P6", &validators[1..]);
    let qc7 = certified_qc(7, "P7", &validators[1..]);
    let adapter = MockExternalConsensus::new();
    adapter.add_first(&proposal_id("P5"), &body("P5"));
    adapter.add(&proposal_id("P9"), &body("P9"), qc5);

    let initial_window = QcWindow::new(None, Some(qc7), Some(qc6));
    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        adapter,
        validator_set(&validators),
        initial_window.clone(),
    );

    let result = replica.handle_received_msg(&envelope(proposal(&validators[0], 9, "P9")));
    assert!(matches!(
        result,
        Err(SmrError::SafeProposal(SafetyViolation::NotExtendingLock))
    ));
    assert_eq!(replica.qc_window(), initial_window);
}

#[test]
fn outdated_proposal_is_rejected_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let adapter = MockExternalConsensus::new();
    adapter.add_first(&proposal_id("P8"), &body("P8"));
    adapter.add(&proposal_id("P9'"), &body("P9'"), certified_qc(8, "P8", &validators[1..]));

    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        adapter,
        validator_set(&validators),
        QcWindow::new(
            None,
            Some(certified_qc(9, "P9", &validators[1..])),
            Some(certified_qc(8, "P8", &validators[1..])),
        ),
    );

    let result = replica.handle_received_msg(&envelope(proposal(&validators[0], 9, "P9'")));
    assert!(matches!(result, Err(SmrError::PropsViewNum { .. })));
}

#[test]
fn proposal_from_non_member_or_with_bad_signature_is_rejected_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let outsider = test_validators(1).pop().unwrap();
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let adapter = MockExternalConsensus::new();
    adapter.add_first(&proposal_id("P1"), &body("P1"));
    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        adapter,
        validator_set(&validators),
        QcWindow::empty(),
    );

    let result = replica.handle_received_msg(&envelope(proposal(&outsider, 1, "P1")));
    assert!(matches!(result, Err(SmrError::InValidateSets(_))));

    let mut tampered = proposal(&validators[0], 1, "P1");
    tampered.proposal_qc.proposal_msg = b"another body".to_vec();
    let result = replica.handle_received_msg(&envelope(tampered));
    assert!(matches!(result, Err(SmrError::VerifySign(_))));

    assert_eq!(replica.qc_window(), QcWindow::empty());
}

#[test]
fn proposal_with_mismatched_views_is_rejected_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let adapter = MockExternalConsensus::new();
    adapter.add_first(&proposal_id("P1"), &body("P1"));
    let replica = new_smr(
        &validators[1],
        networks[1].clone(),
        adapter,
        validator_set(&validators),
        QcWindow::empty(),
    );

    // The proposer signs view 5, but the certificate it carries is for view 1.
    let mismatched = Proposal::new(
        &validators[0].keypair,
        ViewNumber::new(5),
        QuorumCert::new(ViewNumber::new(1), proposal_id("P1"), body("P1")),
    );
    let result = replica.handle_received_msg(&envelope(mismatched));
    assert!(matches!(
        result,
        Err(SmrError::PropsViewNum { view_number, qc_view, .. })
            if view_number == ViewNumber::new(5) && qc_view == ViewNumber::new(1)
    ));

    assert_eq!(replica.qc_window(), QcWindow::empty());
    assert!(networks[1].sent().is_empty());
}
