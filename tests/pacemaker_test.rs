//! Tests of the default pacemaker and of pushing externally confirmed certificates into the window.

use std::sync::Arc;

use chained_bft::{
    pacemaker::{DefaultPacemaker, PacemakerError},
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
    validators::{body, certified_qc, new_smr, proposal_id, test_validators, validator_set},
};

#[test]
fn update_smr_state_slides_by_one_view_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let qc6 = certified_qc(6, "P6", &validators[1..]);
    let qc7 = certified_qc(7, "P7", &validators[1..]);
    let qc8 = certified_qc(8, "P8", &validators[1..]);
    let p9 = QuorumCert::new(ViewNumber::new(9), proposal_id("P9"), body("P9"));

    let smr = Arc::new(new_smr(
        &validators[0],
        networks[0].clone(),
        MockExternalConsensus::new(),
        validator_set(&validators),
        QcWindow::new(Some(p9.clone()), Some(qc7.clone()), Some(qc6.clone())),
    ));
    let pacemaker = DefaultPacemaker::new(Arc::clone(&smr), ViewNumber::init(), ViewNumber::new(9));

    // A certificate that skips a view is ignored.
    pacemaker.update_smr_state(certified_qc(9, "P9", &validators[1..]));
    assert_eq!(
        smr.qc_window(),
        QcWindow::new(Some(p9.clone()), Some(qc7.clone()), Some(qc6))
    );

    // The proposal certificate directly above the pushed certificate is kept.
    pacemaker.update_smr_state(qc8.clone());
    assert_eq!(
        smr.qc_window(),
        QcWindow::new(Some(p9), Some(qc8.clone()), Some(qc7))
    );
    assert_eq!(smr.voted_view(), ViewNumber::new(8));

    // Otherwise the proposal certificate is dropped.
    let qc9 = certified_qc(9, "P9'", &validators[1..]);
    pacemaker.update_smr_state(qc9.clone());
    assert_eq!(smr.qc_window(), QcWindow::new(None, Some(qc9), Some(qc8)));
    assert_eq!(smr.voted_view(), ViewNumber::new(9));
}

#[test]
fn pacemaker_tracks_current_view_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(4);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let smr = Arc::new(new_smr(
        &validators[0],
        networks[0].clone(),
        MockExternalConsensus::new(),
        validator_set(&validators),
        QcWindow::empty(),
    ));
    let mut pacemaker = DefaultPacemaker::new(Arc::clone(&smr), ViewNumber::new(4), ViewNumber::new(5));
    assert_eq!(pacemaker.current_view(), ViewNumber::new(5));
    assert_eq!(pacemaker.first_proposal_view(), ViewNumber::new(5));

    // Consensus starts after height 4, so the proposal at view 5 is the first.
    assert!(pacemaker.is_first_proposal(&QuorumCert::new(ViewNumber::new(5), proposal_id("P5"), vec![])));
    assert!(!pacemaker.is_first_proposal(&QuorumCert::new(ViewNumber::new(4), proposal_id("P4"), vec![])));

    // One view behind is tolerated, two are not.
    assert!(matches!(
        pacemaker.next_new_proposal(ViewNumber::new(3), proposal_id("P3"), body("P3")),
        Err(PacemakerError::ViewTooLow { .. })
    ));
    pacemaker
        .next_new_proposal(ViewNumber::new(4), proposal_id("P4"), body("P4"))
        .unwrap();
    assert_eq!(pacemaker.current_view(), ViewNumber::new(4));

    pacemaker
        .next_new_view(ViewNumber::new(6), validators[1].address(), validators[3].address())
        .unwrap();
    assert_eq!(pacemaker.current_view(), ViewNumber::new(6));

    // No certificate has been collected yet.
    assert!(pacemaker.current_qc_high().unwrap().is_none());
    assert!(!pacemaker.is_last_view_confirmed(&proposal_id("P4")));

    pacemaker.update_validator_set(validator_set(&validators[..3]));
    assert_eq!(smr.current_validators(ViewNumber::new(7)).len(), 3);
}
