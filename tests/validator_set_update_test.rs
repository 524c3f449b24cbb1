//! Tests of validator set changes and their delayed effectivity.

use chained_bft::{
    messages::{NewView, Vote},
    smr::{Smr, SmrError},
    types::{certificates::QcWindow, data_types::ViewNumber, validator_set::ValidatorSet},
};
use log::LevelFilter;

mod common;

use crate::common::{
    adapter::MockExternalConsensus,
    logging::setup_logger,
    network::mock_network,
    validators::{
        certified_qc, configuration, envelope, new_smr, proposal_id, test_validators,
        validator_set,
    },
};

#[test]
fn vsc_view_depends_on_membership_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(5);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let initial_window = QcWindow::new(None, Some(certified_qc(9, "P9", &validators[1..4])), None);

    // Validators 0 to 3 are the initial set. Validator 4 runs a replica, but is not a member yet.
    let member = new_smr(
        &validators[0],
        networks[0].clone(),
        MockExternalConsensus::new(),
        validator_set(&validators[..4]),
        initial_window.clone(),
    );
    let non_member = new_smr(
        &validators[4],
        networks[4].clone(),
        MockExternalConsensus::new(),
        validator_set(&validators[..4]),
        initial_window,
    );
    assert_eq!(member.voted_view(), ViewNumber::new(9));
    assert_eq!(non_member.voted_view(), ViewNumber::new(9));

    member.update_validate_sets(validator_set(&validators[1..]));
    non_member.update_validate_sets(validator_set(&validators[1..]));

    assert_eq!(member.vsc_view(), ViewNumber::new(9));
    assert_eq!(non_member.vsc_view(), ViewNumber::new(10));
}

#[test]
fn previous_set_stays_authoritative_for_delay_test() {
    setup_logger(LevelFilter::Trace);

    let validators = test_validators(5);
    let networks = mock_network(validators.iter().map(|v| v.peer_addr.clone()));
    let old_set = validator_set(&validators[..4]);
    let new_set: ValidatorSet = validators
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 3)
        .map(|(_, validator)| validator.candidate())
        .collect();

    let replica = Smr::new(
        &configuration(&validators[0], 1),
        networks[0].clone(),
        MockExternalConsensus::new(),
        old_set.clone(),
        QcWindow::new(None, Some(certified_qc(9, "P9", &validators[1..4])), None),
    );
    replica.update_validate_sets(new_set.clone());
    assert_eq!(replica.vsc_view(), ViewNumber::new(9));

    // View 10 = vsc_view + effective_delay is still checked against the old set.
    assert_eq!(replica.current_validators(ViewNumber::new(10)), old_set);
    assert_eq!(replica.current_validators(ViewNumber::new(11)), new_set);

    let removed = &validators[3];
    let added = &validators[4];

    replica
        .handle_received_msg(&envelope(NewView::new(&removed.keypair, ViewNumber::new(10), None)))
        .unwrap();
    let result = replica
        .handle_received_msg(&envelope(NewView::new(&removed.keypair, ViewNumber::new(11), None)));
    assert!(matches!(result, Err(SmrError::InValidateSets(_))));

    let result = replica
        .handle_received_msg(&envelope(NewView::new(&added.keypair, ViewNumber::new(10), None)));
    assert!(matches!(result, Err(SmrError::InValidateSets(_))));
    replica
        .handle_received_msg(&envelope(NewView::new(&added.keypair, ViewNumber::new(11), None)))
        .unwrap();

    assert_eq!(replica.new_views_collected(ViewNumber::new(10)).len(), 1);
    assert_eq!(replica.new_views_collected(ViewNumber::new(11)).len(), 1);

    // Votes are always checked against the newest set.
    let p = proposal_id("P12");
    replica
        .handle_received_msg(&envelope(Vote::new(&added.keypair, p.clone())))
        .unwrap();
    let result = replica.handle_received_msg(&envelope(Vote::new(&removed.keypair, p.clone())));
    assert!(matches!(result, Err(SmrError::InValidateSets(_))));
    assert_eq!(replica.votes_for(&p).unwrap().len(), 1);
}
