use chained_bft::{
    chained_bft::Configuration,
    messages::{Envelope, SmrMessage},
    smr::Smr,
    types::{
        certificates::{QcWindow, QuorumCert, SignInfo, SignatureSet},
        crypto_primitives::{Keypair, SigningKey},
        data_types::{Address, ChainName, PeerAddr, ProposalId, ViewNumber},
        validator_set::{CandidateInfo, ValidatorSet},
    },
};
use rand_core::OsRng;

use super::{adapter::MockExternalConsensus, network::NetworkStub};

pub(crate) const CHAIN_NAME: &str = "xuper";

pub(crate) type TestSmr = Smr<NetworkStub, MockExternalConsensus>;

/// A replica identity used in tests: its signing key and the peer address it is reachable at.
pub(crate) struct TestValidator {
    pub(crate) signing_key: SigningKey,
    pub(crate) keypair: Keypair,
    pub(crate) peer_addr: PeerAddr,
}

impl TestValidator {
    pub(crate) fn address(&self) -> &Address {
        self.keypair.address()
    }

    pub(crate) fn candidate(&self) -> CandidateInfo {
        CandidateInfo::new(self.address().clone(), self.peer_addr.clone())
    }
}

/// Create `n` validators reachable at `/peer/0`, `/peer/1`, and so on.
pub(crate) fn test_validators(n: usize) -> Vec<TestValidator> {
    let mut csprg = OsRng {};
    (0..n)
        .map(|i| {
            let signing_key = SigningKey::generate(&mut csprg);
            TestValidator {
                keypair: Keypair::new(signing_key.clone()),
                signing_key,
                peer_addr: PeerAddr::new(format!("/peer/{}", i)),
            }
        })
        .collect()
}

pub(crate) fn validator_set(validators: &[TestValidator]) -> ValidatorSet {
    validators.iter().map(TestValidator::candidate).collect()
}

pub(crate) fn configuration(validator: &TestValidator, effective_delay: i64) -> Configuration {
    Configuration::builder()
        .chain_name(ChainName::new(CHAIN_NAME))
        .me(validator.signing_key.clone())
        .effective_delay(effective_delay)
        .log_events(false)
        .build()
}

pub(crate) fn new_smr(
    me: &TestValidator,
    network: NetworkStub,
    adapter: MockExternalConsensus,
    validators: ValidatorSet,
    initial_window: QcWindow,
) -> TestSmr {
    Smr::new(
        &configuration(me, 0),
        network,
        adapter,
        validators,
        initial_window,
    )
}

pub(crate) fn proposal_id(name: &str) -> ProposalId {
    ProposalId::new(name.as_bytes().to_vec())
}

pub(crate) fn body(name: &str) -> Vec<u8> {
    format!("body of {}", name).into_bytes()
}

/// Create a certificate for the proposal `name` at `view`, signed by every validator in `signers`.
pub(crate) fn certified_qc(view: i64, name: &str, signers: &[TestValidator]) -> QuorumCert {
    let id = proposal_id(name);
    let signatures: SignatureSet = signers
        .iter()
        .map(|signer| SignInfo::sign(&signer.keypair, id.bytes()))
        .collect::<Vec<_>>()
        .into();
    QuorumCert::new(ViewNumber::new(view), id, body(name)).with_signatures(signatures)
}

/// Wrap `msg` into an envelope of the test chain.
pub(crate) fn envelope(msg: impl Into<SmrMessage>) -> Envelope {
    Envelope::new(
        ChainName::new(CHAIN_NAME),
        String::from("test"),
        &msg.into(),
    )
}
