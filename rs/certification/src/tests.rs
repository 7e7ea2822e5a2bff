use super::*;
use assert_matches::assert_matches;
use ic_call_certification_test_utils::{
    delegation_certificate, subnet_test_id, CertificateBuilder, SubnetKey,
};
use ic_call_tree_hash::Digest;
use proptest::prelude::*;

const ROOT_SEED: u64 = 7;
const SUBNET_SEED: u64 = 42;

fn root_key() -> (SubnetKey, ThresholdSigPublicKey) {
    let key = SubnetKey::from_seed(ROOT_SEED);
    let public = ThresholdSigPublicKey::from_bytes(key.public_key_bytes());
    (key, public)
}

fn canister() -> CanisterId {
    CanisterId::from_u64(100)
}

fn subnet_id() -> PrincipalId {
    subnet_test_id(1)
}

fn status_path(status: &str) -> [Label; 3] {
    [
        Label::from("request_status"),
        Label::from([1_u8; 32]),
        Label::from(status),
    ]
}

fn sample_builder(signer: &SubnetKey) -> CertificateBuilder {
    CertificateBuilder::new(signer)
        .with_leaf(status_path("status"), "replied")
        .with_leaf(status_path("reply"), vec![1, 2])
        .with_leaf(["time"], vec![0x80, 0x01])
}

fn verify(
    bytes: &[u8],
    root: &ThresholdSigPublicKey,
) -> Result<VerifiedCertificate, CertificateValidationError> {
    verify_certificate(bytes, &canister(), root, &BlsSignatureVerifier)
}

fn reencode(bytes: &[u8], edit: impl FnOnce(&mut Certificate)) -> Vec<u8> {
    let mut certificate: Certificate = serde_cbor::from_slice(bytes).unwrap();
    edit(&mut certificate);
    serde_cbor::to_vec(&certificate).unwrap()
}

#[test]
fn verifies_certificate_signed_by_root() {
    let (root, root_pk) = root_key();
    let bytes = sample_builder(&root).build();

    let certificate = verify(&bytes, &root_pk).unwrap();
    assert_eq!(certificate.lookup(status_path("status")), LookupResult::Found(b"replied"));
    assert_eq!(certificate.lookup(status_path("reply")), LookupResult::Found(&[1, 2]));
    assert_eq!(certificate.lookup(status_path("reject_code")), LookupResult::Absent);
    assert_eq!(certificate.signing_subnet(), None);
}

#[test]
fn accepts_self_describing_cbor_tag() {
    let (root, root_pk) = root_key();
    let mut bytes = vec![0xd9, 0xd9, 0xf7];
    bytes.extend(sample_builder(&root).build());
    assert!(verify(&bytes, &root_pk).is_ok());
}

#[test]
fn rejects_certificate_signed_by_other_key() {
    let (_, root_pk) = root_key();
    let bytes = sample_builder(&SubnetKey::from_seed(ROOT_SEED + 1)).build();

    assert_matches!(
        verify(&bytes, &root_pk),
        Err(CertificateValidationError::SignatureInvalid(SignatureVerificationError::Mismatch))
    );
}

#[test]
fn rejects_tampered_leaf() {
    let (root, root_pk) = root_key();
    let bytes = sample_builder(&root).build();
    let tampered = reencode(&bytes, |certificate| {
        let forged = CertificateBuilder::new(&root)
            .with_leaf(status_path("status"), "replied")
            .with_leaf(status_path("reply"), vec![1, 3])
            .with_leaf(["time"], vec![0x80, 0x01])
            .tree();
        certificate.tree = forged;
    });

    assert_matches!(
        verify(&tampered, &root_pk),
        Err(CertificateValidationError::SignatureInvalid(_))
    );
}

#[test]
fn rejects_signature_of_wrong_length() {
    let (root, root_pk) = root_key();
    let bytes = reencode(&sample_builder(&root).build(), |certificate| {
        certificate.signature.pop();
    });

    assert_matches!(
        verify(&bytes, &root_pk),
        Err(CertificateValidationError::SignatureInvalid(
            SignatureVerificationError::MalformedSignature(47)
        ))
    );
}

#[test]
fn rejects_malformed_bytes() {
    let (_, root_pk) = root_key();
    let inputs: [&[u8]; 4] = [
        b"",
        b"\xa0",
        b"not cbor",
        &[0xa1, 0x64, b't', b'r', b'e', b'e', 0x80],
    ];
    for bytes in inputs {
        assert_matches!(
            verify(bytes, &root_pk),
            Err(CertificateValidationError::MalformedCertificate(_))
        );
    }
}

#[test]
fn pruned_leaves_are_unknown_after_verification() {
    let (root, root_pk) = root_key();
    let bytes = sample_builder(&root)
        .with_pruned([Label::from("request_status"), Label::from([1_u8; 32])])
        .build();

    let certificate = verify(&bytes, &root_pk).unwrap();
    assert_eq!(certificate.lookup(status_path("status")), LookupResult::Unknown);
    assert_eq!(certificate.lookup(status_path("reply")), LookupResult::Unknown);
    assert_eq!(certificate.lookup([Label::from("time")]), LookupResult::Found(&[0x80, 0x01]));
}

#[test]
fn verifies_delegated_certificate() {
    let (root, root_pk) = root_key();
    let subnet = SubnetKey::from_seed(SUBNET_SEED);
    let bytes = sample_builder(&subnet)
        .delegated_by(
            &root,
            subnet_id(),
            &[(CanisterId::from_u64(0), CanisterId::from_u64(100))],
        )
        .build();

    let certificate = verify(&bytes, &root_pk).unwrap();
    assert_eq!(certificate.signing_subnet(), Some(subnet_id()));
    assert_eq!(certificate.lookup(status_path("reply")), LookupResult::Found(&[1, 2]));
}

#[test]
fn rejects_delegation_not_covering_canister() {
    let (root, root_pk) = root_key();
    let subnet = SubnetKey::from_seed(SUBNET_SEED);
    let bytes = sample_builder(&subnet)
        .delegated_by(
            &root,
            subnet_id(),
            &[
                (CanisterId::from_u64(0), CanisterId::from_u64(99)),
                (CanisterId::from_u64(101), CanisterId::from_u64(200)),
            ],
        )
        .build();

    assert_matches!(
        verify(&bytes, &root_pk),
        Err(CertificateValidationError::DelegationInvalid(msg)) if msg.contains("outside")
    );
}

#[test]
fn rejects_delegation_not_signed_by_root() {
    let (_, root_pk) = root_key();
    let impostor = SubnetKey::from_seed(ROOT_SEED + 100);
    let subnet = SubnetKey::from_seed(SUBNET_SEED);
    let bytes = sample_builder(&subnet)
        .delegated_by(&impostor, subnet_id(), &[(canister(), canister())])
        .build();

    assert_matches!(
        verify(&bytes, &root_pk),
        Err(CertificateValidationError::DelegationInvalid(_))
    );
}

#[test]
fn rejects_certificate_signed_by_root_instead_of_delegate() {
    let (root, root_pk) = root_key();
    let subnet = SubnetKey::from_seed(SUBNET_SEED);
    let delegation = delegation_certificate(&root, subnet_id(), &subnet, &[(canister(), canister())]);
    let bytes = sample_builder(&root)
        .with_delegation(subnet_id(), delegation.build())
        .build();

    assert_matches!(
        verify(&bytes, &root_pk),
        Err(CertificateValidationError::SignatureInvalid(_))
    );
}

#[test]
fn rejects_delegation_without_subnet_key() {
    let (root, root_pk) = root_key();
    let subnet = SubnetKey::from_seed(SUBNET_SEED);
    let delegation = delegation_certificate(&root, subnet_id(), &subnet, &[(canister(), canister())])
        .with_pruned([Label::from("subnet")]);
    let bytes = sample_builder(&subnet)
        .with_delegation(subnet_id(), delegation.build())
        .build();

    assert_matches!(
        verify(&bytes, &root_pk),
        Err(CertificateValidationError::DelegationInvalid(msg)) if msg.contains("public key")
    );
}

#[test]
fn rejects_nested_delegation() {
    let (root, root_pk) = root_key();
    let intermediate = SubnetKey::from_seed(SUBNET_SEED);
    let leaf_subnet = SubnetKey::from_seed(SUBNET_SEED + 1);
    let leaf_subnet_id = subnet_test_id(2);
    let ranges = [(canister(), canister())];

    let inner = delegation_certificate(&intermediate, leaf_subnet_id, &leaf_subnet, &ranges)
        .delegated_by(&root, subnet_id(), &ranges)
        .build();
    let bytes = sample_builder(&leaf_subnet)
        .with_delegation(leaf_subnet_id, inner)
        .build();

    assert_matches!(
        verify(&bytes, &root_pk),
        Err(CertificateValidationError::DelegationInvalid(msg)) if msg.contains("another delegation")
    );
}

struct RejectAll;

impl SignatureVerifier for RejectAll {
    fn verify(
        &self,
        _public_key: &ThresholdSigPublicKey,
        _message: &[u8],
        _signature: &[u8],
    ) -> Result<(), SignatureVerificationError> {
        Err(SignatureVerificationError::Mismatch)
    }
}

#[test]
fn uses_the_given_signature_verifier() {
    let (root, root_pk) = root_key();
    let bytes = sample_builder(&root).build();

    assert_matches!(
        verify_certificate(&bytes, &canister(), &root_pk, &RejectAll),
        Err(CertificateValidationError::SignatureInvalid(SignatureVerificationError::Mismatch))
    );
}

#[test]
fn signed_message_is_domain_separated() {
    let digest = Digest([0xab; 32]);
    let message = state_root_message(&digest);
    assert_eq!(&message[..14], b"\x0Dic-state-root");
    assert_eq!(&message[14..], &[0xab; 32]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_signature_byte_flip_is_rejected(index in 0..SIGNATURE_SIZE, mask in 1..=u8::MAX) {
        let (root, root_pk) = root_key();
        let bytes = reencode(&sample_builder(&root).build(), |certificate| {
            certificate.signature[index] ^= mask;
        });
        prop_assert!(
            matches!(verify(&bytes, &root_pk), Err(CertificateValidationError::SignatureInvalid(_))),
            "flipping signature byte {} with {:#x} was accepted", index, mask
        );
    }

    #[test]
    fn any_pruned_digest_flip_is_rejected(index in 0..32_usize, mask in 1..=u8::MAX) {
        let (root, root_pk) = root_key();
        let builder = sample_builder(&root).with_pruned(["time"]);
        let bytes = reencode(&builder.build(), |certificate| {
            certificate.tree = flip_pruned_digest(&certificate.tree, index, mask);
        });
        prop_assert!(matches!(
            verify(&bytes, &root_pk),
            Err(CertificateValidationError::SignatureInvalid(_))
        ));
    }
}

fn flip_pruned_digest(tree: &MixedHashTree, index: usize, mask: u8) -> MixedHashTree {
    match tree {
        MixedHashTree::Pruned(digest) => {
            let mut bytes = digest.0;
            bytes[index] ^= mask;
            MixedHashTree::Pruned(Digest(bytes))
        }
        MixedHashTree::Fork(lr) => MixedHashTree::Fork(Box::new((
            flip_pruned_digest(&lr.0, index, mask),
            flip_pruned_digest(&lr.1, index, mask),
        ))),
        MixedHashTree::Labeled(label, subtree) => {
            MixedHashTree::Labeled(label.clone(), Box::new(flip_pruned_digest(subtree, index, mask)))
        }
        other => other.clone(),
    }
}
