//! Builders for genuinely signed certificates, for use in tests.
use ic_bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use ic_bls12_381::{G1Affine, G1Projective, G2Affine, Scalar};
use ic_call_base_types::{CanisterId, PrincipalId};
use ic_call_tree_hash::{Digest, Label, LabeledTree, MixedHashTree, Path};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::collections::BTreeMap;

const DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";
const STATE_ROOT_DOMAIN: &[u8] = b"\x0Dic-state-root";
const DER_PREFIX: [u8; 37] = [
    0x30, 0x81, 0x82, 0x30, 0x1d, 0x06, 0x0d, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05,
    0x03, 0x01, 0x02, 0x01, 0x06, 0x0c, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05, 0x03,
    0x02, 0x01, 0x03, 0x61, 0x00,
];

/// A BLS12-381 threshold signing key, standing in for a subnet.
#[derive(Clone)]
pub struct SubnetKey {
    secret: Scalar,
    public: G2Affine,
}

impl SubnetKey {
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut wide = [0_u8; 64];
        rng.fill_bytes(&mut wide);
        let secret = Scalar::from_bytes_wide(&wide);
        let public = G2Affine::from(G2Affine::generator() * secret);
        Self { secret, public }
    }

    /// The compressed G2 public key.
    pub fn public_key_bytes(&self) -> [u8; 96] {
        self.public.to_compressed()
    }

    pub fn public_key_der(&self) -> Vec<u8> {
        let mut der = DER_PREFIX.to_vec();
        der.extend_from_slice(&self.public_key_bytes());
        der
    }

    /// Signs `message` with the hash-to-curve suite used for certificates.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let point = <G1Projective as HashToCurve<ExpandMsgXmd<sha2::Sha256>>>::hash_to_curve(
            message, DST,
        );
        G1Affine::from(point * self.secret).to_compressed().to_vec()
    }

    /// Signs the root digest of a tree the way a subnet certifies its state.
    pub fn sign_root(&self, digest: &Digest) -> Vec<u8> {
        let mut message = STATE_ROOT_DOMAIN.to_vec();
        message.extend_from_slice(digest.as_bytes());
        self.sign(&message)
    }
}

#[derive(Serialize)]
struct EncodedCertificate<'a> {
    tree: &'a MixedHashTree,
    #[serde(with = "serde_bytes")]
    signature: &'a [u8],
    #[serde(skip_serializing_if = "Option::is_none")]
    delegation: Option<EncodedDelegation<'a>>,
}

#[derive(Serialize)]
struct EncodedDelegation<'a> {
    subnet_id: PrincipalId,
    #[serde(with = "serde_bytes")]
    certificate: &'a [u8],
}

/// Builds CBOR encoded certificates over a tree made of the given leaves.
///
/// Leaves inserted later overwrite earlier ones at the same path.
#[derive(Clone)]
pub struct CertificateBuilder {
    signer: SubnetKey,
    leaves: Vec<(Path, Vec<u8>)>,
    pruned: Vec<Path>,
    delegation: Option<(PrincipalId, Vec<u8>)>,
}

impl CertificateBuilder {
    pub fn new(signer: &SubnetKey) -> Self {
        Self {
            signer: signer.clone(),
            leaves: vec![],
            pruned: vec![],
            delegation: None,
        }
    }

    pub fn with_leaf<P, L>(mut self, path: P, value: impl Into<Vec<u8>>) -> Self
    where
        P: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        self.leaves.push((path.into_iter().collect(), value.into()));
        self
    }

    /// Replaces the subtree at `path` by its digest in the encoded tree.
    pub fn with_pruned<P, L>(mut self, path: P) -> Self
    where
        P: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        self.pruned.push(path.into_iter().collect());
        self
    }

    /// Attaches an arbitrary, already encoded delegation certificate.
    pub fn with_delegation(mut self, subnet_id: PrincipalId, certificate: Vec<u8>) -> Self {
        self.delegation = Some((subnet_id, certificate));
        self
    }

    /// Makes this certificate valid only through a delegation from `root` to
    /// `subnet_id`, covering `ranges`.
    pub fn delegated_by(
        self,
        root: &SubnetKey,
        subnet_id: PrincipalId,
        ranges: &[(CanisterId, CanisterId)],
    ) -> Self {
        let certificate = delegation_certificate(root, subnet_id, &self.signer, ranges).build();
        self.with_delegation(subnet_id, certificate)
    }

    pub fn tree(&self) -> MixedHashTree {
        let mut tree = LabeledTree::SubTree(BTreeMap::new());
        for (path, value) in &self.leaves {
            insert_leaf(&mut tree, path.labels(), value.clone());
        }
        let mut tree = MixedHashTree::from(&tree);
        for path in &self.pruned {
            tree = tree
                .prune(path)
                .unwrap_or_else(|err| panic!("cannot prune {}: {}", path, err));
        }
        tree
    }

    pub fn build(&self) -> Vec<u8> {
        let tree = self.tree();
        let signature = self.signer.sign_root(&tree.digest());
        let certificate = EncodedCertificate {
            tree: &tree,
            signature: &signature,
            delegation: self
                .delegation
                .as_ref()
                .map(|(subnet_id, certificate)| EncodedDelegation {
                    subnet_id: *subnet_id,
                    certificate,
                }),
        };
        serde_cbor::to_vec(&certificate).expect("failed to encode certificate")
    }
}

/// An opaque principal for the `n`-th test subnet.
pub fn subnet_test_id(n: u64) -> PrincipalId {
    let mut bytes = n.to_le_bytes().to_vec();
    bytes.push(0xfc);
    PrincipalId::new_opaque(&bytes).expect("test subnet id fits in a principal")
}

/// A root-signed certificate stating that `subnet_key` is the key of
/// `subnet_id` and that the subnet hosts `ranges`.
pub fn delegation_certificate(
    root: &SubnetKey,
    subnet_id: PrincipalId,
    subnet_key: &SubnetKey,
    ranges: &[(CanisterId, CanisterId)],
) -> CertificateBuilder {
    let subnet = Label::from(subnet_id.as_slice());
    let ranges: Vec<(PrincipalId, PrincipalId)> = ranges
        .iter()
        .map(|(start, end)| (start.get(), end.get()))
        .collect();
    CertificateBuilder::new(root)
        .with_leaf(
            [Label::from("subnet"), subnet.clone(), Label::from("public_key")],
            subnet_key.public_key_der(),
        )
        .with_leaf(
            [Label::from("subnet"), subnet, Label::from("canister_ranges")],
            serde_cbor::to_vec(&ranges).expect("failed to encode canister ranges"),
        )
}

fn insert_leaf(tree: &mut LabeledTree<Vec<u8>>, path: &[Label], value: Vec<u8>) {
    match path.split_first() {
        None => *tree = LabeledTree::Leaf(value),
        Some((label, rest)) => {
            if let LabeledTree::Leaf(_) = tree {
                *tree = LabeledTree::SubTree(BTreeMap::new());
            }
            if let LabeledTree::SubTree(children) = tree {
                let child = children
                    .entry(label.clone())
                    .or_insert_with(|| LabeledTree::SubTree(BTreeMap::new()));
                insert_leaf(child, rest, value);
            }
        }
    }
}
