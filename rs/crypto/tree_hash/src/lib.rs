//! Hash trees as returned in certified responses: their wire encoding,
//! root digest reconstruction and path lookups.
//!
//! A [`MixedHashTree`] is a partial view of a labeled tree in which some
//! subtrees are replaced by their digests. Lookups over such a tree have four
//! outcomes (see [`LookupResult`]); in particular a pruned branch is never
//! proof that a path is absent.
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[cfg(test)]
mod arbitrary;
mod hasher;
mod tree_hash;

pub use tree_hash::{lookup_path, LookupResult};

/// A SHA-256 digest of a (sub)tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }
}

/// A blob used as an edge label in a tree. Labels are ordered
/// lexicographically as byte strings.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Label(Vec<u8>);

impl Label {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label(s.as_bytes().to_vec())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label(s.into_bytes())
    }
}

impl From<Vec<u8>> for Label {
    fn from(bytes: Vec<u8>) -> Self {
        Label(bytes)
    }
}

impl From<&[u8]> for Label {
    fn from(bytes: &[u8]) -> Self {
        Label(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Label {
    fn from(bytes: [u8; N]) -> Self {
        Label(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Label {
    fn from(bytes: &[u8; N]) -> Self {
        Label(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Label {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn is_printable_ascii(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_printable_ascii(&self.0) {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x{}", hex::encode(&self.0))
        }
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_bytes::ByteBuf::deserialize(deserializer).map(|buf| Label(buf.into_vec()))
    }
}

/// An ordered sequence of labels addressing a node of a tree, e.g.
/// `["request_status", <request id>, "status"]`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Label>);

impl Path {
    pub fn new(labels: Vec<Label>) -> Self {
        Path(labels)
    }

    /// Returns a new path with `label` appended.
    pub fn join<L: Into<Label>>(&self, label: L) -> Path {
        let mut labels = self.0.clone();
        labels.push(label.into());
        Path(labels)
    }

    pub fn labels(&self) -> &[Label] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L: Into<Label>> FromIterator<L> for Path {
    fn from_iter<I: IntoIterator<Item = L>>(iter: I) -> Self {
        Path(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for Path {
    type Item = Label;
    type IntoIter = std::vec::IntoIter<Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl AsRef<[Label]> for Path {
    fn as_ref(&self) -> &[Label] {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", label)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A fully materialized labeled tree, the form in which state is authored
/// before it gets hashed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LabeledTree<T> {
    Leaf(T),
    SubTree(BTreeMap<Label, LabeledTree<T>>),
}

/// A partially pruned hash tree. This is the structure carried by
/// certificates.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum MixedHashTree {
    Empty,
    Fork(Box<(MixedHashTree, MixedHashTree)>),
    Labeled(Label, Box<MixedHashTree>),
    Leaf(Vec<u8>),
    Pruned(Digest),
}

impl MixedHashTree {
    /// Recomputes the root digest of the tree. Pruned subtrees contribute
    /// the digest they carry.
    pub fn digest(&self) -> Digest {
        tree_hash::mixed_hash_tree_digest(self)
    }

    /// Resolves `path` against this tree.
    pub fn lookup<P: AsRef<[Label]>>(&self, path: P) -> LookupResult<'_> {
        lookup_path(self, path.as_ref())
    }

    /// Returns a copy of this tree in which the subtree at `path` is
    /// replaced by its digest. The root digest is unchanged.
    pub fn prune<P: AsRef<[Label]>>(&self, path: P) -> Result<MixedHashTree, TreeHashError> {
        tree_hash::prune_path(self, path.as_ref())
    }
}

impl From<&LabeledTree<Vec<u8>>> for MixedHashTree {
    fn from(tree: &LabeledTree<Vec<u8>>) -> Self {
        tree_hash::mixed_hash_tree_from_labeled(tree)
    }
}

/// Errors produced while reshaping trees.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TreeHashError {
    #[error("path {offending_path} does not lead to a subtree that can be pruned")]
    InvalidPrunePath { offending_path: Path },
}

const TAG_EMPTY: u8 = 0;
const TAG_FORK: u8 = 1;
const TAG_LABELED: u8 = 2;
const TAG_LEAF: u8 = 3;
const TAG_PRUNED: u8 = 4;

impl Serialize for MixedHashTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MixedHashTree::Empty => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&TAG_EMPTY)?;
                seq.end()
            }
            MixedHashTree::Fork(lr) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&TAG_FORK)?;
                seq.serialize_element(&lr.0)?;
                seq.serialize_element(&lr.1)?;
                seq.end()
            }
            MixedHashTree::Labeled(label, tree) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&TAG_LABELED)?;
                seq.serialize_element(label)?;
                seq.serialize_element(tree)?;
                seq.end()
            }
            MixedHashTree::Leaf(data) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&TAG_LEAF)?;
                seq.serialize_element(serde_bytes::Bytes::new(data))?;
                seq.end()
            }
            MixedHashTree::Pruned(digest) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&TAG_PRUNED)?;
                seq.serialize_element(serde_bytes::Bytes::new(&digest.0))?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for MixedHashTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MixedHashTreeVisitor;

        impl<'de> Visitor<'de> for MixedHashTreeVisitor {
            type Value = MixedHashTree;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("MixedHashTree encoded as a tagged CBOR array")
            }

            fn visit_seq<V: SeqAccess<'de>>(self, mut seq: V) -> Result<MixedHashTree, V::Error> {
                let tag: u8 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;

                let (tree, len) = match tag {
                    TAG_EMPTY => (MixedHashTree::Empty, 1),
                    TAG_FORK => {
                        let left: MixedHashTree = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        let right: MixedHashTree = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                        (MixedHashTree::Fork(Box::new((left, right))), 3)
                    }
                    TAG_LABELED => {
                        let label: Label = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        let subtree: MixedHashTree = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                        (MixedHashTree::Labeled(label, Box::new(subtree)), 3)
                    }
                    TAG_LEAF => {
                        let data: serde_bytes::ByteBuf = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        (MixedHashTree::Leaf(data.into_vec()), 2)
                    }
                    TAG_PRUNED => {
                        let bytes: serde_bytes::ByteBuf = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        let digest: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                            de::Error::invalid_length(bytes.len(), &"a 32-byte digest")
                        })?;
                        (MixedHashTree::Pruned(Digest(digest)), 2)
                    }
                    other => {
                        return Err(de::Error::custom(format!("unknown tag: {}", other)));
                    }
                };

                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(len + 1, &self));
                }
                Ok(tree)
            }
        }

        deserializer.deserialize_seq(MixedHashTreeVisitor)
    }
}
