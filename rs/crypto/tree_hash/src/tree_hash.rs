//! Digest computation, construction and lookup for `MixedHashTree`.

use crate::hasher::Hasher;
use crate::{Digest, Label, LabeledTree, MixedHashTree, Path, TreeHashError};
use std::cmp::Ordering;
use std::collections::VecDeque;


const DOMAIN_HASHTREE_LEAF: &str = "ic-hashtree-leaf";
const DOMAIN_HASHTREE_EMPTY_SUBTREE: &str = "ic-hashtree-empty";
const DOMAIN_HASHTREE_NODE: &str = "ic-hashtree-labeled";
const DOMAIN_HASHTREE_FORK: &str = "ic-hashtree-fork";

pub(crate) fn empty_subtree_hash() -> Digest {
    Hasher::for_domain(DOMAIN_HASHTREE_EMPTY_SUBTREE).finalize()
}

pub(crate) fn compute_leaf_digest(contents: &[u8]) -> Digest {
    let mut hasher = Hasher::for_domain(DOMAIN_HASHTREE_LEAF);
    hasher.update(contents);
    hasher.finalize()
}

pub(crate) fn compute_node_digest(label: &Label, subtree_digest: &Digest) -> Digest {
    let mut hasher = Hasher::for_domain(DOMAIN_HASHTREE_NODE);
    hasher.update(label.as_bytes());
    hasher.update(&subtree_digest.0);
    hasher.finalize()
}

pub(crate) fn compute_fork_digest(left_digest: &Digest, right_digest: &Digest) -> Digest {
    let mut hasher = Hasher::for_domain(DOMAIN_HASHTREE_FORK);
    hasher.update(&left_digest.0);
    hasher.update(&right_digest.0);
    hasher.finalize()
}

pub(crate) fn mixed_hash_tree_digest(tree: &MixedHashTree) -> Digest {
    match tree {
        MixedHashTree::Empty => empty_subtree_hash(),
        MixedHashTree::Fork(lr) => {
            compute_fork_digest(&mixed_hash_tree_digest(&lr.0), &mixed_hash_tree_digest(&lr.1))
        }
        MixedHashTree::Labeled(label, subtree) => {
            compute_node_digest(label, &mixed_hash_tree_digest(subtree))
        }
        MixedHashTree::Leaf(data) => compute_leaf_digest(data),
        MixedHashTree::Pruned(digest) => *digest,
    }
}

// Wraps the given hash_trees into a single tree of forks, maintaining
// the order of the subtrees.
fn into_hash_tree(mut hash_trees: VecDeque<MixedHashTree>) -> MixedHashTree {
    if hash_trees.is_empty() {
        return MixedHashTree::Empty;
    }

    let mut combined_trees = VecDeque::with_capacity((hash_trees.len() + 1) / 2);
    while hash_trees.len() != 1 {
        while let Some(left) = hash_trees.pop_front() {
            match hash_trees.pop_front() {
                Some(right) => {
                    combined_trees.push_back(MixedHashTree::Fork(Box::new((left, right))))
                }
                None => combined_trees.push_back(left),
            }
        }
        std::mem::swap(&mut hash_trees, &mut combined_trees);
    }
    hash_trees.pop_front().unwrap_or(MixedHashTree::Empty)
}

/// Builds the unpruned hash tree of `tree`. Children of a subtree are laid
/// out in label order under a balanced tree of forks.
pub(crate) fn mixed_hash_tree_from_labeled(tree: &LabeledTree<Vec<u8>>) -> MixedHashTree {
    match tree {
        LabeledTree::Leaf(data) => MixedHashTree::Leaf(data.clone()),
        LabeledTree::SubTree(children) => into_hash_tree(
            children
                .iter()
                .map(|(label, child)| {
                    MixedHashTree::Labeled(
                        label.clone(),
                        Box::new(mixed_hash_tree_from_labeled(child)),
                    )
                })
                .collect(),
        ),
    }
}

/// The outcome of resolving a path against a (possibly pruned) tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupResult<'a> {
    /// The path leads to a leaf with these contents.
    Found(&'a [u8]),
    /// The tree proves that nothing exists at the path.
    Absent,
    /// The path leads into a pruned part of the tree; nothing can be
    /// concluded.
    Unknown,
    /// The path does not end at a leaf: it stops at an inner node or
    /// continues below a leaf.
    Error,
}

enum LabelLookup<'a> {
    Found(&'a MixedHashTree),
    Absent,
    Unknown,
    // The label sorts before every label in the searched tree.
    Less,
    // The label sorts after every label in the searched tree.
    Greater,
}

fn lookup_label<'a>(tree: &'a MixedHashTree, label: &Label) -> LabelLookup<'a> {
    match tree {
        MixedHashTree::Labeled(l, subtree) => match label.cmp(l) {
            Ordering::Less => LabelLookup::Less,
            Ordering::Equal => LabelLookup::Found(subtree),
            Ordering::Greater => LabelLookup::Greater,
        },
        MixedHashTree::Fork(lr) => match lookup_label(&lr.0, label) {
            LabelLookup::Greater => match lookup_label(&lr.1, label) {
                LabelLookup::Less => LabelLookup::Absent,
                result => result,
            },
            LabelLookup::Unknown => match lookup_label(&lr.1, label) {
                LabelLookup::Less => LabelLookup::Unknown,
                result => result,
            },
            result => result,
        },
        MixedHashTree::Pruned(_) => LabelLookup::Unknown,
        MixedHashTree::Empty | MixedHashTree::Leaf(_) => LabelLookup::Absent,
    }
}

/// Resolves `path` against `tree`.
///
/// Only an explicitly present labeled node can lead to `Found`, so a path
/// whose ancestor was pruned resolves to `Unknown` (or `Absent`, if the
/// surrounding labels prove it cannot exist).
pub fn lookup_path<'a>(tree: &'a MixedHashTree, path: &[Label]) -> LookupResult<'a> {
    match path.split_first() {
        None => match tree {
            MixedHashTree::Leaf(data) => LookupResult::Found(data),
            MixedHashTree::Empty => LookupResult::Absent,
            MixedHashTree::Pruned(_) => LookupResult::Unknown,
            MixedHashTree::Labeled(..) | MixedHashTree::Fork(_) => LookupResult::Error,
        },
        Some((_, _)) if matches!(tree, MixedHashTree::Leaf(_)) => LookupResult::Error,
        Some((label, rest)) => match lookup_label(tree, label) {
            LabelLookup::Found(subtree) => lookup_path(subtree, rest),
            LabelLookup::Unknown => LookupResult::Unknown,
            LabelLookup::Absent | LabelLookup::Less | LabelLookup::Greater => {
                LookupResult::Absent
            }
        },
    }
}

// Rebuilds `tree` with the labeled child `label` (searched through forks)
// pruned at `rest`. Returns `None` if no such child is present.
fn prune_child(
    tree: &MixedHashTree,
    label: &Label,
    rest: &[Label],
    full_path: &[Label],
) -> Option<Result<MixedHashTree, TreeHashError>> {
    match tree {
        MixedHashTree::Labeled(l, subtree) if l == label => Some(
            prune_impl(subtree, rest, full_path)
                .map(|pruned| MixedHashTree::Labeled(l.clone(), Box::new(pruned))),
        ),
        MixedHashTree::Fork(lr) => {
            if let Some(left) = prune_child(&lr.0, label, rest, full_path) {
                return Some(left.map(|left| MixedHashTree::Fork(Box::new((left, lr.1.clone())))));
            }
            prune_child(&lr.1, label, rest, full_path)
                .map(|right| right.map(|right| MixedHashTree::Fork(Box::new((lr.0.clone(), right)))))
        }
        _ => None,
    }
}

fn prune_impl(
    tree: &MixedHashTree,
    path: &[Label],
    full_path: &[Label],
) -> Result<MixedHashTree, TreeHashError> {
    match path.split_first() {
        None => Ok(MixedHashTree::Pruned(tree.digest())),
        Some((label, rest)) => prune_child(tree, label, rest, full_path).unwrap_or_else(|| {
            Err(TreeHashError::InvalidPrunePath {
                offending_path: Path::new(full_path.to_vec()),
            })
        }),
    }
}

pub(crate) fn prune_path(
    tree: &MixedHashTree,
    path: &[Label],
) -> Result<MixedHashTree, TreeHashError> {
    prune_impl(tree, path, path)
}
