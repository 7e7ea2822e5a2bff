use crate::{Digest, Label, LabeledTree, MixedHashTree as T};
use proptest::prelude::*;

/// Labeled trees over a small label alphabet, so that generated paths share
/// prefixes often.
pub(crate) fn arbitrary_labeled_tree() -> impl Strategy<Value = LabeledTree<Vec<u8>>> {
    let leaf = prop::collection::vec(any::<u8>(), 0..16).prop_map(LabeledTree::Leaf);
    leaf.prop_recursive(
        /* depth= */ 4,
        /* max_size= */ 64,
        /* items_per_collection= */ 6,
        |inner| {
            prop::collection::btree_map("[a-e]{1,3}".prop_map(Label::from), inner, 0..6)
                .prop_map(LabeledTree::SubTree)
        },
    )
}

pub(crate) fn arbitrary_leaf() -> impl Strategy<Value = T> {
    prop::collection::vec(any::<u8>(), 0..100).prop_map(T::Leaf)
}

/// Changes labels in the tree without changing the tree structure.
/// This is needed to make randomly generated trees satisfy type invariants:
/// labels must be unique and sorted.
fn fix_labels(mut t: T) -> T {
    fn prepend(l: &mut Label, n: u64) {
        let mut buf = n.to_be_bytes().to_vec();
        buf.extend_from_slice(l.as_bytes());
        *l = Label::from(buf);
    }
    fn relabel(t: &mut T, id: &mut u64) {
        match t {
            T::Empty | T::Leaf(_) | T::Pruned(_) => (),
            T::Fork(ref mut lr) => {
                relabel(&mut lr.0, id);
                relabel(&mut lr.1, id);
            }
            T::Labeled(ref mut l, ref mut t) => {
                prepend(l, *id);
                *id += 1;
                relabel(t, id);
            }
        }
    }

    let mut id = 0;
    relabel(&mut t, &mut id);
    t
}

pub(crate) fn arbitrary_mixed_hash_tree() -> impl Strategy<Value = T> {
    let leaf = prop_oneof![
        Just(T::Empty),
        arbitrary_leaf(),
        any::<[u8; 32]>().prop_map(Digest).prop_map(T::Pruned),
    ];

    leaf.prop_recursive(
        /* depth= */ 8,
        /* max_size= */ 256,
        /* items_per_collection= */ 1,
        |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| T::Fork(Box::new((l, r)))),
                (".*", inner).prop_map(|(l, t)| T::Labeled(Label::from(l), Box::new(t))),
            ]
        },
    )
    .prop_map(fix_labels)
}
