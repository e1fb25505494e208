//! Persistent rope with cached line counts and lock-free snapshots
//!
//! A rope is a binary tree of byte chunks. Leaves own immutable byte
//! sequences; interior nodes concatenate their two children and cache the
//! aggregate byte length, depth, and newline count. No node is ever mutated
//! after construction: every edit builds O(log n) new interior nodes and
//! shares every subtree it did not touch, so readers holding an old root are
//! unaffected by later writers.
//!
//! Indexing is byte-based. Slicing may cut through a multi-byte UTF-8
//! sequence; the pieces rejoin losslessly, but materializing such a fragment
//! on its own goes through a lossy conversion in [`Node::to_text`].

use bytecount::count as bytecount_count;
use serde::{Serialize, Serializer};
use simdutf8::basic::from_utf8;
use std::sync::Arc;

mod balance;
mod handle;
mod index;

pub use balance::{split, AvlBalancer, Balancer, Builder, FibonacciBalancer};
pub use handle::{par_for_each, Handle};
pub use index::{offset_to_rowcol, rowcol_to_offset};

/// Maximum combined size for two adjacent leaves to be coalesced into one
pub const MAX_LEAF_MERGE: usize = 256;

// === Core Types ===

/// A node in the rope - either a leaf holding bytes or a concatenation of
/// two children. Cloning is cheap (reference-counted chunks and subtrees).
#[derive(Clone)]
pub enum Node {
    /// Raw bytes with cached newline count
    Leaf { bytes: Arc<[u8]>, lines: u32 },
    /// Two children with cached aggregates
    Concat(Arc<Concat>),
}

/// Interior node. Children are shared; `len`, `depth`, and `lines` are
/// computed at construction and frozen.
pub struct Concat {
    left: Node,
    right: Node,
    len: usize,
    depth: u32,
    lines: u32,
}

impl Concat {
    #[inline]
    pub fn left(&self) -> &Node {
        &self.left
    }

    #[inline]
    pub fn right(&self) -> &Node {
        &self.right
    }
}

impl Node {
    /// Build a single-leaf rope from a string.
    pub fn leaf(text: &str) -> Self {
        Self::leaf_bytes(text.as_bytes())
    }

    /// Build a leaf directly from bytes.
    pub fn leaf_bytes(bytes: &[u8]) -> Self {
        Node::Leaf {
            lines: bytecount_count(bytes, b'\n') as u32,
            bytes: bytes.into(),
        }
    }

    /// Raw concatenation: caches the aggregates, does no balancing and no
    /// coalescing. Balancers build on this; tests use it to construct
    /// deliberately skewed trees.
    pub fn concat(left: Node, right: Node) -> Self {
        Node::Concat(Arc::new(Concat {
            len: left.len() + right.len(),
            depth: 1 + left.depth().max(right.depth()),
            lines: left.lines() + right.lines(),
            left,
            right,
        }))
    }

    /// Total byte length
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { bytes, .. } => bytes.len(),
            Node::Concat(c) => c.len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Longest root-to-leaf path; 0 for a leaf
    #[inline]
    pub fn depth(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Concat(c) => c.depth,
        }
    }

    /// Number of `\n` bytes in the content
    #[inline]
    pub fn lines(&self) -> u32 {
        match self {
            Node::Leaf { lines, .. } => *lines,
            Node::Concat(c) => c.lines,
        }
    }

    /// Byte at index `i`. Panics when `i` is out of range - an out-of-range
    /// index is a caller bug, not a recoverable condition.
    pub fn byte_at(&self, i: usize) -> u8 {
        assert!(
            i < self.len(),
            "byte_at index {} out of bounds, valid range [0, {})",
            i,
            self.len()
        );
        self.byte_at_rec(i)
    }

    fn byte_at_rec(&self, i: usize) -> u8 {
        match self {
            Node::Leaf { bytes, .. } => bytes[i],
            Node::Concat(c) => {
                let mid = c.left.len();
                if i < mid {
                    c.left.byte_at_rec(i)
                } else {
                    c.right.byte_at_rec(i - mid)
                }
            }
        }
    }

    /// Substring by half-open byte range. The whole range returns the node
    /// itself; a range spanning both children slices each side and rejoins
    /// through the AVL balancer, so the result is balanced even when the
    /// source was hand-built. Panics on an invalid range.
    pub fn slice(&self, start: usize, end: usize) -> Node {
        assert!(
            start <= end && end <= self.len(),
            "slice range {}..{} invalid, valid range [0, {}]",
            start,
            end,
            self.len()
        );
        self.slice_rec(start, end)
    }

    fn slice_rec(&self, start: usize, end: usize) -> Node {
        if start == 0 && end == self.len() {
            return self.clone();
        }
        match self {
            Node::Leaf { bytes, .. } => Node::leaf_bytes(&bytes[start..end]),
            Node::Concat(c) => {
                let mid = c.left.len();
                if end <= mid {
                    c.left.slice_rec(start, end)
                } else if start >= mid {
                    c.right.slice_rec(start - mid, end - mid)
                } else {
                    balance::avl_join(
                        &c.left.slice_rec(start, mid),
                        &c.right.slice_rec(0, end - mid),
                    )
                }
            }
        }
    }

    /// Materialize the full content into a contiguous byte buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        self.each_leaf(|chunk| out.extend_from_slice(chunk));
        out
    }

    /// Materialize as a `String`. Ropes built from strings are always valid
    /// UTF-8; a fragment sliced through a multi-byte sequence falls back to
    /// lossy conversion.
    pub fn to_text(&self) -> String {
        let bytes = self.to_bytes();
        match from_utf8(&bytes) {
            Ok(_) => unsafe { String::from_utf8_unchecked(bytes) },
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    /// In-order depth-first traversal over leaf chunks. Empty leaves are
    /// skipped.
    pub fn each_leaf<F: FnMut(&[u8])>(&self, mut f: F) {
        self.each_leaf_chunk(&mut |chunk| f(&chunk));
    }

    /// Traversal yielding the shared chunk handles, used by the parallel
    /// iterator to avoid copying leaf contents.
    pub(crate) fn each_leaf_chunk<F: FnMut(Arc<[u8]>)>(&self, f: &mut F) {
        match self {
            Node::Leaf { bytes, .. } => {
                if !bytes.is_empty() {
                    f(Arc::clone(bytes));
                }
            }
            Node::Concat(c) => {
                c.left.each_leaf_chunk(f);
                c.right.each_leaf_chunk(f);
            }
        }
    }

    /// Collect leaf nodes left-to-right, preserving their cached line
    /// counts. Used by the Fibonacci rebuild.
    pub(crate) fn collect_leaves(&self, out: &mut Vec<Node>) {
        match self {
            Node::Leaf { .. } => out.push(self.clone()),
            Node::Concat(c) => {
                c.left.collect_leaves(out);
                c.right.collect_leaves(out);
            }
        }
    }
}

/// Merge two adjacent leaves into one when their combined size is at most
/// [`MAX_LEAF_MERGE`]. The merged newline count is the sum of the cached
/// counts - no rescan. Both balancers call this before anything else, which
/// keeps character-at-a-time edits from degenerating into one leaf per byte.
pub fn try_merge(left: &Node, right: &Node) -> Option<Node> {
    if left.len() + right.len() > MAX_LEAF_MERGE {
        return None;
    }
    match (left, right) {
        (
            Node::Leaf { bytes: lb, lines: ll },
            Node::Leaf { bytes: rb, lines: rl },
        ) => {
            let mut merged = Vec::with_capacity(lb.len() + rb.len());
            merged.extend_from_slice(lb);
            merged.extend_from_slice(rb);
            Some(Node::Leaf {
                bytes: merged.into(),
                lines: ll + rl,
            })
        }
        _ => None,
    }
}

// === Default-Balancer Conveniences ===

/// Concatenate two ropes via the default (AVL) balancer.
pub fn join(left: &Node, right: &Node) -> Node {
    balance::avl_join(left, right)
}

/// Insert `text` at byte index `i` via the default balancer. Panics when
/// `i` is out of range.
pub fn insert(n: &Node, i: usize, text: &str) -> Node {
    Builder::new().insert(n, i, text)
}

/// Delete the byte range `[start, end)` via the default balancer. Panics on
/// an inverted or out-of-range range.
pub fn delete(n: &Node, start: usize, end: usize) -> Node {
    Builder::new().delete(n, start, end)
}

impl Serialize for Node {
    /// Nodes serialize as a JSON string equal to their materialized content.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

// === Debug Validation ===

/// Validate cached aggregates against recomputation (debug builds only)
#[cfg(debug_assertions)]
pub(crate) fn validate_node(node: &Node) -> bool {
    match node {
        Node::Leaf { bytes, lines } => {
            let counted = bytecount_count(bytes, b'\n') as u32;
            if *lines != counted {
                eprintln!("leaf lines cache {} vs counted {}", lines, counted);
                return false;
            }
            true
        }
        Node::Concat(c) => {
            if c.left.is_empty() || c.right.is_empty() {
                eprintln!("concat with a zero-length child");
                return false;
            }
            if c.len != c.left.len() + c.right.len() {
                eprintln!(
                    "concat len cache {} vs children {} + {}",
                    c.len,
                    c.left.len(),
                    c.right.len()
                );
                return false;
            }
            if c.depth != 1 + c.left.depth().max(c.right.depth()) {
                eprintln!(
                    "concat depth cache {} vs children {} / {}",
                    c.depth,
                    c.left.depth(),
                    c.right.depth()
                );
                return false;
            }
            if c.lines != c.left.lines() + c.right.lines() {
                eprintln!(
                    "concat lines cache {} vs children {} + {}",
                    c.lines,
                    c.left.lines(),
                    c.right.lines()
                );
                return false;
            }
            validate_node(&c.left) && validate_node(&c.right)
        }
    }
}

#[cfg(not(debug_assertions))]
pub(crate) fn validate_node(_node: &Node) -> bool {
    true
}
