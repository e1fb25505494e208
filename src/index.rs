//! Byte offset to (row, col) conversion over cached newline counts
//!
//! Rows are 0-based counts of `\n` bytes; the segment after the last newline
//! is a valid final row. The subtle case is the continuation line: a line
//! whose bytes straddle a concat boundary. Newline counts alone cannot tell
//! whether a position in the right child starts a fresh line or extends the
//! left child's trailing segment, so both conversions lean on
//! [`last_line_len`], an O(log n) rightmost descent.

use crate::Node;
use bytecount::count as bytecount_count;
use memchr::{memchr, memchr_iter, memrchr};

/// Convert a byte offset to a 0-based `(row, col)` pair. `None` when the
/// offset is past the end; `offset == len` addresses the end position.
pub fn offset_to_rowcol(n: &Node, offset: usize) -> Option<(u32, usize)> {
    if offset > n.len() {
        return None;
    }
    Some(rowcol_rec(n, offset))
}

fn rowcol_rec(n: &Node, offset: usize) -> (u32, usize) {
    match n {
        Node::Leaf { bytes, .. } => {
            let prefix = &bytes[..offset];
            let row = bytecount_count(prefix, b'\n') as u32;
            let col = match memrchr(b'\n', prefix) {
                Some(pos) => offset - pos - 1,
                None => offset,
            };
            (row, col)
        }
        Node::Concat(c) => {
            let mid = c.left().len();
            if offset <= mid {
                return rowcol_rec(c.left(), offset);
            }
            let (r, col) = rowcol_rec(c.right(), offset - mid);
            if r == 0 {
                // Continuation line: the line began inside the left child,
                // so the column includes the left child's trailing segment
                (c.left().lines(), last_line_len(c.left()) + col)
            } else {
                (c.left().lines() + r, col)
            }
        }
    }
}

/// Convert a 0-based `(row, col)` to a byte offset. `None` when the row does
/// not exist or `col` runs past the end of that line. A column addressing
/// the line's `\n` (or the rope's end, for the final row) is valid.
pub fn rowcol_to_offset(n: &Node, row: u32, col: usize) -> Option<usize> {
    if row > n.lines() {
        return None;
    }
    offset_rec(n, row, col)
}

fn offset_rec(n: &Node, row: u32, col: usize) -> Option<usize> {
    match n {
        Node::Leaf { bytes, .. } => {
            let start = line_start(bytes, row)?;
            let end = memchr(b'\n', &bytes[start..])
                .map(|p| start + p)
                .unwrap_or(bytes.len());
            if col <= end - start {
                Some(start + col)
            } else {
                None
            }
        }
        Node::Concat(c) => {
            let left_lines = c.left().lines();
            if row < left_lines {
                // The line's terminating newline is inside the left child
                return offset_rec(c.left(), row, col);
            }
            if row > left_lines {
                return offset_rec(c.right(), row - left_lines, col)
                    .map(|o| c.left().len() + o);
            }
            // The target line begins in the left child's tail and may
            // continue into the right child
            let tail = last_line_len(c.left());
            if col <= tail {
                Some(c.left().len() - tail + col)
            } else {
                offset_rec(c.right(), 0, col - tail).map(|o| c.left().len() + o)
            }
        }
    }
}

/// Offset of the first byte of the `row`-th line within a leaf.
fn line_start(bytes: &[u8], row: u32) -> Option<usize> {
    if row == 0 {
        return Some(0);
    }
    let mut seen = 0u32;
    for pos in memchr_iter(b'\n', bytes) {
        seen += 1;
        if seen == row {
            return Some(pos + 1);
        }
    }
    None
}

/// Length of the trailing line segment: bytes after the last `\n`, or the
/// whole content when there is none. Rightmost descent, O(log n); a right
/// child with no newlines is a pure continuation of the left child's
/// trailing line.
pub(crate) fn last_line_len(n: &Node) -> usize {
    match n {
        Node::Leaf { bytes, .. } => match memrchr(b'\n', bytes) {
            Some(pos) => bytes.len() - pos - 1,
            None => bytes.len(),
        },
        Node::Concat(c) => {
            if c.right().lines() > 0 {
                last_line_len(c.right())
            } else {
                last_line_len(c.left()) + c.right().len()
            }
        }
    }
}
