//! Thread-safe rope handle: lock-free snapshots, serialized writers

use crate::Node;
use arc_swap::ArcSwap;
use crossbeam::channel;
use serde::{Serialize, Serializer};
use std::sync::{Arc, Mutex};
use std::thread;

/// Shared wrapper around a rope root. Readers take snapshots with a single
/// atomic load and never block; writers are serialized behind one mutex.
/// The persistent tree makes this sufficient: a snapshot stays valid forever
/// because no node is ever mutated in place.
pub struct Handle {
    current: ArcSwap<Node>,
    write: Mutex<()>,
}

impl Handle {
    pub fn new(initial: Node) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            write: Mutex::new(()),
        }
    }

    /// Current root. Wait-free; the returned node is unaffected by any
    /// later `set` or `apply`.
    pub fn root(&self) -> Node {
        Node::clone(&self.current.load())
    }

    /// Alias for [`Handle::root`], emphasizing the point-in-time view.
    pub fn snapshot(&self) -> Node {
        self.root()
    }

    /// Replace the root.
    pub fn set(&self, n: Node) {
        let _guard = self.write.lock().unwrap();
        self.current.store(Arc::new(n));
    }

    /// Atomically apply `f` to the current root and install the result,
    /// returning it. Concurrent writers are serialized by the mutex rather
    /// than a compare-and-swap loop, so `f` runs exactly once even when it
    /// is expensive or impure.
    pub fn apply<F>(&self, f: F) -> Node
    where
        F: FnOnce(&Node) -> Node,
    {
        let _guard = self.write.lock().unwrap();
        let new_root = f(&self.current.load());
        self.current.store(Arc::new(new_root.clone()));
        new_root
    }

    /// Replace the contents from a JSON string with a fresh single leaf.
    /// The handle is untouched when parsing fails.
    pub fn set_json(&self, data: &str) -> Result<(), serde_json::Error> {
        let text: String = serde_json::from_str(data)?;
        self.set(Node::leaf(&text));
        Ok(())
    }
}

impl Serialize for Handle {
    /// A handle serializes as the JSON string of its current snapshot.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

/// Fan the rope's leaf chunks out to a fixed pool of worker threads over a
/// bounded channel. The producer traverses in order and closes the channel;
/// workers drain it and join before this returns. Callback order across
/// workers is not guaranteed, but a single worker observes the in-order
/// traversal. `workers == 0` uses the available parallelism.
pub fn par_for_each<F>(n: &Node, workers: usize, f: F)
where
    F: Fn(&[u8]) + Sync,
{
    let workers = if workers == 0 {
        thread::available_parallelism().map(|p| p.get()).unwrap_or(1)
    } else {
        workers
    };

    let (tx, rx) = channel::bounded::<Arc<[u8]>>(workers * 2);
    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let f = &f;
            scope.spawn(move || {
                for chunk in rx {
                    f(&chunk);
                }
            });
        }
        drop(rx);

        n.each_leaf_chunk(&mut |chunk| {
            // Workers only exit once the channel closes, so send cannot fail
            let _ = tx.send(chunk);
        });
        drop(tx);
    });
}
