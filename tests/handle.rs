use std::sync::Mutex;
use std::thread;
use strand::*;

#[test]
fn test_handle_basic() {
    let h = Handle::new(Node::leaf("initial"));
    assert_eq!(h.root().to_text(), "initial");

    h.set(Node::leaf("updated"));
    assert_eq!(h.root().to_text(), "updated");

    let applied = h.apply(|n| join(n, &Node::leaf("!")));
    assert_eq!(applied.to_text(), "updated!");
    assert_eq!(h.root().to_text(), "updated!");
}

#[test]
fn test_handle_snapshot_isolation() {
    let h = Handle::new(Node::leaf("v1"));
    let snap = h.snapshot();

    h.set(Node::leaf("v2"));
    h.apply(|n| join(n, &Node::leaf("v3")));

    assert_eq!(snap.to_text(), "v1");
    assert_eq!(h.snapshot().to_text(), "v2v3");
}

#[test]
fn test_handle_concurrent_appends() {
    let h = Handle::new(Node::leaf(""));
    let writers = 100;
    let writes_per_worker = 100;

    thread::scope(|scope| {
        for _ in 0..writers {
            scope.spawn(|| {
                for _ in 0..writes_per_worker {
                    h.apply(|n| join(n, &Node::leaf("a")));
                }
            });
        }

        // Readers race the writers; every snapshot they see is internally
        // consistent
        scope.spawn(|| {
            for _ in 0..1000 {
                let r = h.root();
                assert_eq!(r.to_bytes().len(), r.len());
            }
        });
    });

    let finished = h.root();
    assert_eq!(finished.len(), writers * writes_per_worker);
    assert!(finished.to_bytes().iter().all(|&b| b == b'a'));
}

#[test]
fn test_par_for_each_single_worker_in_order() {
    let mut rope = Node::leaf("");
    let mut expected = String::new();
    for i in 0..100 {
        let chunk = format!("chunk{} ", i);
        expected.push_str(&chunk);
        rope = join(&rope, &Node::leaf(&chunk));
    }

    // One worker drains the channel in traversal order
    let collected = Mutex::new(String::new());
    par_for_each(&rope, 1, |chunk| {
        collected
            .lock()
            .unwrap()
            .push_str(std::str::from_utf8(chunk).unwrap());
    });
    assert_eq!(collected.into_inner().unwrap(), expected);
}

#[test]
fn test_par_for_each_many_workers() {
    let mut rope = Node::leaf("");
    let mut expected = String::new();
    for i in 0..100 {
        let chunk = format!("chunk{} ", i);
        expected.push_str(&chunk);
        rope = join(&rope, &Node::leaf(&chunk));
    }

    // Order across workers is unspecified; coverage is not
    let parts = Mutex::new(Vec::new());
    par_for_each(&rope, 10, |chunk| {
        parts.lock().unwrap().push(chunk.to_vec());
    });

    let parts = parts.into_inner().unwrap();
    let total: usize = parts.iter().map(|p| p.len()).sum();
    assert_eq!(total, expected.len());

    // Leaves may have been coalesced, so check each emitted part is a
    // contiguous piece of the original content
    for part in &parts {
        let text = std::str::from_utf8(part).unwrap();
        assert!(expected.contains(text), "unexpected part {:?}", text);
    }
}

#[test]
fn test_par_for_each_empty_and_zero_workers() {
    let empty = Node::leaf("");
    par_for_each(&empty, 4, |_| panic!("no chunks expected"));

    let rope = Node::leaf("abc");
    let count = Mutex::new(0usize);
    par_for_each(&rope, 0, |chunk| {
        *count.lock().unwrap() += chunk.len();
    });
    assert_eq!(count.into_inner().unwrap(), 3);
}
