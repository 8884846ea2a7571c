//! Graph-mode tests: shared references, cycles, and tree-mode equivalence.

use std::cell::RefCell;
use std::rc::Rc;

use graphbuf::{graph, io, GraphbufError, Schema};

#[derive(Debug, Default, Schema)]
struct Node {
    #[graphbuf(field = 1)]
    value: i32,
    #[graphbuf(field = 2, graph)]
    next: Option<Rc<RefCell<Node>>>,
}

#[derive(Debug, Default, Schema)]
struct Registry {
    #[graphbuf(field = 1)]
    name: String,
    #[graphbuf(field = 2, graph)]
    entries: Vec<Rc<RefCell<Node>>>,
}

fn node(value: i32) -> Rc<RefCell<Node>> {
    Rc::new(RefCell::new(Node { value, next: None }))
}

#[test]
fn two_node_cycle_roundtrips() {
    let a = node(1);
    let b = node(2);
    a.borrow_mut().next = Some(b.clone());
    b.borrow_mut().next = Some(a.clone());

    let bytes = graph::to_vec(&a, &NodeSchema).expect("encode terminates");

    let restored = node(0);
    graph::merge_from(&bytes, &restored, &NodeSchema).expect("decode");

    let restored_b = restored.borrow().next.clone().expect("a -> b");
    assert_eq!(restored.borrow().value, 1);
    assert_eq!(restored_b.borrow().value, 2);
    // two distinct instances with the mutual reference restored
    assert!(!Rc::ptr_eq(&restored, &restored_b));
    let back = restored_b.borrow().next.clone().expect("b -> a");
    assert!(Rc::ptr_eq(&back, &restored));
}

#[test]
fn self_loop_roundtrips() {
    let a = node(7);
    a.borrow_mut().next = Some(a.clone());

    let bytes = graph::to_vec(&a, &NodeSchema).expect("encode");
    let restored = node(0);
    graph::merge_from(&bytes, &restored, &NodeSchema).expect("decode");

    assert_eq!(restored.borrow().value, 7);
    let next = restored.borrow().next.clone().expect("self reference");
    assert!(Rc::ptr_eq(&next, &restored));
}

#[test]
fn shared_instance_is_encoded_once_and_rebound() {
    let shared = node(99);
    let registry = Rc::new(RefCell::new(Registry {
        name: "dup".to_owned(),
        entries: vec![shared.clone(), shared.clone(), node(1)],
    }));

    let bytes = graph::to_vec(&registry, &RegistrySchema).expect("encode");

    let restored = Rc::new(RefCell::new(Registry::default()));
    graph::merge_from(&bytes, &restored, &RegistrySchema).expect("decode");

    let entries = restored.borrow().entries.clone();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].borrow().value, 99);
    assert!(Rc::ptr_eq(&entries[0], &entries[1]));
    assert!(!Rc::ptr_eq(&entries[0], &entries[2]));
}

#[test]
fn unshared_graph_matches_tree_mode_byte_for_byte() {
    let chain = node(1);
    let second = node(2);
    let third = node(3);
    second.borrow_mut().next = Some(third);
    chain.borrow_mut().next = Some(second);

    let graph_bytes = graph::to_vec(&chain, &NodeSchema).expect("graph encode");
    let tree_bytes = io::to_vec(&*chain.borrow(), &NodeSchema).expect("tree encode");
    assert_eq!(graph_bytes, tree_bytes);

    // and tree-mode decode accepts the unshared graph bytes
    let mut plain = Node::default();
    io::merge_from(&graph_bytes, &mut plain, &NodeSchema).expect("tree decode");
    assert_eq!(plain.value, 1);
    let second = plain.next.as_ref().expect("chain").borrow().value;
    assert_eq!(second, 2);
}

#[test]
fn back_reference_outside_graph_mode_is_rejected() {
    let a = node(1);
    a.borrow_mut().next = Some(a.clone());
    let bytes = graph::to_vec(&a, &NodeSchema).expect("encode");

    let mut plain = Node::default();
    let err = io::merge_from(&bytes, &mut plain, &NodeSchema).unwrap_err();
    assert!(matches!(err, GraphbufError::Graph(_)));
}

#[test]
fn corrupted_reference_id_is_detected() {
    // field 2 as varint back-reference to an id that was never assigned
    let bytes = [0x08, 0x01, 0x10, 0x09];
    let restored = node(0);
    let err = graph::merge_from(&bytes, &restored, &NodeSchema).unwrap_err();
    assert!(matches!(err, GraphbufError::Graph(_)));
}

#[test]
fn reference_tables_do_not_leak_across_calls() {
    let a = node(5);
    a.borrow_mut().next = Some(a.clone());
    let first = graph::to_vec(&a, &NodeSchema).expect("encode");
    // the same instance serialized again must produce identical bytes,
    // not a dangling back-reference into the previous call's table
    let second = graph::to_vec(&a, &NodeSchema).expect("encode again");
    assert_eq!(first, second);

    let r1 = node(0);
    graph::merge_from(&first, &r1, &NodeSchema).expect("decode");
    let r2 = node(0);
    graph::merge_from(&second, &r2, &NodeSchema).expect("decode");
    assert!(Rc::ptr_eq(
        &r1.borrow().next.clone().expect("loop"),
        &r1
    ));
    assert!(!Rc::ptr_eq(&r1, &r2));
}
