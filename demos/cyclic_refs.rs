//! Serializing a doubly-linked ring: shared references and cycles.
//!
//! Run with: `cargo run --example cyclic_refs`

use std::cell::RefCell;
use std::rc::Rc;

use graphbuf::{graph, Schema};

#[derive(Debug, Default, Schema)]
struct Station {
    #[graphbuf(field = 1)]
    name: String,
    #[graphbuf(field = 2, graph)]
    next: Option<Rc<RefCell<Station>>>,
    #[graphbuf(field = 3, graph)]
    prev: Option<Rc<RefCell<Station>>>,
}

fn station(name: &str) -> Rc<RefCell<Station>> {
    Rc::new(RefCell::new(Station {
        name: name.to_owned(),
        ..Station::default()
    }))
}

fn main() -> graphbuf::Result<()> {
    // a ring: north -> east -> south -> north, with back links
    let north = station("north");
    let east = station("east");
    let south = station("south");
    for (a, b) in [(&north, &east), (&east, &south), (&south, &north)] {
        a.borrow_mut().next = Some(b.clone());
        b.borrow_mut().prev = Some(a.clone());
    }

    let bytes = graph::to_vec(&north, &StationSchema)?;
    println!("ring of 3 encoded into {} bytes", bytes.len());

    let restored = station("");
    graph::merge_from(&bytes, &restored, &StationSchema)?;

    // walk the ring forward and confirm it closes on the root
    let mut names = Vec::new();
    let mut cursor = restored.clone();
    loop {
        names.push(cursor.borrow().name.clone());
        let next = cursor.borrow().next.clone().expect("ring is closed");
        if Rc::ptr_eq(&next, &restored) {
            break;
        }
        cursor = next;
    }
    println!("walked: {}", names.join(" -> "));
    assert_eq!(names, ["north", "east", "south"]);

    // back links resolve to the same instances, not copies
    let back = restored.borrow().prev.clone().expect("prev");
    assert_eq!(back.borrow().name, "south");
    Ok(())
}
