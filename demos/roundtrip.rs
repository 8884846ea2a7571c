//! Minimal encode/decode walkthrough.
//!
//! Run with: `cargo run --example roundtrip`

use bytes::Bytes;
use graphbuf::{io, BufferedOutput, Schema};

#[derive(Debug, Default, Clone, PartialEq, Schema)]
struct Document {
    #[graphbuf(field = 1)]
    id: u64,
    #[graphbuf(field = 2)]
    title: String,
    #[graphbuf(field = 3)]
    tags: Vec<String>,
    #[graphbuf(field = 4)]
    body: Bytes,
}

fn main() -> graphbuf::Result<()> {
    let document = Document {
        id: 1,
        title: "segmented buffers".to_owned(),
        tags: vec!["codec".to_owned(), "zero-copy".to_owned()],
        body: Bytes::from(vec![0x42; 4096]),
    };

    // one-shot encode
    let bytes = io::to_vec(&document, &DocumentSchema)?;
    println!("encoded {} bytes", bytes.len());

    // reusing one buffer across many encodes
    let mut buffer = BufferedOutput::new();
    for _ in 0..3 {
        let again = io::to_vec_with(&mut buffer, &document, &DocumentSchema)?;
        assert_eq!(again, bytes);
        buffer.reset()?;
    }

    let mut restored = Document::default();
    io::merge_from(&bytes, &mut restored, &DocumentSchema)?;
    assert_eq!(restored, document);
    println!("roundtrip ok: {:?}", restored.title);
    Ok(())
}
