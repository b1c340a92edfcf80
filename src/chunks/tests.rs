use super::*;
use serde_json::json;

fn metadata(value: Value) -> Map<String, Value> {
    value
        .as_object()
        .cloned()
        .expect("test metadata should be a JSON object")
}

#[test]
fn short_chunks_pass_through_unchanged() {
    let chunks = vec![
        Chunk::text("short paragraph").with_id("a").with_page(1),
        Chunk::new(ChunkType::Table, "| a | b |").with_page(2),
    ];

    let split = split_oversized_chunks(chunks.clone(), 100);
    assert_eq!(split, chunks);
}

#[test]
fn oversized_chunk_is_sliced_into_fixed_parts() {
    let content = "abcdefghij".repeat(3); // 30 characters
    let chunk = Chunk::new(ChunkType::Table, content)
        .with_id("doc_chunk_0")
        .with_page(7)
        .with_metadata(metadata(json!({ "source": "report.pdf" })));

    let split = split_oversized_chunks(vec![chunk], 12);

    assert_eq!(split.len(), 3);
    assert_eq!(split[0].content.len(), 12);
    assert_eq!(split[1].content.len(), 12);
    assert_eq!(split[2].content.len(), 6);

    for (n, part) in split.iter().enumerate() {
        assert_eq!(part.id.as_deref(), Some(format!("doc_chunk_0_part_{n}").as_str()));
        assert_eq!(part.chunk_type, ChunkType::Table);
        assert_eq!(part.page_number, Some(7));
        assert_eq!(
            part.metadata.as_ref().and_then(|m| m.get("source")),
            Some(&json!("report.pdf"))
        );
    }
}

#[test]
fn parts_without_source_id_stay_anonymous() {
    let split = split_oversized_chunks(vec![Chunk::text("x".repeat(25))], 10);
    assert_eq!(split.len(), 3);
    assert!(split.iter().all(|c| c.id.is_none()));
}

#[test]
fn splitting_preserves_content() {
    let content = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(40);
    let chunks = vec![
        Chunk::text("head").with_id("h"),
        Chunk::text(content.clone()).with_id("body"),
        Chunk::text("tail").with_id("t"),
    ];

    let split = split_oversized_chunks(chunks, 97);
    let rejoined: String = split
        .iter()
        .filter(|c| c.id.as_deref().is_some_and(|id| id.starts_with("body_part_")))
        .map(|c| c.content.as_str())
        .collect();

    assert_eq!(rejoined, content);
    assert_eq!(split.first().and_then(|c| c.id.as_deref()), Some("h"));
    assert_eq!(split.last().and_then(|c| c.id.as_deref()), Some("t"));
}

#[test]
fn splitting_is_idempotent() {
    let chunks = vec![
        Chunk::text("a".repeat(95)).with_id("one"),
        Chunk::text("b".repeat(10)).with_id("two"),
        Chunk::new(ChunkType::Table, "c".repeat(31)),
    ];

    for max_len in [1, 7, 10, 30, 31, 100] {
        let once = split_oversized_chunks(chunks.clone(), max_len);
        let twice = split_oversized_chunks(once.clone(), max_len);
        assert_eq!(once, twice, "max_len = {max_len}");
        assert!(once.iter().all(|c| c.char_len() <= max_len));
    }
}

#[test]
fn splitting_counts_characters_not_bytes() {
    let content = "é".repeat(10); // 20 bytes
    let split = split_oversized_chunks(vec![Chunk::text(content.clone())], 4);

    assert_eq!(split.len(), 3);
    assert_eq!(split[0].content, "éééé");
    assert_eq!(split[2].content, "éé");
    assert_eq!(
        split.iter().map(|c| c.content.as_str()).collect::<String>(),
        content
    );
}

#[test]
fn zero_limit_disables_splitting() {
    let chunks = vec![Chunk::text("anything at all")];
    assert_eq!(split_oversized_chunks(chunks.clone(), 0), chunks);
}

#[test]
fn image_surrogate_prefers_content_then_caption_then_filename() {
    let with_content = Chunk::new(ChunkType::Image, "A bar chart of revenue");
    assert_eq!(
        with_content.text_surrogate().as_deref(),
        Some("A bar chart of revenue")
    );

    let with_caption = Chunk::new(ChunkType::Image, "  ")
        .with_metadata(metadata(json!({ "caption": "Org chart", "filename": "org.png" })));
    assert_eq!(with_caption.text_surrogate().as_deref(), Some("Org chart"));

    let with_filename = Chunk::new(ChunkType::Image, "")
        .with_metadata(metadata(json!({ "caption": null, "filename": "org.png" })));
    assert_eq!(with_filename.text_surrogate().as_deref(), Some("org.png"));

    let with_uri = Chunk::new(ChunkType::Image, "").with_uri("file:///tmp/images/fig-3.png");
    assert_eq!(with_uri.text_surrogate().as_deref(), Some("fig-3.png"));

    let bare = Chunk::new(ChunkType::Image, "").with_uri("   ");
    assert_eq!(bare.text_surrogate(), None);
    assert_eq!(bare.image_reference(), None);
}

#[test]
fn chunk_type_parsing() {
    assert_eq!("TEXT".parse::<ChunkType>(), Ok(ChunkType::Text));
    assert_eq!(" table ".parse::<ChunkType>(), Ok(ChunkType::Table));
    assert_eq!("image".parse::<ChunkType>(), Ok(ChunkType::Image));
    assert!("video".parse::<ChunkType>().is_err());
}

#[test]
fn chunk_deserializes_with_defaults() {
    let chunk: Chunk = serde_json::from_value(json!({
        "content": "Table: totals",
        "type": "table",
        "page": 3,
    }))
    .expect("chunk should deserialize");

    assert_eq!(chunk.chunk_type, ChunkType::Table);
    assert_eq!(chunk.page_number, Some(3));
    assert!(chunk.id.is_none());
    assert!(chunk.metadata.is_none());

    let minimal: Chunk =
        serde_json::from_value(json!({ "content": "plain" })).expect("chunk should deserialize");
    assert_eq!(minimal.chunk_type, ChunkType::Text);
    assert_eq!(minimal.page_number, None);
}

#[test]
fn negative_page_reads_as_no_page() {
    let chunks: Vec<Chunk> = serde_json::from_value(json!([
        { "content": "unpaged", "page": -1 },
        { "content": "null page", "page_number": null },
        { "content": "first page", "page_number": 0 },
    ]))
    .expect("chunks should deserialize");

    assert_eq!(chunks[0].page_number, None);
    assert_eq!(chunks[1].page_number, None);
    assert_eq!(chunks[2].page_number, Some(0));

    let too_large = serde_json::from_value::<Chunk>(json!({ "page": 5_000_000_000_i64 }));
    assert!(too_large.is_err());
}
