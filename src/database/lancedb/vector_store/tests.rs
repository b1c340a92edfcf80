use crate::chunks::ChunkType;
use crate::config::{CollectionConfig, OllamaConfig};
use crate::metadata::MetadataValue;

use super::*;
use tempfile::TempDir;

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            embedding_dimension: 5,
            ..OllamaConfig::default()
        },
        collection: CollectionConfig {
            name: "test_chunks".to_string(),
            ..CollectionConfig::default()
        },
    };
    (config, temp_dir)
}

fn create_test_record(n: u32, doc_id: &str, chunk_type: ChunkType) -> ChunkRecord {
    let mut vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    for (i, val) in vector.iter_mut().enumerate() {
        *val += (n as f32).mul_add(0.05, i as f32 * 0.001);
    }

    let mut metadata = Metadata::new();
    metadata.insert("doc_id".to_string(), MetadataValue::from(doc_id));
    metadata.insert("type".to_string(), MetadataValue::from(chunk_type.as_str()));
    metadata.insert("page".to_string(), MetadataValue::from(i64::from(n)));

    ChunkRecord {
        id: format!("{}_chunk_{}", doc_id, n),
        vector,
        document: Some(format!("Content of chunk {} in {}", n, doc_id)),
        doc_id: doc_id.to_string(),
        chunk_type,
        page: i64::from(n),
        file_hash: Some(format!("hash-{}", doc_id)),
        image_uri: None,
        metadata,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn collection_initialization() {
    let (config, _temp_dir) = create_test_config();

    let result = ChunkCollection::open(&config).await;
    assert!(
        result.is_ok(),
        "Failed to open collection: {:?}",
        result.err()
    );

    let collection = result.expect("should open collection");
    assert_eq!(collection.name(), "test_chunks");
    assert_eq!(collection.vector_dimension(), 5);
    assert_eq!(collection.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn reopening_keeps_rows_and_dimension() {
    let (mut config, _temp_dir) = create_test_config();

    {
        let collection = ChunkCollection::open(&config)
            .await
            .expect("should open collection");
        collection
            .upsert(&[create_test_record(1, "doc_a", ChunkType::Text)])
            .await
            .expect("should store record");
    }

    config.ollama.embedding_dimension = 768;
    let reopened = ChunkCollection::open(&config)
        .await
        .expect("should reopen collection");

    assert_eq!(reopened.vector_dimension(), 5);
    assert_eq!(reopened.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn upsert_replaces_rows_with_same_id() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    collection
        .upsert(&[
            create_test_record(1, "doc_a", ChunkType::Text),
            create_test_record(2, "doc_a", ChunkType::Table),
        ])
        .await
        .expect("should store records");

    let mut replacement = create_test_record(1, "doc_a", ChunkType::Text);
    replacement.document = Some("Replaced content".to_string());
    collection
        .upsert(&[replacement])
        .await
        .expect("should replace record");

    assert_eq!(collection.count().await.expect("should count"), 2);
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_are_rejected() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    let first = create_test_record(1, "doc_a", ChunkType::Text);
    let mut second = create_test_record(2, "doc_a", ChunkType::Text);
    second.id = first.id.clone();

    let result = collection.upsert(&[first, second]).await;
    assert!(matches!(result, Err(GatewayError::DuplicateId(id)) if id == "doc_a_chunk_1"));
    assert_eq!(collection.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn rejected_batch_keeps_existing_rows() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    collection
        .upsert(&[create_test_record(1, "doc_a", ChunkType::Text)])
        .await
        .expect("should store record");

    let mut replacement = create_test_record(1, "doc_a", ChunkType::Text);
    replacement.vector = vec![0.1, 0.2];
    assert!(collection.upsert(&[replacement]).await.is_err());

    assert!(
        collection
            .exists("id = 'doc_a_chunk_1'")
            .await
            .expect("lookup should succeed")
    );
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    let mut record = create_test_record(1, "doc_a", ChunkType::Text);
    record.vector = vec![0.1, 0.2];

    let result = collection.upsert(&[record]).await;
    assert!(matches!(result, Err(GatewayError::Database(_))));

    let result = collection.search(&[0.1, 0.2], 5, None).await;
    assert!(matches!(result, Err(GatewayError::Database(_))));
}

#[tokio::test]
async fn search_returns_documents_and_metadata() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    let mut image = create_test_record(3, "doc_b", ChunkType::Image);
    image.document = None;
    image.image_uri = Some("figures/fig-3.png".to_string());

    collection
        .upsert(&[
            create_test_record(1, "doc_a", ChunkType::Text),
            create_test_record(2, "doc_a", ChunkType::Table),
            image,
        ])
        .await
        .expect("should store records");

    let hits = collection
        .search(&[0.1, 0.2, 0.3, 0.4, 0.5], 10, None)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert!(hit.metadata.contains_key("doc_id"));
        assert!(hit.distance >= 0.0);
    }

    let image_hit = hits
        .iter()
        .find(|h| h.id == "doc_b_chunk_3")
        .expect("image row should be returned");
    assert_eq!(image_hit.document, None);
    assert_eq!(image_hit.metadata["type"].as_str(), Some("image"));
}

#[tokio::test]
async fn search_with_filter() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    collection
        .upsert(&[
            create_test_record(1, "doc_a", ChunkType::Text),
            create_test_record(2, "doc_a", ChunkType::Table),
            create_test_record(3, "doc_b", ChunkType::Text),
        ])
        .await
        .expect("should store records");

    let hits = collection
        .search(
            &[0.1, 0.2, 0.3, 0.4, 0.5],
            10,
            Some("doc_id = 'doc_a' AND chunk_type IN ('table')"),
        )
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "doc_a_chunk_2");
}

#[tokio::test]
async fn exists_and_ids_matching() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    collection
        .upsert(&[
            create_test_record(1, "doc_a", ChunkType::Text),
            create_test_record(2, "doc_a", ChunkType::Text),
            create_test_record(3, "doc_b", ChunkType::Text),
        ])
        .await
        .expect("should store records");

    assert!(
        collection
            .exists("file_hash = 'hash-doc_a'")
            .await
            .expect("lookup should succeed")
    );
    assert!(
        !collection
            .exists("file_hash = 'hash-missing'")
            .await
            .expect("lookup should succeed")
    );

    let mut ids = collection
        .ids_matching("doc_id = 'doc_a'")
        .await
        .expect("lookup should succeed");
    ids.sort();
    assert_eq!(ids, vec!["doc_a_chunk_1", "doc_a_chunk_2"]);

    let none = collection
        .ids_matching("doc_id = 'doc_c'")
        .await
        .expect("lookup should succeed");
    assert!(none.is_empty());
}

#[tokio::test]
async fn delete_single_id() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    collection
        .upsert(&[
            create_test_record(1, "doc_a", ChunkType::Text),
            create_test_record(2, "doc_a", ChunkType::Text),
        ])
        .await
        .expect("should store records");

    collection
        .delete_id("doc_a_chunk_1")
        .await
        .expect("delete should succeed");

    assert_eq!(collection.count().await.expect("should count"), 1);
    let remaining = collection
        .ids_matching("doc_id = 'doc_a'")
        .await
        .expect("lookup should succeed");
    assert_eq!(remaining, vec!["doc_a_chunk_2"]);
}

#[tokio::test]
async fn empty_batch_handling() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    let result = collection.upsert(&[]).await;
    assert!(result.is_ok(), "Should handle empty batch gracefully");
    assert_eq!(collection.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn drop_collection_removes_rows() {
    let (config, _temp_dir) = create_test_config();
    let collection = ChunkCollection::open(&config)
        .await
        .expect("should open collection");

    collection
        .upsert(&[create_test_record(1, "doc_a", ChunkType::Text)])
        .await
        .expect("should store record");

    collection
        .drop_collection()
        .await
        .expect("drop should succeed");

    let recreated = ChunkCollection::open(&config)
        .await
        .expect("should recreate collection");
    assert_eq!(recreated.count().await.expect("should count"), 0);
}
