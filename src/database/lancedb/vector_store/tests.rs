use super::*;
use tempfile::TempDir;

const COLLECTION: &str = "news_articles";

async fn create_test_index(timeout: Duration) -> (LanceVectorIndex, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Database::new(temp_dir.path().join("metadata.db"))
        .await
        .expect("should create database");
    let index = LanceVectorIndex::open(&temp_dir.path().join("vectors"), database, timeout)
        .await
        .expect("should open vector index");
    (index, temp_dir)
}

async fn create_collection(dimension: usize) -> (LanceVectorIndex, TempDir) {
    let (index, temp_dir) = create_test_index(Duration::from_secs(30)).await;
    index
        .ensure_collection(COLLECTION, dimension, DistanceMetric::Cosine)
        .await
        .expect("should create collection");
    (index, temp_dir)
}

fn article(n: usize, embedding: Vec<f32>) -> EmbeddedDocument {
    Document::new(
        format!("Article {n}"),
        format!("https://news.example.com/{n}"),
        format!("Body of article {n}"),
    )
    .with_embedding(embedding)
}

fn unit(dimension: usize, axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    vector[axis] = 1.0;
    vector
}

#[tokio::test]
async fn ensure_collection_is_idempotent() {
    let (index, _temp_dir) = create_collection(4).await;

    let again = index
        .ensure_collection(COLLECTION, 4, DistanceMetric::Cosine)
        .await
        .expect("second ensure should succeed");
    assert_eq!(again.dimension, 4);
    assert_eq!(again.metric, DistanceMetric::Cosine);

    assert_eq!(
        index.count(COLLECTION).await.expect("should count"),
        0,
        "ensure must not touch contents"
    );
}

#[tokio::test]
async fn ensure_collection_rejects_different_schema() {
    let (index, _temp_dir) = create_collection(4).await;

    let result = index
        .ensure_collection(COLLECTION, 8, DistanceMetric::Cosine)
        .await;
    match result {
        Err(RagError::SchemaConflict {
            existing_dimension,
            requested_dimension,
            ..
        }) => {
            assert_eq!(existing_dimension, 4);
            assert_eq!(requested_dimension, 8);
        }
        other => panic!("expected schema conflict, got {other:?}"),
    }

    let result = index
        .ensure_collection(COLLECTION, 4, DistanceMetric::Dot)
        .await;
    assert!(matches!(result, Err(RagError::SchemaConflict { .. })));
}

#[tokio::test]
async fn ensure_collection_rejects_invalid_name() {
    let (index, _temp_dir) = create_test_index(Duration::from_secs(30)).await;

    let result = index
        .ensure_collection("../escape", 4, DistanceMetric::Cosine)
        .await;
    assert!(matches!(result, Err(RagError::Config(_))));

    let result = index.ensure_collection(COLLECTION, 0, DistanceMetric::Cosine).await;
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[tokio::test]
async fn schema_survives_reopen() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let vectors = temp_dir.path().join("vectors");
    let db_path = temp_dir.path().join("metadata.db");

    {
        let database = Database::new(&db_path).await.expect("should create database");
        let index = LanceVectorIndex::open(&vectors, database, Duration::from_secs(30))
            .await
            .expect("should open index");
        index
            .ensure_collection(COLLECTION, 3, DistanceMetric::Cosine)
            .await
            .expect("should create collection");
        index
            .upsert(COLLECTION, vec![article(1, vec![1.0, 0.0, 0.0])])
            .await
            .expect("should upsert");
    }

    let database = Database::new(&db_path).await.expect("should reopen database");
    let index = LanceVectorIndex::open(&vectors, database, Duration::from_secs(30))
        .await
        .expect("should reopen index");

    let collection = index
        .collection(COLLECTION)
        .await
        .expect("lookup should succeed")
        .expect("collection should be registered");
    assert_eq!(collection.dimension, 3);
    assert_eq!(index.count(COLLECTION).await.expect("should count"), 1);
}

#[tokio::test]
async fn unknown_collection_is_reported() {
    let (index, _temp_dir) = create_test_index(Duration::from_secs(30)).await;

    assert!(
        index
            .collection("missing")
            .await
            .expect("lookup should succeed")
            .is_none()
    );

    let result = index.search("missing", &[1.0, 0.0], 3).await;
    assert!(matches!(result, Err(RagError::CollectionNotFound(_))));

    let result = index.upsert("missing", vec![article(1, vec![1.0, 0.0])]).await;
    assert!(matches!(result, Err(RagError::CollectionNotFound(_))));
}

#[tokio::test]
async fn upsert_with_wrong_dimension_writes_nothing() {
    let (index, _temp_dir) = create_collection(4).await;

    let batch = vec![
        article(1, unit(4, 0)),
        article(2, vec![1.0, 0.0, 0.0]),
        article(3, unit(4, 2)),
    ];
    let result = index.upsert(COLLECTION, batch).await;

    match result {
        Err(RagError::DimensionMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 4);
            assert_eq!(actual, 3);
        }
        other => panic!("expected dimension mismatch, got {other:?}"),
    }
    assert_eq!(index.count(COLLECTION).await.expect("should count"), 0);
}

#[tokio::test]
async fn upsert_empty_batch_is_noop() {
    let (index, _temp_dir) = create_collection(4).await;

    let written = index.upsert(COLLECTION, Vec::new()).await.expect("should upsert");
    assert_eq!(written, 0);
    assert_eq!(index.count(COLLECTION).await.expect("should count"), 0);
}

#[tokio::test]
async fn reupsert_replaces_by_id() {
    let (index, _temp_dir) = create_collection(3).await;

    let batch = vec![article(1, unit(3, 0)), article(2, unit(3, 1))];
    index
        .upsert(COLLECTION, batch.clone())
        .await
        .expect("first upsert should succeed");
    index
        .upsert(COLLECTION, batch)
        .await
        .expect("second upsert should succeed");

    assert_eq!(index.count(COLLECTION).await.expect("should count"), 2);

    let mut changed = article(1, unit(3, 2));
    changed.document.title = "Updated headline".to_string();
    index
        .upsert(COLLECTION, vec![changed])
        .await
        .expect("replacement should succeed");

    assert_eq!(index.count(COLLECTION).await.expect("should count"), 2);
    let results = index
        .search(COLLECTION, &unit(3, 2), 1)
        .await
        .expect("should search");
    assert_eq!(results[0].document.title, "Updated headline");
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_keep_last() {
    let (index, _temp_dir) = create_collection(3).await;

    let first = article(1, unit(3, 0));
    let mut second = article(1, unit(3, 1));
    second.document.content = "Second version".to_string();

    let written = index
        .upsert(COLLECTION, vec![first, second])
        .await
        .expect("should upsert");
    assert_eq!(written, 1);

    let stored = index.documents(COLLECTION).await.expect("should scan");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].document.content, "Second version");
    assert_eq!(stored[0].embedding, unit(3, 1));
}

#[tokio::test]
async fn search_finds_stored_vector_first() {
    let (index, _temp_dir) = create_collection(4).await;

    let target = vec![0.5, 0.5, 0.5, 0.5];
    index
        .upsert(
            COLLECTION,
            vec![
                article(1, unit(4, 0)),
                article(2, target.clone()),
                article(3, unit(4, 3)),
            ],
        )
        .await
        .expect("should upsert");

    let results = index
        .search(COLLECTION, &target, 1)
        .await
        .expect("should search");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.title, "Article 2");
    assert!(
        (results[0].score - 1.0).abs() < 1e-4,
        "score was {}",
        results[0].score
    );
}

#[tokio::test]
async fn search_orders_by_similarity_and_limits() {
    let (index, _temp_dir) = create_collection(2).await;

    // Angles from the query axis grow with n
    let docs = (0..5)
        .map(|n| {
            let angle = n as f32 * 0.3;
            article(n, vec![angle.cos(), angle.sin()])
        })
        .collect::<Vec<_>>();
    index.upsert(COLLECTION, docs).await.expect("should upsert");

    let results = index
        .search(COLLECTION, &[1.0, 0.0], 3)
        .await
        .expect("should search");

    let titles = results
        .iter()
        .map(|r| r.document.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Article 0", "Article 1", "Article 2"]);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let all = index
        .search(COLLECTION, &[1.0, 0.0], 50)
        .await
        .expect("should search");
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let (index, _temp_dir) = create_collection(2).await;

    for n in 0..4 {
        index
            .upsert(COLLECTION, vec![article(n, vec![0.0, 1.0])])
            .await
            .expect("should upsert");
    }

    let results = index
        .search(COLLECTION, &[0.0, 1.0], 4)
        .await
        .expect("should search");
    let titles = results
        .iter()
        .map(|r| r.document.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        titles,
        vec!["Article 0", "Article 1", "Article 2", "Article 3"]
    );
}

#[tokio::test]
async fn ties_beyond_candidate_window_keep_insertion_order() {
    let (index, _temp_dir) = create_collection(2).await;

    let docs = (0..20)
        .map(|n| article(n, vec![0.6, 0.8]))
        .collect::<Vec<_>>();
    index.upsert(COLLECTION, docs).await.expect("should upsert");

    let results = index
        .search(COLLECTION, &[0.6, 0.8], 1)
        .await
        .expect("should search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.title, "Article 0");

    let results = index
        .search(COLLECTION, &[0.6, 0.8], 3)
        .await
        .expect("should search");
    let titles = results
        .iter()
        .map(|r| r.document.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Article 0", "Article 1", "Article 2"]);
}

#[tokio::test]
async fn reupsert_keeps_original_insertion_order() {
    let (index, _temp_dir) = create_collection(2).await;

    for n in 0..3 {
        index
            .upsert(COLLECTION, vec![article(n, vec![1.0, 0.0])])
            .await
            .expect("should upsert");
    }
    index
        .upsert(
            COLLECTION,
            vec![article(1, vec![1.0, 0.0]), article(0, vec![1.0, 0.0])],
        )
        .await
        .expect("re-upsert should succeed");

    let results = index
        .search(COLLECTION, &[1.0, 0.0], 3)
        .await
        .expect("should search");
    let titles = results
        .iter()
        .map(|r| r.document.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Article 0", "Article 1", "Article 2"]);

    let stored = index.documents(COLLECTION).await.expect("should scan");
    assert_eq!(stored[0].document.title, "Article 0");
    assert_eq!(stored.len(), 3);
}

#[tokio::test]
async fn search_empty_collection_returns_nothing() {
    let (index, _temp_dir) = create_collection(4).await;

    let results = index
        .search(COLLECTION, &unit(4, 0), 3)
        .await
        .expect("should search");
    assert!(results.is_empty());
}

#[tokio::test]
async fn search_rejects_wrong_query_dimension() {
    let (index, _temp_dir) = create_collection(4).await;
    index
        .upsert(COLLECTION, vec![article(1, unit(4, 0))])
        .await
        .expect("should upsert");

    let result = index.search(COLLECTION, &[1.0, 0.0], 3).await;
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 4,
            actual: 2,
            ..
        })
    ));
}

#[tokio::test]
async fn documents_returns_insertion_order_with_vectors() {
    let (index, _temp_dir) = create_collection(3).await;

    index
        .upsert(COLLECTION, vec![article(1, unit(3, 0)), article(2, unit(3, 1))])
        .await
        .expect("should upsert");
    index
        .upsert(COLLECTION, vec![article(3, unit(3, 2))])
        .await
        .expect("should upsert");

    let stored = index.documents(COLLECTION).await.expect("should scan");
    let titles = stored
        .iter()
        .map(|d| d.document.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Article 1", "Article 2", "Article 3"]);
    assert_eq!(stored[2].embedding, unit(3, 2));
}

#[tokio::test]
async fn euclidean_collection_scores_closer_higher() {
    let (index, _temp_dir) = create_test_index(Duration::from_secs(30)).await;
    index
        .ensure_collection("euclid", 2, DistanceMetric::Euclidean)
        .await
        .expect("should create collection");

    index
        .upsert(
            "euclid",
            vec![article(1, vec![10.0, 10.0]), article(2, vec![1.0, 1.0])],
        )
        .await
        .expect("should upsert");

    let results = index
        .search("euclid", &[1.0, 1.0], 2)
        .await
        .expect("should search");
    assert_eq!(results[0].document.title, "Article 2");
    assert!(results[0].score > results[1].score);
    assert!(results[0].score <= 1.0);
}

#[tokio::test]
async fn sequence_numbers_are_monotonic() {
    let (index, _temp_dir) = create_test_index(Duration::from_secs(30)).await;

    let first = index.reserve_sequence(10);
    let second = index.reserve_sequence(1);
    assert!(second >= first + 10);
}

#[test]
fn dedup_keeps_last_occurrence_positions() {
    let a1 = article(1, vec![1.0]);
    let b = article(2, vec![2.0]);
    let a2 = article(1, vec![3.0]);

    let deduped = dedup_last_wins(vec![a1, b, a2]);
    assert_eq!(deduped.len(), 2);
    assert_eq!(deduped[0].document.title, "Article 2");
    assert_eq!(deduped[1].embedding, vec![3.0]);
}

#[test]
fn metric_maps_to_store_distance() {
    assert_eq!(DistanceType::from(DistanceMetric::Cosine), DistanceType::Cosine);
    assert_eq!(DistanceType::from(DistanceMetric::Dot), DistanceType::Dot);
    assert_eq!(DistanceType::from(DistanceMetric::Euclidean), DistanceType::L2);
}

#[test]
fn tie_check_only_widens_full_windows_ending_on_kth_score() {
    let row = |n: usize| StoredRow {
        document: article(n, vec![1.0]).document,
        sequence: n as i64,
        distance: None,
        vector: None,
    };
    let tied = vec![(row(0), 0.9), (row(1), 0.9), (row(2), 0.9)];
    assert!(ties_past_window(&tied, 1, 3));
    assert!(!ties_past_window(&tied, 1, 4), "store returned fewer rows than asked");

    let separated = vec![(row(0), 0.9), (row(1), 0.9), (row(2), 0.5)];
    assert!(!ties_past_window(&separated, 2, 3));
}
