use super::*;

#[test]
fn id_is_stable_for_same_link() {
    let first = Document::new("A", "https://news.example.com/a", "first version");
    let second = Document::new("A (updated)", "https://news.example.com/a", "second version");

    assert_eq!(first.id, second.id);
    assert_eq!(first.id, document_id("https://news.example.com/a", ""));
}

#[test]
fn id_differs_between_links() {
    let a = Document::new("A", "u1", "Cats are mammals.");
    let b = Document::new("B", "u2", "Cats are mammals.");
    assert_ne!(a.id, b.id);
}

#[test]
fn id_ignores_surrounding_whitespace_in_link() {
    assert_eq!(
        document_id("  https://news.example.com/a\n", "x"),
        document_id("https://news.example.com/a", "y")
    );
}

#[test]
fn content_hash_used_without_link() {
    let a = Document::new("A", "", "Stocks fell today.");
    let b = Document::new("B", "  ", "Stocks fell today.");
    let c = Document::new("C", "", "Stocks rose today.");

    assert_eq!(a.id, b.id);
    assert_ne!(a.id, c.id);
    assert_ne!(a.id, document_id("Stocks fell today.", ""));
}

#[test]
fn embedded_document_serializes_flat() {
    let embedded = Document::new("A", "u1", "Cats are mammals.").with_embedding(vec![0.5, 0.5]);
    let json = serde_json::to_value(&embedded).expect("should serialize");

    assert_eq!(json["title"], "A");
    assert_eq!(json["link"], "u1");
    assert_eq!(json["content"], "Cats are mammals.");
    assert_eq!(json["embedding"].as_array().map(Vec::len), Some(2));
    assert_eq!(embedded.dimension(), 2);
    assert_eq!(embedded.id(), embedded.document.id);
}
