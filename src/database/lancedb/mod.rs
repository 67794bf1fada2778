// LanceDB vector database module
// One LanceDB table per collection, schema registered in SQLite


pub mod vector_store;

pub use vector_store::LanceVectorIndex;

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

pub(crate) const ID_COLUMN: &str = "id";
pub(crate) const VECTOR_COLUMN: &str = "vector";
pub(crate) const TITLE_COLUMN: &str = "title";
pub(crate) const LINK_COLUMN: &str = "link";
pub(crate) const CONTENT_COLUMN: &str = "content";
pub(crate) const SEQUENCE_COLUMN: &str = "seq";
pub(crate) const INGESTED_AT_COLUMN: &str = "ingested_at";
pub(crate) const DISTANCE_COLUMN: &str = "_distance";

/// Arrow schema of a collection table with the given vector dimension
#[inline]
pub fn collection_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                i32::try_from(dimension).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new(TITLE_COLUMN, DataType::Utf8, false),
        Field::new(LINK_COLUMN, DataType::Utf8, false),
        Field::new(CONTENT_COLUMN, DataType::Utf8, false),
        Field::new(SEQUENCE_COLUMN, DataType::Int64, false),
        Field::new(INGESTED_AT_COLUMN, DataType::Utf8, false),
    ]))
}

/// Vector dimension declared by a collection table's schema
#[inline]
pub fn schema_dimension(schema: &Schema) -> Option<usize> {
    schema
        .field_with_name(VECTOR_COLUMN)
        .ok()
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
}
