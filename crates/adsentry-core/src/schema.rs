/// Arrow schema definitions for the case vector index.
pub mod vectors {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    /// Name of the vector table holding embedded historical cases.
    pub const TABLE: &str = "case_vectors";

    /// Column holding the embedding vector.
    pub const EMBEDDING: &str = "embedding";

    /// Column holding the storage columns of every tag set on the case.
    pub const TAGS: &str = "tags";

    /// Schema for embedded historical cases.
    ///
    /// `tags` stores flag column names (`tag_slimming`), not display names, so
    /// index filters only ever contain registry-issued identifiers.
    pub fn case_vector_schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new("case_id", DataType::Utf8, false),
            Field::new("product_name", DataType::Utf8, false),
            Field::new("explanation", DataType::Utf8, false),
            Field::new("law", DataType::Utf8, true),
            Field::new("date", DataType::Utf8, true),
            Field::new("link", DataType::Utf8, true),
            Field::new("industry", DataType::Utf8, false),
            Field::new(
                TAGS,
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                false,
            ),
            Field::new(
                EMBEDDING,
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
                false,
            ),
            Field::new("embedding_model", DataType::Utf8, false),
        ])
    }
}
