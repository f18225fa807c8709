/// Arrow schema definitions for vector-index storage.
pub mod index {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    pub const ID: &str = "id";
    pub const VECTOR: &str = "vector";
    pub const TENANT_ID: &str = "tenant_id";
    pub const SCOPE: &str = "scope";
    pub const FRAMEWORK: &str = "framework";

    /// Schema for one index entry per vectorized requirement.
    ///
    /// The restrict namespaces are flattened to one column each, since every
    /// entry carries exactly one token per namespace.
    pub fn index_entry_schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new(ID, DataType::Utf8, false),
            Field::new(
                VECTOR,
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
                false,
            ),
            Field::new(TENANT_ID, DataType::Utf8, false),
            Field::new(SCOPE, DataType::Utf8, false),
            Field::new(FRAMEWORK, DataType::Utf8, false),
        ])
    }
}
