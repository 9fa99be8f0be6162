//! LanceDB vector index over embedded historical cases.
//!
//! One table, `case_vectors`, holds a row per tagged case with its document
//! embedding. Searches are cosine-distance nearest neighbour, pre-filtered by
//! tag column and industry.

use std::path::Path;
use std::sync::Arc;

use adsentry_core::schema::vectors;
use adsentry_core::{Industry, RetrievedCase};
use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, ListBuilder, RecordBatchIterator,
    StringArray, StringBuilder,
};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::{debug, info};

use crate::{CaseVector, StoreError, VectorFilter, VectorIndex};

/// Column LanceDB adds to vector search results.
const DISTANCE: &str = "_distance";

/// LanceDB store for the case vector index.
pub struct LanceStore {
    db: lancedb::Connection,
    dim: usize,
}

impl LanceStore {
    /// Connect to a LanceDB database at the given path and make sure the
    /// `case_vectors` table exists with embeddings of `dim` dimensions.
    ///
    /// Creates the database directory if it doesn't exist.
    pub async fn open(path: &Path, dim: usize) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
        let db = lancedb::connect(uri).execute().await?;
        let store = Self { db, dim };
        store.ensure_table().await?;
        Ok(store)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        let existing = self.db.table_names().execute().await?;
        if existing.iter().any(|n| n == vectors::TABLE) {
            let schema = self.table().await?.schema().await?;
            let field = schema.field_with_name(vectors::EMBEDDING)?;
            if let arrow::datatypes::DataType::FixedSizeList(_, width) = field.data_type()
                && *width as usize != self.dim
            {
                return Err(StoreError::DimensionMismatch {
                    expected: *width as usize,
                    actual: self.dim,
                });
            }
            return Ok(());
        }

        let schema = Arc::new(vectors::case_vector_schema(self.dim as i32));
        self.db
            .create_empty_table(vectors::TABLE, schema)
            .execute()
            .await?;
        info!(table = vectors::TABLE, dim = self.dim, "created LanceDB table");
        Ok(())
    }

    async fn table(&self) -> Result<lancedb::Table, StoreError> {
        let table = self.db.open_table(vectors::TABLE).execute().await?;
        Ok(table)
    }

    /// List table names in the database.
    pub async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let names = self.db.table_names().execute().await?;
        Ok(names)
    }

    fn to_batch(&self, records: &[CaseVector]) -> Result<RecordBatch, StoreError> {
        let mut case_ids = Vec::with_capacity(records.len());
        let mut product_names = Vec::with_capacity(records.len());
        let mut explanations = Vec::with_capacity(records.len());
        let mut laws = Vec::with_capacity(records.len());
        let mut dates = Vec::with_capacity(records.len());
        let mut links = Vec::with_capacity(records.len());
        let mut industries = Vec::with_capacity(records.len());
        let mut models = Vec::with_capacity(records.len());
        let mut tags = ListBuilder::new(StringBuilder::new());
        let mut values = Vec::with_capacity(records.len() * self.dim);

        for r in records {
            if r.embedding.len() != self.dim {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dim,
                    actual: r.embedding.len(),
                });
            }
            case_ids.push(r.case.id.to_string());
            product_names.push(r.case.product_name.as_str());
            explanations.push(r.case.explanation.as_str());
            laws.push(Some(r.case.law.as_str()));
            dates.push(Some(r.case.date.as_str()));
            links.push(Some(r.case.link.as_str()));
            industries.push(r.case.industry.as_str());
            models.push(r.model.as_str());
            for tag in &r.case.tags {
                tags.values().append_value(tag.column());
            }
            tags.append(true);
            values.extend_from_slice(&r.embedding);
        }

        let embeddings =
            FixedSizeListArray::try_new_from_values(Float32Array::from(values), self.dim as i32)?;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(case_ids)),
            Arc::new(StringArray::from(product_names)),
            Arc::new(StringArray::from(explanations)),
            Arc::new(StringArray::from(laws)),
            Arc::new(StringArray::from(dates)),
            Arc::new(StringArray::from(links)),
            Arc::new(StringArray::from(industries)),
            Arc::new(tags.finish()),
            Arc::new(embeddings),
            Arc::new(StringArray::from(models)),
        ];
        let schema = Arc::new(vectors::case_vector_schema(self.dim as i32));
        Ok(RecordBatch::try_new(schema, columns)?)
    }
}

#[async_trait]
impl VectorIndex for LanceStore {
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<RetrievedCase>, StoreError> {
        if embedding.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let table = self.table().await?;
        let mut query = table
            .vector_search(embedding)?
            .column(vectors::EMBEDDING)
            .distance_type(DistanceType::Cosine)
            .limit(top_k);
        if let Some(predicate) = filter.to_sql() {
            query = query.only_if(predicate);
        }
        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

        let mut cases = Vec::new();
        for batch in &batches {
            cases.extend(retrieved_cases(batch)?);
        }
        cases.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        cases.truncate(top_k);
        debug!(count = cases.len(), top_k, "vector search");
        Ok(cases)
    }

    async fn upsert(&self, records: &[CaseVector]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let batch = self.to_batch(records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let table = self.table().await?;
        let mut merge = table.merge_insert(&["case_id"]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge.execute(Box::new(reader)).await?;

        info!(rows = records.len(), "upserted case vectors");
        Ok(records.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let table = self.table().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }
}

// ── Arrow extraction ──

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Other(format!("missing or non-string column {name}")))
}

fn value_or_empty(col: &StringArray, row: usize) -> String {
    if col.is_null(row) {
        String::new()
    } else {
        col.value(row).to_string()
    }
}

/// Cosine distance to a similarity score in `[0, 1]`.
fn similarity(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

fn retrieved_cases(batch: &RecordBatch) -> Result<Vec<RetrievedCase>, StoreError> {
    let case_id = string_column(batch, "case_id")?;
    let product_name = string_column(batch, "product_name")?;
    let explanation = string_column(batch, "explanation")?;
    let law = string_column(batch, "law")?;
    let date = string_column(batch, "date")?;
    let link = string_column(batch, "link")?;
    let industry = string_column(batch, "industry")?;
    let distance = batch
        .column_by_name(DISTANCE)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| StoreError::Other("vector search returned no distances".into()))?;

    Ok((0..batch.num_rows())
        .map(|i| RetrievedCase {
            case_id: value_or_empty(case_id, i),
            product_name: value_or_empty(product_name, i),
            explanation: value_or_empty(explanation, i),
            law: value_or_empty(law, i),
            date: value_or_empty(date, i),
            link: value_or_empty(link, i),
            industry: Industry::parse_lenient(&value_or_empty(industry, i)),
            similarity_score: similarity(distance.value(i)),
        })
        .collect())
}
