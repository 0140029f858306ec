/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::{fmt, sync::Arc};

use arrow::{
    array::RecordBatch,
    compute::concat_batches,
    datatypes::{Schema, SchemaRef},
    error::ArrowError,
    util::pretty::pretty_format_batches,
};
use snafu::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to concatenate the query results into a single record batch.\n{source}"))]
    UnableToConcatenateBatches { source: ArrowError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The materialized result of a query: every received record batch, in arrival order.
///
/// The schema is taken from the first batch. Later batches are assumed to share it.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    schema: Option<SchemaRef>,
    batches: Vec<RecordBatch>,
    num_rows: usize,
}

impl ResultTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: RecordBatch) {
        if self.schema.is_none() {
            self.schema = Some(batch.schema());
        }
        self.num_rows += batch.num_rows();
        self.batches.push(batch);
    }

    #[must_use]
    pub fn schema(&self) -> Option<SchemaRef> {
        self.schema.clone()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    #[must_use]
    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    /// Concatenates all batches into a single record batch.
    ///
    /// A table that never received a batch produces an empty batch with an empty schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the batches do not share the schema of the first batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let schema = self
            .schema
            .clone()
            .unwrap_or_else(|| Arc::new(Schema::empty()));
        concat_batches(&schema, &self.batches).context(UnableToConcatenateBatchesSnafu)
    }
}

impl Extend<RecordBatch> for ResultTable {
    fn extend<I: IntoIterator<Item = RecordBatch>>(&mut self, iter: I) {
        for batch in iter {
            self.push(batch);
        }
    }
}

impl FromIterator<RecordBatch> for ResultTable {
    fn from_iter<I: IntoIterator<Item = RecordBatch>>(iter: I) -> Self {
        let mut table = Self::new();
        table.extend(iter);
        table
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = pretty_format_batches(&self.batches).map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}
