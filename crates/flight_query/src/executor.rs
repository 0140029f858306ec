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

use std::sync::Arc;

use arrow_flight::{error::FlightError, FlightDescriptor, FlightInfo, Ticket};
use bytes::Bytes;
use futures::StreamExt;
use snafu::prelude::*;
use tracing::Instrument;

use crate::{
    headers::{self, CallOptions, HeaderSource},
    table::ResultTable,
    transport::FlightTransport,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to build the call options for the query.\n{source}"))]
    InvalidCallOptions { source: headers::Error },

    #[snafu(display("Failed to get the flight info for the query.\n{source}"))]
    UnableToGetFlightInfo { source: FlightError },

    #[snafu(display("The flight info for the query did not contain any endpoints."))]
    NoEndpoints,

    #[snafu(display("The first endpoint of the flight info did not contain a ticket."))]
    MissingTicket,

    #[snafu(display("Failed to start streaming the query results.\n{source}"))]
    UnableToStartStream { source: FlightError },

    #[snafu(display("Failed to read a record batch from the query results.\n{source}"))]
    UnableToReadBatch { source: FlightError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Runs a single query against a Flight endpoint and materializes the result.
///
/// Each call to [`QueryExecutor::execute`] resolves the query into a ticket with
/// `GetFlightInfo`, then drains the `DoGet` stream for the ticket of the first endpoint.
/// Batches are read one at a time and kept in arrival order.
pub struct QueryExecutor<T: FlightTransport + ?Sized> {
    query: Arc<str>,
    client: Arc<T>,
    headers: Vec<(String, String)>,
    span: tracing::Span,
}

impl<T: FlightTransport + ?Sized> QueryExecutor<T> {
    pub fn new<H: HeaderSource + ?Sized>(
        query: impl Into<Arc<str>>,
        client: Arc<T>,
        connection: &H,
    ) -> Self {
        let query: Arc<str> = query.into();
        let span = tracing::info_span!("flight_query", query = %query);
        Self {
            query,
            client,
            headers: connection.headers(),
            span,
        }
    }

    /// Replaces the span that all log events of this executor are recorded in.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Runs the query and collects every record batch of the result.
    ///
    /// Any failure is logged once and returned unchanged; no partial result is returned.
    ///
    /// # Errors
    ///
    /// - If the call options cannot be built from the headers
    /// - If `GetFlightInfo` fails or its response has no usable ticket
    /// - If `DoGet` fails to start or the stream fails before it is exhausted
    pub async fn execute(&self) -> Result<ResultTable> {
        let result = self.try_execute().instrument(self.span.clone()).await;

        if let Err(e) = &result {
            self.span.in_scope(|| {
                tracing::error!(
                    "There was an error trying to get the data from the flight endpoint: {e}"
                );
            });
        }

        result
    }

    async fn try_execute(&self) -> Result<ResultTable> {
        let options =
            CallOptions::try_new(self.headers.clone()).context(InvalidCallOptionsSnafu)?;

        let descriptor = FlightDescriptor::new_cmd(Bytes::copy_from_slice(self.query.as_bytes()));
        let flight_info = self
            .client
            .get_flight_info(descriptor, &options)
            .await
            .context(UnableToGetFlightInfoSnafu)?;
        tracing::info!("GetFlightInfo was successful");

        let ticket = first_ticket(flight_info)?;
        tracing::debug!("Ticket: {:?}", ticket.ticket);

        let mut stream = self
            .client
            .do_get(ticket, &options)
            .await
            .context(UnableToStartStreamSnafu)?;

        let mut table = ResultTable::new();
        while let Some(batch) = stream.next().await {
            table.push(batch.context(UnableToReadBatchSnafu)?);
        }

        tracing::debug!(
            rows = table.num_rows(),
            batches = table.num_batches(),
            "Received query results"
        );

        Ok(table)
    }
}

/// Only the first endpoint is redeemed; results partitioned across endpoints are not merged.
fn first_ticket(flight_info: FlightInfo) -> Result<Ticket> {
    let endpoint_count = flight_info.endpoint.len();
    let Some(endpoint) = flight_info.endpoint.into_iter().next() else {
        return NoEndpointsSnafu.fail();
    };

    if endpoint_count > 1 {
        tracing::warn!(
            "The flight info returned {endpoint_count} endpoints, only the first one will be read"
        );
    }

    endpoint.ticket.context(MissingTicketSnafu)
}
