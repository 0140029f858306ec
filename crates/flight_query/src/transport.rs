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

use arrow::array::RecordBatch;
use arrow_flight::{
    decode::FlightRecordBatchStream, error::FlightError,
    flight_service_client::FlightServiceClient, FlightDescriptor, FlightInfo, Ticket,
};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use tonic::{transport::Channel, Request};

use crate::{headers::CallOptions, MAX_DECODING_MESSAGE_SIZE, MAX_ENCODING_MESSAGE_SIZE};

pub type RecordBatchStream = BoxStream<'static, Result<RecordBatch, FlightError>>;

/// The two Flight calls needed to run a query: resolving a descriptor into a ticket, and
/// redeeming a ticket for a stream of record batches.
#[async_trait]
pub trait FlightTransport: Send + Sync {
    async fn get_flight_info(
        &self,
        descriptor: FlightDescriptor,
        options: &CallOptions,
    ) -> Result<FlightInfo, FlightError>;

    async fn do_get(
        &self,
        ticket: Ticket,
        options: &CallOptions,
    ) -> Result<RecordBatchStream, FlightError>;
}

/// A [`FlightTransport`] over a gRPC channel.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    client: FlightServiceClient<Channel>,
}

impl GrpcTransport {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        let client = FlightServiceClient::new(channel)
            .max_encoding_message_size(MAX_ENCODING_MESSAGE_SIZE)
            .max_decoding_message_size(MAX_DECODING_MESSAGE_SIZE);
        Self { client }
    }

    #[must_use]
    pub fn with_max_encoding_message_size(mut self, limit: usize) -> Self {
        self.client = self.client.max_encoding_message_size(limit);
        self
    }

    #[must_use]
    pub fn with_max_decoding_message_size(mut self, limit: usize) -> Self {
        self.client = self.client.max_decoding_message_size(limit);
        self
    }
}

fn request_with_options<T>(message: T, options: &CallOptions) -> Request<T> {
    let mut request = Request::new(message);
    *request.metadata_mut() = options.metadata().clone();
    request
}

#[async_trait]
impl FlightTransport for GrpcTransport {
    async fn get_flight_info(
        &self,
        descriptor: FlightDescriptor,
        options: &CallOptions,
    ) -> Result<FlightInfo, FlightError> {
        let response = self
            .client
            .clone()
            .get_flight_info(request_with_options(descriptor, options))
            .await?;

        Ok(response.into_inner())
    }

    async fn do_get(
        &self,
        ticket: Ticket,
        options: &CallOptions,
    ) -> Result<RecordBatchStream, FlightError> {
        let flight_data = self
            .client
            .clone()
            .do_get(request_with_options(ticket, options))
            .await?
            .into_inner()
            .map_err(FlightError::from);

        Ok(FlightRecordBatchStream::new_from_flight_data(flight_data).boxed())
    }
}
