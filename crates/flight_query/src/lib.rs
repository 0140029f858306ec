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

//! Runs a single query against an Arrow Flight endpoint and collects the
//! streamed record batches into a [`ResultTable`].
//!
//! The query is sent as a command descriptor to `GetFlightInfo`, and the
//! ticket of the first returned endpoint is redeemed with `DoGet`. Every
//! call carries the headers provided by a [`HeaderSource`].

pub mod executor;
pub mod headers;
pub mod table;
pub mod transport;

pub use executor::{Error, QueryExecutor, Result};
pub use headers::{CallOptions, HeaderSource, StaticHeaders};
pub use table::ResultTable;
pub use transport::{FlightTransport, GrpcTransport, RecordBatchStream};

pub use arrow;
pub use arrow_flight;

// Set a sensible default for the maximum message size for encoding and decoding. This is 100MB.
pub const MAX_ENCODING_MESSAGE_SIZE: usize = 100 * 1024 * 1024;
pub const MAX_DECODING_MESSAGE_SIZE: usize = 100 * 1024 * 1024;
