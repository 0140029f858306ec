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

use snafu::prelude::*;
use tonic::metadata::{
    errors::{InvalidMetadataKey, InvalidMetadataValue},
    Ascii, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Header name '{key}' is not a valid gRPC metadata key.\n{source}"))]
    InvalidHeaderKey {
        key: String,
        source: InvalidMetadataKey,
    },

    #[snafu(display("The value of header '{key}' is not valid ASCII gRPC metadata.\n{source}"))]
    InvalidHeaderValue {
        key: String,
        source: InvalidMetadataValue,
    },

    #[snafu(display("Header '{key}' is binary metadata and cannot be sent as a string header."))]
    BinaryHeader { key: String },

    #[snafu(display("The value of header '{key}' is not visible ASCII."))]
    NonAsciiHeaderValue { key: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Provides the ordered key/value headers attached to every call made for a query.
///
/// This is typically a connection that has already authenticated and holds the
/// session headers (e.g. `authorization`) the server expects on each request.
pub trait HeaderSource {
    fn headers(&self) -> Vec<(String, String)>;
}

impl HeaderSource for [(String, String)] {
    fn headers(&self) -> Vec<(String, String)> {
        self.to_vec()
    }
}

impl HeaderSource for Vec<(String, String)> {
    fn headers(&self) -> Vec<(String, String)> {
        self.clone()
    }
}

/// A fixed, ordered set of headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticHeaders {
    headers: Vec<(String, String)>,
}

impl StaticHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.with_header("authorization", value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl HeaderSource for StaticHeaders {
    fn headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Copies every entry of a gRPC metadata map, in map order.
///
/// Fails rather than dropping an entry when it is binary (`-bin`) or its value is not
/// visible ASCII.
impl TryFrom<&MetadataMap> for StaticHeaders {
    type Error = Error;

    fn try_from(metadata: &MetadataMap) -> Result<Self> {
        let mut headers = Vec::with_capacity(metadata.len());
        for entry in metadata.iter() {
            match entry {
                KeyAndValueRef::Ascii(key, value) => {
                    let value = value.to_str().map_err(|_| Error::NonAsciiHeaderValue {
                        key: key.as_str().to_string(),
                    })?;
                    headers.push((key.as_str().to_string(), value.to_string()));
                }
                KeyAndValueRef::Binary(key, _) => {
                    return BinaryHeaderSnafu {
                        key: key.as_str(),
                    }
                    .fail();
                }
            }
        }

        Ok(Self { headers })
    }
}

/// Per-request metadata attached to both the `GetFlightInfo` and `DoGet` calls of a query.
#[derive(Debug, Clone)]
pub struct CallOptions {
    headers: Vec<(String, String)>,
    metadata: MetadataMap,
}

impl CallOptions {
    /// Builds the gRPC metadata for the given headers, keeping their order. Repeated keys are
    /// appended rather than replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if a header name or value cannot be sent as ASCII gRPC metadata.
    pub fn try_new(headers: Vec<(String, String)>) -> Result<Self> {
        let mut metadata = MetadataMap::with_capacity(headers.len());
        for (key, value) in &headers {
            let metadata_key = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .context(InvalidHeaderKeySnafu { key: key.clone() })?;
            let metadata_value = MetadataValue::<Ascii>::try_from(value.as_str())
                .context(InvalidHeaderValueSnafu { key: key.clone() })?;
            metadata.append(metadata_key, metadata_value);
        }

        Ok(Self { headers, metadata })
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }
}
