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

use std::sync::{Arc, Mutex};

use arrow::array::{Int32Array, RecordBatch, StringArray};
use arrow_flight::{
    encode::FlightDataEncoderBuilder,
    error::FlightError,
    flight_service_server::{FlightService, FlightServiceServer},
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint,
    FlightInfo, HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
};
use arrow_schema::{DataType, Field, Schema};
use bytes::Bytes;
use flight_query::{Error, GrpcTransport, QueryExecutor, StaticHeaders};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{
    metadata::MetadataMap,
    transport::{Channel, Server},
    Request, Response, Status, Streaming,
};

use crate::init_tracing;

#[derive(Debug, Clone)]
struct ReceivedCall {
    method: &'static str,
    payload: Bytes,
    metadata: MetadataMap,
}

#[derive(Debug, Clone, Default)]
struct TestFlightService {
    calls: Arc<Mutex<Vec<ReceivedCall>>>,
}

impl TestFlightService {
    fn record(&self, method: &'static str, payload: Bytes, metadata: &MetadataMap) {
        self.calls.lock().expect("lock").push(ReceivedCall {
            method,
            payload,
            metadata: metadata.clone(),
        });
    }

    fn calls(&self) -> Vec<ReceivedCall> {
        self.calls.lock().expect("lock").clone()
    }
}

fn test_record_batch(ids: Vec<i32>, names: Vec<&str>) -> Result<RecordBatch, FlightError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        Field::new("name", DataType::Utf8, false),
    ]));

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(ids)),
            Arc::new(StringArray::from(names)),
        ],
    )?)
}

#[tonic::async_trait]
impl FlightService for TestFlightService {
    type HandshakeStream = BoxStream<'static, Result<HandshakeResponse, Status>>;
    type ListFlightsStream = BoxStream<'static, Result<FlightInfo, Status>>;
    type DoGetStream = BoxStream<'static, Result<FlightData, Status>>;
    type DoPutStream = BoxStream<'static, Result<PutResult, Status>>;
    type DoActionStream = BoxStream<'static, Result<arrow_flight::Result, Status>>;
    type ListActionsStream = BoxStream<'static, Result<ActionType, Status>>;
    type DoExchangeStream = BoxStream<'static, Result<FlightData, Status>>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        Err(Status::unimplemented("handshake"))
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        Err(Status::unimplemented("list_flights"))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.record("GetFlightInfo", request.get_ref().cmd.clone(), request.metadata());

        let endpoints: &[&'static str] = match request.get_ref().cmd.as_ref() {
            b"SELECT * FROM missing" => {
                return Err(Status::invalid_argument("Table 'missing' not found"))
            }
            b"SELECT * FROM broken" => &["broken"],
            _ => &["partition-0", "partition-1"],
        };

        let flight_info = endpoints.iter().fold(FlightInfo::new(), |info, ticket| {
            info.with_endpoint(FlightEndpoint::new().with_ticket(Ticket::new(*ticket)))
        });

        Ok(Response::new(flight_info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("get_schema"))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        self.record("DoGet", request.get_ref().ticket.clone(), request.metadata());

        let batches = match request.get_ref().ticket.as_ref() {
            b"partition-0" => vec![
                test_record_batch(vec![3, 1], vec!["c", "a"]),
                test_record_batch(vec![2, 5, 4], vec!["b", "e", "d"]),
            ],
            b"broken" => vec![
                test_record_batch(vec![1], vec!["a"]),
                Err(FlightError::ProtocolError("stream interrupted".to_string())),
            ],
            _ => return Err(Status::not_found("Unknown ticket")),
        };

        let stream = FlightDataEncoderBuilder::new()
            .build(futures::stream::iter(batches))
            .map_err(Status::from);

        Ok(Response::new(stream.boxed()))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("do_put"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented("do_action"))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Err(Status::unimplemented("list_actions"))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange"))
    }
}

async fn start_flight_server(service: TestFlightService) -> Result<Channel, anyhow::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tracing::debug!("Test Flight server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = Server::builder()
            .add_service(FlightServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
        {
            tracing::error!("Test Flight server failed: {e}");
        }
    });

    let channel = Channel::from_shared(format!("http://{addr}"))?
        .connect()
        .await?;
    Ok(channel)
}

fn connection() -> StaticHeaders {
    StaticHeaders::new()
        .with_bearer_token("secret-token")
        .with_header("x-routing-tag", "a")
        .with_header("x-routing-tag", "b")
}

fn header_values(metadata: &MetadataMap, key: &str) -> Vec<String> {
    metadata
        .get_all(key)
        .iter()
        .filter_map(|value| value.to_str().ok().map(ToString::to_string))
        .collect()
}

#[tokio::test]
async fn test_query_over_grpc() -> Result<(), anyhow::Error> {
    let _tracing = init_tracing(None);

    let service = TestFlightService::default();
    let channel = start_flight_server(service.clone()).await?;
    let client = Arc::new(GrpcTransport::new(channel));

    let executor = QueryExecutor::new("SELECT id, name FROM users", client, &connection());
    let table = executor.execute().await?;

    assert_eq!(table.num_rows(), 5);
    assert_eq!(table.num_batches(), 2);
    insta::assert_snapshot!(table.to_string(), @r"
    +----+------+
    | id | name |
    +----+------+
    | 3  | c    |
    | 1  | a    |
    | 2  | b    |
    | 5  | e    |
    | 4  | d    |
    +----+------+
    ");

    let calls = service.calls();
    let methods: Vec<&str> = calls.iter().map(|call| call.method).collect();
    assert_eq!(methods, vec!["GetFlightInfo", "DoGet"]);
    assert_eq!(
        calls[0].payload,
        Bytes::from_static(b"SELECT id, name FROM users")
    );
    // Only the first of the two advertised endpoints is read.
    assert_eq!(calls[1].payload, Bytes::from_static(b"partition-0"));

    for call in &calls {
        assert_eq!(
            header_values(&call.metadata, "authorization"),
            vec!["Bearer secret-token"],
            "{} is missing the authorization header",
            call.method
        );
        assert_eq!(
            header_values(&call.metadata, "x-routing-tag"),
            vec!["a", "b"],
            "{} is missing the routing headers",
            call.method
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_flight_info_error_is_returned_unchanged() -> Result<(), anyhow::Error> {
    let _tracing = init_tracing(None);

    let service = TestFlightService::default();
    let channel = start_flight_server(service.clone()).await?;
    let client = Arc::new(GrpcTransport::new(channel));

    let executor = QueryExecutor::new("SELECT * FROM missing", client, &connection());
    let err = executor.execute().await.expect_err("query should fail");

    let Error::UnableToGetFlightInfo { source } = err else {
        panic!("expected the GetFlightInfo failure to be returned");
    };
    assert!(
        matches!(source, FlightError::Tonic(ref status) if status.code() == tonic::Code::InvalidArgument && status.message() == "Table 'missing' not found"),
        "unexpected source: {source}"
    );
    assert_eq!(service.calls().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stream_error_discards_partial_results() -> Result<(), anyhow::Error> {
    let _tracing = init_tracing(None);

    let service = TestFlightService::default();
    let channel = start_flight_server(service.clone()).await?;
    let client = Arc::new(GrpcTransport::new(channel));

    let executor = QueryExecutor::new("SELECT * FROM broken", client, &connection());
    let err = executor.execute().await.expect_err("query should fail");

    assert!(
        matches!(err, Error::UnableToReadBatch { .. }),
        "unexpected error: {err}"
    );

    let methods: Vec<&str> = service.calls().iter().map(|call| call.method).collect();
    assert_eq!(methods, vec!["GetFlightInfo", "DoGet"]);

    Ok(())
}
