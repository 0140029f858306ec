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

use clap::Parser;
use flight_query::{GrpcTransport, QueryExecutor, StaticHeaders};
use tonic::transport::{Channel, ClientTlsConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a query against an Arrow Flight endpoint", long_about = None)]
struct Args {
    /// The query to run
    query: String,

    /// The Flight endpoint to connect to
    #[arg(
        long,
        env = "FLIGHTQUERY_ENDPOINT",
        default_value = "http://localhost:50051"
    )]
    endpoint: String,

    /// A header to send with every call, as `key=value`. Can be repeated.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Sent as a bearer token in the `authorization` header
    #[arg(long, env = "FLIGHTQUERY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log filter directives, e.g. `flight_query=debug`
    #[arg(long, env = "FLIGHTQUERY_LOG")]
    log: Option<String>,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let Some((key, value)) = s.split_once('=') else {
        return Err(format!("Invalid header '{s}', expected `key=value`"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid header '{s}', the key is empty"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn init_tracing(trace_config: Option<&str>) {
    let filter = match trace_config {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new("flightquery=INFO,flight_query=INFO,WARN"),
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn connect(endpoint: &str) -> anyhow::Result<Channel> {
    let mut channel_endpoint = Channel::from_shared(endpoint.to_string())?;
    if endpoint.starts_with("https://") {
        channel_endpoint =
            channel_endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
    }
    Ok(channel_endpoint.connect().await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    tracing::debug!("Connecting to {}", args.endpoint);
    let channel = connect(&args.endpoint).await?;
    let client = Arc::new(GrpcTransport::new(channel));

    let mut connection: StaticHeaders = args.headers.into_iter().collect();
    if let Some(token) = args.token {
        connection = connection.with_bearer_token(token);
    }

    let table = QueryExecutor::new(args.query, client, &connection)
        .execute()
        .await?;

    println!("{table}");
    tracing::info!(
        "{} rows in {} batches",
        table.num_rows(),
        table.num_batches()
    );

    Ok(())
}
