use lambda_runtime::Error;
use lumigo_lambda_tracer::{run, wrap_handler, Handler, TracerConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Deserialize)]
struct Greeting {
    name: Option<String>,
}

#[derive(Debug, Error)]
#[error("name must not be empty")]
struct EmptyName;

fn greet(greeting: Greeting) -> Result<Value, EmptyName> {
    let name = greeting.name.unwrap_or_else(|| "world".to_string());
    if name.trim().is_empty() {
        return Err(EmptyName);
    }

    tracing::info!(name = %name, "greeting");
    Ok(json!({ "message": format!("Hello {name}!") }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let handler = wrap_handler(Some(Handler::from_payload(greet)), TracerConfig::from_env());
    if let Some(err) = handler.wrap_error() {
        tracing::warn!(error = %err, "handler wrapped with errors");
    }

    run(handler).await
}
