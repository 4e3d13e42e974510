use crate::app::processors::ProcessorRegistry;
use crate::core::auth::Authorizer;
use crate::core::processor::{AnalysisEngine, Invocation, Processor, API_VERSION};
use crate::domain::model::{FunctionResponse, Stage};
use crate::utils::error::{BoostError, Result, GENERIC_SERVICE_FAILURE};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const USER_ORGANIZATIONS: &str = "user_organizations";

/// Who and what a request is about, for the usage log line.
struct RequestContext {
    correlation_id: String,
    function: String,
    email: String,
    organization: String,
    client_version: String,
}

impl RequestContext {
    fn new(function: &str) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            function: function.to_string(),
            email: "unknown".to_string(),
            organization: "unknown".to_string(),
            client_version: "unknown".to_string(),
        }
    }

    fn usage_line(&self) -> String {
        format!(
            "email:{}, organization:{}, function({}:{}:{})",
            self.email, self.organization, self.function, self.correlation_id, self.client_version
        )
    }
}

/// Entry point shared by the dev server and the Lambda handler: turns a raw
/// event into a response envelope.
pub struct FunctionDispatcher {
    stage: Stage,
    engine: Arc<AnalysisEngine>,
    authorizer: Arc<Authorizer>,
    registry: ProcessorRegistry,
}

impl FunctionDispatcher {
    pub fn new(
        stage: Stage,
        engine: Arc<AnalysisEngine>,
        authorizer: Arc<Authorizer>,
        registry: ProcessorRegistry,
    ) -> Self {
        Self {
            stage,
            engine,
            authorizer,
            registry,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn knows(&self, function: &str) -> bool {
        function == USER_ORGANIZATIONS || self.registry.get(function).is_some()
    }

    pub fn functions(&self) -> Vec<&'static str> {
        let mut names = self.registry.names();
        names.push(USER_ORGANIZATIONS);
        names.sort_unstable();
        names
    }

    pub async fn invoke(&self, function: &str, event: Value) -> FunctionResponse {
        if function == USER_ORGANIZATIONS {
            return self.user_organizations(event).await;
        }

        match self.registry.get(function) {
            Some(processor) => self.process_request(processor, event).await,
            None => {
                tracing::warn!("Unknown function requested: {}", function);
                FunctionResponse::error(
                    404,
                    API_VERSION,
                    &format!("Error: unknown function {}", function),
                )
            }
        }
    }

    async fn process_request(&self, processor: Arc<dyn Processor>, event: Value) -> FunctionResponse {
        let mut ctx = RequestContext::new(processor.name());
        tracing::info!("correlation_id is: {}", ctx.correlation_id);
        tracing::info!("Inbound request {} {}", ctx.correlation_id, ctx.function);

        match self.run(processor.as_ref(), event, &mut ctx).await {
            Ok(result) => {
                tracing::info!("BOOST_USAGE: {} SUCCEEDED", ctx.usage_line());
                FunctionResponse::json(200, processor.api_version(), &result)
            }
            Err(e) => self.failure(&ctx, processor.api_version(), e),
        }
    }

    async fn run(
        &self,
        processor: &dyn Processor,
        event: Value,
        ctx: &mut RequestContext,
    ) -> Result<Value> {
        let data = parse_event(event)?;
        if let Some(version) = data.get("version").and_then(Value::as_str) {
            ctx.client_version = version.to_string();
        }
        if let Some(organization) = data.get("organization").and_then(Value::as_str) {
            ctx.organization = organization.to_string();
        }

        let started = Instant::now();
        let account = self.authorizer.validate(&data, &ctx.correlation_id).await?;
        tracing::info!(
            "Execution time {} validate_request: {:.3} seconds",
            ctx.correlation_id,
            started.elapsed().as_secs_f64()
        );

        let email = account.email.clone().filter(|e| !e.is_empty()).ok_or_else(|| {
            BoostError::bad_request("Error: Unable to determine email address for account")
        })?;
        ctx.email = email;

        let invocation = Invocation {
            function_name: ctx.function.clone(),
            correlation_id: ctx.correlation_id.clone(),
            account,
            data,
        };

        let started = Instant::now();
        let result = processor.process(&self.engine, &invocation).await?;
        tracing::info!(
            "Execution time {} {}: {:.3} seconds",
            ctx.correlation_id,
            ctx.function,
            started.elapsed().as_secs_f64()
        );
        Ok(result)
    }

    async fn user_organizations(&self, event: Value) -> FunctionResponse {
        let mut ctx = RequestContext::new(USER_ORGANIZATIONS);
        tracing::info!("Inbound request {} {}", ctx.correlation_id, ctx.function);

        let outcome: Result<Value> = async {
            let data = parse_event(event)?;
            if let Some(version) = data.get("version").and_then(Value::as_str) {
                ctx.client_version = version.to_string();
            }

            let started = Instant::now();
            let identity = self.authorizer.identify(&data).await?;
            tracing::info!(
                "Execution time {} validate_request: {:.3} seconds",
                ctx.correlation_id,
                started.elapsed().as_secs_f64()
            );

            ctx.email = identity.email.clone().unwrap_or_else(|| "None".to_string());
            ctx.organization = match &identity.organizations {
                Some(orgs) => format!("({})", orgs.join(",")),
                None => "NONE FOUND".to_string(),
            };

            Ok(json!({
                "organizations": identity.organizations,
                "email": identity.email,
                "personal": identity.username,
            }))
        }
        .await;

        match outcome {
            Ok(result) => {
                tracing::info!("BOOST_USAGE: {} SUCCEEDED", ctx.usage_line());
                FunctionResponse::json(200, API_VERSION, &result)
            }
            Err(e) => self.failure(&ctx, API_VERSION, e),
        }
    }

    fn failure(&self, ctx: &RequestContext, api_version: &str, error: BoostError) -> FunctionResponse {
        let mut prefix = "BOOST_USAGE: ";
        let mut details = error.to_string();

        if error.is_implementation_failure() {
            prefix = "SERVICE_IMPL_FAILURE: BOOST_USAGE: ";
            if self.stage.masks_internal_errors() {
                details = GENERIC_SERVICE_FAILURE.to_string();
            }
        }

        tracing::error!(
            "{}{} FAILED with exception: {:?}",
            prefix,
            ctx.usage_line(),
            error
        );

        if self.stage.exposes_error_details() {
            details = format!("{} ({:?})", error, error);
        }

        FunctionResponse::error(error.status_code(), api_version, &details)
    }
}

/// Request body of an event: a JSON string under `body`, or the event itself.
/// The `User-Agent` header stands in for a missing `version`.
pub fn parse_event(event: Value) -> Result<Map<String, Value>> {
    let user_agent = header(&event, "user-agent");

    let body = match event {
        Value::Object(mut event) => match event.remove("body") {
            Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(body)) => body,
                Ok(_) => return Err(BoostError::bad_request("Error: request body must be a JSON object")),
                Err(e) => {
                    return Err(BoostError::bad_request(format!(
                        "Error: request body is not valid JSON: {}",
                        e
                    )))
                }
            },
            Some(Value::Object(body)) => body,
            Some(Value::Null) | None => event,
            Some(_) => return Err(BoostError::bad_request("Error: request body must be a JSON object")),
        },
        _ => return Err(BoostError::bad_request("Error: request event must be a JSON object")),
    };

    let mut body = body;
    if !body.contains_key("version") {
        if let Some(agent) = user_agent {
            body.insert("version".to_string(), Value::String(agent));
        }
    }
    Ok(body)
}

fn header(event: &Value, name: &str) -> Option<String> {
    event
        .get("headers")?
        .as_object()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_string)
}
