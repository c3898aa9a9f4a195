//! A single-endpoint GraphQL view.
//!
//! The view is schema-agnostic: queries are handed to a [`GraphQlSchema`]
//! and its JSON result becomes the response media.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use kestrel_core::{HandlerResult, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::endpoint::{Endpoint, Resource};
use crate::templates::{SubstitutionRenderer, TemplateRenderer, GRAPHIQL};

/// Message returned when a JSON payload has no `query`.
pub const MISSING_QUERY: &str = "'query' key is required in the JSON payload";

/// One GraphQL operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQlRequest {
    /// Query document.
    pub query: String,
    /// Operation variables.
    #[serde(default)]
    pub variables: Option<Value>,
    /// Operation to run when the document holds several.
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

impl GraphQlRequest {
    /// A request with only a query document.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// Executes GraphQL requests.
///
/// The returned value is sent as-is, so it should already be a GraphQL
/// response object (`{"data": ..}` and/or `{"errors": [..]}`).
#[async_trait]
pub trait GraphQlSchema: Send + Sync + 'static {
    /// Execute `request`.
    async fn execute(&self, request: GraphQlRequest) -> Value;
}

/// Serves a [`GraphQlSchema`] at one route.
///
/// - `GET` from a browser (`Accept: text/html`) gets the GraphiQL page.
/// - A JSON body is read as `{"query", "variables", "operationName"}`.
/// - Otherwise the query is taken from the `query` or `q` parameter, then
///   from the body text.
pub struct GraphQlView {
    schema: Arc<dyn GraphQlSchema>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl GraphQlView {
    /// Serve `schema`.
    pub fn new(schema: impl GraphQlSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            renderer: Arc::new(SubstitutionRenderer::new()),
        }
    }

    /// Render the GraphiQL page with `renderer`.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// The view as a class-style resource with a catch-all handler.
    pub fn into_resource(self) -> Resource<Self> {
        Resource::from_instance(Arc::new(self)).on_request(|view, req, resp| async move {
            view.respond(req, resp).await
        })
    }

    async fn respond(&self, req: Request, mut resp: Response) -> HandlerResult<Response> {
        if *req.method() == Method::GET && req.accepts("text/html") {
            let page = self
                .renderer
                .render_string(GRAPHIQL, &json!({ "endpoint": req.path() }))?;
            resp.html(page);
            return Ok(resp);
        }

        let Some(request) = resolve_query(&req).await? else {
            resp.set_status(StatusCode::BAD_REQUEST);
            resp.set_media(json!({ "errors": [MISSING_QUERY] }))?;
            return Ok(resp);
        };

        tracing::debug!(operation = ?request.operation_name, "executing graphql query");
        let result = self.schema.execute(request).await;
        resp.set_media(result)?;
        Ok(resp)
    }
}

impl std::fmt::Debug for GraphQlView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlView").finish_non_exhaustive()
    }
}

impl From<GraphQlView> for Endpoint {
    fn from(view: GraphQlView) -> Self {
        view.into_resource().into()
    }
}

/// `None` when a JSON payload lacks `query`.
async fn resolve_query(req: &Request) -> HandlerResult<Option<GraphQlRequest>> {
    if req.mimetype().contains("json") {
        let payload = req.media(Some("json")).await?.to_value();
        let Some(query) = payload.get("query").and_then(Value::as_str) else {
            return Ok(None);
        };
        return Ok(Some(GraphQlRequest {
            query: query.to_string(),
            variables: payload.get("variables").cloned().filter(|v| !v.is_null()),
            operation_name: payload
                .get("operationName")
                .and_then(Value::as_str)
                .map(str::to_string),
        }));
    }

    if let Some(query) = req.query().get("query").or_else(|| req.query().get("q")) {
        return Ok(Some(GraphQlRequest::new(query)));
    }

    if req.mimetype().contains("form") {
        let form = req.media(Some("form")).await?.to_value();
        if let Some(query) = ["query", "q"]
            .iter()
            .find_map(|key| form.get(*key).and_then(Value::as_str))
        {
            return Ok(Some(GraphQlRequest::new(query)));
        }
    }

    Ok(Some(GraphQlRequest::new(req.text().await?)))
}
