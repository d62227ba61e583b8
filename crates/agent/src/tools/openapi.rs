//! Support-request tools generated from the onboarding OpenAPI schema.
//!
//! Each operation becomes one [`OpenApiTool`]. The model calls it with an
//! object of the shape `{ "parameters": {..}, "requestBody": {..} }`:
//! path and query parameters go under `parameters`, the JSON body under
//! `requestBody`. Only local `#/...` references are resolved.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use super::Tool;
use crate::llm::ToolDefinition;

const MAX_REF_DEPTH: usize = 16;
const MAX_TOOL_NAME_LEN: usize = 64;
const HTTP_METHODS: [&str; 5] = ["get", "post", "put", "patch", "delete"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpenApiError {
    #[error("schema is empty")]
    Empty,
    #[error("schema is neither valid JSON ({json}) nor valid YAML ({yaml})")]
    Parse { json: String, yaml: String },
    #[error("schema root must be an object")]
    NotAnObject,
    #[error("schema declares no `servers[].url`")]
    MissingServer,
    #[error("server url `{0}` is not a valid absolute URL")]
    InvalidServer(String),
    #[error("schema declares no operations under `paths`")]
    NoOperations,
    #[error("unresolvable reference `{0}`")]
    UnresolvedRef(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
}

#[derive(Clone, Debug)]
struct OperationParam {
    name: String,
    location: ParamLocation,
}

pub struct OpenApiTool {
    name: String,
    description: String,
    method: Method,
    base_url: Url,
    path: String,
    params: Vec<OperationParam>,
    parameters_schema: Value,
    client: Client,
    bearer_token: Option<SecretString>,
}

impl std::fmt::Debug for OpenApiTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenApiTool")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("base_url", &self.base_url.as_str())
            .field("path", &self.path)
            .field("authenticated", &self.bearer_token.is_some())
            .finish()
    }
}

/// Builds tools for a schema if one is configured. Conversion failures are
/// logged and produce no tools so the agent still starts.
pub fn load_openapi_tools(
    schema_text: Option<&str>,
    bearer_token: Option<&SecretString>,
    client: Client,
) -> Vec<OpenApiTool> {
    let Some(schema_text) = schema_text.filter(|text| !text.trim().is_empty()) else {
        return Vec::new();
    };

    match tools_from_schema(schema_text, bearer_token, client) {
        Ok(tools) => {
            info!(
                event_name = "agent.tools.openapi_loaded",
                tool_count = tools.len(),
                authenticated = bearer_token.is_some(),
                "openapi tools loaded"
            );
            tools
        }
        Err(error) => {
            warn!(
                event_name = "agent.tools.openapi_load_failed",
                error = %error,
                "failed to load OpenAPI schema; continuing without support request tools"
            );
            Vec::new()
        }
    }
}

pub fn tools_from_schema(
    schema_text: &str,
    bearer_token: Option<&SecretString>,
    client: Client,
) -> Result<Vec<OpenApiTool>, OpenApiError> {
    let root = parse_schema(schema_text)?;

    let server = root["servers"]
        .as_array()
        .and_then(|servers| servers.iter().find_map(|server| server["url"].as_str()))
        .ok_or(OpenApiError::MissingServer)?;
    let base_url =
        Url::parse(server).map_err(|_| OpenApiError::InvalidServer(server.to_string()))?;
    if base_url.cannot_be_a_base() {
        return Err(OpenApiError::InvalidServer(server.to_string()));
    }

    let paths = root["paths"].as_object().ok_or(OpenApiError::NoOperations)?;
    let mut tools = Vec::new();

    for (path, path_item) in paths {
        let path_item = resolve_refs(path_item, &root, &mut Vec::new())?;
        let shared_params = path_item["parameters"].as_array().cloned().unwrap_or_default();

        for method in HTTP_METHODS {
            let Some(operation) = path_item.get(method) else {
                continue;
            };

            let name = operation["operationId"]
                .as_str()
                .map(sanitize_tool_name)
                .unwrap_or_else(|| sanitize_tool_name(&format!("{method}_{path}")));
            let name = unique_tool_name(name, &tools);
            let description = operation["description"]
                .as_str()
                .or_else(|| operation["summary"].as_str())
                .unwrap_or_default()
                .to_string();

            let mut raw_params = shared_params.clone();
            raw_params.extend(operation["parameters"].as_array().cloned().unwrap_or_default());
            let (params, parameters_schema) = build_parameters_schema(&raw_params, operation);

            tools.push(OpenApiTool {
                name,
                description,
                method: method.to_ascii_uppercase().parse().unwrap_or(Method::POST),
                base_url: base_url.clone(),
                path: path.clone(),
                params,
                parameters_schema,
                client: client.clone(),
                bearer_token: bearer_token.cloned(),
            });
        }
    }

    if tools.is_empty() {
        return Err(OpenApiError::NoOperations);
    }

    Ok(tools)
}

/// Names of the tools a schema would produce, without wiring up credentials.
pub fn inspect_schema(schema_text: &str) -> Result<Vec<String>, OpenApiError> {
    let tools = tools_from_schema(schema_text, None, Client::new())?;
    Ok(tools.into_iter().map(|tool| tool.name).collect())
}

fn parse_schema(schema_text: &str) -> Result<Value, OpenApiError> {
    let trimmed = schema_text.trim();
    if trimmed.is_empty() {
        return Err(OpenApiError::Empty);
    }

    let parsed = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(json_error) => serde_yaml::from_str::<Value>(trimmed).map_err(|yaml_error| {
            OpenApiError::Parse { json: json_error.to_string(), yaml: yaml_error.to_string() }
        })?,
    };

    if !parsed.is_object() {
        return Err(OpenApiError::NotAnObject);
    }

    Ok(parsed)
}

/// Inlines local references (`#/components/...`) found anywhere in `value`.
/// A reference that is already being expanded, or that sits deeper than
/// `MAX_REF_DEPTH`, becomes an unconstrained `{}` schema.
fn resolve_refs<'a>(
    value: &'a Value,
    root: &'a Value,
    expanding: &mut Vec<&'a str>,
) -> Result<Value, OpenApiError> {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if expanding.contains(&reference) || expanding.len() >= MAX_REF_DEPTH {
                    return Ok(json!({}));
                }
                let target = reference
                    .strip_prefix('#')
                    .and_then(|pointer| root.pointer(pointer))
                    .ok_or_else(|| OpenApiError::UnresolvedRef(reference.to_string()))?;

                expanding.push(reference);
                let resolved = resolve_refs(target, root, expanding);
                expanding.pop();
                return resolved;
            }

            let mut resolved = Map::with_capacity(map.len());
            for (key, child) in map {
                resolved.insert(key.clone(), resolve_refs(child, root, expanding)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_refs(item, root, expanding))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn build_parameters_schema(
    raw_params: &[Value],
    operation: &Value,
) -> (Vec<OperationParam>, Value) {
    let mut params = Vec::new();
    let mut param_properties = Map::new();
    let mut required_params = Vec::new();

    for raw in raw_params {
        let Some(name) = raw["name"].as_str() else {
            continue;
        };
        let location = match raw["in"].as_str() {
            Some("path") => ParamLocation::Path,
            Some("query") => ParamLocation::Query,
            _ => continue,
        };

        // operation-level parameters override path-level ones with the same name
        params.retain(|existing: &OperationParam| existing.name != name);
        required_params.retain(|existing: &Value| existing.as_str() != Some(name));

        let mut schema = raw.get("schema").cloned().unwrap_or_else(|| json!({ "type": "string" }));
        if let (Some(description), Value::Object(schema_map)) =
            (raw["description"].as_str(), &mut schema)
        {
            schema_map
                .entry("description".to_string())
                .or_insert_with(|| Value::String(description.to_string()));
        }
        param_properties.insert(name.to_string(), schema);

        if location == ParamLocation::Path || raw["required"].as_bool().unwrap_or(false) {
            required_params.push(Value::String(name.to_string()));
        }
        params.push(OperationParam { name: name.to_string(), location });
    }

    let mut properties = Map::new();
    let mut required = Vec::new();

    if !param_properties.is_empty() {
        if !required_params.is_empty() {
            required.push(Value::String("parameters".to_string()));
        }
        properties.insert(
            "parameters".to_string(),
            json!({
                "type": "object",
                "properties": param_properties,
                "required": required_params,
            }),
        );
    }

    if let Some(body_schema) = operation["requestBody"]["content"]["application/json"].get("schema") {
        properties.insert("requestBody".to_string(), body_schema.clone());
        if operation["requestBody"]["required"].as_bool().unwrap_or(false) {
            required.push(Value::String("requestBody".to_string()));
        }
    }

    let schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });

    (params, schema)
}

fn sanitize_tool_name(raw: &str) -> String {
    let mut name = raw
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '_' | '-') {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();
    name.truncate(MAX_TOOL_NAME_LEN);
    name
}

/// Appends `_2`, `_3`, ... until `name` no longer collides with an earlier
/// operation.
fn unique_tool_name(name: String, tools: &[OpenApiTool]) -> String {
    let taken = |candidate: &str| tools.iter().any(|tool| tool.name == candidate);
    if !taken(&name) {
        return name;
    }

    let mut suffix = 2_usize;
    loop {
        let tail = format!("_{suffix}");
        let mut candidate = name.clone();
        candidate.truncate(MAX_TOOL_NAME_LEN - tail.len());
        candidate.push_str(&tail);
        if !taken(&candidate) {
            warn!(
                event_name = "agent.tools.openapi_name_collision",
                original = %name,
                renamed = %candidate,
                "duplicate operation name renamed"
            );
            return candidate;
        }
        suffix += 1;
    }
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl OpenApiTool {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn build_url(&self, parameters: &Value) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments =
                url.path_segments_mut().map_err(|_| anyhow!("server url cannot carry a path"))?;
            segments.pop_if_empty();

            let parts = self.path.split('/').collect::<Vec<_>>();
            for (index, part) in parts.iter().enumerate() {
                if part.is_empty() {
                    if index > 0 && index == parts.len() - 1 {
                        segments.push("");
                    }
                    continue;
                }

                match part.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
                    Some(param) => {
                        let value = parameters
                            .get(param)
                            .filter(|value| !value.is_null())
                            .ok_or_else(|| anyhow!("missing path parameter `{param}`"))?;
                        segments.push(&param_value(value));
                    }
                    None => {
                        segments.push(part);
                    }
                }
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl Tool for OpenApiTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema.clone(),
            strict: false,
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let parameters = input.get("parameters").cloned().unwrap_or_else(|| json!({}));
        let url = self.build_url(&parameters)?;

        let query = self
            .params
            .iter()
            .filter(|param| param.location == ParamLocation::Query)
            .filter_map(|param| {
                parameters
                    .get(&param.name)
                    .filter(|value| !value.is_null())
                    .map(|value| (param.name.clone(), param_value(value)))
            })
            .collect::<Vec<_>>();

        let mut request = self.client.request(self.method.clone(), url.clone());
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = input.get("requestBody").filter(|body| !body.is_null()) {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to `{url}` for tool `{}` failed", self.name))?;
        let status = response.status();
        let text = response.text().await.context("could not read response body")?;
        let parsed = serde_json::from_str::<Value>(&text).ok();

        info!(
            event_name = "agent.tools.openapi_call",
            tool = %self.name,
            status = status.as_u16(),
            "openapi tool executed"
        );

        match (status.is_success(), parsed) {
            (true, Some(body)) => Ok(body),
            (true, None) => Ok(json!({ "status": status.as_u16(), "body": text })),
            (false, parsed) => Ok(json!({
                "error": format!("request failed with status {}", status.as_u16()),
                "status": status.as_u16(),
                "body": parsed.unwrap_or(Value::String(text)),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Client, Method};
    use serde_json::json;

    use super::{inspect_schema, load_openapi_tools, tools_from_schema, OpenApiError};
    use crate::tools::Tool;

    const SUPPORT_SCHEMA: &str = r##"{
  "openapi": "3.1.0",
  "info": { "title": "Send Project Info", "version": "v1.0.0" },
  "servers": [{ "url": "https://support.example.com/httpCreateContact" }],
  "paths": {
    "/": {
      "post": {
        "description": "Send a new support ticket.",
        "operationId": "sendSupportRequest",
        "parameters": [],
        "requestBody": {
          "content": {
            "application/json": { "schema": { "$ref": "#/components/schemas/SendProjectInfo" } }
          },
          "required": true
        }
      }
    }
  },
  "components": {
    "schemas": {
      "SendProjectInfo": {
        "type": "object",
        "properties": {
          "email": { "type": "string", "description": "Email address of the customer." },
          "inquiryType": {
            "type": "string",
            "enum": ["technicalSupport", "salesInquiry", "generalQuestion", "feedback"]
          },
          "message": { "type": "string" }
        },
        "required": ["email", "inquiryType", "message"]
      }
    }
  }
}"##;

    #[test]
    fn converts_operation_with_inlined_request_body() {
        let tools = tools_from_schema(SUPPORT_SCHEMA, None, Client::new()).expect("tools");
        assert_eq!(tools.len(), 1);

        let tool = &tools[0];
        assert_eq!(tool.name(), "sendSupportRequest");
        assert_eq!(tool.method(), &Method::POST);

        let definition = tool.definition();
        assert_eq!(definition.description, "Send a new support ticket.");
        assert!(!definition.strict);
        let body = &definition.parameters["properties"]["requestBody"];
        assert_eq!(body["properties"]["inquiryType"]["enum"][1], "salesInquiry");
        assert_eq!(definition.parameters["required"], json!(["requestBody"]));
        assert!(definition.parameters["properties"].get("parameters").is_none());
    }

    #[test]
    fn yaml_schema_with_path_and_query_parameters() {
        let yaml = r#"
openapi: 3.0.0
servers:
  - url: https://api.example.com/v2
paths:
  /tickets/{ticketId}:
    parameters:
      - name: ticketId
        in: path
        schema: { type: string }
    get:
      summary: Fetch a ticket
      parameters:
        - name: verbose
          in: query
          description: Include history.
          schema: { type: boolean }
        - name: X-Trace
          in: header
          schema: { type: string }
"#;
        let tools = tools_from_schema(yaml, None, Client::new()).expect("tools");
        assert_eq!(tools.len(), 1);

        let definition = tools[0].definition();
        assert_eq!(definition.name, "get__tickets__ticketId_");
        assert_eq!(definition.description, "Fetch a ticket");
        let params = &definition.parameters["properties"]["parameters"];
        assert_eq!(params["required"], json!(["ticketId"]));
        assert_eq!(params["properties"]["verbose"]["description"], "Include history.");
        assert!(params["properties"].get("X-Trace").is_none());
        assert_eq!(definition.parameters["required"], json!(["parameters"]));
    }

    #[test]
    fn invalid_schemas_are_reported() {
        assert_eq!(
            tools_from_schema("   ", None, Client::new()).err(),
            Some(OpenApiError::Empty)
        );
        assert_eq!(
            tools_from_schema("just some words", None, Client::new()).err(),
            Some(OpenApiError::NotAnObject)
        );
        assert_eq!(
            tools_from_schema(r#"{"paths": {}}"#, None, Client::new()).err(),
            Some(OpenApiError::MissingServer)
        );
        let dangling = r##"{
            "servers": [{ "url": "https://x.test" }],
            "paths": { "/": { "post": { "requestBody": { "$ref": "#/components/requestBodies/Nope" } } } }
        }"##;
        assert!(matches!(
            tools_from_schema(dangling, None, Client::new()).err(),
            Some(OpenApiError::UnresolvedRef(_))
        ));
    }

    #[test]
    fn recursive_references_stop_expanding() {
        let schema = r##"{
  "servers": [{ "url": "https://tickets.example.com" }],
  "paths": {
    "/tickets": {
      "post": {
        "operationId": "createTicket",
        "requestBody": {
          "content": { "application/json": { "schema": { "type": "object" } } }
        }
      }
    },
    "/tickets/{id}/comments": {
      "post": {
        "operationId": "addComment",
        "parameters": [{ "name": "id", "in": "path", "schema": { "type": "string" } }],
        "requestBody": {
          "content": {
            "application/json": { "schema": { "$ref": "#/components/schemas/Comment" } }
          }
        }
      }
    }
  },
  "components": {
    "schemas": {
      "Comment": {
        "type": "object",
        "properties": {
          "text": { "type": "string" },
          "replies": { "type": "array", "items": { "$ref": "#/components/schemas/Comment" } }
        }
      }
    }
  }
}"##;
        let tools = tools_from_schema(schema, None, Client::new()).expect("tools");
        let mut names = tools.iter().map(|tool| tool.name().to_string()).collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["addComment", "createTicket"]);

        let comment = tools
            .iter()
            .find(|tool| tool.name() == "addComment")
            .map(|tool| tool.definition().parameters["properties"]["requestBody"].clone())
            .expect("addComment");
        assert_eq!(comment["properties"]["text"]["type"], "string");
        assert_eq!(comment["properties"]["replies"]["items"], json!({}));
    }

    #[test]
    fn duplicate_operation_names_get_suffixes() {
        let schema = r##"{
  "servers": [{ "url": "https://tickets.example.com" }],
  "paths": {
    "/tickets": { "post": { "operationId": "createTicket" } },
    "/v2/tickets": { "post": { "operationId": "createTicket" } },
    "/a.b": { "get": {} },
    "/a_b": { "get": {} }
  }
}"##;
        let mut names = inspect_schema(schema).expect("names");
        names.sort();
        assert_eq!(names, vec!["createTicket", "createTicket_2", "get__a_b", "get__a_b_2"]);
    }

    #[test]
    fn load_fails_open_to_no_tools() {
        assert!(load_openapi_tools(Some("{ not json"), None, Client::new()).is_empty());
        assert!(load_openapi_tools(None, None, Client::new()).is_empty());
        assert_eq!(load_openapi_tools(Some(SUPPORT_SCHEMA), None, Client::new()).len(), 1);
    }
}
