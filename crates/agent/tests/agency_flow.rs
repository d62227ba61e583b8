//! End-to-end turns through the agency with the provider and the support API
//! both served by a mock server.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{json, Value};
use supportdesk_agent::{create_agency, OpenAiClient};
use supportdesk_core::config::AppConfig;
use supportdesk_core::onboarding::OnboardingConfig;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(message: Value) -> Value {
    json!({
        "id": "chatcmpl-e2e",
        "model": "gpt-5",
        "choices": [{ "index": 0, "message": message, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
    })
}

fn support_schema(server_url: &str) -> String {
    json!({
        "openapi": "3.1.0",
        "info": { "title": "Send Project Info", "version": "v1.0.0" },
        "servers": [{ "url": format!("{server_url}/support") }],
        "paths": {
            "/contact": {
                "post": {
                    "operationId": "sendSupportRequest",
                    "description": "Send a new support ticket.",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": {
                                        "email": { "type": "string" },
                                        "message": { "type": "string" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
    .to_string()
}

async fn mount_guardrail(server: &MockServer, relevant: bool) {
    let verdict = json!({ "is_relevant": relevant, "reasoning": "scripted" }).to_string();
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-5-nano" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(json!({ "role": "assistant", "content": verdict }))),
        )
        .mount(server)
        .await;
}

fn app_config(files: &TempDir) -> AppConfig {
    let mut app = AppConfig::default();
    app.agent.files_dir = files.path().to_path_buf();
    app.tools.bearer_token = Some(SecretString::from("support-token"));
    app
}

fn provider(server: &MockServer) -> Arc<OpenAiClient> {
    Arc::new(
        OpenAiClient::new(server.uri(), SecretString::from("sk-test"), Duration::from_secs(5))
            .expect("client"),
    )
}

#[tokio::test]
async fn support_request_tool_round_trip() {
    let server = MockServer::start().await;
    let files = TempDir::new().expect("tempdir");
    mount_guardrail(&server, true).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-5" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {
                    "name": "sendSupportRequest",
                    "arguments": "{\"requestBody\":{\"email\":\"wile@acme.test\",\"message\":\"Broken anvil\"}}"
                }
            }]
        }))))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-5" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
            "role": "assistant",
            "content": "I've opened ticket T-7 for you."
        }))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/support/contact"))
        .and(header("authorization", "Bearer support-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ticketId": "T-7" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut onboarding = OnboardingConfig::new("Acme Anvils", "Acme sells anvils.");
    onboarding.openapi_schema = Some(support_schema(&server.uri()));
    let mut agency =
        create_agency(&onboarding, &app_config(&files), provider(&server)).expect("agency");

    let reply = agency.get_response("My anvil broke, please open a ticket").await.expect("reply");

    assert_eq!(reply.text, "I've opened ticket T-7 for you.");
    assert!(!reply.guardrail_triggered);
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].name, "sendSupportRequest");
    assert_eq!(agency.thread().messages.len(), 4);
    assert!(agency.thread().messages[2].content.contains("T-7"));

    let requests = server.received_requests().await.unwrap_or_default();
    let first_agent_call = requests
        .iter()
        .filter_map(|request| request.body_json::<Value>().ok())
        .find(|body| body["model"] == "gpt-5")
        .unwrap_or_default();
    assert_eq!(first_agent_call["tools"][0]["function"]["name"], "sendSupportRequest");
    assert_eq!(first_agent_call["reasoning_effort"], "low");
    let system = first_agent_call["messages"][0]["content"].as_str().unwrap_or_default();
    assert!(system.contains("support request tool"));
}

#[tokio::test]
async fn off_topic_question_never_reaches_the_agent() {
    let server = MockServer::start().await;
    let files = TempDir::new().expect("tempdir");
    mount_guardrail(&server, false).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-5" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
            "role": "assistant",
            "content": "should not be used"
        }))))
        .expect(0)
        .mount(&server)
        .await;

    let onboarding = OnboardingConfig::new("Acme Anvils", "Acme sells anvils.");
    let mut agency =
        create_agency(&onboarding, &app_config(&files), provider(&server)).expect("agency");

    let reply = agency.get_response("What's the capital of France?").await.expect("reply");

    assert!(reply.guardrail_triggered);
    assert_eq!(
        reply.text,
        "I'm a customer support agent for Acme Anvils. I can only help with questions related to our products and services. Please ask a question related to Acme Anvils."
    );
}

#[tokio::test]
async fn classifier_outage_fails_open() {
    let server = MockServer::start().await;
    let files = TempDir::new().expect("tempdir");
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-5-nano" })))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-5" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
            "role": "assistant",
            "content": "Happy to help with your order."
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let onboarding = OnboardingConfig::new("Acme Anvils", "Acme sells anvils.");
    let mut agency =
        create_agency(&onboarding, &app_config(&files), provider(&server)).expect("agency");

    let reply = agency.get_response("Where is my order?").await.expect("reply");

    assert!(!reply.guardrail_triggered);
    assert_eq!(reply.text, "Happy to help with your order.");
}
