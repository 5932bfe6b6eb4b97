//! Backend detection and model listing against fake servers on loopback ports.

mod common;

use std::time::Duration;

use parley::backend::{
    BackendConnector, BackendFlavor, BackendRegistry, DetectOptions, ModelCatalog,
};
use parley::llm::{ChatMessage, LlmBackend, OpenAiCompatClient};

fn options(ollama_port: u16) -> DetectOptions {
    DetectOptions {
        probe_timeout: Duration::from_secs(2),
        ollama_port,
        forced: None,
    }
}

#[tokio::test]
async fn detects_openai_compatible_server_and_lists_models() {
    let fake = common::FakeOpenAi::default();
    let base = fake.start().await;
    let registry = BackendRegistry::new(format!("{}/", base), None, options(common::closed_port()));

    let d = registry.detect_current().await.expect("backend detected");
    assert_eq!(d.flavor, BackendFlavor::OpenAiCompatible);
    assert_eq!(d.base_url, base);
    assert!(!d.requires_auth);
    assert_eq!(registry.current().await, Some(d.clone()));

    let models = ModelCatalog::new(None, Duration::from_secs(2))
        .list_models(&d.base_url, d.flavor)
        .await;
    let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["qwen2.5-7b-instruct", "llama-3.1-8b-instruct"]);
    assert_eq!(models[0].family.as_deref(), Some("qwen"));
    assert_eq!(models[1].family.as_deref(), Some("llama"));
}

#[tokio::test]
async fn falls_through_to_ollama_on_its_port() {
    let ollama_port = common::start_ollama().await;
    let candidate = format!("http://127.0.0.1:{}/v1", common::closed_port());
    let registry = BackendRegistry::new(candidate, None, options(ollama_port));

    let d = registry.detect_current().await.expect("ollama detected");
    assert_eq!(d.flavor, BackendFlavor::Ollama);
    assert_eq!(d.base_url, format!("http://127.0.0.1:{}/v1", ollama_port));
    assert_eq!(registry.base_url().await, d.base_url);

    let models = ModelCatalog::new(None, Duration::from_secs(2))
        .list_models(&d.base_url, d.flavor)
        .await;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].id, "llama3.2:latest");
    assert_eq!(models[0].human_size.as_deref(), Some("2.0 GB"));
    assert_eq!(models[0].family.as_deref(), Some("llama"));
}

#[tokio::test]
async fn nothing_answering_keeps_configured_url() {
    let candidate = format!("http://127.0.0.1:{}/v1", common::closed_port());
    let registry = BackendRegistry::new(candidate.clone(), None, options(common::closed_port()));

    assert_eq!(registry.detect_current().await, None);
    assert_eq!(registry.current().await, None);
    let d = registry.resolve().await;
    assert_eq!(d.flavor, BackendFlavor::OpenAiCompatible);
    assert_eq!(d.base_url, candidate);

    let models = ModelCatalog::new(None, Duration::from_millis(500))
        .list_models(&d.base_url, d.flavor)
        .await;
    assert!(models.is_empty());
}

#[tokio::test]
async fn forced_flavor_skips_probing() {
    let candidate = format!("http://127.0.0.1:{}", common::closed_port());
    let registry = BackendRegistry::new(
        candidate.clone(),
        None,
        DetectOptions {
            forced: Some(BackendFlavor::Ollama),
            ..options(common::closed_port())
        },
    );
    let d = registry.detect_current().await.expect("forced descriptor");
    assert_eq!(d.flavor, BackendFlavor::Ollama);
    assert_eq!(d.base_url, format!("{}/v1", candidate));
}

#[tokio::test]
async fn client_sends_tools_and_parses_tool_calls() {
    let fake = common::FakeOpenAi::default();
    let base = fake.start().await;
    fake.reply(serde_json::json!({
        "role": "assistant",
        "content": null,
        "tool_calls": [{
            "id": "call_7",
            "type": "function",
            "function": { "name": "read_file", "arguments": { "path": "a.txt" } }
        }]
    }));

    let client = OpenAiCompatClient::new(base, None);
    let tools = vec![parley::llm::ToolDefinition::function(
        "read_file",
        "Read a file.",
        serde_json::json!({ "type": "object" }),
    )];
    let res = client
        .chat("qwen2.5-7b-instruct", &[ChatMessage::user("read a.txt")], Some(&tools))
        .await
        .unwrap();

    let calls = res.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_7");
    assert_eq!(calls[0].function.arguments, r#"{"path":"a.txt"}"#);

    let sent = &fake.requests()[0];
    assert_eq!(sent["model"], "qwen2.5-7b-instruct");
    assert_eq!(sent["tool_choice"], "auto");
    assert_eq!(sent["tools"][0]["function"]["name"], "read_file");
    assert_eq!(sent["messages"][0]["role"], "user");
}

#[tokio::test]
async fn client_reports_api_errors_with_status() {
    let fake = common::FakeOpenAi {
        reject_tools: true,
        ..Default::default()
    };
    let base = fake.start().await;
    let client = OpenAiCompatClient::new(base, None);
    let tools = vec![parley::llm::ToolDefinition::function(
        "read_file",
        "Read a file.",
        serde_json::json!({ "type": "object" }),
    )];
    let err = client
        .chat("gemma", &[ChatMessage::user("hi")], Some(&tools))
        .await
        .unwrap_err();
    assert!(matches!(err, parley::llm::LlmError::Api { status: 400, .. }));
    assert!(err.is_tools_unsupported());
}

#[tokio::test]
async fn connected_client_carries_configured_key() {
    let fake = common::FakeOpenAi::default();
    let base = fake.start().await;
    let keyed = BackendRegistry::new(
        base.clone(),
        Some("sk-local".to_string()),
        options(common::closed_port()),
    );
    let d = keyed.detect_current().await.expect("backend detected");
    assert!(!d.requires_auth);
    keyed
        .connect()
        .await
        .chat("qwen2.5-7b-instruct", &[ChatMessage::user("hi")], None)
        .await
        .unwrap();

    let open = BackendRegistry::new(base, None, options(common::closed_port()));
    open.connect()
        .await
        .chat("qwen2.5-7b-instruct", &[ChatMessage::user("hi")], None)
        .await
        .unwrap();

    assert_eq!(
        fake.auth_headers(),
        vec![Some("Bearer sk-local".to_string()), None]
    );
}
