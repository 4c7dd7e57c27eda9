//! The orchestration loop.
//!
//! Flow per run:
//! 1. Emit `thinking`
//! 2. Initialize the tool server and fetch the tool catalogue
//! 3. Append the user message to the caller-supplied history
//! 4. Loop (capped): LLM turn → final text | tool calls → execute each call
//!    in order, feed results back, repeat
//!
//! Every failure path converts to a terminal `error` event — a run never
//! propagates a failure to the caller and always ends with exactly one of
//! `done` or `error`.

use tokio::sync::mpsc;

use super::types::{ChatMessage, OrchestratorEvent};
use super::{ChatOrchestrator, MAX_TOOL_ITERATIONS};
use crate::llm::TurnOutcome;
use crate::mcp_client::McpError;

impl ChatOrchestrator {
    /// Process a user message, emitting events into `events` as they occur.
    ///
    /// The caller owns `history`; the working conversation built from it is
    /// discarded when the run ends. Send failures (consumer hung up) are
    /// ignored — the run completes without rollback of tool effects.
    pub async fn process(
        &self,
        user_message: &str,
        history: Vec<ChatMessage>,
        events: &mpsc::Sender<OrchestratorEvent>,
    ) {
        if let Err(e) = self.run(user_message, history, events).await {
            tracing::error!(error = %e, "orchestrator run failed");
            emit(
                events,
                OrchestratorEvent::Error {
                    text: format!("An error occurred: {e}"),
                },
            )
            .await;
        }
    }

    async fn run(
        &self,
        user_message: &str,
        history: Vec<ChatMessage>,
        events: &mpsc::Sender<OrchestratorEvent>,
    ) -> Result<(), McpError> {
        emit(
            events,
            OrchestratorEvent::Thinking {
                text: "Analyzing your request...".to_string(),
            },
        )
        .await;

        // Handshake + catalogue. Failures here terminate the run with a
        // single error event (via the caller's catch).
        self.tools.initialize().await?;
        let tools = self.tools.list_tools().await?;

        tracing::info!(tool_count = tools.len(), "starting orchestration run");

        let mut messages = history;
        messages.push(ChatMessage::user(user_message));

        for iteration in 1..=MAX_TOOL_ITERATIONS {
            tracing::debug!(iteration, "tool calling iteration");

            match self.llm.turn(&messages, &tools).await {
                TurnOutcome::Failed { message } => {
                    emit(
                        events,
                        OrchestratorEvent::Error {
                            text: format!("AI error: {message}"),
                        },
                    )
                    .await;
                    return Ok(());
                }

                TurnOutcome::Text(text) => {
                    emit(events, OrchestratorEvent::Response { text }).await;
                    emit(events, OrchestratorEvent::Done).await;
                    return Ok(());
                }

                TurnOutcome::ToolCalls(calls) => {
                    // The assistant turn recording the calls must precede
                    // the tool-result turns for replayed history to stay
                    // well-formed.
                    messages.push(ChatMessage::tool_calls(calls.clone()));

                    // Execute in the order the model produced them; a later
                    // call may depend on an earlier one.
                    for call in calls {
                        emit(
                            events,
                            OrchestratorEvent::ToolStart {
                                name: call.name.clone(),
                                args: call.arguments.clone(),
                            },
                        )
                        .await;

                        match self.tools.call_tool(&call.name, &call.arguments).await {
                            Ok(result) => {
                                let text = result.flattened_text();
                                let event = if result.is_error {
                                    OrchestratorEvent::ToolError {
                                        name: call.name.clone(),
                                        result: text.clone(),
                                    }
                                } else {
                                    OrchestratorEvent::ToolComplete {
                                        name: call.name.clone(),
                                        result: text.clone(),
                                    }
                                };
                                emit(events, event).await;
                                messages.push(ChatMessage::tool_result(&call.id, text));
                            }
                            Err(e) => {
                                // The model must receive a turn for every
                                // call it made, even when the call itself
                                // could not produce a result.
                                let error_text = format!("Tool execution failed: {e}");
                                tracing::error!(tool = %call.name, error = %e, "tool call failed");
                                emit(
                                    events,
                                    OrchestratorEvent::ToolError {
                                        name: call.name.clone(),
                                        result: error_text.clone(),
                                    },
                                )
                                .await;
                                messages.push(ChatMessage::tool_result(&call.id, error_text));
                            }
                        }
                    }
                }
            }
        }

        emit(
            events,
            OrchestratorEvent::Error {
                text: "Maximum tool iterations reached. Please try again.".to_string(),
            },
        )
        .await;
        Ok(())
    }
}

/// Hand one event to the caller. A closed channel means the consumer
/// disconnected; the run finishes without an audience.
async fn emit(events: &mpsc::Sender<OrchestratorEvent>, event: OrchestratorEvent) {
    let _ = events.send(event).await;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use tokio::sync::mpsc;
    use tokio::sync::Mutex;

    use super::*;
    use crate::llm::TurnClient;
    use crate::mcp_client::{McpContent, McpTool, McpToolResult, ToolServer};
    use crate::orchestrator::types::{Role, ToolCall};

    // ─── Stubs ───────────────────────────────────────────────────────────

    /// Scripted turn client: pops one outcome per call, falling back to a
    /// fixed outcome when the script runs dry. Records the conversation it
    /// was handed on every call.
    struct StubTurn {
        script: Mutex<VecDeque<TurnOutcome>>,
        fallback: TurnOutcome,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl StubTurn {
        fn scripted(outcomes: Vec<TurnOutcome>) -> Self {
            Self {
                script: Mutex::new(outcomes.into()),
                fallback: TurnOutcome::Text(String::new()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn always_tool_calls() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: TurnOutcome::ToolCalls(vec![fare_call("call_loop")]),
                seen: Mutex::new(Vec::new()),
            }
        }

        async fn turn_count(&self) -> usize {
            self.seen.lock().await.len()
        }
    }

    #[async_trait]
    impl TurnClient for StubTurn {
        async fn turn(&self, messages: &[ChatMessage], _tools: &[McpTool]) -> TurnOutcome {
            self.seen.lock().await.push(messages.to_vec());
            self.script
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// Stub tool server: configurable handshake failure and scripted call
    /// results. Records every call it receives.
    struct StubTools {
        fail_handshake: bool,
        results: Mutex<VecDeque<Result<McpToolResult, McpError>>>,
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl StubTools {
        fn new() -> Self {
            Self {
                fail_handshake: false,
                results: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_handshake() -> Self {
            Self {
                fail_handshake: true,
                ..Self::new()
            }
        }

        async fn push_result(&self, result: Result<McpToolResult, McpError>) {
            self.results.lock().await.push_back(result);
        }
    }

    #[async_trait]
    impl ToolServer for StubTools {
        async fn initialize(&self) -> Result<(), McpError> {
            if self.fail_handshake {
                return Err(McpError::TransportError {
                    reason: "connection refused".into(),
                });
            }
            Ok(())
        }

        async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
            if self.fail_handshake {
                return Err(McpError::TransportError {
                    reason: "connection refused".into(),
                });
            }
            Ok(vec![McpTool {
                name: "get_fare".to_string(),
                description: Some("Fare between stations".to_string()),
                input_schema: None,
            }])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: &Map<String, Value>,
        ) -> Result<McpToolResult, McpError> {
            self.calls
                .lock()
                .await
                .push((name.to_string(), arguments.clone()));
            self.results
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(text_result("ok", false)))
        }

        async fn is_connected(&self) -> bool {
            !self.fail_handshake
        }

        async fn disconnect(&self) {}
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    fn fare_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "get_fare".to_string(),
            arguments: [("train".to_string(), json!("12345"))].into_iter().collect(),
        }
    }

    fn text_result(text: &str, is_error: bool) -> McpToolResult {
        McpToolResult {
            content: vec![McpContent {
                kind: "text".to_string(),
                text: Some(text.to_string()),
            }],
            is_error,
        }
    }

    async fn run_to_completion(
        llm: Arc<StubTurn>,
        tools: Arc<StubTools>,
        user_message: &str,
        history: Vec<ChatMessage>,
    ) -> Vec<OrchestratorEvent> {
        let orchestrator = ChatOrchestrator::new(llm, tools);
        let (tx, mut rx) = mpsc::channel(8);
        let message = user_message.to_string();

        let handle = tokio::spawn(async move {
            orchestrator.process(&message, history, &tx).await;
        });

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        handle.await.unwrap();
        events
    }

    fn event_tag(event: &OrchestratorEvent) -> &'static str {
        match event {
            OrchestratorEvent::Thinking { .. } => "thinking",
            OrchestratorEvent::ToolStart { .. } => "tool_start",
            OrchestratorEvent::ToolComplete { .. } => "tool_complete",
            OrchestratorEvent::ToolError { .. } => "tool_error",
            OrchestratorEvent::Response { .. } => "response",
            OrchestratorEvent::Error { .. } => "error",
            OrchestratorEvent::Done => "done",
        }
    }

    fn tags(events: &[OrchestratorEvent]) -> Vec<&'static str> {
        events.iter().map(event_tag).collect()
    }

    // ─── Scenarios ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fare_query_end_to_end() {
        let llm = Arc::new(StubTurn::scripted(vec![
            TurnOutcome::ToolCalls(vec![fare_call("call_1")]),
            TurnOutcome::Text("The fare is ₹1200".to_string()),
        ]));
        let tools = Arc::new(StubTools::new());
        tools.push_result(Ok(text_result("1200", false))).await;

        let events = run_to_completion(
            llm.clone(),
            tools.clone(),
            "What is the fare from Delhi to Mumbai on train 12345?",
            vec![],
        )
        .await;

        assert_eq!(
            tags(&events),
            vec!["thinking", "tool_start", "tool_complete", "response", "done"]
        );
        match &events[2] {
            OrchestratorEvent::ToolComplete { name, result } => {
                assert_eq!(name, "get_fare");
                assert_eq!(result, "1200");
            }
            other => panic!("expected tool_complete, got {other:?}"),
        }
        match &events[3] {
            OrchestratorEvent::Response { text } => assert_eq!(text, "The fare is ₹1200"),
            other => panic!("expected response, got {other:?}"),
        }

        // The tool received the arguments exactly as the model produced them.
        let calls = tools.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "get_fare");
        assert_eq!(calls[0].1["train"], "12345");
    }

    #[tokio::test]
    async fn test_conversation_bookkeeping_across_iterations() {
        let llm = Arc::new(StubTurn::scripted(vec![
            TurnOutcome::ToolCalls(vec![fare_call("call_1")]),
            TurnOutcome::Text("done".to_string()),
        ]));
        let tools = Arc::new(StubTools::new());
        tools.push_result(Ok(text_result("1200", false))).await;

        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        run_to_completion(llm.clone(), tools, "fare?", history).await;

        let seen = llm.seen.lock().await;
        assert_eq!(seen.len(), 2);

        // First turn: history + the new user message.
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[0][2].role, Role::User);
        assert_eq!(seen[0][2].content, "fare?");

        // Second turn: assistant tool-call turn precedes the tool result,
        // and the result echoes the originating call id.
        assert_eq!(seen[1].len(), 5);
        let assistant = &seen[1][3];
        assert_eq!(assistant.role, Role::Assistant);
        assert!(assistant.content.is_empty());
        assert_eq!(assistant.tool_calls.as_ref().unwrap()[0].id, "call_1");

        let tool_turn = &seen[1][4];
        assert_eq!(tool_turn.role, Role::Tool);
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_turn.content, "1200");
    }

    #[tokio::test]
    async fn test_batch_executes_sequentially_in_llm_order() {
        let llm = Arc::new(StubTurn::scripted(vec![
            TurnOutcome::ToolCalls(vec![fare_call("call_1"), fare_call("call_2")]),
            TurnOutcome::Text("done".to_string()),
        ]));
        let tools = Arc::new(StubTools::new());
        tools.push_result(Ok(text_result("first", false))).await;
        tools.push_result(Ok(text_result("second", false))).await;

        let events = run_to_completion(llm.clone(), tools, "fares?", vec![]).await;

        // Each start/complete pair resolves before the next call begins.
        assert_eq!(
            tags(&events),
            vec![
                "thinking",
                "tool_start",
                "tool_complete",
                "tool_start",
                "tool_complete",
                "response",
                "done"
            ]
        );

        // Tool turns land in call order with matching ids.
        let seen = llm.seen.lock().await;
        let final_messages = seen.last().unwrap();
        let ids: Vec<_> = final_messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["call_1", "call_2"]);
    }

    #[tokio::test]
    async fn test_tool_error_result_continues_run() {
        let llm = Arc::new(StubTurn::scripted(vec![
            TurnOutcome::ToolCalls(vec![fare_call("call_1")]),
            TurnOutcome::Text("Sorry, that train was not found.".to_string()),
        ]));
        let tools = Arc::new(StubTools::new());
        tools
            .push_result(Ok(text_result("unknown train number", true)))
            .await;

        let events = run_to_completion(llm.clone(), tools, "fare?", vec![]).await;

        assert_eq!(
            tags(&events),
            vec!["thinking", "tool_start", "tool_error", "response", "done"]
        );

        // The error text is fed back so the model can react.
        let seen = llm.seen.lock().await;
        let tool_turn = seen.last().unwrap().last().unwrap();
        assert_eq!(tool_turn.role, Role::Tool);
        assert_eq!(tool_turn.content, "unknown train number");
    }

    #[tokio::test]
    async fn test_tool_transport_failure_appends_synthetic_turn() {
        let llm = Arc::new(StubTurn::scripted(vec![
            TurnOutcome::ToolCalls(vec![fare_call("call_1")]),
            TurnOutcome::Text("done".to_string()),
        ]));
        let tools = Arc::new(StubTools::new());
        tools
            .push_result(Err(McpError::TransportError {
                reason: "connection reset".into(),
            }))
            .await;

        let events = run_to_completion(llm.clone(), tools, "fare?", vec![]).await;

        assert_eq!(
            tags(&events),
            vec!["thinking", "tool_start", "tool_error", "response", "done"]
        );
        match &events[2] {
            OrchestratorEvent::ToolError { result, .. } => {
                assert!(result.starts_with("Tool execution failed:"));
            }
            other => panic!("expected tool_error, got {other:?}"),
        }

        // The model still receives a turn for the call it made.
        let seen = llm.seen.lock().await;
        let tool_turn = seen.last().unwrap().last().unwrap();
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_turn.content.starts_with("Tool execution failed:"));
    }

    #[tokio::test]
    async fn test_llm_failure_terminates_without_done() {
        let llm = Arc::new(StubTurn::scripted(vec![TurnOutcome::Failed {
            message: "rate limited".to_string(),
        }]));
        let tools = Arc::new(StubTools::new());

        let events = run_to_completion(llm, tools, "fare?", vec![]).await;

        assert_eq!(tags(&events), vec!["thinking", "error"]);
        match &events[1] {
            OrchestratorEvent::Error { text } => assert_eq!(text, "AI error: rate limited"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handshake_failure_yields_single_error() {
        let llm = Arc::new(StubTurn::scripted(vec![]));
        let tools = Arc::new(StubTools::failing_handshake());

        let events = run_to_completion(llm.clone(), tools, "fare?", vec![]).await;

        assert_eq!(tags(&events), vec!["thinking", "error"]);
        match &events[1] {
            OrchestratorEvent::Error { text } => {
                assert!(text.starts_with("An error occurred:"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        // The LLM was never consulted.
        assert_eq!(llm.turn_count().await, 0);
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let llm = Arc::new(StubTurn::always_tool_calls());
        let tools = Arc::new(StubTools::new());

        let events = run_to_completion(llm.clone(), tools, "loop forever", vec![]).await;

        assert_eq!(llm.turn_count().await, MAX_TOOL_ITERATIONS);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, OrchestratorEvent::ToolStart { .. }))
                .count(),
            MAX_TOOL_ITERATIONS
        );

        let last = events.last().unwrap();
        match last {
            OrchestratorEvent::Error { text } => {
                assert!(text.contains("Maximum tool iterations reached"));
            }
            other => panic!("expected error terminal, got {other:?}"),
        }
        assert!(!events.iter().any(|e| matches!(e, OrchestratorEvent::Done)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, OrchestratorEvent::Response { .. })));
    }

    #[tokio::test]
    async fn test_terminal_event_invariants() {
        // Success run: exactly one response, immediately followed by the
        // final done; no error.
        let llm = Arc::new(StubTurn::scripted(vec![TurnOutcome::Text(
            "hello".to_string(),
        )]));
        let events =
            run_to_completion(llm, Arc::new(StubTools::new()), "hi", vec![]).await;

        let tag_list = tags(&events);
        assert_eq!(
            tag_list.iter().filter(|t| **t == "response").count(),
            1
        );
        assert_eq!(tag_list.iter().filter(|t| **t == "error").count(), 0);
        assert_eq!(tag_list.last(), Some(&"done"));
        let response_pos = tag_list.iter().position(|t| *t == "response").unwrap();
        assert_eq!(tag_list[response_pos + 1], "done");
    }
}
