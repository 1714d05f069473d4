// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent plumbing: driver stream consumption, role prompts, and output
//! parsing.
//!
//! The consumer loop translates each driver message into a trace event
//! and converts the terminal result into the agent's structured output.
//! Stream end without a terminal message is a driver failure.

use crate::error::OrchestratorError;
use crate::recorder::EventRecorder;
use amelia_adapters::{Driver, DriverMessage, DriverRequest};
use amelia_core::{
    AgentRole, Clock, EventDraft, EventType, IdGen, Issue, PlanArtifact, PlanOutput, ReviewVerdict,
    TokenUsage, WorkflowId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DRIVER_CHANNEL_CAPACITY: usize = 64;

pub(crate) const ARCHITECT_SYSTEM_PROMPT: &str = "You are the Architect. Analyze the issue and \
    produce an implementation plan as markdown. Respond with a single JSON object: \
    {\"goal\": string, \"markdown_content\": string, \"key_files\": [string]}.";

pub(crate) const DEVELOPER_SYSTEM_PROMPT: &str = "You are the Developer. Execute the approved \
    plan using your filesystem tools. Finish with a short summary of the changes you made.";

pub(crate) const REVIEWER_SYSTEM_PROMPT: &str = "You are the Reviewer. Verify the changes meet \
    the plan. Respond with a single JSON object: {\"approved\": bool, \"feedback\": string}.";

/// Terminal result of one driver invocation.
#[derive(Debug, Clone)]
pub(crate) struct AgentOutcome {
    pub final_text: String,
    pub session_id: String,
    pub usage: TokenUsage,
}

/// Consume one driver run, emitting each message as a trace event.
///
/// Tool results are only surfaced when `stream_tool_results` is set;
/// the calls themselves always are.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_driver<D: Driver, C: Clock, G: IdGen>(
    role: AgentRole,
    driver: &D,
    recorder: &EventRecorder<C, G>,
    workflow_id: &WorkflowId,
    request: DriverRequest,
    stream_tool_results: bool,
    cancel: &CancellationToken,
) -> Result<AgentOutcome, OrchestratorError> {
    let (tx, mut rx) = mpsc::channel(DRIVER_CHANNEL_CAPACITY);
    let driver_task = {
        let driver = driver.clone();
        let request = request.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { driver.run(request, tx, cancel).await })
    };

    let mut outcome = None;
    while let Some(message) = rx.recv().await {
        match message {
            DriverMessage::Thinking { content } => {
                let draft = EventDraft::new(
                    workflow_id.clone(),
                    role,
                    EventType::ClaudeThinking,
                    content,
                );
                recorder.record(draft).await?;
            }
            DriverMessage::ToolCall {
                id,
                tool_name,
                tool_input,
            } => {
                let draft = EventDraft::new(
                    workflow_id.clone(),
                    role,
                    EventType::ClaudeToolCall,
                    tool_name.clone(),
                )
                .with_tool(tool_name, Some(tool_input))
                .with_correlation(id.as_str());
                recorder.record(draft).await?;
            }
            DriverMessage::ToolResult {
                call_id,
                output,
                is_error,
            } => {
                if !stream_tool_results {
                    continue;
                }
                let mut draft = EventDraft::new(
                    workflow_id.clone(),
                    role,
                    EventType::ClaudeToolResult,
                    output,
                )
                .with_correlation(call_id.as_str());
                if is_error {
                    draft = draft.with_error();
                }
                recorder.record(draft).await?;
            }
            DriverMessage::Output { content } => {
                let draft =
                    EventDraft::new(workflow_id.clone(), role, EventType::AgentOutput, content);
                recorder.record(draft).await?;
            }
            DriverMessage::Result {
                session_id,
                final_text,
                usage,
            } => {
                outcome = Some(AgentOutcome {
                    final_text,
                    session_id,
                    usage: usage.unwrap_or_default(),
                });
                break;
            }
            DriverMessage::Error { reason } => {
                rx.close();
                driver_task.abort();
                if cancel.is_cancelled() {
                    return Err(OrchestratorError::Cancelled);
                }
                return Err(driver_failure(recorder, workflow_id, role, reason).await);
            }
        }
    }

    // Surface a driver-side failure even when the stream produced no
    // terminal message.
    match driver_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            return Err(driver_failure(recorder, workflow_id, role, e.to_string()).await);
        }
        Err(join_err) if !join_err.is_cancelled() => {
            return Err(
                driver_failure(recorder, workflow_id, role, join_err.to_string()).await,
            );
        }
        Err(_) => {}
    }

    match outcome {
        Some(outcome) => Ok(outcome),
        None => {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            Err(driver_failure(
                recorder,
                workflow_id,
                role,
                "unterminated stream".to_string(),
            )
            .await)
        }
    }
}

/// Emit the failure event (best-effort) and build the error.
async fn driver_failure<C: Clock, G: IdGen>(
    recorder: &EventRecorder<C, G>,
    workflow_id: &WorkflowId,
    role: AgentRole,
    reason: String,
) -> OrchestratorError {
    let draft = EventDraft::new(
        workflow_id.clone(),
        role,
        EventType::SystemError,
        reason.clone(),
    )
    .with_error();
    if let Err(e) = recorder.record(draft).await {
        tracing::warn!(error = %e, "failed to record driver failure event");
    }
    OrchestratorError::Driver(reason)
}

// -- prompts --

pub(crate) fn architect_prompt(issue: &Issue, conversation: &[String]) -> String {
    let mut prompt = format!(
        "Issue {}: {}\n\n{}\n\nProduce an implementation plan for this issue.",
        issue.id, issue.title, issue.description
    );
    for turn in conversation {
        prompt.push_str("\n\n");
        prompt.push_str(turn);
    }
    prompt
}

pub(crate) fn developer_prompt(
    issue: &Issue,
    plan: &PlanArtifact,
    conversation: &[String],
) -> String {
    let mut prompt = format!(
        "Issue {}: {}\n\nApproved plan ({}):\n\n{}\n\nExecute the plan.",
        issue.id,
        issue.title,
        plan.path.display(),
        plan.content
    );
    for turn in conversation {
        prompt.push_str("\n\n");
        prompt.push_str(turn);
    }
    prompt
}

pub(crate) fn review_only_prompt(issue: &Issue) -> String {
    format!(
        "Issue {}: {}\n\n{}\n\nReview the changes in the working tree against this issue.",
        issue.id, issue.title, issue.description
    )
}

pub(crate) fn reviewer_prompt(issue: &Issue, plan: &PlanArtifact) -> String {
    format!(
        "Issue {}: {}\n\nPlan ({}):\n\n{}\n\nVerify the changes in the working tree meet the plan.",
        issue.id,
        issue.title,
        plan.path.display(),
        plan.content
    )
}

// -- output parsing --

/// Pull a JSON object out of a terminal message, tolerating fenced
/// blocks and surrounding prose.
fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

pub(crate) fn parse_plan_output(final_text: &str) -> Result<PlanOutput, String> {
    serde_json::from_str(extract_json(final_text))
        .map_err(|e| format!("malformed architect output: {e}"))
}

pub(crate) fn parse_review_verdict(final_text: &str) -> Result<ReviewVerdict, String> {
    serde_json::from_str(extract_json(final_text))
        .map_err(|e| format!("malformed reviewer output: {e}"))
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
