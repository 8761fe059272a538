//! Built-in approval handlers.
//!
//! - [`AutoDenyHandler`]: the engine default; nothing risky runs unattended
//! - [`AutoApproveHandler`]: for tests and trusted batch jobs
//! - [`CallbackApprovalHandler`]: wraps an async closure (webhooks, chat bots)
//! - [`ConsoleApprovalHandler`]: asks a human on stdin

use std::{
    future::Future,
    sync::{Arc, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, warn};

use warden_contracts::{
    approval::{ApprovalRequest, ApprovalResponse, TimeoutOutcome},
    error::{WardenError, WardenResult},
};

use crate::traits::ApprovalHandler;

/// Denies every request immediately.
#[derive(Debug, Clone)]
pub struct AutoDenyHandler {
    note: String,
}

impl AutoDenyHandler {
    pub fn new() -> Self {
        Self { note: "no approval handler configured".to_string() }
    }

    pub fn with_note(note: impl Into<String>) -> Self {
        Self { note: note.into() }
    }
}

impl Default for AutoDenyHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalHandler for AutoDenyHandler {
    fn name(&self) -> &str {
        "auto_deny"
    }

    async fn request(&self, _request: &ApprovalRequest, _timeout: Duration) -> WardenResult<ApprovalResponse> {
        Ok(ApprovalResponse::deny("auto_deny", Utc::now()).with_note(self.note.clone()))
    }
}

/// Approves every request immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApproveHandler;

#[async_trait]
impl ApprovalHandler for AutoApproveHandler {
    fn name(&self) -> &str {
        "auto_approve"
    }

    async fn request(&self, request: &ApprovalRequest, _timeout: Duration) -> WardenResult<ApprovalResponse> {
        warn!(
            call_id = %request.call_context.call_id,
            function = %request.call_context.function_name,
            "auto-approving call that required approval"
        );
        Ok(ApprovalResponse::approve("auto_approve", Utc::now()))
    }

    fn timeout_outcome(&self) -> TimeoutOutcome {
        TimeoutOutcome::Approve
    }
}

type Callback = dyn Fn(ApprovalRequest) -> BoxFuture<'static, WardenResult<ApprovalResponse>> + Send + Sync;
type Notify = dyn Fn(&ApprovalRequest, &ApprovalResponse) + Send + Sync;

/// Delegates the verdict to a user-supplied async closure.
///
/// Optional notifiers run once the verdict is known, e.g. to post the
/// result back to the channel the request came from.
#[derive(Clone)]
pub struct CallbackApprovalHandler {
    callback: Arc<Callback>,
    on_timeout: TimeoutOutcome,
    approved: Option<Arc<Notify>>,
    denied: Option<Arc<Notify>>,
}

impl CallbackApprovalHandler {
    /// The closure receives an owned copy of the request and resolves to a
    /// full response.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(ApprovalRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WardenResult<ApprovalResponse>> + Send + 'static,
    {
        Self {
            callback: Arc::new(
                move |request: ApprovalRequest| -> BoxFuture<'static, WardenResult<ApprovalResponse>> {
                    Box::pin(callback(request))
                },
            ),
            on_timeout: TimeoutOutcome::Deny,
            approved: None,
            denied: None,
        }
    }

    /// The closure answers yes or no; the approver is recorded as `callback`.
    pub fn from_predicate<F>(predicate: F) -> Self
    where
        F: Fn(&ApprovalRequest) -> bool + Send + Sync + 'static,
    {
        Self::new(move |request: ApprovalRequest| {
            let approved = predicate(&request);
            async move {
                let now = Utc::now();
                Ok(if approved {
                    ApprovalResponse::approve("callback", now)
                } else {
                    ApprovalResponse::deny("callback", now)
                })
            }
        })
    }

    pub fn with_timeout_outcome(mut self, outcome: TimeoutOutcome) -> Self {
        self.on_timeout = outcome;
        self
    }

    pub fn notify_approved<F>(mut self, notify: F) -> Self
    where
        F: Fn(&ApprovalRequest, &ApprovalResponse) + Send + Sync + 'static,
    {
        self.approved = Some(Arc::new(notify));
        self
    }

    pub fn notify_denied<F>(mut self, notify: F) -> Self
    where
        F: Fn(&ApprovalRequest, &ApprovalResponse) + Send + Sync + 'static,
    {
        self.denied = Some(Arc::new(notify));
        self
    }
}

impl std::fmt::Debug for CallbackApprovalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackApprovalHandler")
            .field("on_timeout", &self.on_timeout)
            .field("notify_approved", &self.approved.is_some())
            .field("notify_denied", &self.denied.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ApprovalHandler for CallbackApprovalHandler {
    fn name(&self) -> &str {
        "callback"
    }

    async fn request(&self, request: &ApprovalRequest, _timeout: Duration) -> WardenResult<ApprovalResponse> {
        (self.callback)(request.clone()).await
    }

    fn timeout_outcome(&self) -> TimeoutOutcome {
        self.on_timeout
    }

    async fn on_approved(&self, request: &ApprovalRequest, response: &ApprovalResponse) {
        if let Some(notify) = &self.approved {
            notify(request, response);
        }
    }

    async fn on_denied(&self, request: &ApprovalRequest, response: &ApprovalResponse) {
        if let Some(notify) = &self.denied {
            notify(request, response);
        }
    }
}

type Input = Box<dyn AsyncRead + Send + Unpin>;

/// Prompts on stdout and reads a single line from stdin.
///
/// `y`, `yes`, `approve` and `ok` approve; anything else, including EOF,
/// denies.
///
/// One background task owns the input for the handler's whole life and
/// forwards lines over a channel, so a prompt abandoned by a timeout never
/// leaves a read behind that swallows the next answer. Lines typed while no
/// prompt is open are discarded when the next prompt starts.
pub struct ConsoleApprovalHandler {
    on_timeout: TimeoutOutcome,
    input: std::sync::Mutex<Option<Input>>,
    answers: tokio::sync::Mutex<Option<mpsc::Receiver<String>>>,
}

impl ConsoleApprovalHandler {
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    /// Read answers from `reader` instead of stdin.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            on_timeout: TimeoutOutcome::default(),
            input: std::sync::Mutex::new(Some(Box::new(reader))),
            answers: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_timeout_outcome(mut self, outcome: TimeoutOutcome) -> Self {
        self.on_timeout = outcome;
        self
    }

    /// Started on first use so the handler can be built outside a runtime.
    fn spawn_reader(input: Input) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(input).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "console approval input failed");
                        break;
                    }
                }
            }
        });
        rx
    }

    fn prompt(&self, request: &ApprovalRequest, timeout: Duration) -> String {
        let ctx = &request.call_context;
        let arguments = serde_json::to_string(&ctx.arguments).unwrap_or_default();
        format!(
            "\n=== APPROVAL REQUIRED ===\n\
             function : {}\n\
             agent    : {}\n\
             arguments: {}\n\
             risk     : {:.2}\n\
             reason   : {}\n\
             Approve? [y/N] (auto-{} in {}s): ",
            ctx.function_name,
            ctx.agent(),
            arguments,
            request.decision.risk_score,
            request.reason(),
            match self.on_timeout {
                TimeoutOutcome::Approve => "approve",
                TimeoutOutcome::Deny => "deny",
            },
            timeout.as_secs(),
        )
    }

    fn is_affirmative(answer: &str) -> bool {
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "approve" | "ok")
    }
}

impl Default for ConsoleApprovalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsoleApprovalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleApprovalHandler")
            .field("on_timeout", &self.on_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ApprovalHandler for ConsoleApprovalHandler {
    fn name(&self) -> &str {
        "console"
    }

    async fn request(&self, request: &ApprovalRequest, timeout: Duration) -> WardenResult<ApprovalResponse> {
        let io_err = |e: std::io::Error| WardenError::ApprovalHandler { reason: format!("console I/O failed: {e}") };

        // One prompt at a time.
        let mut answers = self.answers.lock().await;
        if answers.is_none() {
            let input = self.input.lock().unwrap_or_else(PoisonError::into_inner).take();
            *answers = input.map(Self::spawn_reader);
        }
        let Some(receiver) = answers.as_mut() else {
            return Err(WardenError::ApprovalHandler { reason: "console input is unavailable".to_string() });
        };
        while let Ok(stale) = receiver.try_recv() {
            debug!(answer = %stale, "discarding console input typed before the prompt");
        }

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(self.prompt(request, timeout).as_bytes())
            .await
            .map_err(io_err)?;
        stdout.flush().await.map_err(io_err)?;

        let answer = receiver.recv().await.unwrap_or_default();

        let now = Utc::now();
        Ok(if Self::is_affirmative(&answer) {
            ApprovalResponse::approve("console", now)
        } else {
            ApprovalResponse::deny("console", now)
        })
    }

    fn timeout_outcome(&self) -> TimeoutOutcome {
        self.on_timeout
    }
}

#[cfg(test)]
mod tests {
    use warden_contracts::{context::CallContext, decision::Decision};

    use super::*;

    fn request(function: &str) -> ApprovalRequest {
        ApprovalRequest::new(
            CallContext::new(function),
            Decision::require_approval("deletion", "deleting 'q3-report' requires approval"),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn auto_handlers_answer_immediately() {
        let deny = AutoDenyHandler::new()
            .request(&request("delete_file"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!deny.approved);
        assert!(deny.note.is_some());

        let approve = AutoApproveHandler
            .request(&request("delete_file"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(approve.approved);
    }

    #[tokio::test]
    async fn predicate_callback_sees_request() {
        let handler = CallbackApprovalHandler::from_predicate(|req| req.call_context.function_name == "delete_file");

        let yes = handler.request(&request("delete_file"), Duration::from_secs(1)).await.unwrap();
        assert!(yes.approved);
        assert_eq!(yes.approver, "callback");

        let no = handler.request(&request("wipe_disk"), Duration::from_secs(1)).await.unwrap();
        assert!(!no.approved);
    }

    #[tokio::test]
    async fn async_callback_can_attach_note() {
        let handler = CallbackApprovalHandler::new(|req: ApprovalRequest| async move {
            Ok(ApprovalResponse::deny("slack:@oncall", Utc::now()).with_note(format!("no to {}", req.call_context.function_name)))
        })
        .with_timeout_outcome(TimeoutOutcome::Approve);

        let response = handler.request(&request("delete_file"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(response.note.as_deref(), Some("no to delete_file"));
        assert_eq!(handler.timeout_outcome(), TimeoutOutcome::Approve);
    }

    #[tokio::test]
    async fn console_answer_after_a_timed_out_prompt_reaches_the_next_prompt() {
        let (mut operator, input) = tokio::io::duplex(64);
        let handler = ConsoleApprovalHandler::from_reader(input);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), handler.request(&request("delete_file"), Duration::from_secs(1)))
                .await;
        assert!(abandoned.is_err());

        let answer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            operator.write_all(b"y\n").await.unwrap();
            operator
        });
        let response = handler.request(&request("delete_file"), Duration::from_secs(1)).await.unwrap();
        assert!(response.approved);
        assert_eq!(response.approver, "console");
        drop(answer.await.unwrap());
    }

    #[tokio::test]
    async fn console_eof_denies() {
        let handler = ConsoleApprovalHandler::from_reader(tokio::io::empty());
        let response = handler.request(&request("delete_file"), Duration::from_secs(1)).await.unwrap();
        assert!(!response.approved);
    }

    #[test]
    fn console_answers_are_case_insensitive() {
        for yes in ["y", "YES", " approve\n", "Ok"] {
            assert!(ConsoleApprovalHandler::is_affirmative(yes), "{yes:?}");
        }
        for no in ["", "n", "nope", "yes please"] {
            assert!(!ConsoleApprovalHandler::is_affirmative(no), "{no:?}");
        }
    }
}
