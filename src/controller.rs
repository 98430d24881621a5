//! Chat controller
//!
//! Owns the transcript, the status bar, the input field and the busy flag.
//! Network access goes through [`ChatBackend`], drawing through
//! [`RenderTarget`] and delayed status checks through [`Scheduler`], so the
//! whole flow runs against test doubles.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{BackendStatus, ChatBackend, ChatReply};
use crate::config::PollPolicy;
use crate::error::ChatError;
use crate::render::RenderTarget;
use crate::state::{
    CharCount, ChatMessage, EntryKind, InputField, RenderedEntry, StatusBar, StatusKind,
    SYSTEM_TIME_LABEL,
};

/// Arranges for a status check to run after `delay`.
pub trait Scheduler: Send + Sync {
    fn schedule_status_check(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetRequest {
    Cleared,
    ConfirmationRequired,
}

pub struct ChatController<R: RenderTarget> {
    backend: Arc<dyn ChatBackend>,
    scheduler: Arc<dyn Scheduler>,
    target: R,
    policy: PollPolicy,
    greeting: String,

    transcript: Vec<ChatMessage>,
    status: StatusBar,
    device_label: Option<String>,
    model_name: Option<String>,
    input: InputField,

    busy: bool,
    status_in_flight: bool,
    not_ready_streak: u32,
    /// Bumped by every reset; a reply from an older generation is dropped.
    generation: u64,
    submit_generation: u64,
}

fn now_label() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

impl<R: RenderTarget> ChatController<R> {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        scheduler: Arc<dyn Scheduler>,
        target: R,
        policy: PollPolicy,
        greeting: impl Into<String>,
    ) -> Self {
        let mut controller = Self {
            backend,
            scheduler,
            target,
            policy,
            greeting: greeting.into(),
            transcript: Vec::new(),
            status: StatusBar::new(StatusKind::Checking, "Checking model..."),
            device_label: None,
            model_name: None,
            input: InputField::default(),
            busy: false,
            status_in_flight: false,
            not_ready_streak: 0,
            generation: 0,
            submit_generation: 0,
        };
        controller.show_greeting();
        controller
    }

    pub fn backend(&self) -> Arc<dyn ChatBackend> {
        Arc::clone(&self.backend)
    }

    pub fn target(&self) -> &R {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut R {
        &mut self.target
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn status(&self) -> &StatusBar {
        &self.status
    }

    pub fn device_label(&self) -> Option<&str> {
        self.device_label.as_deref()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn input(&self) -> &InputField {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputField {
        &mut self.input
    }

    pub fn char_count(&self) -> CharCount {
        CharCount::of(&self.input.text)
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_checking_status(&self) -> bool {
        self.status_in_flight
    }

    fn set_status(&mut self, kind: StatusKind, label: impl Into<String>) {
        self.status = StatusBar::new(kind, label);
    }

    fn render(&mut self, kind: EntryKind, content: impl Into<String>, time: String) {
        self.target.append(RenderedEntry {
            kind,
            content: content.into(),
            time,
        });
        self.target.scroll_to_bottom();
    }

    fn show_greeting(&mut self) {
        let greeting = self.greeting.clone();
        self.render(EntryKind::Bot, greeting.clone(), SYSTEM_TIME_LABEL.to_string());
        self.transcript.push(ChatMessage::assistant(greeting));
    }

    /// Focus the input unless a request is pending.
    pub fn focus_input(&mut self) {
        if !self.busy {
            self.input.focused = true;
        }
    }

    pub fn blur_input(&mut self) {
        self.input.focused = false;
    }

    // Status polling

    /// Mark a status check as started. Returns false if one is already running.
    pub fn begin_status_check(&mut self) -> bool {
        if self.status_in_flight {
            tracing::debug!("status check already in flight");
            return false;
        }
        self.status_in_flight = true;
        self.set_status(StatusKind::Checking, "Checking model...");
        true
    }

    pub fn finish_status_check(&mut self, result: Result<BackendStatus, ChatError>) {
        self.status_in_flight = false;

        match result {
            Ok(status) => {
                if let Some(device) = &status.device_info {
                    self.device_label = Some(device.label());
                }
                if status.model_name.is_some() {
                    self.model_name = status.model_name.clone();
                }

                if status.model_loaded {
                    self.not_ready_streak = 0;
                    tracing::info!(device = ?self.device_label, "model loaded");
                    self.set_status(StatusKind::Online, "Model loaded");
                } else {
                    self.not_ready_streak = self.not_ready_streak.saturating_add(1);
                    let delay = self.policy.not_ready_delay(self.not_ready_streak);
                    let label = status
                        .loading_status
                        .unwrap_or_else(|| "Loading model...".to_string());
                    tracing::info!(
                        status = %label,
                        retry_in_secs = delay.as_secs(),
                        "model not ready"
                    );
                    self.set_status(StatusKind::Loading, label);
                    self.scheduler.schedule_status_check(delay);
                }
            }
            Err(err) => {
                self.not_ready_streak = 0;
                tracing::warn!(error = %err, "status check failed");
                self.set_status(StatusKind::Offline, "Connection error");
            }
        }
    }

    pub async fn check_status(&mut self) {
        if !self.begin_status_check() {
            return;
        }
        let result = self.backend.status().await;
        self.finish_status_check(result);
    }

    // Submission

    /// Take the input for sending. `None` if it is blank or a request is pending.
    pub fn begin_submit(&mut self) -> Option<String> {
        let message = self.input.text.trim().to_string();
        if message.is_empty() || self.busy {
            return None;
        }

        self.render(EntryKind::User, message.clone(), now_label());
        self.transcript.push(ChatMessage::user(message.clone()));

        self.input.clear();
        self.busy = true;
        self.input.enabled = false;
        self.submit_generation = self.generation;

        tracing::info!(chars = message.chars().count(), "submitting message");
        Some(message)
    }

    pub fn finish_submit(&mut self, result: Result<ChatReply, ChatError>) {
        if self.submit_generation != self.generation {
            tracing::info!(ok = result.is_ok(), "dropping reply to a cleared conversation");
            self.settle_input();
            return;
        }

        match result {
            Ok(reply) => {
                self.render(EntryKind::Bot, reply.response.clone(), now_label());
                self.transcript.push(ChatMessage::assistant(reply.response));
                if let Some(model) = reply.model {
                    self.model_name = Some(model);
                }

                let label = match reply.device {
                    Some(device) => format!("Response generated ({device})"),
                    None => "Response generated".to_string(),
                };
                self.set_status(StatusKind::Online, label);
            }
            Err(err) => self.handle_error(err),
        }

        self.settle_input();
    }

    fn settle_input(&mut self) {
        self.busy = false;
        self.input.enabled = true;
        self.input.focused = true;
    }

    fn handle_error(&mut self, err: ChatError) {
        tracing::warn!(error = %err, "chat request failed");

        match &err {
            ChatError::ModelLoading(_) => self.set_status(StatusKind::Loading, "Loading model"),
            ChatError::Timeout(_) => self.set_status(StatusKind::Loading, "Timeout"),
            ChatError::Connection(_) | ChatError::Generic(_) => {
                self.set_status(StatusKind::Offline, "Error")
            }
        }
        if err.is_recoverable_by_polling() {
            self.scheduler
                .schedule_status_check(self.policy.loading_retry_delay);
        }

        self.render(EntryKind::Error, err.display_message(), now_label());
    }

    /// Send the current input and wait for the answer.
    /// Returns false when the submission was ignored.
    pub async fn submit(&mut self) -> bool {
        let Some(message) = self.begin_submit() else {
            return false;
        };
        let result = self.backend.chat(&message).await;
        self.finish_submit(result);
        true
    }

    // Reset

    pub fn needs_reset_confirmation(&self) -> bool {
        self.transcript.len() > 1
    }

    pub fn request_reset(&mut self) -> ResetRequest {
        if self.needs_reset_confirmation() {
            ResetRequest::ConfirmationRequired
        } else {
            self.confirm_reset();
            ResetRequest::Cleared
        }
    }

    /// Clear the conversation. A request still pending settles the input
    /// when it returns, but its reply is not shown.
    pub fn confirm_reset(&mut self) {
        tracing::info!(entries = self.transcript.len(), "clearing conversation");
        self.generation += 1;
        self.target.clear();
        self.transcript.clear();
        self.show_greeting();

        self.set_status(StatusKind::Online, "Chat cleared");
        self.focus_input();
        self.scheduler.schedule_status_check(self.policy.reset_delay);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::DeviceInfo;
    use crate::render::MessageList;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        statuses: Mutex<VecDeque<Result<BackendStatus, ChatError>>>,
        replies: Mutex<VecDeque<Result<ChatReply, ChatError>>>,
        pub(crate) sent: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub(crate) fn push_status(&self, status: Result<BackendStatus, ChatError>) {
            self.statuses.lock().unwrap().push_back(status);
        }

        pub(crate) fn push_reply(&self, reply: Result<ChatReply, ChatError>) {
            self.replies.lock().unwrap().push_back(reply);
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn status(&self) -> Result<BackendStatus, ChatError> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Connection("no scripted status".into())))
        }

        async fn chat(&self, message: &str) -> Result<ChatReply, ChatError> {
            self.sent.lock().unwrap().push(message.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Connection("no scripted reply".into())))
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingScheduler {
        pub(crate) delays: Mutex<Vec<Duration>>,
    }

    impl Scheduler for RecordingScheduler {
        fn schedule_status_check(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    type Harness = (
        ChatController<MessageList>,
        Arc<ScriptedBackend>,
        Arc<RecordingScheduler>,
    );

    fn harness() -> Harness {
        let backend = Arc::new(ScriptedBackend::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let controller = ChatController::new(
            backend.clone(),
            scheduler.clone(),
            MessageList::default(),
            PollPolicy::default(),
            "Hello!",
        );
        (controller, backend, scheduler)
    }

    fn reply(text: &str, device: Option<&str>) -> Result<ChatReply, ChatError> {
        Ok(ChatReply {
            response: text.to_string(),
            device: device.map(str::to_string),
            model: None,
        })
    }

    fn type_text(controller: &mut ChatController<MessageList>, text: &str) {
        for c in text.chars() {
            controller.input_mut().insert(c);
        }
    }

    fn kinds(controller: &ChatController<MessageList>) -> Vec<EntryKind> {
        controller.target().entries().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_starts_with_greeting_only() {
        let (controller, _, _) = harness();
        assert_eq!(controller.transcript(), &[ChatMessage::assistant("Hello!")]);
        let entries = controller.target().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time, "System");
        assert_eq!(controller.status().kind, StatusKind::Checking);
    }

    #[tokio::test]
    async fn test_successful_submit_adds_user_then_assistant() {
        let (mut controller, backend, _) = harness();
        backend.push_reply(reply("Hi, human", Some("GPU")));
        type_text(&mut controller, "  hello bot  ");

        assert!(controller.submit().await);

        assert_eq!(backend.sent.lock().unwrap().as_slice(), ["hello bot"]);
        assert_eq!(
            &controller.transcript()[1..],
            &[ChatMessage::user("hello bot"), ChatMessage::assistant("Hi, human")]
        );
        assert_eq!(kinds(&controller), [EntryKind::Bot, EntryKind::User, EntryKind::Bot]);
        assert_eq!(controller.status().kind, StatusKind::Online);
        assert_eq!(controller.status().label, "Response generated (GPU)");
        assert!(controller.input().text.is_empty());
    }

    #[test]
    fn test_begin_submit_renders_user_entry_immediately() {
        let (mut controller, _, _) = harness();
        type_text(&mut controller, "ping");

        assert_eq!(controller.begin_submit().as_deref(), Some("ping"));
        assert_eq!(controller.transcript().len(), 2);
        assert_eq!(controller.target().entries().len(), 2);
        assert!(controller.is_busy());
        assert!(!controller.input().enabled);
        assert_eq!(controller.char_count().count, 0);
    }

    #[test]
    fn test_submit_while_busy_is_ignored() {
        let (mut controller, _, _) = harness();
        type_text(&mut controller, "first");
        controller.begin_submit().unwrap();

        type_text(&mut controller, "second");
        assert_eq!(controller.begin_submit(), None);
        assert_eq!(controller.transcript().len(), 2);
        assert_eq!(controller.target().entries().len(), 2);
    }

    #[tokio::test]
    async fn test_whitespace_submit_is_ignored() {
        let (mut controller, backend, _) = harness();
        type_text(&mut controller, "   \t ");

        assert!(!controller.submit().await);
        assert!(backend.sent.lock().unwrap().is_empty());
        assert_eq!(controller.transcript().len(), 1);
        assert_eq!(controller.target().entries().len(), 1);
    }

    #[tokio::test]
    async fn test_input_is_reenabled_and_focused_after_every_outcome() {
        let outcomes = vec![
            reply("ok", None),
            Err(ChatError::Connection("refused".into())),
            Err(ChatError::ModelLoading("loading".into())),
            Err(ChatError::Timeout("slow".into())),
            Err(ChatError::Generic("nope".into())),
        ];

        for outcome in outcomes {
            let (mut controller, backend, _) = harness();
            backend.push_reply(outcome);
            controller.blur_input();
            type_text(&mut controller, "hello");

            assert!(controller.submit().await);
            assert!(!controller.is_busy());
            assert!(controller.input().enabled);
            assert!(controller.input().focused);
        }
    }

    #[tokio::test]
    async fn test_failure_renders_error_entry_not_assistant() {
        let (mut controller, backend, scheduler) = harness();
        backend.push_reply(Err(ChatError::Generic("Internal error: boom".into())));
        type_text(&mut controller, "hello");

        controller.submit().await;

        assert_eq!(controller.transcript().len(), 2);
        assert_eq!(kinds(&controller), [EntryKind::Bot, EntryKind::User, EntryKind::Error]);
        assert_eq!(controller.target().entries()[2].content, "Internal error: boom");
        assert_eq!(controller.status(), &StatusBar::new(StatusKind::Offline, "Error"));
        assert!(scheduler.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_loading_schedules_one_recheck_within_ten_seconds() {
        let (mut controller, backend, scheduler) = harness();
        backend.push_reply(Err(ChatError::ModelLoading("Model not loaded yet".into())));
        type_text(&mut controller, "hello");

        controller.submit().await;

        assert_eq!(controller.status().kind, StatusKind::Loading);
        let delays = scheduler.delays.lock().unwrap();
        assert_eq!(delays.len(), 1);
        assert!(delays[0] <= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_is_loading_without_recheck() {
        let (mut controller, backend, scheduler) = harness();
        backend.push_reply(Err(ChatError::Timeout("408".into())));
        type_text(&mut controller, "hello");

        controller.submit().await;

        assert_eq!(controller.status(), &StatusBar::new(StatusKind::Loading, "Timeout"));
        assert!(scheduler.delays.lock().unwrap().is_empty());
        assert!(controller.target().entries()[2].content.starts_with("Timeout"));
    }

    #[tokio::test]
    async fn test_status_online_records_device() {
        let (mut controller, backend, scheduler) = harness();
        backend.push_status(Ok(BackendStatus {
            model_loaded: true,
            device_info: Some(DeviceInfo {
                cuda_available: true,
                gpu_name: Some("A100".into()),
            }),
            model_name: Some("microsoft/DialoGPT-medium".into()),
            ..BackendStatus::default()
        }));

        controller.check_status().await;

        assert_eq!(controller.status(), &StatusBar::new(StatusKind::Online, "Model loaded"));
        assert_eq!(controller.device_label(), Some("GPU (A100)"));
        assert_eq!(controller.model_name(), Some("microsoft/DialoGPT-medium"));
        assert!(scheduler.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_polls_with_capped_backoff() {
        let (mut controller, backend, scheduler) = harness();
        for _ in 0..6 {
            backend.push_status(Ok(BackendStatus {
                loading_status: Some("Downloading model...".into()),
                ..BackendStatus::default()
            }));
        }

        for _ in 0..6 {
            controller.check_status().await;
        }

        assert_eq!(controller.status().label, "Downloading model...");
        let secs: Vec<u64> = scheduler
            .delays
            .lock()
            .unwrap()
            .iter()
            .map(Duration::as_secs)
            .collect();
        assert_eq!(secs, [5, 10, 20, 40, 60, 60]);
    }

    #[tokio::test]
    async fn test_backoff_restarts_after_model_loads() {
        let (mut controller, backend, scheduler) = harness();
        backend.push_status(Ok(BackendStatus::default()));
        backend.push_status(Ok(BackendStatus::default()));
        backend.push_status(Ok(BackendStatus {
            model_loaded: true,
            ..BackendStatus::default()
        }));
        backend.push_status(Ok(BackendStatus::default()));

        for _ in 0..4 {
            controller.check_status().await;
        }

        let delays = scheduler.delays.lock().unwrap();
        assert_eq!(delays.as_slice(), [5, 10, 5].map(Duration::from_secs));
        assert_eq!(controller.status().label, "Loading model...");
    }

    #[tokio::test]
    async fn test_status_connection_failure_goes_offline_without_polling() {
        let (mut controller, backend, scheduler) = harness();
        backend.push_status(Err(ChatError::Connection("refused".into())));

        controller.check_status().await;

        assert_eq!(controller.status(), &StatusBar::new(StatusKind::Offline, "Connection error"));
        assert!(scheduler.delays.lock().unwrap().is_empty());
        assert!(!controller.is_checking_status());
    }

    #[test]
    fn test_overlapping_status_checks_are_collapsed() {
        let (mut controller, _, _) = harness();
        assert!(controller.begin_status_check());
        assert!(!controller.begin_status_check());
        controller.finish_status_check(Ok(BackendStatus {
            model_loaded: true,
            ..BackendStatus::default()
        }));
        assert!(controller.begin_status_check());
    }

    #[test]
    fn test_status_settles_independently_of_pending_submit() {
        let (mut controller, _, _) = harness();
        type_text(&mut controller, "hello");
        controller.begin_submit().unwrap();

        controller.begin_status_check();
        controller.finish_status_check(Ok(BackendStatus {
            model_loaded: true,
            ..BackendStatus::default()
        }));

        assert!(controller.is_busy());
        assert_eq!(controller.status().kind, StatusKind::Online);
    }

    #[test]
    fn test_reset_with_only_greeting_needs_no_confirmation() {
        let (mut controller, _, scheduler) = harness();
        assert_eq!(controller.request_reset(), ResetRequest::Cleared);
        assert_eq!(controller.transcript().len(), 1);
        assert_eq!(controller.status().label, "Chat cleared");
        assert_eq!(
            scheduler.delays.lock().unwrap().as_slice(),
            [Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_reset_with_history_requires_confirmation() {
        let (mut controller, backend, scheduler) = harness();
        backend.push_reply(reply("hi", None));
        type_text(&mut controller, "hello");
        controller.submit().await;

        assert_eq!(controller.request_reset(), ResetRequest::ConfirmationRequired);
        assert_eq!(controller.transcript().len(), 3);
        assert!(scheduler.delays.lock().unwrap().is_empty());

        controller.confirm_reset();
        assert_eq!(controller.transcript(), &[ChatMessage::assistant("Hello!")]);
        assert_eq!(controller.target().entries().len(), 1);
        assert_eq!(scheduler.delays.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_focus_is_refused_while_busy() {
        let (mut controller, _, _) = harness();
        type_text(&mut controller, "hello");
        controller.begin_submit().unwrap();
        controller.blur_input();
        controller.focus_input();
        assert!(!controller.input().focused);
    }

    #[tokio::test]
    async fn test_reply_model_is_shown_in_header() {
        let (mut controller, backend, _) = harness();
        backend.push_reply(Ok(ChatReply {
            response: "hi".into(),
            device: None,
            model: Some("microsoft/DialoGPT-medium (Local)".into()),
        }));
        type_text(&mut controller, "hello");

        controller.submit().await;

        assert_eq!(controller.model_name(), Some("microsoft/DialoGPT-medium (Local)"));
    }

    #[test]
    fn test_reply_after_reset_is_dropped() {
        let (mut controller, _, _) = harness();
        type_text(&mut controller, "hello");
        controller.begin_submit().unwrap();

        controller.confirm_reset();
        controller.finish_submit(reply("late answer", None));

        assert_eq!(controller.transcript(), &[ChatMessage::assistant("Hello!")]);
        assert_eq!(kinds(&controller), [EntryKind::Bot]);
        assert_eq!(controller.status().label, "Chat cleared");
        assert!(!controller.is_busy());
        assert!(controller.input().enabled);
        assert!(controller.input().focused);
    }

    #[test]
    fn test_error_after_reset_is_dropped() {
        let (mut controller, _, scheduler) = harness();
        type_text(&mut controller, "hello");
        controller.begin_submit().unwrap();

        controller.confirm_reset();
        controller.finish_submit(Err(ChatError::ModelLoading("loading".into())));

        assert_eq!(kinds(&controller), [EntryKind::Bot]);
        // Only the reset re-check
        assert_eq!(
            scheduler.delays.lock().unwrap().as_slice(),
            [Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_submit_after_reset_is_shown_normally() {
        let (mut controller, backend, _) = harness();
        controller.confirm_reset();
        backend.push_reply(reply("fresh", None));
        type_text(&mut controller, "hello");

        controller.submit().await;

        assert_eq!(kinds(&controller), [EntryKind::Bot, EntryKind::User, EntryKind::Bot]);
        assert_eq!(controller.transcript().len(), 3);
    }

    #[test]
    fn test_every_render_requests_a_scroll() {
        let (mut controller, _, _) = harness();
        controller.target_mut().tick(std::time::Instant::now() + crate::render::SCROLL_SETTLE);
        assert!(!controller.target().has_pending_scroll());
        type_text(&mut controller, "ping");
        controller.begin_submit().unwrap();
        assert!(controller.target().has_pending_scroll());
    }
}
