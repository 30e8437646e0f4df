//! the conversation state machine.
//!
//! the engine never performs io. whenever a collaborator is needed it
//! returns a [`RemoteCall`] for the host to run, and the host reports the
//! outcome through [`ConversationEngine::complete`]. at most one call is in
//! flight; sends that arrive meanwhile wait in a bounded queue and are
//! replayed in order once the call settles.
//!
//! ```text
//! Connecting --status--> AwaitingConsent --"no"/"nah"--> ChatReady
//!                    \                  \--other-------> InQuiz
//!                     \--taken--> ChatReady --"retake"--> InQuiz
//! InQuiz --last answer--> (scoring) --> ChatReady
//! ```

use crate::catalog::QuizCatalog;
use crate::config::{ConversationConfig, ScoringMode};
use crate::identity::IdentityProvider;
use crate::remote::{RemoteCall, RemoteError, RemoteReply, RemoteRequest, RequestId};
use crate::scorer::{AxisScores, BiasLabel};
use crate::text::{self, ControlWord, Stance};
use bevy::log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self { role: Role::Bot, content: content.into() }
    }
}

/// display-ordered message log. entries are never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History(Vec<Message>);

impl History {
    fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.0
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    /// entries appended at or after `start`.
    pub fn since(&self, start: usize) -> &[Message] {
        self.0.get(start..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// waiting on the initial status check
    Connecting,
    AwaitingConsent,
    /// answering questions, or waiting for the remote score
    InQuiz,
    ChatReady,
}

/// one live quiz attempt. the current question index is the number of
/// answers recorded so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    answers: Vec<String>,
    scores: AxisScores,
}

impl QuizSession {
    fn new(catalog: &QuizCatalog) -> Self {
        Self {
            answers: Vec::with_capacity(catalog.len()),
            scores: AxisScores::for_catalog(catalog),
        }
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn current_index(&self) -> usize {
        self.answers.len()
    }

    pub fn scores(&self) -> &AxisScores {
        &self.scores
    }

    fn record(&mut self, catalog: &QuizCatalog, answer: String, mode: ScoringMode) {
        let Some(question) = catalog.get(self.answers.len()) else {
            return;
        };
        if mode == ScoringMode::Local {
            self.scores.apply(question, Stance::parse(&answer));
        }
        self.answers.push(answer);
    }
}

#[derive(Debug)]
enum Stage {
    Connecting,
    AwaitingConsent,
    InQuiz(QuizSession),
    /// answers handed to the quiz service, waiting for the label
    Scoring,
    ChatReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Status,
    Submit,
    Chat,
}

#[derive(Debug)]
struct InFlight {
    id: RequestId,
    kind: Pending,
    deadline: Duration,
}

/// what happened to a submitted line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    /// blank input; nothing changed
    Ignored,
    /// a call is in flight; the input will run after it settles
    Queued,
    /// the queue is full; nothing changed
    Rejected,
    /// processed now, possibly needing a remote call
    Accepted(Option<RemoteCall>),
}

#[derive(Debug)]
pub struct ConversationEngine {
    config: ConversationConfig,
    catalog: QuizCatalog,
    identity: String,
    stage: Stage,
    history: History,
    queue: VecDeque<String>,
    in_flight: Option<InFlight>,
    next_id: u64,
    started: bool,
    last_bias: Option<BiasLabel>,
    completed: u64,
}

impl ConversationEngine {
    pub fn new(
        config: ConversationConfig,
        catalog: QuizCatalog,
        identity: &impl IdentityProvider,
    ) -> Self {
        Self {
            config,
            catalog,
            identity: identity.identity(),
            stage: Stage::Connecting,
            history: History::default(),
            queue: VecDeque::new(),
            in_flight: None,
            next_id: 0,
            started: false,
            last_bias: None,
            completed: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.stage {
            Stage::Connecting => Phase::Connecting,
            Stage::AwaitingConsent => Phase::AwaitingConsent,
            Stage::InQuiz(_) | Stage::Scoring => Phase::InQuiz,
            Stage::ChatReady => Phase::ChatReady,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn session(&self) -> Option<&QuizSession> {
        match &self.stage {
            Stage::InQuiz(session) => Some(session),
            _ => None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn catalog(&self) -> &QuizCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn last_bias(&self) -> Option<BiasLabel> {
        self.last_bias
    }

    /// quizzes finished over the engine's lifetime, including retakes.
    pub fn quizzes_completed(&self) -> u64 {
        self.completed
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// new input has to wait: a call is in flight or the engine has not
    /// finished connecting.
    pub fn busy(&self) -> bool {
        self.in_flight.is_some() || matches!(self.stage, Stage::Connecting)
    }

    /// one-time initialisation. later calls do nothing.
    pub fn start(&mut self, now: Duration) -> Option<RemoteCall> {
        if self.started {
            return None;
        }
        self.started = true;
        if self.config.check_status {
            let request = RemoteRequest::Status { identity: self.identity.clone() };
            return Some(self.dispatch(Pending::Status, request, now));
        }
        self.open_invitation();
        self.drain_queue(now)
    }

    pub fn submit(&mut self, raw: &str, now: Duration) -> Submitted {
        let Some(input) = text::normalize_input(raw) else {
            return Submitted::Ignored;
        };
        if self.busy() {
            if self.queue.len() >= self.config.max_queued {
                warn!(target: "bevy_quiz_chat", "input rejected: {} sends already queued", self.queue.len());
                return Submitted::Rejected;
            }
            debug!(target: "bevy_quiz_chat", "busy, queueing input (len={})", input.len());
            self.queue.push_back(input.to_string());
            return Submitted::Queued;
        }
        Submitted::Accepted(self.handle(input.to_string(), now))
    }

    /// applies the outcome of call `id`. replies for calls that already
    /// timed out are dropped. returns the next call if queued input needs one.
    pub fn complete(
        &mut self,
        id: RequestId,
        outcome: Result<RemoteReply, RemoteError>,
        now: Duration,
    ) -> Option<RemoteCall> {
        let flight = match self.in_flight.take() {
            Some(f) if f.id == id => f,
            other => {
                self.in_flight = other;
                debug!(target: "bevy_quiz_chat", "dropping stale reply for request {:?}", id);
                return None;
            }
        };

        match flight.kind {
            Pending::Status => {
                let taken = match outcome {
                    Ok(RemoteReply::Status { taken }) => taken,
                    Ok(other) => {
                        warn!(target: "bevy_quiz_chat", "status check got unexpected reply {:?}", other);
                        false
                    }
                    Err(err) => {
                        warn!(target: "bevy_quiz_chat", "status check failed: {}", err);
                        false
                    }
                };
                if taken {
                    info!(target: "bevy_quiz_chat", "quiz already taken, going straight to chat");
                    self.bot(self.config.prompts.welcome_back.clone());
                    self.stage = Stage::ChatReady;
                } else {
                    self.open_invitation();
                }
            }
            Pending::Submit => {
                let bias = match outcome {
                    Ok(RemoteReply::Bias(bias)) => bias,
                    Ok(other) => {
                        warn!(target: "bevy_quiz_chat", "submit got unexpected reply {:?}", other);
                        self.config.fallback_bias
                    }
                    Err(err) => {
                        warn!(target: "bevy_quiz_chat", "quiz submission failed: {}", err);
                        self.config.fallback_bias
                    }
                };
                self.conclude(bias);
            }
            Pending::Chat => {
                let reply = match outcome {
                    Ok(RemoteReply::Text(t)) => {
                        let t = if self.config.strip_reply_labels {
                            text::strip_labels(&t)
                        } else {
                            t.trim().to_string()
                        };
                        (!t.is_empty()).then_some(t)
                    }
                    Ok(other) => {
                        warn!(target: "bevy_quiz_chat", "chat got unexpected reply {:?}", other);
                        None
                    }
                    Err(err) => {
                        warn!(target: "bevy_quiz_chat", "chat failed: {}", err);
                        None
                    }
                };
                let reply = reply.unwrap_or_else(|| self.config.prompts.chat_fallback.clone());
                self.bot(reply);
            }
        }

        self.drain_queue(now)
    }

    /// fails the in-flight call with a timeout once its deadline passed.
    pub fn expire(&mut self, now: Duration) -> Option<RemoteCall> {
        let id = match &self.in_flight {
            Some(f) if now >= f.deadline => f.id,
            _ => return None,
        };
        warn!(target: "bevy_quiz_chat", "request {:?} timed out", id);
        self.complete(id, Err(RemoteError::Timeout), now)
    }

    // ---------------------- transitions ----------------------

    fn handle(&mut self, input: String, now: Duration) -> Option<RemoteCall> {
        self.history.push(Message::user(input.clone()));

        match std::mem::replace(&mut self.stage, Stage::ChatReady) {
            Stage::AwaitingConsent => {
                if text::control_word(&input) == Some(ControlWord::Decline) {
                    info!(target: "bevy_quiz_chat", "quiz declined");
                    self.bot(self.config.prompts.declined.clone());
                } else {
                    self.begin_quiz();
                }
                None
            }
            Stage::InQuiz(mut session) => {
                session.record(&self.catalog, input, self.config.scoring);
                if let Some(next) = self.catalog.get(session.current_index()) {
                    let question = next.text.clone();
                    self.stage = Stage::InQuiz(session);
                    self.bot(question);
                    None
                } else {
                    self.finish_quiz(session, now)
                }
            }
            Stage::ChatReady => {
                if text::control_word(&input) == Some(ControlWord::Retake) {
                    info!(target: "bevy_quiz_chat", "retaking quiz");
                    self.begin_quiz();
                    None
                } else {
                    let request = RemoteRequest::Chat { prompt: input, identity: self.identity.clone() };
                    Some(self.dispatch(Pending::Chat, request, now))
                }
            }
            // busy() keeps input away from these
            stage @ (Stage::Connecting | Stage::Scoring) => {
                self.stage = stage;
                None
            }
        }
    }

    fn begin_quiz(&mut self) {
        let session = QuizSession::new(&self.catalog);
        let first = self.catalog.get(0).map(|q| q.text.clone()).unwrap_or_default();
        info!(target: "bevy_quiz_chat", "quiz started ({} questions)", self.catalog.len());
        self.stage = Stage::InQuiz(session);
        self.bot(first);
    }

    fn finish_quiz(&mut self, session: QuizSession, now: Duration) -> Option<RemoteCall> {
        match self.config.scoring {
            ScoringMode::Local => {
                let bias = session.scores().classify();
                debug!(target: "bevy_quiz_chat", "local scores: {:?}", session.scores());
                self.conclude(bias);
                None
            }
            ScoringMode::Remote => {
                self.stage = Stage::Scoring;
                let request = RemoteRequest::Submit {
                    answers: session.answers,
                    identity: self.identity.clone(),
                };
                Some(self.dispatch(Pending::Submit, request, now))
            }
        }
    }

    fn conclude(&mut self, bias: BiasLabel) {
        info!(target: "bevy_quiz_chat", "quiz complete: bias={}", bias);
        self.last_bias = Some(bias);
        self.completed += 1;
        self.stage = Stage::ChatReady;
        self.bot(self.config.prompts.result_for(bias));
    }

    fn open_invitation(&mut self) {
        self.stage = Stage::AwaitingConsent;
        self.bot(self.config.prompts.invitation.clone());
    }

    fn bot(&mut self, content: String) {
        self.history.push(Message::bot(content));
    }

    fn dispatch(&mut self, kind: Pending, request: RemoteRequest, now: Duration) -> RemoteCall {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.in_flight = Some(InFlight {
            id,
            kind,
            deadline: now + self.config.request_timeout(),
        });
        debug!(target: "bevy_quiz_chat", "dispatch {:?} as {:?}", kind, id);
        RemoteCall { id, request }
    }

    fn drain_queue(&mut self, now: Duration) -> Option<RemoteCall> {
        while !self.busy() {
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            if let Some(call) = self.handle(next, now) {
                return Some(call);
            }
        }
        None
    }
}
