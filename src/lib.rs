//! bevy_quiz_chat: a bevy chat widget that asks for a short bias quiz
//! before relaying messages to an assistant.
//!
//! - the dialog itself is a plain state machine (`ConversationEngine`); it
//!   never does io and is fully testable without an `App`.
//! - this plugin owns the glue: user text goes in as `SubmitUserText`
//!   events, remote calls run off-thread, and their results come back
//!   through a bounded inbox drained once per frame.
//! - never blocks the main thread: on native we spawn onto a tiny tokio
//!   runtime; on wasm we use bevy's async pool, which yields to the
//!   browser/event loop.
//! - every message the engine appends is re-emitted as `MessageAppended`,
//!   so uis only ever render from events.

pub mod assistant;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod http;
pub mod identity;
pub mod remote;
pub mod scorer;
pub mod text;

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use bevy::time::Real;
use flume::{Receiver, Sender, TryRecvError};
use std::sync::Arc;

pub use assistant::AssistantChatService;
pub use catalog::{CatalogError, QuizCatalog, QuizQuestion};
pub use config::{ConfigError, ConversationConfig, EndpointConfig, IdentityField, Prompts, ScoringMode};
pub use engine::{ConversationEngine, History, Message, Phase, QuizSession, Role, Submitted};
pub use http::HttpBackend;
pub use identity::{FixedIdentity, IdentityProvider, RandomIdentity};
pub use remote::{
    ChatService, OfflineQuizService, QuizService, RemoteCall, RemoteError, RemoteReply,
    RemoteRequest, RequestId,
};
pub use scorer::BiasLabel;

/// the collaborators every conversation talks to.
#[derive(Resource, Clone)]
pub struct Backends {
    pub quiz: Arc<dyn QuizService>,
    pub chat: Arc<dyn ChatService>,
}

impl Backends {
    pub fn new(quiz: Arc<dyn QuizService>, chat: Arc<dyn ChatService>) -> Self {
        Self { quiz, chat }
    }

    /// both services over http against the same deployment.
    pub fn http(endpoints: EndpointConfig) -> Self {
        let backend = Arc::new(HttpBackend::new(endpoints));
        Self { quiz: backend.clone(), chat: backend }
    }
}

/// on native we keep a tiny tokio runtime to drive remote calls.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_quiz_chat", "QuizChatPlugin: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after the engine settles each frame
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum QuizChatSet {
    /// start, input, inbox drain and timeouts (in `Update`)
    Engine,
}

/// the widget's conversation. one per chat entity.
#[derive(Component, Debug)]
pub struct Conversation(ConversationEngine);

impl Conversation {
    pub fn new(
        config: ConversationConfig,
        catalog: QuizCatalog,
        identity: &impl IdentityProvider,
    ) -> Self {
        Self(ConversationEngine::new(config, catalog, identity))
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.0
    }
}

impl From<ConversationEngine> for Conversation {
    fn from(engine: ConversationEngine) -> Self {
        Self(engine)
    }
}

/// raw text typed into the widget attached to `entity`.
#[derive(Event, Debug, Clone)]
pub struct SubmitUserText {
    pub entity: Entity,
    pub text: String,
}

/// helper to submit a line of user text to a conversation entity.
pub fn submit_user_text(commands: &mut Commands, target: Entity, text: impl Into<String>) {
    let text = text.into();
    debug!(target: "bevy_quiz_chat", "submit_user_text -> entity={:?} (len={})", target, text.len());
    commands.send_event(SubmitUserText { entity: target, text });
}

/// events emitted after the engine changed.
#[derive(Event, Debug, Clone)]
pub struct MessageAppended {
    pub entity: Entity,
    pub message: Message,
}
#[derive(Event, Debug, Clone)]
pub struct PhaseChanged {
    pub entity: Entity,
    pub phase: Phase,
}
#[derive(Event, Debug, Clone)]
pub struct QuizCompleted {
    pub entity: Entity,
    pub bias: BiasLabel,
}
/// the send was dropped because too many were already waiting.
#[derive(Event, Debug, Clone)]
pub struct InputRejected {
    pub entity: Entity,
    pub text: String,
}

/// a finished remote call on its way back to the main thread.
#[derive(Debug)]
struct Completion {
    entity: Entity,
    id: RequestId,
    outcome: Result<RemoteReply, RemoteError>,
}

/// cross-thread inbox; producers send, main thread drains.
/// on native it also carries the runtime calls are spawned on.
#[derive(Resource, Clone)]
struct CompletionInbox {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    #[cfg(not(target_arch = "wasm32"))]
    rt: Arc<tokio::runtime::Runtime>,
}

impl CompletionInbox {
    fn new(#[cfg(not(target_arch = "wasm32"))] rt: Arc<tokio::runtime::Runtime>) -> Self {
        let (tx, rx) = flume::bounded(256);
        Self {
            tx,
            rx,
            #[cfg(not(target_arch = "wasm32"))]
            rt,
        }
    }
}

/// send to inbox (ignore disconnected)
fn push_inbox(tx: &Sender<Completion>, msg: Completion) {
    if tx.send(msg).is_err() {
        warn!(target: "bevy_quiz_chat", "completion inbox closed; dropping reply");
    }
}

/// bevy plugin: wires systems, events, resources.
/// requires a `Backends` resource to be inserted before the first update.
/// on native, also inserts a tiny tokio runtime resource by default.
pub struct QuizChatPlugin;

impl Plugin for QuizChatPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_quiz_chat", "QuizChatPlugin: build()");
        app.add_event::<SubmitUserText>()
            .add_event::<MessageAppended>()
            .add_event::<PhaseChanged>()
            .add_event::<QuizCompleted>()
            .add_event::<InputRejected>()
            .configure_sets(Update, QuizChatSet::Engine)
            .add_systems(
                Update,
                (
                    start_conversations,
                    apply_user_text,
                    drain_completions,
                    expire_requests,
                )
                    .chain()
                    .in_set(QuizChatSet::Engine),
            );

        #[cfg(not(target_arch = "wasm32"))]
        {
            // keep a runtime the app inserted itself
            let rt = match app.world().get_resource::<TokioRt>() {
                Some(rt) => rt.clone(),
                None => {
                    let rt = TokioRt::default();
                    app.insert_resource(rt.clone());
                    rt
                }
            };
            app.insert_resource(CompletionInbox::new(rt.0));
        }
        #[cfg(target_arch = "wasm32")]
        app.insert_resource(CompletionInbox::new());
    }
}

/// everything the engine systems need to run calls and report changes.
#[derive(SystemParam)]
struct EngineIo<'w> {
    backends: Res<'w, Backends>,
    inbox: Res<'w, CompletionInbox>,
    time: Res<'w, Time<Real>>,
    appended: EventWriter<'w, MessageAppended>,
    phases: EventWriter<'w, PhaseChanged>,
    completed: EventWriter<'w, QuizCompleted>,
}

/// engine state before a step, to diff against afterwards.
struct Snapshot {
    len: usize,
    phase: Phase,
    completed: u64,
}

impl Snapshot {
    fn of(engine: &ConversationEngine) -> Self {
        Self {
            len: engine.history().len(),
            phase: engine.phase(),
            completed: engine.quizzes_completed(),
        }
    }
}

impl EngineIo<'_> {
    fn now(&self) -> std::time::Duration {
        self.time.elapsed()
    }

    /// emits events for whatever changed since `before` and runs `call`.
    fn settle(
        &mut self,
        entity: Entity,
        engine: &ConversationEngine,
        before: Snapshot,
        call: Option<RemoteCall>,
    ) {
        for message in engine.history().since(before.len) {
            self.appended.write(MessageAppended { entity, message: message.clone() });
        }
        if engine.phase() != before.phase {
            debug!(target: "bevy_quiz_chat", "entity={:?} phase {:?} -> {:?}", entity, before.phase, engine.phase());
            self.phases.write(PhaseChanged { entity, phase: engine.phase() });
        }
        if engine.quizzes_completed() != before.completed
            && let Some(bias) = engine.last_bias()
        {
            self.completed.write(QuizCompleted { entity, bias });
        }
        if let Some(call) = call {
            self.spawn_call(entity, call);
        }
    }

    fn spawn_call(&self, entity: Entity, call: RemoteCall) {
        let quiz = self.backends.quiz.clone();
        let chat = self.backends.chat.clone();
        let tx = self.inbox.tx.clone();
        let kind = match &call.request {
            RemoteRequest::Status { .. } => "status",
            RemoteRequest::Submit { .. } => "submit",
            RemoteRequest::Chat { .. } => "chat",
        };
        info!(target: "bevy_quiz_chat", "spawn_call: entity={:?} id={:?} kind={}", entity, call.id, kind);

        let run = async move {
            let outcome = remote::execute(&call.request, quiz.as_ref(), chat.as_ref()).await;
            if let Err(err) = &outcome {
                warn!(target: "bevy_quiz_chat", "{} call {:?} failed: {}", kind, call.id, err);
            }
            push_inbox(&tx, Completion { entity, id: call.id, outcome });
        };

        #[cfg(target_arch = "wasm32")]
        {
            // wasm path: the async pool runs on the browser event loop.
            AsyncComputeTaskPool::get().spawn(run).detach();
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            // native: hand off to tokio so bevy pools stay free.
            let rt = self.inbox.rt.clone();
            AsyncComputeTaskPool::get()
                .spawn(async move {
                    let _ = rt.spawn(run).await;
                })
                .detach();
        }
    }
}

/// runs the one-time start (status check or invitation) for new widgets.
fn start_conversations(mut io: EngineIo, mut q: Query<(Entity, &mut Conversation), Added<Conversation>>) {
    let now = io.now();
    for (entity, mut conv) in q.iter_mut() {
        info!(target: "bevy_quiz_chat", "start_conversations: entity={:?} identity={}", entity, conv.0.identity());
        let before = Snapshot::of(&conv.0);
        let call = conv.0.start(now);
        io.settle(entity, &conv.0, before, call);
    }
}

/// feeds submitted text into the matching engine.
fn apply_user_text(
    mut io: EngineIo,
    mut ev_in: EventReader<SubmitUserText>,
    mut ev_rejected: EventWriter<InputRejected>,
    mut q: Query<&mut Conversation>,
) {
    let now = io.now();
    for SubmitUserText { entity, text } in ev_in.read() {
        let Ok(mut conv) = q.get_mut(*entity) else {
            warn!(target: "bevy_quiz_chat", "apply_user_text: {:?} has no Conversation", entity);
            continue;
        };
        let before = Snapshot::of(&conv.0);
        match conv.0.submit(text, now) {
            Submitted::Ignored => {}
            Submitted::Queued => {
                debug!(target: "bevy_quiz_chat", "entity={:?} busy, input queued ({})", entity, conv.0.queued());
            }
            Submitted::Rejected => {
                ev_rejected.write(InputRejected { entity: *entity, text: text.clone() });
            }
            Submitted::Accepted(call) => io.settle(*entity, &conv.0, before, call),
        }
    }
}

/// drains the inbox and applies remote outcomes.
fn drain_completions(mut io: EngineIo, mut q: Query<&mut Conversation>) {
    // drain up to a cap per frame to avoid long frames on bursts
    const MAX_PER_FRAME: usize = 64;
    let mut drained = Vec::new();
    for _ in 0..MAX_PER_FRAME {
        match io.inbox.rx.try_recv() {
            Ok(c) => drained.push(c),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    if drained.is_empty() {
        return;
    }

    let now = io.now();
    for Completion { entity, id, outcome } in drained {
        let Ok(mut conv) = q.get_mut(entity) else {
            debug!(target: "bevy_quiz_chat", "drain_completions: {:?} despawned, dropping {:?}", entity, id);
            continue;
        };
        let before = Snapshot::of(&conv.0);
        let call = conv.0.complete(id, outcome, now);
        io.settle(entity, &conv.0, before, call);
    }
}

/// turns overdue calls into timeouts.
fn expire_requests(mut io: EngineIo, mut q: Query<(Entity, &mut Conversation)>) {
    let now = io.now();
    for (entity, mut conv) in q.iter_mut() {
        if conv.0.in_flight().is_none() {
            continue;
        }
        let before = Snapshot::of(&conv.0);
        let call = conv.0.expire(now);
        io.settle(entity, &conv.0, before, call);
    }
}
