//! minimal bevy chat widget driven by bevy_quiz_chat.
//! - first contact offers the bias quiz, then relays to the assistant.
//! - type, press enter to send; `retake` restarts the quiz once chatting.
//! - F1 minimizes / restores the widget.
//!
//! env:
//!   QUIZ_CHAT_BASE_URL        quiz + chat service (default http://localhost:5000)
//!   QUIZ_CHAT_IDENTITY_FIELD  `username` or `user_id` for submit bodies
//!   QUIZ_CHAT_SCORING         `remote` (default) or `local`
//!   QUIZ_CHAT_USERNAME        stable identity; a random one is used otherwise
//!   QUIZ_CHAT_OFFLINE         if set, score quizzes in-process
//!   OPENAI_API_KEY            if set, chat goes straight to an llm provider
//!   LLM_BASE_URL / LLM_MODEL  provider settings (default openai / gpt-4)

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy_quiz_chat::{
    AssistantChatService, Backends, ChatService, Conversation, ConversationConfig, EndpointConfig,
    FixedIdentity, HttpBackend, InputRejected, MessageAppended, OfflineQuizService, Phase,
    PhaseChanged, QuizCatalog, QuizChatPlugin, QuizCompleted, QuizService, RandomIdentity, Role,
    QuizChatSet, ScoringMode, submit_user_text,
};
use std::sync::Arc;

/// how many lines of history the widget shows.
const VISIBLE_LINES: usize = 12;

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct HistoryText;
#[derive(Component)]
struct PromptText;
#[derive(Component)]
struct StatusText;
#[derive(Component)]
struct WidgetBody;

#[derive(Component, Copy, Clone)]
struct TargetConversation(Entity);

// ---------------------- app state ----------------------

#[derive(Resource, Default)]
struct PromptBuf(String);

/// rendered transcript, kept in sync from `MessageAppended`.
#[derive(Resource, Default)]
struct Transcript(Vec<String>);

#[derive(Resource, Default)]
struct Minimized(bool);

// ---------------------- backends ----------------------

fn build_backends(endpoints: EndpointConfig) -> Backends {
    let http = Arc::new(HttpBackend::new(endpoints));

    let quiz: Arc<dyn QuizService> = if std::env::var("QUIZ_CHAT_OFFLINE").is_ok() {
        info!(target: "quiz_chat", "scoring quizzes offline");
        Arc::new(OfflineQuizService::new())
    } else {
        http.clone()
    };

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let chat: Arc<dyn ChatService> = if api_key.is_empty() {
        http
    } else {
        let base = std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1/".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4".to_string());
        info!(target: "quiz_chat", "chat via llm provider: base='{}', model='{}'", base, model);
        match AssistantChatService::openai(base, api_key, model) {
            Ok(svc) => Arc::new(svc),
            Err(err) => {
                warn!(target: "quiz_chat", "llm provider unavailable ({}), using http chat", err);
                http
            }
        }
    };

    Backends::new(quiz, chat)
}

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let endpoints = EndpointConfig::from_env().unwrap_or_else(|err| {
        eprintln!("bad endpoint config ({err}), using defaults");
        EndpointConfig::default()
    });
    let conversation = ConversationConfig::from_env().unwrap_or_else(|err| {
        eprintln!("bad conversation config ({err}), using defaults");
        ConversationConfig::default()
    });

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(build_backends(endpoints))
        .insert_resource(ConversationSeed(conversation))
        .insert_resource(PromptBuf::default())
        .insert_resource(Transcript::default())
        .insert_resource(Minimized::default())
        .add_plugins(DefaultPlugins)
        .add_plugins(QuizChatPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (handle_text_input, toggle_minimized, refresh_prompt_text))
        // event readers should run after the engine settles
        .add_systems(
            Update,
            (on_appended, on_phase, on_completed, on_rejected).after(QuizChatSet::Engine),
        )
        .run();
}

#[derive(Resource)]
struct ConversationSeed(ConversationConfig);

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands, seed: Res<ConversationSeed>) {
    commands.spawn(Camera2d);

    let catalog = match seed.0.scoring {
        ScoringMode::Local => QuizCatalog::axis_quiz(),
        ScoringMode::Remote => QuizCatalog::free_text(),
    };
    let conversation = match std::env::var("QUIZ_CHAT_USERNAME") {
        Ok(name) if !name.trim().is_empty() => {
            Conversation::new(seed.0.clone(), catalog, &FixedIdentity::new(name.trim()))
        }
        _ => Conversation::new(seed.0.clone(), catalog, &RandomIdentity::new()),
    };
    let target = commands.spawn(conversation).id();

    let style_16 = TextFont { font_size: 16.0, ..default() };
    let style_13 = TextFont { font_size: 13.0, ..default() };

    // widget, bottom-right like a chat bubble
    commands
        .spawn((
            Node {
                position_type: PositionType::Absolute,
                right: Val::Px(24.0),
                bottom: Val::Px(24.0),
                width: Val::Px(420.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(6.0),
                padding: UiRect::all(Val::Px(10.0)),
                ..default()
            },
            BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
        ))
        .with_children(|w| {
            w.spawn((
                Text::new("connecting..."),
                style_13.clone(),
                TextColor(Color::srgb_u8(150, 150, 160)),
                StatusText,
                TargetConversation(target),
            ));
            w.spawn((
                Node {
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(6.0),
                    min_height: Val::Px(260.0),
                    ..default()
                },
                WidgetBody,
            ))
            .with_children(|b| {
                b.spawn((
                    Text::new(""),
                    style_16.clone(),
                    TextColor(Color::WHITE),
                    HistoryText,
                    TargetConversation(target),
                ));
                b.spawn((
                    Text::new("> "),
                    style_13.clone(),
                    TextColor(Color::WHITE),
                    PromptText,
                    TargetConversation(target),
                ));
            });
        });
}

// ---------------------- input ----------------------

fn handle_text_input(
    mut commands: Commands,
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    minimized: Res<Minimized>,
    mut prompt: ResMut<PromptBuf>,
    q_target: Query<&TargetConversation, With<PromptText>>,
) {
    if minimized.0 {
        ev_kbd.clear();
        return;
    }

    for ev in ev_kbd.read() {
        if ev.state.is_pressed()
            && let Some(txt) = &ev.text
        {
            let s = txt.replace('\r', "").replace('\n', "");
            prompt.0.push_str(&s);
        }
    }

    if keys.just_pressed(KeyCode::Backspace) {
        prompt.0.pop();
    }

    if keys.just_pressed(KeyCode::Enter)
        && let Ok(TargetConversation(e)) = q_target.single()
    {
        // blank lines are dropped by the engine; clear the buffer either way
        let msg = std::mem::take(&mut prompt.0);
        submit_user_text(&mut commands, *e, msg);
    }
}

fn toggle_minimized(
    keys: Res<ButtonInput<KeyCode>>,
    mut minimized: ResMut<Minimized>,
    mut q_body: Query<&mut Node, With<WidgetBody>>,
) {
    if !keys.just_pressed(KeyCode::F1) {
        return;
    }
    minimized.0 = !minimized.0;
    info!(target: "quiz_chat", "widget minimized={}", minimized.0);
    for mut node in q_body.iter_mut() {
        node.display = if minimized.0 { Display::None } else { Display::Flex };
    }
}

fn refresh_prompt_text(prompt: Res<PromptBuf>, mut q_prompt: Query<&mut Text, With<PromptText>>) {
    if prompt.is_changed()
        && let Ok(mut t) = q_prompt.single_mut()
    {
        t.0 = format!("> {} |", prompt.0);
    }
}

// ---------------------- conversation events ----------------------

fn on_appended(
    mut ev: EventReader<MessageAppended>,
    mut transcript: ResMut<Transcript>,
    mut q_hist: Query<(&TargetConversation, &mut Text), With<HistoryText>>,
) {
    let mut touched = Vec::new();
    for MessageAppended { entity, message } in ev.read() {
        let who = match message.role {
            Role::User => "you",
            Role::Bot => "bot",
        };
        transcript.0.push(format!("{who}: {}", message.content));
        touched.push(*entity);
    }
    if touched.is_empty() {
        return;
    }

    let start = transcript.0.len().saturating_sub(VISIBLE_LINES);
    let body = transcript.0[start..].join("\n");
    for (TargetConversation(t), mut text) in q_hist.iter_mut() {
        if touched.contains(t) {
            text.0 = body.clone();
        }
    }
}

fn on_phase(
    mut ev: EventReader<PhaseChanged>,
    mut q_status: Query<(&TargetConversation, &mut Text), With<StatusText>>,
) {
    for PhaseChanged { entity, phase } in ev.read() {
        let label = match phase {
            Phase::Connecting => "connecting...",
            Phase::AwaitingConsent => "quiz?",
            Phase::InQuiz => "quiz in progress",
            Phase::ChatReady => "chat (type retake to redo the quiz)",
        };
        for (TargetConversation(t), mut text) in q_status.iter_mut() {
            if t == entity {
                text.0 = label.to_string();
            }
        }
    }
}

fn on_completed(mut ev: EventReader<QuizCompleted>) {
    for QuizCompleted { entity, bias } in ev.read() {
        info!(target: "quiz_chat", "quiz finished for {:?}: {}", entity, bias);
    }
}

fn on_rejected(mut ev: EventReader<InputRejected>, mut prompt: ResMut<PromptBuf>) {
    for InputRejected { entity, text } in ev.read() {
        warn!(target: "quiz_chat", "send dropped for {:?}, still waiting on a reply", entity);
        // put it back so the user can resend
        if prompt.0.is_empty() {
            prompt.0 = text.clone();
        }
    }
}
