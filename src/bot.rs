//! Inbound routing.
//!
//! [`Bot::handle`] decides what one inbound event means: a command, a menu
//! button, a file for the active flow, or an answer to the current step.
//! [`Bot::run`] feeds a transport's event stream through per-chat lanes so
//! events of one chat are handled in order while chats proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc::{UnboundedSender, error::SendError, unbounded_channel};
use tracing::{debug, info, warn};

use crate::admin::{AccessGuard, AdminCommand, CommandContext, parse_command};
use crate::attachments;
use crate::channels::{ChatId, InboundEvent, Keyboard, MessageStream, Messenger, SendOptions};
use crate::config::BotConfig;
use crate::flow::keyboard::{
    CANCEL, CONTACT_ADMIN, DONE, I_HAVE_PAID, NEW_REQUEST, OFFER, SEND, SKIP, main_menu,
};
use crate::flow::{FlowKind, Prompt, Transition, advance};
use crate::session::{Session, SessionStore};
use crate::store::Database;
use crate::submission::Finalizer;

const GREETING: &str =
    "Hi! This is <b>TripBuddy</b>, your travel assistant ✈️\nChoose an action:";

const CANCELLED: &str = "Okay, stopped. What else can I help with?";

const FALLBACK: &str = "I didn't understand that 😅\nChoose an action from the menu below:";

const OFFER_ACCEPTANCE: &str =
    "By paying for the service you accept the terms of the public offer.";

/// File name the offer is delivered under.
const OFFER_FILE_NAME: &str = "TripBuddy_Offer.pdf";

/// The bot: routes events to the flow engine, the finalizer, and commands.
pub struct Bot {
    messenger: Arc<dyn Messenger>,
    db: Arc<dyn Database>,
    sessions: Arc<SessionStore>,
    config: Arc<BotConfig>,
    guard: AccessGuard,
}

impl Bot {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        db: Arc<dyn Database>,
        sessions: Arc<SessionStore>,
        config: Arc<BotConfig>,
    ) -> Self {
        let guard = AccessGuard::from_config(&config);
        Self {
            messenger,
            db,
            sessions,
            config,
            guard,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound event. Never fails; problems are logged and, where
    /// the user should know, reported back to the chat.
    pub async fn handle(&self, event: InboundEvent) {
        let chat_id = event.chat_id;

        if event.attachment().is_some() {
            if let Some(kind) = attachments::collect(&self.sessions, &event).await {
                self.send(chat_id, kind.ack()).await;
            }
            return;
        }

        let Some(text) = event.trimmed_text() else {
            debug!(chat_id, "Event without text or file ignored");
            return;
        };

        if let Some(line) = parse_command(text) {
            match line.name.as_str() {
                "start" | "help" => self.start(chat_id).await,
                "cancel" => self.cancel(chat_id).await,
                "offer" => self.offer(chat_id).await,
                name => match AdminCommand::from_name(name) {
                    Some(cmd) => self.commands().run(cmd, line.args, &event).await,
                    None => debug!(chat_id, command = name, "Unknown command ignored"),
                },
            }
            return;
        }

        match text {
            CANCEL => return self.cancel(chat_id).await,
            OFFER => return self.offer(chat_id).await,
            CONTACT_ADMIN => return self.contact_admin(chat_id).await,
            NEW_REQUEST => return self.begin(chat_id, Session::start_request()).await,
            I_HAVE_PAID => return self.begin(chat_id, Session::start_payment()).await,
            _ => {}
        }

        let session = self.sessions.get(chat_id).await;
        match session {
            Some(mut session) if session.is_active() => {
                let transition = advance(&mut session, text);
                self.apply(&event, session, transition).await;
            }
            session => self.idle(&event, text, session).await,
        }
    }

    async fn apply(&self, event: &InboundEvent, session: Session, transition: Transition) {
        let chat_id = event.chat_id;
        match transition {
            Transition::Idle => self.fallback(chat_id).await,
            Transition::Cancelled => self.cancel(chat_id).await,
            Transition::Rejected(prompt) => self.prompt(chat_id, prompt).await,
            Transition::Advanced { step, prompt } => {
                debug!(chat_id, step = %step, "Flow advanced");
                self.sessions.set(chat_id, session).await;
                self.prompt(chat_id, prompt).await;
            }
            Transition::Finish(FlowKind::Request) => {
                self.finalizer().finish_request(event).await;
            }
            Transition::Finish(FlowKind::Payment) => {
                self.finalizer().finish_payment(event).await;
            }
        }
    }

    /// Text while no step is recorded.
    async fn idle(&self, event: &InboundEvent, text: &str, session: Option<Session>) {
        let finalizer = self.finalizer();
        match (text, session) {
            // Repeated terminal press after a submission.
            (DONE | SKIP, Some(s)) if s.submitted => {
                finalizer.finish_request(event).await;
            }
            (SEND, Some(s)) if s.submitted => {
                finalizer.finish_payment(event).await;
            }
            // Payment answers survived but the step was lost: finish anyway.
            (SEND | SKIP, Some(s)) if s.has_payment_traces() => {
                info!(chat_id = event.chat_id, "Completing payment with a lost step");
                finalizer.finish_payment(event).await;
            }
            _ => self.fallback(event.chat_id).await,
        }
    }

    async fn begin(&self, chat_id: ChatId, (session, prompt): (Session, Prompt)) {
        debug!(chat_id, "Flow started");
        self.sessions.set(chat_id, session).await;
        self.prompt(chat_id, prompt).await;
    }

    async fn start(&self, chat_id: ChatId) {
        self.sessions.clear(chat_id).await;
        self.send_keyboard(chat_id, GREETING, main_menu()).await;
    }

    async fn cancel(&self, chat_id: ChatId) {
        self.sessions.clear(chat_id).await;
        self.send_keyboard(chat_id, CANCELLED, main_menu()).await;
    }

    async fn fallback(&self, chat_id: ChatId) {
        self.send_keyboard(chat_id, FALLBACK, main_menu()).await;
    }

    async fn contact_admin(&self, chat_id: ChatId) {
        let who = self.config.admin_username.as_deref().unwrap_or("—");
        self.send(
            chat_id,
            &format!("Contact the administrator: {who}\nWe reply quickly 🙂"),
        )
        .await;
    }

    async fn offer(&self, chat_id: ChatId) {
        let path = &self.config.offer_path;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), "Offer file unavailable: {e}");
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.send(
                    chat_id,
                    &format!(
                        "Offer file not found. Upload <b>{name}</b> to the project root."
                    ),
                )
                .await;
                return;
            }
        };
        if let Err(e) = self
            .messenger
            .send_document_bytes(chat_id, bytes, OFFER_FILE_NAME)
            .await
        {
            warn!(chat_id, error = %e, "Failed to send offer");
            return;
        }
        self.send(chat_id, OFFER_ACCEPTANCE).await;
    }

    fn finalizer(&self) -> Finalizer<'_> {
        Finalizer {
            messenger: self.messenger.as_ref(),
            db: self.db.as_ref(),
            sessions: &self.sessions,
            staff_chat: self.config.admin_group_id,
        }
    }

    fn commands(&self) -> CommandContext<'_> {
        CommandContext {
            messenger: self.messenger.as_ref(),
            db: self.db.as_ref(),
            sessions: &self.sessions,
            config: &self.config,
            guard: &self.guard,
        }
    }

    async fn prompt(&self, chat_id: ChatId, prompt: Prompt) {
        self.send_keyboard(chat_id, &prompt.text, prompt.keyboard)
            .await;
    }

    async fn send(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(chat_id, text, SendOptions::default())
            .await
        {
            warn!(chat_id, error = %e, "Failed to send message");
        }
    }

    async fn send_keyboard(&self, chat_id: ChatId, text: &str, keyboard: Keyboard) {
        if let Err(e) = self.messenger.send_keyboard(chat_id, text, keyboard).await {
            warn!(chat_id, error = %e, "Failed to send message");
        }
    }

    /// Drain `events`, one lane per chat.
    ///
    /// Returns when the stream ends; lanes finish the events already queued.
    /// A lane left empty for ten minutes is dropped and its task ends; the
    /// chat's next event opens a fresh one.
    pub async fn run(self: Arc<Self>, mut events: MessageStream) {
        let mut lanes: HashMap<ChatId, Lane> = HashMap::new();
        let mut last_sweep = Instant::now();

        info!("Bot dispatcher started");

        while let Some(event) = events.next().await {
            let now = Instant::now();
            if now.duration_since(last_sweep) >= LANE_IDLE {
                let closed = prune_idle_lanes(&mut lanes, now, LANE_IDLE);
                if closed > 0 {
                    debug!(closed, open = lanes.len(), "Idle chat lanes closed");
                }
                last_sweep = now;
            }

            let chat_id = event.chat_id;
            let event = match lanes.get_mut(&chat_id) {
                Some(lane) => match lane.push(event, now) {
                    Ok(()) => continue,
                    // The lane task is gone; start a new one below.
                    Err(SendError(event)) => event,
                },
                None => event,
            };

            let mut lane = Lane::spawn(Arc::clone(&self), now);
            if lane.push(event, now).is_err() {
                warn!(chat_id, "New lane closed before its first event");
            }
            lanes.insert(chat_id, lane);
        }

        info!("Bot dispatcher stopped");
    }
}

/// How long a chat lane may sit empty before it is dropped.
const LANE_IDLE: Duration = Duration::from_secs(600);

/// One chat's ordered queue and the task draining it.
struct Lane {
    tx: UnboundedSender<InboundEvent>,
    /// Events queued or being handled.
    pending: Arc<AtomicUsize>,
    last_used: Instant,
}

impl Lane {
    fn spawn(bot: Arc<Bot>, now: Instant) -> Self {
        let (tx, mut rx) = unbounded_channel::<InboundEvent>();
        let pending = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                bot.handle(event).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });
        Self {
            tx,
            pending,
            last_used: now,
        }
    }

    fn push(&mut self, event: InboundEvent, now: Instant) -> Result<(), SendError<InboundEvent>> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(event) {
            Ok(()) => {
                self.last_used = now;
                Ok(())
            }
            Err(e) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && now.duration_since(self.last_used) >= idle
    }
}

/// Drop lanes with nothing in flight that have not been used for `idle`.
/// Dropping the sender ends the lane's task. Returns how many were dropped.
fn prune_idle_lanes(lanes: &mut HashMap<ChatId, Lane>, now: Instant, idle: Duration) -> usize {
    let before = lanes.len();
    lanes.retain(|_, lane| !lane.is_idle(now, idle));
    before - lanes.len()
}
