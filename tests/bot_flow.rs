//! End-to-end tests: drive the bot with inbound events and check what it
//! stores and sends.
//!
//! Each test wires a `Bot` to an in-memory database and a recording
//! messenger; nothing touches the network.

use std::sync::Arc;

use tripbuddy::bot::Bot;
use tripbuddy::channels::{ChatId, InboundEvent, RecordingMessenger, RepliedMessage};
use tripbuddy::config::BotConfig;
use tripbuddy::flow::Step;
use tripbuddy::flow::keyboard::{
    CANCEL, DONE, FLIGHT, HOTEL, I_HAVE_PAID, NEW_REQUEST, ROOMS, SEND, STARS, YES,
};
use tripbuddy::session::SessionStore;
use tripbuddy::store::{Database, LibSqlBackend};

const STAFF: ChatId = -100200300;
const CLIENT: ChatId = 4242;

struct Harness {
    bot: Bot,
    messenger: Arc<RecordingMessenger>,
    db: Arc<LibSqlBackend>,
}

impl Harness {
    async fn new() -> Self {
        let mut config = BotConfig::for_token("test-token");
        config.admin_group_id = Some(STAFF);
        config.payment_details = "Bank: Example Bank".into();

        let messenger = Arc::new(RecordingMessenger::new());
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let bot = Bot::new(
            messenger.clone(),
            db.clone(),
            Arc::new(SessionStore::new()),
            Arc::new(config),
        );
        Self { bot, messenger, db }
    }

    async fn say(&self, chat_id: ChatId, text: &str) {
        let event = InboundEvent::text(chat_id, text).with_username("traveller");
        self.bot.handle(event).await;
    }

    async fn say_all(&self, chat_id: ChatId, texts: &[&str]) {
        for text in texts {
            self.say(chat_id, text).await;
        }
    }

    async fn send_photo(&self, chat_id: ChatId, file_id: &str) {
        self.bot
            .handle(InboundEvent {
                chat_id,
                sender_id: chat_id,
                photo: Some(file_id.into()),
                ..Default::default()
            })
            .await;
    }

    async fn send_document(&self, chat_id: ChatId, file_id: &str) {
        self.bot
            .handle(InboundEvent {
                chat_id,
                sender_id: chat_id,
                document: Some(file_id.into()),
                ..Default::default()
            })
            .await;
    }

    async fn step(&self, chat_id: ChatId) -> Option<Step> {
        self.bot.sessions().get(chat_id).await.and_then(|s| s.step)
    }
}

const HOTEL_ANSWERS: &[&str] = &[
    NEW_REQUEST,
    HOTEL,
    "Tbilisi",
    "01.09–07.09",
    "2 adults",
    ROOMS[0],
    STARS[3],
    YES,
    "Old town",
    "100 USD per night",
    "@traveller",
    "IVAN IVANOV",
    "01.01.1990",
    "Georgia",
    "AB1234567",
    "01.01.2030",
];

#[tokio::test]
async fn hotel_round_trip() {
    let h = Harness::new().await;
    h.say_all(CLIENT, HOTEL_ANSWERS).await;
    assert_eq!(h.step(CLIENT).await, Some(Step::Attachments));

    h.send_photo(CLIENT, "photo-1").await;
    h.send_document(CLIENT, "passport-scan").await;
    h.send_photo(CLIENT, "photo-2").await;
    h.say(CLIENT, DONE).await;

    let requests = h.db.list_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.chat_id, CLIENT);
    assert_eq!(request.form_type.as_deref(), Some("hotel"));
    let f = &request.fields;
    assert_eq!(f.route.as_deref(), Some("Tbilisi"));
    assert_eq!(f.rooms.as_deref(), Some(ROOMS[0]));
    assert_eq!(f.stars.as_deref(), Some(STARS[3]));
    assert_eq!(f.breakfast.as_deref(), Some(YES));
    assert_eq!(f.location_pref.as_deref(), Some("Old town"));
    assert_eq!(f.passport_exp.as_deref(), Some("01.01.2030"));
    // Flight-only fields stay empty.
    assert!(f.class.is_none());
    assert!(f.baggage.is_none());
    assert!(f.carriers.is_none());
    assert!(f.gender.is_none());

    let files = h.db.list_request_attachments().await.unwrap();
    let mut ordered: Vec<_> = files
        .iter()
        .map(|r| (r.id, r.kind.clone(), r.file_id.clone()))
        .collect();
    ordered.sort_by_key(|(id, _, _)| *id);
    let ids: Vec<_> = ordered.iter().map(|(_, _, f)| f.clone().unwrap()).collect();
    assert_eq!(ids, vec!["photo-1", "passport-scan", "photo-2"]);
    assert!(files.iter().all(|r| r.parent_id == request.id));

    let staff = h.messenger.sent_to(STAFF);
    let summary = staff[0].text.as_deref().unwrap();
    assert!(summary.contains("City: Tbilisi"));
    assert!(summary.ends_with(&format!("From user: @traveller (id {CLIENT})")));
    assert_eq!(staff[1].photos, vec!["photo-1", "photo-2"]);
    assert_eq!(staff[2].document.as_deref(), Some("passport-scan"));

    let thanks = h.messenger.texts_to(CLIENT);
    assert!(thanks.last().unwrap().starts_with("Thank you! Your request has been sent."));
}

#[tokio::test]
async fn repeated_done_creates_no_duplicate() {
    let h = Harness::new().await;
    h.say_all(CLIENT, HOTEL_ANSWERS).await;
    h.say(CLIENT, DONE).await;
    h.say(CLIENT, DONE).await;
    h.say(CLIENT, DONE).await;

    assert_eq!(h.db.list_requests().await.unwrap().len(), 1);
    assert_eq!(h.messenger.sent_to(STAFF).len(), 1);
    let texts = h.messenger.texts_to(CLIENT);
    assert_eq!(texts.last().unwrap(), "This request has already been sent ✅");
}

#[tokio::test]
async fn new_flow_does_not_inherit_previous_state() {
    let h = Harness::new().await;
    h.say_all(CLIENT, HOTEL_ANSWERS).await;
    h.send_photo(CLIENT, "photo-1").await;
    h.say(CLIENT, DONE).await;

    h.say_all(CLIENT, &[NEW_REQUEST, FLIGHT]).await;
    let session = h.bot.sessions().get(CLIENT).await.unwrap();
    assert!(!session.submitted);
    assert!(session.attachments.is_empty());
    assert_eq!(session.answer_keys(), vec!["type"]);
    assert_eq!(session.step, Some(Step::Route));
}

#[tokio::test]
async fn cancel_mid_flow_starts_fresh() {
    let h = Harness::new().await;
    h.say_all(CLIENT, &[NEW_REQUEST, HOTEL, "Tbilisi", CANCEL]).await;
    assert!(h.bot.sessions().get(CLIENT).await.is_none());

    // Free text now hits the fallback, not the old flow.
    h.say(CLIENT, "01.09–07.09").await;
    assert!(h.bot.sessions().get(CLIENT).await.is_none());
    assert!(h
        .messenger
        .texts_to(CLIENT)
        .last()
        .unwrap()
        .starts_with("I didn't understand that"));
}

#[tokio::test]
async fn attachment_without_session_is_ignored() {
    let h = Harness::new().await;
    h.send_photo(CLIENT, "stray").await;

    assert!(h.bot.sessions().get(CLIENT).await.is_none());
    assert!(h.messenger.all().is_empty());
    assert!(h.db.list_request_attachments().await.unwrap().is_empty());
    assert!(h.db.list_payment_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn payment_notification_round_trip() {
    let h = Harness::new().await;
    h.say_all(CLIENT, &[I_HAVE_PAID, "60 000 руб", "17.08.2025 15:40", "transfer"])
        .await;
    assert_eq!(h.step(CLIENT).await, Some(Step::PayAttach));
    h.send_photo(CLIENT, "receipt").await;
    h.say(CLIENT, SEND).await;

    let payments = h.db.list_payments().await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount_raw.as_deref(), Some("60 000 руб"));
    assert_eq!(payments[0].amount.as_deref(), Some("60000"));
    assert_eq!(payments[0].currency.as_deref(), Some("RUB"));
    assert_eq!(h.db.list_payment_files().await.unwrap().len(), 1);

    let staff = h.messenger.sent_to(STAFF);
    assert!(staff[0]
        .text
        .as_deref()
        .unwrap()
        .starts_with("<b>Payment notification</b>"));
    assert_eq!(staff[1].photos, vec!["receipt"]);
}

#[tokio::test]
async fn invoice_from_staff_chat() {
    let h = Harness::new().await;
    h.bot
        .handle(InboundEvent::text(STAFF, "/invoice 555 65000 USD 500 deposit").with_sender(1))
        .await;

    let client = h.messenger.texts_to(555);
    assert!(client[0].contains("Amount due: <b>65500.00 USD</b>"));
    assert!(client[0].contains("deposit"));
    assert_eq!(
        h.messenger.texts_to(STAFF).last().unwrap(),
        "Invoice sent to the client: 65500.00 USD."
    );
}

#[tokio::test]
async fn invoice_replying_to_a_summary_card() {
    let h = Harness::new().await;
    let card = RepliedMessage {
        text: Some("<b>New TripBuddy request</b> 🏨\n...\nFrom user: @someone (id -100200300)".into()),
        ..Default::default()
    };
    h.bot
        .handle(
            InboundEvent::text(STAFF, "/invoice 1500.50 EUR")
                .with_sender(1)
                .with_reply(card),
        )
        .await;

    // The card's id is the staff chat itself here; the invoice lands there.
    let texts = h.messenger.texts_to(STAFF);
    assert!(texts.iter().any(|t| t.contains("Amount due: <b>1500.50 EUR</b>")));
    assert_eq!(texts.last().unwrap(), "Invoice sent to the client: 1500.50 EUR.");
}

#[tokio::test]
async fn staff_commands_are_refused_elsewhere() {
    let h = Harness::new().await;
    h.say(CLIENT, "/stats").await;
    h.say(CLIENT, "/pm 555 hi").await;

    assert_eq!(
        h.messenger.texts_to(CLIENT),
        vec![
            "This command is available to the administrator only.",
            "This command is available to the administrator only."
        ]
    );
    assert!(h.messenger.sent_to(555).is_empty());
}
