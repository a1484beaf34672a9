//! Admin and diagnostic command handlers.
//!
//! Parsing lives in [`super::parser`]; this module performs the side effects
//! (storage reads, sends to clients) and replies to whoever issued the
//! command.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::channels::{ChatId, InboundEvent, Messenger, SendOptions, escape_html};
use crate::config::BotConfig;
use crate::error::{CommandError, DatabaseError, Error};
use crate::flow::keyboard::paid_button;
use crate::session::SessionStore;
use crate::store::{Database, ExportFile, export_all};

use super::guard::AccessGuard;
use super::parser::{amount_value, parse_invoice, parse_pm, parse_senddoc, resolve_target};

/// Every `/command` the bot answers to besides the user-facing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Stats,
    ExportCsv,
    Find,
    Invoice,
    ConfirmPaid,
    Pm,
    SendDoc,
    Migrate,
    Ping,
    State,
    IAmAdmin,
    GroupId,
}

impl AdminCommand {
    /// Look up a command by its lower-cased name (no slash).
    pub fn from_name(name: &str) -> Option<Self> {
        let cmd = match name {
            "stats" => Self::Stats,
            "export_csv" => Self::ExportCsv,
            "find" => Self::Find,
            "invoice" => Self::Invoice,
            "confirmpaid" => Self::ConfirmPaid,
            "pm" => Self::Pm,
            "senddoc" => Self::SendDoc,
            "migrate" => Self::Migrate,
            "ping" => Self::Ping,
            "state" | "whereami" => Self::State,
            "iamadmin" => Self::IAmAdmin,
            "groupid" => Self::GroupId,
            _ => return None,
        };
        Some(cmd)
    }

    /// Whether the access guard must approve the invoker first.
    pub fn is_guarded(&self) -> bool {
        matches!(
            self,
            Self::Stats
                | Self::ExportCsv
                | Self::Find
                | Self::Invoice
                | Self::ConfirmPaid
                | Self::Pm
                | Self::SendDoc
                | Self::Migrate
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::ExportCsv => "export_csv",
            Self::Find => "find",
            Self::Invoice => "invoice",
            Self::ConfirmPaid => "confirmpaid",
            Self::Pm => "pm",
            Self::SendDoc => "senddoc",
            Self::Migrate => "migrate",
            Self::Ping => "ping",
            Self::State => "state",
            Self::IAmAdmin => "iamadmin",
            Self::GroupId => "groupid",
        }
    }
}

const PAYMENT_CONFIRMED: &str =
    "✅ Payment confirmed. Thank you! We will send the booking documents shortly.";

const AFTER_INVOICE: &str = "After paying, tap “✅ I have paid” and send the receipt.";

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    pub messenger: &'a dyn Messenger,
    pub db: &'a dyn Database,
    pub sessions: &'a SessionStore,
    pub config: &'a BotConfig,
    pub guard: &'a AccessGuard,
}

impl CommandContext<'_> {
    /// Run `cmd` for `event` and reply to the invoker.
    pub async fn run(&self, cmd: AdminCommand, args: &str, event: &InboundEvent) {
        info!(chat_id = event.chat_id, command = cmd.name(), "Admin command");

        let reply = if cmd.is_guarded() {
            match self.guard.check(event) {
                Ok(()) => self.execute(cmd, args, event).await,
                Err(e) => {
                    warn!(
                        chat_id = event.chat_id,
                        command = cmd.name(),
                        "Rejected unprivileged command"
                    );
                    Err(e)
                }
            }
        } else {
            self.execute(cmd, args, event).await
        };

        let text = match reply {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => e.to_string(),
        };
        self.reply(event, &text).await;
    }

    async fn execute(
        &self,
        cmd: AdminCommand,
        args: &str,
        event: &InboundEvent,
    ) -> Result<Option<String>, CommandError> {
        let reply = event.reply_to.as_ref();
        match cmd {
            AdminCommand::Stats => Ok(Some(
                match stats_report(self.db, &self.config.default_currency, Utc::now()).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Stats query failed");
                        format!("Stats error: {e}")
                    }
                },
            )),
            AdminCommand::ExportCsv => match self.export(event.chat_id).await {
                Ok(()) => Ok(None),
                Err(e) => {
                    warn!(error = %e, "CSV export failed");
                    Ok(Some(format!("Export error: {e}")))
                }
            },
            AdminCommand::Find => {
                let target = resolve_target(args, reply).ok_or_else(|| {
                    CommandError::MissingTarget(
                        "Example: /find 123456789 (or reply to a request card)".into(),
                    )
                })?;
                Ok(Some(self.find(target).await))
            }
            AdminCommand::Invoice => {
                let invoice = parse_invoice(args, reply, &self.config.default_currency)?;
                let text = invoice.render(&self.config.payment_details);
                let sent = async {
                    self.messenger
                        .send_text(invoice.target, &text, SendOptions::default())
                        .await?;
                    self.messenger
                        .send_keyboard(invoice.target, AFTER_INVOICE, paid_button())
                        .await
                }
                .await;
                Ok(Some(match sent {
                    Ok(_) => {
                        info!(
                            client = invoice.target,
                            total = %invoice.total(),
                            currency = %invoice.currency,
                            "Invoice sent"
                        );
                        format!(
                            "Invoice sent to the client: {} {}.",
                            invoice.format_total(),
                            invoice.currency
                        )
                    }
                    Err(e) => {
                        warn!(client = invoice.target, error = %e, "Failed to send invoice");
                        format!("Could not send the invoice: {e}")
                    }
                }))
            }
            AdminCommand::ConfirmPaid => {
                let target = resolve_target(args, reply).ok_or_else(|| {
                    CommandError::MissingTarget(
                        "Example: /confirmpaid 123456789 (or reply to a request card)".into(),
                    )
                })?;
                Ok(Some(
                    match self
                        .messenger
                        .send_text(target, PAYMENT_CONFIRMED, SendOptions::default())
                        .await
                    {
                        Ok(_) => "The client has been notified that the payment is confirmed."
                            .to_string(),
                        Err(e) => format!("Send error: {e}"),
                    },
                ))
            }
            AdminCommand::Pm => {
                let (target, text) = parse_pm(args, reply)?;
                Ok(Some(
                    match self
                        .messenger
                        .send_text(target, &text, SendOptions::default())
                        .await
                    {
                        Ok(_) => "Sent to the client.".to_string(),
                        Err(e) => format!("Send error: {e}"),
                    },
                ))
            }
            AdminCommand::SendDoc => {
                let doc = parse_senddoc(args, reply)?;
                Ok(Some(
                    match self
                        .messenger
                        .send_attachment(doc.target, &doc.attachment, doc.caption.as_deref())
                        .await
                    {
                        Ok(()) => "Attachment sent to the client.".to_string(),
                        Err(e) => format!("Could not send: {e}"),
                    },
                ))
            }
            AdminCommand::Migrate => Ok(Some(match self.db.ensure_columns().await {
                Ok(added) => {
                    info!(added, "Column migration finished");
                    "Migration: ok ✅".to_string()
                }
                Err(e) => {
                    warn!(error = %e, "Column migration failed");
                    format!("Migration: error: {e}")
                }
            })),
            AdminCommand::Ping => Ok(Some("pong".to_string())),
            AdminCommand::State => Ok(Some(self.state(event.chat_id).await)),
            AdminCommand::IAmAdmin => Ok(Some(self.whoami(event))),
            AdminCommand::GroupId => Ok(Some(format!("chat_id: {}", event.chat_id))),
        }
    }

    async fn export(&self, chat_id: ChatId) -> Result<(), Error> {
        for ExportFile { file_name, bytes } in export_all(self.db).await? {
            self.messenger
                .send_document_bytes(chat_id, bytes, &file_name)
                .await?;
        }
        Ok(())
    }

    async fn find(&self, target: ChatId) -> String {
        let record = match self.db.latest_request_for_chat(target).await {
            Ok(Some(record)) => record,
            Ok(None) => return "No requests found.".to_string(),
            Err(e) => {
                warn!(client = target, error = %e, "Request lookup failed");
                return format!("Lookup error: {e}");
            }
        };
        let show = |value: Option<&str>| {
            value
                .filter(|v| !v.is_empty())
                .map(escape_html)
                .unwrap_or_else(|| "—".to_string())
        };
        format!(
            "<b>Latest request</b>\n\
             chat_id: {}\n\
             Type: {}\n\
             Route/City: {}\n\
             Dates: {}\n\
             Contact: {}\n\
             Created: {}",
            record.chat_id,
            show(record.form_type.as_deref()),
            show(record.fields.route.as_deref()),
            show(record.fields.dates.as_deref()),
            show(record.fields.contact.as_deref()),
            show(record.created_at.as_deref()),
        )
    }

    async fn state(&self, chat_id: ChatId) -> String {
        let session = self.sessions.get(chat_id).await.unwrap_or_default();
        let step = session
            .step
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "—".to_string());
        let keys = session.answer_keys();
        let keys = if keys.is_empty() {
            "—".to_string()
        } else {
            keys.join(", ")
        };
        format!("Current step: {step}\nAnswer keys: {keys}")
    }

    fn whoami(&self, event: &InboundEvent) -> String {
        let is_admin = self
            .guard
            .is_privileged(event.chat_id, event.sender_username.as_deref());
        format!(
            "is_admin={}\nwho={} (id {})\nwhere=chat_id={}\nADMIN_USERNAME={}\nADMIN_GROUP_ID={}",
            is_admin,
            escape_html(&event.display_username()),
            event.sender_id,
            event.chat_id,
            self.config
                .admin_username
                .as_deref()
                .map(escape_html)
                .unwrap_or_else(|| "—".to_string()),
            self.config
                .admin_group_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "—".to_string()),
        )
    }

    async fn reply(&self, event: &InboundEvent, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(event.chat_id, text, SendOptions::reply_to(event.message_id))
            .await
        {
            warn!(chat_id = event.chat_id, error = %e, "Failed to reply to command");
        }
    }
}

/// Counts for today (from UTC midnight) and the last seven days, plus the
/// seven-day payment sum per currency.
pub async fn stats_report(
    db: &dyn Database,
    default_currency: &str,
    now: DateTime<Utc>,
) -> Result<String, DatabaseError> {
    let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let week = today - Duration::days(6);

    let requests_today = db.count_requests_since(today).await?;
    let requests_week = db.count_requests_since(week).await?;
    let payments_today = db.count_payments_since(today).await?;
    let payments_week = db.count_payments_since(week).await?;

    let mut sums: BTreeMap<String, Decimal> = BTreeMap::new();
    for payment in db.payments_since(week).await? {
        let currency = payment
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| default_currency.to_string());
        *sums.entry(currency).or_default() += amount_value(payment.amount.as_deref().unwrap_or(""));
    }
    let sums = if sums.is_empty() {
        "—".to_string()
    } else {
        sums.iter()
            .map(|(currency, sum)| format!("{} {currency}", sum.normalize()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    Ok(format!(
        "<b>Statistics</b>\n\n\
         Requests: today {requests_today} / 7 days {requests_week}\n\
         Payments: today {payments_today} / 7 days {payments_week}\n\
         Sum (7d): {sums}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::Attachment;
    use crate::channels::{RecordingMessenger, RepliedMessage};
    use crate::flow::FormType;
    use crate::flow::keyboard::I_HAVE_PAID;
    use crate::session::Session;
    use crate::store::{LibSqlBackend, NewPayment, NewRequest, RequestFields};

    const ADMIN_CHAT: ChatId = -100200300;

    struct Fixture {
        messenger: RecordingMessenger,
        db: LibSqlBackend,
        sessions: SessionStore,
        config: BotConfig,
        guard: AccessGuard,
    }

    impl Fixture {
        async fn new() -> Self {
            let mut config = BotConfig::for_token("test");
            config.admin_group_id = Some(ADMIN_CHAT);
            config.payment_details = "Bank: Example Bank".into();
            Self {
                messenger: RecordingMessenger::new(),
                db: LibSqlBackend::new_memory().await.unwrap(),
                sessions: SessionStore::new(),
                guard: AccessGuard::from_config(&config),
                config,
            }
        }

        fn ctx(&self) -> CommandContext<'_> {
            CommandContext {
                messenger: &self.messenger,
                db: &self.db,
                sessions: &self.sessions,
                config: &self.config,
                guard: &self.guard,
            }
        }

        async fn run(&self, text: &str, event: InboundEvent) {
            let line = crate::admin::parser::parse_command(text).unwrap();
            let cmd = AdminCommand::from_name(&line.name).unwrap();
            self.ctx().run(cmd, line.args, &event).await;
        }

        fn last_reply(&self, chat: ChatId) -> String {
            self.messenger
                .last_to(chat)
                .and_then(|o| o.text)
                .unwrap_or_default()
        }
    }

    fn admin_event(text: &str) -> InboundEvent {
        InboundEvent {
            message_id: 77,
            ..InboundEvent::text(ADMIN_CHAT, text).with_sender(5)
        }
    }

    #[test]
    fn command_names_and_guarding() {
        assert_eq!(AdminCommand::from_name("whereami"), Some(AdminCommand::State));
        assert_eq!(AdminCommand::from_name("export_csv"), Some(AdminCommand::ExportCsv));
        assert_eq!(AdminCommand::from_name("start"), None);
        assert!(AdminCommand::Invoice.is_guarded());
        assert!(!AdminCommand::Ping.is_guarded());
        assert!(!AdminCommand::IAmAdmin.is_guarded());
    }

    #[tokio::test]
    async fn unprivileged_caller_is_rejected_without_side_effects() {
        let fx = Fixture::new().await;
        fx.run("/pm 555 hello", InboundEvent::text(9, "/pm 555 hello")).await;
        assert_eq!(
            fx.last_reply(9),
            "This command is available to the administrator only."
        );
        assert!(fx.messenger.sent_to(555).is_empty());
    }

    #[tokio::test]
    async fn ping_replies_to_the_command_message() {
        let fx = Fixture::new().await;
        fx.run("/ping", InboundEvent::text(9, "/ping")).await;
        let out = fx.messenger.last_to(9).unwrap();
        assert_eq!(out.text.as_deref(), Some("pong"));
        assert_eq!(out.reply_to, Some(0));
    }

    #[tokio::test]
    async fn invoice_goes_to_client_with_paid_button() {
        let fx = Fixture::new().await;
        fx.run(
            "/invoice 555 65000 USD 500 deposit",
            admin_event("/invoice 555 65000 USD 500 deposit"),
        )
        .await;

        let client = fx.messenger.sent_to(555);
        assert_eq!(client.len(), 2);
        let invoice = client[0].text.as_deref().unwrap();
        assert!(invoice.contains("Amount due: <b>65500.00 USD</b>"));
        assert!(invoice.contains("deposit"));
        assert!(invoice.contains("Bank: Example Bank"));
        assert!(client[1].keyboard.as_ref().unwrap().contains(I_HAVE_PAID));

        let confirm = fx.messenger.last_to(ADMIN_CHAT).unwrap();
        assert_eq!(
            confirm.text.as_deref(),
            Some("Invoice sent to the client: 65500.00 USD.")
        );
        assert_eq!(confirm.reply_to, Some(77));
    }

    #[tokio::test]
    async fn invoice_target_from_replied_card() {
        let fx = Fixture::new().await;
        let card = RepliedMessage {
            text: Some("New request ... From user: @bob (id -100200301)".into()),
            ..Default::default()
        };
        fx.run("/invoice 1000.00", admin_event("/invoice 1000.00").with_reply(card))
            .await;
        assert_eq!(fx.messenger.sent_to(-100200301).len(), 2);
        assert_eq!(
            fx.last_reply(ADMIN_CHAT),
            "Invoice sent to the client: 1000 RUB."
        );
    }

    #[tokio::test]
    async fn invoice_usage_errors_are_replied() {
        let fx = Fixture::new().await;
        fx.run("/invoice", admin_event("/invoice")).await;
        assert!(fx.last_reply(ADMIN_CHAT).starts_with("Usage: /invoice"));

        fx.run("/invoice 65000.50", admin_event("/invoice 65000.50")).await;
        assert!(fx.last_reply(ADMIN_CHAT).starts_with("Either use /invoice"));

        // A bare integer is read as the target, leaving no base amount.
        fx.run("/invoice 65000", admin_event("/invoice 65000")).await;
        assert!(fx.last_reply(ADMIN_CHAT).starts_with("Base amount is invalid"));
    }

    #[tokio::test]
    async fn invoice_dispatch_failure_is_reported() {
        let mut fx = Fixture::new().await;
        fx.messenger = RecordingMessenger::new().failing_for(555);
        fx.run("/invoice 555 100", admin_event("/invoice 555 100")).await;
        assert!(fx
            .last_reply(ADMIN_CHAT)
            .starts_with("Could not send the invoice:"));
    }

    #[tokio::test]
    async fn confirmpaid_and_pm() {
        let fx = Fixture::new().await;
        fx.run("/confirmpaid 555", admin_event("/confirmpaid 555")).await;
        assert_eq!(fx.messenger.texts_to(555), vec![PAYMENT_CONFIRMED.to_string()]);
        assert_eq!(
            fx.last_reply(ADMIN_CHAT),
            "The client has been notified that the payment is confirmed."
        );

        fx.run("/pm 555 <b>Hi</b> there", admin_event("/pm 555 <b>Hi</b> there"))
            .await;
        assert_eq!(fx.messenger.texts_to(555)[1], "<b>Hi</b> there");
        assert_eq!(fx.last_reply(ADMIN_CHAT), "Sent to the client.");

        fx.run("/pm 555", admin_event("/pm 555")).await;
        assert!(fx.last_reply(ADMIN_CHAT).starts_with("Example: /pm"));
    }

    #[tokio::test]
    async fn senddoc_forwards_replied_file() {
        let fx = Fixture::new().await;
        let reply = RepliedMessage {
            document: Some("voucher-file".into()),
            caption: Some("Your voucher".into()),
            ..Default::default()
        };
        fx.run("/senddoc 555", admin_event("/senddoc 555").with_reply(reply))
            .await;
        let out = fx.messenger.last_to(555).unwrap();
        assert_eq!(out.document.as_deref(), Some("voucher-file"));
        assert_eq!(out.caption.as_deref(), Some("Your voucher"));
        assert_eq!(fx.last_reply(ADMIN_CHAT), "Attachment sent to the client.");
    }

    #[tokio::test]
    async fn find_reports_latest_request() {
        let fx = Fixture::new().await;
        fx.run("/find 555", admin_event("/find 555")).await;
        assert_eq!(fx.last_reply(ADMIN_CHAT), "No requests found.");

        let mut fields = RequestFields::default();
        fields.route = Some("Tbilisi".into());
        fields.contact = Some("+995 555".into());
        fx.db
            .insert_request(&NewRequest {
                chat_id: 555,
                form_type: FormType::Hotel,
                fields,
            })
            .await
            .unwrap();

        fx.run("/find 555", admin_event("/find 555")).await;
        let text = fx.last_reply(ADMIN_CHAT);
        assert!(text.starts_with("<b>Latest request</b>\nchat_id: 555\nType: hotel\n"));
        assert!(text.contains("Route/City: Tbilisi\n"));
        assert!(text.contains("Dates: —\n"));
    }

    #[tokio::test]
    async fn export_sends_four_files() {
        let fx = Fixture::new().await;
        fx.run("/export_csv", admin_event("/export_csv")).await;
        let names: Vec<String> = fx
            .messenger
            .sent_to(ADMIN_CHAT)
            .into_iter()
            .filter_map(|o| o.file_name)
            .collect();
        assert_eq!(
            names,
            vec![
                "requests.csv",
                "request_attachments.csv",
                "payments.csv",
                "payment_files.csv"
            ]
        );
    }

    #[tokio::test]
    async fn migrate_and_stats() {
        let fx = Fixture::new().await;
        fx.run("/migrate", admin_event("/migrate")).await;
        assert_eq!(fx.last_reply(ADMIN_CHAT), "Migration: ok ✅");

        for (amount, currency) in [("60000", "RUB"), ("70.5", "USD"), ("500", "")] {
            fx.db
                .insert_payment(&NewPayment {
                    chat_id: 1,
                    amount_raw: format!("{amount} {currency}"),
                    amount: amount.into(),
                    currency: currency.into(),
                    pay_method: None,
                    pay_date: None,
                })
                .await
                .unwrap();
        }
        let report = stats_report(&fx.db, "RUB", Utc::now()).await.unwrap();
        assert!(report.contains("Requests: today 0 / 7 days 0\n"));
        assert!(report.contains("Payments: today 3 / 7 days 3\n"));
        assert!(report.contains("Sum (7d): 60500 RUB, 70.5 USD"));

        let later = Utc::now() + Duration::days(30);
        let report = stats_report(&fx.db, "RUB", later).await.unwrap();
        assert!(report.contains("Payments: today 0 / 7 days 0\n"));
        assert!(report.ends_with("Sum (7d): —"));
    }

    #[tokio::test]
    async fn diagnostics_are_open_to_everyone() {
        let fx = Fixture::new().await;
        let mut session = Session::start_request().0;
        session.answers.insert("type".into(), "hotel".into());
        session.attachments.push(Attachment::photo("p"));
        fx.sessions.set(9, session).await;

        fx.run("/whereami", InboundEvent::text(9, "/whereami")).await;
        assert_eq!(fx.last_reply(9), "Current step: type\nAnswer keys: type");

        fx.run("/groupid", InboundEvent::text(9, "/groupid")).await;
        assert_eq!(fx.last_reply(9), "chat_id: 9");

        fx.run(
            "/iamadmin",
            InboundEvent::text(9, "/iamadmin").with_username("carol"),
        )
        .await;
        let text = fx.last_reply(9);
        assert!(text.starts_with("is_admin=false\nwho=@carol (id 9)\nwhere=chat_id=9\n"));
        assert!(text.ends_with("ADMIN_USERNAME=—\nADMIN_GROUP_ID=-100200300"));
    }
}
