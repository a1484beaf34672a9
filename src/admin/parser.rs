//! Admin command parsing.
//!
//! Every function here is pure: it turns a command's argument text (and,
//! where relevant, the message it replies to) into structured parameters.
//! Side effects live in [`super::commands`].

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::attachments::Attachment;
use crate::channels::{ChatId, RepliedMessage};
use crate::error::CommandError;

use super::invoice::Invoice;

/// Currency codes `/invoice` recognizes.
pub const KNOWN_CURRENCIES: [&str; 4] = ["RUB", "USD", "EUR", "GEL"];

/// Summary cards end with `(id <chat id>)`; this recovers the id.
static REPLY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id (-?\d+)\)").expect("valid regex"));

static IDENTITY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+$").expect("valid regex"));

static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));

static PAYMENT_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d\s.,]+)\s*([A-Za-zА-Яа-я]{3})?").expect("valid regex")
});

/// A `/command` split into its name and the rest of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    /// Lower-cased, without the slash or any `@botname` suffix.
    pub name: String,
    /// Everything after the command word, trimmed.
    pub args: &'a str,
}

/// Split `/name@bot rest of line` into name and args.
///
/// Returns `None` for text that is not a command.
pub fn parse_command(text: &str) -> Option<CommandLine<'_>> {
    let text = text.trim_start();
    let rest = text.strip_prefix('/')?;
    let (word, args) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };
    let name = word.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(CommandLine {
        name: name.to_lowercase(),
        args,
    })
}

/// Find `id <number>)` in a replied-to card.
pub fn extract_reply_id(text: &str) -> Option<ChatId> {
    REPLY_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn reply_id(reply: Option<&RepliedMessage>) -> Option<ChatId> {
    reply.and_then(RepliedMessage::body).and_then(extract_reply_id)
}

fn identity_token(token: &str) -> Option<ChatId> {
    if IDENTITY_TOKEN.is_match(token) {
        token.parse().ok()
    } else {
        None
    }
}

/// Target identity from a leading numeric argument, else from the replied-to
/// card. Returns the target and the arguments left after it.
fn target_and_rest<'a>(
    args: &'a str,
    reply: Option<&RepliedMessage>,
) -> Option<(ChatId, &'a str)> {
    let args = args.trim();
    let (first, rest) = match args.find(char::is_whitespace) {
        Some(pos) => (&args[..pos], args[pos..].trim()),
        None => (args, ""),
    };
    if let Some(id) = identity_token(first) {
        return Some((id, rest));
    }
    reply_id(reply).map(|id| (id, args))
}

/// Resolve the target of `/find` or `/confirmpaid`.
pub fn resolve_target(args: &str, reply: Option<&RepliedMessage>) -> Option<ChatId> {
    target_and_rest(args, reply).map(|(id, _)| id)
}

/// Strip spaces and non-breaking spaces, use `.` as decimal separator.
pub fn normalize_number(token: &str) -> String {
    token
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{00A0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

/// Whether `token` is a fixed-point number after normalization.
pub fn is_number_token(token: &str) -> bool {
    NUMBER_TOKEN.is_match(&normalize_number(token))
}

fn parse_number(token: &str) -> Option<Decimal> {
    let normalized = normalize_number(token);
    if !NUMBER_TOKEN.is_match(&normalized) {
        return None;
    }
    Decimal::from_str(&normalized).ok()
}

/// Parse `/invoice` arguments.
///
/// Grammar: `[target] base [currency] [fee] [note...]`, scanned left to
/// right after the optional target: the first number is the base, a known
/// currency code sets the currency, the next number is the fee, anything
/// else joins the note. Without a leading target the id comes from the
/// replied-to card.
pub fn parse_invoice(
    args: &str,
    reply: Option<&RepliedMessage>,
    default_currency: &str,
) -> Result<Invoice, CommandError> {
    // Non-breaking spaces stay inside a token so "65 000" reads as one number.
    let tokens: Vec<&str> = args.split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return Err(CommandError::Usage(
            "Usage: /invoice <chat_id> <base> [currency] [fee] [note...] \
             or, as a reply to a request card: /invoice <base> [currency] [fee] [note...]"
                .into(),
        ));
    }

    let mut target = identity_token(tokens[0]);
    let scan = if target.is_some() { &tokens[1..] } else { &tokens[..] };

    let mut base_tok: Option<&str> = None;
    let mut fee_tok: Option<&str> = None;
    let mut currency = default_currency.to_uppercase();
    let mut note_parts: Vec<&str> = Vec::new();

    for &token in scan {
        let upper = token.to_uppercase();
        if base_tok.is_none() && is_number_token(token) {
            base_tok = Some(token);
        } else if KNOWN_CURRENCIES.contains(&upper.as_str()) {
            currency = upper;
        } else if fee_tok.is_none() && is_number_token(token) {
            fee_tok = Some(token);
        } else {
            note_parts.push(token);
        }
    }

    if target.is_none() {
        let Some(reply) = reply else {
            return Err(CommandError::MissingTarget(
                "Either use /invoice <chat_id> <base> [currency] [fee] [note], \
                 or reply to a request card with the command."
                    .into(),
            ));
        };
        target = reply.body().and_then(extract_reply_id);
        if target.is_none() {
            return Err(CommandError::MissingTarget(
                "No user id found in the card. Reply to a request card with /invoice.".into(),
            ));
        }
    }
    let target = target.unwrap_or_default();

    let base = base_tok
        .and_then(parse_number)
        .ok_or_else(|| CommandError::InvalidAmount(base_tok.unwrap_or_default().to_string()))?;
    let fee = fee_tok.and_then(parse_number).unwrap_or(Decimal::ZERO);

    Ok(Invoice {
        target,
        base,
        fee,
        currency,
        note: note_parts.join(" ").trim().to_string(),
    })
}

/// Parse `/pm <id> <text>` (or, as a reply to a card, `/pm <text>`).
pub fn parse_pm(
    args: &str,
    reply: Option<&RepliedMessage>,
) -> Result<(ChatId, String), CommandError> {
    let usage = || CommandError::Usage("Example: /pm 123456789 Hello! We are ready to book.".into());
    let (target, text) = target_and_rest(args, reply).ok_or_else(usage)?;
    if text.is_empty() {
        return Err(usage());
    }
    Ok((target, text.to_string()))
}

/// What `/senddoc` forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDoc {
    pub target: ChatId,
    pub attachment: Attachment,
    pub caption: Option<String>,
}

/// Parse `/senddoc <id>` issued as a reply to a message with a file.
pub fn parse_senddoc(
    args: &str,
    reply: Option<&RepliedMessage>,
) -> Result<SendDoc, CommandError> {
    let Some(reply) = reply else {
        return Err(CommandError::Usage(
            "Reply with this command to a message that has an attachment, e.g. /senddoc 123456789"
                .into(),
        ));
    };
    let target = resolve_target(args, Some(reply)).ok_or_else(|| {
        CommandError::MissingTarget(
            "Example: reply to a message with a PDF/photo and type /senddoc 123456789".into(),
        )
    })?;
    let attachment = reply.attachment().ok_or_else(|| {
        CommandError::Usage("No document or photo found in the replied message.".into())
    })?;
    Ok(SendDoc {
        target,
        attachment,
        caption: reply.caption.clone().filter(|c| !c.is_empty()),
    })
}

/// Split a typed payment amount such as `60000 RUB` or `70,5 usd` into
/// (amount, currency).
///
/// Whitespace is removed from the amount and the currency upper-cased, with
/// `РУБ` read as `RUB`. Text with no digits at all is kept whole as the
/// amount with an empty currency.
pub fn parse_payment_amount(raw: &str) -> (String, String) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (String::new(), String::new());
    }
    let Some(caps) = PAYMENT_AMOUNT.captures(raw) else {
        return (raw.to_string(), String::new());
    };
    let amount: String = caps
        .get(1)
        .map(|m| m.as_str().chars().filter(|c| !c.is_whitespace()).collect())
        .unwrap_or_default();
    let mut currency = caps
        .get(2)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_default();
    if currency == "РУБ" {
        currency = "RUB".to_string();
    }
    (amount, currency)
}

/// Numeric value of a stored payment amount; unparsable amounts count as 0.
pub fn amount_value(amount: &str) -> Decimal {
    parse_number(amount).unwrap_or(Decimal::ZERO)
}
