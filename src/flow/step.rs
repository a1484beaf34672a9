//! Flow steps and the transition table.
//!
//! Hotel and flight requests share a head (`type → route → dates`) and a tail
//! (`budget → contact → fullname → dob → … → attachments`) and branch at
//! `dates` and `dob`. The payment notification is its own short sequence.

use serde::{Deserialize, Serialize};

use crate::channels::Keyboard;

use super::keyboard::{self, CLASSES, DONE, FLIGHT, GENDERS, HOTEL, NO, ROOMS, SEND, SKIP, STARS, YES};

/// Which request form the user picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    Hotel,
    Flight,
}

impl FormType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hotel => "hotel",
            Self::Flight => "flight",
        }
    }

    /// Button label that selects this form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hotel => HOTEL,
            Self::Flight => FLIGHT,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            HOTEL => Some(Self::Hotel),
            FLIGHT => Some(Self::Flight),
            _ => None,
        }
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FormType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hotel" => Ok(Self::Hotel),
            "flight" => Ok(Self::Flight),
            other => Err(format!("unknown form type: {other}")),
        }
    }
}

/// Which flow a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Request,
    Payment,
}

/// What a step accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Any non-empty text.
    Text,
    /// Exactly one of the listed labels.
    Choice(&'static [&'static str]),
    /// Terminal step: one of the listed control tokens finishes the flow.
    Controls(&'static [&'static str]),
}

/// A single named position in a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Type,
    Route,
    Dates,
    // hotel
    Guests,
    Rooms,
    Stars,
    Breakfast,
    LocationPref,
    // flight
    Class,
    Baggage,
    Carriers,
    // shared tail
    Budget,
    Contact,
    #[serde(rename = "fullname")]
    FullName,
    Dob,
    Gender,
    Citizenship,
    PassportNo,
    PassportExp,
    Attachments,
    // payment
    PayAmount,
    PayDate,
    PayMethod,
    PayAttach,
}

/// Hotel request order.
pub const HOTEL_SEQUENCE: &[Step] = &[
    Step::Type,
    Step::Route,
    Step::Dates,
    Step::Guests,
    Step::Rooms,
    Step::Stars,
    Step::Breakfast,
    Step::LocationPref,
    Step::Budget,
    Step::Contact,
    Step::FullName,
    Step::Dob,
    Step::Citizenship,
    Step::PassportNo,
    Step::PassportExp,
    Step::Attachments,
];

/// Flight request order.
pub const FLIGHT_SEQUENCE: &[Step] = &[
    Step::Type,
    Step::Route,
    Step::Dates,
    Step::Class,
    Step::Baggage,
    Step::Carriers,
    Step::Budget,
    Step::Contact,
    Step::FullName,
    Step::Dob,
    Step::Gender,
    Step::Citizenship,
    Step::PassportNo,
    Step::PassportExp,
    Step::Attachments,
];

/// Payment notification order.
pub const PAYMENT_SEQUENCE: &[Step] = &[
    Step::PayAmount,
    Step::PayDate,
    Step::PayMethod,
    Step::PayAttach,
];

const TYPE_OPTIONS: &[&str] = &[HOTEL, FLIGHT];
const YES_NO_OPTIONS: &[&str] = &[YES, NO];
const ATTACHMENT_CONTROLS: &[&str] = &[SKIP, DONE];
const PAYMENT_CONTROLS: &[&str] = &[SKIP, SEND];

/// Text plus keyboard shown for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub keyboard: Keyboard,
}

impl Prompt {
    fn new(text: &str, keyboard: Keyboard) -> Self {
        Self {
            text: text.to_string(),
            keyboard,
        }
    }
}

impl Step {
    /// Field name the answer is stored under; also the step's display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Route => "route",
            Self::Dates => "dates",
            Self::Guests => "guests",
            Self::Rooms => "rooms",
            Self::Stars => "stars",
            Self::Breakfast => "breakfast",
            Self::LocationPref => "location_pref",
            Self::Class => "class",
            Self::Baggage => "baggage",
            Self::Carriers => "carriers",
            Self::Budget => "budget",
            Self::Contact => "contact",
            Self::FullName => "fullname",
            Self::Dob => "dob",
            Self::Gender => "gender",
            Self::Citizenship => "citizenship",
            Self::PassportNo => "passport_no",
            Self::PassportExp => "passport_exp",
            Self::Attachments => "attachments",
            Self::PayAmount => "pay_amount",
            Self::PayDate => "pay_date",
            Self::PayMethod => "pay_method",
            Self::PayAttach => "pay_attach",
        }
    }

    pub fn flow(&self) -> FlowKind {
        if self.is_payment() {
            FlowKind::Payment
        } else {
            FlowKind::Request
        }
    }

    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            Self::PayAmount | Self::PayDate | Self::PayMethod | Self::PayAttach
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Attachments | Self::PayAttach)
    }

    pub fn input(&self) -> Input {
        match self {
            Self::Type => Input::Choice(TYPE_OPTIONS),
            Self::Rooms => Input::Choice(&ROOMS),
            Self::Stars => Input::Choice(&STARS),
            Self::Breakfast | Self::Baggage => Input::Choice(YES_NO_OPTIONS),
            Self::Class => Input::Choice(&CLASSES),
            Self::Gender => Input::Choice(&GENDERS),
            Self::Attachments => Input::Controls(ATTACHMENT_CONTROLS),
            Self::PayAttach => Input::Controls(PAYMENT_CONTROLS),
            _ => Input::Text,
        }
    }

    /// Next step after an accepted answer.
    ///
    /// Keyed by (step, form type). Payment steps ignore the form type.
    /// Returns `None` for terminal steps and for combinations that cannot
    /// occur (a hotel-only step under a flight form, or no form yet).
    pub fn next(&self, form: Option<FormType>) -> Option<Step> {
        use FormType::{Flight, Hotel};
        use Step::*;

        match (self, form) {
            (PayAmount, _) => Some(PayDate),
            (PayDate, _) => Some(PayMethod),
            (PayMethod, _) => Some(PayAttach),
            (PayAttach, _) | (Attachments, _) => None,

            (_, None) => None,

            (Type, Some(_)) => Some(Route),
            (Route, Some(_)) => Some(Dates),
            (Dates, Some(Hotel)) => Some(Guests),
            (Dates, Some(Flight)) => Some(Class),

            (Guests, Some(Hotel)) => Some(Rooms),
            (Rooms, Some(Hotel)) => Some(Stars),
            (Stars, Some(Hotel)) => Some(Breakfast),
            (Breakfast, Some(Hotel)) => Some(LocationPref),
            (LocationPref, Some(Hotel)) => Some(Budget),

            (Class, Some(Flight)) => Some(Baggage),
            (Baggage, Some(Flight)) => Some(Carriers),
            (Carriers, Some(Flight)) => Some(Budget),

            (Budget, Some(_)) => Some(Contact),
            (Contact, Some(_)) => Some(FullName),
            (FullName, Some(_)) => Some(Dob),
            (Dob, Some(Hotel)) => Some(Citizenship),
            (Dob, Some(Flight)) => Some(Gender),
            (Gender, Some(Flight)) => Some(Citizenship),
            (Citizenship, Some(_)) => Some(PassportNo),
            (PassportNo, Some(_)) => Some(PassportExp),
            (PassportExp, Some(_)) => Some(Attachments),

            _ => None,
        }
    }

    /// The question asked when entering this step.
    pub fn prompt(&self, form: Option<FormType>) -> Prompt {
        let hotel = form != Some(FormType::Flight);
        match self {
            Self::Type => Prompt::new(
                "What kind of request? Please choose:",
                keyboard::type_menu(),
            ),
            Self::Route if hotel => Prompt::new(
                "🏙️ Destination city/country:",
                keyboard::cancel_menu(),
            ),
            Self::Route => Prompt::new("🛫 Route (from → to):", keyboard::cancel_menu()),
            Self::Dates => Prompt::new(
                "🗓️ Dates (e.g. 01.09–07.09 or “flexible ±2 days”):",
                keyboard::cancel_menu(),
            ),
            Self::Guests => Prompt::new(
                "👥 Number of guests and children (e.g. “2 adults, 1 child aged 5”):",
                keyboard::cancel_menu(),
            ),
            Self::Rooms => Prompt::new("🛏️ Number of rooms:", keyboard::rooms_menu()),
            Self::Stars => Prompt::new("⭐️ Preferred star rating:", keyboard::stars_menu()),
            Self::Breakfast => Prompt::new("🍳 Do you need breakfast?", keyboard::yes_no_menu()),
            Self::LocationPref => Prompt::new(
                "📍 Location preferences (center, seaside, district):",
                keyboard::cancel_menu(),
            ),
            Self::Class => Prompt::new("🪑 Cabin class:", keyboard::class_menu()),
            Self::Baggage => Prompt::new("🧳 Do you need checked baggage?", keyboard::yes_no_menu()),
            Self::Carriers => Prompt::new(
                "✈️ Preferred airlines (if any):",
                keyboard::cancel_menu(),
            ),
            Self::Budget if hotel => Prompt::new(
                "💰 Budget (per night / total):",
                keyboard::cancel_menu(),
            ),
            Self::Budget => Prompt::new("💰 Budget for the flight:", keyboard::cancel_menu()),
            Self::Contact => Prompt::new(
                "📞 How can we reach you? (Telegram @username or phone number):",
                keyboard::cancel_menu(),
            ),
            Self::FullName => Prompt::new(
                "🪪 Full name in Latin letters (as in the passport):",
                keyboard::cancel_menu(),
            ),
            Self::Dob => Prompt::new("🎂 Date of birth (DD.MM.YYYY):", keyboard::cancel_menu()),
            Self::Gender => Prompt::new("👤 Gender:", keyboard::gender_menu()),
            Self::Citizenship => Prompt::new("🌍 Citizenship:", keyboard::cancel_menu()),
            Self::PassportNo => Prompt::new("🔢 Passport number:", keyboard::cancel_menu()),
            Self::PassportExp => Prompt::new(
                "📅 Passport expiry date (DD.MM.YYYY):",
                keyboard::cancel_menu(),
            ),
            Self::Attachments => Prompt::new(
                "📎 Attach screenshots or documents (passport, sample tickets or hotels), one per message.\n\
                 When you are finished, tap <b>“Done ✅”</b> or “Skip ⏭️”.",
                keyboard::attachments_menu(),
            ),
            Self::PayAmount => Prompt::new(
                "💳 Enter the amount and currency (e.g. 60000 RUB):",
                keyboard::cancel_menu(),
            ),
            Self::PayDate => Prompt::new(
                "📅 Payment date and time (e.g. 17.08.2025 15:40):",
                keyboard::cancel_menu(),
            ),
            Self::PayMethod => Prompt::new(
                "🏦 Method: bank transfer / other bank / cash / other:",
                keyboard::cancel_menu(),
            ),
            Self::PayAttach => Prompt::new(
                "📎 Attach the receipt or a transfer screenshot (several are fine). \
                 When you are finished, tap “Send ✅” or “Skip ⏭️”.",
                keyboard::pay_finish_menu(),
            ),
        }
    }

    /// What to show when the input was not accepted.
    ///
    /// Question steps repeat their prompt verbatim; terminal steps explain
    /// the two control buttons.
    pub fn reprompt(&self, form: Option<FormType>) -> Prompt {
        match self {
            Self::Attachments => Prompt::new(
                "Add file(s) or tap “Done ✅” / “Skip ⏭️”.",
                keyboard::attachments_menu(),
            ),
            Self::PayAttach => Prompt::new(
                "Send file(s) or tap “Send ✅” / “Skip ⏭️”.",
                keyboard::pay_finish_menu(),
            ),
            _ => self.prompt(form),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
