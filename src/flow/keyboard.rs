//! Button labels and reply keyboards.
//!
//! Enumerated answers must match these labels exactly, so the flow and the
//! keyboards share one set of constants.

use crate::channels::Keyboard;

pub const CANCEL: &str = "❌ Cancel";

// Main menu
pub const NEW_REQUEST: &str = "📝 Submit a request";
pub const I_HAVE_PAID: &str = "✅ I have paid";
pub const OFFER: &str = "📄 Offer";
pub const CONTACT_ADMIN: &str = "💬 Contact admin";

// Form type
pub const HOTEL: &str = "🏨 Hotel";
pub const FLIGHT: &str = "✈️ Tickets";

pub const YES: &str = "Yes ✅";
pub const NO: &str = "No ❌";

pub const ROOMS: [&str; 3] = ["1 room", "2 rooms", "3+ rooms"];
pub const STARS: [&str; 5] = ["⭐️", "⭐️⭐️", "⭐️⭐️⭐️", "⭐️⭐️⭐️⭐️", "⭐️⭐️⭐️⭐️⭐️"];
pub const CLASSES: [&str; 4] = ["Economy", "Premium economy", "Business", "First"];
pub const GENDERS: [&str; 2] = ["M", "F"];

// Terminal controls
pub const SKIP: &str = "Skip ⏭️";
pub const DONE: &str = "Done ✅";
pub const SEND: &str = "Send ✅";

pub fn main_menu() -> Keyboard {
    Keyboard::new(&[&[NEW_REQUEST, I_HAVE_PAID], &[OFFER, CONTACT_ADMIN]], false)
}

pub fn type_menu() -> Keyboard {
    Keyboard::new(&[&[HOTEL, FLIGHT], &[CANCEL]], true)
}

pub fn cancel_menu() -> Keyboard {
    Keyboard::new(&[&[CANCEL]], true)
}

pub fn yes_no_menu() -> Keyboard {
    Keyboard::new(&[&[YES, NO], &[CANCEL]], true)
}

pub fn class_menu() -> Keyboard {
    Keyboard::new(
        &[&[CLASSES[0], CLASSES[1]], &[CLASSES[2], CLASSES[3]], &[CANCEL]],
        true,
    )
}

pub fn rooms_menu() -> Keyboard {
    Keyboard::new(&[&ROOMS, &[CANCEL]], true)
}

pub fn stars_menu() -> Keyboard {
    Keyboard::new(&[&STARS, &[CANCEL]], true)
}

pub fn gender_menu() -> Keyboard {
    Keyboard::new(&[&GENDERS, &[CANCEL]], true)
}

pub fn attachments_menu() -> Keyboard {
    Keyboard::new(&[&[SKIP, DONE], &[CANCEL]], true)
}

pub fn pay_finish_menu() -> Keyboard {
    Keyboard::new(&[&[SKIP, SEND], &[CANCEL]], true)
}

/// Single-button keyboard attached to invoices.
pub fn paid_button() -> Keyboard {
    Keyboard::new(&[&[I_HAVE_PAID]], false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flow_keyboard_offers_cancel() {
        for kb in [
            type_menu(),
            cancel_menu(),
            yes_no_menu(),
            class_menu(),
            rooms_menu(),
            stars_menu(),
            gender_menu(),
            attachments_menu(),
            pay_finish_menu(),
        ] {
            assert!(kb.contains(CANCEL), "{kb:?} lacks cancel");
            assert!(kb.one_time);
        }
    }

    #[test]
    fn main_menu_stays_visible() {
        let kb = main_menu();
        assert!(!kb.one_time);
        assert!(kb.contains(NEW_REQUEST));
        assert!(kb.contains(I_HAVE_PAID));
    }
}
