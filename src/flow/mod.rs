//! Questionnaire flows: request (hotel or flight) and payment notification.

pub mod engine;
pub mod keyboard;
pub mod step;

pub use engine::{Transition, advance};
pub use step::{
    FLIGHT_SEQUENCE, FlowKind, FormType, HOTEL_SEQUENCE, Input, PAYMENT_SEQUENCE, Prompt, Step,
};
