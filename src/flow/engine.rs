//! Form engine: validates one text answer against the current step and moves
//! the session forward.
//!
//! The engine is pure with respect to I/O. It mutates the session it is given
//! and tells the caller what to send; persisting the session and talking to
//! the messenger stay with the router.

use tracing::warn;

use crate::session::Session;

use super::keyboard::CANCEL;
use super::step::{FlowKind, FormType, Input, Prompt, Step};

/// Result of feeding one text message to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// No flow is active for this session.
    Idle,
    /// The user pressed cancel; the caller discards the session.
    Cancelled,
    /// Input did not fit the step; session unchanged, show the prompt again.
    Rejected(Prompt),
    /// Answer stored; session moved to `step`.
    Advanced { step: Step, prompt: Prompt },
    /// A terminal control was pressed; the caller runs the finalizer.
    Finish(FlowKind),
}

/// Apply `text` to `session`.
pub fn advance(session: &mut Session, text: &str) -> Transition {
    let Some(step) = session.step else {
        return Transition::Idle;
    };
    let text = text.trim();

    if text == CANCEL {
        return Transition::Cancelled;
    }

    match step.input() {
        Input::Text if text.is_empty() => {
            return Transition::Rejected(step.prompt(session.form_type));
        }
        Input::Text => {}
        Input::Choice(options) if !options.contains(&text) => {
            return Transition::Rejected(step.prompt(session.form_type));
        }
        Input::Choice(_) => {}
        Input::Controls(tokens) if tokens.contains(&text) => {
            return Transition::Finish(step.flow());
        }
        Input::Controls(_) => {
            return Transition::Rejected(step.reprompt(session.form_type));
        }
    }

    if step == Step::Type {
        // Validated above as one of the two form labels.
        let Some(form) = FormType::from_label(text) else {
            return Transition::Rejected(step.prompt(None));
        };
        session.form_type = Some(form);
        session
            .answers
            .insert(step.name().to_string(), form.as_str().to_string());
    } else {
        session
            .answers
            .insert(step.name().to_string(), text.to_string());
    }

    match step.next(session.form_type) {
        Some(next) => {
            session.step = Some(next);
            Transition::Advanced {
                step: next,
                prompt: next.prompt(session.form_type),
            }
        }
        None => {
            warn!(
                step = %step,
                form_type = ?session.form_type,
                "Session step does not fit its form, dropping the flow"
            );
            Transition::Cancelled
        }
    }
}
