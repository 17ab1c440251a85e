use lecontrat::{categories, Message, Request, RequestBase, ResponseMeta};

use crate::action::ActionDef;
use crate::context::CallContext;
use crate::error::DispatchError;
use crate::phase::Phase;

/// Run the main-sequence actions, then the exit actions. A fault in either
/// routes into the error actions and ends the call; the only `Err` outcome
/// is a fault inside an error action itself.
pub(crate) fn run<R: Request>(
    main: &[ActionDef<R>],
    exit: &[ActionDef<R>],
    error: &[ActionDef<R>],
    request: &mut R,
    ctx: &mut CallContext,
) -> Result<(), DispatchError> {
    let mut current: Option<Phase> = None;

    for action in main {
        // A failed response finishes its current phase but starts no new one.
        if current.is_some_and(|phase| phase != action.phase()) && has_failed(request) {
            break;
        }
        current = Some(action.phase());
        ctx.record_action(action.name());

        // Latched before the action runs: a faulting implementation still
        // counts as executed.
        if action.phase() >= Phase::Implementation {
            if let Some(meta) = request.meta_mut() {
                meta.mark_executed();
            }
        }

        if let Err(fault) = action.invoke(request, ctx) {
            return handle_fault(fault, action.name(), error, request, ctx);
        }
        escalate_warnings(request);
    }

    // Exit and error actions never overwrite `last_action`: it keeps
    // naming the main-sequence action that ran last.
    for action in exit {
        if let Err(fault) = action.invoke(request, ctx) {
            return handle_fault(fault, action.name(), error, request, ctx);
        }
        escalate_warnings(request);
    }

    Ok(())
}

/// Translate a fault into a response message, run the error actions, and
/// swallow the fault unless an error action faults too.
fn handle_fault<R: Request>(
    fault: anyhow::Error,
    action_name: &str,
    error: &[ActionDef<R>],
    request: &mut R,
    ctx: &mut CallContext,
) -> Result<(), DispatchError> {
    tracing::error!(action = action_name, fault = %format!("{fault:#}"), "action faulted");

    if let Some(meta) = request.meta_mut() {
        meta.add_message(
            Message::error(action_name, "The request could not be processed.")
                .with_details(format!("{fault:#}"))
                .with_category(categories::EXCEPTION),
        );
        meta.mark_failed();
    }
    ctx.set_fault(fault);

    for action in error {
        if let Err(inner) = action.invoke(request, ctx) {
            tracing::error!(
                action = action.name(),
                fault = %format!("{inner:#}"),
                "error-phase action faulted"
            );
            return Err(DispatchError::ErrorHookFailed {
                action: action.name().to_owned(),
                source: inner,
            });
        }
    }

    Ok(())
}

fn has_failed<R: Request>(request: &R) -> bool {
    RequestBase::meta(request).is_some_and(ResponseMeta::has_failed)
}

/// A failure-severity message attached by an action fails the response,
/// no matter who attached it.
fn escalate_warnings<R: Request>(request: &mut R) {
    let Some(meta) = request.meta_mut() else {
        return;
    };
    if meta.messages().iter().any(|m| m.severity.is_failure()) {
        meta.mark_failed();
    }
}
