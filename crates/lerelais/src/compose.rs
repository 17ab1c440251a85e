use lecontrat::Request;

use crate::action::ActionDef;
use crate::phase::Phase;

/// The phase-ordered action sequences of one handler, composed once at
/// first use and shared by every later call.
#[derive(Debug)]
pub struct ExecutionPlan<R> {
    evaluation: Vec<ActionDef<R>>,
    execution: Vec<ActionDef<R>>,
    exit: Vec<ActionDef<R>>,
    error: Vec<ActionDef<R>>,
}

impl<R: Request> ExecutionPlan<R> {
    /// Compose the four ranges from the concatenated action list: built-in
    /// validation steps first, then handler steps, handler sources, and
    /// global sources. Within one phase the concatenation order is kept.
    pub(crate) fn compose(handler_name: &str, actions: Vec<ActionDef<R>>) -> Self {
        let plan = Self {
            evaluation: slice(&actions, Phase::OnEnter, Phase::OnEvaluatedWithSuccess),
            execution: slice(&actions, Phase::OnEnter, Phase::OnExecutedWithSuccess),
            exit: slice(&actions, Phase::OnExit, Phase::OnExit),
            error: slice(&actions, Phase::OnError, Phase::OnError),
        };
        tracing::debug!(
            handler = handler_name,
            execution = ?names(&plan.execution),
            exit = ?names(&plan.exit),
            error = ?names(&plan.error),
            "composed action sequences"
        );
        plan
    }

    /// Main-sequence actions for `evaluate` calls, up to and including
    /// `OnEvaluatedWithSuccess`.
    pub fn evaluation(&self) -> &[ActionDef<R>] {
        &self.evaluation
    }

    /// Main-sequence actions for `execute` calls.
    pub fn execution(&self) -> &[ActionDef<R>] {
        &self.execution
    }

    /// Actions run after the main sequence, fault or not.
    pub fn exit(&self) -> &[ActionDef<R>] {
        &self.exit
    }

    /// Actions run only after a fault.
    pub fn error(&self) -> &[ActionDef<R>] {
        &self.error
    }
}

fn slice<R: Request>(actions: &[ActionDef<R>], start: Phase, stop: Phase) -> Vec<ActionDef<R>> {
    let mut out = Vec::new();
    for phase in Phase::ALL {
        if phase < start || phase > stop {
            continue;
        }
        out.extend(
            actions
                .iter()
                .filter(|action| action.phase() == phase)
                .cloned(),
        );
    }
    out
}

fn names<R>(actions: &[ActionDef<R>]) -> Vec<&str>
where
    R: Request,
{
    actions.iter().map(ActionDef::name).collect()
}
