use serde::{Deserialize, Serialize};

/// A named point in the fixed, ordered execution sequence of a request.
///
/// `OnError` and `OnExit` are special: they run outside the main sequence
/// (after a fault, and after the main loop, respectively) and carry negative
/// ranks so that range slicing never picks them up by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Leaving the handler because an action faulted.
    OnError,
    /// Leaving the handler without a fault, successful or not.
    OnExit,
    /// The request enters the handler.
    OnEnter,
    /// Validation of the request in itself, without external state.
    RequestValidation,
    /// Preparation of the remaining run (e.g. loading data).
    Preparation,
    /// Programmatic checks whether the request could be executed.
    Evaluation,
    /// Validation of the call state after the evaluation phase.
    PostEvaluationStateValidation,
    /// Runs when the evaluation phase succeeded, for both `evaluate` and
    /// `execute` calls.
    OnEvaluatedWithSuccess,
    /// The business logic itself.
    Implementation,
    /// Validation of the call state after the implementation phase.
    PostImplementationStateValidation,
    /// Validation that the produced response honors its contract.
    ResponseValidation,
    /// Runs when the request was executed successfully.
    OnExecutedWithSuccess,
}

impl Phase {
    /// All phases in ascending rank order.
    pub const ALL: [Phase; 12] = [
        Phase::OnError,
        Phase::OnExit,
        Phase::OnEnter,
        Phase::RequestValidation,
        Phase::Preparation,
        Phase::Evaluation,
        Phase::PostEvaluationStateValidation,
        Phase::OnEvaluatedWithSuccess,
        Phase::Implementation,
        Phase::PostImplementationStateValidation,
        Phase::ResponseValidation,
        Phase::OnExecutedWithSuccess,
    ];

    /// Integer rank defining the total order of phases.
    pub fn rank(self) -> i8 {
        match self {
            Phase::OnError => -2,
            Phase::OnExit => -1,
            Phase::OnEnter => 1,
            Phase::RequestValidation => 2,
            Phase::Preparation => 3,
            Phase::Evaluation => 4,
            Phase::PostEvaluationStateValidation => 5,
            Phase::OnEvaluatedWithSuccess => 6,
            Phase::Implementation => 7,
            Phase::PostImplementationStateValidation => 8,
            Phase::ResponseValidation => 9,
            Phase::OnExecutedWithSuccess => 10,
        }
    }

    /// Stable name of the phase, used in traces and for the name-suffix
    /// convention of the handler builder.
    pub fn name(self) -> &'static str {
        match self {
            Phase::OnError => "OnError",
            Phase::OnExit => "OnExit",
            Phase::OnEnter => "OnEnter",
            Phase::RequestValidation => "RequestValidation",
            Phase::Preparation => "Preparation",
            Phase::Evaluation => "Evaluation",
            Phase::PostEvaluationStateValidation => "PostEvaluationStateValidation",
            Phase::OnEvaluatedWithSuccess => "OnEvaluatedWithSuccess",
            Phase::Implementation => "Implementation",
            Phase::PostImplementationStateValidation => "PostImplementationStateValidation",
            Phase::ResponseValidation => "ResponseValidation",
            Phase::OnExecutedWithSuccess => "OnExecutedWithSuccess",
        }
    }

    /// The unique phase whose name `step_name` ends with, if any.
    ///
    /// A step named `CheckQuotaEvaluation` maps to [`Phase::Evaluation`]; a
    /// name matching no phase (or, defensively, more than one) yields `None`
    /// and the builder reports an initialization error.
    pub fn matching_suffix(step_name: &str) -> Option<Phase> {
        let mut found = None;
        for phase in Phase::ALL {
            if step_name.ends_with(phase.name()) {
                if found.is_some() {
                    return None;
                }
                found = Some(phase);
            }
        }
        found
    }
}
