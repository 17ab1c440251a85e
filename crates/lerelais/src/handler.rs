use std::sync::Arc;

use lecontrat::{Message, Request, RequestBase};
use once_cell::sync::OnceCell;

use crate::action::{ActionDef, ActionSource};
use crate::compose::ExecutionPlan;
use crate::context::CallContext;
use crate::engine;
use crate::error::{InitError, Result};
use crate::phase::Phase;
use crate::runtime::Runtime;
use crate::validation::{self, ILLEGAL_SUPPRESSION_ID};

/// Processes requests of type `R`. Handlers are long-lived and shared;
/// both calls leave their outcome on the request's current response.
/// `Err` is reserved for handler misconfiguration and for a fault inside
/// an error-phase action.
pub trait Handler<R: Request>: Send + Sync {
    /// Run the full execution sequence, business logic included.
    fn execute(&self, request: &mut R) -> Result<()>;

    /// Run the evaluation sequence only: check whether the request could
    /// be executed, without executing it.
    fn evaluate(&self, request: &mut R) -> Result<()>;
}

type OmittableHook<R> = Arc<dyn Fn(&R) -> Vec<String> + Send + Sync>;
type ExtendHook<R> = Arc<dyn Fn(&R) -> Vec<Message> + Send + Sync>;

/// A handler assembled from named steps, action sources, and validation
/// hooks. The execution plan is composed lazily at first use and reused
/// by every later call.
pub struct StepHandler<R: Request> {
    name: String,
    steps: Vec<std::result::Result<ActionDef<R>, InitError>>,
    sources: Vec<Arc<dyn ActionSource>>,
    omittable: OmittableHook<R>,
    extend_request: ExtendHook<R>,
    extend_response: ExtendHook<R>,
    plan: OnceCell<std::result::Result<ExecutionPlan<R>, InitError>>,
}

impl<R: Request> StepHandler<R> {
    /// Start assembling a handler with the given name.
    pub fn builder(name: impl Into<String>) -> StepHandlerBuilder<R> {
        StepHandlerBuilder::new(name)
    }

    /// A handler whose whole behavior is one implementation step; handy
    /// for tests and trivial listeners.
    pub fn from_fn(
        name: impl Into<String>,
        run: impl Fn(&mut R, &mut CallContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::builder(name)
            .step_at("Implementation", Phase::Implementation, run)
            .build()
    }

    /// Name of the handler, used in traces.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn plan(&self) -> std::result::Result<&ExecutionPlan<R>, InitError> {
        match self.plan.get_or_init(|| self.compose()) {
            Ok(plan) => Ok(plan),
            Err(error) => Err(error.clone()),
        }
    }

    fn compose(&self) -> std::result::Result<ExecutionPlan<R>, InitError> {
        let mut actions = self.built_in_steps();

        for step in &self.steps {
            actions.push(step.clone()?);
        }

        let global_sources = Runtime::current().global_sources();
        for source in self.sources.iter().chain(global_sources.iter()) {
            let contributed = source.actions().map_err(|error| InitError::Source {
                source_name: source.name().to_owned(),
                reason: format!("{error:#}"),
            })?;
            actions.extend(contributed.iter().map(|generic| generic.adapt::<R>()));
        }

        Ok(ExecutionPlan::compose(&self.name, actions))
    }

    fn built_in_steps(&self) -> Vec<ActionDef<R>> {
        let omittable = Arc::clone(&self.omittable);
        let extend = Arc::clone(&self.extend_request);
        let validate_request = ActionDef::new(
            "ValidateRequest",
            Phase::RequestValidation,
            move |request: &mut R, ctx: &mut CallContext| {
                let mut candidates = Vec::new();
                if let Some(head) = Runtime::current().validator().validate(&*request) {
                    candidates.push(head);
                }
                candidates.extend(extend(request));
                apply_findings(candidates, &omittable(request), request, ctx);
                Ok(())
            },
        );

        let pre_state = state_validation_step(
            "PreStateValidation",
            Phase::PostEvaluationStateValidation,
            &self.omittable,
        );
        let post_state = state_validation_step(
            "PostStateValidation",
            Phase::PostImplementationStateValidation,
            &self.omittable,
        );

        let omittable = Arc::clone(&self.omittable);
        let extend = Arc::clone(&self.extend_response);
        let validate_response = ActionDef::new(
            "ValidateResponse",
            Phase::ResponseValidation,
            move |request: &mut R, ctx: &mut CallContext| {
                let mut candidates = Vec::new();
                if let Some(response) = request.response() {
                    if let Some(head) = Runtime::current().validator().validate(response) {
                        candidates.push(head);
                    }
                }
                candidates.extend(extend(request));
                apply_findings(candidates, &omittable(request), request, ctx);
                Ok(())
            },
        );

        vec![validate_request, pre_state, post_state, validate_response]
    }

    fn run(&self, request: &mut R, evaluation_only: bool) -> Result<()> {
        let span = tracing::debug_span!(
            "handle",
            handler = %self.name,
            request = %request.id(),
            evaluation_only,
        );
        let _entered = span.enter();

        request.push_response(R::Response::default());
        let plan = self.plan()?;
        let main = if evaluation_only {
            plan.evaluation()
        } else {
            plan.execution()
        };

        let mut ctx = CallContext::new(span.clone());
        engine::run(main, plan.exit(), plan.error(), request, &mut ctx)?;

        if let Some(meta) = RequestBase::meta(request) {
            if let Ok(dump) = serde_json::to_string(meta) {
                tracing::trace!(outcome = %dump, "call finished");
            }
        }
        Ok(())
    }
}

impl<R: Request> Handler<R> for StepHandler<R> {
    fn execute(&self, request: &mut R) -> Result<()> {
        self.run(request, false)
    }

    fn evaluate(&self, request: &mut R) -> Result<()> {
        self.run(request, true)
    }
}

/// Builder for [`StepHandler`]. Step-name problems are recorded here and
/// surface as an initialization error at the handler's first use.
pub struct StepHandlerBuilder<R: Request> {
    name: String,
    steps: Vec<std::result::Result<ActionDef<R>, InitError>>,
    sources: Vec<Arc<dyn ActionSource>>,
    omittable: OmittableHook<R>,
    extend_request: ExtendHook<R>,
    extend_response: ExtendHook<R>,
}

impl<R: Request> StepHandlerBuilder<R> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            sources: Vec::new(),
            omittable: Arc::new(|_| Vec::new()),
            extend_request: Arc::new(|_| Vec::new()),
            extend_response: Arc::new(|_| Vec::new()),
        }
    }

    /// Add a step whose phase is inferred from the name's suffix: a step
    /// named `CheckQuotaEvaluation` runs in the evaluation phase. A name
    /// ending in no phase name is a fail-fast initialization error.
    pub fn step(
        mut self,
        name: impl Into<String>,
        run: impl Fn(&mut R, &mut CallContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        match Phase::matching_suffix(&name) {
            Some(phase) => self.steps.push(Ok(ActionDef::new(name, phase, run))),
            None => self.steps.push(Err(InitError::UnknownPhase {
                step: name,
                expected: phase_names(),
            })),
        }
        self
    }

    /// Add a step at an explicitly given phase.
    pub fn step_at(
        mut self,
        name: impl Into<String>,
        phase: Phase,
        run: impl Fn(&mut R, &mut CallContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(Ok(ActionDef::new(name, phase, run)));
        self
    }

    /// Register an action source composed into this handler only.
    pub fn source(mut self, source: Arc<dyn ActionSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Declare which finding source ids the caller may suppress for a
    /// given request.
    pub fn omittable(mut self, hook: impl Fn(&R) -> Vec<String> + Send + Sync + 'static) -> Self {
        self.omittable = Arc::new(hook);
        self
    }

    /// Contribute extra findings to the request-validation step.
    pub fn extend_request_validation(
        mut self,
        hook: impl Fn(&R) -> Vec<Message> + Send + Sync + 'static,
    ) -> Self {
        self.extend_request = Arc::new(hook);
        self
    }

    /// Contribute extra findings to the response-validation step.
    pub fn extend_response_validation(
        mut self,
        hook: impl Fn(&R) -> Vec<Message> + Send + Sync + 'static,
    ) -> Self {
        self.extend_response = Arc::new(hook);
        self
    }

    /// Finish assembly.
    pub fn build(self) -> StepHandler<R> {
        StepHandler {
            name: self.name,
            steps: self.steps,
            sources: self.sources,
            omittable: self.omittable,
            extend_request: self.extend_request,
            extend_response: self.extend_response,
            plan: OnceCell::new(),
        }
    }
}

fn state_validation_step<R: Request>(
    name: &'static str,
    phase: Phase,
    omittable: &OmittableHook<R>,
) -> ActionDef<R> {
    let omittable = Arc::clone(omittable);
    ActionDef::new(name, phase, move |request: &mut R, ctx: &mut CallContext| {
        let validator = Runtime::current().validator();
        let candidates: Vec<Message> = ctx
            .validated_states()
            .filter_map(|(key, target)| {
                validator.validate(target).map(|mut head| {
                    // Findings are attributed to the state entry, not the
                    // generic schema id, so suppression can target them.
                    head.source_id = key.to_owned();
                    head
                })
            })
            .collect();
        apply_findings(candidates, &omittable(request), request, ctx);
        Ok(())
    })
}

fn apply_findings<R: Request>(
    candidates: Vec<Message>,
    omittable: &[String],
    request: &mut R,
    ctx: &mut CallContext,
) {
    let requested = request.suppressed_ids().to_vec();
    if candidates.is_empty() && requested.is_empty() {
        return;
    }

    let folded = validation::fold_findings(candidates, omittable, &requested);
    ctx.retain_suppressed(folded.suppressed);

    // Every validation step folds independently; the illegal-suppression
    // warning must still appear only once per response.
    let already_warned = RequestBase::meta(request)
        .is_some_and(|meta| meta.contains_source_id(ILLEGAL_SUPPRESSION_ID));
    let kept: Vec<Message> = folded
        .kept
        .into_iter()
        .filter(|m| !(already_warned && m.source_id == ILLEGAL_SUPPRESSION_ID))
        .collect();

    if kept.is_empty() {
        return;
    }
    if let Some(meta) = request.meta_mut() {
        meta.add_messages(kept);
        meta.mark_failed();
    }
}

fn phase_names() -> String {
    Phase::ALL
        .iter()
        .map(|phase| phase.name())
        .collect::<Vec<_>>()
        .join(", ")
}
