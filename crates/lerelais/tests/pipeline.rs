//! End-to-end behavior of a step handler: phase ordering, soft failures,
//! faults, suppression, and plan composition.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use lerelais::{
    ActionSource, DispatchError, Envelope, FieldCheck, GenericAction, Handler, InitError, Message,
    Phase, Request, RequestBase, Response, ResponseMeta, Runtime, Schema, StepHandler, Validate,
    ILLEGAL_SUPPRESSION_ID,
};

#[derive(Default)]
struct TransferResponse {
    meta: ResponseMeta,
    receipt: Option<String>,
}

impl Response for TransferResponse {
    fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResponseMeta {
        &mut self.meta
    }
}

impl Validate for TransferResponse {
    fn schema(&self) -> Schema {
        Schema::new().field(FieldCheck::new("receipt", self.receipt.clone()).required())
    }
}

struct Transfer {
    envelope: Envelope<TransferResponse>,
    beneficiary: Option<String>,
}

impl Transfer {
    fn new(beneficiary: Option<&str>) -> Self {
        Self {
            envelope: Envelope::new(),
            beneficiary: beneficiary.map(str::to_owned),
        }
    }
}

impl Validate for Transfer {
    fn schema(&self) -> Schema {
        Schema::new().field(FieldCheck::new("beneficiary", self.beneficiary.clone()).required())
    }
}

impl Request for Transfer {
    type Response = TransferResponse;

    fn envelope(&self) -> &Envelope<TransferResponse> {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope<TransferResponse> {
        &mut self.envelope
    }
}

/// Run with `RUST_LOG=lerelais=debug` to see the composed plans.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Trace = Arc<Mutex<Vec<String>>>;

fn record(trace: &Trace, name: &str) {
    trace.lock().expect("trace lock").push(name.to_owned());
}

/// Sets the receipt so response validation passes.
fn booking_step(trace: Trace) -> impl Fn(&mut Transfer, &mut lerelais::CallContext) -> anyhow::Result<()> {
    move |transfer, _| {
        record(&trace, "BookImplementation");
        if let Some(response) = transfer.response_mut() {
            response.receipt = Some("receipt-1".into());
        }
        Ok(())
    }
}

struct AuditSource {
    trace: Trace,
}

impl ActionSource for AuditSource {
    fn name(&self) -> &str {
        "audit"
    }

    fn actions(&self) -> anyhow::Result<Vec<GenericAction>> {
        let trace = Arc::clone(&self.trace);
        Ok(vec![GenericAction::new(
            "AuditEvaluation",
            Phase::Evaluation,
            move |_, _| {
                trace.lock().expect("trace lock").push("AuditEvaluation".into());
                Ok(())
            },
        )])
    }
}

#[test]
fn steps_run_in_phase_order_regardless_of_declaration_order() {
    init_tracing();
    let trace: Trace = Arc::default();

    let t = Arc::clone(&trace);
    let handler = StepHandler::builder("BookTransfer")
        .step_at("BookImplementation", Phase::Implementation, booking_step(Arc::clone(&trace)))
        .step("NotifyOnExecutedWithSuccess", {
            let trace = Arc::clone(&trace);
            move |_: &mut Transfer, _| {
                record(&trace, "NotifyOnExecutedWithSuccess");
                Ok(())
            }
        })
        .step("GreetOnEnter", move |_: &mut Transfer, _| {
            record(&t, "GreetOnEnter");
            Ok(())
        })
        .step("CheckQuotaEvaluation", {
            let trace = Arc::clone(&trace);
            move |_: &mut Transfer, _| {
                record(&trace, "CheckQuotaEvaluation");
                Ok(())
            }
        })
        .step("TidyUpOnExit", {
            let trace = Arc::clone(&trace);
            move |_: &mut Transfer, _| {
                record(&trace, "TidyUpOnExit");
                Ok(())
            }
        })
        .source(Arc::new(AuditSource {
            trace: Arc::clone(&trace),
        }))
        .build();

    let mut transfer = Transfer::new(Some("alice"));
    handler.execute(&mut transfer).expect("execution succeeds");

    // Handler steps keep declaration order within a phase; source actions
    // queue up behind them.
    assert_eq!(
        *trace.lock().expect("trace lock"),
        vec![
            "GreetOnEnter",
            "CheckQuotaEvaluation",
            "AuditEvaluation",
            "BookImplementation",
            "NotifyOnExecutedWithSuccess",
            "TidyUpOnExit",
        ]
    );
    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(meta.executed_with_success());
}

#[test]
fn invalid_request_fails_softly_but_still_runs_exit() {
    let trace: Trace = Arc::default();

    let handler = StepHandler::builder("BookTransfer")
        .step_at("BookImplementation", Phase::Implementation, booking_step(Arc::clone(&trace)))
        .step("TidyUpOnExit", {
            let trace = Arc::clone(&trace);
            move |_: &mut Transfer, _| {
                record(&trace, "TidyUpOnExit");
                Ok(())
            }
        })
        .build();

    let mut transfer = Transfer::new(None);
    handler.execute(&mut transfer).expect("soft failure is not a fault");

    assert_eq!(*trace.lock().expect("trace lock"), vec!["TidyUpOnExit"]);
    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(meta.has_failed());
    assert!(!meta.executed(), "business logic never ran");
    assert!(meta.contains_source_id("beneficiary"));
}

#[test]
fn fault_runs_the_error_phase_instead_of_exit() {
    init_tracing();
    let trace: Trace = Arc::default();

    let handler = StepHandler::builder("BookTransfer")
        .step_at("BookImplementation", Phase::Implementation, |_: &mut Transfer, _| {
            Err(anyhow::anyhow!("ledger unavailable"))
        })
        .step("TidyUpOnExit", {
            let trace = Arc::clone(&trace);
            move |_: &mut Transfer, _| {
                record(&trace, "TidyUpOnExit");
                Ok(())
            }
        })
        .step("CompensateOnError", {
            let trace = Arc::clone(&trace);
            move |_: &mut Transfer, ctx: &mut lerelais::CallContext| {
                assert!(ctx.fault().is_some(), "error actions see the fault");
                assert_eq!(
                    ctx.last_action(),
                    Some("BookImplementation"),
                    "the faulting step stays the last action"
                );
                record(&trace, "CompensateOnError");
                Ok(())
            }
        })
        .build();

    let mut transfer = Transfer::new(Some("alice"));
    handler.execute(&mut transfer).expect("fault is absorbed");

    assert_eq!(*trace.lock().expect("trace lock"), vec!["CompensateOnError"]);
    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(meta.has_failed());
    assert!(meta.executed(), "the implementation phase was reached");
    assert!(meta.contains_message(&|m| {
        m.source_id == "BookImplementation" && m.details.as_deref() == Some("ledger unavailable")
    }));
}

#[test]
fn approved_suppression_removes_the_finding_and_keeps_the_call_clean() {
    let suppressed_seen: Arc<Mutex<Vec<String>>> = Arc::default();

    let seen = Arc::clone(&suppressed_seen);
    let handler = StepHandler::builder("BookTransfer")
        .omittable(|_: &Transfer| vec!["schema".to_string()])
        .step_at("BookImplementation", Phase::Implementation, |transfer: &mut Transfer, _| {
            if let Some(response) = transfer.response_mut() {
                response.receipt = Some("receipt-1".into());
            }
            Ok(())
        })
        .step("InspectOnExit", move |_: &mut Transfer, ctx: &mut lerelais::CallContext| {
            let ids = ctx
                .suppressed()
                .iter()
                .map(|m| m.source_id.clone())
                .collect::<Vec<_>>();
            seen.lock().expect("seen lock").extend(ids);
            Ok(())
        })
        .build();

    // The missing beneficiary raises the schema finding; the caller has
    // approved waiving it.
    let mut transfer = Transfer::new(None);
    transfer.envelope_mut().suppress("schema");
    handler.execute(&mut transfer).expect("execution succeeds");

    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(!meta.has_failed(), "suppressed findings never fail the response");
    assert!(meta.executed_with_success());
    assert!(!meta.contains_source_id("schema"));
    assert_eq!(*suppressed_seen.lock().expect("seen lock"), vec!["schema"]);
}

#[test]
fn undeclared_suppression_raises_one_warning_for_the_whole_call() {
    let handler = StepHandler::builder("BookTransfer")
        .step_at("BookImplementation", Phase::Implementation, |transfer: &mut Transfer, _| {
            if let Some(response) = transfer.response_mut() {
                response.receipt = Some("receipt-1".into());
            }
            Ok(())
        })
        .build();

    let mut transfer = Transfer::new(Some("alice"));
    transfer.envelope_mut().suppress("ghost");
    handler.execute(&mut transfer).expect("execution succeeds");

    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(meta.has_failed());

    let warnings: Vec<_> = meta
        .messages()
        .iter()
        .filter(|m| m.source_id == ILLEGAL_SUPPRESSION_ID)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(!warnings[0].suppressible);
    assert!(warnings[0].caption.contains("ghost"));
}

#[test]
fn extended_findings_join_the_validation_fold() {
    let handler = StepHandler::builder("BookTransfer")
        .omittable(|_: &Transfer| vec!["four-eyes".to_string()])
        .extend_request_validation(|transfer: &Transfer| {
            if transfer.beneficiary.as_deref() == Some("mallory") {
                vec![Message::warning(
                    "four-eyes",
                    "transfers to this beneficiary need a second approval",
                )]
            } else {
                Vec::new()
            }
        })
        .step_at("BookImplementation", Phase::Implementation, |transfer: &mut Transfer, _| {
            if let Some(response) = transfer.response_mut() {
                response.receipt = Some("receipt-1".into());
            }
            Ok(())
        })
        .build();

    // Without the caller's approval the finding blocks the call, but it is
    // marked waivable.
    let mut transfer = Transfer::new(Some("mallory"));
    handler.execute(&mut transfer).expect("soft failure is not a fault");
    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(meta.has_failed());
    assert!(!meta.executed());
    let finding = meta
        .messages()
        .iter()
        .find(|m| m.source_id == "four-eyes")
        .expect("extended finding is on the response");
    assert!(finding.suppressible);

    // With the approval the finding is waived and the call goes through.
    let mut transfer = Transfer::new(Some("mallory"));
    transfer.envelope_mut().suppress("four-eyes");
    handler.execute(&mut transfer).expect("execution succeeds");
    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(meta.executed_with_success());
    assert!(!meta.contains_source_id("four-eyes"));
}

#[test]
fn invalid_call_state_blocks_the_implementation() {
    #[derive(Default)]
    struct Quote {
        amount: Option<String>,
    }

    impl Validate for Quote {
        fn schema(&self) -> Schema {
            Schema::new().field(FieldCheck::new("amount", self.amount.clone()).required())
        }
    }

    let handler = StepHandler::builder("BookTransfer")
        .step("LoadQuotePreparation", |_: &mut Transfer, ctx: &mut lerelais::CallContext| {
            ctx.set_validated_state("quote", Quote::default());
            Ok(())
        })
        .step_at("BookImplementation", Phase::Implementation, |transfer: &mut Transfer, _| {
            if let Some(response) = transfer.response_mut() {
                response.receipt = Some("receipt-1".into());
            }
            Ok(())
        })
        .build();

    let mut transfer = Transfer::new(Some("alice"));
    handler.execute(&mut transfer).expect("soft failure is not a fault");

    let meta = RequestBase::meta(&transfer).expect("response exists");
    assert!(meta.has_failed());
    assert!(!meta.executed(), "state validation runs before the business logic");
    // The head finding carries the state key; the field finding is nested.
    assert!(meta.contains_source_id("quote"));
    assert!(meta.contains_source_id("amount"));
}

#[test]
fn the_plan_is_composed_once_per_handler() {
    struct CountingSource {
        composed: Arc<AtomicUsize>,
    }

    impl ActionSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        fn actions(&self) -> anyhow::Result<Vec<GenericAction>> {
            self.composed.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    let composed = Arc::new(AtomicUsize::new(0));
    let handler = StepHandler::builder("BookTransfer")
        .step_at("BookImplementation", Phase::Implementation, |transfer: &mut Transfer, _| {
            if let Some(response) = transfer.response_mut() {
                response.receipt = Some("receipt-1".into());
            }
            Ok(())
        })
        .source(Arc::new(CountingSource {
            composed: Arc::clone(&composed),
        }))
        .build();

    let mut transfer = Transfer::new(Some("alice"));
    handler.execute(&mut transfer).expect("first call");
    handler.execute(&mut transfer).expect("second call");

    assert_eq!(composed.load(Ordering::SeqCst), 1);
    assert_eq!(transfer.envelope().response_count(), 2);
}

#[test]
fn a_failing_source_is_a_persistent_initialization_error() {
    struct BrokenSource;

    impl ActionSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        fn actions(&self) -> anyhow::Result<Vec<GenericAction>> {
            Err(anyhow::anyhow!("catalog not reachable"))
        }
    }

    let handler = StepHandler::<Transfer>::builder("BookTransfer")
        .source(Arc::new(BrokenSource))
        .build();

    let mut transfer = Transfer::new(Some("alice"));
    for _ in 0..2 {
        match handler.execute(&mut transfer) {
            Err(DispatchError::Init(InitError::Source { source_name, reason })) => {
                assert_eq!(source_name, "broken");
                assert!(reason.contains("catalog not reachable"));
            }
            other => panic!("expected a source init error, got {other:?}"),
        }
    }
}

#[test]
fn globally_registered_sources_compose_behind_handler_steps() {
    let trace: Trace = Arc::default();

    let runtime = Arc::new(
        Runtime::builder()
            .source(Arc::new(AuditSource {
                trace: Arc::clone(&trace),
            }))
            .build(),
    );
    let _scope = Runtime::enter(runtime);

    let handler = StepHandler::builder("BookTransfer")
        .step("CheckQuotaEvaluation", {
            let trace = Arc::clone(&trace);
            move |_: &mut Transfer, _| {
                record(&trace, "CheckQuotaEvaluation");
                Ok(())
            }
        })
        .step_at("BookImplementation", Phase::Implementation, booking_step(Arc::clone(&trace)))
        .build();

    let mut transfer = Transfer::new(Some("alice"));
    handler.execute(&mut transfer).expect("execution succeeds");

    assert_eq!(
        *trace.lock().expect("trace lock"),
        vec!["CheckQuotaEvaluation", "AuditEvaluation", "BookImplementation"]
    );
}

#[test]
fn concurrent_calls_do_not_share_context_state() {
    let handler = Arc::new(
        StepHandler::builder("BookTransfer")
            .step("StashPreparation", |transfer: &mut Transfer, ctx: &mut lerelais::CallContext| {
                let token = transfer
                    .beneficiary
                    .clone()
                    .unwrap_or_default();
                ctx.set_state("token", token);
                Ok(())
            })
            .step_at("BookImplementation", Phase::Implementation, |transfer: &mut Transfer, ctx: &mut lerelais::CallContext| {
                let token = ctx
                    .state::<String>("token")
                    .cloned()
                    .unwrap_or_default();
                assert_eq!(Some(token.as_str()), transfer.beneficiary.as_deref());
                if let Some(response) = transfer.response_mut() {
                    response.receipt = Some(format!("receipt-{token}"));
                }
                Ok(())
            })
            .build(),
    );

    let barrier = Arc::new(Barrier::new(2));
    let mut workers = Vec::new();
    for name in ["alice", "bob"] {
        let handler = Arc::clone(&handler);
        let barrier = Arc::clone(&barrier);
        workers.push(std::thread::spawn(move || {
            let mut transfer = Transfer::new(Some(name));
            barrier.wait();
            for _ in 0..50 {
                handler.execute(&mut transfer).expect("execution succeeds");
                let meta = RequestBase::meta(&transfer).expect("response exists");
                assert!(meta.executed_with_success());
            }
        }));
    }
    for worker in workers {
        worker.join().expect("worker finished");
    }
}
