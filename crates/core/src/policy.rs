//! 에러 정책 실행기
//!
//! 사용자 코드(훅, 컴포넌트 페이즈, 스텝 액션)는 모두 [`handle_with_policy`]를
//! 거쳐 실행됩니다. 실행기는 결과를 소유 컨텍스트에 기록하고,
//! [`OnErrorConfig`]에 따라 재시도/무시/전파를 결정합니다.
//!
//! # 규칙
//! - 총 시도 횟수는 `retries + 1`, 시도 사이에 `retry_delay_seconds`만큼 대기
//! - 매 시도 전에 이전 시도의 결과를 지움
//! - 성공 시 호출 대상이 상태를 정하지 않았으면 컨텍스트를 `Success`로 표시
//! - 모두 실패하면 마지막 실패를 컨텍스트에 기록한 뒤
//!   - `continue = true`: `Ok(None)` 반환
//!   - `continue = false`, `retries == 0`: 원래 에러를 그대로 반환
//!   - `continue = false`, `retries > 0`: [`ExecutionError::RetryExhausted`]로 감싸 반환
//!
//! 실행기는 스팬을 닫지 않습니다. 컨텍스트 소유자가 `end()`를 호출합니다.

use std::sync::Arc;
use std::thread;

use crate::context::{ExecutionContext, ExecutionStatus, TRACER_NAME};
use crate::error::{CapturedError, ExecutionError, PipebenchError};
use crate::hook::{Hook, HookPhase, OnErrorConfig};
use crate::metrics as m;

/// 정책에 따라 `func`를 실행하고 결과를 `ctx`에 기록합니다.
///
/// 실행하는 동안 `ctx`의 스팬이 현재 스레드의 활성 스팬이 되므로
/// `func` 안의 로그는 해당 스팬의 이벤트로 기록됩니다.
pub fn handle_with_policy<T, F>(
    ctx: &ExecutionContext,
    operation: &str,
    mut func: F,
    on_error: &OnErrorConfig,
) -> Result<Option<T>, PipebenchError>
where
    F: FnMut() -> Result<T, PipebenchError>,
{
    let kind = ctx.kind().label();
    let meter = ctx.telemetry().meter(TRACER_NAME);
    let attempts = on_error.attempts();
    let _active = ctx.activate();
    let initial = match ctx.status() {
        status if status.is_terminal() => ExecutionStatus::Running,
        status => status,
    };

    let mut attempt = 0;
    let last_error = loop {
        attempt += 1;
        meter.add_counter(m::POLICY_ATTEMPTS_TOTAL, 1, &[(m::LABEL_KIND, kind.to_owned())]);
        ctx.reset_attempt(initial);

        match func() {
            Ok(value) => {
                if !ctx.status().is_terminal() {
                    ctx.mark_success();
                }
                if attempt > 1 {
                    tracing::info!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(Some(value));
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    attempt,
                    attempts,
                    error = %e,
                    "operation attempt failed"
                );
                if attempt >= attempts {
                    break e;
                }
                meter.add_counter(m::POLICY_RETRIES_TOTAL, 1, &[(m::LABEL_KIND, kind.to_owned())]);
                let delay = on_error.retry_delay();
                if !delay.is_zero() {
                    tracing::debug!(operation, delay_secs = delay.as_secs_f64(), "waiting before retry");
                    thread::sleep(delay);
                }
            }
        }
    };

    ctx.mark_error(CapturedError::from_error(&last_error));

    if on_error.continue_ {
        meter.add_counter(
            m::POLICY_FAILURES_TOTAL,
            1,
            &[
                (m::LABEL_KIND, kind.to_owned()),
                (m::LABEL_OUTCOME, "continued".to_owned()),
            ],
        );
        tracing::warn!(
            operation,
            attempts,
            error = %last_error,
            "operation failed, continuing as configured"
        );
        return Ok(None);
    }

    meter.add_counter(
        m::POLICY_FAILURES_TOTAL,
        1,
        &[
            (m::LABEL_KIND, kind.to_owned()),
            (m::LABEL_OUTCOME, "raised".to_owned()),
        ],
    );
    tracing::error!(operation, attempts, error = %last_error, "operation failed");

    if on_error.retries == 0 {
        Err(last_error)
    } else {
        Err(ExecutionError::RetryExhausted {
            operation: operation.to_owned(),
            attempts,
            source: Box::new(last_error),
        }
        .into())
    }
}

/// 훅 목록을 등록 순서대로 실행합니다.
///
/// 훅마다 `parent` 아래에 훅 컨텍스트를 만들어 시작하고, 정책 실행 후 닫습니다.
/// 치명적 실패는 남은 훅을 건너뛰고 즉시 전파됩니다.
pub fn run_hooks(
    hooks: &[Hook],
    phase: HookPhase,
    parent: &Arc<ExecutionContext>,
) -> Result<(), PipebenchError> {
    if hooks.is_empty() {
        return Ok(());
    }
    let meter = parent.telemetry().meter(TRACER_NAME);
    tracing::debug!(phase = %phase, count = hooks.len(), context = %parent.name(), "running hooks");

    for hook in hooks {
        let ctx = parent.hook(hook.name(), phase);
        ctx.start();
        let outcome = handle_with_policy(&ctx, hook.name(), || hook.execute(&ctx), hook.on_error());
        ctx.end();

        let result = if outcome.is_ok() && ctx.error().is_none() {
            "success"
        } else {
            "failure"
        };
        meter.add_counter(
            m::HOOK_EXECUTIONS_TOTAL,
            1,
            &[
                (m::LABEL_PHASE, phase.value().to_owned()),
                (m::LABEL_RESULT, result.to_owned()),
            ],
        );

        outcome?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::context::Metadata;
    use crate::hook::{FrameworkPhase, HookStrategyConfig};
    use crate::telemetry::TelemetryRuntime;

    fn suite() -> Arc<ExecutionContext> {
        ExecutionContext::suite("s", Metadata::new(), Arc::new(TelemetryRuntime::disabled()))
    }

    fn failing(reason: &str) -> PipebenchError {
        ExecutionError::StepFailure {
            step: "op".to_owned(),
            reason: reason.to_owned(),
        }
        .into()
    }

    fn policy(retries: u32, continue_: bool) -> OnErrorConfig {
        OnErrorConfig {
            retries,
            continue_,
            retry_delay_seconds: 0.0,
        }
    }

    #[test]
    fn success_returns_value_and_marks_success() {
        let ctx = suite();
        let out = handle_with_policy(&ctx, "op", || Ok(42), &policy(0, false)).unwrap();
        assert_eq!(out, Some(42));
        assert_eq!(ctx.status(), ExecutionStatus::Success);
    }

    #[test]
    fn retries_then_succeeds_clears_error() {
        let ctx = suite();
        let calls = AtomicU32::new(0);
        let out = handle_with_policy(
            &ctx,
            "op",
            || {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(failing("flaky"))
                } else {
                    Ok("ok")
                }
            },
            &policy(2, false),
        )
        .unwrap();

        assert_eq!(out, Some("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(ctx.status(), ExecutionStatus::Success);
        assert!(ctx.error().is_none());
    }

    #[test]
    fn status_set_by_callee_is_kept() {
        let ctx = suite();
        ctx.start();
        let out = handle_with_policy(
            &ctx,
            "op",
            || {
                ctx.mark_error(CapturedError::new("HookFailure", "reported by callee"));
                Ok(())
            },
            &OnErrorConfig::default(),
        )
        .unwrap();

        assert_eq!(out, Some(()));
        assert_eq!(ctx.status(), ExecutionStatus::Error);
        let error = ctx.error().unwrap();
        assert_eq!(error.kind, "HookFailure");
        assert_eq!(error.message, "reported by callee");
    }

    #[test]
    fn retry_clears_previous_attempt_before_callee_runs() {
        let ctx = suite();
        ctx.start();
        let seen = std::sync::Mutex::new(Vec::new());
        let calls = AtomicU32::new(0);
        handle_with_policy(
            &ctx,
            "op",
            || {
                seen.lock().unwrap().push((ctx.status(), ctx.error().is_none()));
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    ctx.mark_error(CapturedError::new("StepFailure", "first"));
                    Err(failing("first"))
                } else {
                    Ok(())
                }
            },
            &policy(1, false),
        )
        .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(ExecutionStatus::Running, true), (ExecutionStatus::Running, true)]
        );
        assert_eq!(ctx.status(), ExecutionStatus::Success);
        assert!(ctx.error().is_none());
    }

    #[test]
    fn fail_fast_returns_original_error() {
        let ctx = suite();
        let err = handle_with_policy::<(), _>(&ctx, "op", || Err(failing("E")), &policy(0, false))
            .unwrap_err();
        assert_eq!(err.kind(), "StepFailure");
        assert!(err.to_string().contains("E"));
        assert_eq!(ctx.status(), ExecutionStatus::Error);
        assert_eq!(ctx.error().unwrap().kind, "StepFailure");
    }

    #[test]
    fn exhausted_retries_wrap_last_failure() {
        let ctx = suite();
        let calls = AtomicU32::new(0);
        let err = handle_with_policy::<(), _>(
            &ctx,
            "op",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(failing(&format!("attempt {n}")))
            },
            &policy(2, false),
        )
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            PipebenchError::Execution(ExecutionError::RetryExhausted {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("attempt 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let captured = ctx.error().unwrap();
        assert_eq!(captured.kind, "StepFailure");
        assert!(captured.message.contains("attempt 2"));
    }

    #[test]
    fn continue_swallows_and_records_error() {
        let ctx = suite();
        let out = handle_with_policy::<(), _>(&ctx, "op", || Err(failing("E")), &policy(1, true))
            .unwrap();
        assert!(out.is_none());
        assert_eq!(ctx.status(), ExecutionStatus::Error);
    }

    #[test]
    fn retry_delay_is_applied_between_attempts() {
        let ctx = suite();
        let on_error = OnErrorConfig {
            retries: 2,
            continue_: true,
            retry_delay_seconds: 0.02,
        };
        let started = std::time::Instant::now();
        let _ = handle_with_policy::<(), _>(&ctx, "op", || Err(failing("E")), &on_error);
        assert!(started.elapsed() >= std::time::Duration::from_millis(40));
    }

    // ── run_hooks tests ──

    fn hook(name: &str, on_error: OnErrorConfig, fail: bool, calls: Arc<AtomicU32>) -> Hook {
        let hook_name = name.to_owned();
        Hook::from_fn(name, HookStrategyConfig { on_error }, move |_ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(ExecutionError::HookFailure {
                    hook: hook_name.clone(),
                    reason: "E".to_owned(),
                }
                .into())
            } else {
                Ok(())
            }
        })
    }

    #[test]
    fn each_hook_gets_a_child_context_in_order() {
        let parent = suite();
        let calls = Arc::new(AtomicU32::new(0));
        let hooks = vec![
            hook("a", policy(0, false), false, calls.clone()),
            hook("b", policy(0, false), false, calls.clone()),
            hook("c", policy(0, false), false, calls.clone()),
        ];

        run_hooks(&hooks, FrameworkPhase::BeforeSuite.into(), &parent).unwrap();

        let children = parent.child_contexts();
        let names: Vec<&str> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(children.iter().all(|c| c.status() == ExecutionStatus::Success));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn fatal_hook_aborts_remaining_hooks() {
        let parent = suite();
        let calls = Arc::new(AtomicU32::new(0));
        let hooks = vec![
            hook("bad", policy(0, false), true, calls.clone()),
            hook("never", policy(0, false), false, calls.clone()),
        ];

        let err = run_hooks(&hooks, FrameworkPhase::BeforeSuite.into(), &parent).unwrap_err();
        assert_eq!(err.kind(), "HookFailure");
        assert_eq!(parent.child_contexts().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tolerated_hook_failure_lets_next_hook_run() {
        let parent = suite();
        let calls = Arc::new(AtomicU32::new(0));
        let hooks = vec![
            hook("flaky", policy(0, true), true, calls.clone()),
            hook("after", policy(0, false), false, calls.clone()),
        ];

        run_hooks(&hooks, FrameworkPhase::AfterSuite.into(), &parent).unwrap();

        let children = parent.child_contexts();
        assert_eq!(children[0].status(), ExecutionStatus::Error);
        assert_eq!(children[1].status(), ExecutionStatus::Success);
        // swallowed failures do not degrade the parent
        assert_eq!(parent.status(), ExecutionStatus::Pending);
    }
}
