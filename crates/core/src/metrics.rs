//! 메트릭 상수 및 설명 등록
//!
//! 엔진이 기록하는 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진 코드는 [`crate::telemetry::Meter`]를 통해 이 상수로 기록하고,
//! 바이너리는 `metrics` 매크로로 게이지를 직접 설정합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `pipebench_`
//! - 영역: `policy_`, `hook_`, `phase_`, `step_`, `contexts_`, `plugins_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use pipebench_core::metrics as m;
//!
//! ctx.telemetry()
//!     .meter("pipebench.engine")
//!     .add_counter(m::POLICY_ATTEMPTS_TOTAL, 1, &[(m::LABEL_KIND, "hook".into())]);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 컨텍스트 종류 레이블 키 (suite, scenario, step, component_phase, hook)
pub const LABEL_KIND: &str = "kind";

/// 실행 상태 레이블 키 (pending, running, success, error)
pub const LABEL_STATUS: &str = "status";

/// 최종 실패 처리 결과 레이블 키 (continued, raised)
pub const LABEL_OUTCOME: &str = "outcome";

/// 페이즈 레이블 키 (configure, deploy, ..., before_suite, ...)
pub const LABEL_PHASE: &str = "phase";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 플러그인 종류 레이블 키 (component, action, hook)
pub const LABEL_PLUGIN_KIND: &str = "plugin_kind";

/// 버전 레이블 키
pub const LABEL_VERSION: &str = "version";

// ─── 에러 정책 메트릭 ────────────────────────────────────────────────

/// 정책 하에서 실행된 전체 시도 수 (counter, label: kind)
pub const POLICY_ATTEMPTS_TOTAL: &str = "pipebench_policy_attempts_total";

/// 재시도 수 (counter, label: kind)
pub const POLICY_RETRIES_TOTAL: &str = "pipebench_policy_retries_total";

/// 모든 시도가 실패한 작업 수 (counter, labels: kind, outcome)
pub const POLICY_FAILURES_TOTAL: &str = "pipebench_policy_failures_total";

// ─── 실행 메트릭 ────────────────────────────────────────────────────

/// 훅 실행 수 (counter, labels: phase, result)
pub const HOOK_EXECUTIONS_TOTAL: &str = "pipebench_hook_executions_total";

/// 컴포넌트 페이즈 소요 시간 (histogram, 초, labels: phase, result)
pub const PHASE_DURATION_SECONDS: &str = "pipebench_phase_duration_seconds";

/// 스텝 소요 시간 (histogram, 초, label: result)
pub const STEP_DURATION_SECONDS: &str = "pipebench_step_duration_seconds";

/// 종료된 컨텍스트 수 (counter, labels: kind, status)
pub const CONTEXTS_TOTAL: &str = "pipebench_contexts_total";

// ─── 프로세스 메트릭 ────────────────────────────────────────────────

/// 등록된 플러그인 수 (gauge, label: plugin_kind)
pub const PLUGINS_REGISTERED: &str = "pipebench_plugins_registered";

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const BUILD_INFO: &str = "pipebench_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 페이즈/스텝 소요 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 600s 범위. 배포/정지 페이즈는 수십 초가 걸릴 수 있습니다.
pub const DURATION_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0, 300.0, 600.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `pipebench` 바이너리의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Error policy
    describe_counter!(
        POLICY_ATTEMPTS_TOTAL,
        "Total number of attempts made by the error-policy executor"
    );
    describe_counter!(
        POLICY_RETRIES_TOTAL,
        "Total number of retries after a failed attempt"
    );
    describe_counter!(
        POLICY_FAILURES_TOTAL,
        "Operations whose every attempt failed, by outcome (continued, raised)"
    );

    // Execution
    describe_counter!(
        HOOK_EXECUTIONS_TOTAL,
        "Hook executions per phase and result"
    );
    describe_histogram!(
        PHASE_DURATION_SECONDS,
        "Component phase duration in seconds, hooks included"
    );
    describe_histogram!(STEP_DURATION_SECONDS, "Scenario step duration in seconds");
    describe_counter!(
        CONTEXTS_TOTAL,
        "Execution contexts ended, by kind and final status"
    );

    // Process
    describe_gauge!(PLUGINS_REGISTERED, "Number of registered plugins per kind");
    describe_gauge!(BUILD_INFO, "Build information (always 1, with version label)");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        POLICY_ATTEMPTS_TOTAL,
        POLICY_RETRIES_TOTAL,
        POLICY_FAILURES_TOTAL,
        HOOK_EXECUTIONS_TOTAL,
        PHASE_DURATION_SECONDS,
        STEP_DURATION_SECONDS,
        CONTEXTS_TOTAL,
        PLUGINS_REGISTERED,
        BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_pipebench_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("pipebench_"),
                "Metric '{}' does not start with 'pipebench_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_and_histograms_follow_suffix_convention() {
        for name in [
            POLICY_ATTEMPTS_TOTAL,
            POLICY_RETRIES_TOTAL,
            POLICY_FAILURES_TOTAL,
            HOOK_EXECUTIONS_TOTAL,
            CONTEXTS_TOTAL,
        ] {
            assert!(name.ends_with("_total"), "{name}");
        }
        for name in [PHASE_DURATION_SECONDS, STEP_DURATION_SECONDS] {
            assert!(name.ends_with("_seconds"), "{name}");
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더 없이 호출해도 패닉하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        let labels = [
            LABEL_KIND,
            LABEL_STATUS,
            LABEL_OUTCOME,
            LABEL_PHASE,
            LABEL_RESULT,
            LABEL_PLUGIN_KIND,
            LABEL_VERSION,
        ];
        for label in &labels {
            assert_eq!(
                label.to_lowercase(),
                *label,
                "Label key '{}' should be lowercase",
                label
            );
        }
    }

    #[test]
    fn duration_buckets_are_sorted() {
        assert!(DURATION_BUCKETS.windows(2).all(|w| w[1] > w[0]));
    }
}
