//! 스텝 액션 플러그인: `noop`, `wait`, `raise`, `template`
//!
//! `wait`와 `template`은 CLI 인자를 받습니다 (`--wait-scale`, `--template-var`).
//! 인자 값은 프로세스 런타임에 저장된 `clap::ArgMatches`에서 읽습니다.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches};
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, info};

use pipebench_core::action::{StepAction, StepEnv};
use pipebench_core::args::{ARG_MATCHES_NAMESPACE, ArgumentRegistry};
use pipebench_core::error::{ExecutionError, PipebenchError, PluginError};
use pipebench_core::plugin::PluginRegistry;

use crate::{ACTION_ARG_GROUP, EmptyConfig, RaiseConfig, WaitConfig};

/// `{{ key }}` 형식의 템플릿 변수
const TEMPLATE_VARIABLE_PATTERN: &str = r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}";

/// 액션 플러그인을 등록합니다.
pub fn register(registry: &mut PluginRegistry<dyn StepAction>) {
    registry.register("noop", |_name: &str, _cfg: EmptyConfig| {
        Ok(Box::new(NoopAction) as Box<dyn StepAction>)
    });
    registry.register("wait", |_name: &str, cfg: WaitConfig| {
        let delay = cfg.duration("action")?;
        Ok(Box::new(WaitAction { delay }) as Box<dyn StepAction>)
    });
    registry.register("raise", |name: &str, cfg: RaiseConfig| {
        Ok(Box::new(RaiseAction {
            name: name.to_owned(),
            message: cfg.message,
        }) as Box<dyn StepAction>)
    });
    registry.register("template", |_name: &str, cfg: TemplateConfig| {
        Ok(Box::new(TemplateAction::new(cfg)?) as Box<dyn StepAction>)
    });
}

/// `--wait-scale` 인자를 추가합니다.
pub fn wait_arguments(registry: &mut ArgumentRegistry) {
    registry.add_arg(
        ACTION_ARG_GROUP,
        Arg::new("wait-scale")
            .long("wait-scale")
            .value_name("FACTOR")
            .value_parser(parse_wait_scale)
            .help("Multiply every `wait` action duration by FACTOR"),
    );
}

/// `--template-var` 인자를 추가합니다.
pub fn template_arguments(registry: &mut ArgumentRegistry) {
    registry.add_arg(
        ACTION_ARG_GROUP,
        Arg::new("template-var")
            .long("template-var")
            .value_name("KEY=VALUE")
            .action(ArgAction::Append)
            .help("Extra variable for `template` actions (repeatable)"),
    );
}

fn parse_wait_scale(value: &str) -> Result<f64, String> {
    let scale: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if !scale.is_finite() || scale < 0.0 {
        return Err(format!("must be a non-negative number, got {value}"));
    }
    Ok(scale)
}

fn arg_matches(env: &StepEnv<'_>) -> Result<Option<std::sync::Arc<ArgMatches>>, PipebenchError> {
    Ok(env.process.get::<ArgMatches>(ARG_MATCHES_NAMESPACE)?)
}

// ─── noop / wait / raise ─────────────────────────────────────────────

/// 아무것도 하지 않는 액션
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAction;

impl StepAction for NoopAction {
    fn run(&self, _env: &StepEnv<'_>) -> Result<serde_json::Value, PipebenchError> {
        Ok(serde_json::Value::Null)
    }
}

/// 대기 액션
///
/// 실제 대기 시간은 `--wait-scale`로 조정되며, 대기한 초를 결과로 남깁니다.
#[derive(Debug, Clone, Copy)]
pub struct WaitAction {
    delay: Duration,
}

impl StepAction for WaitAction {
    fn run(&self, env: &StepEnv<'_>) -> Result<serde_json::Value, PipebenchError> {
        let scale = arg_matches(env)?
            .and_then(|m| m.try_get_one::<f64>("wait-scale").ok().flatten().copied())
            .unwrap_or(1.0);
        let delay = Duration::try_from_secs_f64(self.delay.as_secs_f64() * scale).map_err(|e| {
            ExecutionError::StepFailure {
                step: env.ctx.name().to_owned(),
                reason: format!("wait of {}s scaled by {scale} is out of range: {e}", self.delay.as_secs_f64()),
            }
        })?;
        info!(step = %env.ctx.name(), seconds = delay.as_secs_f64(), "waiting");
        thread::sleep(delay);
        Ok(serde_json::json!({ "waited_seconds": delay.as_secs_f64() }))
    }
}

/// 항상 실패하는 액션
#[derive(Debug, Clone)]
pub struct RaiseAction {
    name: String,
    message: String,
}

impl StepAction for RaiseAction {
    fn run(&self, _env: &StepEnv<'_>) -> Result<serde_json::Value, PipebenchError> {
        Err(ExecutionError::StepFailure {
            step: self.name.clone(),
            reason: self.message.clone(),
        }
        .into())
    }
}

// ─── template ────────────────────────────────────────────────────────

/// `template` 액션 설정
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    /// `{{ key }}` 자리표시자를 포함한 문자열
    pub template: String,
}

/// 컨텍스트 메타데이터로 템플릿을 렌더링하는 액션
///
/// 변수 우선순위: `--template-var` > 스텝 메타데이터 (상위 요소에서 상속된 값 포함).
/// 문자열이 아닌 값은 JSON으로 직렬화해 넣습니다.
#[derive(Debug, Clone)]
pub struct TemplateAction {
    template: String,
    pattern: Regex,
}

impl TemplateAction {
    /// 정규식을 미리 컴파일해 액션을 생성합니다.
    pub fn new(config: TemplateConfig) -> Result<Self, PluginError> {
        let pattern = Regex::new(TEMPLATE_VARIABLE_PATTERN).map_err(|e| PluginError::InvalidConfig {
            kind: "action".to_owned(),
            name: "template".to_owned(),
            reason: format!("invalid variable pattern: {e}"),
        })?;
        Ok(Self {
            template: config.template,
            pattern,
        })
    }

    /// 변수 표에서 템플릿을 렌더링합니다. 모르는 변수는 모두 나열해 실패합니다.
    pub fn render(&self, variables: &BTreeMap<String, serde_json::Value>) -> Result<String, Vec<String>> {
        let mut missing = Vec::new();
        let rendered = self.pattern.replace_all(&self.template, |caps: &Captures<'_>| {
            let key = &caps[1];
            match variables.get(key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    missing.push(key.to_owned());
                    String::new()
                }
            }
        });
        if missing.is_empty() {
            Ok(rendered.into_owned())
        } else {
            Err(missing)
        }
    }
}

impl StepAction for TemplateAction {
    fn run(&self, env: &StepEnv<'_>) -> Result<serde_json::Value, PipebenchError> {
        let mut variables = env.ctx.metadata();
        if let Some(matches) = arg_matches(env)? {
            if let Ok(Some(values)) = matches.try_get_many::<String>("template-var") {
                for value in values {
                    if let Some((key, val)) = value.split_once('=') {
                        variables.insert(key.trim().to_owned(), serde_json::Value::String(val.to_owned()));
                    } else {
                        debug!(value = %value, "ignoring template variable without '='");
                    }
                }
            }
        }

        let rendered = self.render(&variables).map_err(|missing| ExecutionError::StepFailure {
            step: env.ctx.name().to_owned(),
            reason: format!("unknown template variable(s): {}", missing.join(", ")),
        })?;
        info!(step = %env.ctx.name(), rendered = %rendered, "template rendered");
        Ok(serde_json::Value::String(rendered))
    }
}
