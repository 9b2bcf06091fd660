//! 선언적 스위트 로더
//!
//! YAML(`.yaml`/`.yml`) 또는 TOML(`.toml`) 문서를 [`SuiteDefinition`]으로
//! 파싱하고, 검증한 뒤 [`Registries`]를 통해 실행 가능한 [`Suite`]로 빌드합니다.
//!
//! # 처리 순서
//! 1. [`load_suite_file`] / [`parse_suite`]: 문서 파싱 (알 수 없는 필드 거부)
//! 2. [`SuiteDefinition::validate`]: 이름/정책/훅 페이즈 검증
//! 3. [`SuiteDefinition::build`]: 플러그인 조회 및 인스턴스 생성
//!
//! 알 수 없는 플러그인 이름은 실행 전, 빌드 단계에서 `PluginNotFound`로 실패합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::component::{ComponentHandle, ComponentPhase};
use crate::context::Metadata;
use crate::error::{ConfigError, PipebenchError};
use crate::hook::{FrameworkPhase, Hook, HookStrategyConfig, OnErrorConfig};
use crate::plugin::Registries;
use crate::suite::{Scenario, Step, Suite};

/// 페이즈 이름별 훅 정의
pub type HookDefinitions = BTreeMap<String, Vec<HookDefinition>>;

// ─── Definitions ─────────────────────────────────────────────────────

/// 스위트 문서 최상위
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteDefinition {
    /// 스위트 이름
    pub name: String,
    /// 스위트 메타데이터 (모든 하위 컨텍스트에 상속)
    #[serde(default)]
    pub metadata: Metadata,
    /// 컴포넌트 목록 (선언 순서대로 기동)
    #[serde(default)]
    pub components: Vec<ComponentDefinition>,
    /// `before_suite` / `after_suite` 훅
    #[serde(default)]
    pub hooks: HookDefinitions,
    /// 시나리오 목록
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
}

/// 컴포넌트 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentDefinition {
    /// 인스턴스 이름
    pub name: String,
    /// 등록된 컴포넌트 플러그인 이름
    #[serde(rename = "type")]
    pub plugin: String,
    /// 플러그인 설정
    #[serde(default)]
    pub config: serde_json::Value,
    /// 생명주기 페이즈별 훅
    #[serde(default)]
    pub hooks: HookDefinitions,
    /// 페이즈 동작의 에러 정책
    #[serde(default)]
    pub on_error: OnErrorConfig,
}

/// 시나리오 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// `before_scenario` / `after_scenario` 훅
    #[serde(default)]
    pub hooks: HookDefinitions,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// 스텝 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub name: String,
    /// 등록된 액션 플러그인 이름
    pub action: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub on_error: OnErrorConfig,
    #[serde(default)]
    pub metadata: Metadata,
    /// `before_step` / `after_step` 훅
    #[serde(default)]
    pub hooks: HookDefinitions,
}

/// 훅 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookDefinition {
    /// 훅 이름 (생략 시 플러그인 이름)
    #[serde(default)]
    pub name: Option<String>,
    /// 등록된 훅 플러그인 이름
    #[serde(rename = "type")]
    pub plugin: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub on_error: OnErrorConfig,
}

impl HookDefinition {
    /// 실제 훅 이름
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.plugin)
    }
}

// ─── Parsing ─────────────────────────────────────────────────────────

/// 스위트 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteFormat {
    Yaml,
    Toml,
}

impl SuiteFormat {
    /// 파일 확장자로 형식을 결정합니다.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::InvalidValue {
                field: "suite".to_owned(),
                reason: format!(
                    "unsupported suite file extension '{}', expected one of: yaml, yml, toml",
                    other.unwrap_or("")
                ),
            }),
        }
    }
}

/// 문자열에서 스위트 정의를 파싱하고 검증합니다.
pub fn parse_suite(content: &str, format: SuiteFormat) -> Result<SuiteDefinition, ConfigError> {
    let definition: SuiteDefinition = match format {
        SuiteFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?,
        SuiteFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?,
    };
    definition.validate()?;
    Ok(definition)
}

/// 파일에서 스위트 정의를 읽습니다. 형식은 확장자로 결정됩니다.
pub fn load_suite_file(path: &Path) -> Result<SuiteDefinition, ConfigError> {
    let format = SuiteFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            ConfigError::ParseFailed {
                reason: format!("failed to read {}: {e}", path.display()),
            }
        }
    })?;

    let definition = parse_suite(&content, format)?;
    info!(
        path = %path.display(),
        suite = %definition.name,
        components = definition.components.len(),
        scenarios = definition.scenarios.len(),
        "suite definition loaded"
    );
    Ok(definition)
}

// ─── Validation ──────────────────────────────────────────────────────

impl SuiteDefinition {
    /// 정의를 검증합니다.
    ///
    /// - 이름은 비어 있지 않아야 하고 같은 수준에서 유일해야 함
    /// - 모든 `on_error` 정책은 유효해야 함
    /// - 훅 페이즈는 선언된 수준에 맞아야 함
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_name("name", &self.name)?;
        validate_framework_hooks(
            "hooks",
            &self.hooks,
            &[FrameworkPhase::BeforeSuite, FrameworkPhase::AfterSuite],
        )?;

        let mut seen = BTreeSet::new();
        for (i, component) in self.components.iter().enumerate() {
            let field = format!("components[{i}]");
            require_name(&format!("{field}.name"), &component.name)?;
            require_name(&format!("{field}.type"), &component.plugin)?;
            require_unique(&mut seen, &field, &component.name)?;
            validate_policy(&field, &component.on_error)?;
            validate_component_hooks(&format!("{field}.hooks"), &component.hooks)?;
        }

        let mut seen = BTreeSet::new();
        for (i, scenario) in self.scenarios.iter().enumerate() {
            let field = format!("scenarios[{i}]");
            require_name(&format!("{field}.name"), &scenario.name)?;
            require_unique(&mut seen, &field, &scenario.name)?;
            validate_framework_hooks(
                &format!("{field}.hooks"),
                &scenario.hooks,
                &[FrameworkPhase::BeforeScenario, FrameworkPhase::AfterScenario],
            )?;

            let mut steps = BTreeSet::new();
            for (j, step) in scenario.steps.iter().enumerate() {
                let field = format!("{field}.steps[{j}]");
                require_name(&format!("{field}.name"), &step.name)?;
                require_name(&format!("{field}.action"), &step.action)?;
                require_unique(&mut steps, &field, &step.name)?;
                validate_policy(&field, &step.on_error)?;
                validate_framework_hooks(
                    &format!("{field}.hooks"),
                    &step.hooks,
                    &[FrameworkPhase::BeforeStep, FrameworkPhase::AfterStep],
                )?;
            }
        }

        Ok(())
    }
}

fn require_name(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: "must not be empty".to_owned(),
        });
    }
    Ok(())
}

fn require_unique(seen: &mut BTreeSet<String>, field: &str, name: &str) -> Result<(), ConfigError> {
    if !seen.insert(name.to_owned()) {
        return Err(ConfigError::InvalidValue {
            field: format!("{field}.name"),
            reason: format!("duplicate name '{name}'"),
        });
    }
    Ok(())
}

fn validate_policy(field: &str, on_error: &OnErrorConfig) -> Result<(), ConfigError> {
    on_error.validate().map_err(|e| match e {
        ConfigError::InvalidValue { field: inner, reason } => ConfigError::InvalidValue {
            field: format!("{field}.{inner}"),
            reason,
        },
        other => other,
    })
}

fn validate_hook_list(field: &str, hooks: &[HookDefinition]) -> Result<(), ConfigError> {
    for (i, hook) in hooks.iter().enumerate() {
        let field = format!("{field}[{i}]");
        require_name(&format!("{field}.type"), &hook.plugin)?;
        validate_policy(&field, &hook.on_error)?;
    }
    Ok(())
}

fn validate_framework_hooks(
    field: &str,
    hooks: &HookDefinitions,
    allowed: &[FrameworkPhase],
) -> Result<(), ConfigError> {
    for (key, list) in hooks {
        let phase = parse_framework_phase(field, key)?;
        if !allowed.contains(&phase) {
            return Err(ConfigError::InvalidValue {
                field: format!("{field}.{key}"),
                reason: format!(
                    "hook phase not allowed here, must be one of: {}",
                    allowed.iter().map(|p| p.value()).collect::<Vec<_>>().join(", ")
                ),
            });
        }
        validate_hook_list(&format!("{field}.{key}"), list)?;
    }
    Ok(())
}

fn validate_component_hooks(field: &str, hooks: &HookDefinitions) -> Result<(), ConfigError> {
    for (key, list) in hooks {
        parse_component_phase(field, key)?;
        validate_hook_list(&format!("{field}.{key}"), list)?;
    }
    Ok(())
}

fn parse_framework_phase(field: &str, key: &str) -> Result<FrameworkPhase, ConfigError> {
    FrameworkPhase::from_str(key).map_err(|_| ConfigError::InvalidValue {
        field: format!("{field}.{key}"),
        reason: format!("unknown hook phase '{key}'"),
    })
}

fn parse_component_phase(field: &str, key: &str) -> Result<ComponentPhase, ConfigError> {
    ComponentPhase::from_str(key).map_err(|_| ConfigError::InvalidValue {
        field: format!("{field}.{key}"),
        reason: format!(
            "unknown component phase '{key}', must be one of: {}",
            ComponentPhase::ALL.iter().map(|p| p.value()).collect::<Vec<_>>().join(", ")
        ),
    })
}

// ─── Build ───────────────────────────────────────────────────────────

impl SuiteDefinition {
    /// 레지스트리를 사용해 실행 가능한 스위트를 만듭니다.
    ///
    /// 플러그인 조회와 설정 검증은 모두 여기서 끝나므로,
    /// 실행 중에 `PluginNotFound`가 발생하지 않습니다.
    pub fn build(&self, registries: &Registries) -> Result<Suite, PipebenchError> {
        self.validate()?;

        let mut suite = Suite::new(&self.name).with_metadata(self.metadata.clone());
        for (key, list) in &self.hooks {
            let phase = parse_framework_phase("hooks", key)?;
            for hook in build_hooks(registries, list)? {
                suite.add_hook(phase, hook);
            }
        }

        for def in &self.components {
            let component = registries.components.create(&def.plugin, &def.name, def.config.clone())?;
            let mut handle = ComponentHandle::new(component).with_phase_policy(def.on_error.clone());
            for (key, list) in &def.hooks {
                let phase = parse_component_phase("hooks", key)?;
                for hook in build_hooks(registries, list)? {
                    handle.add_hook(phase, hook);
                }
            }
            debug!(component = %def.name, plugin = %def.plugin, "component built");
            suite = suite.with_component(handle);
        }

        for def in &self.scenarios {
            let mut scenario = Scenario::new(&def.name).with_metadata(def.metadata.clone());
            for (key, list) in &def.hooks {
                let phase = parse_framework_phase("hooks", key)?;
                for hook in build_hooks(registries, list)? {
                    scenario.add_hook(phase, hook);
                }
            }

            for step_def in &def.steps {
                let action = registries
                    .actions
                    .create(&step_def.action, &step_def.name, step_def.config.clone())?;
                let mut step = Step::new(&step_def.name, Arc::from(action))
                    .with_on_error(step_def.on_error.clone())
                    .with_metadata(step_def.metadata.clone());
                for (key, list) in &step_def.hooks {
                    let phase = parse_framework_phase("hooks", key)?;
                    for hook in build_hooks(registries, list)? {
                        step.add_hook(phase, hook);
                    }
                }
                scenario = scenario.with_step(step);
            }
            suite = suite.with_scenario(scenario);
        }

        Ok(suite)
    }
}

fn build_hooks(registries: &Registries, defs: &[HookDefinition]) -> Result<Vec<Hook>, PipebenchError> {
    defs.iter()
        .map(|def| {
            let name = def.display_name();
            let strategy = registries.hooks.create(&def.plugin, name, def.config.clone())?;
            Ok(Hook::new(
                name,
                HookStrategyConfig {
                    on_error: def.on_error.clone(),
                },
                Arc::from(strategy),
            ))
        })
        .collect()
}
