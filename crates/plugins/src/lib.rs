//! pipebench-plugins: 기본 제공 플러그인
//!
//! # 등록되는 플러그인
//! | 종류 | 이름 | 설명 |
//! |------|------|------|
//! | hook | `noop`, `wait`, `raise` | 아무것도 안 함 / 대기 / 항상 실패 |
//! | action | `noop`, `wait`, `raise`, `template` | 위와 같음 + 메타데이터 템플릿 렌더링 |
//! | component | `command` | 페이즈마다 외부 명령 실행 |
//!
//! 프로세스 시작 시 [`load_all_plugins`]를 한 번 호출합니다.
//! 여러 번 호출해도 등록은 한 번만 일어납니다.

pub mod actions;
pub mod command;
pub mod hooks;

use std::sync::Once;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use pipebench_core::args::{ArgumentRegistry, register_argument_hook};
use pipebench_core::error::PluginError;
use pipebench_core::plugin::{Registries, with_global_mut};

/// 액션 플러그인이 공유하는 CLI 인자 그룹
pub const ACTION_ARG_GROUP: &str = "Action plugins";

/// 설정이 없는 플러그인용 빈 설정
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyConfig {}

/// `wait` 훅/액션 설정
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitConfig {
    /// 대기 시간 (초)
    pub seconds: f64,
}

impl WaitConfig {
    /// 설정을 검증하고 대기 시간으로 변환합니다.
    pub fn duration(&self, kind: &str) -> Result<Duration, PluginError> {
        Duration::try_from_secs_f64(self.seconds).map_err(|_| PluginError::InvalidConfig {
            kind: kind.to_owned(),
            name: "wait".to_owned(),
            reason: format!("seconds must be a non-negative number, got {}", self.seconds),
        })
    }
}

/// `raise` 훅/액션 설정
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaiseConfig {
    /// 실패 메시지
    pub message: String,
}

impl Default for RaiseConfig {
    fn default() -> Self {
        Self {
            message: "failure raised by configuration".to_owned(),
        }
    }
}

/// 모든 기본 플러그인을 주어진 레지스트리에 등록합니다.
pub fn register_all(registries: &mut Registries) {
    hooks::register(&mut registries.hooks);
    actions::register(&mut registries.actions);
    command::register(&mut registries.components);
}

/// 모든 기본 플러그인을 전역 레지스트리와 인자 훅 목록에 등록합니다.
pub fn load_all_plugins() {
    static LOADED: Once = Once::new();
    LOADED.call_once(|| {
        with_global_mut(register_all);
        register_argument_hook("pipebench-plugins.actions", action_arguments);

        let counts = pipebench_core::plugin::with_global(Registries::counts);
        info!(
            components = counts[0].1,
            actions = counts[1].1,
            hooks = counts[2].1,
            "built-in plugins loaded"
        );
    });
}

fn action_arguments(registry: &mut ArgumentRegistry) {
    actions::wait_arguments(registry);
    actions::template_arguments(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_fills_every_kind() {
        let mut reg = Registries::new();
        register_all(&mut reg);
        assert_eq!(reg.hooks.names(), vec!["noop", "raise", "wait"]);
        assert_eq!(reg.actions.names(), vec!["noop", "raise", "template", "wait"]);
        assert_eq!(reg.components.names(), vec!["command"]);
    }

    #[test]
    fn wait_rejects_negative_seconds() {
        let cfg = WaitConfig { seconds: -0.5 };
        assert!(cfg.duration("hook").is_err());
        let cfg = WaitConfig { seconds: 0.25 };
        assert_eq!(cfg.duration("hook").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn empty_config_rejects_fields() {
        assert!(serde_json::from_value::<EmptyConfig>(serde_json::json!({})).is_ok());
        assert!(serde_json::from_value::<EmptyConfig>(serde_json::json!({ "x": 1 })).is_err());
    }
}
