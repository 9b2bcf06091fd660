//! 플러그인 레지스트리: 이름 기반 확장 지점
//!
//! 확장 가능한 종류(컴포넌트, 스텝 액션, 훅 전략)마다 [`PluginRegistry`]가 하나씩
//! 있으며, 두 개의 병렬 맵을 가집니다:
//! - `config`: 이름 → 설정 파서 (선언적 입력을 플러그인 설정 타입으로 검증/변환)
//! - `element`: 이름 → 팩토리 (검증된 설정으로 구현체를 생성)
//!
//! 로더는 스위트 로딩 시점에 `config[name]`으로 설정을 만들고 `element[name]`으로
//! 인스턴스를 생성합니다. 등록되지 않은 이름은 실행 전에 `PluginNotFound`로 실패합니다.
//!
//! # 등록
//! ```ignore
//! registries.hooks.register::<WaitConfig, _>("wait", |_name, cfg| {
//!     Ok(Box::new(WaitHook::new(cfg)))
//! });
//! ```
//! 같은 이름으로 다시 등록하면 마지막 등록이 우선합니다.

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::de::DeserializeOwned;

use crate::action::StepAction;
use crate::component::Component;
use crate::error::{PipebenchError, PluginError};
use crate::hook::HookStrategy;

type ConfigParser = Arc<dyn Fn(serde_json::Value) -> Result<Box<dyn Any + Send>, String> + Send + Sync>;

type ElementFactory<T> =
    Arc<dyn Fn(&str, Box<dyn Any + Send>) -> Result<Box<T>, PipebenchError> + Send + Sync>;

// ─── PluginConfig ────────────────────────────────────────────────────

/// `config` 맵이 만든 검증된 플러그인 설정
///
/// 같은 레지스트리의 같은 이름으로만 인스턴스화할 수 있습니다.
pub struct PluginConfig {
    plugin: String,
    value: Box<dyn Any + Send>,
}

impl PluginConfig {
    /// 설정을 만든 플러그인 이름
    pub fn plugin(&self) -> &str {
        &self.plugin
    }
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfig")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

// ─── PluginRegistry ──────────────────────────────────────────────────

/// 한 종류의 플러그인 레지스트리
///
/// 이름 순으로 정렬된 `element`/`config` 맵을 보관합니다.
pub struct PluginRegistry<T: ?Sized> {
    kind: &'static str,
    element: BTreeMap<String, ElementFactory<T>>,
    config: BTreeMap<String, ConfigParser>,
}

impl<T: ?Sized + 'static> PluginRegistry<T> {
    /// 빈 레지스트리를 생성합니다. `kind`는 에러 메시지에 사용됩니다.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            element: BTreeMap::new(),
            config: BTreeMap::new(),
        }
    }

    /// 플러그인 종류 이름
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// 플러그인을 등록합니다.
    ///
    /// `C`는 플러그인 설정 타입, `factory`는 인스턴스 이름과 설정을 받아
    /// 구현체를 생성합니다. 같은 이름이 이미 있으면 교체합니다.
    pub fn register<C, F>(&mut self, name: &str, factory: F)
    where
        C: DeserializeOwned + Send + 'static,
        F: Fn(&str, C) -> Result<Box<T>, PipebenchError> + Send + Sync + 'static,
    {
        let parser: ConfigParser = Arc::new(|value: serde_json::Value| {
            parse_config::<C>(value)
                .map(|c| Box::new(c) as Box<dyn Any + Send>)
                .map_err(|e| e.to_string())
        });

        let kind = self.kind;
        let plugin = name.to_owned();
        let element: ElementFactory<T> = Arc::new(
            move |instance: &str, config: Box<dyn Any + Send>| -> Result<Box<T>, PipebenchError> {
                let config = config.downcast::<C>().map_err(|_| PluginError::InvalidConfig {
                    kind: kind.to_owned(),
                    name: plugin.clone(),
                    reason: format!("expected configuration of type {}", type_name::<C>()),
                })?;
                factory(instance, *config)
            },
        );

        let replaced = self.element.insert(name.to_owned(), element).is_some();
        self.config.insert(name.to_owned(), parser);
        if replaced {
            tracing::debug!(kind = self.kind, plugin = name, "plugin re-registered, last registration wins");
        } else {
            tracing::trace!(kind = self.kind, plugin = name, "plugin registered");
        }
    }

    /// 선언적 설정을 플러그인 설정 타입으로 검증/변환합니다 (`config` 맵).
    ///
    /// `null`은 빈 설정으로 취급됩니다.
    pub fn parse_config(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<PluginConfig, PluginError> {
        let parser = self.config.get(name).ok_or_else(|| self.not_found(name))?;
        let value = parser(value).map_err(|reason| PluginError::InvalidConfig {
            kind: self.kind.to_owned(),
            name: name.to_owned(),
            reason,
        })?;
        Ok(PluginConfig {
            plugin: name.to_owned(),
            value,
        })
    }

    /// 검증된 설정으로 구현체를 생성합니다 (`element` 맵).
    pub fn instantiate(
        &self,
        instance: &str,
        config: PluginConfig,
    ) -> Result<Box<T>, PipebenchError> {
        let factory = self
            .element
            .get(&config.plugin)
            .ok_or_else(|| self.not_found(&config.plugin))?;
        factory(instance, config.value)
    }

    /// 설정 검증과 생성을 한 번에 수행합니다.
    pub fn create(
        &self,
        name: &str,
        instance: &str,
        value: serde_json::Value,
    ) -> Result<Box<T>, PipebenchError> {
        let config = self.parse_config(name, value)?;
        self.instantiate(instance, config)
    }

    /// 이름이 등록되어 있는지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.element.contains_key(name)
    }

    /// 등록된 플러그인 이름 목록 (정렬됨)
    pub fn names(&self) -> Vec<&str> {
        self.element.keys().map(String::as_str).collect()
    }

    /// 등록된 플러그인 수를 반환합니다.
    pub fn count(&self) -> usize {
        self.element.len()
    }

    fn not_found(&self, name: &str) -> PluginError {
        PluginError::NotFound {
            kind: self.kind.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for PluginRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("kind", &self.kind)
            .field("names", &self.element.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn parse_config<C: DeserializeOwned>(value: serde_json::Value) -> Result<C, serde_json::Error> {
    if value.is_null() {
        // unit 설정은 null로, 구조체 설정은 빈 객체로 역직렬화
        serde_json::from_value(serde_json::Value::Null)
            .or_else(|_| serde_json::from_value(serde_json::Value::Object(Default::default())))
    } else {
        serde_json::from_value(value)
    }
}

// ─── Registries ──────────────────────────────────────────────────────

/// 확장 가능한 모든 종류의 레지스트리 묶음
#[derive(Debug)]
pub struct Registries {
    /// 컴포넌트 타입
    pub components: PluginRegistry<dyn Component>,
    /// 스텝 액션
    pub actions: PluginRegistry<dyn StepAction>,
    /// 훅 전략
    pub hooks: PluginRegistry<dyn HookStrategy>,
}

impl Registries {
    /// 빈 레지스트리 묶음을 생성합니다.
    pub fn new() -> Self {
        Self {
            components: PluginRegistry::new("component"),
            actions: PluginRegistry::new("action"),
            hooks: PluginRegistry::new("hook"),
        }
    }

    /// 종류별 등록 수 `(kind, count)`
    pub fn counts(&self) -> [(&'static str, usize); 3] {
        [
            (self.components.kind(), self.components.count()),
            (self.actions.kind(), self.actions.count()),
            (self.hooks.kind(), self.hooks.count()),
        ]
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<RwLock<Registries>> = OnceLock::new();

/// 프로세스 전역 레지스트리
///
/// 플러그인 크레이트는 시작 시 여기에 등록하고, 로더는 여기서 조회합니다.
pub fn global() -> &'static RwLock<Registries> {
    GLOBAL.get_or_init(|| RwLock::new(Registries::new()))
}

/// 전역 레지스트리를 읽기 잠금으로 사용합니다.
pub fn with_global<R>(f: impl FnOnce(&Registries) -> R) -> R {
    let guard = global().read().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

/// 전역 레지스트리를 쓰기 잠금으로 사용합니다.
pub fn with_global_mut<R>(f: impl FnOnce(&mut Registries) -> R) -> R {
    let mut guard = global().write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use serial_test::serial;

    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct GreeterConfig {
        #[serde(default = "default_greeting")]
        greeting: String,
    }

    fn default_greeting() -> String {
        "hello".to_owned()
    }

    struct Simple {
        instance: String,
        greeting: String,
    }

    impl Greeter for Simple {
        fn greet(&self) -> String {
            format!("{} from {}", self.greeting, self.instance)
        }
    }

    fn registry() -> PluginRegistry<dyn Greeter> {
        let mut registry = PluginRegistry::<dyn Greeter>::new("greeter");
        registry.register::<GreeterConfig, _>("simple", |instance, cfg| {
            Ok(Box::new(Simple {
                instance: instance.to_owned(),
                greeting: cfg.greeting,
            }))
        });
        registry
    }

    // ── PluginRegistry tests ──

    #[test]
    fn create_registered_plugin() {
        let registry = registry();
        let greeter = registry
            .create("simple", "g1", json!({ "greeting": "hi" }))
            .unwrap();
        assert_eq!(greeter.greet(), "hi from g1");
    }

    #[test]
    fn null_config_uses_defaults() {
        let registry = registry();
        let greeter = registry.create("simple", "g1", serde_json::Value::Null).unwrap();
        assert_eq!(greeter.greet(), "hello from g1");
    }

    #[test]
    fn unit_config_accepts_null() {
        let mut registry = PluginRegistry::<dyn Greeter>::new("greeter");
        registry.register::<(), _>("unit", |instance, ()| {
            Ok(Box::new(Simple {
                instance: instance.to_owned(),
                greeting: "yo".to_owned(),
            }))
        });
        assert!(registry.create("unit", "u", serde_json::Value::Null).is_ok());
    }

    #[test]
    fn unknown_name_is_plugin_not_found() {
        let registry = registry();
        let err = registry.create("fancy", "g1", json!({})).err().unwrap();
        assert_eq!(err.kind(), "PluginNotFound");
        assert!(err.to_string().contains("greeter plugin not found: fancy"));
    }

    #[test]
    fn invalid_config_is_rejected_by_config_map() {
        let registry = registry();
        let err = registry
            .parse_config("simple", json!({ "greating": "typo" }))
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidConfig { .. }));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = registry();
        registry.register::<GreeterConfig, _>("simple", |_instance, _cfg| {
            Ok(Box::new(Simple {
                instance: "replacement".to_owned(),
                greeting: "bye".to_owned(),
            }))
        });

        assert_eq!(registry.count(), 1);
        let greeter = registry.create("simple", "g1", json!({})).unwrap();
        assert_eq!(greeter.greet(), "bye from replacement");
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = registry();
        registry.register::<GreeterConfig, _>("alpha", |instance, cfg| {
            Ok(Box::new(Simple {
                instance: instance.to_owned(),
                greeting: cfg.greeting,
            }))
        });
        assert_eq!(registry.names(), vec!["alpha", "simple"]);
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("beta"));
    }

    // ── Registries tests ──

    #[test]
    fn new_registries_are_empty() {
        let registries = Registries::new();
        assert!(registries.counts().iter().all(|(_, count)| *count == 0));
        assert_eq!(registries.hooks.kind(), "hook");
    }

    #[test]
    #[serial]
    fn global_registry_is_shared() {
        with_global_mut(|r| {
            r.hooks.register::<(), _>("plugin-test-noop", |_instance, ()| {
                Ok(Box::new(|_ctx: &crate::context::ExecutionContext| {
                    Ok::<(), PipebenchError>(())
                }))
            });
        });
        assert!(with_global(|r| r.hooks.contains("plugin-test-noop")));
    }
}
