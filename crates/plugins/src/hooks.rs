//! 훅 플러그인: `noop`, `wait`, `raise`

use std::thread;
use std::time::Duration;

use tracing::info;

use pipebench_core::context::ExecutionContext;
use pipebench_core::error::{ExecutionError, PipebenchError};
use pipebench_core::hook::HookStrategy;
use pipebench_core::plugin::PluginRegistry;

use crate::{EmptyConfig, RaiseConfig, WaitConfig};

/// 훅 플러그인을 등록합니다.
pub fn register(registry: &mut PluginRegistry<dyn HookStrategy>) {
    registry.register("noop", |_name: &str, _cfg: EmptyConfig| {
        Ok(Box::new(NoopHook) as Box<dyn HookStrategy>)
    });
    registry.register("wait", |_name: &str, cfg: WaitConfig| {
        let delay = cfg.duration("hook")?;
        Ok(Box::new(WaitHook { delay }) as Box<dyn HookStrategy>)
    });
    registry.register("raise", |name: &str, cfg: RaiseConfig| {
        Ok(Box::new(RaiseHook {
            name: name.to_owned(),
            message: cfg.message,
        }) as Box<dyn HookStrategy>)
    });
}

/// 아무것도 하지 않는 훅
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl HookStrategy for NoopHook {
    fn on_execute(&self, _ctx: &ExecutionContext) -> Result<(), PipebenchError> {
        Ok(())
    }
}

/// 고정 시간 동안 대기하는 훅
#[derive(Debug, Clone, Copy)]
pub struct WaitHook {
    delay: Duration,
}

impl WaitHook {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl HookStrategy for WaitHook {
    fn on_execute(&self, ctx: &ExecutionContext) -> Result<(), PipebenchError> {
        let element = ctx.get_framework_element().map(|e| e.name).unwrap_or_default();
        info!(hook = %ctx.name(), element = %element, seconds = self.delay.as_secs_f64(), "waiting");
        thread::sleep(self.delay);
        Ok(())
    }
}

/// 항상 실패하는 훅 (에러 정책 검증용)
#[derive(Debug, Clone)]
pub struct RaiseHook {
    name: String,
    message: String,
}

impl HookStrategy for RaiseHook {
    fn on_execute(&self, _ctx: &ExecutionContext) -> Result<(), PipebenchError> {
        Err(ExecutionError::HookFailure {
            hook: self.name.clone(),
            reason: self.message.clone(),
        }
        .into())
    }
}
