//! 스텝 액션: 시나리오 스텝 하나가 수행하는 작업

use std::sync::Arc;

use crate::component::ComponentHandle;
use crate::context::ExecutionContext;
use crate::error::PipebenchError;
use crate::runtime::Runtime;

/// 스텝 액션에 전달되는 환경
pub struct StepEnv<'a> {
    /// 스텝 컨텍스트
    pub ctx: &'a ExecutionContext,
    /// 프로세스 런타임 저장소
    pub process: &'a Arc<Runtime>,
    components: &'a [ComponentHandle],
}

impl<'a> StepEnv<'a> {
    /// 환경을 구성합니다.
    pub fn new(
        ctx: &'a ExecutionContext,
        process: &'a Arc<Runtime>,
        components: &'a [ComponentHandle],
    ) -> Self {
        Self {
            ctx,
            process,
            components,
        }
    }

    /// 이름으로 컴포넌트 런타임 저장소를 찾습니다.
    pub fn component_runtime(&self, name: &str) -> Option<&'a Arc<Runtime>> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(ComponentHandle::runtime)
    }

    /// 스위트에 속한 컴포넌트 이름 목록
    pub fn component_names(&self) -> Vec<&'a str> {
        self.components.iter().map(ComponentHandle::name).collect()
    }
}

/// 스텝 액션
///
/// 반환값은 스텝 컨텍스트의 `test.step.result` 메타데이터로 기록됩니다.
/// 결과가 없으면 `serde_json::Value::Null`을 반환합니다.
pub trait StepAction: Send + Sync {
    /// 액션을 한 번 실행합니다.
    fn run(&self, env: &StepEnv<'_>) -> Result<serde_json::Value, PipebenchError>;
}

impl<F> StepAction for F
where
    F: Fn(&StepEnv<'_>) -> Result<serde_json::Value, PipebenchError> + Send + Sync,
{
    fn run(&self, env: &StepEnv<'_>) -> Result<serde_json::Value, PipebenchError> {
        self(env)
    }
}
