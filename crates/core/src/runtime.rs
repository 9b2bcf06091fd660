//! 런타임 저장소: 플러그인이 소유하는 네임스페이스별 상태 보관소
//!
//! [`Runtime`]은 컴포넌트 하나 또는 프로세스 전체에 붙어, 엔진이 타입을 모르는
//! 임의의 상태를 플러그인이 보관할 수 있게 합니다.
//!
//! # 동시성
//! 플러그인의 백그라운드 스레드가 메인 제어 스레드와 동시에 접근할 수 있습니다.
//! 저장소 전체 잠금은 조회/삽입 동안에만 잡고, 팩토리 실행은 네임스페이스별
//! `OnceLock` 안에서 수행되므로 호출자 작업 중에 저장소 잠금을 잡지 않습니다.
//! 같은 네임스페이스에 대한 팩토리는 최대 한 번만 호출됩니다.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::RuntimeError;

type Slot = Arc<OnceLock<Arc<dyn Any + Send + Sync>>>;

/// 네임스페이스 → 불투명 상태 저장소
#[derive(Default)]
pub struct Runtime {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Runtime {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 네임스페이스의 값을 조회합니다.
    ///
    /// 값이 없으면 `Ok(None)`, 다른 타입이 저장되어 있으면 `TypeMismatch`를 반환합니다.
    pub fn get<T>(&self, namespace: &str) -> Result<Option<Arc<T>>, RuntimeError>
    where
        T: Any + Send + Sync,
    {
        let slot = self.lock().get(namespace).cloned();
        match slot.and_then(|s| s.get().cloned()) {
            Some(value) => downcast(namespace, value).map(Some),
            None => Ok(None),
        }
    }

    /// 네임스페이스에 값을 저장합니다. 기존 값은 교체됩니다.
    pub fn set<T>(&self, namespace: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        let cell = OnceLock::new();
        let _ = cell.set(Arc::new(value) as Arc<dyn Any + Send + Sync>);
        self.lock().insert(namespace.to_owned(), Arc::new(cell));
    }

    /// 네임스페이스의 값을 반환하고, 없으면 `factory` 결과를 저장한 뒤 반환합니다.
    ///
    /// 이미 값이 있으면 `factory`는 호출되지 않습니다.
    pub fn get_or_create<T, F>(&self, namespace: &str, factory: F) -> Result<Arc<T>, RuntimeError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let slot = Arc::clone(
            self.lock()
                .entry(namespace.to_owned())
                .or_insert_with(|| Arc::new(OnceLock::new())),
        );
        let value = slot.get_or_init(|| Arc::new(factory()) as Arc<dyn Any + Send + Sync>);
        downcast(namespace, Arc::clone(value))
    }

    /// 네임스페이스에 값이 있는지 확인합니다.
    pub fn contains(&self, namespace: &str) -> bool {
        self.lock()
            .get(namespace)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// 값이 채워진 네임스페이스 목록을 정렬해 반환합니다.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

fn downcast<T>(namespace: &str, value: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>, RuntimeError>
where
    T: Any + Send + Sync,
{
    value.downcast::<T>().map_err(|_| RuntimeError::TypeMismatch {
        namespace: namespace.to_owned(),
        expected: type_name::<T>(),
    })
}
