//! 인자 훅: 플러그인이 CLI 파서에 플래그를 추가하는 확장 지점
//!
//! 플러그인은 [`register_argument_hook`]으로 훅을 등록하고, CLI는 파서를 만들 때
//! [`apply_argument_hooks`]를 한 번 호출합니다. 여러 플러그인이 같은 이름의
//! 인자 그룹을 요청해도 그룹은 한 번만 만들어집니다.
//!
//! 파싱된 값은 CLI가 프로세스 [`crate::runtime::Runtime`]의
//! [`ARG_MATCHES_NAMESPACE`]에 `clap::ArgMatches`로 저장합니다.

use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock, PoisonError};

use clap::{Arg, ArgGroup, Command};
use tracing::{debug, warn};

/// 파싱된 `clap::ArgMatches`가 저장되는 프로세스 런타임 네임스페이스
pub const ARG_MATCHES_NAMESPACE: &str = "cli.args";

/// 인자 훅 함수
pub type ArgumentHook = fn(&mut ArgumentRegistry);

// ─── ArgumentRegistry ────────────────────────────────────────────────

/// 파서 구성 중인 `Command`와 이미 만들어진 그룹/인자 이름
#[derive(Debug)]
pub struct ArgumentRegistry {
    command: Command,
    groups: BTreeSet<String>,
    args: BTreeSet<String>,
}

impl ArgumentRegistry {
    /// 기존 명령에 대한 레지스트리를 생성합니다.
    pub fn new(command: Command) -> Self {
        let args = command
            .get_arguments()
            .map(|a| a.get_id().as_str().to_owned())
            .collect();
        let groups = command
            .get_groups()
            .map(|g| g.get_id().as_str().to_owned())
            .collect();
        Self {
            command,
            groups,
            args,
        }
    }

    /// 인자 그룹을 보장합니다. 새로 만들었으면 `true`를 반환합니다.
    pub fn group(&mut self, name: &'static str) -> bool {
        if !self.groups.insert(name.to_owned()) {
            return false;
        }
        let command = std::mem::replace(&mut self.command, Command::new(""));
        self.command = command.group(ArgGroup::new(name).multiple(true));
        debug!(group = name, "argument group created");
        true
    }

    /// 그룹에 인자를 추가합니다. 그룹이 없으면 먼저 만듭니다.
    ///
    /// 같은 id의 인자가 이미 있으면 무시하고 `false`를 반환합니다.
    pub fn add_arg(&mut self, group: &'static str, arg: Arg) -> bool {
        let id = arg.get_id().as_str().to_owned();
        if self.args.contains(&id) {
            warn!(group, arg = %id, "argument already registered, ignoring");
            return false;
        }
        self.group(group);
        self.args.insert(id);

        let arg = arg.group(group).help_heading(group);
        let command = std::mem::replace(&mut self.command, Command::new(""));
        self.command = command.arg(arg);
        true
    }

    /// 그룹이 존재하는지 확인합니다.
    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains(name)
    }

    /// 인자 id가 존재하는지 확인합니다.
    pub fn has_arg(&self, id: &str) -> bool {
        self.args.contains(id)
    }

    /// 구성된 명령을 돌려받습니다.
    pub fn into_command(self) -> Command {
        self.command
    }
}

// ─── ArgumentHooks ───────────────────────────────────────────────────

/// 이름이 붙은 인자 훅 목록 (등록 순서 유지)
#[derive(Debug, Default)]
pub struct ArgumentHooks {
    hooks: Vec<(&'static str, ArgumentHook)>,
}

impl ArgumentHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 훅을 등록합니다. 같은 이름이 이미 있으면 무시합니다.
    pub fn register(&mut self, name: &'static str, hook: ArgumentHook) -> bool {
        if self.hooks.iter().any(|(n, _)| *n == name) {
            return false;
        }
        self.hooks.push((name, hook));
        true
    }

    /// 등록된 훅 이름
    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|(n, _)| *n).collect()
    }

    /// 모든 훅을 등록 순서대로 한 번씩 적용합니다.
    pub fn apply(&self, command: Command) -> Command {
        let mut registry = ArgumentRegistry::new(command);
        for (name, hook) in &self.hooks {
            debug!(hook = name, "applying argument hook");
            hook(&mut registry);
        }
        registry.into_command()
    }
}

static GLOBAL_HOOKS: OnceLock<Mutex<ArgumentHooks>> = OnceLock::new();

fn global_hooks() -> &'static Mutex<ArgumentHooks> {
    GLOBAL_HOOKS.get_or_init(|| Mutex::new(ArgumentHooks::new()))
}

/// 프로세스 전역 목록에 인자 훅을 등록합니다.
pub fn register_argument_hook(name: &'static str, hook: ArgumentHook) -> bool {
    global_hooks()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .register(name, hook)
}

/// 전역 인자 훅을 명령에 적용합니다.
pub fn apply_argument_hooks(command: Command) -> Command {
    global_hooks()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .apply(command)
}
