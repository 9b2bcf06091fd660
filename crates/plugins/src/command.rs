//! `command` 컴포넌트: 생명주기 페이즈마다 외부 명령을 실행
//!
//! 부하 생성기나 가짜 백엔드 같은 협력 프로세스를 불투명하게 구동합니다.
//!
//! - `start`: 명령을 백그라운드로 띄우고 프로세스를 보관합니다.
//! - `stop`: 명령이 있으면 실행한 뒤, 남은 백그라운드 프로세스를 종료합니다.
//! - 그 외 페이즈: 명령을 끝까지 실행하고 0이 아닌 종료 코드는 실패로 처리합니다.
//!
//! 빈 명령(`[]`)은 아무것도 하지 않습니다. 여덟 페이즈 모두 선언되어야 합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info, warn};

use pipebench_core::component::{Component, ComponentPhase, PhaseEnv, require_all_phases};
use pipebench_core::error::{ExecutionError, PipebenchError};
use pipebench_core::plugin::PluginRegistry;

/// 백그라운드 프로세스 PID가 저장되는 컴포넌트 런타임 네임스페이스
pub const PID_NAMESPACE: &str = "command.pid";

/// 명령 출력이 기록되는 페이즈 컨텍스트 메타데이터 키
pub const STDOUT_METADATA_KEY: &str = "test.command.stdout";

/// 보고서에 남기는 출력 최대 길이 (바이트)
const MAX_OUTPUT_BYTES: usize = 4096;

/// `command` 컴포넌트 설정
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    /// 페이즈별 argv
    pub phases: BTreeMap<ComponentPhase, Vec<String>>,
    /// 작업 디렉토리
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// 추가 환경변수
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// 컴포넌트 플러그인을 등록합니다.
pub fn register(registry: &mut PluginRegistry<dyn Component>) {
    registry.register("command", |name: &str, cfg: CommandConfig| {
        Ok(Box::new(CommandComponent::new(name, cfg)?) as Box<dyn Component>)
    });
}

/// 외부 명령으로 구동되는 컴포넌트
#[derive(Debug)]
pub struct CommandComponent {
    name: String,
    config: CommandConfig,
    child: Option<Child>,
}

impl CommandComponent {
    /// 컴포넌트를 생성합니다. 누락된 페이즈가 있으면 계약 위반입니다.
    pub fn new(name: &str, config: CommandConfig) -> Result<Self, PipebenchError> {
        let provided: BTreeSet<ComponentPhase> = config.phases.keys().copied().collect();
        require_all_phases(name, &provided)?;
        Ok(Self {
            name: name.to_owned(),
            config,
            child: None,
        })
    }

    fn argv(&self, phase: ComponentPhase) -> &[String] {
        self.config.phases.get(&phase).map(Vec::as_slice).unwrap_or_default()
    }

    fn command(&self, argv: &[String]) -> Option<Command> {
        let (program, args) = argv.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args).envs(&self.config.env);
        if let Some(dir) = &self.config.workdir {
            cmd.current_dir(dir);
        }
        Some(cmd)
    }

    fn failure(&self, phase: ComponentPhase, reason: impl Into<String>) -> PipebenchError {
        ExecutionError::PhaseFailure {
            component: self.name.clone(),
            phase: phase.value().to_owned(),
            reason: reason.into(),
        }
        .into()
    }

    /// 명령을 끝까지 실행하고 표준 출력을 컨텍스트에 기록합니다.
    fn run_to_completion(&self, phase: ComponentPhase, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        let argv = self.argv(phase);
        let Some(mut cmd) = self.command(argv) else {
            debug!(component = %self.name, phase = %phase, "no command configured");
            return Ok(());
        };

        info!(component = %self.name, phase = %phase, command = %argv.join(" "), "running command");
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.failure(phase, format!("failed to run '{}': {e}", argv[0])))?;

        let stdout = truncate(String::from_utf8_lossy(&output.stdout).trim());
        if !stdout.is_empty() {
            env.ctx.insert_metadata(STDOUT_METADATA_KEY, serde_json::Value::String(stdout));
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = truncate(String::from_utf8_lossy(&output.stderr).trim());
            Err(self.failure(phase, format!("command exited with {}: {stderr}", output.status)))
        }
    }

    /// 백그라운드 프로세스를 종료하고 회수합니다.
    fn reap(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(component = %self.name, pid = child.id(), status = %status, "background process already exited");
            }
            Ok(None) => {
                if let Err(e) = child.kill() {
                    warn!(component = %self.name, pid = child.id(), error = %e, "failed to kill background process");
                }
                match child.wait() {
                    Ok(status) => info!(component = %self.name, pid = child.id(), status = %status, "background process stopped"),
                    Err(e) => warn!(component = %self.name, error = %e, "failed to wait for background process"),
                }
            }
            Err(e) => warn!(component = %self.name, error = %e, "failed to poll background process"),
        }
    }
}

impl Component for CommandComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.run_to_completion(ComponentPhase::Configure, env)
    }

    fn deploy(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.run_to_completion(ComponentPhase::Deploy, env)
    }

    fn start(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        let phase = ComponentPhase::Start;
        let argv = self.argv(phase);
        let Some(mut cmd) = self.command(argv) else {
            return Ok(());
        };
        if self.child.is_some() {
            return Err(self.failure(phase, "background process already running"));
        }

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.failure(phase, format!("failed to spawn '{}': {e}", argv[0])))?;
        let pid = child.id();
        info!(component = %self.name, pid, command = %argv.join(" "), "background process started");

        env.runtime.set(PID_NAMESPACE, pid);
        env.ctx.insert_metadata("test.command.pid", serde_json::json!(pid));
        self.child = Some(child);
        Ok(())
    }

    fn start_monitoring(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.run_to_completion(ComponentPhase::StartMonitoring, env)
    }

    fn stop_monitoring(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.run_to_completion(ComponentPhase::StopMonitoring, env)
    }

    fn collect_monitoring_data(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.run_to_completion(ComponentPhase::CollectMonitoringData, env)
    }

    fn stop(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        let result = self.run_to_completion(ComponentPhase::Stop, env);
        self.reap();
        result
    }

    fn destroy(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.reap();
        self.run_to_completion(ComponentPhase::Destroy, env)
    }
}

impl Drop for CommandComponent {
    fn drop(&mut self) {
        self.reap();
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_OUTPUT_BYTES {
        return s.to_owned();
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
