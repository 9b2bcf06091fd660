//! 텔레메트리 클라이언트: 종료된 스팬의 내보내기 대상

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::TelemetryError;

use super::SpanData;

/// 종료된 스팬을 외부로 내보내는 클라이언트
pub trait TelemetryClient: Send + Sync {
    /// 스팬 묶음을 내보냅니다.
    fn export(&self, spans: &[SpanData]) -> Result<(), TelemetryError>;
}

/// 아무것도 내보내지 않는 클라이언트
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClient;

impl TelemetryClient for NoopClient {
    fn export(&self, _spans: &[SpanData]) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// 스팬을 JSON Lines 형식으로 파일에 덧붙이는 클라이언트
#[derive(Debug, Clone)]
pub struct JsonLinesClient {
    path: PathBuf,
}

impl JsonLinesClient {
    /// 출력 파일 경로로 클라이언트를 만듭니다.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 출력 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetryClient for JsonLinesClient {
    fn export(&self, spans: &[SpanData]) -> Result<(), TelemetryError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TelemetryError::Export(format!("{}: {e}", self.path.display())))?;
        let mut writer = BufWriter::new(file);

        for span in spans {
            let line =
                serde_json::to_string(span).map_err(|e| TelemetryError::Export(e.to_string()))?;
            writeln!(writer, "{line}").map_err(|e| TelemetryError::Export(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| TelemetryError::Export(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Attributes, RecordingTracerProvider, TracerProvider};

    #[test]
    fn json_lines_client_appends() {
        let dir = tempfile::tempdir().unwrap();
        let client = JsonLinesClient::new(dir.path().join("out.jsonl"));

        let provider = RecordingTracerProvider::new();
        let tracer = provider.tracer("t");
        tracer.start_span("a", None, Attributes::new()).end();
        tracer.start_span("b", None, Attributes::new()).end();

        client.export(&provider.drain_finished()).unwrap();
        tracer.start_span("c", None, Attributes::new()).end();
        client.export(&provider.drain_finished()).unwrap();

        let content = std::fs::read_to_string(client.path()).unwrap();
        let names: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<SpanData>(l).unwrap().name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn json_lines_client_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let client = JsonLinesClient::new(dir.path().join("missing").join("out.jsonl"));
        let err = client.export(&[]).unwrap_err();
        assert!(err.to_string().contains("span export failed"));
    }
}
