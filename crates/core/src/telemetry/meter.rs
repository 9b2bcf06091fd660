//! `metrics` 파사드 기반 미터
//!
//! 실제 레코더(Prometheus 익스포터 등)는 바이너리가 설치합니다.
//! 레코더가 없으면 `metrics` 매크로는 아무 일도 하지 않습니다.

use std::sync::Arc;

use metrics::Label;

use super::{Meter, MeterProvider};

/// 미터 이름을 나타내는 레이블 키
const LABEL_SCOPE: &str = "scope";

/// `metrics` 파사드로 기록하는 미터 제공자
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsMeterProvider;

impl MeterProvider for MetricsMeterProvider {
    fn meter(&self, name: &str) -> Arc<dyn Meter> {
        Arc::new(MetricsMeter {
            scope: name.to_owned(),
        })
    }
}

struct MetricsMeter {
    scope: String,
}

impl MetricsMeter {
    fn labels(&self, labels: &[(&'static str, String)]) -> Vec<Label> {
        let mut out = Vec::with_capacity(labels.len() + 1);
        out.push(Label::new(LABEL_SCOPE, self.scope.clone()));
        out.extend(labels.iter().map(|(k, v)| Label::new(*k, v.clone())));
        out
    }
}

impl Meter for MetricsMeter {
    fn add_counter(&self, name: &'static str, value: u64, labels: &[(&'static str, String)]) {
        metrics::counter!(name, self.labels(labels)).increment(value);
    }

    fn record_histogram(&self, name: &'static str, value: f64, labels: &[(&'static str, String)]) {
        metrics::histogram!(name, self.labels(labels)).record(value);
    }
}

/// 기록하지 않는 미터 제공자
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMeterProvider;

impl MeterProvider for NoopMeterProvider {
    fn meter(&self, _name: &str) -> Arc<dyn Meter> {
        Arc::new(NoopMeter)
    }
}

struct NoopMeter;

impl Meter for NoopMeter {
    fn add_counter(&self, _name: &'static str, _value: u64, _labels: &[(&'static str, String)]) {}

    fn record_histogram(&self, _name: &'static str, _value: f64, _labels: &[(&'static str, String)]) {}
}
