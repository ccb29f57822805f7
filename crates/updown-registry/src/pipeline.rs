//! The strategy evaluation pipeline.
//!
//! Stages run in fixed order `probability -> entry -> sizing -> exit`.
//! Each stage's output object is placed into `prev_results[stage]` and
//! handed to the next stage. A stage that errors or returns a
//! non-object stops the pipeline; the error carries the partial
//! results for diagnostics and never persists side effects.

use crate::component::{ComponentVersion, EvalContext};
use crate::error::{RegistryError, RegistryResult};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use updown_core::{ComponentType, ErrorCode};

/// Raw stage outputs accumulated across the pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizing: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<Value>,
}

impl StageResults {
    pub fn get(&self, ctype: ComponentType) -> Option<&Value> {
        match ctype {
            ComponentType::Probability => self.probability.as_ref(),
            ComponentType::Entry => self.entry.as_ref(),
            ComponentType::Sizing => self.sizing.as_ref(),
            ComponentType::Exit => self.exit.as_ref(),
        }
    }

    fn set(&mut self, ctype: ComponentType, value: Value) {
        match ctype {
            ComponentType::Probability => self.probability = Some(value),
            ComponentType::Entry => self.entry = Some(value),
            ComponentType::Sizing => self.sizing = Some(value),
            ComponentType::Exit => self.exit = Some(value),
        }
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Aggregate decision for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Enter,
    Exit,
    Hold,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Hold => "hold",
        }
    }
}

/// The pipeline's aggregate output.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyDecision {
    pub action: DecisionAction,
    pub direction: Option<String>,
    pub size: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub probability: Option<f64>,
    pub confidence: Option<f64>,
    /// Raw stage outputs, for signal logging and diagnostics.
    pub results: StageResults,
}

/// Exact decimal from a JSON number; None for non-numbers.
fn as_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    value?.as_f64()
}

fn as_bool(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn as_string(value: Option<&Value>) -> Option<String> {
    value?.as_str().map(str::to_string)
}

/// Run the full pipeline for one strategy.
pub fn run_pipeline(
    stages: &[(ComponentType, Arc<ComponentVersion>)],
    ctx: &EvalContext,
    config: &Value,
) -> RegistryResult<StrategyDecision> {
    let mut results = StageResults::default();

    for (ctype, component) in stages {
        let output = component
            .evaluator
            .model()
            .evaluate(ctx, config, &results)
            .map_err(|e| {
                RegistryError::new(
                    ErrorCode::ComponentExecutionFailed,
                    format!("{} stage '{}' failed: {e}", ctype, component.version_id),
                )
                .with_context(json!({
                    "stage": ctype.to_string(),
                    "version_id": component.version_id,
                    "partial_results": results.to_json(),
                }))
            })?;

        if !output.is_object() {
            return Err(RegistryError::new(
                ErrorCode::ComponentOutputInvalid,
                format!(
                    "{} stage '{}' returned a non-object result",
                    ctype, component.version_id
                ),
            )
            .with_context(json!({
                "stage": ctype.to_string(),
                "version_id": component.version_id,
                "output": output,
                "partial_results": results.to_json(),
            })));
        }

        results.set(*ctype, output);
    }

    Ok(aggregate(results))
}

/// Fold stage outputs into the aggregate decision.
fn aggregate(results: StageResults) -> StrategyDecision {
    let entry = results.entry.as_ref();
    let sizing = results.sizing.as_ref();
    let exit = results.exit.as_ref();
    let probability = results.probability.as_ref();

    let should_enter = as_bool(entry.and_then(|e| e.get("shouldEnter")));
    let should_exit = as_bool(exit.and_then(|e| e.get("shouldExit")));

    let action = if should_enter {
        DecisionAction::Enter
    } else if should_exit {
        DecisionAction::Exit
    } else {
        DecisionAction::Hold
    };

    let direction = as_string(entry.and_then(|e| e.get("direction")))
        .or_else(|| as_string(entry.and_then(|e| e.get("side"))));

    let size = as_decimal(sizing.and_then(|s| s.get("adjustedSize")))
        .or_else(|| as_decimal(sizing.and_then(|s| s.get("size"))))
        .unwrap_or(Decimal::ZERO);

    let stop_loss = as_decimal(exit.and_then(|e| e.get("stopLoss")).and_then(|s| s.get("price")));
    let take_profit =
        as_decimal(exit.and_then(|e| e.get("takeProfit")).and_then(|t| t.get("price")));

    let prob = as_f64(probability.and_then(|p| p.get("probability")));
    let confidence = as_f64(probability.and_then(|p| p.get("confidence")));

    StrategyDecision {
        action,
        direction,
        size,
        stop_loss,
        take_profit,
        probability: prob,
        confidence,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::test_support::FixedModel;
    use crate::component::{ComponentMetadata, ComponentModel, Evaluator};
    use rust_decimal_macros::dec;
    use updown_core::{MarketSnapshot, Price, Symbol, Window};

    pub(crate) fn test_ctx() -> EvalContext {
        let window = Window::new(
            Symbol::new("BTC"),
            900,
            Price::new(dec!(50000)),
            "up-tok".into(),
            "down-tok".into(),
        )
        .unwrap();
        EvalContext {
            window,
            snapshot: MarketSnapshot {
                symbol: Symbol::new("BTC"),
                taken_at: chrono::Utc::now(),
                sources: Default::default(),
                up_book: None,
                down_book: None,
                strike: Some(Price::new(dec!(50000))),
            },
            time_remaining_ms: 600_000,
            now_ms: 1_200_000,
            position: None,
        }
    }

    fn stage(
        ctype: ComponentType,
        name: &str,
        output: Value,
    ) -> (ComponentType, Arc<ComponentVersion>) {
        let component = ComponentVersion::publish(
            ComponentMetadata::new(ctype, name, 1),
            Evaluator::for_type(ctype, FixedModel::returning(output)),
        )
        .unwrap();
        (ctype, Arc::new(component))
    }

    fn stub_stages() -> Vec<(ComponentType, Arc<ComponentVersion>)> {
        vec![
            stage(
                ComponentType::Probability,
                "stub-prob",
                json!({"probability": 0.75, "confidence": 0.8}),
            ),
            stage(
                ComponentType::Entry,
                "stub-entry",
                json!({"shouldEnter": true, "direction": "long"}),
            ),
            stage(
                ComponentType::Sizing,
                "stub-sizing",
                json!({"size": 100, "adjustedSize": 85}),
            ),
            stage(
                ComponentType::Exit,
                "stub-exit",
                json!({"shouldExit": false, "stopLoss": {"price": 0.38}}),
            ),
        ]
    }

    #[test]
    fn test_compose_and_execute_decision() {
        let decision = run_pipeline(&stub_stages(), &test_ctx(), &json!({})).unwrap();

        assert_eq!(decision.action, DecisionAction::Enter);
        assert_eq!(decision.direction.as_deref(), Some("long"));
        assert_eq!(decision.size, dec!(85));
        assert_eq!(decision.stop_loss, Some(dec!(0.38)));
        assert_eq!(decision.take_profit, None);
        assert_eq!(decision.probability, Some(0.75));
        assert_eq!(decision.confidence, Some(0.8));
    }

    #[test]
    fn test_side_fallback_for_direction() {
        let mut stages = stub_stages();
        stages[1] = stage(
            ComponentType::Entry,
            "stub-entry",
            json!({"shouldEnter": true, "side": "short"}),
        );
        let decision = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap();
        assert_eq!(decision.direction.as_deref(), Some("short"));
    }

    #[test]
    fn test_size_fallback_chain() {
        let mut stages = stub_stages();
        stages[2] = stage(ComponentType::Sizing, "stub-sizing", json!({"size": 42}));
        let decision = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap();
        assert_eq!(decision.size, dec!(42));

        stages[2] = stage(ComponentType::Sizing, "stub-sizing", json!({}));
        let decision = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap();
        assert_eq!(decision.size, Decimal::ZERO);
    }

    #[test]
    fn test_exit_action_when_no_entry() {
        let mut stages = stub_stages();
        stages[1] = stage(
            ComponentType::Entry,
            "stub-entry",
            json!({"shouldEnter": false}),
        );
        stages[3] = stage(
            ComponentType::Exit,
            "stub-exit",
            json!({"shouldExit": true}),
        );
        let decision = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap();
        assert_eq!(decision.action, DecisionAction::Exit);
    }

    #[test]
    fn test_hold_by_default() {
        let mut stages = stub_stages();
        stages[1] = stage(ComponentType::Entry, "stub-entry", json!({}));
        stages[3] = stage(ComponentType::Exit, "stub-exit", json!({}));
        let decision = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap();
        assert_eq!(decision.action, DecisionAction::Hold);
    }

    #[test]
    fn test_non_object_output_stops_pipeline() {
        let mut stages = stub_stages();
        stages[1] = stage(ComponentType::Entry, "stub-entry", json!(42));
        let err = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::ComponentOutputInvalid);
        // Partial results carry the completed probability stage.
        let partial = err.context.get("partial_results").unwrap();
        assert!(partial.get("probability").is_some());
        assert!(partial.get("sizing").is_none());
    }

    #[test]
    fn test_raising_stage_stops_pipeline() {
        struct Failing;
        impl ComponentModel for Failing {
            fn evaluate(
                &self,
                _ctx: &EvalContext,
                _config: &Value,
                _prev: &StageResults,
            ) -> Result<Value, String> {
                Err("boom".into())
            }
            fn validate_config(&self, _config: &Value) -> crate::ConfigValidation {
                crate::ConfigValidation::ok()
            }
        }

        let mut stages = stub_stages();
        let failing = ComponentVersion::publish(
            ComponentMetadata::new(ComponentType::Sizing, "boom", 1),
            Evaluator::Sizing(Arc::new(Failing)),
        )
        .unwrap();
        stages[2] = (ComponentType::Sizing, Arc::new(failing));

        let err = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::ComponentExecutionFailed);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn test_prev_results_visible_to_later_stages() {
        struct EchoPrev;
        impl ComponentModel for EchoPrev {
            fn evaluate(
                &self,
                _ctx: &EvalContext,
                _config: &Value,
                prev: &StageResults,
            ) -> Result<Value, String> {
                let p = prev
                    .probability
                    .as_ref()
                    .and_then(|v| v.get("probability"))
                    .and_then(Value::as_f64)
                    .ok_or("probability stage output missing")?;
                Ok(json!({"shouldEnter": p > 0.5, "direction": "long"}))
            }
            fn validate_config(&self, _config: &Value) -> crate::ConfigValidation {
                crate::ConfigValidation::ok()
            }
        }

        let mut stages = stub_stages();
        let echo = ComponentVersion::publish(
            ComponentMetadata::new(ComponentType::Entry, "echo", 1),
            Evaluator::Entry(Arc::new(EchoPrev)),
        )
        .unwrap();
        stages[1] = (ComponentType::Entry, Arc::new(echo));

        let decision = run_pipeline(&stages, &test_ctx(), &json!({})).unwrap();
        assert_eq!(decision.action, DecisionAction::Enter);
    }
}
