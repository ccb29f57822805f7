//! Built-in component library.
//!
//! The runnable catalog installed at init. Each component is a small
//! pure evaluator; anything stateful (positions, exposure) lives in
//! the orchestrator. [`install`] registers every candidate and keeps
//! going past individual rejections, mirroring discovery semantics:
//! one broken component must not take down the rest of the catalog.

use crate::catalog::Catalog;
use crate::component::{
    ComponentMetadata, ComponentModel, ComponentVersion, ConfigValidation, EvalContext, Evaluator,
};
use crate::error::RegistryError;
use crate::pipeline::StageResults;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use updown_core::ComponentType;

fn num_or(config: &Value, key: &str, default: f64) -> f64 {
    config.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn require_positive_number(config: &Value, key: &str, errors: &mut Vec<String>) {
    if let Some(value) = config.get(key) {
        match value.as_f64() {
            Some(n) if n > 0.0 => {}
            _ => errors.push(format!("'{key}' must be a positive number")),
        }
    }
}

fn require_unit_fraction(config: &Value, key: &str, errors: &mut Vec<String>) {
    if let Some(value) = config.get(key) {
        match value.as_f64() {
            Some(n) if n > 0.0 && n < 1.0 => {}
            _ => errors.push(format!("'{key}' must be in (0, 1)")),
        }
    }
}

// ============================================================================
// prob-spot-lag: spot momentum vs strike, staleness-weighted
// ============================================================================

/// Estimates the up probability from how far spot has moved from the
/// strike, discounted by oracle staleness.
struct SpotLagProbability;

impl ComponentModel for SpotLagProbability {
    fn evaluate(
        &self,
        ctx: &EvalContext,
        config: &Value,
        _prev: &StageResults,
    ) -> Result<Value, String> {
        let sensitivity = num_or(config, "sensitivity", 50.0);
        let max_staleness_ms = num_or(config, "max_staleness_ms", 10_000.0);

        let spot = ctx
            .snapshot
            .spot()
            .or_else(|| ctx.snapshot.oracle().map(|q| q.price))
            .ok_or("no spot or oracle price available")?;
        let strike = ctx.window.strike_price;
        if strike.is_zero() {
            return Err("window strike is zero".into());
        }

        let momentum = ((spot.inner() - strike.inner()) / strike.inner())
            .to_f64()
            .ok_or("momentum out of f64 range")?;
        let probability = (0.5 + momentum * sensitivity).clamp(0.05, 0.95);

        let staleness_ms = ctx.snapshot.oracle_staleness_ms();
        let staleness = if staleness_ms == i64::MAX {
            1.0
        } else {
            (staleness_ms as f64 / max_staleness_ms).clamp(0.0, 1.0)
        };
        let confidence = (1.0 - staleness).clamp(0.0, 1.0);

        Ok(json!({
            "probability": probability,
            "confidence": confidence,
            "spotPrice": spot.inner().to_f64(),
            "stalenessScore": staleness,
        }))
    }

    fn validate_config(&self, config: &Value) -> ConfigValidation {
        let mut errors = Vec::new();
        require_positive_number(config, "sensitivity", &mut errors);
        require_positive_number(config, "max_staleness_ms", &mut errors);
        if errors.is_empty() {
            ConfigValidation::ok()
        } else {
            ConfigValidation::fail(errors)
        }
    }
}

// ============================================================================
// entry-fade-extreme: fade the market when it leans too far
// ============================================================================

/// Enters against the market when the book-implied up probability
/// diverges from the model's by more than a threshold, with a spread
/// sanity cap.
struct FadeExtremeEntry;

impl ComponentModel for FadeExtremeEntry {
    fn evaluate(
        &self,
        ctx: &EvalContext,
        config: &Value,
        prev: &StageResults,
    ) -> Result<Value, String> {
        let threshold = num_or(config, "threshold", 0.15);
        let max_spread_pct = num_or(config, "max_spread_pct", 10.0);

        let model_up = prev
            .probability
            .as_ref()
            .and_then(|p| p.get("probability"))
            .and_then(Value::as_f64)
            .ok_or("probability stage output missing")?;

        let Some(implied) = ctx.snapshot.implied_up() else {
            return Ok(json!({"shouldEnter": false, "reason": "no book"}));
        };
        let implied_up = implied.inner().to_f64().ok_or("implied out of range")?;

        let spread_ok = ctx
            .snapshot
            .up_book
            .and_then(|b| b.spread_pct())
            .and_then(|s| s.to_f64())
            .map(|s| s <= max_spread_pct)
            .unwrap_or(false);

        let gap = implied_up - model_up;
        let (should_enter, direction) = if !spread_ok {
            (false, None)
        } else if gap >= threshold {
            // Market leans further up than the model believes: fade it.
            (true, Some("fade_up"))
        } else if -gap >= threshold {
            (true, Some("fade_down"))
        } else {
            (false, None)
        };

        Ok(json!({
            "shouldEnter": should_enter,
            "direction": direction,
            "edge": gap.abs(),
            "impliedUp": implied_up,
        }))
    }

    fn validate_config(&self, config: &Value) -> ConfigValidation {
        let mut errors = Vec::new();
        require_unit_fraction(config, "threshold", &mut errors);
        require_positive_number(config, "max_spread_pct", &mut errors);
        if errors.is_empty() {
            ConfigValidation::ok()
        } else {
            ConfigValidation::fail(errors)
        }
    }
}

// ============================================================================
// sizing-fixed-fraction: fixed dollars, confidence-scaled
// ============================================================================

struct FixedFractionSizing;

impl ComponentModel for FixedFractionSizing {
    fn evaluate(
        &self,
        _ctx: &EvalContext,
        config: &Value,
        prev: &StageResults,
    ) -> Result<Value, String> {
        let dollars = num_or(config, "position_size_dollars", 100.0);
        let scale = config
            .get("scale_with_confidence")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let confidence = prev
            .probability
            .as_ref()
            .and_then(|p| p.get("confidence"))
            .and_then(Value::as_f64)
            .unwrap_or(1.0);

        let size = dollars;
        let adjusted = if scale { dollars * confidence } else { dollars };

        Ok(json!({"size": size, "adjustedSize": adjusted}))
    }

    fn validate_config(&self, config: &Value) -> ConfigValidation {
        let mut errors = Vec::new();
        require_positive_number(config, "position_size_dollars", &mut errors);
        if errors.is_empty() {
            ConfigValidation::ok()
        } else {
            ConfigValidation::fail(errors)
        }
    }
}

// ============================================================================
// sizing-kelly-lite: capped Kelly fraction on the model edge
// ============================================================================

struct KellyLiteSizing;

impl ComponentModel for KellyLiteSizing {
    fn evaluate(
        &self,
        ctx: &EvalContext,
        config: &Value,
        prev: &StageResults,
    ) -> Result<Value, String> {
        let bankroll = num_or(config, "bankroll_dollars", 1_000.0);
        let cap = num_or(config, "kelly_cap", 0.1);

        let p = prev
            .probability
            .as_ref()
            .and_then(|v| v.get("probability"))
            .and_then(Value::as_f64)
            .ok_or("probability stage output missing")?;

        // Price of the contract we would buy. Fading up means buying
        // the down token at (1 - implied_up).
        let implied_up = ctx
            .snapshot
            .implied_up()
            .and_then(|price| price.inner().to_f64())
            .unwrap_or(0.5);
        let direction_up = prev
            .entry
            .as_ref()
            .and_then(|e| e.get("direction"))
            .and_then(Value::as_str)
            .map(|d| d == "fade_down")
            .unwrap_or(false);
        let (win_prob, price) = if direction_up {
            (p, implied_up)
        } else {
            (1.0 - p, 1.0 - implied_up)
        };

        if price <= 0.0 || price >= 1.0 {
            return Ok(json!({"size": 0, "adjustedSize": 0}));
        }

        // Kelly for a binary contract priced at `price` paying 1:
        // f* = (p - price) / (1 - price), clamped by the cap.
        let kelly = ((win_prob - price) / (1.0 - price)).clamp(0.0, cap);
        let adjusted = bankroll * kelly;

        Ok(json!({"size": bankroll * cap, "adjustedSize": adjusted, "kellyFraction": kelly}))
    }

    fn validate_config(&self, config: &Value) -> ConfigValidation {
        let mut errors = Vec::new();
        require_positive_number(config, "bankroll_dollars", &mut errors);
        require_unit_fraction(config, "kelly_cap", &mut errors);
        if errors.is_empty() {
            ConfigValidation::ok()
        } else {
            ConfigValidation::fail(errors)
        }
    }
}

// ============================================================================
// exit-hold-to-expiry: ride every position to settlement
// ============================================================================

struct HoldToExpiryExit;

impl ComponentModel for HoldToExpiryExit {
    fn evaluate(
        &self,
        _ctx: &EvalContext,
        _config: &Value,
        _prev: &StageResults,
    ) -> Result<Value, String> {
        Ok(json!({"shouldExit": false}))
    }

    fn validate_config(&self, _config: &Value) -> ConfigValidation {
        ConfigValidation::ok()
    }
}

// ============================================================================
// exit-stop-loss: cut when the held token's mark breaches the stop
// ============================================================================

struct StopLossExit;

impl ComponentModel for StopLossExit {
    fn evaluate(
        &self,
        ctx: &EvalContext,
        config: &Value,
        _prev: &StageResults,
    ) -> Result<Value, String> {
        let stop_pct = num_or(config, "stop_loss_pct", 0.5);
        let take_pct = num_or(config, "take_profit_pct", 0.0);

        let Some(position) = &ctx.position else {
            // Nothing held: advisory levels only.
            return Ok(json!({"shouldExit": false}));
        };

        let held_book = if position.held_up {
            ctx.snapshot.up_book
        } else {
            ctx.snapshot.down_book
        };
        let Some(mark) = held_book.and_then(|b| b.mid()) else {
            return Ok(json!({"shouldExit": false, "reason": "no mark"}));
        };

        let entry = position
            .entry_price
            .inner()
            .to_f64()
            .ok_or("entry price out of range")?;
        let mark_f = mark.inner().to_f64().ok_or("mark out of range")?;

        let stop_price = entry * (1.0 - stop_pct);
        let take_price = if take_pct > 0.0 {
            Some(entry * (1.0 + take_pct))
        } else {
            None
        };

        let should_exit = mark_f <= stop_price
            || take_price.map(|tp| mark_f >= tp).unwrap_or(false);

        Ok(json!({
            "shouldExit": should_exit,
            "stopLoss": {"price": stop_price},
            "takeProfit": take_price.map(|p| json!({"price": p})),
            "mark": mark_f,
        }))
    }

    fn validate_config(&self, config: &Value) -> ConfigValidation {
        let mut errors = Vec::new();
        require_unit_fraction(config, "stop_loss_pct", &mut errors);
        require_positive_number(config, "take_profit_pct", &mut errors);
        if errors.is_empty() {
            ConfigValidation::ok()
        } else {
            ConfigValidation::fail(errors)
        }
    }
}

// ============================================================================
// install
// ============================================================================

fn candidates() -> Vec<(ComponentMetadata, Arc<dyn ComponentModel>)> {
    let author = Some("updown-bot team".to_string());
    let describe = |mut meta: ComponentMetadata, text: &str| {
        meta.description = Some(text.to_string());
        meta.author = author.clone();
        meta
    };

    vec![
        (
            describe(
                ComponentMetadata::new(ComponentType::Probability, "spot-lag", 1),
                "Up probability from spot momentum vs strike, staleness-weighted",
            ),
            Arc::new(SpotLagProbability) as Arc<dyn ComponentModel>,
        ),
        (
            describe(
                ComponentMetadata::new(ComponentType::Entry, "fade-extreme", 1),
                "Fade the book when implied probability diverges from the model",
            ),
            Arc::new(FadeExtremeEntry),
        ),
        (
            describe(
                ComponentMetadata::new(ComponentType::Sizing, "fixed-fraction", 1),
                "Fixed dollar size, optionally confidence-scaled",
            ),
            Arc::new(FixedFractionSizing),
        ),
        (
            describe(
                ComponentMetadata::new(ComponentType::Sizing, "kelly-lite", 1),
                "Capped Kelly fraction on the model edge",
            ),
            Arc::new(KellyLiteSizing),
        ),
        (
            describe(
                ComponentMetadata::new(ComponentType::Exit, "hold-to-expiry", 1),
                "Ride every position to settlement",
            ),
            Arc::new(HoldToExpiryExit),
        ),
        (
            describe(
                ComponentMetadata::new(ComponentType::Exit, "stop-loss", 1),
                "Exit when the held token's mark breaches the stop",
            ),
            Arc::new(StopLossExit),
        ),
    ]
}

/// Register the built-in component set.
///
/// A candidate that fails the contract check is reported and skipped;
/// the rest of the catalog still installs. Returns the rejections.
pub fn install(catalog: &Catalog) -> Vec<RegistryError> {
    let mut rejections = Vec::new();
    for (metadata, model) in candidates() {
        let name = metadata.version_id();
        let result = ComponentVersion::publish(
            metadata.clone(),
            Evaluator::for_type(metadata.ctype, model),
        )
        .and_then(|component| catalog.register(component));
        if let Err(e) = result {
            warn!(component = %name, error = %e, "Built-in component rejected");
            rejections.push(e);
        }
    }
    rejections
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use updown_core::{
        BookTop, MarketSnapshot, Price, Size, SourceQuote, Symbol, TickSource, Window,
    };

    fn ctx_with_book(spot: Decimal, implied_bid: Decimal, implied_ask: Decimal) -> EvalContext {
        let window = Window::new(
            Symbol::new("BTC"),
            900,
            Price::new(dec!(50000)),
            "up-tok".into(),
            "down-tok".into(),
        )
        .unwrap();
        let mut sources = HashMap::new();
        sources.insert(
            TickSource::Exchange,
            SourceQuote {
                price: Price::new(spot),
                age_ms: 50,
            },
        );
        sources.insert(
            TickSource::OraclePush,
            SourceQuote {
                price: Price::new(spot),
                age_ms: 100,
            },
        );
        let book = BookTop {
            best_bid: Price::new(implied_bid),
            bid_size: Size::new(dec!(500)),
            best_ask: Price::new(implied_ask),
            ask_size: Size::new(dec!(400)),
        };
        EvalContext {
            window,
            snapshot: MarketSnapshot {
                symbol: Symbol::new("BTC"),
                taken_at: chrono::Utc::now(),
                sources,
                up_book: Some(book),
                down_book: Some(BookTop {
                    best_bid: Price::new(dec!(1) - implied_ask),
                    bid_size: Size::new(dec!(400)),
                    best_ask: Price::new(dec!(1) - implied_bid),
                    ask_size: Size::new(dec!(500)),
                }),
                strike: Some(Price::new(dec!(50000))),
            },
            time_remaining_ms: 600_000,
            now_ms: 0,
            position: None,
        }
    }

    #[test]
    fn test_install_registers_all() {
        let catalog = Catalog::new();
        let rejections = install(&catalog);
        assert!(rejections.is_empty());
        assert_eq!(catalog.snapshot().len(), 6);
        assert!(catalog.get("prob-spot-lag-v1").is_some());
        assert!(catalog.get("entry-fade-extreme-v1").is_some());
        assert!(catalog.get("sizing-fixed-fraction-v1").is_some());
        assert!(catalog.get("sizing-kelly-lite-v1").is_some());
        assert!(catalog.get("exit-hold-to-expiry-v1").is_some());
        assert!(catalog.get("exit-stop-loss-v1").is_some());
    }

    #[test]
    fn test_install_continues_past_duplicate() {
        let catalog = Catalog::new();
        // Pre-register one builtin id to force a collision.
        let clash = ComponentVersion::publish(
            ComponentMetadata::new(ComponentType::Probability, "spot-lag", 1),
            Evaluator::Probability(Arc::new(SpotLagProbability)),
        )
        .unwrap();
        catalog.register(clash).unwrap();

        let rejections = install(&catalog);
        assert_eq!(rejections.len(), 1);
        // Remaining five still installed.
        assert_eq!(catalog.snapshot().len(), 6);
    }

    #[test]
    fn test_spot_lag_probability_leans_with_momentum() {
        let prob = SpotLagProbability;
        // Spot 1% above strike.
        let ctx = ctx_with_book(dec!(50500), dec!(0.60), dec!(0.62));
        let out = prob.evaluate(&ctx, &json!({}), &StageResults::default()).unwrap();
        let p = out["probability"].as_f64().unwrap();
        assert!(p > 0.5, "momentum up should lean up, got {p}");

        let ctx = ctx_with_book(dec!(49500), dec!(0.40), dec!(0.42));
        let out = prob.evaluate(&ctx, &json!({}), &StageResults::default()).unwrap();
        assert!(out["probability"].as_f64().unwrap() < 0.5);
    }

    #[test]
    fn test_fade_extreme_fades_rich_book() {
        let entry = FadeExtremeEntry;
        let ctx = ctx_with_book(dec!(50000), dec!(0.80), dec!(0.82));
        let mut prev = StageResults::default();
        prev.probability = Some(json!({"probability": 0.5, "confidence": 0.9}));

        let out = entry
            .evaluate(&ctx, &json!({"threshold": 0.15}), &prev)
            .unwrap();
        assert!(out["shouldEnter"].as_bool().unwrap());
        assert_eq!(out["direction"].as_str().unwrap(), "fade_up");
    }

    #[test]
    fn test_fade_extreme_holds_inside_threshold() {
        let entry = FadeExtremeEntry;
        let ctx = ctx_with_book(dec!(50000), dec!(0.52), dec!(0.54));
        let mut prev = StageResults::default();
        prev.probability = Some(json!({"probability": 0.5}));

        let out = entry
            .evaluate(&ctx, &json!({"threshold": 0.15}), &prev)
            .unwrap();
        assert!(!out["shouldEnter"].as_bool().unwrap());
    }

    #[test]
    fn test_fixed_fraction_scales_with_confidence() {
        let sizing = FixedFractionSizing;
        let ctx = ctx_with_book(dec!(50000), dec!(0.5), dec!(0.52));
        let mut prev = StageResults::default();
        prev.probability = Some(json!({"confidence": 0.8}));

        let out = sizing
            .evaluate(&ctx, &json!({"position_size_dollars": 100.0}), &prev)
            .unwrap();
        assert_eq!(out["size"].as_f64().unwrap(), 100.0);
        assert!((out["adjustedSize"].as_f64().unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_kelly_lite_zero_when_no_edge() {
        let sizing = KellyLiteSizing;
        let ctx = ctx_with_book(dec!(50000), dec!(0.49), dec!(0.51));
        let mut prev = StageResults::default();
        prev.probability = Some(json!({"probability": 0.5}));
        prev.entry = Some(json!({"direction": "fade_up"}));

        let out = sizing.evaluate(&ctx, &json!({}), &prev).unwrap();
        assert_eq!(out["adjustedSize"].as_f64().unwrap(), 0.0);
    }

    #[test]
    fn test_stop_loss_exit_triggers_below_stop() {
        let exit = StopLossExit;
        let mut ctx = ctx_with_book(dec!(50000), dec!(0.10), dec!(0.12));
        ctx.position = Some(crate::component::PositionContext {
            entry_price: Price::new(dec!(0.40)),
            side: updown_core::OrderSide::Buy,
            held_up: true,
        });

        // Mark 0.11 vs stop 0.40 * (1 - 0.5) = 0.20: exit.
        let out = exit
            .evaluate(&ctx, &json!({"stop_loss_pct": 0.5}), &StageResults::default())
            .unwrap();
        assert!(out["shouldExit"].as_bool().unwrap());
    }

    #[test]
    fn test_stop_loss_quiet_without_position() {
        let exit = StopLossExit;
        let ctx = ctx_with_book(dec!(50000), dec!(0.10), dec!(0.12));
        let out = exit
            .evaluate(&ctx, &json!({}), &StageResults::default())
            .unwrap();
        assert!(!out["shouldExit"].as_bool().unwrap());
    }

    #[test]
    fn test_config_validation() {
        assert!(!SpotLagProbability
            .validate_config(&json!({"sensitivity": -1}))
            .valid);
        assert!(!FadeExtremeEntry
            .validate_config(&json!({"threshold": 1.5}))
            .valid);
        assert!(!KellyLiteSizing
            .validate_config(&json!({"kelly_cap": 0}))
            .valid);
        assert!(FixedFractionSizing.validate_config(&json!({})).valid);
        assert!(HoldToExpiryExit
            .validate_config(&json!({"anything": true}))
            .valid);
    }
}
