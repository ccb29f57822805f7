//! The component contract.
//!
//! Every component exposes metadata, `evaluate`, and
//! `validate_config`. Evaluators are a closed set of four variants,
//! one per pipeline stage; evaluation dispatches on the variant.
//! Evaluate returns a JSON object so stage outputs can flow through
//! `prev_results` untyped; a non-object return is a contract
//! violation surfaced as `ComponentOutputInvalid`.

use crate::error::{RegistryError, RegistryResult};
use crate::pipeline::StageResults;
use crate::version::{generate_version_id, is_valid_component_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use updown_core::{ComponentType, ErrorCode, MarketSnapshot, Window};

/// Held-position context for exit evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionContext {
    pub entry_price: updown_core::Price,
    pub side: updown_core::OrderSide,
    /// True when the held token is the window's up token.
    pub held_up: bool,
}

/// Evaluation context handed to every stage.
///
/// A consistent view of one `(window, snapshot)` pair; components
/// never perform I/O.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub window: Window,
    pub snapshot: MarketSnapshot,
    pub time_remaining_ms: i64,
    pub now_ms: i64,
    /// Set when the evaluating strategy holds a position this window.
    pub position: Option<PositionContext>,
}

/// Result of `validate_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// The callable part of a component.
pub trait ComponentModel: Send + Sync {
    /// Evaluate this stage. Must return a JSON object.
    fn evaluate(
        &self,
        ctx: &EvalContext,
        config: &Value,
        prev: &StageResults,
    ) -> Result<Value, String>;

    /// Validate a strategy config against this component's needs.
    fn validate_config(&self, config: &Value) -> ConfigValidation;
}

/// A typed evaluator: the component's stage variant plus its model.
#[derive(Clone)]
pub enum Evaluator {
    Probability(Arc<dyn ComponentModel>),
    Entry(Arc<dyn ComponentModel>),
    Sizing(Arc<dyn ComponentModel>),
    Exit(Arc<dyn ComponentModel>),
}

impl Evaluator {
    pub fn ctype(&self) -> ComponentType {
        match self {
            Self::Probability(_) => ComponentType::Probability,
            Self::Entry(_) => ComponentType::Entry,
            Self::Sizing(_) => ComponentType::Sizing,
            Self::Exit(_) => ComponentType::Exit,
        }
    }

    pub fn model(&self) -> &Arc<dyn ComponentModel> {
        match self {
            Self::Probability(m) | Self::Entry(m) | Self::Sizing(m) | Self::Exit(m) => m,
        }
    }

    pub fn for_type(ctype: ComponentType, model: Arc<dyn ComponentModel>) -> Self {
        match ctype {
            ComponentType::Probability => Self::Probability(model),
            ComponentType::Entry => Self::Entry(model),
            ComponentType::Sizing => Self::Sizing(model),
            ComponentType::Exit => Self::Exit(model),
        }
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Evaluator({})", self.ctype())
    }
}

/// Component metadata. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub name: String,
    pub version: u32,
    pub ctype: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ComponentMetadata {
    pub fn new(ctype: ComponentType, name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            ctype,
            description: None,
            author: None,
            created_at: Some(Utc::now()),
        }
    }

    /// The metadata-derived version id.
    pub fn version_id(&self) -> String {
        generate_version_id(self.ctype, &self.name, self.version)
    }
}

/// A published component version.
#[derive(Debug, Clone)]
pub struct ComponentVersion {
    pub version_id: String,
    pub metadata: ComponentMetadata,
    pub evaluator: Evaluator,
}

impl ComponentVersion {
    /// Validate the component contract and build the catalog entry.
    ///
    /// Rejects kebab-case violations, a zero version, and an evaluator
    /// variant that disagrees with the declared type.
    pub fn publish(
        metadata: ComponentMetadata,
        evaluator: Evaluator,
    ) -> RegistryResult<Self> {
        if !is_valid_component_name(&metadata.name) {
            return Err(RegistryError::new(
                ErrorCode::ComponentInterfaceInvalid,
                format!("component name '{}' is not kebab-case", metadata.name),
            ));
        }
        if metadata.version < 1 {
            return Err(RegistryError::new(
                ErrorCode::ComponentInterfaceInvalid,
                format!("component '{}' version must be >= 1", metadata.name),
            ));
        }
        if evaluator.ctype() != metadata.ctype {
            return Err(RegistryError::new(
                ErrorCode::ComponentTypeMismatch,
                format!(
                    "component '{}' declares type {} but its evaluator is {}",
                    metadata.name,
                    metadata.ctype,
                    evaluator.ctype()
                ),
            ));
        }
        Ok(Self {
            version_id: metadata.version_id(),
            metadata,
            evaluator,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Stub components shared by registry tests.

    use super::*;

    /// A component whose evaluate returns a fixed JSON value.
    pub struct FixedModel {
        pub output: Value,
    }

    impl FixedModel {
        pub fn returning(output: Value) -> Arc<dyn ComponentModel> {
            Arc::new(Self { output })
        }
    }

    impl ComponentModel for FixedModel {
        fn evaluate(
            &self,
            _ctx: &EvalContext,
            _config: &Value,
            _prev: &StageResults,
        ) -> Result<Value, String> {
            Ok(self.output.clone())
        }

        fn validate_config(&self, _config: &Value) -> ConfigValidation {
            ConfigValidation::ok()
        }
    }
}
