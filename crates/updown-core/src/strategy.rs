//! Strategy composition records.
//!
//! A strategy is a named composition of exactly one component version
//! per pipeline stage plus a validated JSON config. Instances are
//! immutable except for a single-slot upgrade, a config replace/merge,
//! and soft deactivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// The four pipeline stages. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Probability,
    Entry,
    Sizing,
    Exit,
}

impl ComponentType {
    pub const ALL: [ComponentType; 4] = [
        Self::Probability,
        Self::Entry,
        Self::Sizing,
        Self::Exit,
    ];

    /// Version-id prefix for this type. Wire-level contract.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Probability => "prob",
            Self::Entry => "entry",
            Self::Sizing => "sizing",
            Self::Exit => "exit",
        }
    }

    /// Inverse of [`prefix`](Self::prefix).
    pub fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "prob" => Some(Self::Probability),
            "entry" => Some(Self::Entry),
            "sizing" => Some(Self::Sizing),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probability => write!(f, "probability"),
            Self::Entry => write!(f, "entry"),
            Self::Sizing => write!(f, "sizing"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// One component version id per pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSlots {
    pub probability: String,
    pub entry: String,
    pub sizing: String,
    pub exit: String,
}

impl ComponentSlots {
    pub fn get(&self, ctype: ComponentType) -> &str {
        match ctype {
            ComponentType::Probability => &self.probability,
            ComponentType::Entry => &self.entry,
            ComponentType::Sizing => &self.sizing,
            ComponentType::Exit => &self.exit,
        }
    }

    pub fn set(&mut self, ctype: ComponentType, version_id: String) {
        match ctype {
            ComponentType::Probability => self.probability = version_id,
            ComponentType::Entry => self.entry = version_id,
            ComponentType::Sizing => self.sizing = version_id,
            ComponentType::Exit => self.exit = version_id,
        }
    }

    /// Iterate slots in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentType, &str)> {
        ComponentType::ALL.iter().map(move |t| (*t, self.get(*t)))
    }
}

/// A composed strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInstance {
    pub id: Uuid,
    pub name: String,
    /// Parent strategy when this instance was created by a fork.
    pub base_strategy_id: Option<Uuid>,
    pub components: ComponentSlots,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl StrategyInstance {
    pub fn new(name: String, components: ComponentSlots, config: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            base_strategy_id: None,
            components,
            config,
            created_at: Utc::now(),
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_round_trip() {
        for t in ComponentType::ALL {
            assert_eq!(ComponentType::from_prefix(t.prefix()), Some(t));
        }
        assert_eq!(ComponentType::from_prefix("bogus"), None);
    }

    #[test]
    fn test_slot_access() {
        let mut slots = ComponentSlots {
            probability: "prob-a-v1".into(),
            entry: "entry-b-v1".into(),
            sizing: "sizing-c-v1".into(),
            exit: "exit-d-v1".into(),
        };
        assert_eq!(slots.get(ComponentType::Entry), "entry-b-v1");
        slots.set(ComponentType::Entry, "entry-b-v2".into());
        assert_eq!(slots.get(ComponentType::Entry), "entry-b-v2");

        let order: Vec<ComponentType> = slots.iter().map(|(t, _)| t).collect();
        assert_eq!(
            order,
            vec![
                ComponentType::Probability,
                ComponentType::Entry,
                ComponentType::Sizing,
                ComponentType::Exit
            ]
        );
    }
}
