//! Data-driven chip loading from JSON.
//!
//! Feature-gated behind `data-loader`. Provides JSON deserialization into
//! [`ChipTopology`] for chip layouts defined in data files.

use crate::chip::ChipTopology;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while loading a chip description.
#[derive(Debug, thiserror::Error)]
pub enum ChipLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("mixer '{0}' declares no inputs")]
    EmptyMixer(String),
    #[error("store '{0}' has zero capacity")]
    EmptyStore(String),
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load a chip topology from a JSON string.
pub fn load_topology_json(json: &str) -> Result<ChipTopology, ChipLoadError> {
    validate(serde_json::from_str(json)?)
}

/// Load a chip topology from JSON bytes.
pub fn load_topology_json_bytes(bytes: &[u8]) -> Result<ChipTopology, ChipLoadError> {
    validate(serde_json::from_slice(bytes)?)
}

fn validate(topology: ChipTopology) -> Result<ChipTopology, ChipLoadError> {
    for mixer in &topology.mixers {
        if mixer.ratio.is_empty() {
            return Err(ChipLoadError::EmptyMixer(mixer.name.clone()));
        }
    }
    for store in &topology.stores {
        if store.capacity == 0 {
            return Err(ChipLoadError::EmptyStore(store.name.clone()));
        }
    }
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::MixerId;

    const CHIP: &str = r#"{
        "mixers": [
            {"name": "three_way", "ratio": [1, 1, 1]},
            {"name": "even", "ratio": [1, 1]}
        ],
        "stores": [
            {"name": "bank0", "capacity": 8}
        ]
    }"#;

    #[test]
    fn loads_a_valid_chip() {
        let topology = load_topology_json(CHIP).unwrap();
        assert_eq!(topology.mixers.len(), 2);
        assert_eq!(topology.stores[0].capacity, 8);
        assert_eq!(topology.find_one_to_one_mixer(), Some(MixerId(1)));
    }

    #[test]
    fn byte_and_str_loading_agree() {
        assert_eq!(
            load_topology_json(CHIP).unwrap(),
            load_topology_json_bytes(CHIP.as_bytes()).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            load_topology_json("{not json"),
            Err(ChipLoadError::JsonParse(_))
        ));
    }

    #[test]
    fn rejects_a_mixer_without_inputs() {
        let json = r#"{"mixers": [{"name": "void", "ratio": []}], "stores": []}"#;
        assert!(matches!(
            load_topology_json(json),
            Err(ChipLoadError::EmptyMixer(name)) if name == "void"
        ));
    }

    #[test]
    fn rejects_a_zero_capacity_store() {
        let json = r#"{"mixers": [], "stores": [{"name": "empty", "capacity": 0}]}"#;
        assert!(matches!(
            load_topology_json(json),
            Err(ChipLoadError::EmptyStore(name)) if name == "empty"
        ));
    }
}
