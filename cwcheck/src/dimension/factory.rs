//! Resolution of dimension instructions against the live environment
//!
//! Runners describe the dimensions they expect as [`Instruction`]s. A known
//! instruction carries its value; an unknown one names only the dimension and
//! is resolved against [`MetaData`] discovered from the host. Instructions
//! that cannot be resolved are handed back to the caller.

use rustc_hash::FxHashSet;
use tracing::warn;

use super::Dimension;
use crate::environment::MetaData;

/// The value side of an [`Instruction`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionValue {
    /// Use exactly this value
    Known(String),
    /// Resolve the value from the environment
    Unknown,
}

/// A request for one dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The dimension name
    pub key: String,
    /// How to obtain the value
    pub value: InstructionValue,
}

impl Instruction {
    /// An instruction whose value is resolved from the environment
    #[must_use]
    pub fn unknown<K: Into<String>>(key: K) -> Self {
        Self {
            key: key.into(),
            value: InstructionValue::Unknown,
        }
    }

    /// An instruction with a fixed value
    #[must_use]
    pub fn known<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: InstructionValue::Known(value.into()),
        }
    }
}

/// Resolves [`Instruction`]s into concrete [`Dimension`]s
#[derive(Debug, Clone, Copy)]
pub struct DimensionFactory<'a> {
    metadata: &'a MetaData,
}

impl<'a> DimensionFactory<'a> {
    /// Create a new [`DimensionFactory`] over discovered metadata
    #[must_use]
    pub fn new(metadata: &'a MetaData) -> Self {
        Self { metadata }
    }

    /// Resolve `instructions`, preserving their order
    ///
    /// Returns the resolved dimensions and the instructions that could not
    /// be resolved. A repeated key is never resolved twice; the repeat is
    /// returned as failed.
    #[must_use]
    pub fn get_dimensions(&self, instructions: &[Instruction]) -> (Vec<Dimension>, Vec<Instruction>) {
        let mut resolved = Vec::with_capacity(instructions.len());
        let mut failed = Vec::new();
        let mut seen = FxHashSet::default();

        for instruction in instructions {
            if !seen.insert(instruction.key.as_str()) {
                warn!(key = %instruction.key, "dimension requested more than once");
                failed.push(instruction.clone());
                continue;
            }
            match &instruction.value {
                InstructionValue::Known(value) => {
                    resolved.push(Dimension::new(&instruction.key, value));
                }
                InstructionValue::Unknown => match self.metadata.lookup(&instruction.key) {
                    Some(value) => resolved.push(Dimension::new(&instruction.key, value)),
                    None => {
                        warn!(key = %instruction.key, "no environment value for dimension");
                        failed.push(instruction.clone());
                    }
                },
            }
        }

        (resolved, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{HOST, IMAGE_ID, INSTANCE_ID, INSTANCE_TYPE};

    fn metadata() -> MetaData {
        MetaData {
            instance_id: Some("i-0123456789abcdef0".to_string()),
            image_id: Some("ami-0abc".to_string()),
            instance_type: Some("t3.medium".to_string()),
            hostname: None,
        }
    }

    #[test]
    fn unknown_values_resolve_from_metadata() {
        let metadata = metadata();
        let factory = DimensionFactory::new(&metadata);
        let (dims, failed) = factory.get_dimensions(&[
            Instruction::unknown(IMAGE_ID),
            Instruction::unknown(INSTANCE_ID),
            Instruction::unknown(INSTANCE_TYPE),
        ]);
        assert!(failed.is_empty());
        assert_eq!(
            dims,
            vec![
                Dimension::new(IMAGE_ID, "ami-0abc"),
                Dimension::new(INSTANCE_ID, "i-0123456789abcdef0"),
                Dimension::new(INSTANCE_TYPE, "t3.medium"),
            ]
        );
    }

    #[test]
    fn unresolvable_and_repeated_instructions_fail() {
        let metadata = metadata();
        let factory = DimensionFactory::new(&metadata);
        let (dims, failed) = factory.get_dimensions(&[
            Instruction::unknown(HOST),
            Instruction::known("cpu", "cpu-total"),
            Instruction::known("cpu", "cpu0"),
        ]);
        assert_eq!(dims, vec![Dimension::new("cpu", "cpu-total")]);
        assert_eq!(
            failed,
            vec![Instruction::unknown(HOST), Instruction::known("cpu", "cpu0")]
        );
    }
}
