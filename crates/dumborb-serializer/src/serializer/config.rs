use serde::{Deserialize, Serialize};

/// Which repeated values are replaced by fixups when marshalling.
///
/// Containers, beans and objects are tracked by identity. The `All` variants
/// also fix up repeated scalars (strings, numbers, booleans), compared by
/// value. A policy that does not fix up circular references fails with a
/// depth error on a cyclic graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixupPolicy {
    /// Circular references and duplicates of non-scalar values
    #[default]
    CircularAndDuplicates,
    /// Circular references and every duplicate, scalars included
    CircularAndAllDuplicates,
    /// Circular references only; duplicates are serialized again
    CircularOnly,
    /// Duplicates of non-scalar values only
    DuplicatesOnly,
    /// Every duplicate, scalars included, but no circular references
    AllDuplicatesOnly,
    /// No tracking at all; graphs must be acyclic
    Disabled,
}

impl FixupPolicy {
    pub fn tracks(self) -> bool {
        self != FixupPolicy::Disabled
    }

    pub fn fixes_circular(self) -> bool {
        matches!(
            self,
            FixupPolicy::CircularAndDuplicates
                | FixupPolicy::CircularAndAllDuplicates
                | FixupPolicy::CircularOnly
        )
    }

    pub fn fixes_duplicates(self) -> bool {
        matches!(
            self,
            FixupPolicy::CircularAndDuplicates
                | FixupPolicy::CircularAndAllDuplicates
                | FixupPolicy::DuplicatesOnly
                | FixupPolicy::AllDuplicatesOnly
        )
    }

    pub fn fixes_scalars(self) -> bool {
        matches!(
            self,
            FixupPolicy::CircularAndAllDuplicates | FixupPolicy::AllDuplicatesOnly
        )
    }
}

/// How object graphs are laid out in an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Nested values, with a `fixups` list for repeated ones
    #[default]
    Fixups,
    /// Every JSON object hoisted into a top-level `_$Inx$_N` entry of the
    /// envelope and referenced by that index string
    Flat,
}

/// Configuration for marshalling and unmarshalling.
///
/// # Example
///
/// ```rust
/// use dumborb_serializer::{FixupPolicy, SerializerConfig};
///
/// let config = SerializerConfig {
///     marshal_class_hints: false,  // Peers know the types statically
///     fixup_policy: FixupPolicy::CircularOnly,
///     ..SerializerConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Emit `$type` hints on maps, lists, dates and beans.
    ///
    /// Hints are always honored when unmarshalling, regardless of this flag.
    pub marshal_class_hints: bool,
    /// Emit bean fields whose value is null instead of omitting them
    pub marshal_null_attributes: bool,
    pub fixup_policy: FixupPolicy,
    /// Layout of outgoing results. Incoming flat envelopes are always
    /// understood.
    pub wire_format: WireFormat,
    /// Maximum nesting depth of a single marshal or unmarshal pass
    ///
    /// Bounds recursion when tracking is disabled and a graph turns out to
    /// be cyclic.
    pub max_depth: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            marshal_class_hints: true,
            marshal_null_attributes: false,
            fixup_policy: FixupPolicy::default(),
            wire_format: WireFormat::default(),
            max_depth: 256,
        }
    }
}
