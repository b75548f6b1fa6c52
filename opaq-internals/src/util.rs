//! Internal utility types.

/// Marker type used when type-erasing private instances.
///
/// This zero-sized type serves as a placeholder in generic type parameters
/// when the actual concrete type has been erased. `InstanceData<Erased>`
/// represents an allocation whose value type is unknown at the current scope;
/// only the header in front of the value may be accessed through it.
pub(crate) struct Erased;
